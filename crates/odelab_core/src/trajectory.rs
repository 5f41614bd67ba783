use crate::catalog::{EquationDescriptor, EquationId};
use serde::Serialize;

/// How a solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Completion {
    Complete,
    /// The state stopped being finite at sample `index` (time `t`);
    /// that sample and all later ones are unavailable.
    Diverged { index: usize, t: f64 },
}

/// The sampled solution of one solve.
///
/// States are stored row-major: sample `i` occupies
/// `states[i * dimension..(i + 1) * dimension]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    equation: EquationId,
    variable: &'static str,
    state_labels: &'static [&'static str],
    dimension: usize,
    step: f64,
    times: Vec<f64>,
    states: Vec<f64>,
    requested_samples: usize,
    completion: Completion,
}

impl Trajectory {
    pub(crate) fn with_capacity(
        descriptor: &EquationDescriptor,
        step: f64,
        requested_samples: usize,
    ) -> Self {
        let dimension = descriptor.dimension();
        Self {
            equation: descriptor.id,
            variable: descriptor.variable,
            state_labels: descriptor.state_labels,
            dimension,
            step,
            times: Vec::with_capacity(requested_samples),
            states: Vec::with_capacity(requested_samples * dimension),
            requested_samples,
            completion: Completion::Complete,
        }
    }

    pub(crate) fn push(&mut self, t: f64, state: &[f64]) {
        debug_assert_eq!(state.len(), self.dimension);
        self.times.push(t);
        self.states.extend_from_slice(state);
    }

    pub(crate) fn halt(&mut self, index: usize, t: f64) {
        self.completion = Completion::Diverged { index, t };
    }

    pub fn equation(&self) -> EquationId {
        self.equation
    }

    /// Name of the independent variable.
    pub fn variable(&self) -> &'static str {
        self.variable
    }

    pub fn state_labels(&self) -> &'static [&'static str] {
        self.state_labels
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Fixed increment of the independent variable between samples.
    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// All states, flattened row-major.
    pub fn states(&self) -> &[f64] {
        &self.states
    }

    pub fn state(&self, index: usize) -> Option<&[f64]> {
        if index >= self.len() {
            return None;
        }
        let start = index * self.dimension;
        Some(&self.states[start..start + self.dimension])
    }

    pub fn samples(&self) -> impl Iterator<Item = (f64, &[f64])> + '_ {
        self.times
            .iter()
            .copied()
            .zip(self.states.chunks_exact(self.dimension))
    }

    pub fn last(&self) -> Option<(f64, &[f64])> {
        let index = self.len().checked_sub(1)?;
        Some((self.times[index], self.state(index)?))
    }

    /// Every sample of one state component.
    pub fn component(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.dimension {
            return None;
        }
        Some(
            self.states
                .iter()
                .skip(index)
                .step_by(self.dimension)
                .copied()
                .collect(),
        )
    }

    pub fn first_component(&self) -> Vec<f64> {
        self.component(0).unwrap_or_default()
    }

    /// Two components paired per sample, for a phase-space view.
    pub fn phase_projection(&self, first: usize, second: usize) -> Option<Vec<[f64; 2]>> {
        if first >= self.dimension || second >= self.dimension {
            return None;
        }
        Some(
            self.states
                .chunks_exact(self.dimension)
                .map(|state| [state[first], state[second]])
                .collect(),
        )
    }

    /// Minimum and maximum of one component.
    pub fn component_range(&self, index: usize) -> Option<(f64, f64)> {
        if index >= self.dimension || self.is_empty() {
            return None;
        }
        let range = self
            .states
            .iter()
            .skip(index)
            .step_by(self.dimension)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        Some(range)
    }

    /// The sample nearest below `fraction` of the way through the run,
    /// with `fraction` clamped to [0, 1].
    pub fn sample_at_fraction(&self, fraction: f64) -> Option<(f64, &[f64])> {
        if self.is_empty() || fraction.is_nan() {
            return None;
        }
        let last = self.len() - 1;
        let index = ((fraction.clamp(0.0, 1.0) * last as f64).floor() as usize).min(last);
        Some((self.times[index], self.state(index)?))
    }

    pub fn completion(&self) -> Completion {
        self.completion
    }

    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Complete
    }

    /// Number of samples the run was asked for.
    pub fn requested_samples(&self) -> usize {
        self.requested_samples
    }

    /// Samples that could not be produced because the state diverged.
    pub fn missing_samples(&self) -> usize {
        self.requested_samples.saturating_sub(self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lorenz_like() -> Trajectory {
        let mut trajectory = Trajectory::with_capacity(EquationId::Lorenz.descriptor(), 0.5, 4);
        trajectory.push(0.0, &[1.0, 2.0, 3.0]);
        trajectory.push(0.5, &[-4.0, 5.0, 6.0]);
        trajectory.push(1.0, &[7.0, -8.0, 9.0]);
        trajectory
    }

    #[test]
    fn exposes_samples_row_major() {
        let trajectory = lorenz_like();
        assert_eq!(trajectory.len(), 3);
        assert_eq!(trajectory.dimension(), 3);
        assert_eq!(trajectory.state_labels(), &["x", "y", "z"]);
        assert_eq!(trajectory.variable(), "t");
        assert_eq!(trajectory.state(1), Some(&[-4.0, 5.0, 6.0][..]));
        assert_eq!(trajectory.state(3), None);
        assert_eq!(trajectory.last(), Some((1.0, &[7.0, -8.0, 9.0][..])));

        let times: Vec<f64> = trajectory.samples().map(|(t, _)| t).collect();
        assert_eq!(times, trajectory.times());
        assert!(trajectory.samples().all(|(_, state)| state.len() == 3));
    }

    #[test]
    fn projects_components() {
        let trajectory = lorenz_like();
        assert_eq!(trajectory.first_component(), vec![1.0, -4.0, 7.0]);
        assert_eq!(trajectory.component(2), Some(vec![3.0, 6.0, 9.0]));
        assert_eq!(trajectory.component(3), None);
        assert_eq!(
            trajectory.phase_projection(0, 1),
            Some(vec![[1.0, 2.0], [-4.0, 5.0], [7.0, -8.0]])
        );
        assert_eq!(trajectory.phase_projection(0, 5), None);
        assert_eq!(trajectory.component_range(1), Some((-8.0, 5.0)));
        assert_eq!(trajectory.component_range(3), None);
    }

    #[test]
    fn samples_by_fraction() {
        let trajectory = lorenz_like();
        assert_eq!(trajectory.sample_at_fraction(0.0).map(|s| s.0), Some(0.0));
        assert_eq!(trajectory.sample_at_fraction(0.6).map(|s| s.0), Some(0.5));
        assert_eq!(trajectory.sample_at_fraction(1.0).map(|s| s.0), Some(1.0));
        assert_eq!(trajectory.sample_at_fraction(7.0).map(|s| s.0), Some(1.0));
        assert_eq!(trajectory.sample_at_fraction(-1.0).map(|s| s.0), Some(0.0));
        assert_eq!(trajectory.sample_at_fraction(f64::NAN), None);
    }

    #[test]
    fn reports_missing_samples_after_divergence() {
        let mut trajectory = lorenz_like();
        assert!(trajectory.is_complete());
        assert_eq!(trajectory.missing_samples(), 1);

        trajectory.halt(3, 1.5);
        assert!(!trajectory.is_complete());
        assert_eq!(trajectory.completion(), Completion::Diverged { index: 3, t: 1.5 });
        assert_eq!(trajectory.requested_samples(), 4);
    }

    #[test]
    fn empty_trajectory_has_no_projections() {
        let trajectory = Trajectory::with_capacity(EquationId::Logistic.descriptor(), 0.1, 10);
        assert!(trajectory.is_empty());
        assert_eq!(trajectory.last(), None);
        assert_eq!(trajectory.component_range(0), None);
        assert_eq!(trajectory.sample_at_fraction(0.5), None);
        assert!(trajectory.first_component().is_empty());
        assert_eq!(trajectory.missing_samples(), 10);
    }

    #[test]
    fn serializes_for_consumers() {
        let mut trajectory = lorenz_like();
        trajectory.halt(3, 1.5);
        let value = serde_json::to_value(&trajectory).expect("serialize");
        assert_eq!(value["equation"], "lorenz");
        assert_eq!(value["dimension"], 3);
        assert_eq!(value["states"].as_array().map(Vec::len), Some(9));
        assert_eq!(value["completion"]["status"], "diverged");
        assert_eq!(value["completion"]["index"], 3);
    }
}
