//! The solve driver: fixed-step integration of one equation over a domain.

use crate::catalog::{self, EquationDescriptor};
use crate::equations::EquationModel;
use crate::error::{SolveError, SolveResult};
use crate::parameters::{ExpressionPolicy, ParameterInput, ResolvedParameters};
use crate::traits::Steppable;
use crate::trajectory::Trajectory;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Upper bound on the number of steps a single solve may take.
pub const MAX_STEP_COUNT: usize = 100_000;

/// Interval of the independent variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub start: f64,
    pub end: f64,
}

impl Domain {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn width(&self) -> f64 {
        self.end - self.start
    }

    fn validate(&self) -> SolveResult<()> {
        if !self.start.is_finite() || !self.end.is_finite() || self.end <= self.start {
            return Err(SolveError::InvalidDomain {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// The fixed step for `step_count` steps. It must stay several ulps wide at
    /// both ends so that `start + i·h` is strictly increasing.
    fn step_size(&self, step_count: usize) -> SolveResult<f64> {
        let h = self.width() / step_count as f64;
        let scale = self.start.abs().max(self.end.abs());
        if !h.is_finite() || h <= 4.0 * f64::EPSILON * scale {
            return Err(SolveError::InvalidStepSize {
                step: h,
                start: self.start,
                end: self.end,
            });
        }
        Ok(h)
    }
}

/// Per-run overrides of the catalog defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    pub domain: Option<Domain>,
    pub initial_state: Option<Vec<f64>>,
    pub step_count: Option<usize>,
    pub expression_policy: ExpressionPolicy,
}

/// Integrates `descriptor` over `domain` in `step_count` fixed steps.
///
/// A state that stops being finite ends the run early; the returned
/// trajectory then holds every sample before the divergence.
pub fn solve(
    descriptor: &EquationDescriptor,
    params: &ResolvedParameters,
    domain: Domain,
    initial_state: &[f64],
    step_count: usize,
) -> SolveResult<Trajectory> {
    domain.validate()?;
    if step_count == 0 || step_count > MAX_STEP_COUNT {
        return Err(SolveError::InvalidStepCount {
            requested: step_count,
            max: MAX_STEP_COUNT,
        });
    }
    let dim = descriptor.dimension();
    if initial_state.len() != dim {
        return Err(SolveError::DimensionMismatch {
            expected: dim,
            actual: initial_state.len(),
        });
    }
    if initial_state.iter().any(|v| !v.is_finite()) {
        return Err(SolveError::NonFiniteInitialState);
    }

    let h = domain.step_size(step_count)?;
    let model = EquationModel::new(descriptor.id, params)?;
    debug!(
        "Solving {} on [{}, {}] with {} {} steps (h = {})",
        descriptor.id, domain.start, domain.end, step_count, descriptor.integrator, h
    );

    let mut stepper = descriptor.integrator.build::<f64>(dim);
    let mut trajectory = Trajectory::with_capacity(descriptor, h, step_count + 1);
    let mut state = initial_state.to_vec();
    let mut t = domain.start;
    trajectory.push(t, &state);

    for i in 1..=step_count {
        let next_t = domain.start + i as f64 * h;
        if let Err(err) = stepper.step(&model, &mut t, &mut state, h) {
            let variable = descriptor
                .parameter(err.parameter)
                .and_then(|spec| spec.variable)
                .unwrap_or(descriptor.variable);
            if err.source.is_overflow() {
                warn!(
                    "{}: {} overflowed at {} = {}; stopping after {} samples",
                    descriptor.id, err.parameter, variable, err.at, i
                );
                trajectory.halt(i, next_t);
                break;
            }
            return Err(SolveError::Evaluation {
                parameter: err.parameter.to_string(),
                variable,
                at: err.at,
                source: err.source,
            });
        }
        // Recompute rather than accumulate so the grid stays uniform.
        t = next_t;
        if state.iter().any(|v| !v.is_finite()) {
            warn!(
                "{}: state diverged at {} = {}; stopping after {} samples",
                descriptor.id, descriptor.variable, t, i
            );
            trajectory.halt(i, t);
            break;
        }
        trajectory.push(t, &state);
    }

    Ok(trajectory)
}

/// Looks up `id`, resolves `input`, fills the remaining inputs from the
/// catalog defaults, and solves.
pub fn solve_request(
    id: &str,
    input: &ParameterInput,
    options: &SolveOptions,
) -> SolveResult<Trajectory> {
    let descriptor = catalog::lookup(id)?;
    let params = descriptor.resolve(input, options.expression_policy)?;
    let domain = options.domain.unwrap_or(descriptor.default_domain);
    let initial_state = options
        .initial_state
        .as_deref()
        .unwrap_or(descriptor.default_initial_state);
    let step_count = options.step_count.unwrap_or(descriptor.step_count);
    solve(descriptor, &params, domain, initial_state, step_count)
}
