use crate::error::RhsError;
use crate::traits::{DynamicalSystem, Scalar, Steppable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The stepping rule an equation family is integrated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorKind {
    Euler,
    Rk4,
    EulerCromer,
    Verlet,
}

impl IntegratorKind {
    /// Second-order rules expect the state laid out as `[positions..., velocities...]`.
    pub fn is_second_order(self) -> bool {
        matches!(self, IntegratorKind::EulerCromer | IntegratorKind::Verlet)
    }

    pub fn build<T: Scalar>(self, dim: usize) -> Stepper<T> {
        match self {
            IntegratorKind::Euler => Stepper::Euler(Euler::new(dim)),
            IntegratorKind::Rk4 => Stepper::Rk4(RK4::new(dim)),
            IntegratorKind::EulerCromer => Stepper::EulerCromer(EulerCromer::new(dim)),
            IntegratorKind::Verlet => Stepper::Verlet(VelocityVerlet::new(dim)),
        }
    }
}

impl fmt::Display for IntegratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IntegratorKind::Euler => "euler",
            IntegratorKind::Rk4 => "rk4",
            IntegratorKind::EulerCromer => "euler-cromer",
            IntegratorKind::Verlet => "verlet",
        })
    }
}

/// A per-run integrator with its own scratch buffers.
pub enum Stepper<T: Scalar> {
    Euler(Euler<T>),
    Rk4(RK4<T>),
    EulerCromer(EulerCromer<T>),
    Verlet(VelocityVerlet<T>),
}

impl<T: Scalar> Steppable<T> for Stepper<T> {
    fn step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: &mut T,
        state: &mut [T],
        dt: T,
    ) -> Result<(), RhsError> {
        match self {
            Stepper::Euler(s) => s.step(system, t, state, dt),
            Stepper::Rk4(s) => s.step(system, t, state, dt),
            Stepper::EulerCromer(s) => s.step(system, t, state, dt),
            Stepper::Verlet(s) => s.step(system, t, state, dt),
        }
    }
}

/// Explicit (forward) Euler: y_next = y + dt * f(t, y).
pub struct Euler<T: Scalar> {
    deriv: Vec<T>,
}

impl<T: Scalar> Euler<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            deriv: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for Euler<T> {
    fn step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: &mut T,
        state: &mut [T],
        dt: T,
    ) -> Result<(), RhsError> {
        system.apply(*t, state, &mut self.deriv)?;
        for i in 0..state.len() {
            state[i] = state[i] + dt * self.deriv[i];
        }
        *t = *t + dt;
        Ok(())
    }
}

/// Classic Runge-Kutta 4th Order Solver
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: vec![T::zero(); dim],
            k2: vec![T::zero(); dim],
            k3: vec![T::zero(); dim],
            k4: vec![T::zero(); dim],
            tmp: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: &mut T,
        state: &mut [T],
        dt: T,
    ) -> Result<(), RhsError> {
        let half = T::lit(0.5);
        let sixth = T::lit(1.0 / 6.0);
        let two = T::lit(2.0);

        let t0 = *t;

        // k1 = f(t, y)
        system.apply(t0, state, &mut self.k1)?;

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k2)?;

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k2[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k3)?;

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4)?;

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..state.len() {
            state[i] = state[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
        Ok(())
    }
}

/// Semi-implicit Euler (Euler-Cromer).
/// Velocities advance with the current acceleration, then positions
/// advance with the new velocities.
pub struct EulerCromer<T: Scalar> {
    deriv: Vec<T>,
}

impl<T: Scalar> EulerCromer<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            deriv: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for EulerCromer<T> {
    fn step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: &mut T,
        state: &mut [T],
        dt: T,
    ) -> Result<(), RhsError> {
        let n = state.len() / 2;
        system.apply(*t, state, &mut self.deriv)?;

        for i in 0..n {
            state[n + i] = state[n + i] + dt * self.deriv[n + i];
        }
        for i in 0..n {
            state[i] = state[i] + dt * state[n + i];
        }

        *t = *t + dt;
        Ok(())
    }
}

/// Velocity Verlet.
/// x_next = x + v*dt + a*dt^2/2, then v_next = v + (a + a_next)*dt/2,
/// where a_next is evaluated at the new positions.
pub struct VelocityVerlet<T: Scalar> {
    deriv: Vec<T>,
    accel: Vec<T>,
}

impl<T: Scalar> VelocityVerlet<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            deriv: vec![T::zero(); dim],
            accel: vec![T::zero(); dim / 2],
        }
    }
}

impl<T: Scalar> Steppable<T> for VelocityVerlet<T> {
    fn step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: &mut T,
        state: &mut [T],
        dt: T,
    ) -> Result<(), RhsError> {
        let half = T::lit(0.5);
        let n = state.len() / 2;
        let t0 = *t;

        system.apply(t0, state, &mut self.deriv)?;
        self.accel.copy_from_slice(&self.deriv[n..2 * n]);

        for i in 0..n {
            state[i] = state[i] + dt * state[n + i] + half * self.accel[i] * dt * dt;
        }

        // Acceleration at the new positions; velocities are still the old ones.
        system.apply(t0 + dt, state, &mut self.deriv)?;
        for i in 0..n {
            state[n + i] = state[n + i] + half * (self.accel[i] + self.deriv[n + i]) * dt;
        }

        *t = t0 + dt;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;
    use approx::assert_relative_eq;

    /// dy/dt = rate * y
    struct Exponential {
        rate: f64,
    }

    impl DynamicalSystem<f64> for Exponential {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) -> Result<(), RhsError> {
            out[0] = self.rate * x[0];
            Ok(())
        }
    }

    /// x'' = -omega^2 x, state = [x, v]
    struct Spring {
        omega2: f64,
    }

    impl DynamicalSystem<f64> for Spring {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) -> Result<(), RhsError> {
            out[0] = x[1];
            out[1] = -self.omega2 * x[0];
            Ok(())
        }
    }

    struct Failing;

    impl DynamicalSystem<f64> for Failing {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, _x: &[f64], _out: &mut [f64]) -> Result<(), RhsError> {
            Err(RhsError {
                parameter: "g",
                at: 0.0,
                source: EvalError::DivisionByZero,
            })
        }
    }

    fn run(
        kind: IntegratorKind,
        system: &impl DynamicalSystem<f64>,
        y0: &[f64],
        dt: f64,
        steps: usize,
    ) -> Vec<f64> {
        let mut stepper = kind.build::<f64>(y0.len());
        let mut state = y0.to_vec();
        let mut t = 0.0;
        for _ in 0..steps {
            stepper.step(system, &mut t, &mut state, dt).expect("step should succeed");
        }
        assert_relative_eq!(t, dt * steps as f64, epsilon = 1e-9);
        state
    }

    fn spring_energy(state: &[f64]) -> f64 {
        0.5 * state[1] * state[1] + 0.5 * state[0] * state[0]
    }

    #[test]
    fn euler_single_step_matches_formula() {
        let system = Exponential { rate: 2.0 };
        let state = run(IntegratorKind::Euler, &system, &[1.0], 0.1, 1);
        assert_relative_eq!(state[0], 1.2, epsilon = 1e-12);
    }

    #[test]
    fn rk4_tracks_exponential_growth() {
        let system = Exponential { rate: 1.0 };
        let state = run(IntegratorKind::Rk4, &system, &[1.0], 0.01, 100);
        assert_relative_eq!(state[0], 1.0_f64.exp(), epsilon = 1e-9);

        let euler = run(IntegratorKind::Euler, &system, &[1.0], 0.01, 100);
        assert!((euler[0] - 1.0_f64.exp()).abs() > 1e-3);
    }

    #[test]
    fn euler_cromer_updates_velocity_before_position() {
        let system = Spring { omega2: 1.0 };
        let state = run(IntegratorKind::EulerCromer, &system, &[1.0, 0.0], 0.1, 1);
        // v1 = 0 - 0.1 * 1, x1 = 1 + 0.1 * v1
        assert_relative_eq!(state[1], -0.1, epsilon = 1e-12);
        assert_relative_eq!(state[0], 0.99, epsilon = 1e-12);
    }

    #[test]
    fn verlet_single_step_matches_formula() {
        let system = Spring { omega2: 4.0 };
        let dt = 0.1;
        let state = run(IntegratorKind::Verlet, &system, &[1.0, 0.5], dt, 1);
        let a0 = -4.0;
        let x1 = 1.0 + 0.5 * dt + 0.5 * a0 * dt * dt;
        let a1 = -4.0 * x1;
        assert_relative_eq!(state[0], x1, epsilon = 1e-12);
        assert_relative_eq!(state[1], 0.5 + 0.5 * (a0 + a1) * dt, epsilon = 1e-12);
    }

    #[test]
    fn symplectic_rules_keep_spring_energy_bounded() {
        let system = Spring { omega2: 1.0 };
        let y0 = [1.0, 0.0];
        let initial = spring_energy(&y0);

        let verlet = run(IntegratorKind::Verlet, &system, &y0, 0.02, 5000);
        let cromer = run(IntegratorKind::EulerCromer, &system, &y0, 0.02, 5000);
        let euler = run(IntegratorKind::Euler, &system, &y0, 0.02, 5000);

        assert_relative_eq!(spring_energy(&verlet), initial, max_relative = 1e-3);
        assert_relative_eq!(spring_energy(&cromer), initial, max_relative = 2e-2);
        // Forward Euler gains energy every step.
        assert!(spring_energy(&euler) > 1.5 * initial);
    }

    #[test]
    fn steppers_propagate_rhs_errors() {
        for kind in [
            IntegratorKind::Euler,
            IntegratorKind::Rk4,
            IntegratorKind::EulerCromer,
            IntegratorKind::Verlet,
        ] {
            let dim = if kind.is_second_order() { 2 } else { 1 };
            let mut stepper = kind.build::<f64>(dim);
            let mut state = vec![1.0; dim];
            let mut t = 0.0;
            let err = stepper
                .step(&Failing, &mut t, &mut state, 0.1)
                .expect_err("failing rhs should fail the step");
            assert_eq!(err.parameter, "g");
            assert_eq!(t, 0.0, "{kind} must not advance time on failure");
        }
    }

    #[test]
    fn integrators_are_generic_over_scalar() {
        struct Decay;
        impl DynamicalSystem<f32> for Decay {
            fn dimension(&self) -> usize {
                1
            }
            fn apply(&self, _t: f32, x: &[f32], out: &mut [f32]) -> Result<(), RhsError> {
                out[0] = -x[0];
                Ok(())
            }
        }

        let mut stepper = IntegratorKind::Rk4.build::<f32>(1);
        let mut state = [1.0f32];
        let mut t = 0.0f32;
        for _ in 0..10 {
            stepper.step(&Decay, &mut t, &mut state, 0.1).expect("step");
        }
        assert!((state[0] - (-1.0f32).exp()).abs() < 1e-5);
    }
}
