//! The `odelab_core` crate is the numerical engine behind the odelab explorer.
//! It integrates a fixed catalog of ordinary differential equations with
//! fixed-step explicit methods, and evaluates user-typed coefficient
//! functions through a small bytecode VM.
//!
//! Key components:
//! - **Traits**: `Scalar` (numeric type abstraction), `DynamicalSystem` (right-hand sides),
//!   `Steppable` (integrators).
//! - **Equation Engine**: parser, compiler and VM for single-variable expressions such as `sin(t)`.
//! - **Catalog**: the eight equation families with their parameters, defaults and integrators.
//! - **Solvers**: Euler, RK4, Euler-Cromer and velocity Verlet.
//! - **Solver**: the driver that turns a descriptor and parameters into a `Trajectory`.
pub mod catalog;
pub mod equation_engine;
pub mod equations;
pub mod error;
pub mod parameters;
pub mod solver;
pub mod solvers;
pub mod traits;
pub mod trajectory;

pub use catalog::{EquationCategory, EquationDescriptor, EquationId};
pub use error::{SolveError, SolveResult};
pub use parameters::{ExpressionPolicy, ParameterInput, ParameterValue};
pub use solver::{solve, solve_request, Domain, SolveOptions, MAX_STEP_COUNT};
pub use trajectory::{Completion, Trajectory};
