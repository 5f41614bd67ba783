//! Error types for expression handling and solving.

use crate::parameters::ParameterKind;
use thiserror::Error;

/// Errors raised while parsing or compiling an expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Expression is empty")]
    Empty,

    #[error("Unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },

    #[error("Malformed number '{text}' at position {position}")]
    MalformedNumber { text: String, position: usize },

    #[error("Unexpected token '{token}' at position {position}")]
    UnexpectedToken { token: String, position: usize },

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Expected ')' at position {position}")]
    UnclosedParen { position: usize },

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),
}

/// Errors raised while evaluating compiled bytecode.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("{function} is undefined at {argument}")]
    Domain {
        function: &'static str,
        argument: f64,
    },

    #[error("result is not finite")]
    NonFinite,

    #[error("malformed bytecode")]
    MalformedBytecode,
}

impl EvalError {
    /// Overflow is a numerical blow-up rather than a bad expression.
    pub fn is_overflow(&self) -> bool {
        matches!(self, EvalError::NonFinite)
    }
}

/// An evaluation failure inside a right-hand side, tagged with the
/// parameter whose expression failed and the value its free variable had.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("{parameter}({at}): {source}")]
pub struct RhsError {
    pub parameter: &'static str,
    pub at: f64,
    pub source: EvalError,
}

/// Why a solve produced no trajectory.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("Unknown equation: {0}")]
    UnknownEquation(String),

    #[error("Equation '{equation}' has no parameter named '{name}'")]
    UnknownParameter { equation: &'static str, name: String },

    #[error("Parameter '{0}' has no value and no default")]
    UnresolvedParameter(String),

    #[error("Parameter '{name}' expects {expected}")]
    ParameterKind { name: String, expected: ParameterKind },

    #[error("Parameter '{name}' is invalid: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Parameter '{parameter}' has an invalid expression: {source}")]
    Expression {
        parameter: String,
        source: ExpressionError,
    },

    #[error("Parameter '{parameter}' could not be evaluated at {variable} = {at}: {source}")]
    Evaluation {
        parameter: String,
        variable: &'static str,
        at: f64,
        source: EvalError,
    },

    #[error("Domain [{start}, {end}] must be finite with end > start")]
    InvalidDomain { start: f64, end: f64 },

    #[error("Step size {step} cannot resolve the domain [{start}, {end}]")]
    InvalidStepSize { step: f64, start: f64, end: f64 },

    #[error("Step count {requested} must be between 1 and {max}")]
    InvalidStepCount { requested: usize, max: usize },

    #[error("Initial state dimension mismatch. Expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Initial state must be finite")]
    NonFiniteInitialState,
}

pub type SolveResult<T> = Result<T, SolveError>;
