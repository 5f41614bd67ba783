//! Parameter declarations, user-supplied values, and per-run resolution.

use crate::equation_engine::Expression;
use crate::error::{SolveError, SolveResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    Number,
    Expression,
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterKind::Number => f.write_str("a number"),
            ParameterKind::Expression => f.write_str("an expression"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParameterDefault {
    Number(f64),
    Expression(&'static str),
}

/// Declaration of one named parameter of an equation family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: ParameterKind,
    pub default: Option<ParameterDefault>,
    /// Free variable of an expression parameter.
    pub variable: Option<&'static str>,
}

impl ParameterSpec {
    pub const fn number(name: &'static str, label: &'static str, default: f64) -> Self {
        Self {
            name,
            label,
            kind: ParameterKind::Number,
            default: Some(ParameterDefault::Number(default)),
            variable: None,
        }
    }

    pub const fn expression(
        name: &'static str,
        label: &'static str,
        variable: &'static str,
        default: &'static str,
    ) -> Self {
        Self {
            name,
            label,
            kind: ParameterKind::Expression,
            default: Some(ParameterDefault::Expression(default)),
            variable: Some(variable),
        }
    }

    fn free_variable(&self) -> &'static str {
        self.variable.unwrap_or("x")
    }
}

/// A value supplied by the user: a number, or text holding either a
/// number or an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Number(f64),
    Text(String),
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        ParameterValue::Number(value)
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::Text(value.to_string())
    }
}

impl From<ParameterDefault> for ParameterValue {
    fn from(value: ParameterDefault) -> Self {
        match value {
            ParameterDefault::Number(n) => ParameterValue::Number(n),
            ParameterDefault::Expression(s) => ParameterValue::Text(s.to_string()),
        }
    }
}

/// User input for one solve, keyed by parameter name.
pub type ParameterInput = BTreeMap<String, ParameterValue>;

/// What to do when an expression parameter cannot be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionPolicy {
    /// Fail the solve.
    #[default]
    Strict,
    /// Substitute the raw value of the free variable.
    FallbackToVariable,
}

#[derive(Debug, Clone)]
enum ResolvedValue {
    Number(f64),
    Function(Expression),
}

/// The concrete parameter values of a single run.
#[derive(Debug, Clone)]
pub struct ResolvedParameters {
    values: HashMap<&'static str, ResolvedValue>,
    policy: ExpressionPolicy,
}

impl ResolvedParameters {
    /// Resolves user input against the declarations of `equation`.
    pub fn resolve(
        equation: &'static str,
        specs: &'static [ParameterSpec],
        input: &ParameterInput,
        policy: ExpressionPolicy,
    ) -> SolveResult<Self> {
        if let Some(name) = input
            .keys()
            .find(|name| !specs.iter().any(|spec| spec.name == name.as_str()))
        {
            return Err(SolveError::UnknownParameter {
                equation,
                name: name.clone(),
            });
        }

        let mut values = HashMap::with_capacity(specs.len());
        for spec in specs {
            let supplied = match input.get(spec.name) {
                Some(value) => value.clone(),
                None => spec
                    .default
                    .map(ParameterValue::from)
                    .ok_or_else(|| SolveError::UnresolvedParameter(spec.name.to_string()))?,
            };
            values.insert(spec.name, resolve_value(spec, supplied)?);
        }

        Ok(Self { values, policy })
    }

    pub fn policy(&self) -> ExpressionPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn number(&self, name: &str) -> SolveResult<f64> {
        match self.values.get(name) {
            Some(ResolvedValue::Number(n)) => Ok(*n),
            Some(ResolvedValue::Function(_)) => Err(SolveError::ParameterKind {
                name: name.to_string(),
                expected: ParameterKind::Expression,
            }),
            None => Err(SolveError::UnresolvedParameter(name.to_string())),
        }
    }

    pub fn function(&self, name: &str) -> SolveResult<&Expression> {
        match self.values.get(name) {
            Some(ResolvedValue::Function(expr)) => Ok(expr),
            Some(ResolvedValue::Number(_)) => Err(SolveError::ParameterKind {
                name: name.to_string(),
                expected: ParameterKind::Number,
            }),
            None => Err(SolveError::UnresolvedParameter(name.to_string())),
        }
    }
}

fn resolve_value(spec: &ParameterSpec, value: ParameterValue) -> SolveResult<ResolvedValue> {
    match (spec.kind, value) {
        (ParameterKind::Number, ParameterValue::Number(n)) => finite(spec.name, n),
        (ParameterKind::Number, ParameterValue::Text(text)) => match text.trim().parse::<f64>() {
            Ok(n) => finite(spec.name, n),
            Err(_) => Err(SolveError::ParameterKind {
                name: spec.name.to_string(),
                expected: ParameterKind::Number,
            }),
        },
        (ParameterKind::Expression, ParameterValue::Number(n)) => {
            finite(spec.name, n)?;
            Ok(ResolvedValue::Function(Expression::constant(
                n,
                spec.free_variable(),
            )))
        }
        (ParameterKind::Expression, ParameterValue::Text(text)) => {
            Expression::compile(&text, spec.free_variable())
                .map(ResolvedValue::Function)
                .map_err(|source| SolveError::Expression {
                    parameter: spec.name.to_string(),
                    source,
                })
        }
    }
}

fn finite(name: &str, value: f64) -> SolveResult<ResolvedValue> {
    if !value.is_finite() {
        return Err(SolveError::InvalidParameter {
            name: name.to_string(),
            reason: "value must be finite".to_string(),
        });
    }
    Ok(ResolvedValue::Number(value))
}
