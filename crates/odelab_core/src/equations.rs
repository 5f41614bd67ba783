//! Right-hand sides of the catalog's equation families.

use crate::catalog::EquationId;
use crate::equation_engine::Expression;
use crate::error::{RhsError, SolveError, SolveResult};
use crate::parameters::{ExpressionPolicy, ResolvedParameters};
use crate::traits::DynamicalSystem;
use log::trace;

/// A user expression bound to the parameter it was supplied for.
#[derive(Debug, Clone)]
pub struct ExprParam {
    name: &'static str,
    expr: Expression,
    policy: ExpressionPolicy,
}

impl ExprParam {
    fn bind(name: &'static str, params: &ResolvedParameters) -> SolveResult<Self> {
        Ok(Self {
            name,
            expr: params.function(name)?.clone(),
            policy: params.policy(),
        })
    }

    pub fn eval(&self, value: f64) -> Result<f64, RhsError> {
        match self.expr.eval(value) {
            Ok(result) => Ok(result),
            Err(source) => match self.policy {
                ExpressionPolicy::Strict => Err(RhsError {
                    parameter: self.name,
                    at: value,
                    source,
                }),
                ExpressionPolicy::FallbackToVariable => {
                    trace!(
                        "{}({}) failed ({}); substituting {}",
                        self.name,
                        self.expr.variable(),
                        source,
                        value
                    );
                    Ok(value)
                }
            },
        }
    }
}

/// One equation family with its parameters resolved to typed values.
#[derive(Debug, Clone)]
pub enum EquationModel {
    FirstOrderLinear { p: ExprParam, q: ExprParam },
    Separable { f: ExprParam, g: ExprParam },
    Logistic { r: f64, capacity: f64 },
    Harmonic { m: f64, k: f64 },
    Damped { m: f64, c: f64, k: f64 },
    Forced { m: f64, c: f64, k: f64, force: ExprParam },
    Lorenz { sigma: f64, rho: f64, beta: f64 },
    PredatorPrey { a: f64, b: f64, c: f64, d: f64 },
}

impl EquationModel {
    pub fn new(id: EquationId, params: &ResolvedParameters) -> SolveResult<Self> {
        let model = match id {
            EquationId::FirstOrderLinear => EquationModel::FirstOrderLinear {
                p: ExprParam::bind("P", params)?,
                q: ExprParam::bind("Q", params)?,
            },
            EquationId::Separable => EquationModel::Separable {
                f: ExprParam::bind("f", params)?,
                g: ExprParam::bind("g", params)?,
            },
            EquationId::Logistic => EquationModel::Logistic {
                r: params.number("r")?,
                capacity: positive("K", params.number("K")?)?,
            },
            EquationId::HarmonicOscillator => EquationModel::Harmonic {
                m: positive("m", params.number("m")?)?,
                k: params.number("k")?,
            },
            EquationId::DampedOscillator => EquationModel::Damped {
                m: positive("m", params.number("m")?)?,
                c: params.number("c")?,
                k: params.number("k")?,
            },
            EquationId::ForcedOscillator => EquationModel::Forced {
                m: positive("m", params.number("m")?)?,
                c: params.number("c")?,
                k: params.number("k")?,
                force: ExprParam::bind("F", params)?,
            },
            EquationId::Lorenz => EquationModel::Lorenz {
                sigma: params.number("sigma")?,
                rho: params.number("rho")?,
                beta: params.number("beta")?,
            },
            EquationId::PredatorPrey => EquationModel::PredatorPrey {
                a: params.number("a")?,
                b: params.number("b")?,
                c: params.number("c")?,
                d: params.number("d")?,
            },
        };
        Ok(model)
    }

    pub fn id(&self) -> EquationId {
        match self {
            EquationModel::FirstOrderLinear { .. } => EquationId::FirstOrderLinear,
            EquationModel::Separable { .. } => EquationId::Separable,
            EquationModel::Logistic { .. } => EquationId::Logistic,
            EquationModel::Harmonic { .. } => EquationId::HarmonicOscillator,
            EquationModel::Damped { .. } => EquationId::DampedOscillator,
            EquationModel::Forced { .. } => EquationId::ForcedOscillator,
            EquationModel::Lorenz { .. } => EquationId::Lorenz,
            EquationModel::PredatorPrey { .. } => EquationId::PredatorPrey,
        }
    }

    /// Mechanical energy `m·v²/2 + k·x²/2` of an oscillator state `[x, v]`.
    pub fn energy(&self, state: &[f64]) -> Option<f64> {
        let (m, k) = match *self {
            EquationModel::Harmonic { m, k }
            | EquationModel::Damped { m, k, .. }
            | EquationModel::Forced { m, k, .. } => (m, k),
            _ => return None,
        };
        let (&x, &v) = (state.first()?, state.get(1)?);
        Some(0.5 * m * v * v + 0.5 * k * x * x)
    }
}

fn positive(name: &str, value: f64) -> SolveResult<f64> {
    if value <= 0.0 {
        return Err(SolveError::InvalidParameter {
            name: name.to_string(),
            reason: format!("must be positive, got {value}"),
        });
    }
    Ok(value)
}

impl DynamicalSystem<f64> for EquationModel {
    fn dimension(&self) -> usize {
        self.id().descriptor().dimension()
    }

    fn apply(&self, t: f64, y: &[f64], out: &mut [f64]) -> Result<(), RhsError> {
        match self {
            EquationModel::FirstOrderLinear { p, q } => {
                out[0] = q.eval(t)? - p.eval(t)? * y[0];
            }
            EquationModel::Separable { f, g } => {
                out[0] = f.eval(t)? * g.eval(y[0])?;
            }
            EquationModel::Logistic { r, capacity } => {
                out[0] = r * y[0] * (1.0 - y[0] / capacity);
            }
            EquationModel::Harmonic { m, k } => {
                out[0] = y[1];
                out[1] = -(k / m) * y[0];
            }
            EquationModel::Damped { m, c, k } => {
                out[0] = y[1];
                out[1] = (-c * y[1] - k * y[0]) / m;
            }
            EquationModel::Forced { m, c, k, force } => {
                out[0] = y[1];
                out[1] = (force.eval(t)? - c * y[1] - k * y[0]) / m;
            }
            EquationModel::Lorenz { sigma, rho, beta } => {
                let (x, yy, z) = (y[0], y[1], y[2]);
                out[0] = sigma * (yy - x);
                out[1] = x * (rho - z) - yy;
                out[2] = x * yy - beta * z;
            }
            EquationModel::PredatorPrey { a, b, c, d } => {
                let (prey, predator) = (y[0], y[1]);
                out[0] = a * prey - b * prey * predator;
                out[1] = -c * predator + d * prey * predator;
            }
        }
        Ok(())
    }
}
