//! The fixed registry of equation families.

use crate::error::{SolveError, SolveResult};
use crate::parameters::{
    ExpressionPolicy, ParameterInput, ParameterSpec, ParameterValue, ResolvedParameters,
};
use crate::solver::Domain;
use crate::solvers::IntegratorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EquationId {
    FirstOrderLinear,
    Separable,
    Logistic,
    HarmonicOscillator,
    DampedOscillator,
    ForcedOscillator,
    Lorenz,
    PredatorPrey,
}

impl EquationId {
    pub const ALL: [EquationId; 8] = [
        EquationId::FirstOrderLinear,
        EquationId::Separable,
        EquationId::Logistic,
        EquationId::HarmonicOscillator,
        EquationId::DampedOscillator,
        EquationId::ForcedOscillator,
        EquationId::Lorenz,
        EquationId::PredatorPrey,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EquationId::FirstOrderLinear => "first-order-linear",
            EquationId::Separable => "separable",
            EquationId::Logistic => "logistic",
            EquationId::HarmonicOscillator => "harmonic-oscillator",
            EquationId::DampedOscillator => "damped-oscillator",
            EquationId::ForcedOscillator => "forced-oscillator",
            EquationId::Lorenz => "lorenz",
            EquationId::PredatorPrey => "predator-prey",
        }
    }

    pub fn descriptor(self) -> &'static EquationDescriptor {
        // CATALOG is laid out in declaration order.
        &CATALOG[self as usize]
    }
}

impl fmt::Display for EquationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EquationId {
    type Err = SolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        EquationId::ALL
            .into_iter()
            .find(|id| id.as_str() == trimmed)
            .ok_or_else(|| SolveError::UnknownEquation(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquationCategory {
    FirstOrder,
    SecondOrder,
    System,
}

/// Static metadata for one equation family.
#[derive(Debug, Serialize)]
pub struct EquationDescriptor {
    pub id: EquationId,
    pub name: &'static str,
    pub category: EquationCategory,
    pub formula: &'static str,
    pub description: &'static str,
    /// Name of the independent variable.
    pub variable: &'static str,
    /// One label per state component; its length is the state dimension.
    pub state_labels: &'static [&'static str],
    pub parameters: &'static [ParameterSpec],
    pub default_domain: Domain,
    pub default_initial_state: &'static [f64],
    pub step_count: usize,
    pub integrator: IntegratorKind,
}

impl EquationDescriptor {
    pub fn dimension(&self) -> usize {
        self.state_labels.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.dimension() == 1
    }

    pub fn parameter(&self, name: &str) -> Option<&'static ParameterSpec> {
        self.parameters.iter().find(|spec| spec.name == name)
    }

    /// Every declared parameter at its default value.
    pub fn default_parameters(&self) -> ParameterInput {
        self.parameters
            .iter()
            .filter_map(|spec| {
                spec.default
                    .map(|default| (spec.name.to_string(), ParameterValue::from(default)))
            })
            .collect()
    }

    pub fn resolve(
        &self,
        input: &ParameterInput,
        policy: ExpressionPolicy,
    ) -> SolveResult<ResolvedParameters> {
        ResolvedParameters::resolve(self.id.as_str(), self.parameters, input, policy)
    }

    fn matches(&self, needle: &str) -> bool {
        [self.id.as_str(), self.name, self.formula]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

static CATALOG: [EquationDescriptor; 8] = [
    EquationDescriptor {
        id: EquationId::FirstOrderLinear,
        name: "First-Order Linear",
        category: EquationCategory::FirstOrder,
        formula: "dy/dx + P(x)·y = Q(x)",
        description: "Linear first-order differential equation.",
        variable: "x",
        state_labels: &["y"],
        parameters: &[
            ParameterSpec::expression("P", "P(x)", "x", "1"),
            ParameterSpec::expression("Q", "Q(x)", "x", "x"),
        ],
        default_domain: Domain { start: 0.0, end: 10.0 },
        default_initial_state: &[1.0],
        step_count: 1000,
        integrator: IntegratorKind::Rk4,
    },
    EquationDescriptor {
        id: EquationId::Separable,
        name: "Separable Variables",
        category: EquationCategory::FirstOrder,
        formula: "dy/dx = f(x)·g(y)",
        description: "The variables can be separated.",
        variable: "x",
        state_labels: &["y"],
        parameters: &[
            ParameterSpec::expression("f", "f(x)", "x", "x"),
            ParameterSpec::expression("g", "g(y)", "y", "y"),
        ],
        default_domain: Domain { start: 0.0, end: 10.0 },
        default_initial_state: &[1.0],
        step_count: 1000,
        integrator: IntegratorKind::Euler,
    },
    EquationDescriptor {
        id: EquationId::Logistic,
        name: "Logistic Equation",
        category: EquationCategory::FirstOrder,
        formula: "dy/dt = r·y·(1 - y/K)",
        description: "Growth limited by a carrying capacity K.",
        variable: "t",
        state_labels: &["y"],
        parameters: &[
            ParameterSpec::number("r", "Rate r", 0.5),
            ParameterSpec::number("K", "Capacity K", 100.0),
        ],
        default_domain: Domain { start: 0.0, end: 50.0 },
        default_initial_state: &[10.0],
        step_count: 1000,
        integrator: IntegratorKind::Euler,
    },
    EquationDescriptor {
        id: EquationId::HarmonicOscillator,
        name: "Harmonic Oscillator",
        category: EquationCategory::SecondOrder,
        formula: "m·x'' + k·x = 0",
        description: "Simple harmonic motion.",
        variable: "t",
        state_labels: &["x", "v"],
        parameters: &[
            ParameterSpec::number("m", "Mass m", 1.0),
            ParameterSpec::number("k", "Spring constant k", 1.0),
        ],
        default_domain: Domain { start: 0.0, end: 20.0 },
        default_initial_state: &[1.0, 0.0],
        step_count: 1000,
        integrator: IntegratorKind::Verlet,
    },
    EquationDescriptor {
        id: EquationId::DampedOscillator,
        name: "Damped Oscillator",
        category: EquationCategory::SecondOrder,
        formula: "m·x'' + c·x' + k·x = 0",
        description: "Damping proportional to velocity.",
        variable: "t",
        state_labels: &["x", "v"],
        parameters: &[
            ParameterSpec::number("m", "Mass m", 1.0),
            ParameterSpec::number("c", "Damping c", 0.2),
            ParameterSpec::number("k", "Spring constant k", 1.0),
        ],
        default_domain: Domain { start: 0.0, end: 50.0 },
        default_initial_state: &[1.0, 0.0],
        step_count: 1000,
        integrator: IntegratorKind::EulerCromer,
    },
    EquationDescriptor {
        id: EquationId::ForcedOscillator,
        name: "Forced Oscillator",
        category: EquationCategory::SecondOrder,
        formula: "m·x'' + c·x' + k·x = F(t)",
        description: "Damped oscillator driven by an external force.",
        variable: "t",
        state_labels: &["x", "v"],
        parameters: &[
            ParameterSpec::number("m", "Mass m", 1.0),
            ParameterSpec::number("c", "Damping c", 0.1),
            ParameterSpec::number("k", "Spring constant k", 1.0),
            ParameterSpec::expression("F", "F(t)", "t", "sin(t)"),
        ],
        default_domain: Domain { start: 0.0, end: 100.0 },
        default_initial_state: &[0.0, 0.0],
        step_count: 1000,
        integrator: IntegratorKind::EulerCromer,
    },
    EquationDescriptor {
        id: EquationId::Lorenz,
        name: "Lorenz System",
        category: EquationCategory::System,
        formula: "x' = σ(y - x), y' = x(ρ - z) - y, z' = xy - βz",
        description: "Strange attractor, sensitive to initial conditions.",
        variable: "t",
        state_labels: &["x", "y", "z"],
        parameters: &[
            ParameterSpec::number("sigma", "σ", 10.0),
            ParameterSpec::number("rho", "ρ", 28.0),
            ParameterSpec::number("beta", "β", 8.0 / 3.0),
        ],
        default_domain: Domain { start: 0.0, end: 50.0 },
        default_initial_state: &[1.0, 1.0, 1.0],
        step_count: 5000,
        integrator: IntegratorKind::Rk4,
    },
    EquationDescriptor {
        id: EquationId::PredatorPrey,
        name: "Lotka-Volterra",
        category: EquationCategory::System,
        formula: "x' = a·x - b·x·y, y' = -c·y + d·x·y",
        description: "Predator-prey population dynamics.",
        variable: "t",
        state_labels: &["prey", "predator"],
        parameters: &[
            ParameterSpec::number("a", "Prey growth a", 1.0),
            ParameterSpec::number("b", "Predation b", 0.1),
            ParameterSpec::number("c", "Predator death c", 1.0),
            ParameterSpec::number("d", "Predator growth d", 0.1),
        ],
        default_domain: Domain { start: 0.0, end: 50.0 },
        default_initial_state: &[10.0, 5.0],
        step_count: 2000,
        integrator: IntegratorKind::Rk4,
    },
];

/// All registered equation families, in catalog order.
pub fn catalog() -> &'static [EquationDescriptor] {
    &CATALOG
}

/// Looks up a descriptor by its identifier.
pub fn lookup(id: &str) -> SolveResult<&'static EquationDescriptor> {
    id.parse::<EquationId>().map(EquationId::descriptor)
}

pub fn by_category(
    category: EquationCategory,
) -> impl Iterator<Item = &'static EquationDescriptor> {
    CATALOG.iter().filter(move |d| d.category == category)
}

/// Case-insensitive search over identifier, name, and formula.
pub fn search(term: &str) -> Vec<&'static EquationDescriptor> {
    let needle = term.trim().to_lowercase();
    CATALOG.iter().filter(|d| d.matches(&needle)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_table_matches_identifier_order() {
        for id in EquationId::ALL {
            assert_eq!(id.descriptor().id, id);
        }
        assert_eq!(catalog().len(), EquationId::ALL.len());
    }

    #[test]
    fn lookup_by_identifier() {
        for id in EquationId::ALL {
            let descriptor = lookup(id.as_str()).expect("registered id should resolve");
            assert_eq!(descriptor.id, id);
            assert_eq!(id.to_string().parse::<EquationId>(), Ok(id));
        }
        assert_eq!(
            lookup("van-der-pol").unwrap_err(),
            SolveError::UnknownEquation("van-der-pol".to_string())
        );
        assert!(lookup("").is_err());
    }

    #[test]
    fn dimensions_match_state_shapes() {
        let expected = [
            (EquationId::FirstOrderLinear, 1),
            (EquationId::Separable, 1),
            (EquationId::Logistic, 1),
            (EquationId::HarmonicOscillator, 2),
            (EquationId::DampedOscillator, 2),
            (EquationId::ForcedOscillator, 2),
            (EquationId::Lorenz, 3),
            (EquationId::PredatorPrey, 2),
        ];
        for (id, dim) in expected {
            let descriptor = id.descriptor();
            assert_eq!(descriptor.dimension(), dim, "{id}");
            assert_eq!(descriptor.default_initial_state.len(), dim, "{id}");
            assert_eq!(descriptor.is_scalar(), dim == 1);
        }
    }

    #[test]
    fn second_order_integrators_only_on_even_dimensions() {
        for descriptor in catalog() {
            if descriptor.integrator.is_second_order() {
                assert_eq!(descriptor.dimension() % 2, 0, "{}", descriptor.id);
            }
        }
    }

    #[test]
    fn every_default_parameter_set_resolves() {
        for descriptor in catalog() {
            let defaults = descriptor.default_parameters();
            assert_eq!(defaults.len(), descriptor.parameters.len());
            descriptor
                .resolve(&defaults, ExpressionPolicy::Strict)
                .expect("defaults should resolve");
            descriptor
                .resolve(&ParameterInput::new(), ExpressionPolicy::Strict)
                .expect("empty input should fall back to defaults");
        }
    }

    #[test]
    fn lorenz_defaults_are_the_classic_values() {
        let resolved = EquationId::Lorenz
            .descriptor()
            .resolve(&ParameterInput::new(), ExpressionPolicy::Strict)
            .expect("defaults should resolve");
        assert_eq!(resolved.number("sigma"), Ok(10.0));
        assert_eq!(resolved.number("rho"), Ok(28.0));
        assert_eq!(resolved.number("beta"), Ok(8.0 / 3.0));
        assert_eq!(EquationId::Lorenz.descriptor().step_count, 5000);
    }

    #[test]
    fn filters_by_category() {
        assert_eq!(by_category(EquationCategory::FirstOrder).count(), 3);
        assert_eq!(by_category(EquationCategory::SecondOrder).count(), 3);
        let systems: Vec<_> = by_category(EquationCategory::System).map(|d| d.id).collect();
        assert_eq!(systems, vec![EquationId::Lorenz, EquationId::PredatorPrey]);
    }

    #[test]
    fn search_is_case_insensitive() {
        let oscillators: Vec<_> = search("OSCILLATOR").iter().map(|d| d.id).collect();
        assert_eq!(
            oscillators,
            vec![
                EquationId::HarmonicOscillator,
                EquationId::DampedOscillator,
                EquationId::ForcedOscillator
            ]
        );
        assert_eq!(search("volterra")[0].id, EquationId::PredatorPrey);
        assert_eq!(search("").len(), 8);
        assert!(search("navier").is_empty());
    }

    #[test]
    fn identifiers_serialize_in_kebab_case() {
        let json = serde_json::to_string(&EquationId::HarmonicOscillator).expect("serialize");
        assert_eq!(json, r#""harmonic-oscillator""#);
        let descriptor =
            serde_json::to_value(EquationId::Logistic.descriptor()).expect("serialize");
        assert_eq!(descriptor["category"], "first_order");
        assert_eq!(descriptor["integrator"], "euler");
        assert_eq!(descriptor["parameters"][1]["default"], 100.0);
    }
}
