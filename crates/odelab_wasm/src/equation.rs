//! Per-equation handle and its solved trajectory.

use crate::to_js_error;
use js_sys::Float64Array;
use odelab_core::catalog::{self, EquationDescriptor};
use odelab_core::parameters::ParameterInput;
use odelab_core::solver::{solve_request, SolveOptions};
use odelab_core::trajectory::Trajectory;
use odelab_core::SolveResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, Serializer};
use wasm_bindgen::prelude::*;

fn from_optional<T>(value: JsValue, what: &str) -> Result<T, JsValue>
where
    T: DeserializeOwned + Default,
{
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    from_value(value).map_err(|e| JsValue::from_str(&format!("Invalid {}: {}", what, e)))
}

// Parameter maps go out as plain objects so they can be edited and passed back to `solve`.
fn serialize<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    let serializer = Serializer::new().serialize_maps_as_objects(true);
    value
        .serialize(&serializer)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

#[wasm_bindgen]
pub struct WasmEquation {
    descriptor: &'static EquationDescriptor,
}

#[wasm_bindgen]
impl WasmEquation {
    #[wasm_bindgen(constructor)]
    pub fn new(id: &str) -> Result<WasmEquation, JsValue> {
        console_error_panic_hook::set_once();
        let descriptor = catalog::lookup(id).map_err(to_js_error)?;
        Ok(WasmEquation { descriptor })
    }

    pub fn id(&self) -> String {
        self.descriptor.id.to_string()
    }

    pub fn dimension(&self) -> usize {
        self.descriptor.dimension()
    }

    pub fn descriptor(&self) -> Result<JsValue, JsValue> {
        serialize(self.descriptor)
    }

    /// Every parameter at its default, shaped like the `parameters` argument of `solve`.
    pub fn default_parameters(&self) -> Result<JsValue, JsValue> {
        serialize(&self.descriptor.default_parameters())
    }

    /// Solves and returns the whole trajectory as a plain JS object.
    ///
    /// `parameters` and `options` may be `undefined` to use the catalog defaults.
    pub fn solve(&self, parameters: JsValue, options: JsValue) -> Result<JsValue, JsValue> {
        let trajectory = self.solve_js(parameters, options)?;
        serialize(&trajectory)
    }

    /// Like `solve`, but keeps the trajectory on the Rust side for typed-array access.
    pub fn run(&self, parameters: JsValue, options: JsValue) -> Result<WasmTrajectory, JsValue> {
        let trajectory = self.solve_js(parameters, options)?;
        Ok(WasmTrajectory { trajectory })
    }
}

impl WasmEquation {
    fn solve_js(&self, parameters: JsValue, options: JsValue) -> Result<Trajectory, JsValue> {
        let input: ParameterInput = from_optional(parameters, "parameters")?;
        let options: SolveOptions = from_optional(options, "solve options")?;
        self.solve_with(&input, &options).map_err(to_js_error)
    }

    fn solve_with(
        &self,
        input: &ParameterInput,
        options: &SolveOptions,
    ) -> SolveResult<Trajectory> {
        solve_request(self.descriptor.id.as_str(), input, options)
    }
}

#[wasm_bindgen]
pub struct WasmTrajectory {
    trajectory: Trajectory,
}

#[wasm_bindgen]
impl WasmTrajectory {
    pub fn len(&self) -> usize {
        self.trajectory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectory.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.trajectory.dimension()
    }

    pub fn step(&self) -> f64 {
        self.trajectory.step()
    }

    pub fn is_complete(&self) -> bool {
        self.trajectory.is_complete()
    }

    pub fn missing_samples(&self) -> usize {
        self.trajectory.missing_samples()
    }

    pub fn times(&self) -> Float64Array {
        Float64Array::from(self.trajectory.times())
    }

    /// All states, flattened row-major.
    pub fn states(&self) -> Float64Array {
        Float64Array::from(self.trajectory.states())
    }

    pub fn component(&self, index: usize) -> Result<Float64Array, JsValue> {
        let values = self.trajectory.component(index).ok_or_else(|| {
            JsValue::from_str(&format!(
                "Component {} out of range for dimension {}.",
                index,
                self.trajectory.dimension()
            ))
        })?;
        Ok(Float64Array::from(values.as_slice()))
    }

    /// `[t, state...]` at `fraction` of the way through the run, for animation.
    pub fn sample_at_fraction(&self, fraction: f64) -> Result<Float64Array, JsValue> {
        let (t, state) = self
            .trajectory
            .sample_at_fraction(fraction)
            .ok_or_else(|| JsValue::from_str("Trajectory has no sample at that fraction."))?;
        let mut row = Vec::with_capacity(state.len() + 1);
        row.push(t);
        row.extend_from_slice(state);
        Ok(Float64Array::from(row.as_slice()))
    }

    pub fn completion(&self) -> Result<JsValue, JsValue> {
        serialize(&self.trajectory.completion())
    }

    pub fn to_js(&self) -> Result<JsValue, JsValue> {
        serialize(&self.trajectory)
    }
}
