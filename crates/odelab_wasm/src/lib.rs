//! Browser bindings for the odelab engine.

use odelab_core::catalog;
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

mod equation;

pub use equation::{WasmEquation, WasmTrajectory};

/// Installs the panic hook and the console logger. Runs once when the module loads.
#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    // A second init (e.g. a reloaded module sharing the global logger) is harmless.
    let _ = console_log::init_with_level(log::Level::Info);
}

pub(crate) fn to_js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Every equation descriptor, in catalog order.
#[wasm_bindgen]
pub fn list_equations() -> Result<JsValue, JsValue> {
    to_value(catalog::catalog())
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Descriptors whose identifier, name, or formula contains `term`.
#[wasm_bindgen]
pub fn search_equations(term: &str) -> Result<JsValue, JsValue> {
    to_value(&catalog::search(term))
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}
