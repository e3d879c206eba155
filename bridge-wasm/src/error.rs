//! Error types for WebAssembly bridge implementations

use thiserror::Error;
use wasm_bindgen::JsCast;

/// Result type for WebAssembly bridge operations
pub type WasmResult<T> = Result<T, WasmError>;

/// Errors that can occur in WebAssembly bridge implementations
#[derive(Error, Debug)]
pub enum WasmError {
    /// JavaScript error from web-sys
    #[error("JavaScript error: {0}")]
    JavaScript(String),

    /// A DOM node could not be created or had an unexpected type
    #[error("DOM error: {0}")]
    Dom(String),

    /// A browser global (`window`, `document`) is missing
    #[error("Browser API not available: {0}")]
    NotAvailable(String),

    /// Unsupported operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl From<WasmError> for bridge_traits::error::BridgeError {
    fn from(err: WasmError) -> Self {
        match err {
            WasmError::NotAvailable(what) => bridge_traits::error::BridgeError::NotAvailable(what),
            other => bridge_traits::error::BridgeError::OperationFailed(other.to_string()),
        }
    }
}

impl From<wasm_bindgen::JsValue> for WasmError {
    fn from(js_value: wasm_bindgen::JsValue) -> Self {
        let msg = if js_value.is_string() {
            js_value
                .as_string()
                .unwrap_or_else(|| "Unknown error".to_string())
        } else if let Some(error) = js_value.dyn_ref::<js_sys::Error>() {
            error.message().into()
        } else {
            format!("{:?}", js_value)
        };
        WasmError::JavaScript(msg)
    }
}
