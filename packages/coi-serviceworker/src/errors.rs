use coi_core::CoordinatorError;
use thiserror::Error;
use wasm_bindgen::prelude::*;
use wasm_bindgen_utils::prelude::{serde_wasm_bindgen, WasmEncodedError};

#[derive(Debug, Error)]
pub enum CoiError {
    #[error(transparent)]
    SerdeError(#[from] serde_wasm_bindgen::Error),
    #[error("JavaScript error: {0:?}")]
    JsError(JsValue),
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error("Not running in a {0} context")]
    WrongContext(&'static str),
    #[error("No service worker controls this page")]
    NoController,
}

impl From<JsValue> for CoiError {
    fn from(value: JsValue) -> Self {
        CoiError::JsError(value)
    }
}

impl From<CoiError> for JsValue {
    fn from(value: CoiError) -> Self {
        JsError::new(&value.to_string()).into()
    }
}

impl From<CoiError> for WasmEncodedError {
    fn from(value: CoiError) -> Self {
        WasmEncodedError {
            msg: value.to_string(),
            readable_msg: value.to_string(),
        }
    }
}
