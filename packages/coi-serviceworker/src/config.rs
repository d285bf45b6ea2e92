use coi_core::CoiConfig;
use wasm_bindgen_utils::prelude::serde_wasm_bindgen;

use crate::errors::CoiError;
use crate::utils::global_property;

pub(crate) const CONFIG_GLOBAL: &str = "coi";

/// Reads `self.coi`, falling back to defaults when it is absent.
pub(crate) fn read_config() -> Result<CoiConfig, CoiError> {
    let value = global_property(CONFIG_GLOBAL);
    if value.is_undefined() || value.is_null() {
        return Ok(CoiConfig::default());
    }
    Ok(serde_wasm_bindgen::from_value(value)?)
}
