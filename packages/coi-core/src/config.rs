use serde::{Deserialize, Serialize};

use crate::errors::CoordinatorError;

pub const DEFAULT_SCRIPT_URL: &str = "./enable-threading.js";
pub const DEFAULT_SCOPE: &str = "./";

/// Options read from the optional `self.coi` global. Every key may be omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoiConfig {
    /// URL the page registers as the service worker; must be this same script.
    pub script_url: String,
    pub scope: String,
    /// Suppresses informational console lines. Errors are always reported.
    pub quiet: bool,
    pub reload_guard: bool,
    pub should_register: bool,
}

impl Default for CoiConfig {
    fn default() -> Self {
        Self {
            script_url: DEFAULT_SCRIPT_URL.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            quiet: false,
            reload_guard: true,
            should_register: true,
        }
    }
}

impl CoiConfig {
    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if self.script_url.trim().is_empty() {
            return Err(CoordinatorError::InvalidConfig(
                "scriptUrl must be a non-empty string".to_string(),
            ));
        }
        if self.scope.trim().is_empty() {
            return Err(CoordinatorError::InvalidConfig(
                "scope must be a non-empty string".to_string(),
            ));
        }
        Ok(())
    }
}
