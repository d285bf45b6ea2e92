//! Assembles the single deployable script that is loaded both by the page and
//! as the service worker.

use base64::Engine;

use crate::config::CoiConfig;

/// Export called once the module is initialized; it detects the context and
/// dispatches to the worker or page entry point.
pub const BOOTSTRAP_EXPORT: &str = "bootstrap";

/// Generate a self-contained script from the wasm-bindgen `no-modules` glue
/// and the compiled module. Values already present on `self.coi` override the
/// embedded configuration.
///
/// The worker context compiles the module synchronously so that its
/// lifecycle and fetch handlers are attached during initial evaluation.
pub fn generate_bootstrap_script(config: &CoiConfig, glue_js: &str, wasm: &[u8]) -> String {
    let encoded_config = serde_json::to_string(config).unwrap_or_else(|_| "{}".to_string());
    let encoded_wasm = base64::engine::general_purpose::STANDARD.encode(wasm);
    format!(
        r#"self.coi = Object.assign({encoded_config}, self.coi || {{}});
{glue_js}
(function () {{
  var bytes = Uint8Array.from(atob("{encoded_wasm}"), function (c) {{ return c.charCodeAt(0); }});
  if (typeof importScripts === "function") {{
    wasm_bindgen.initSync({{ module: bytes }});
    wasm_bindgen.{BOOTSTRAP_EXPORT}();
  }} else {{
    wasm_bindgen({{ module_or_path: bytes }}).then(function () {{ wasm_bindgen.{BOOTSTRAP_EXPORT}(); }});
  }}
}})();
"#
    )
}
