use js_sys::Reflect;
use wasm_bindgen::prelude::*;

pub(crate) fn describe_js_value(value: &JsValue) -> String {
    if let Some(s) = value.as_string() {
        return s;
    }
    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        return error
            .to_string()
            .as_string()
            .unwrap_or_else(|| format!("{value:?}"));
    }
    if let Some(n) = value.as_f64() {
        if n.fract() == 0.0 {
            return format!("{n:.0}");
        }
        return format!("{n}");
    }
    format!("{value:?}")
}

pub(crate) fn global_property(name: &str) -> JsValue {
    Reflect::get(&js_sys::global(), &JsValue::from_str(name)).unwrap_or(JsValue::UNDEFINED)
}

/// Worker scopes expose a callable `importScripts`; windows do not.
pub(crate) fn is_worker_context() -> bool {
    global_property("importScripts").is_function()
}

pub(crate) fn service_workers_supported(navigator: &web_sys::Navigator) -> bool {
    Reflect::has(navigator, &JsValue::from_str("serviceWorker")).unwrap_or(false)
}
