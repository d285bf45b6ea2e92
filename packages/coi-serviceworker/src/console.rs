use wasm_bindgen::JsValue;

pub(crate) const WORKER_PREFIX: &str = "[COI SW]";
pub(crate) const PAGE_PREFIX: &str = "[COI]";

/// Prefixed console output. `quiet` drops informational lines only.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Console {
    prefix: &'static str,
    quiet: bool,
}

impl Console {
    pub(crate) fn worker(quiet: bool) -> Self {
        Self {
            prefix: WORKER_PREFIX,
            quiet,
        }
    }

    pub(crate) fn page(quiet: bool) -> Self {
        Self {
            prefix: PAGE_PREFIX,
            quiet,
        }
    }

    pub(crate) fn line(&self, message: &str) -> String {
        format!("{} {}", self.prefix, message)
    }

    /// Errors are printed regardless of `quiet`.
    pub(crate) fn prints_info(&self) -> bool {
        !self.quiet
    }

    pub(crate) fn info(&self, message: &str) {
        if self.prints_info() {
            web_sys::console::log_1(&JsValue::from_str(&self.line(message)));
        }
    }

    pub(crate) fn error(&self, message: &str) {
        web_sys::console::error_1(&JsValue::from_str(&self.line(message)));
    }
}
