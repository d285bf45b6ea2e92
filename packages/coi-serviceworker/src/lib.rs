use wasm_bindgen::prelude::*;

mod config;
mod console;
mod errors;
mod page;
mod proxy;
mod utils;

pub use errors::CoiError;

/// Service worker entry point: attaches the install, activate, fetch and
/// message handlers.
#[wasm_bindgen]
pub fn worker_main() -> Result<(), CoiError> {
    console_error_panic_hook::set_once();
    proxy::main()
}

/// Page entry point: registers the worker and reloads into the isolated state.
#[wasm_bindgen]
pub fn page_main() -> Result<(), CoiError> {
    console_error_panic_hook::set_once();
    page::main()
}

/// Single entry for the bundled script, which is evaluated both as a page
/// script and as the service worker.
#[wasm_bindgen]
pub fn bootstrap() -> Result<(), CoiError> {
    if utils::is_worker_context() {
        worker_main()
    } else {
        page_main()
    }
}

/// Unregisters the controlling worker; its clients are navigated back to
/// their current URL without interception.
#[wasm_bindgen]
pub fn deregister() -> Result<(), CoiError> {
    page::deregister()
}
