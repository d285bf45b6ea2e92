// page.rs - This module runs in the window context
use coi_core::{CoordinatorError, Observation, PageRuntime, WorkerLifecycle, WorkerMessage};
use js_sys::Promise;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use wasm_bindgen_utils::prelude::serde_wasm_bindgen;
use web_sys::{
    Event, RegistrationOptions, ServiceWorker, ServiceWorkerContainer, ServiceWorkerRegistration,
    ServiceWorkerState, Storage, Window,
};

use crate::config::read_config;
use crate::console::Console;
use crate::errors::CoiError;
use crate::utils::{describe_js_value, global_property, service_workers_supported};

/// Session storage key holding the number of reloads this page triggered.
pub(crate) const RELOAD_COUNT_KEY: &str = "coiReloadCount";

/// Session storage flag set once this tab asked its worker to deregister.
pub(crate) const DEREGISTERED_KEY: &str = "coiDeregistered";

/// Entry point for the page: reads `self.coi` and runs the coordinator.
pub fn main() -> Result<(), CoiError> {
    let config = read_config()?;
    let page = BrowserPage::new(Console::page(config.quiet))?;
    spawn_local(async move {
        coi_core::run(&page, &config).await;
    });
    Ok(())
}

/// Asks the controlling worker to unregister itself and reload its clients.
/// Later loads in the same session skip registration.
pub fn deregister() -> Result<(), CoiError> {
    let window = web_sys::window().ok_or(CoiError::WrongContext("window"))?;
    let navigator = window.navigator();
    if !service_workers_supported(&navigator) {
        return Err(CoordinatorError::Unsupported.into());
    }
    let controller = navigator
        .service_worker()
        .controller()
        .ok_or(CoiError::NoController)?;
    controller.post_message(&serde_wasm_bindgen::to_value(&WorkerMessage::Deregister)?)?;
    if let Some(storage) = window.session_storage()? {
        storage.set_item(DEREGISTERED_KEY, "1")?;
    }
    Ok(())
}

pub(crate) struct BrowserPage {
    window: Window,
    console: Console,
}

impl BrowserPage {
    pub(crate) fn new(console: Console) -> Result<Self, CoiError> {
        let window = web_sys::window().ok_or(CoiError::WrongContext("window"))?;
        Ok(Self { window, console })
    }

    /// Only valid once `observe` reported registration support.
    fn container(&self) -> ServiceWorkerContainer {
        self.window.navigator().service_worker()
    }

    fn session_storage(&self) -> Option<Storage> {
        self.window.session_storage().ok().flatten()
    }

    fn deregistered(&self) -> bool {
        self.session_storage()
            .and_then(|storage| storage.get_item(DEREGISTERED_KEY).ok().flatten())
            .is_some()
    }
}

impl PageRuntime for BrowserPage {
    type Registration = ServiceWorkerRegistration;

    fn observe(&self) -> Observation {
        Observation {
            registration_supported: service_workers_supported(&self.window.navigator()),
            shared_memory: self.shared_memory_available(),
            cross_origin_isolated: global_property("crossOriginIsolated")
                .as_bool()
                .unwrap_or(false),
            deregistered: self.deregistered(),
        }
    }

    fn has_controller(&self) -> bool {
        self.container().controller().is_some()
    }

    fn shared_memory_available(&self) -> bool {
        !global_property("SharedArrayBuffer").is_undefined()
    }

    async fn register(
        &self,
        script_url: &str,
        scope: &str,
    ) -> Result<ServiceWorkerRegistration, CoordinatorError> {
        let options = RegistrationOptions::new();
        options.set_scope(scope);
        let registration = JsFuture::from(self.container().register_with_options(script_url, &options))
            .await
            .map_err(|err| CoordinatorError::RegistrationFailed(describe_js_value(&err)))?;
        registration
            .dyn_into::<ServiceWorkerRegistration>()
            .map_err(|value| {
                CoordinatorError::RegistrationFailed(format!(
                    "unexpected registration {}",
                    describe_js_value(&value)
                ))
            })
    }

    fn lifecycle(&self, registration: &ServiceWorkerRegistration) -> WorkerLifecycle {
        if registration.active().is_some() {
            return WorkerLifecycle::Active;
        }
        registration
            .installing()
            .or_else(|| registration.waiting())
            .map_or(WorkerLifecycle::Absent, |worker| lifecycle_of(worker.state()))
    }

    async fn wait_for_activation(
        &self,
        registration: &ServiceWorkerRegistration,
    ) -> Result<WorkerLifecycle, CoordinatorError> {
        if registration.active().is_some() {
            return Ok(WorkerLifecycle::Active);
        }
        let Some(worker) = registration.installing().or_else(|| registration.waiting()) else {
            return Ok(WorkerLifecycle::Absent);
        };
        let settled = JsFuture::from(settled_promise(&worker))
            .await
            .map_err(|err| CoordinatorError::ActivationFailed(describe_js_value(&err)))?;
        serde_wasm_bindgen::from_value(settled)
            .map_err(|err| CoordinatorError::ActivationFailed(err.to_string()))
    }

    fn reload(&self) -> Result<(), CoordinatorError> {
        self.window
            .location()
            .reload()
            .map_err(|err| CoordinatorError::ReloadFailed(describe_js_value(&err)))
    }

    fn reloads_issued(&self) -> u32 {
        self.session_storage()
            .and_then(|storage| storage.get_item(RELOAD_COUNT_KEY).ok().flatten())
            .and_then(|count| count.parse().ok())
            .unwrap_or(0)
    }

    fn record_reload(&self) {
        let issued = self.reloads_issued().saturating_add(1);
        let Some(storage) = self.session_storage() else {
            self.console
                .error("sessionStorage unavailable; reload guard cannot persist");
            return;
        };
        let written = storage.set_item(RELOAD_COUNT_KEY, &issued.to_string());
        if let Some(message) = storage_failure("record reload", written) {
            self.console.error(&message);
        }
    }

    fn clear_reloads(&self) {
        let Some(storage) = self.session_storage() else {
            return;
        };
        let removed = storage.remove_item(RELOAD_COUNT_KEY);
        if let Some(message) = storage_failure("clear reload history", removed) {
            self.console.error(&message);
        }
    }

    fn info(&self, message: &str) {
        self.console.info(message);
    }

    fn error(&self, message: &str) {
        self.console.error(message);
    }
}

fn storage_failure(action: &str, result: Result<(), JsValue>) -> Option<String> {
    result
        .err()
        .map(|err| format!("Failed to {action}: {}", describe_js_value(&err)))
}

pub(crate) fn lifecycle_of(state: ServiceWorkerState) -> WorkerLifecycle {
    match state {
        ServiceWorkerState::Installed => WorkerLifecycle::Waiting,
        ServiceWorkerState::Activating => WorkerLifecycle::Activating,
        ServiceWorkerState::Activated => WorkerLifecycle::Active,
        ServiceWorkerState::Redundant => WorkerLifecycle::Redundant,
        _ => WorkerLifecycle::Installing,
    }
}

/// Resolves with the serialized [`WorkerLifecycle`] once `worker` reaches
/// `activated` or `redundant`.
fn settled_promise(worker: &ServiceWorker) -> Promise {
    match lifecycle_of(worker.state()) {
        settled @ (WorkerLifecycle::Active | WorkerLifecycle::Redundant) => {
            return Promise::resolve(&lifecycle_value(settled));
        }
        _ => {}
    }

    let worker = worker.clone();
    Promise::new(&mut |resolve, _reject| {
        let observed = worker.clone();
        let onstatechange = Closure::wrap(Box::new(move |_event: Event| {
            let lifecycle = lifecycle_of(observed.state());
            if matches!(lifecycle, WorkerLifecycle::Active | WorkerLifecycle::Redundant) {
                let _ = resolve.call1(&JsValue::NULL, &lifecycle_value(lifecycle));
            }
        }) as Box<dyn FnMut(Event)>);
        worker.set_onstatechange(Some(onstatechange.as_ref().unchecked_ref()));
        onstatechange.forget();
    })
}

fn lifecycle_value(lifecycle: WorkerLifecycle) -> JsValue {
    serde_wasm_bindgen::to_value(&lifecycle).unwrap_or(JsValue::UNDEFINED)
}
