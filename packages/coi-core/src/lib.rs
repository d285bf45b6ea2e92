//! Platform-independent logic for retrofitting cross-origin isolation onto a
//! page: the header rewrite applied by the service worker and the page-side
//! activation state machine. Nothing in this crate touches browser APIs; the
//! `coi-serviceworker` crate binds it to `web-sys`.

pub mod bundle;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod headers;
pub mod messages;
pub mod proxy;
pub mod runtime;

pub use config::CoiConfig;
pub use coordinator::{
    run, Coordinator, Effect, Event, RegistrationReport, ReloadReason, State, Terminal,
    MAX_RELOADS,
};
pub use errors::CoordinatorError;
pub use headers::{HeaderSet, ISOLATION_HEADERS};
pub use messages::WorkerMessage;
pub use proxy::{CacheMode, RequestDescriptor, RequestMode, ResponseHead};
pub use runtime::{Observation, PageRuntime, WorkerLifecycle};
