//! The page-side collaborator the coordinator drives. The browser binding
//! implements it over `navigator.serviceWorker`; tests use in-memory fakes.

use serde::{Deserialize, Serialize};

use crate::errors::CoordinatorError;

/// Lifecycle of the worker attached to a registration, as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerLifecycle {
    Installing,
    Waiting,
    Activating,
    Active,
    Redundant,
    /// The registration exposes no worker object at all.
    Absent,
}

/// Snapshot of the page taken when the coordinator starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observation {
    pub registration_supported: bool,
    pub shared_memory: bool,
    pub cross_origin_isolated: bool,
    /// The page asked its worker to deregister earlier in this session.
    pub deregistered: bool,
}

impl Observation {
    pub fn is_isolated(&self) -> bool {
        self.shared_memory && self.cross_origin_isolated
    }
}

#[allow(async_fn_in_trait)]
pub trait PageRuntime {
    type Registration;

    fn observe(&self) -> Observation;

    fn has_controller(&self) -> bool;

    fn shared_memory_available(&self) -> bool;

    async fn register(
        &self,
        script_url: &str,
        scope: &str,
    ) -> Result<Self::Registration, CoordinatorError>;

    fn lifecycle(&self, registration: &Self::Registration) -> WorkerLifecycle;

    /// Resolves once the registration's worker settles as `Active` or
    /// `Redundant`, or with `Absent` when there is no worker to wait on.
    /// Never times out.
    async fn wait_for_activation(
        &self,
        registration: &Self::Registration,
    ) -> Result<WorkerLifecycle, CoordinatorError>;

    fn reload(&self) -> Result<(), CoordinatorError>;

    /// Reloads this coordinator has triggered in the current browsing session.
    fn reloads_issued(&self) -> u32;

    fn record_reload(&self);

    fn clear_reloads(&self);

    fn info(&self, message: &str);

    fn error(&self, message: &str);
}
