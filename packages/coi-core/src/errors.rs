use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("Service workers are not supported in this browser")]
    Unsupported,
    #[error("Service worker registration failed: {0}")]
    RegistrationFailed(String),
    #[error("Service worker failed to activate: {0}")]
    ActivationFailed(String),
    #[error("Page reload failed: {0}")]
    ReloadFailed(String),
    #[error("Reload limit of {limit} reached; cross-origin isolation is unavailable")]
    ReloadLimit { limit: u32 },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
