//! Server error types.
//!
//! Every subsystem has its own error enum; [`ServerError`] rolls them up for
//! the orchestration boundary, which is the only place that decides whether a
//! failure is fatal.

use crate::config::ConfigError;
use crate::lifecycle::LifecycleError;
use crate::lists::ListError;
use crate::net::{BindError, BindFailure};
use crate::persistence::PersistenceError;
use crate::plugins::PluginError;
use crate::session::RegistryError;
use crate::world::WorldError;

/// Exit code used for every fatal startup failure.
pub const STARTUP_FAILURE_EXIT_CODE: i32 = 1;

/// Top-level error raised by the lifecycle orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Bind error: {0}")]
    Bind(#[from] BindError),

    #[error("World error: {0}")]
    World(#[from] WorldError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Persisted list error: {0}")]
    Lists(#[from] ListError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Process exit code for this error when it aborts startup.
    pub fn exit_code(&self) -> i32 {
        STARTUP_FAILURE_EXIT_CODE
    }

    /// Bind classification, if this error came from binding the primary service.
    pub fn bind_failure(&self) -> Option<BindFailure> {
        match self {
            ServerError::Bind(e) => Some(e.failure),
            _ => None,
        }
    }

    /// Human-readable lines explaining a startup failure.
    ///
    /// Bind failures get an actionable diagnosis; everything else is reported
    /// as a general startup error.
    pub fn diagnosis(&self) -> Vec<String> {
        match self {
            ServerError::Bind(e) => e.diagnosis(),
            other => vec![format!("Error during server startup: {other}")],
        }
    }
}
