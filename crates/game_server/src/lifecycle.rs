//! Server lifecycle state machine.

use std::fmt;
use std::sync::Mutex;

/// The coarse state of a server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Created,
    Configuring,
    Starting,
    Bound,
    Running,
    ShuttingDown,
    Terminated,
}

impl LifecycleState {
    /// Whether `self -> to` is a legal transition.
    pub fn can_transition_to(self, to: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, to) {
            (ShuttingDown | Terminated, ShuttingDown) => false,
            (_, ShuttingDown) => true,
            (ShuttingDown, Terminated) => true,
            (Created, Configuring) => true,
            (Configuring, Starting) => true,
            (Starting, Bound) => true,
            (Bound, Running) => true,
            // in-place reload
            (Running, Configuring) => true,
            (Configuring, Running) => true,
            _ => false,
        }
    }

    pub fn is_shutting_down(self) -> bool {
        matches!(self, LifecycleState::ShuttingDown | LifecycleState::Terminated)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Created => "created",
            LifecycleState::Configuring => "configuring",
            LifecycleState::Starting => "starting",
            LifecycleState::Bound => "bound",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting down",
            LifecycleState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("invalid lifecycle transition from {from} to {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },
}

/// Shared lifecycle cell for one server instance.
///
/// The reload path needs `Running -> Configuring -> Running`, which a plain
/// atomic compare-exchange can express, but the error needs the observed
/// state, so a short-held mutex is simpler.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<LifecycleState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LifecycleState::Created),
        }
    }

    pub fn current(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Moves to `to`, returning the previous state.
    pub fn transition(&self, to: LifecycleState) -> Result<LifecycleState, LifecycleError> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let from = *state;
        if !from.can_transition_to(to) {
            return Err(LifecycleError::InvalidTransition { from, to });
        }
        *state = to;
        Ok(from)
    }

    /// Moves to `to` only when the current state is `expected`.
    pub fn transition_from(
        &self,
        expected: LifecycleState,
        to: LifecycleState,
    ) -> Result<(), LifecycleError> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if *state != expected || !expected.can_transition_to(to) {
            return Err(LifecycleError::InvalidTransition { from: *state, to });
        }
        *state = to;
        Ok(())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
