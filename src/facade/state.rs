use std::fmt;

/// Readiness of the storage container behind a manager.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ContainerState {
    /// `initialize` has not run yet
    #[default]
    Uninitialized,
    Ready,
    /// Loading failed; holds the reason. `initialize` may be retried.
    Unavailable(String),
}

impl ContainerState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ContainerState::Ready)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerState::Uninitialized => write!(f, "uninitialized"),
            ContainerState::Ready => write!(f, "ready"),
            ContainerState::Unavailable(reason) => write!(f, "unavailable: {}", reason),
        }
    }
}

/// Result of a single-record update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A match was mutated and committed
    Updated,
    /// A match was found but the mutation changed nothing
    Unchanged,
    NotFound,
}

impl UpdateOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, UpdateOutcome::Updated)
    }
}
