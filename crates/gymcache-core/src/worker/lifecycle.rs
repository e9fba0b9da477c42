use serde::{Deserialize, Serialize};

/// Worker lifecycle states.
///
/// `Installing -> Waiting -> Active`. Installation always skips the
/// waiting period, so a `Waiting` worker may activate right away.
/// A failed install leaves the worker `Redundant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    Installing,
    Waiting,
    Active,
    Redundant,
}

impl WorkerState {
    /// Only an active worker intercepts fetches and reports on them.
    pub fn controls_clients(&self) -> bool {
        matches!(self, WorkerState::Active)
    }

    pub fn can_activate(&self) -> bool {
        matches!(self, WorkerState::Waiting)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Waiting => write!(f, "waiting"),
            WorkerState::Active => write!(f, "active"),
            WorkerState::Redundant => write!(f, "redundant"),
        }
    }
}
