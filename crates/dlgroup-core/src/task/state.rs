//! Lifecycle phase and run state of a task.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    ShutdownSignal,
    UserRequest,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::ShutdownSignal => f.write_str("shutdown signal"),
            HaltReason::UserRequest => f.write_str("user request"),
        }
    }
}

/// Halt, force-halt and pause collapsed into one value so contradictory
/// combinations cannot be represented. A force halt implies a halt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Running,
    /// Keep all state for a later resume; no new commands.
    Paused,
    /// Let outstanding commands drain, then stop.
    Halting(HaltReason),
    /// Release resources before the next scheduler tick.
    ForceHalting(HaltReason),
}

impl RunState {
    pub fn halt_reason(self) -> Option<HaltReason> {
        match self {
            RunState::Halting(r) | RunState::ForceHalting(r) => Some(r),
            RunState::Running | RunState::Paused => None,
        }
    }
}

/// `Created → Initializing → Active → Finishing → Done`. A failure or halt
/// moves the task straight to `Done` once the directory finalizes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskPhase {
    #[default]
    Created,
    Initializing,
    Active,
    Finishing,
    Done,
}
