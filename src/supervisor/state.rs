/// Pool state definitions for the worker supervisor
use std::fmt;

/// Current state of the worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolState {
    /// Resources within limits; missing workers are spawned each tick
    Running,

    /// Resource pressure; no worker is spawned until a sample is within limits
    Paused,

    // ===== Terminal State =====
    /// A stop was requested; every worker is being stopped
    ShuttingDown,
}

impl PoolState {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ShuttingDown)
    }

    /// Returns true if workers may be spawned in this state
    pub fn can_spawn(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Next state after a resource sample
    ///
    /// `ShuttingDown` absorbs every sample.
    pub fn after_sample(self, within_limits: bool) -> Self {
        match (self, within_limits) {
            (Self::ShuttingDown, _) => Self::ShuttingDown,
            (_, true) => Self::Running,
            (_, false) => Self::Paused,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
