//! Lifecycle state of the download manager

use std::fmt;

/// `Stopped -> Running -> Stopping -> Stopped`. Only the manager moves between
/// states; every other component is passive with respect to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModuleState {
    /// No workers are running; URLs may still be enqueued for a later start
    #[default]
    Stopped,

    /// Workers are taking and downloading URLs
    Running,

    /// Workers are being cancelled or drained; new URLs are refused
    Stopping,
}

impl ModuleState {
    /// Returns true if new URLs may be accepted in this state
    pub fn accepts_urls(&self) -> bool {
        !matches!(self, Self::Stopping)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
