//! Machine lifecycle states.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`VirtualMachine`](super::VirtualMachine).
///
/// Transitional states (`Starting`, `Stopping`, ...) are published while
/// the corresponding host operation is in flight; because commands are
/// serialized, a caller holding the command gate always observes a settled
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    /// No system token exists. Never observed through a built controller;
    /// construction completes the transition out of it.
    Unconfigured,
    /// Defined at the host, not yet started.
    Created,
    Starting,
    Running,
    Pausing,
    Paused,
    Resuming,
    Saving,
    Stopping,
    Stopped,
    /// Forcefully terminated, by request or by the host.
    Terminated,
    /// Stopped through an induced guest crash.
    Crashed,
    /// A state-advancing command failed. Terminate and query remain
    /// available.
    Failed,
}

impl MachineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Unconfigured => "unconfigured",
            MachineState::Created => "created",
            MachineState::Starting => "starting",
            MachineState::Running => "running",
            MachineState::Pausing => "pausing",
            MachineState::Paused => "paused",
            MachineState::Resuming => "resuming",
            MachineState::Saving => "saving",
            MachineState::Stopping => "stopping",
            MachineState::Stopped => "stopped",
            MachineState::Terminated => "terminated",
            MachineState::Crashed => "crashed",
            MachineState::Failed => "failed",
        }
    }

    /// Terminal states: no state-advancing command can leave them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MachineState::Stopped
                | MachineState::Terminated
                | MachineState::Crashed
                | MachineState::Failed
        )
    }

    /// Whether the guest is executing.
    pub fn is_running(&self) -> bool {
        matches!(self, MachineState::Running)
    }

    /// Whether a host operation for this machine is in flight.
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            MachineState::Starting
                | MachineState::Pausing
                | MachineState::Resuming
                | MachineState::Saving
                | MachineState::Stopping
        )
    }
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
