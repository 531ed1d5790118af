//! Lifecycle command execution.
//!
//! Every command follows the same two-step protocol: issue the native
//! request (producing a fresh operation handle) and await its resolution.
//! Commands against one system are serialized by the machine's command
//! gate, held across both steps; the host does not define
//! concurrent-command semantics on one system token.

use tracing::{debug, info, warn};

use super::VirtualMachine;
use super::state::MachineState;
use crate::errors::{VmboxError, VmboxResult};
use crate::host::{self, HostCommand};

/// States a command may be issued from. An empty slice means no
/// restriction.
fn allowed_from(command: HostCommand) -> &'static [MachineState] {
    use MachineState::*;
    match command {
        HostCommand::Start => &[Created],
        HostCommand::Shutdown => &[Running],
        HostCommand::Crash => &[Running],
        HostCommand::Pause => &[Running],
        HostCommand::Resume => &[Paused],
        HostCommand::Save => &[Running, Paused],
        HostCommand::Modify => &[Created, Running],
        HostCommand::Terminate | HostCommand::GetProperties => &[],
    }
}

/// State published while the operation is in flight, for commands with a
/// transitional phase.
fn transitional(command: HostCommand) -> Option<MachineState> {
    match command {
        HostCommand::Start => Some(MachineState::Starting),
        HostCommand::Shutdown => Some(MachineState::Stopping),
        HostCommand::Pause => Some(MachineState::Pausing),
        HostCommand::Resume => Some(MachineState::Resuming),
        HostCommand::Save => Some(MachineState::Saving),
        HostCommand::Terminate
        | HostCommand::Crash
        | HostCommand::Modify
        | HostCommand::GetProperties => None,
    }
}

/// State reached when the operation resolves successfully. `None` restores
/// the pre-command state.
fn on_success(command: HostCommand) -> Option<MachineState> {
    match command {
        HostCommand::Start | HostCommand::Resume => Some(MachineState::Running),
        HostCommand::Shutdown | HostCommand::Save => Some(MachineState::Stopped),
        HostCommand::Pause => Some(MachineState::Paused),
        HostCommand::Terminate => Some(MachineState::Terminated),
        HostCommand::Crash => Some(MachineState::Crashed),
        HostCommand::Modify | HostCommand::GetProperties => None,
    }
}

/// Whether a failure moves the machine to `Failed`. Read-only and
/// best-effort commands leave the pre-command state in place instead; the
/// caller decides whether to retry.
fn forces_failed(command: HostCommand) -> bool {
    matches!(
        command,
        HostCommand::Start
            | HostCommand::Shutdown
            | HostCommand::Pause
            | HostCommand::Resume
            | HostCommand::Save
    )
}

pub(super) async fn run_command(
    machine: &VirtualMachine,
    command: HostCommand,
    options: Option<&str>,
) -> VmboxResult<String> {
    let _gate = machine.command_gate.lock().await;

    let before = machine.state();

    // A terminated system stays terminated; repeating the request is not an
    // error and needs no host round trip.
    if command == HostCommand::Terminate && before == MachineState::Terminated {
        debug!(machine_id = %machine.id(), "already terminated");
        return Ok(String::new());
    }

    let allowed = allowed_from(command);
    if !allowed.is_empty() && !allowed.contains(&before) {
        return Err(VmboxError::InvalidState(format!(
            "cannot {command} a machine that is {before}"
        )));
    }

    if let Some(state) = transitional(command) {
        machine.set_state(state);
    }
    debug!(machine_id = %machine.id(), command = %command, from = %before, "issuing host command");

    let operation = match machine.issue(command, options).await {
        Ok(operation) => operation,
        Err(err) => {
            settle_failure(machine, command, before);
            warn!(machine_id = %machine.id(), command = %command, error = %err, "host rejected command");
            return Err(err);
        }
    };

    match host::await_result(operation).await {
        Ok(text) => {
            if let Some(state) = on_success(command) {
                machine.set_state(state);
                info!(machine_id = %machine.id(), command = %command, state = %state, "command completed");
            } else {
                machine.set_state(before);
                debug!(machine_id = %machine.id(), command = %command, "command completed");
            }
            Ok(text)
        }
        Err(err) => {
            settle_failure(machine, command, before);
            warn!(machine_id = %machine.id(), command = %command, error = %err, "command failed");
            Err(err)
        }
    }
}

fn settle_failure(machine: &VirtualMachine, command: HostCommand, before: MachineState) {
    if forces_failed(command) {
        machine.set_state(MachineState::Failed);
    } else {
        machine.set_state(before);
    }
}
