//! Scripted in-memory host used by unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

use super::{AccessRights, ComputeHost, HostCommand, OperationToken, SystemToken};
use crate::errors::{VmboxError, VmboxResult};

pub(crate) const E_SYSTEM_NOT_FOUND: i32 = 0x8037_0103u32 as i32;

/// Everything the host saw, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HostCall {
    Create { id: String },
    Open { id: String },
    Issue(HostCommand),
    WaitBegin(HostCommand),
    WaitEnd(HostCommand),
    CloseSystem(SystemToken),
    CloseOperation(OperationToken),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PowerState {
    Off,
    Running,
    Paused,
    Saved,
    Terminated,
    Crashed,
}

struct FakeSystem {
    power: PowerState,
    runtime_id: Uuid,
}

struct PendingOperation {
    system_id: String,
    command: HostCommand,
    delay: Duration,
}

#[derive(Default)]
struct Inner {
    next_token: u64,
    systems: HashMap<String, FakeSystem>,
    tokens: HashMap<SystemToken, String>,
    operations: HashMap<OperationToken, PendingOperation>,
    configurations: HashMap<String, String>,
    journal: Vec<HostCall>,
    issued_operations: Vec<OperationToken>,
    last_options: HashMap<HostCommand, Option<String>>,
    delays: HashMap<HostCommand, Duration>,
    issue_delays: HashMap<HostCommand, Duration>,
    create_delay: Duration,
    wait_failures: HashMap<HostCommand, (i32, Option<String>)>,
    issue_failures: HashMap<HostCommand, i32>,
    create_failure: Option<i32>,
    refuse_allocations: bool,
}

impl Inner {
    fn allocate_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn apply(&mut self, pending: &PendingOperation) -> VmboxResult<String> {
        let Some(system) = self.systems.get_mut(&pending.system_id) else {
            return Err(VmboxError::host(E_SYSTEM_NOT_FOUND, None));
        };
        match pending.command {
            HostCommand::Start | HostCommand::Resume => {
                system.power = PowerState::Running;
                Ok(String::new())
            }
            HostCommand::Shutdown => {
                system.power = PowerState::Off;
                Ok(String::new())
            }
            HostCommand::Terminate => {
                system.power = PowerState::Terminated;
                Ok(String::new())
            }
            HostCommand::Crash => {
                system.power = PowerState::Crashed;
                Ok(String::new())
            }
            HostCommand::Pause => {
                system.power = PowerState::Paused;
                Ok(String::new())
            }
            HostCommand::Save => {
                system.power = PowerState::Saved;
                Ok(String::new())
            }
            HostCommand::Modify => Ok(String::new()),
            HostCommand::GetProperties => {
                // Identity is only reported once the guest is executing.
                if matches!(system.power, PowerState::Running | PowerState::Paused) {
                    let doc = serde_json::json!({ "RuntimeId": system.runtime_id.to_string() });
                    Ok(doc.to_string())
                } else {
                    Ok("{}".to_string())
                }
            }
        }
    }
}

/// In-memory [`ComputeHost`] with scripted failures, per-command wait
/// delays, a call journal, and a minimal power model.
pub(crate) struct FakeHost {
    inner: Mutex<Inner>,
}

impl FakeHost {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
        })
    }

    // ========================================================================
    // Scripting
    // ========================================================================

    pub(crate) fn delay_wait(&self, command: HostCommand, delay: Duration) {
        self.inner.lock().delays.insert(command, delay);
    }

    pub(crate) fn delay_issue(&self, command: HostCommand, delay: Duration) {
        self.inner.lock().issue_delays.insert(command, delay);
    }

    pub(crate) fn delay_create(&self, delay: Duration) {
        self.inner.lock().create_delay = delay;
    }

    pub(crate) fn fail_wait(&self, command: HostCommand, code: i32, partial: Option<&str>) {
        self.inner
            .lock()
            .wait_failures
            .insert(command, (code, partial.map(str::to_string)));
    }

    pub(crate) fn fail_issue(&self, command: HostCommand, code: i32) {
        self.inner.lock().issue_failures.insert(command, code);
    }

    pub(crate) fn fail_create(&self, code: i32) {
        self.inner.lock().create_failure = Some(code);
    }

    pub(crate) fn refuse_allocations(&self) {
        self.inner.lock().refuse_allocations = true;
    }

    /// Seed an existing system so `open_system` can find it.
    pub(crate) fn preregister(&self, id: &str) {
        self.inner.lock().systems.insert(
            id.to_string(),
            FakeSystem {
                power: PowerState::Off,
                runtime_id: Uuid::new_v4(),
            },
        );
    }

    // ========================================================================
    // Assertions
    // ========================================================================

    /// Issue/wait entries only, for command-ordering assertions.
    pub(crate) fn command_trace(&self) -> Vec<HostCall> {
        self.inner
            .lock()
            .journal
            .iter()
            .filter(|call| {
                matches!(
                    call,
                    HostCall::Issue(_) | HostCall::WaitBegin(_) | HostCall::WaitEnd(_)
                )
            })
            .cloned()
            .collect()
    }

    pub(crate) fn has_issued(&self, command: HostCommand) -> bool {
        self.inner
            .lock()
            .journal
            .iter()
            .any(|call| *call == HostCall::Issue(command))
    }

    pub(crate) fn issue_count(&self, command: HostCommand) -> usize {
        self.inner
            .lock()
            .journal
            .iter()
            .filter(|call| **call == HostCall::Issue(command))
            .count()
    }

    pub(crate) fn system_close_count(&self) -> usize {
        self.inner
            .lock()
            .journal
            .iter()
            .filter(|call| matches!(call, HostCall::CloseSystem(_)))
            .count()
    }

    pub(crate) fn operation_close_count(&self, operation: OperationToken) -> usize {
        self.inner
            .lock()
            .journal
            .iter()
            .filter(|call| **call == HostCall::CloseOperation(operation))
            .count()
    }

    /// Every operation token ever issued.
    pub(crate) fn issued_operations(&self) -> Vec<OperationToken> {
        self.inner.lock().issued_operations.clone()
    }

    pub(crate) fn power_of(&self, id: &str) -> Option<PowerState> {
        self.inner.lock().systems.get(id).map(|system| system.power)
    }

    pub(crate) fn runtime_id_of(&self, id: &str) -> Option<Uuid> {
        self.inner
            .lock()
            .systems
            .get(id)
            .map(|system| system.runtime_id)
    }

    pub(crate) fn configuration_of(&self, id: &str) -> Option<String> {
        self.inner.lock().configurations.get(id).cloned()
    }

    /// Options text the most recent `command` was issued with.
    pub(crate) fn options_for(&self, command: HostCommand) -> Option<Option<String>> {
        self.inner.lock().last_options.get(&command).cloned()
    }
}

impl ComputeHost for FakeHost {
    fn create_system(&self, id: &str, configuration: &str) -> VmboxResult<SystemToken> {
        let delay = self.inner.lock().create_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let mut inner = self.inner.lock();
        inner.journal.push(HostCall::Create { id: id.to_string() });
        if inner.refuse_allocations {
            return Err(VmboxError::ResourceExhausted(
                "no host tokens left".to_string(),
            ));
        }
        if let Some(code) = inner.create_failure {
            return Err(VmboxError::host(code, None));
        }
        if let Err(e) = serde_json::from_str::<serde_json::Value>(configuration) {
            return Err(VmboxError::host(-1, Some(e.to_string())));
        }
        inner
            .configurations
            .insert(id.to_string(), configuration.to_string());
        inner.systems.insert(
            id.to_string(),
            FakeSystem {
                power: PowerState::Off,
                runtime_id: Uuid::new_v4(),
            },
        );
        let token = inner.allocate_token();
        inner.tokens.insert(token, id.to_string());
        Ok(token)
    }

    fn open_system(&self, id: &str, _access: AccessRights) -> VmboxResult<SystemToken> {
        let mut inner = self.inner.lock();
        inner.journal.push(HostCall::Open { id: id.to_string() });
        if inner.refuse_allocations {
            return Err(VmboxError::ResourceExhausted(
                "no host tokens left".to_string(),
            ));
        }
        if !inner.systems.contains_key(id) {
            return Err(VmboxError::host(E_SYSTEM_NOT_FOUND, None));
        }
        let token = inner.allocate_token();
        inner.tokens.insert(token, id.to_string());
        Ok(token)
    }

    fn issue_command(
        &self,
        system: SystemToken,
        command: HostCommand,
        options: Option<&str>,
    ) -> VmboxResult<OperationToken> {
        let delay = self
            .inner
            .lock()
            .issue_delays
            .get(&command)
            .copied()
            .unwrap_or(Duration::ZERO);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let mut inner = self.inner.lock();
        inner.journal.push(HostCall::Issue(command));
        inner
            .last_options
            .insert(command, options.map(str::to_string));
        if inner.refuse_allocations {
            return Err(VmboxError::ResourceExhausted(
                "no host tokens left".to_string(),
            ));
        }
        if let Some(code) = inner.issue_failures.get(&command) {
            return Err(VmboxError::host(*code, None));
        }
        let Some(system_id) = inner.tokens.get(&system).cloned() else {
            return Err(VmboxError::host(E_SYSTEM_NOT_FOUND, None));
        };
        let delay = inner.delays.get(&command).copied().unwrap_or(Duration::ZERO);
        let token = inner.allocate_token();
        inner.issued_operations.push(token);
        inner.operations.insert(
            token,
            PendingOperation {
                system_id,
                command,
                delay,
            },
        );
        Ok(token)
    }

    fn wait_operation(&self, operation: OperationToken) -> VmboxResult<String> {
        let (pending, failure) = {
            let mut inner = self.inner.lock();
            let Some(pending) = inner.operations.remove(&operation) else {
                return Err(VmboxError::host(E_SYSTEM_NOT_FOUND, None));
            };
            inner.journal.push(HostCall::WaitBegin(pending.command));
            let failure = inner.wait_failures.get(&pending.command).cloned();
            (pending, failure)
        };

        // Simulated host latency; runs outside the lock like a real wait.
        if !pending.delay.is_zero() {
            std::thread::sleep(pending.delay);
        }

        let mut inner = self.inner.lock();
        inner.journal.push(HostCall::WaitEnd(pending.command));
        if let Some((code, partial)) = failure {
            return Err(VmboxError::host(code, partial));
        }
        inner.apply(&pending)
    }

    fn close_system(&self, system: SystemToken) {
        let mut inner = self.inner.lock();
        inner.journal.push(HostCall::CloseSystem(system));
        inner.tokens.remove(&system);
    }

    fn close_operation(&self, operation: OperationToken) {
        let mut inner = self.inner.lock();
        inner.journal.push(HostCall::CloseOperation(operation));
        inner.operations.remove(&operation);
    }
}
