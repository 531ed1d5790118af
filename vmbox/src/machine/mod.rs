//! Per-machine lifecycle controller.
//!
//! [`VirtualMachine`] owns the system token for one compute system and
//! drives every lifecycle command against it: start, shutdown, terminate,
//! crash, pause, resume, save, modify, query. Commands are serialized: an
//! internal gate is held across issue + await, so two callers can never
//! interleave operations on one system token.
//!
//! ## Architecture
//!
//! ```text
//! caller ──► VirtualMachine ──► ComputeHost::issue_command ──► OperationHandle
//!                 │                                                  │
//!                 │  watch::Sender<MachineState>                     ▼
//!                 └─────────► subscribers              host::await_result
//! ```
//!
//! The controller never touches the display transport; it only produces the
//! runtime identity that [`ConsoleSupervisor`](crate::console::ConsoleSupervisor)
//! uses to address the console session.

mod lifecycle;
mod state;

pub use state::MachineState;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::errors::{VmboxError, VmboxResult};
use crate::host::{
    AccessRights, ComputeHost, HostCommand, OperationHandle, SystemHandle, SystemOrigin,
};
use crate::schema::{MachineDocument, ModifyRequest, PropertyMap, PropertyQuery};

/// Point-in-time snapshot of a controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineInfo {
    pub id: String,
    pub state: MachineState,
    pub created_at: DateTime<Utc>,
    pub runtime_id: Option<Uuid>,
}

/// Lifecycle controller for one compute system.
///
/// Constructed with [`VirtualMachine::create`] (define a new system from a
/// configuration document) or [`VirtualMachine::open`] (attach to an
/// existing one). Dropping the controller closes the system token; if the
/// configuration set `should_terminate_on_last_handle_closed`, the host
/// reaps the machine when that happens.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use vmbox::{ComputeHost, MachineDocument, VirtualMachine, VmboxResult};
///
/// async fn boot(host: Arc<dyn ComputeHost>) -> VmboxResult<()> {
///     let mut document = MachineDocument::new("demo");
///     document.virtual_machine.compute_topology.processor.count = 2;
///     document.virtual_machine.compute_topology.memory.size_in_mb = 2048;
///
///     let machine = VirtualMachine::create(host, "demo", &document).await?;
///     machine.start().await?;
///     let runtime_id = machine.runtime_id().await?;
///     println!("console target: {runtime_id}");
///     Ok(())
/// }
/// ```
pub struct VirtualMachine {
    id: String,
    host: Arc<dyn ComputeHost>,
    system: SystemHandle,
    state_tx: watch::Sender<MachineState>,
    command_gate: tokio::sync::Mutex<()>,
    runtime_id: RwLock<Option<Uuid>>,
    created_at: DateTime<Utc>,
}

// Controllers cross task boundaries behind an Arc.
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<VirtualMachine>;
};

impl VirtualMachine {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Create a new compute system from a configuration document.
    ///
    /// The host call runs on the blocking pool; the returned controller is
    /// in `Created` state. Fails with
    /// [`ResourceExhausted`](VmboxError::ResourceExhausted) when the host
    /// cannot allocate a token and [`Host`](VmboxError::Host) when it
    /// rejects the configuration.
    pub async fn create(
        host: Arc<dyn ComputeHost>,
        id: impl Into<String>,
        document: &MachineDocument,
    ) -> VmboxResult<Self> {
        let id = id.into();
        let configuration = document.encode()?;
        let system = {
            let host = Arc::clone(&host);
            let id = id.clone();
            // The handle is built inside the blocking task: a caller that
            // drops this future (timeout races) leaves the discarded join
            // result to close the token.
            tokio::task::spawn_blocking(move || -> VmboxResult<SystemHandle> {
                let token = host.create_system(&id, &configuration)?;
                Ok(SystemHandle::new(host, token, SystemOrigin::Created))
            })
            .await
            .map_err(|e| VmboxError::Internal(format!("create task failed: {e}")))??
        };
        info!(machine_id = %id, system = system.token(), "compute system created");
        Ok(Self::attach(host, id, system))
    }

    /// Attach to an existing compute system by identity.
    pub async fn open(
        host: Arc<dyn ComputeHost>,
        id: impl Into<String>,
        access: AccessRights,
    ) -> VmboxResult<Self> {
        let id = id.into();
        let system = {
            let host = Arc::clone(&host);
            let id = id.clone();
            tokio::task::spawn_blocking(move || -> VmboxResult<SystemHandle> {
                let token = host.open_system(&id, access)?;
                Ok(SystemHandle::new(host, token, SystemOrigin::Opened(access)))
            })
            .await
            .map_err(|e| VmboxError::Internal(format!("open task failed: {e}")))??
        };
        info!(machine_id = %id, system = system.token(), "compute system opened");
        Ok(Self::attach(host, id, system))
    }

    fn attach(host: Arc<dyn ComputeHost>, id: String, system: SystemHandle) -> Self {
        let (state_tx, _) = watch::channel(MachineState::Created);
        Self {
            id,
            host,
            system,
            state_tx,
            command_gate: tokio::sync::Mutex::new(()),
            runtime_id: RwLock::new(None),
            created_at: Utc::now(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> MachineState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions without touching the system token.
    pub fn subscribe(&self) -> watch::Receiver<MachineState> {
        self.state_tx.subscribe()
    }

    pub fn origin(&self) -> SystemOrigin {
        self.system.origin()
    }

    pub fn info(&self) -> MachineInfo {
        MachineInfo {
            id: self.id.clone(),
            state: self.state(),
            created_at: self.created_at,
            runtime_id: *self.runtime_id.read(),
        }
    }

    // ========================================================================
    // Lifecycle commands
    // ========================================================================

    /// Boot the machine. Valid from `Created`; on success the machine is
    /// `Running`.
    pub async fn start(&self) -> VmboxResult<()> {
        lifecycle::run_command(self, HostCommand::Start, None).await?;
        Ok(())
    }

    /// Ask the guest to shut down gracefully. Valid from `Running`; the
    /// host rejects the request if the guest is unresponsive.
    pub async fn shutdown(&self) -> VmboxResult<()> {
        lifecycle::run_command(self, HostCommand::Shutdown, None).await?;
        Ok(())
    }

    /// Force the machine off. Always safe to attempt, from any state and
    /// after any prior failure; repeating it on a terminated machine
    /// succeeds without a host round trip.
    pub async fn terminate(&self) -> VmboxResult<()> {
        lifecycle::run_command(self, HostCommand::Terminate, None).await?;
        Ok(())
    }

    /// Induce a guest crash. `options` of `None` selects the host's default
    /// dump behavior.
    pub async fn crash(&self, options: Option<&str>) -> VmboxResult<()> {
        lifecycle::run_command(self, HostCommand::Crash, options).await?;
        Ok(())
    }

    pub async fn pause(&self, options: Option<&str>) -> VmboxResult<()> {
        lifecycle::run_command(self, HostCommand::Pause, options).await?;
        Ok(())
    }

    pub async fn resume(&self) -> VmboxResult<()> {
        lifecycle::run_command(self, HostCommand::Resume, None).await?;
        Ok(())
    }

    /// Save the machine's state. Valid from `Running` or `Paused`; on
    /// success the machine is `Stopped`.
    pub async fn save(&self, options: Option<&str>) -> VmboxResult<()> {
        lifecycle::run_command(self, HostCommand::Save, options).await?;
        Ok(())
    }

    /// Apply a partial configuration delta to the defined or live system.
    /// The machine state is unchanged.
    pub async fn modify(&self, request: &ModifyRequest) -> VmboxResult<()> {
        let settings = request.encode()?;
        lifecycle::run_command(self, HostCommand::Modify, Some(&settings)).await?;
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Read properties from the host. Read-only: valid in every state, and
    /// the machine state is unchanged regardless of outcome.
    pub async fn query(&self, query: &PropertyQuery) -> VmboxResult<PropertyMap> {
        let options = query.encode()?;
        let text =
            lifecycle::run_command(self, HostCommand::GetProperties, Some(&options)).await?;
        PropertyMap::parse(&text)
    }

    /// Runtime identity of the running machine, fetched once and cached.
    ///
    /// The host only assigns the identity once the guest is executing; a
    /// machine that has not reached `Running` yields
    /// [`MalformedResult`](VmboxError::MalformedResult) (empty property
    /// set) or a [`Host`](VmboxError::Host) error.
    pub async fn runtime_id(&self) -> VmboxResult<Uuid> {
        if let Some(cached) = *self.runtime_id.read() {
            return Ok(cached);
        }
        let properties = self.query(&PropertyQuery::runtime_id()).await?;
        let id = properties.runtime_id()?;
        *self.runtime_id.write() = Some(id);
        Ok(id)
    }

    // ========================================================================
    // Internal
    // ========================================================================

    /// Issue a command on the blocking pool, same as the constructors. The
    /// operation handle is built inside the blocking task so an abandoned
    /// future cannot leak the token.
    async fn issue(
        &self,
        command: HostCommand,
        options: Option<&str>,
    ) -> VmboxResult<OperationHandle> {
        let host = Arc::clone(&self.host);
        let system = self.system.token();
        let options = options.map(str::to_string);
        tokio::task::spawn_blocking(move || -> VmboxResult<OperationHandle> {
            let token = host.issue_command(system, command, options.as_deref())?;
            Ok(OperationHandle::new(host, token))
        })
        .await
        .map_err(|e| VmboxError::Internal(format!("issue task failed: {e}")))?
    }

    fn set_state(&self, state: MachineState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

impl std::fmt::Debug for VirtualMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualMachine")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
