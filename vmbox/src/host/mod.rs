//! Host virtualization service boundary.
//!
//! Everything the control plane asks of the host service flows through the
//! [`ComputeHost`] trait: creating or opening compute systems, issuing
//! lifecycle commands, waiting for operation completion, and releasing
//! tokens. The trait is blocking, modeling the synchronous native API
//! underneath; async callers move the calls onto a blocking-capable
//! context ([`await_result`] does this for operation waits).
//!
//! ## Architecture
//!
//! - [`SystemHandle`] / [`OperationHandle`] own the host's opaque tokens
//!   with move-only semantics and a single release path.
//! - [`await_result`] resolves one operation exactly once and closes its
//!   token afterwards, success or failure.
//! - [`hcs::HcsHost`] (Windows only) implements the trait over the
//!   platform's Host Compute System API; other platforms supply their own
//!   implementation or a test double.

mod handle;
mod waiter;

#[cfg(test)]
pub(crate) mod fake;

#[cfg(windows)]
pub mod hcs;

pub use handle::{OperationHandle, SystemHandle, SystemOrigin};
pub use waiter::await_result;

use crate::errors::VmboxResult;

/// Opaque token identifying one compute system inside the host service.
pub type SystemToken = u64;

/// Opaque token identifying one in-flight asynchronous host request.
pub type OperationToken = u64;

/// Access rights requested when opening an existing compute system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRights(u32);

impl AccessRights {
    /// Full access to the compute system.
    pub const ALL: AccessRights = AccessRights(0x1000_0000);

    /// Raw access mask handed to the host service.
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl Default for AccessRights {
    fn default() -> Self {
        AccessRights::ALL
    }
}

/// Lifecycle commands understood by the host service.
///
/// Creating or opening a system is not a command; that is how a system
/// token comes to exist in the first place (see
/// [`ComputeHost::create_system`] and [`ComputeHost::open_system`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostCommand {
    Start,
    Shutdown,
    Terminate,
    Crash,
    Pause,
    Resume,
    Save,
    Modify,
    GetProperties,
}

impl HostCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            HostCommand::Start => "start",
            HostCommand::Shutdown => "shutdown",
            HostCommand::Terminate => "terminate",
            HostCommand::Crash => "crash",
            HostCommand::Pause => "pause",
            HostCommand::Resume => "resume",
            HostCommand::Save => "save",
            HostCommand::Modify => "modify",
            HostCommand::GetProperties => "get-properties",
        }
    }
}

impl std::fmt::Display for HostCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Blocking interface to the host virtualization service.
///
/// Implementations are shared behind `Arc<dyn ComputeHost>` and must be safe
/// to call from any thread. Every method may block the calling thread until
/// the host responds; async code wraps calls in `spawn_blocking` (the
/// controller and [`await_result`] already do).
pub trait ComputeHost: Send + Sync {
    /// Create a new compute system from a configuration document.
    ///
    /// Returns the system token once the host has fully materialized the
    /// system. Fails with [`ResourceExhausted`] when the host cannot
    /// allocate a native token, or [`Host`] when it rejects the
    /// configuration.
    ///
    /// [`ResourceExhausted`]: crate::VmboxError::ResourceExhausted
    /// [`Host`]: crate::VmboxError::Host
    fn create_system(&self, id: &str, configuration: &str) -> VmboxResult<SystemToken>;

    /// Attach to an existing compute system by identity.
    fn open_system(&self, id: &str, access: AccessRights) -> VmboxResult<SystemToken>;

    /// Issue a lifecycle command against a system, producing a fresh
    /// operation token.
    ///
    /// `options` of `None` selects host defaults. The returned token must be
    /// resolved through [`ComputeHost::wait_operation`] exactly once and
    /// closed afterwards; [`await_result`] handles both.
    fn issue_command(
        &self,
        system: SystemToken,
        command: HostCommand,
        options: Option<&str>,
    ) -> VmboxResult<OperationToken>;

    /// Block until the operation completes and return its result text.
    ///
    /// Result text may be empty. Failures carry the host status code and
    /// any partial result text attached to the failure.
    fn wait_operation(&self, operation: OperationToken) -> VmboxResult<String>;

    /// Release a system token. Never fails from the caller's viewpoint.
    fn close_system(&self, system: SystemToken);

    /// Release an operation token. Never fails from the caller's viewpoint.
    fn close_operation(&self, operation: OperationToken);
}
