//! RAII ownership of native host-service tokens.
//!
//! Both handle types are move-only: no clones, one release path. Dropping a
//! handle closes its token; [`SystemHandle::into_raw`] and
//! [`OperationHandle::into_raw`] hand the token back to the caller without
//! closing it.

use std::sync::Arc;

use tracing::{debug, trace};

use super::{AccessRights, ComputeHost, OperationToken, SystemToken};

/// How a [`SystemHandle`] came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemOrigin {
    /// Created fresh from a configuration document.
    Created,
    /// Opened on an existing system, with the rights that were requested.
    Opened(AccessRights),
}

/// Owner of one compute-system token.
pub struct SystemHandle {
    host: Arc<dyn ComputeHost>,
    token: SystemToken,
    origin: SystemOrigin,
    released: bool,
}

impl SystemHandle {
    pub(crate) fn new(host: Arc<dyn ComputeHost>, token: SystemToken, origin: SystemOrigin) -> Self {
        Self {
            host,
            token,
            origin,
            released: false,
        }
    }

    /// Token to hand to the host service in commands.
    pub fn token(&self) -> SystemToken {
        self.token
    }

    pub fn origin(&self) -> SystemOrigin {
        self.origin
    }

    /// Give up ownership without closing the token.
    ///
    /// The caller becomes responsible for eventually closing it.
    pub fn into_raw(mut self) -> SystemToken {
        self.released = true;
        self.token
    }
}

impl Drop for SystemHandle {
    fn drop(&mut self) {
        if !self.released {
            self.host.close_system(self.token);
            debug!(system = self.token, "system token closed");
        }
    }
}

impl std::fmt::Debug for SystemHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemHandle")
            .field("token", &self.token)
            .field("origin", &self.origin)
            .finish()
    }
}

/// Owner of one in-flight operation token.
///
/// Consumed by value by [`await_result`](super::await_result); an operation
/// is resolved at most once.
pub struct OperationHandle {
    host: Arc<dyn ComputeHost>,
    token: OperationToken,
    released: bool,
}

impl OperationHandle {
    pub(crate) fn new(host: Arc<dyn ComputeHost>, token: OperationToken) -> Self {
        Self {
            host,
            token,
            released: false,
        }
    }

    pub fn token(&self) -> OperationToken {
        self.token
    }

    pub(crate) fn host(&self) -> &Arc<dyn ComputeHost> {
        &self.host
    }

    /// Give up ownership without closing the token.
    pub fn into_raw(mut self) -> OperationToken {
        self.released = true;
        self.token
    }
}

impl Drop for OperationHandle {
    fn drop(&mut self) {
        if !self.released {
            self.host.close_operation(self.token);
            trace!(operation = self.token, "operation token closed");
        }
    }
}

impl std::fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationHandle")
            .field("token", &self.token)
            .finish()
    }
}

// Handles move across task and thread boundaries (the waiter sends
// operation handles to the blocking pool).
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<SystemHandle>;
    let _ = assert_send_sync::<OperationHandle>;
};
