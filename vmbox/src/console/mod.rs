//! Console display session supervision.
//!
//! A running machine exposes its console through a remote-display service on
//! the local host. This module owns everything about that session except the
//! transport itself:
//!
//! - [`DisplayTransport`] is the seam a concrete display client implements.
//! - [`ConnectParams`] and [`SecurityOptions`] carry the connection
//!   configuration, with [`ConnectParams::for_runtime_id`] producing the
//!   local console service defaults for a machine's runtime identity.
//! - [`ConsoleSupervisor`] drives the session: it reconnects with unchanged
//!   parameters whenever the transport drops, and forwards window geometry
//!   to the transport only while the session is connected.
//!
//! Transports report link changes by pushing [`TransportEvent`]s into the
//! supervisor's event channel.

pub mod geometry;
mod supervisor;

pub use geometry::{DisplayGeometry, Orientation};
pub use supervisor::{ConsoleSupervisor, SessionState};

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::VmboxResult;

/// Console sessions always target the local host.
pub const CONSOLE_SERVER: &str = "localhost";

/// Port of the host's virtual console service.
pub const CONSOLE_PORT: u16 = 2179;

/// Authentication service class the console service negotiates.
pub const CONSOLE_AUTH_SERVICE: &str = "Microsoft Virtual Console Service";

/// Default floor between input batches sent to the transport.
pub const DEFAULT_MIN_INPUT_INTERVAL: Duration = Duration::from_millis(20);

/// Security negotiation settings for the console session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityOptions {
    pub auth_service_class: String,
    pub auth_level: u32,
    pub enable_credssp: bool,
    pub negotiate_security_layer: bool,
    pub allow_credential_delegation: bool,
}

impl Default for SecurityOptions {
    fn default() -> Self {
        Self {
            auth_service_class: CONSOLE_AUTH_SERVICE.to_string(),
            auth_level: 0,
            enable_credssp: true,
            negotiate_security_layer: false,
            allow_credential_delegation: false,
        }
    }
}

/// Everything a transport needs to establish one console session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub server: String,
    pub port: u16,
    /// Identity token addressing one machine's console channel.
    pub target_id: String,
    pub security: SecurityOptions,
    pub min_input_interval: Duration,
}

impl ConnectParams {
    /// Parameters for the local console service session of the machine with
    /// the given runtime identity.
    pub fn for_runtime_id(runtime_id: Uuid, enhanced_mode: bool) -> Self {
        let target_id = if enhanced_mode {
            format!("{runtime_id};EnhancedMode=1")
        } else {
            runtime_id.to_string()
        };
        Self {
            server: CONSOLE_SERVER.to_string(),
            port: CONSOLE_PORT,
            target_id,
            security: SecurityOptions::default(),
            min_input_interval: DEFAULT_MIN_INPUT_INTERVAL,
        }
    }
}

/// Link-state notification pushed by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected { status: i32 },
}

/// The remote-display client seam.
///
/// `connect` initiates the session; the transport confirms establishment by
/// pushing [`TransportEvent::Connected`] into the supervisor's event
/// channel, and reports link loss with [`TransportEvent::Disconnected`].
#[async_trait]
pub trait DisplayTransport: Send + Sync {
    async fn connect(&self, params: &ConnectParams) -> VmboxResult<()>;

    async fn disconnect(&self) -> VmboxResult<()>;

    async fn update_geometry(&self, geometry: &DisplayGeometry) -> VmboxResult<()>;
}
