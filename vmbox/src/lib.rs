//! vmbox - Control plane for host-managed virtual machines.
//!
//! Drives a single virtual machine through a host virtualization service
//! and supervises its console display session. The host service and the
//! display client both sit behind traits, so the whole control plane runs
//! and tests off-host; on Windows, [`host::hcs`] provides the production
//! [`ComputeHost`] backend over the Host Compute System API.
//!
//! ## Architecture
//!
//! ```text
//! caller ──► VirtualMachine ──issue/wait──► ComputeHost (host service)
//!                 │
//!                 │ runtime identity (property query)
//!                 ▼
//!          ConsoleSupervisor ──connect/geometry──► DisplayTransport
//!                 ▲                                     │
//!                 └───────── transport events ──────────┘
//! ```
//!
//! - `host`: token ownership (system/operation handles), the async result
//!   waiter, the [`ComputeHost`] seam and its Windows backend.
//! - `schema`: the configuration document and property-query codec.
//! - `machine`: the per-machine lifecycle state machine.
//! - `console`: console session supervision and display geometry.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vmbox::{
//!     AttachmentKind, ComputeHost, ConnectParams, ConsoleSupervisor, DisplayTransport,
//!     MachineDocument, StorageAttachment, VirtualMachine, VmboxResult,
//! };
//!
//! async fn run(
//!     host: Arc<dyn ComputeHost>,
//!     transport: Arc<dyn DisplayTransport>,
//! ) -> VmboxResult<()> {
//!     let mut document = MachineDocument::new("dev-vm");
//!     document.virtual_machine.compute_topology.processor.count = 4;
//!     document.virtual_machine.compute_topology.memory.size_in_mb = 4096;
//!     document.attach_storage(
//!         "Primary",
//!         0,
//!         StorageAttachment {
//!             kind: AttachmentKind::VirtualDisk,
//!             path: "/images/dev.vhdx".to_string(),
//!         },
//!     );
//!
//!     let machine = VirtualMachine::create(host, "dev-vm", &document).await?;
//!     machine.start().await?;
//!
//!     let runtime_id = machine.runtime_id().await?;
//!     let supervisor =
//!         ConsoleSupervisor::new(transport, ConnectParams::for_runtime_id(runtime_id, true));
//!     supervisor.connect().await?;
//!     Ok(())
//! }
//! ```

pub mod console;
pub mod errors;
pub mod host;
pub mod logging;
pub mod machine;
pub mod schema;

pub use console::{
    ConnectParams, ConsoleSupervisor, DisplayGeometry, DisplayTransport, Orientation,
    SecurityOptions, SessionState, TransportEvent,
};
pub use errors::{VmboxError, VmboxResult};
pub use host::{
    AccessRights, ComputeHost, HostCommand, OperationHandle, OperationToken, SystemHandle,
    SystemOrigin, SystemToken, await_result,
};
pub use machine::{MachineInfo, MachineState, VirtualMachine};
pub use schema::{
    AttachmentKind, MachineDocument, ModifyRequest, ModifyRequestKind, PropertyMap, PropertyQuery,
    SchemaVersion, StorageAttachment,
};
