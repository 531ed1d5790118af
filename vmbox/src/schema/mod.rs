//! Configuration and property-document codec.
//!
//! The host service speaks JSON in PascalCase. [`MachineDocument`] is the
//! declarative configuration sent at creation, [`ModifyRequest`] the partial
//! delta applied to a live system, [`PropertyQuery`] the read-only options
//! document of a property query, and [`PropertyMap`] the parsed query
//! result. Encoding is deterministic: maps are ordered and field order is
//! fixed, so identical documents encode to identical text.

mod document;
mod properties;

pub use document::{
    AttachmentKind, Chipset, ComputeTopology, Devices, EnhancedModeVideo, GuestState, Keyboard,
    MachineDocument, Memory, ModifyRequest, ModifyRequestKind, Processor, SchemaVersion,
    ScsiController, SecureBootPolicy, SecuritySettings, StorageAttachment, Uefi, VideoMonitor,
    VirtualMachineSection,
};
pub use properties::{PropertyMap, PropertyQuery, RUNTIME_ID_KEY};
