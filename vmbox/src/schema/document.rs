//! Declarative machine configuration document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{VmboxError, VmboxResult};

/// Schema version tag carried at the top of every document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

impl SchemaVersion {
    /// Version this crate emits.
    pub const CURRENT: SchemaVersion = SchemaVersion { major: 2, minor: 1 };
}

impl Default for SchemaVersion {
    fn default() -> Self {
        SchemaVersion::CURRENT
    }
}

/// Top-level configuration document for system creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MachineDocument {
    pub schema_version: SchemaVersion,
    pub owner: String,
    pub should_terminate_on_last_handle_closed: bool,
    pub virtual_machine: VirtualMachineSection,
}

impl MachineDocument {
    /// Document with the crate's baseline: current schema version,
    /// terminate-on-last-handle-close set, one processor, 1024 MB, video
    /// and keyboard devices present, no storage.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            schema_version: SchemaVersion::CURRENT,
            owner: owner.into(),
            should_terminate_on_last_handle_closed: true,
            virtual_machine: VirtualMachineSection {
                chipset: Chipset::default(),
                compute_topology: ComputeTopology {
                    memory: Memory {
                        size_in_mb: 1024,
                        allow_overcommit: true,
                    },
                    processor: Processor {
                        count: 1,
                        expose_virtualization_extensions: false,
                    },
                },
                devices: Devices {
                    video_monitor: Some(VideoMonitor {}),
                    keyboard: Some(Keyboard {}),
                    enhanced_mode_video: None,
                    scsi: BTreeMap::new(),
                },
                guest_state: None,
                security_settings: None,
            },
        }
    }

    /// Add a storage attachment under `controller` at `index`.
    pub fn attach_storage(&mut self, controller: &str, index: u32, attachment: StorageAttachment) {
        self.virtual_machine
            .devices
            .scsi
            .entry(controller.to_string())
            .or_default()
            .attachments
            .insert(index, attachment);
    }

    /// Deterministic JSON text for system creation.
    pub fn encode(&self) -> VmboxResult<String> {
        serde_json::to_string(self)
            .map_err(|e| VmboxError::Internal(format!("failed to encode configuration: {e}")))
    }

    /// Parse a document previously produced by [`MachineDocument::encode`].
    pub fn decode(text: &str) -> VmboxResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| VmboxError::MalformedResult(format!("invalid configuration document: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VirtualMachineSection {
    pub chipset: Chipset,
    pub compute_topology: ComputeTopology,
    pub devices: Devices,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_state: Option<GuestState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_settings: Option<SecuritySettings>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Chipset {
    pub uefi: Uefi,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Uefi {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_secure_boot_template: Option<SecureBootPolicy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecureBootPolicy {
    Skip,
    Apply,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ComputeTopology {
    pub memory: Memory,
    pub processor: Processor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Memory {
    #[serde(rename = "SizeInMB")]
    pub size_in_mb: u64,
    pub allow_overcommit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Processor {
    pub count: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub expose_virtualization_extensions: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Devices {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_monitor: Option<VideoMonitor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyboard: Option<Keyboard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced_mode_video: Option<EnhancedModeVideo>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scsi: BTreeMap<String, ScsiController>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VideoMonitor {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Keyboard {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnhancedModeVideo {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScsiController {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attachments: BTreeMap<u32, StorageAttachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StorageAttachment {
    #[serde(rename = "Type")]
    pub kind: AttachmentKind,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentKind {
    Iso,
    VirtualDisk,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GuestState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_state_file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_state_file_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecuritySettings {
    #[serde(default)]
    pub enable_tpm: bool,
}

/// Partial configuration delta applied to a defined or live system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModifyRequest {
    /// Path of the resource being changed, e.g.
    /// `VirtualMachine/ComputeTopology/Memory/SizeInMB`.
    pub resource_path: String,
    pub request_type: ModifyRequestKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,
}

impl ModifyRequest {
    pub fn update(resource_path: impl Into<String>, settings: serde_json::Value) -> Self {
        Self {
            resource_path: resource_path.into(),
            request_type: ModifyRequestKind::Update,
            settings: Some(settings),
        }
    }

    pub fn encode(&self) -> VmboxResult<String> {
        serde_json::to_string(self)
            .map_err(|e| VmboxError::Internal(format!("failed to encode modify request: {e}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifyRequestKind {
    Add,
    Remove,
    Update,
}

fn is_false(value: &bool) -> bool {
    !*value
}
