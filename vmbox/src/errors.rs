//! Error types shared across the crate.

use thiserror::Error;

/// Result alias used throughout vmbox.
pub type VmboxResult<T> = Result<T, VmboxError>;

/// Errors produced by the control plane.
#[derive(Error, Debug)]
pub enum VmboxError {
    /// The host service could not allocate a native token.
    #[error("host resources exhausted: {0}")]
    ResourceExhausted(String),

    /// The host service rejected or failed a command, either synchronously
    /// at issue time or through the resolved operation wait. Carries the
    /// host status code and any partial result text the host attached to
    /// the failure.
    #[error("host error {code:#010x}{}", .partial_result.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Host {
        code: i32,
        partial_result: Option<String>,
    },

    /// A result document could not be parsed into the shape the caller
    /// expected.
    #[error("malformed result: {0}")]
    MalformedResult(String),

    /// The display session failed to establish or to update geometry.
    #[error("transport error: {0}")]
    Transport(String),

    /// A lifecycle command is not permitted in the machine's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Runtime plumbing failure (task join errors and similar).
    #[error("internal error: {0}")]
    Internal(String),
}

impl VmboxError {
    /// Host failure with an empty partial result normalized to `None`.
    pub fn host(code: i32, partial_result: Option<String>) -> Self {
        VmboxError::Host {
            code,
            partial_result: partial_result.filter(|text| !text.is_empty()),
        }
    }

    /// Host status code, when this error came from the host service.
    pub fn host_code(&self) -> Option<i32> {
        match self {
            VmboxError::Host { code, .. } => Some(*code),
            _ => None,
        }
    }
}
