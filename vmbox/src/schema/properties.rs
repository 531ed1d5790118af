//! Property-query documents and their results.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{VmboxError, VmboxResult};

/// Well-known key carrying the runtime identity in a property result.
pub const RUNTIME_ID_KEY: &str = "RuntimeId";

/// Read-only options document sent with a property query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PropertyQuery {
    pub property_types: Vec<String>,
}

impl PropertyQuery {
    /// Query selecting only the runtime identity.
    pub fn runtime_id() -> Self {
        Self {
            property_types: vec![RUNTIME_ID_KEY.to_string()],
        }
    }

    pub fn encode(&self) -> VmboxResult<String> {
        serde_json::to_string(self)
            .map_err(|e| VmboxError::Internal(format!("failed to encode property query: {e}")))
    }
}

/// Parsed property-query result.
///
/// Results are JSON objects; lookups take dotted paths
/// (`"Memory.SizeInMB"`) to reach nested keys.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyMap {
    root: Value,
}

impl PropertyMap {
    /// Parse result text. Empty text parses as an empty set.
    pub fn parse(text: &str) -> VmboxResult<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Self {
                root: Value::Object(Default::default()),
            });
        }
        let root: Value = serde_json::from_str(trimmed)
            .map_err(|e| VmboxError::MalformedResult(format!("property result is not valid JSON: {e}")))?;
        if !root.is_object() {
            return Err(VmboxError::MalformedResult(
                "property result is not a JSON object".to_string(),
            ));
        }
        Ok(Self { root })
    }

    /// Look up a value by dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current)
    }

    pub fn is_empty(&self) -> bool {
        self.root
            .as_object()
            .map(|object| object.is_empty())
            .unwrap_or(true)
    }

    /// Runtime identity of the machine, if the result carries one.
    ///
    /// The host may format the identifier with surrounding braces; both
    /// forms parse.
    pub fn runtime_id(&self) -> VmboxResult<Uuid> {
        let value = self
            .get(RUNTIME_ID_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                VmboxError::MalformedResult(format!(
                    "property result has no {RUNTIME_ID_KEY} entry"
                ))
            })?;
        Uuid::parse_str(value.trim_matches(['{', '}'])).map_err(|e| {
            VmboxError::MalformedResult(format!("{RUNTIME_ID_KEY} is not a valid identifier: {e}"))
        })
    }
}
