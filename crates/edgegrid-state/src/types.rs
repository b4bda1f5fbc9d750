//! Persisted row types.

use edgegrid_core::parse_resource;
use serde::{Deserialize, Serialize};

/// One cached control-plane object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    #[serde(rename = "type")]
    pub record_type: String,
    /// Serialized object, returned byte-for-byte as stored.
    pub value: String,
}

impl Record {
    pub fn new(
        key: impl Into<String>,
        record_type: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            record_type: record_type.into(),
            value: value.into(),
        }
    }

    /// Build a record whose type is taken from the key's middle segment.
    pub fn from_key(key: impl Into<String>, value: impl Into<String>) -> Self {
        let parsed = parse_resource(&key.into());
        Self {
            record_type: parsed.res_type,
            key: parsed.key,
            value: value.into(),
        }
    }
}

/// Intent persisted before a node-task action starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub job_name: String,
    pub node_name: String,
    pub spec: serde_json::Value,
}
