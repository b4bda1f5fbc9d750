//! edgegrid.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::modules;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EdgeConfig {
    pub meta_manager: MetaManagerConfig,
    pub database: DatabaseConfig,
    pub client: ClientConfig,
    pub task_manager: TaskManagerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MetaManagerConfig {
    /// Pod-status sync cadence, seconds.
    pub sync_interval: u64,
    /// Wait for a cloud reply to a remote query, seconds.
    pub remote_query_timeout: u64,
    /// Module that receives remote queries.
    pub context_send_module: String,
    /// Group that receives outbound broadcasts.
    pub context_send_group: String,
    /// Lease update timeout, milliseconds.
    pub lease_client_timeout: u64,
    /// CSI round trip to edged, seconds.
    pub csi_sync_timeout: u64,
}

impl Default for MetaManagerConfig {
    fn default() -> Self {
        Self {
            sync_interval: 60,
            remote_query_timeout: 60,
            context_send_module: modules::EDGE_HUB.to_string(),
            context_send_group: modules::HUB_GROUP.to_string(),
            lease_client_timeout: 10_000,
            csi_sync_timeout: 60,
        }
    }
}

impl MetaManagerConfig {
    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(self.sync_interval.max(1))
    }

    pub fn remote_query_deadline(&self) -> Duration {
        Duration::from_secs(self.remote_query_timeout)
    }

    pub fn lease_deadline(&self) -> Duration {
        Duration::from_millis(self.lease_client_timeout)
    }

    pub fn csi_deadline(&self) -> Duration {
        Duration::from_secs(self.csi_sync_timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DatabaseConfig {
    pub data_source: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_source: PathBuf::from("/var/lib/edgegrid/edgegrid.redb"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ClientConfig {
    /// Per-attempt wait for a meta-manager reply, seconds.
    pub query_timeout: u64,
    pub retry_attempts: u32,
    /// Pause between attempts, milliseconds.
    pub retry_interval: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            query_timeout: 60,
            retry_attempts: 3,
            retry_interval: 10,
        }
    }
}

impl ClientConfig {
    pub fn query_deadline(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }

    pub fn retry_pause(&self) -> Duration {
        Duration::from_millis(self.retry_interval)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TaskManagerConfig {
    /// Where the last node-task report is written.
    pub report_path: PathBuf,
    pub node_name: String,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            report_path: PathBuf::from("/var/lib/edgegrid/upgrade-report.json"),
            node_name: "edge-node".to_string(),
        }
    }
}

impl EdgeConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: EdgeConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
