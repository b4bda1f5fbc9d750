//! Node-task resource strings: `<apiVersion>/<resourceType>/<jobName>/nodes/<nodeName>`.

use std::fmt;

use crate::error::{TaskError, TaskResult};

const NODES_SEGMENT: &str = "nodes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTaskResource {
    /// May itself contain `/` (`group/version`).
    pub api_version: String,
    pub resource_type: String,
    pub job_name: String,
    pub node_name: String,
}

impl NodeTaskResource {
    pub fn new(
        api_version: impl Into<String>,
        resource_type: impl Into<String>,
        job_name: impl Into<String>,
        node_name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            resource_type: resource_type.into(),
            job_name: job_name.into(),
            node_name: node_name.into(),
        }
    }

    /// Parse from the right so a grouped api version survives.
    pub fn parse(resource: &str) -> TaskResult<Self> {
        let tokens: Vec<&str> = resource.split('/').collect();
        let invalid = || TaskError::InvalidResource(resource.to_string());
        let n = tokens.len();
        if n < 5 || tokens[n - 2] != NODES_SEGMENT {
            return Err(invalid());
        }
        let parsed = Self::new(
            tokens[..n - 4].join("/"),
            tokens[n - 4],
            tokens[n - 3],
            tokens[n - 1],
        );
        let any_empty = [
            &parsed.api_version,
            &parsed.resource_type,
            &parsed.job_name,
            &parsed.node_name,
        ]
        .iter()
        .any(|s| s.is_empty());
        if any_empty {
            return Err(invalid());
        }
        Ok(parsed)
    }
}

impl fmt::Display for NodeTaskResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{NODES_SEGMENT}/{}",
            self.api_version, self.resource_type, self.job_name, self.node_name
        )
    }
}
