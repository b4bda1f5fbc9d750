//! Action runners and the registry that routes to them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{TaskError, TaskResult};

/// Executes named actions for one node-task resource type.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    /// The resource-type token this runner owns.
    fn resource_type(&self) -> &str;

    /// Run `action` for a job. `spec` is the job spec as JSON bytes.
    async fn run_action(&self, job_name: &str, node_name: &str, action: &str, spec: &[u8]) -> TaskResult<()>;
}

/// Resource type → runner. Built once at startup, then shared.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    runners: Arc<HashMap<String, Arc<dyn ActionRunner>>>,
}

impl ActionRegistry {
    pub fn new(runners: Vec<Arc<dyn ActionRunner>>) -> Self {
        let runners = runners
            .into_iter()
            .map(|r| (r.resource_type().to_string(), r))
            .collect();
        Self {
            runners: Arc::new(runners),
        }
    }

    pub fn get(&self, resource_type: &str) -> TaskResult<Arc<dyn ActionRunner>> {
        self.runners
            .get(resource_type)
            .cloned()
            .ok_or_else(|| TaskError::UnknownRunner(resource_type.to_string()))
    }

    pub async fn run_action(
        &self,
        resource_type: &str,
        job_name: &str,
        node_name: &str,
        action: &str,
        spec: &[u8],
    ) -> TaskResult<()> {
        self.get(resource_type)?
            .run_action(job_name, node_name, action, spec)
            .await
    }
}
