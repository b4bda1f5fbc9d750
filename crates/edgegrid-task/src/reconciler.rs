//! Sends the last-task report upstream once the cloud link is back.

use edgegrid_state::{StateError, StateStore};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{TaskError, TaskResult};
use crate::message::{StatusReporter, UpstreamMessage, format_extend};
use crate::report::{ReportEvent, ReportFile};
use crate::resource::NodeTaskResource;
use crate::runner::ActionRegistry;
use crate::upgrade::{DEFAULT_API_VERSION, NODE_UPGRADE_JOB, UpgradeAction};

pub struct TaskReconciler {
    store: StateStore,
    registry: ActionRegistry,
    reporter: StatusReporter,
    report_file: ReportFile,
    resource_type: String,
    api_version: String,
    /// Held for a whole pass: the reconnect hook and the task manager
    /// may both reconcile.
    pass: Mutex<()>,
}

impl TaskReconciler {
    pub fn new(
        store: StateStore,
        registry: ActionRegistry,
        reporter: StatusReporter,
        report_file: ReportFile,
    ) -> Self {
        Self {
            store,
            registry,
            reporter,
            report_file,
            resource_type: NODE_UPGRADE_JOB.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            pass: Mutex::new(()),
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Drain pending reports. A rollback started here may leave a new
    /// report behind, which is picked up in the same call.
    pub async fn reconcile(&self) -> TaskResult<()> {
        let _pass = self.pass.lock().await;
        while self.reconcile_once().await? {}
        Ok(())
    }

    /// Handle one pending report. Returns true when a follow-up action
    /// ran and the report file should be checked again.
    async fn reconcile_once(&self) -> TaskResult<bool> {
        let Some(report) = self.report_file.read()? else {
            debug!("no pending task report");
            return Ok(false);
        };

        let action = match report.event_type {
            ReportEvent::Upgrade => UpgradeAction::Upgrade,
            ReportEvent::Rollback => UpgradeAction::Rollback,
            ReportEvent::Backup => {
                warn!(path = %self.report_file.path().display(), "backup report left for its owner");
                return Ok(false);
            }
            ReportEvent::Unknown => {
                warn!(path = %self.report_file.path().display(), "unrecognized task report ignored");
                return Ok(false);
            }
        };

        let record = self
            .store
            .get_task_record(&self.resource_type)?
            .ok_or_else(|| StateError::NotFound(format!("{} task record", self.resource_type)))?;

        let resource = NodeTaskResource::new(
            &self.api_version,
            &self.resource_type,
            &record.job_name,
            &record.node_name,
        );
        let error = (!report.success).then_some(report.error_message.as_str());
        let body = UpstreamMessage::new(
            action.as_str(),
            error,
            format_extend(&report.from_version, &report.to_version),
        );
        self.reporter.report(&resource, &body).await?;
        self.report_file.remove()?;
        info!(%resource, action = action.as_str(), succ = report.success, "task report delivered");

        if report.event_type == ReportEvent::Upgrade && !report.success {
            let spec = serde_json::to_vec(&record.spec)
                .map_err(|e| TaskError::TaskSpec(e.to_string()))?;
            info!(%resource, "upgrade failed, rolling back");
            self.registry
                .run_action(
                    &self.resource_type,
                    &record.job_name,
                    &record.node_name,
                    UpgradeAction::Rollback.as_str(),
                    &spec,
                )
                .await?;
            return Ok(true);
        }

        self.store.delete_task_record(&self.resource_type)?;
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::TaskReport;
    use crate::runner::ActionRunner;
    use crate::upgrade::tests::{Fixture, ScriptedExecutor};
    use edgegrid_state::TaskRecord;
    use std::sync::Arc;

    fn reconciler(f: &Fixture, executor: Arc<ScriptedExecutor>) -> TaskReconciler {
        let runner = Arc::new(f.runner(executor)) as Arc<dyn ActionRunner>;
        TaskReconciler::new(
            f.store.clone(),
            ActionRegistry::new(vec![runner]),
            f.reporter.clone(),
            f.report_file.clone(),
        )
    }

    fn seed_job(f: &Fixture) {
        f.store
            .put_task_record(
                NODE_UPGRADE_JOB,
                &TaskRecord {
                    job_name: "job1".into(),
                    node_name: "node1".into(),
                    spec: serde_json::json!({"version": "1.21"}),
                },
            )
            .unwrap();
    }

    fn report(event_type: ReportEvent, success: bool) -> TaskReport {
        TaskReport {
            event_type,
            success,
            error_message: if success { String::new() } else { "boom".into() },
            from_version: "1.20".into(),
            to_version: "1.21".into(),
        }
    }

    #[tokio::test]
    async fn successful_upgrade_is_reported_and_forgotten() {
        let f = Fixture::new().await;
        seed_job(&f);
        f.report_file.write(&report(ReportEvent::Upgrade, true)).unwrap();

        reconciler(&f, Arc::new(ScriptedExecutor::ok())).reconcile().await.unwrap();

        let sent = f.upstream().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].action, "upgrade");
        assert!(sent[0].succ);
        assert_eq!(sent[0].extend, "1.20->1.21");
        assert!(!f.report_file.exists());
        assert!(f.store.get_task_record(NODE_UPGRADE_JOB).unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_upgrade_triggers_rollback() {
        let f = Fixture::new().await;
        seed_job(&f);
        f.report_file.write(&report(ReportEvent::Upgrade, false)).unwrap();
        let executor = Arc::new(ScriptedExecutor::ok());

        reconciler(&f, executor.clone()).reconcile().await.unwrap();

        let sent = f.upstream().await;
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].succ);
        assert_eq!(sent[0].reason, "boom");
        assert_eq!(executor.subcommands(), vec!["rollback"]);
        // Rollback succeeded: its report is the tool's job, so the record stays.
        assert!(!f.report_file.exists());
        assert!(f.store.get_task_record(NODE_UPGRADE_JOB).unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_rollback_is_reported_in_the_same_pass() {
        let f = Fixture::new().await;
        seed_job(&f);
        f.report_file.write(&report(ReportEvent::Upgrade, false)).unwrap();
        let mut executor = ScriptedExecutor::ok();
        executor.failing = vec!["rollback"];

        reconciler(&f, Arc::new(executor)).reconcile().await.unwrap();

        let sent = f.upstream().await;
        let actions: Vec<_> = sent.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(actions, vec!["upgrade", "rollback"]);
        assert!(!sent[1].succ);
        assert!(!f.report_file.exists());
        assert!(f.store.get_task_record(NODE_UPGRADE_JOB).unwrap().is_none());
    }

    #[tokio::test]
    async fn offline_report_stays_on_disk() {
        let f = Fixture::new().await;
        seed_job(&f);
        f.connection.set_connected(false);
        f.report_file.write(&report(ReportEvent::Upgrade, true)).unwrap();

        let err = reconciler(&f, Arc::new(ScriptedExecutor::ok()))
            .reconcile()
            .await
            .unwrap_err();

        assert!(matches!(err, TaskError::Disconnected));
        assert!(f.report_file.exists());
        assert!(f.store.get_task_record(NODE_UPGRADE_JOB).unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_job_record_keeps_the_report() {
        let f = Fixture::new().await;
        f.report_file.write(&report(ReportEvent::Upgrade, true)).unwrap();

        let err = reconciler(&f, Arc::new(ScriptedExecutor::ok()))
            .reconcile()
            .await
            .unwrap_err();

        assert!(matches!(err, TaskError::Store(StateError::NotFound(_))));
        assert!(f.report_file.exists());
        assert!(f.upstream().await.is_empty());
    }

    #[tokio::test]
    async fn backup_report_without_job_is_left_alone() {
        let f = Fixture::new().await;
        f.report_file.write(&report(ReportEvent::Backup, true)).unwrap();

        reconciler(&f, Arc::new(ScriptedExecutor::ok())).reconcile().await.unwrap();

        assert!(f.report_file.exists());
        assert_eq!(f.bus.enqueued(), 0);
    }

    #[tokio::test]
    async fn unrecognized_event_is_ignored_without_error() {
        let f = Fixture::new().await;
        std::fs::write(
            f.report_file.path(),
            r#"{"eventType":"ImagePrePull","success":false,"errorMessage":"x"}"#,
        )
        .unwrap();
        let executor = Arc::new(ScriptedExecutor::ok());

        reconciler(&f, executor.clone()).reconcile().await.unwrap();

        assert!(executor.subcommands().is_empty());
        assert_eq!(f.bus.enqueued(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_passes_deliver_once() {
        let f = Fixture::new().await;
        seed_job(&f);
        f.report_file.write(&report(ReportEvent::Upgrade, true)).unwrap();
        let reconciler = Arc::new(reconciler(&f, Arc::new(ScriptedExecutor::ok())));

        let (a, b) = tokio::join!(
            tokio::spawn({
                let r = reconciler.clone();
                async move { r.reconcile().await }
            }),
            tokio::spawn({
                let r = reconciler.clone();
                async move { r.reconcile().await }
            }),
        );
        a.unwrap().unwrap();
        b.unwrap().unwrap();

        assert_eq!(f.upstream().await.len(), 1);
        assert!(!f.report_file.exists());
        assert!(f.store.get_task_record(NODE_UPGRADE_JOB).unwrap().is_none());
    }

    #[tokio::test]
    async fn nothing_pending_is_a_no_op() {
        let f = Fixture::new().await;
        seed_job(&f);

        reconciler(&f, Arc::new(ScriptedExecutor::ok())).reconcile().await.unwrap();

        assert_eq!(f.bus.enqueued(), 0);
        assert!(f.store.get_task_record(NODE_UPGRADE_JOB).unwrap().is_some());
    }
}
