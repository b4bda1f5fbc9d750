//! Node upgrade job: `check → waiting-confirmation → backup → upgrade`,
//! with `rollback` as the recovery for a failed upgrade.
//!
//! Non-terminal actions report their status upstream as they finish.
//! Upgrade and rollback are terminal: the upgrade tool may replace this
//! process, so their outcome travels through the report file instead
//! and is sent by the reconciler once the cloud link is up.

use std::sync::Arc;

use async_trait::async_trait;
use edgegrid_state::{StateStore, TaskRecord};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{TaskError, TaskResult};
use crate::executor::CommandExecutor;
use crate::message::{StatusReporter, UpstreamMessage, format_extend};
use crate::report::{ReportEvent, ReportFile, TaskReport};
use crate::resource::NodeTaskResource;
use crate::runner::ActionRunner;

/// Resource-type token for node upgrade jobs.
pub const NODE_UPGRADE_JOB: &str = "nodeupgradejob";
pub const DEFAULT_API_VERSION: &str = "operations.edgegrid.io/v1alpha1";

const UPGRADE_TOOL: &str = "keadm";
const KNOWN_CHECK_ITEMS: [&str; 3] = ["cpu", "mem", "disk"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeUpgradeJobSpec {
    pub version: String,
    pub image: String,
    pub check_items: Vec<String>,
    pub require_confirmation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeAction {
    Check,
    WaitingConfirmation,
    Backup,
    Upgrade,
    Rollback,
}

impl UpgradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpgradeAction::Check => "check",
            UpgradeAction::WaitingConfirmation => "waiting-confirmation",
            UpgradeAction::Backup => "backup",
            UpgradeAction::Upgrade => "upgrade",
            UpgradeAction::Rollback => "rollback",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "check" => Some(UpgradeAction::Check),
            "waiting-confirmation" => Some(UpgradeAction::WaitingConfirmation),
            "backup" => Some(UpgradeAction::Backup),
            "upgrade" => Some(UpgradeAction::Upgrade),
            "rollback" => Some(UpgradeAction::Rollback),
            _ => None,
        }
    }

    /// The action that follows a success.
    pub fn next(&self) -> Option<Self> {
        match self {
            UpgradeAction::Check => Some(UpgradeAction::WaitingConfirmation),
            UpgradeAction::WaitingConfirmation => Some(UpgradeAction::Backup),
            UpgradeAction::Backup => Some(UpgradeAction::Upgrade),
            UpgradeAction::Upgrade | UpgradeAction::Rollback => None,
        }
    }

    /// Terminal actions hand their outcome over through the report file.
    pub fn terminal_event(&self) -> Option<ReportEvent> {
        match self {
            UpgradeAction::Upgrade => Some(ReportEvent::Upgrade),
            UpgradeAction::Rollback => Some(ReportEvent::Rollback),
            _ => None,
        }
    }

    fn carries_versions(&self) -> bool {
        matches!(
            self,
            UpgradeAction::Backup | UpgradeAction::Upgrade | UpgradeAction::Rollback
        )
    }
}

#[derive(Debug, Default)]
struct ActionOutcome {
    error: Option<String>,
    /// Stop the flow without treating it as a failure.
    interrupt: bool,
}

impl ActionOutcome {
    fn failed(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            interrupt: false,
        }
    }
}

#[derive(Debug, Default)]
struct Versions {
    from: String,
    to: String,
}

pub struct NodeUpgradeJobRunner {
    store: StateStore,
    executor: Arc<dyn CommandExecutor>,
    reporter: StatusReporter,
    report_file: ReportFile,
    api_version: String,
}

impl NodeUpgradeJobRunner {
    pub fn new(
        store: StateStore,
        executor: Arc<dyn CommandExecutor>,
        reporter: StatusReporter,
        report_file: ReportFile,
    ) -> Self {
        Self {
            store,
            executor,
            reporter,
            report_file,
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    async fn execute(
        &self,
        action: UpgradeAction,
        spec: &NodeUpgradeJobSpec,
        versions: &mut Versions,
    ) -> ActionOutcome {
        match action {
            UpgradeAction::Check => check(spec),
            UpgradeAction::WaitingConfirmation => ActionOutcome {
                error: None,
                interrupt: spec.require_confirmation,
            },
            UpgradeAction::Backup => self.backup(versions).await,
            UpgradeAction::Upgrade => {
                let mut args = vec![
                    "upgrade".to_string(),
                    "edge".to_string(),
                    "--force".to_string(),
                    "--toVersion".to_string(),
                    spec.version.clone(),
                ];
                if !spec.image.is_empty() {
                    args.push("--image".to_string());
                    args.push(spec.image.clone());
                }
                self.run_tool(&args).await
            }
            UpgradeAction::Rollback => {
                self.run_tool(&["rollback".to_string(), "edge".to_string()])
                    .await
            }
        }
    }

    async fn run_tool(&self, args: &[String]) -> ActionOutcome {
        match self.executor.run(UPGRADE_TOOL, args).await {
            Ok(()) => ActionOutcome::default(),
            Err(e) => ActionOutcome::failed(e.to_string()),
        }
    }

    /// The backup command writes its own report; consume it.
    async fn backup(&self, versions: &mut Versions) -> ActionOutcome {
        let ran = self
            .run_tool(&["backup".to_string(), "edge".to_string()])
            .await;
        if ran.error.is_some() {
            return ran;
        }

        let report = match self.report_file.read() {
            Ok(Some(report)) => report,
            Ok(None) => return ActionOutcome::failed("backup finished without a report"),
            Err(e) => return ActionOutcome::failed(e.to_string()),
        };
        if let Err(e) = self.report_file.remove() {
            warn!(error = %e, "failed to remove backup report");
        }
        versions.from = report.from_version;
        if !report.to_version.is_empty() {
            versions.to = report.to_version;
        }
        if !report.success {
            return ActionOutcome::failed(format!("backup failed: {}", report.error_message));
        }
        ActionOutcome::default()
    }
}

fn check(spec: &NodeUpgradeJobSpec) -> ActionOutcome {
    if spec.version.is_empty() {
        return ActionOutcome::failed("upgrade version is required");
    }
    if let Some(unknown) = spec
        .check_items
        .iter()
        .find(|item| !KNOWN_CHECK_ITEMS.contains(&item.as_str()))
    {
        return ActionOutcome::failed(format!("unknown check item {unknown}"));
    }
    ActionOutcome::default()
}

#[async_trait]
impl ActionRunner for NodeUpgradeJobRunner {
    fn resource_type(&self) -> &str {
        NODE_UPGRADE_JOB
    }

    async fn run_action(&self, job_name: &str, node_name: &str, action: &str, spec: &[u8]) -> TaskResult<()> {
        let first =
            UpgradeAction::parse(action).ok_or_else(|| TaskError::UnknownAction(action.to_string()))?;
        let raw: serde_json::Value =
            serde_json::from_slice(spec).map_err(|e| TaskError::TaskSpec(e.to_string()))?;
        let parsed: NodeUpgradeJobSpec =
            serde_json::from_value(raw.clone()).map_err(|e| TaskError::TaskSpec(e.to_string()))?;

        self.store.put_task_record(
            NODE_UPGRADE_JOB,
            &TaskRecord {
                job_name: job_name.to_string(),
                node_name: node_name.to_string(),
                spec: raw,
            },
        )?;

        let resource = NodeTaskResource::new(&self.api_version, NODE_UPGRADE_JOB, job_name, node_name);
        let mut versions = Versions {
            from: String::new(),
            to: parsed.version.clone(),
        };

        let mut next = Some(first);
        while let Some(action) = next {
            info!(%resource, action = action.as_str(), "running node task action");
            let outcome = self.execute(action, &parsed, &mut versions).await;

            if let Some(event_type) = action.terminal_event() {
                if let Some(reason) = outcome.error {
                    error!(%resource, action = action.as_str(), %reason, "terminal action failed");
                    let (from_version, to_version) = match action {
                        UpgradeAction::Rollback => (parsed.version.clone(), versions.from.clone()),
                        _ => (versions.from.clone(), versions.to.clone()),
                    };
                    self.report_file.write(&TaskReport {
                        event_type,
                        success: false,
                        error_message: reason,
                        from_version,
                        to_version,
                    })?;
                }
                return Ok(());
            }

            let extend = if action.carries_versions() {
                format_extend(&versions.from, &versions.to)
            } else {
                String::new()
            };
            let body = UpstreamMessage::new(action.as_str(), outcome.error.as_deref(), extend);
            self.reporter.report_if_connected(&resource, &body).await;

            next = if outcome.error.is_some() {
                self.store.delete_task_record(NODE_UPGRADE_JOB)?;
                None
            } else if outcome.interrupt {
                info!(%resource, action = action.as_str(), "node task paused");
                None
            } else {
                action.next()
            };
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use edgegrid_bus::{Message, MessageBus};
    use edgegrid_core::CloudConnection;
    use edgegrid_core::modules::{EDGE_HUB, HUB_GROUP};
    use std::sync::Mutex;

    /// Records commands; `backup` writes the tool's report, listed
    /// subcommands fail.
    pub(crate) struct ScriptedExecutor {
        pub calls: Mutex<Vec<Vec<String>>>,
        pub failing: Vec<&'static str>,
        pub backup_report: Option<(ReportFile, TaskReport)>,
    }

    impl ScriptedExecutor {
        pub fn ok() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failing: Vec::new(),
                backup_report: None,
            }
        }

        pub fn subcommands(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|args| args[0].clone())
                .collect()
        }
    }

    #[async_trait]
    impl CommandExecutor for ScriptedExecutor {
        async fn run(&self, program: &str, args: &[String]) -> TaskResult<()> {
            assert_eq!(program, "keadm");
            self.calls.lock().unwrap().push(args.to_vec());
            let sub = args[0].as_str();
            if sub == "backup" {
                if let Some((file, report)) = &self.backup_report {
                    file.write(report).unwrap();
                }
            }
            if self.failing.iter().any(|f| *f == sub) {
                return Err(TaskError::Command(format!("keadm {sub}: exit status 1")));
            }
            Ok(())
        }
    }

    pub(crate) struct Fixture {
        pub bus: MessageBus,
        pub store: StateStore,
        pub connection: CloudConnection,
        pub report_file: ReportFile,
        pub reporter: StatusReporter,
        _dir: tempfile::TempDir,
    }

    impl Fixture {
        pub async fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let bus = MessageBus::new();
            bus.register(EDGE_HUB, HUB_GROUP).await;
            let connection = CloudConnection::new();
            connection.set_connected(true);
            Self {
                reporter: StatusReporter::new(bus.clone(), connection.clone(), HUB_GROUP),
                report_file: ReportFile::new(dir.path().join("upgrade-report.json")),
                store: StateStore::open_in_memory().unwrap(),
                bus,
                connection,
                _dir: dir,
            }
        }

        pub fn runner(&self, executor: Arc<ScriptedExecutor>) -> NodeUpgradeJobRunner {
            NodeUpgradeJobRunner::new(
                self.store.clone(),
                executor,
                self.reporter.clone(),
                self.report_file.clone(),
            )
        }

        pub async fn upstream(&self) -> Vec<UpstreamMessage> {
            let mut out = Vec::new();
            while let Some(msg) = self.bus.try_receive(EDGE_HUB).await.unwrap() {
                out.push(body(&msg));
            }
            out
        }
    }

    fn body(msg: &Message) -> UpstreamMessage {
        msg.content.decode().unwrap()
    }

    fn spec(confirm: bool) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "version": "1.21",
            "image": "edgegrid/installer",
            "checkItems": ["cpu", "disk"],
            "requireConfirmation": confirm,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn full_flow_runs_backup_then_upgrade() {
        let f = Fixture::new().await;
        let mut executor = ScriptedExecutor::ok();
        executor.backup_report = Some((
            f.report_file.clone(),
            TaskReport {
                event_type: ReportEvent::Backup,
                success: true,
                error_message: String::new(),
                from_version: "1.20".into(),
                to_version: "1.21".into(),
            },
        ));
        let executor = Arc::new(executor);
        let runner = f.runner(executor.clone());

        runner.run_action("job1", "node1", "check", &spec(false)).await.unwrap();

        assert_eq!(executor.subcommands(), vec!["backup", "upgrade"]);
        let upgrade_args = executor.calls.lock().unwrap()[1].join(" ");
        assert_eq!(
            upgrade_args,
            "upgrade edge --force --toVersion 1.21 --image edgegrid/installer"
        );

        let statuses = f.upstream().await;
        let actions: Vec<_> = statuses.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(actions, vec!["check", "waiting-confirmation", "backup"]);
        assert!(statuses.iter().all(|s| s.succ));
        assert_eq!(statuses[2].extend, "1.20->1.21");

        // The backup report was consumed; the upgrade report is the tool's to write.
        assert!(!f.report_file.exists());
        let record = f.store.get_task_record(NODE_UPGRADE_JOB).unwrap().unwrap();
        assert_eq!(record.job_name, "job1");
        assert_eq!(record.spec["version"], "1.21");
    }

    #[tokio::test]
    async fn confirmation_pauses_the_flow() {
        let f = Fixture::new().await;
        let executor = Arc::new(ScriptedExecutor::ok());

        f.runner(executor.clone())
            .run_action("job1", "node1", "check", &spec(true))
            .await
            .unwrap();

        assert!(executor.subcommands().is_empty());
        assert_eq!(f.upstream().await.len(), 2);
        assert!(f.store.get_task_record(NODE_UPGRADE_JOB).unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_upgrade_writes_report_instead_of_status() {
        let f = Fixture::new().await;
        let mut executor = ScriptedExecutor::ok();
        executor.failing = vec!["upgrade"];
        let executor = Arc::new(executor);

        f.runner(executor)
            .run_action("job1", "node1", "upgrade", &spec(false))
            .await
            .unwrap();

        assert!(f.upstream().await.is_empty());
        let report = f.report_file.read().unwrap().unwrap();
        assert_eq!(report.event_type, ReportEvent::Upgrade);
        assert!(!report.success);
        assert!(report.error_message.contains("exit status 1"));
        assert_eq!(report.to_version, "1.21");
        assert!(f.store.get_task_record(NODE_UPGRADE_JOB).unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_check_ends_the_job() {
        let f = Fixture::new().await;
        let executor = Arc::new(ScriptedExecutor::ok());
        let bad = serde_json::to_vec(&serde_json::json!({"version": "1.21", "checkItems": ["gpu"]})).unwrap();

        f.runner(executor.clone())
            .run_action("job1", "node1", "check", &bad)
            .await
            .unwrap();

        let statuses = f.upstream().await;
        assert_eq!(statuses.len(), 1);
        assert!(!statuses[0].succ);
        assert!(statuses[0].reason.contains("gpu"));
        assert!(executor.subcommands().is_empty());
        assert!(f.store.get_task_record(NODE_UPGRADE_JOB).unwrap().is_none());
    }

    #[tokio::test]
    async fn offline_statuses_are_not_sent() {
        let f = Fixture::new().await;
        f.connection.set_connected(false);

        f.runner(Arc::new(ScriptedExecutor::ok()))
            .run_action("job1", "node1", "check", &spec(true))
            .await
            .unwrap();

        assert_eq!(f.bus.enqueued(), 0);
    }

    #[tokio::test]
    async fn bad_requests_persist_nothing() {
        let f = Fixture::new().await;
        let runner = f.runner(Arc::new(ScriptedExecutor::ok()));

        let err = runner.run_action("j", "n", "reboot", &spec(false)).await.unwrap_err();
        assert!(matches!(err, TaskError::UnknownAction(a) if a == "reboot"));

        let err = runner.run_action("j", "n", "check", b"not json").await.unwrap_err();
        assert!(matches!(err, TaskError::TaskSpec(_)));

        assert!(f.store.get_task_record(NODE_UPGRADE_JOB).unwrap().is_none());
    }

    #[test]
    fn action_flow_order() {
        let mut action = Some(UpgradeAction::Check);
        let mut seen = Vec::new();
        while let Some(a) = action {
            seen.push(a.as_str());
            action = a.next();
        }
        assert_eq!(seen, vec!["check", "waiting-confirmation", "backup", "upgrade"]);
        assert_eq!(UpgradeAction::Rollback.next(), None);
        assert_eq!(UpgradeAction::parse("rollback"), Some(UpgradeAction::Rollback));
    }
}
