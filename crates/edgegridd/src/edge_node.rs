//! Edge node assembly: wires the store, bus, and modules, then waits
//! for Ctrl-C.

use std::sync::Arc;

use edgegrid_bus::MessageBus;
use edgegrid_core::modules::{META_GROUP, META_MANAGER, TASK_GROUP, TASK_MANAGER};
use edgegrid_core::{CloudConnection, EdgeConfig};
use edgegrid_meta::{BoxFuture, ConnectedHook, MetaManager, spawn_sync_ticker};
use edgegrid_state::StateStore;
use edgegrid_task::{
    ActionRegistry, ActionRunner, NodeUpgradeJobRunner, ReportFile, ShellExecutor, StatusReporter,
    TaskManager, TaskReconciler,
};
use tokio::sync::watch;
use tracing::{info, warn};

pub async fn run(config: EdgeConfig) -> anyhow::Result<()> {
    info!(node = %config.task_manager.node_name, "EdgeGrid edge node starting");

    // ── Core handles ───────────────────────────────────────────

    let store = StateStore::open(&config.database.data_source)?;
    info!(path = ?config.database.data_source, "record store opened");

    let bus = MessageBus::new();
    bus.register(META_MANAGER, META_GROUP).await;
    bus.register(TASK_MANAGER, TASK_GROUP).await;
    let connection = CloudConnection::new();

    // ── Node tasks ─────────────────────────────────────────────

    let reporter = StatusReporter::new(
        bus.clone(),
        connection.clone(),
        config.meta_manager.context_send_group.clone(),
    );
    let report_file = ReportFile::new(&config.task_manager.report_path);
    let upgrade = NodeUpgradeJobRunner::new(
        store.clone(),
        Arc::new(ShellExecutor),
        reporter.clone(),
        report_file.clone(),
    );
    let registry = ActionRegistry::new(vec![Arc::new(upgrade) as Arc<dyn ActionRunner>]);
    let reconciler = Arc::new(TaskReconciler::new(
        store.clone(),
        registry.clone(),
        reporter,
        report_file,
    ));
    info!(report = ?config.task_manager.report_path, "task manager initialized");

    // ── Meta-manager ───────────────────────────────────────────

    let hook_reconciler = reconciler.clone();
    let on_connected: ConnectedHook = Arc::new(move || {
        let reconciler = hook_reconciler.clone();
        Box::pin(async move {
            if let Err(e) = reconciler.reconcile().await {
                warn!(error = %e, "task report reconcile failed");
            }
        }) as BoxFuture
    });
    let meta = MetaManager::new(
        bus.clone(),
        store,
        connection.clone(),
        config.meta_manager.clone(),
    )
    .with_connected_hook(on_connected);
    let task_manager = TaskManager::new(bus.clone(), registry, reconciler, connection);

    // ── Background loops ───────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let meta_handle = tokio::spawn(meta.run(shutdown_rx.clone()));
    let sync_handle = spawn_sync_ticker(
        bus.clone(),
        config.meta_manager.sync_period(),
        shutdown_rx.clone(),
    );
    let task_handle = tokio::spawn(task_manager.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = meta_handle.await;
    let _ = sync_handle.await;
    let _ = task_handle.await;

    info!("EdgeGrid edge node stopped");
    Ok(())
}
