//! `herd run`: the long-running control plane.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use herd::{
	spawn_snapshot_task, DeviceRegistry, EventSink, LogSink, OrchestratorConfig, PollerConfig, PortPool,
	PresencePoller, SessionOrchestrator, SnapshotStore,
};
use herd_runtime::HostLauncher;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::discovery;

/// Pause between background registry snapshots.
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(30);

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
	let discoveries = discovery::available();
	anyhow::ensure!(
		!discoveries.is_empty(),
		"no device discovery tools found; install adb and/or idevice_id"
	);

	let server_program = which::which(&args.server)
		.with_context(|| format!("automation server `{}` not found on PATH", args.server.display()))?;
	let data_dir = data_dir();
	let log_dir = args.log_dir.unwrap_or_else(|| data_dir.join("session-logs"));

	let pool = Arc::new(PortPool::new(args.ports.start, args.ports.end));
	let registry = Arc::new(DeviceRegistry::new());

	let snapshot = (!args.no_state)
		.then(|| SnapshotStore::new(args.state_file.unwrap_or_else(|| data_dir.join("state.json"))));
	if let Some(store) = &snapshot {
		match store.load() {
			Ok(devices) if !devices.is_empty() => {
				info!(target = "herd", devices = devices.len(), path = %store.path().display(), "restored device records");
				registry.restore(devices);
			}
			Ok(_) => {}
			Err(err) => warn!(target = "herd", error = %err, "could not restore snapshot; starting fresh"),
		}
	}

	let orchestrator = Arc::new(SessionOrchestrator::new(
		OrchestratorConfig {
			server_program,
			log_dir,
			..OrchestratorConfig::default()
		},
		pool,
		Arc::new(HostLauncher::new()),
		registry.clone(),
	));
	let events: Arc<dyn EventSink> = Arc::new(LogSink);
	let poller = PresencePoller::new(
		PollerConfig {
			interval: Duration::from_secs(args.interval.max(1)),
			auto_manage: !args.no_auto,
		},
		discoveries,
		registry.clone(),
		orchestrator,
		events,
	);

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let snapshot_task = snapshot.map(|store| spawn_snapshot_task(store, registry.clone(), SNAPSHOT_INTERVAL, shutdown_rx.clone()));
	let poller_task = tokio::spawn(poller.run(shutdown_rx));

	tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
	info!(target = "herd", "shutdown requested; stopping sessions");
	let _ = shutdown_tx.send(true);

	poller_task.await.context("poller task failed")?;
	if let Some(task) = snapshot_task {
		task.await.context("snapshot task failed")?;
	}
	Ok(())
}

fn data_dir() -> PathBuf {
	dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("herd")
}
