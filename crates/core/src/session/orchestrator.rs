//! Session start/stop orchestration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use herd_runtime::launcher::{LaunchError, ManagedProcess, ProcessLauncher};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::output;
use super::spec::build_launch_spec;
use crate::config::OrchestratorConfig;
use crate::device::{now_ts, Device, DeviceId, Session, SessionId, SessionStatus};
use crate::ports::PortPool;
use crate::registry::DeviceRegistry;

/// Outcome of a single start attempt.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
	/// The pool has no window of the required width. Retrying cannot create
	/// capacity, so this short-circuits the attempt loop.
	#[error("no {needed}-port window available")]
	NoCapacity { needed: u16 },

	/// The launcher refused or failed the spawn.
	#[error(transparent)]
	Launch(#[from] LaunchError),

	/// The server exited inside the startup grace window.
	#[error("server exited during startup grace window")]
	EarlyExit,
}

impl StartError {
	/// Returns `true` when further attempts cannot succeed.
	pub fn is_permanent(&self) -> bool {
		match self {
			StartError::NoCapacity { .. } => true,
			StartError::Launch(err) => err.is_permanent(),
			StartError::EarlyExit => false,
		}
	}
}

/// Starts, supervises, and stops automation-server sessions.
///
/// Callers invoke [`start_session`](Self::start_session) only for devices
/// the poller just confirmed connected; the orchestrator does not
/// re-validate presence.
pub struct SessionOrchestrator {
	config: OrchestratorConfig,
	pool: Arc<PortPool>,
	launcher: Arc<dyn ProcessLauncher>,
	registry: Arc<DeviceRegistry>,
	/// Live process handles keyed by session id. The only place child
	/// processes are tracked; injected collaborators everywhere else.
	handles: Mutex<HashMap<SessionId, Box<dyn ManagedProcess>>>,
}

impl SessionOrchestrator {
	/// Creates an orchestrator over the given collaborators.
	pub fn new(config: OrchestratorConfig, pool: Arc<PortPool>, launcher: Arc<dyn ProcessLauncher>, registry: Arc<DeviceRegistry>) -> Self {
		Self {
			config,
			pool,
			launcher,
			registry,
			handles: Mutex::new(HashMap::new()),
		}
	}

	/// Starts an automation server for `device`.
	///
	/// Transient failures (spawn I/O, death inside the grace window) are
	/// retried with exponential backoff; capacity exhaustion and
	/// permission errors end the sequence immediately. Every failed
	/// attempt releases its ports before the next one re-allocates fresh.
	pub async fn start_session(&self, device: &Device) -> Option<Session> {
		let needed = device.platform.port_count();

		for attempt in 1..=self.config.start_attempts {
			match self.try_start(device, needed).await {
				Ok(session) => {
					info!(
						target = "herd.session",
						device = %device.id,
						ports = ?session.ports,
						pid = session.pid,
						"session started"
					);
					return Some(session);
				}
				Err(StartError::NoCapacity { needed }) => {
					// The one condition needing operator action (range too
					// small); keep it distinguishable from transient noise.
					warn!(
						target = "herd.session",
						device = %device.id,
						needed,
						available = self.pool.available(),
						"port range exhausted; device left without a session until capacity frees"
					);
					return None;
				}
				Err(err) if err.is_permanent() => {
					error!(target = "herd.session", device = %device.id, error = %err, "session start failed permanently");
					return None;
				}
				Err(err) => {
					warn!(target = "herd.session", device = %device.id, attempt, error = %err, "session start attempt failed");
					if attempt < self.config.start_attempts {
						tokio::time::sleep(self.backoff(attempt)).await;
					}
				}
			}
		}

		error!(
			target = "herd.session",
			device = %device.id,
			attempts = self.config.start_attempts,
			"giving up on session start"
		);
		None
	}

	async fn try_start(&self, device: &Device, needed: u16) -> Result<Session, StartError> {
		let Some(ports) = self.pool.allocate_consecutive(needed) else {
			return Err(StartError::NoCapacity { needed });
		};

		match self.launch_and_confirm(device, &ports).await {
			Ok(session) => Ok(session),
			Err(err) => {
				// Failed attempts must never keep their ports.
				self.pool.release(&ports);
				Err(err)
			}
		}
	}

	async fn launch_and_confirm(&self, device: &Device, ports: &[u16]) -> Result<Session, StartError> {
		let spec = build_launch_spec(&self.config, device, ports);
		let mut handle = self.launcher.launch(&spec).await?;

		let session_id = SessionId::for_device(&device.id);
		let log_path = output::log_path(&self.config.log_dir, &session_id);
		if let Some(stdout) = handle.take_stdout() {
			output::spawn_reader(log_path.clone(), "out", stdout);
		}
		if let Some(stderr) = handle.take_stderr() {
			output::spawn_reader(log_path, "err", stderr);
		}

		tokio::time::sleep(self.config.grace_delay).await;
		if handle.has_exited() {
			return Err(StartError::EarlyExit);
		}

		let session = Session {
			id: session_id.clone(),
			device_id: device.id.clone(),
			ports: ports.to_vec(),
			pid: handle.pid(),
			started_at: now_ts(),
			status: SessionStatus::Running,
		};
		self.handles.lock().await.insert(session_id, handle);
		Ok(session)
	}

	/// Stops the session owned by `device_id`.
	///
	/// A device without a running session is a successful no-op. Otherwise
	/// the process tree is killed with bounded retries, and the ports are
	/// released and the session marked Stopped on the final attempt
	/// regardless of the kill outcome: a stuck child must never pin a port
	/// block indefinitely. Returns `false` only when termination was
	/// unclean.
	pub async fn stop_session(&self, device_id: &DeviceId) -> bool {
		let session = self.registry.get(device_id).and_then(|d| d.session.filter(Session::is_running));
		let Some(session) = session else {
			debug!(target = "herd.session", device = %device_id, "stop requested with no running session");
			return true;
		};

		let handle = self.handles.lock().await.remove(&session.id);
		let clean = match handle {
			Some(mut handle) => self.terminate(device_id, handle.as_mut()).await,
			// No tracked process (e.g. restored record); just reclaim.
			None => true,
		};

		self.pool.release(&session.ports);
		self.registry.stop_session_record(device_id);
		info!(target = "herd.session", device = %device_id, ports = ?session.ports, clean, "session stopped");
		clean
	}

	async fn terminate(&self, device_id: &DeviceId, handle: &mut dyn ManagedProcess) -> bool {
		for attempt in 1..=self.config.stop_attempts {
			match handle.kill_tree().await {
				Ok(()) => {
					if handle.wait_with_timeout(self.config.stop_timeout).await {
						return true;
					}
					warn!(target = "herd.session", device = %device_id, attempt, "server did not exit within stop timeout");
				}
				Err(err) => {
					warn!(target = "herd.session", device = %device_id, attempt, error = %err, "kill failed");
				}
			}
			if attempt < self.config.stop_attempts {
				tokio::time::sleep(self.backoff(attempt)).await;
			}
		}
		false
	}

	fn backoff(&self, attempt: u32) -> Duration {
		self.config.retry_base_delay * 2u32.pow(attempt.saturating_sub(1))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::device::{DeviceKind, Platform};
	use crate::testing::{FakeLauncher, LaunchOutcome};

	fn test_config() -> OrchestratorConfig {
		OrchestratorConfig {
			grace_delay: Duration::from_millis(5),
			stop_timeout: Duration::from_millis(20),
			retry_base_delay: Duration::from_millis(1),
			log_dir: std::env::temp_dir().join("herd-orchestrator-tests"),
			..OrchestratorConfig::default()
		}
	}

	struct Rig {
		pool: Arc<PortPool>,
		launcher: Arc<FakeLauncher>,
		registry: Arc<DeviceRegistry>,
		orchestrator: SessionOrchestrator,
	}

	fn rig_with_range(start: u16, end: u16) -> Rig {
		let pool = Arc::new(PortPool::with_probe(start, end, Arc::new(|_| true)));
		let launcher = Arc::new(FakeLauncher::new());
		let registry = Arc::new(DeviceRegistry::new());
		let orchestrator = SessionOrchestrator::new(test_config(), pool.clone(), launcher.clone(), registry.clone());
		Rig { pool, launcher, registry, orchestrator }
	}

	fn rig() -> Rig {
		rig_with_range(4723, 4750)
	}

	fn android_device(rig: &Rig, id: &str) -> Device {
		let device_id = DeviceId::new(id);
		rig.registry.observe_connected(&device_id, Platform::Android, DeviceKind::Physical, "Pixel");
		rig.registry.get(&device_id).unwrap()
	}

	#[tokio::test]
	async fn start_allocates_ports_and_tracks_the_process() {
		let rig = rig();
		let device = android_device(&rig, "serial-1");

		let session = rig.orchestrator.start_session(&device).await.expect("start should succeed");
		assert_eq!(session.ports, vec![4723, 4724]);
		assert!(session.is_running());
		assert!(session.pid.is_some());
		assert_eq!(rig.pool.allocated(), vec![4723, 4724]);
		assert_eq!(rig.launcher.launch_count(), 1);
	}

	#[tokio::test]
	async fn spawn_failures_retry_then_release_everything() {
		let rig = rig();
		let device = android_device(&rig, "serial-1");
		rig.launcher
			.script([LaunchOutcome::FailsSpawn, LaunchOutcome::FailsSpawn, LaunchOutcome::FailsSpawn]);

		assert!(rig.orchestrator.start_session(&device).await.is_none());
		assert_eq!(rig.launcher.launch_count(), 3);
		assert!(rig.pool.allocated().is_empty());
	}

	#[tokio::test]
	async fn early_exit_in_grace_window_fails_the_start_and_releases_ports() {
		let rig = rig();
		let device = android_device(&rig, "serial-1");
		rig.launcher.script([
			LaunchOutcome::ExitsDuringGrace,
			LaunchOutcome::ExitsDuringGrace,
			LaunchOutcome::ExitsDuringGrace,
		]);

		assert!(rig.orchestrator.start_session(&device).await.is_none());
		assert!(rig.pool.allocated().is_empty());
	}

	#[tokio::test]
	async fn transient_failure_then_success_reallocates_fresh() {
		let rig = rig();
		let device = android_device(&rig, "serial-1");
		rig.launcher.script([LaunchOutcome::FailsSpawn, LaunchOutcome::Running]);

		let session = rig.orchestrator.start_session(&device).await.expect("second attempt should succeed");
		assert_eq!(rig.launcher.launch_count(), 2);
		assert_eq!(rig.pool.allocated(), session.ports);
	}

	#[tokio::test]
	async fn permission_denied_short_circuits() {
		let rig = rig();
		let device = android_device(&rig, "serial-1");
		rig.launcher.script([LaunchOutcome::FailsPermission]);

		assert!(rig.orchestrator.start_session(&device).await.is_none());
		assert_eq!(rig.launcher.launch_count(), 1);
		assert!(rig.pool.allocated().is_empty());
	}

	#[tokio::test]
	async fn capacity_exhaustion_never_reaches_the_launcher() {
		let rig = rig_with_range(4723, 4723);
		let device = android_device(&rig, "serial-1");

		assert!(rig.orchestrator.start_session(&device).await.is_none());
		assert_eq!(rig.launcher.launch_count(), 0);
	}

	#[tokio::test]
	async fn stop_releases_ports_exactly_once() {
		let rig = rig();
		let device = android_device(&rig, "serial-1");
		let session = rig.orchestrator.start_session(&device).await.unwrap();
		rig.registry.attach_session(&device.id, session.clone());

		assert!(rig.orchestrator.stop_session(&device.id).await);
		assert_eq!(rig.launcher.kill_count(), 1);
		assert!(rig.pool.allocated().is_empty());
		assert!(!rig.registry.get(&device.id).unwrap().has_running_session());

		// Another session grabs the freed block; a repeated stop must not
		// release it out from under the new owner.
		let reclaimed = rig.pool.allocate_consecutive(2).unwrap();
		assert_eq!(reclaimed, session.ports);
		assert!(rig.orchestrator.stop_session(&device.id).await);
		assert_eq!(rig.launcher.kill_count(), 1);
		assert_eq!(rig.pool.allocated(), reclaimed);
	}

	#[tokio::test]
	async fn stop_without_a_session_is_a_successful_noop() {
		let rig = rig();
		let device = android_device(&rig, "serial-1");
		assert!(rig.orchestrator.stop_session(&device.id).await);
		assert!(rig.orchestrator.stop_session(&DeviceId::new("never-seen")).await);
	}

	#[tokio::test]
	async fn unkillable_server_still_surrenders_its_ports() {
		let rig = rig();
		let device = android_device(&rig, "serial-1");
		rig.launcher.script([LaunchOutcome::Unkillable]);
		let session = rig.orchestrator.start_session(&device).await.unwrap();
		rig.registry.attach_session(&device.id, session);

		// Unclean stop: the kill never lands, but ports and record are
		// reclaimed on the final attempt anyway.
		assert!(!rig.orchestrator.stop_session(&device.id).await);
		assert_eq!(rig.launcher.kill_count(), 3);
		assert!(rig.pool.allocated().is_empty());
		assert!(!rig.registry.get(&device.id).unwrap().has_running_session());
	}
}
