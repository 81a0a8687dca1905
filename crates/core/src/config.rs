//! Component configuration types.

use std::path::PathBuf;
use std::time::Duration;

/// Tunables for session start/stop behavior.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
	/// Automation server program handed to the launcher.
	pub server_program: PathBuf,
	/// Working directory for spawned servers; inherits ours when absent.
	pub work_dir: Option<PathBuf>,
	/// Directory receiving per-session server logs.
	pub log_dir: PathBuf,
	/// Delay before checking whether a freshly spawned server already died.
	pub grace_delay: Duration,
	/// Maximum wait for a killed process tree to exit, per attempt.
	pub stop_timeout: Duration,
	/// Start attempts per device before giving up.
	pub start_attempts: u32,
	/// Kill attempts per session before forcing the stopped state.
	pub stop_attempts: u32,
	/// Backoff base; attempt `n` waits `base * 2^(n-1)`.
	pub retry_base_delay: Duration,
}

impl Default for OrchestratorConfig {
	fn default() -> Self {
		Self {
			server_program: PathBuf::from("appium"),
			work_dir: None,
			log_dir: PathBuf::from("session-logs"),
			grace_delay: Duration::from_millis(800),
			stop_timeout: Duration::from_secs(5),
			start_attempts: 3,
			stop_attempts: 3,
			retry_base_delay: Duration::from_millis(250),
		}
	}
}

/// Tunables for the presence poll loop.
#[derive(Debug, Clone)]
pub struct PollerConfig {
	/// Pause between poll ticks.
	pub interval: Duration,
	/// Whether sessions are started automatically for connected devices.
	pub auto_manage: bool,
}

impl Default for PollerConfig {
	fn default() -> Self {
		Self {
			interval: Duration::from_secs(2),
			auto_manage: true,
		}
	}
}
