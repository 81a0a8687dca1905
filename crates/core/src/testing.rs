//! Test doubles for launcher, discovery, and event collaborators.
//!
//! Shared by unit tests and the lifecycle integration tests; nothing here
//! is part of the supported API surface.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use herd_runtime::launcher::{LaunchError, ManagedProcess, OutputStream, ProcessLauncher};
use herd_runtime::LaunchSpec;
use parking_lot::Mutex;

use crate::device::{DeviceId, DeviceKind, Platform};
use crate::discovery::DeviceDiscovery;
use crate::error::{HerdError, Result};
use crate::events::{EventSink, HerdEvent};

/// Scripted behavior for one [`FakeLauncher`] launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
	/// Process spawns and keeps running until killed.
	Running,
	/// Process spawns but is already dead at the grace check.
	ExitsDuringGrace,
	/// Spawn fails with a transient I/O error.
	FailsSpawn,
	/// Spawn fails with permission denied.
	FailsPermission,
	/// Process runs and ignores every kill.
	Unkillable,
}

/// [`ProcessLauncher`] double replaying scripted outcomes.
///
/// Launches beyond the script default to [`LaunchOutcome::Running`].
#[derive(Default)]
pub struct FakeLauncher {
	script: Mutex<VecDeque<LaunchOutcome>>,
	launches: AtomicUsize,
	kills: Arc<AtomicUsize>,
}

impl FakeLauncher {
	/// Creates a launcher whose every launch succeeds.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends outcomes consumed by subsequent launches, in order.
	pub fn script(&self, outcomes: impl IntoIterator<Item = LaunchOutcome>) {
		self.script.lock().extend(outcomes);
	}

	/// Number of launch calls observed.
	pub fn launch_count(&self) -> usize {
		self.launches.load(Ordering::SeqCst)
	}

	/// Number of kill calls observed across all spawned processes.
	pub fn kill_count(&self) -> usize {
		self.kills.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl ProcessLauncher for FakeLauncher {
	async fn launch(&self, spec: &LaunchSpec) -> std::result::Result<Box<dyn ManagedProcess>, LaunchError> {
		let n = self.launches.fetch_add(1, Ordering::SeqCst);
		let outcome = self.script.lock().pop_front().unwrap_or(LaunchOutcome::Running);
		let program = spec.program().display().to_string();

		match outcome {
			LaunchOutcome::Running => Ok(Box::new(FakeProcess {
				exited: false,
				unkillable: false,
				kills: self.kills.clone(),
				pid: 9000 + n as u32,
			})),
			LaunchOutcome::ExitsDuringGrace => Ok(Box::new(FakeProcess {
				exited: true,
				unkillable: false,
				kills: self.kills.clone(),
				pid: 9000 + n as u32,
			})),
			LaunchOutcome::Unkillable => Ok(Box::new(FakeProcess {
				exited: false,
				unkillable: true,
				kills: self.kills.clone(),
				pid: 9000 + n as u32,
			})),
			LaunchOutcome::FailsSpawn => Err(LaunchError::Spawn {
				program,
				source: io::Error::other("injected spawn failure"),
			}),
			LaunchOutcome::FailsPermission => Err(LaunchError::PermissionDenied {
				program,
				source: io::Error::new(io::ErrorKind::PermissionDenied, "injected permission failure"),
			}),
		}
	}
}

struct FakeProcess {
	exited: bool,
	unkillable: bool,
	kills: Arc<AtomicUsize>,
	pid: u32,
}

#[async_trait]
impl ManagedProcess for FakeProcess {
	fn pid(&self) -> Option<u32> {
		Some(self.pid)
	}

	fn has_exited(&mut self) -> bool {
		self.exited
	}

	async fn kill_tree(&mut self) -> io::Result<()> {
		self.kills.fetch_add(1, Ordering::SeqCst);
		if !self.unkillable {
			self.exited = true;
		}
		Ok(())
	}

	async fn wait_with_timeout(&mut self, _timeout: Duration) -> bool {
		self.exited
	}

	fn take_stdout(&mut self) -> Option<OutputStream> {
		None
	}

	fn take_stderr(&mut self) -> Option<OutputStream> {
		None
	}
}

/// [`DeviceDiscovery`] double whose attached set is mutated by the test.
pub struct ScriptedDiscovery {
	platform: Platform,
	attached: Mutex<BTreeSet<DeviceId>>,
	names: Mutex<HashMap<DeviceId, String>>,
	fail_next: AtomicBool,
}

impl ScriptedDiscovery {
	/// Creates a discovery for `platform` with nothing attached.
	pub fn new(platform: Platform) -> Self {
		Self {
			platform,
			attached: Mutex::new(BTreeSet::new()),
			names: Mutex::new(HashMap::new()),
			fail_next: AtomicBool::new(false),
		}
	}

	/// Marks a device as attached.
	pub fn attach(&self, id: &str) {
		self.attached.lock().insert(DeviceId::new(id));
	}

	/// Marks a device as no longer attached.
	pub fn detach(&self, id: &str) {
		self.attached.lock().remove(&DeviceId::new(id));
	}

	/// Registers the display name returned for `id`.
	pub fn set_name(&self, id: &str, name: &str) {
		self.names.lock().insert(DeviceId::new(id), name.to_string());
	}

	/// Makes the next `list_connected` call fail.
	pub fn fail_next_poll(&self) {
		self.fail_next.store(true, Ordering::SeqCst);
	}
}

#[async_trait]
impl DeviceDiscovery for ScriptedDiscovery {
	fn platform(&self) -> Platform {
		self.platform
	}

	async fn list_connected(&self) -> Result<BTreeSet<DeviceId>> {
		if self.fail_next.swap(false, Ordering::SeqCst) {
			return Err(HerdError::Discovery("injected discovery failure".to_string()));
		}
		Ok(self.attached.lock().clone())
	}

	async fn display_name(&self, id: &DeviceId) -> Result<String> {
		self.names
			.lock()
			.get(id)
			.cloned()
			.ok_or_else(|| HerdError::Discovery(format!("no name for {id}")))
	}

	fn kind_of(&self, id: &DeviceId) -> DeviceKind {
		if id.as_str().starts_with("emulator-") {
			DeviceKind::Emulator
		} else {
			DeviceKind::Physical
		}
	}
}

/// [`EventSink`] double retaining every emitted event.
#[derive(Default)]
pub struct RecordingSink {
	events: Mutex<Vec<HerdEvent>>,
}

impl RecordingSink {
	/// Creates an empty sink.
	pub fn new() -> Self {
		Self::default()
	}

	/// Copies of all events emitted so far.
	pub fn events(&self) -> Vec<HerdEvent> {
		self.events.lock().clone()
	}

	/// Number of `SessionStarted` events emitted so far.
	pub fn sessions_started(&self) -> usize {
		self.events
			.lock()
			.iter()
			.filter(|e| matches!(e, HerdEvent::SessionStarted { .. }))
			.count()
	}
}

impl EventSink for RecordingSink {
	fn emit(&self, event: &HerdEvent) {
		self.events.lock().push(event.clone());
	}
}
