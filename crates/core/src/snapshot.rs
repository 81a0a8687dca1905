//! Registry snapshot persistence.
//!
//! Restart continuity only: correctness never depends on a snapshot being
//! present or fresh, and every failure here is logged rather than
//! propagated.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::device::{Device, DeviceState, SessionStatus};
use crate::error::Result;
use crate::registry::DeviceRegistry;

/// Atomic JSON snapshot of every registry record.
pub struct SnapshotStore {
	path: PathBuf,
}

impl SnapshotStore {
	/// Creates a store writing to `path`.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// Snapshot file location.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Writes the full registry state, atomically (temp file + rename).
	pub fn save(&self, registry: &DeviceRegistry) -> Result<()> {
		let mut devices = registry.all();
		devices.sort_by(|a, b| a.id.cmp(&b.id));
		let json = serde_json::to_vec_pretty(&devices)?;

		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent)?;
		}
		let tmp = self.path.with_extension("tmp");
		fs::write(&tmp, json)?;
		fs::rename(&tmp, &self.path)?;
		debug!(target = "herd.state", path = %self.path.display(), devices = devices.len(), "snapshot saved");
		Ok(())
	}

	/// Loads the snapshot, demoting every record to a safe restart state.
	///
	/// Child processes do not survive the control plane, so restored
	/// devices come back Disconnected and their sessions Stopped; ports are
	/// not re-reserved.
	pub fn load(&self) -> Result<Vec<Device>> {
		let bytes = match fs::read(&self.path) {
			Ok(bytes) => bytes,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(err) => return Err(err.into()),
		};

		let mut devices: Vec<Device> = serde_json::from_slice(&bytes)?;
		for device in &mut devices {
			if device.state == DeviceState::Connected {
				device.state = DeviceState::Disconnected;
				device.disconnected_at.get_or_insert(device.last_seen);
			}
			if let Some(session) = &mut device.session {
				if let Some(pid) = session.pid.take() {
					if session.status == SessionStatus::Running && herd_runtime::process::pid_is_alive(pid) {
						warn!(
							target = "herd.state",
							device = %device.id,
							pid,
							"automation server from a previous run may still be alive"
						);
					}
				}
				session.status = SessionStatus::Stopped;
			}
		}
		Ok(devices)
	}
}

/// Spawns the periodic snapshot task; saves once more on shutdown.
pub fn spawn_snapshot_task(
	store: SnapshotStore,
	registry: Arc<DeviceRegistry>,
	interval: Duration,
	mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		loop {
			tokio::select! {
				_ = tokio::time::sleep(interval) => {
					if let Err(err) = store.save(&registry) {
						warn!(target = "herd.state", path = %store.path().display(), error = %err, "snapshot save failed");
					}
				}
				_ = shutdown.changed() => break,
			}
		}
		if let Err(err) = store.save(&registry) {
			warn!(target = "herd.state", path = %store.path().display(), error = %err, "final snapshot save failed");
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::device::{DeviceId, DeviceKind, Platform, Session, SessionId};

	fn populated_registry() -> (DeviceRegistry, DeviceId) {
		let registry = DeviceRegistry::new();
		let id = DeviceId::new("serial-1");
		registry.observe_connected(&id, Platform::Android, DeviceKind::Physical, "Pixel 8");
		registry.attach_session(
			&id,
			Session {
				id: SessionId::for_device(&id),
				device_id: id.clone(),
				ports: vec![4723, 4724],
				pid: Some(321),
				started_at: crate::device::now_ts(),
				status: SessionStatus::Running,
			},
		);
		(registry, id)
	}

	#[test]
	fn round_trip_demotes_restored_state() {
		let dir = tempfile::tempdir().unwrap();
		let store = SnapshotStore::new(dir.path().join("state").join("herd.json"));
		let (registry, _) = populated_registry();

		store.save(&registry).unwrap();
		let restored = store.load().unwrap();

		assert_eq!(restored.len(), 1);
		let device = &restored[0];
		assert_eq!(device.state, DeviceState::Disconnected);
		assert!(device.disconnected_at.is_some());
		let session = device.session.as_ref().unwrap();
		assert_eq!(session.status, SessionStatus::Stopped);
		assert_eq!(session.pid, None);
		// Port history survives for inspection even though nothing is
		// re-reserved.
		assert_eq!(session.ports, vec![4723, 4724]);
	}

	#[test]
	fn missing_snapshot_loads_empty() {
		let dir = tempfile::tempdir().unwrap();
		let store = SnapshotStore::new(dir.path().join("absent.json"));
		assert!(store.load().unwrap().is_empty());
	}

	#[test]
	fn corrupt_snapshot_is_an_error() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("herd.json");
		std::fs::write(&path, b"not json").unwrap();
		assert!(SnapshotStore::new(path).load().is_err());
	}

	#[test]
	fn save_replaces_previous_contents() {
		let dir = tempfile::tempdir().unwrap();
		let store = SnapshotStore::new(dir.path().join("herd.json"));
		let (registry, id) = populated_registry();

		store.save(&registry).unwrap();
		registry.mark_disconnected(&id);
		store.save(&registry).unwrap();

		let restored = store.load().unwrap();
		assert_eq!(restored.len(), 1);
		assert_eq!(restored[0].state, DeviceState::Disconnected);
	}
}
