//! Authoritative device/session registry.
//!
//! The registry is the sole owner of [`Device`] and [`Session`] records.
//! Writes all flow through the poller's dispatch phase (single-writer
//! contract); reads may come from any task and never block behind the
//! snapshot timer.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;
use tracing::debug;

use crate::device::{now_ts, Device, DeviceId, DeviceKind, DeviceState, Platform, Session, SessionStatus};

/// Concurrent map of device id to device state.
#[derive(Default)]
pub struct DeviceRegistry {
	devices: RwLock<HashMap<DeviceId, Device>>,
}

impl DeviceRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Records a device observed as connected, creating it on first sight.
	///
	/// A returning device keeps its history: `connected_at` is restamped on
	/// the Disconnected → Connected transition, `disconnected_at` cleared,
	/// and the display name refreshed.
	pub fn observe_connected(&self, id: &DeviceId, platform: Platform, kind: DeviceKind, name: &str) {
		let mut devices = self.devices.write();
		match devices.get_mut(id) {
			Some(device) => {
				if device.state == DeviceState::Disconnected {
					device.state = DeviceState::Connected;
					device.connected_at = now_ts();
					device.disconnected_at = None;
				}
				device.kind = kind;
				device.name = name.to_string();
				device.last_seen = now_ts();
			}
			None => {
				devices.insert(id.clone(), Device::new(id.clone(), platform, kind, name));
			}
		}
	}

	/// Refreshes `last_seen` for a device still present in the current poll.
	pub fn touch(&self, id: &DeviceId) {
		if let Some(device) = self.devices.write().get_mut(id) {
			device.last_seen = now_ts();
		}
	}

	/// Marks a device disconnected, stamping `disconnected_at`.
	///
	/// The record is kept; devices are never deleted.
	pub fn mark_disconnected(&self, id: &DeviceId) {
		let mut devices = self.devices.write();
		let Some(device) = devices.get_mut(id) else {
			return;
		};
		if device.state == DeviceState::Connected {
			device.state = DeviceState::Disconnected;
			device.disconnected_at = Some(now_ts());
		}
	}

	/// Attaches a freshly started session to its device.
	pub fn attach_session(&self, id: &DeviceId, session: Session) {
		let mut devices = self.devices.write();
		let Some(device) = devices.get_mut(id) else {
			debug!(target = "herd.registry", device = %id, "attach for unknown device dropped");
			return;
		};
		device.session = Some(session);
	}

	/// Applies `update` to the device's session, if it has one.
	///
	/// This is the orchestrator's only mutation entry point into registry
	/// state. Returns `true` when a session existed and was updated.
	pub fn update_session(&self, id: &DeviceId, update: impl FnOnce(&mut Session)) -> bool {
		let mut devices = self.devices.write();
		let Some(session) = devices.get_mut(id).and_then(|d| d.session.as_mut()) else {
			return false;
		};
		update(session);
		true
	}

	/// Marks the device's session stopped; `true` when one was running.
	pub fn stop_session_record(&self, id: &DeviceId) -> bool {
		let mut devices = self.devices.write();
		let Some(session) = devices.get_mut(id).and_then(|d| d.session.as_mut()) else {
			return false;
		};
		let was_running = session.is_running();
		session.status = SessionStatus::Stopped;
		was_running
	}

	/// Returns a copy of the device record.
	pub fn get(&self, id: &DeviceId) -> Option<Device> {
		self.devices.read().get(id).cloned()
	}

	/// Ids of connected devices on `platform`.
	pub fn connected_ids(&self, platform: Platform) -> BTreeSet<DeviceId> {
		self.devices
			.read()
			.values()
			.filter(|d| d.platform == platform && d.state == DeviceState::Connected)
			.map(|d| d.id.clone())
			.collect()
	}

	/// Ids of connected devices across all platforms.
	pub fn all_connected_ids(&self) -> BTreeSet<DeviceId> {
		self.devices
			.read()
			.values()
			.filter(|d| d.state == DeviceState::Connected)
			.map(|d| d.id.clone())
			.collect()
	}

	/// Copies of every known device record.
	pub fn all(&self) -> Vec<Device> {
		self.devices.read().values().cloned().collect()
	}

	/// Number of known devices, connected or not.
	pub fn len(&self) -> usize {
		self.devices.read().len()
	}

	/// Returns `true` when no device was ever observed.
	pub fn is_empty(&self) -> bool {
		self.devices.read().is_empty()
	}

	/// Seeds the registry from a restored snapshot.
	///
	/// Records already observed this run win over restored ones.
	pub fn restore(&self, restored: Vec<Device>) {
		let mut devices = self.devices.write();
		for device in restored {
			devices.entry(device.id.clone()).or_insert(device);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn registry_with(id: &str) -> (DeviceRegistry, DeviceId) {
		let registry = DeviceRegistry::new();
		let device_id = DeviceId::new(id);
		registry.observe_connected(&device_id, Platform::Android, DeviceKind::Physical, "Pixel 8");
		(registry, device_id)
	}

	fn running_session(device_id: &DeviceId) -> Session {
		Session {
			id: crate::device::SessionId::for_device(device_id),
			device_id: device_id.clone(),
			ports: vec![4723, 4724],
			pid: Some(100),
			started_at: now_ts(),
			status: SessionStatus::Running,
		}
	}

	#[test]
	fn observe_creates_then_enriches() {
		let (registry, id) = registry_with("serial-1");
		assert_eq!(registry.len(), 1);

		registry.observe_connected(&id, Platform::Android, DeviceKind::Physical, "Pixel 8 Pro");
		let device = registry.get(&id).unwrap();
		assert_eq!(device.name, "Pixel 8 Pro");
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn disconnect_keeps_the_record() {
		let (registry, id) = registry_with("serial-1");
		registry.mark_disconnected(&id);

		let device = registry.get(&id).unwrap();
		assert_eq!(device.state, DeviceState::Disconnected);
		assert!(device.disconnected_at.is_some());
		assert!(registry.connected_ids(Platform::Android).is_empty());
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn reconnect_clears_disconnect_stamp() {
		let (registry, id) = registry_with("serial-1");
		registry.mark_disconnected(&id);
		registry.observe_connected(&id, Platform::Android, DeviceKind::Physical, "Pixel 8");

		let device = registry.get(&id).unwrap();
		assert_eq!(device.state, DeviceState::Connected);
		assert!(device.disconnected_at.is_none());
	}

	#[test]
	fn session_updates_flow_through_the_registry() {
		let (registry, id) = registry_with("serial-1");
		registry.attach_session(&id, running_session(&id));
		assert!(registry.get(&id).unwrap().has_running_session());

		assert!(registry.stop_session_record(&id));
		assert!(!registry.get(&id).unwrap().has_running_session());
		// Second stop finds nothing running.
		assert!(!registry.stop_session_record(&id));
	}

	#[test]
	fn update_session_without_session_is_a_noop() {
		let (registry, id) = registry_with("serial-1");
		assert!(!registry.update_session(&id, |s| s.status = SessionStatus::Stopped));
	}

	#[test]
	fn connected_ids_filter_by_platform() {
		let registry = DeviceRegistry::new();
		let android = DeviceId::new("serial-1");
		let ios = DeviceId::new("udid-1");
		registry.observe_connected(&android, Platform::Android, DeviceKind::Emulator, "emulator");
		registry.observe_connected(&ios, Platform::Ios, DeviceKind::Physical, "iPhone");

		assert_eq!(registry.connected_ids(Platform::Android), BTreeSet::from([android.clone()]));
		assert_eq!(registry.all_connected_ids(), BTreeSet::from([android, ios]));
	}

	#[test]
	fn restore_does_not_clobber_live_records() {
		let (registry, id) = registry_with("serial-1");
		let mut stale = registry.get(&id).unwrap();
		stale.name = "old name".to_string();
		registry.restore(vec![stale]);
		assert_eq!(registry.get(&id).unwrap().name, "Pixel 8");
	}
}
