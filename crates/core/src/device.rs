//! Device and session data model.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Stable platform-assigned device identifier (adb serial or iOS udid).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
	/// Wraps a raw identifier.
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	/// Returns the raw identifier.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for DeviceId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for DeviceId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

/// Platform family a device belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
	Android,
	Ios,
}

impl Platform {
	/// Number of ports a session on this platform needs.
	///
	/// Android servers take a command port plus a system port; iOS adds a
	/// video stream port on top of the WebDriver port.
	pub fn port_count(self) -> u16 {
		match self {
			Platform::Android => 2,
			Platform::Ios => 3,
		}
	}

	/// Lowercase platform name.
	pub fn as_str(self) -> &'static str {
		match self {
			Platform::Android => "android",
			Platform::Ios => "ios",
		}
	}
}

impl fmt::Display for Platform {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Whether a device is real hardware or an emulated instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
	Physical,
	Emulator,
}

/// Presence state tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
	Connected,
	Disconnected,
}

/// Session identifier, derived from the owning device id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
	/// Derives the session id for `device_id`.
	pub fn for_device(device_id: &DeviceId) -> Self {
		Self(device_id.as_str().to_string())
	}

	/// Returns the raw identifier.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
	Running,
	Stopped,
}

/// Live binding between a device and its automation-server process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
	pub id: SessionId,
	pub device_id: DeviceId,
	/// Contiguous port block owned by this session until stopped.
	pub ports: Vec<u16>,
	pub pid: Option<u32>,
	pub started_at: u64,
	pub status: SessionStatus,
}

impl Session {
	/// Returns `true` while the session has not been stopped.
	pub fn is_running(&self) -> bool {
		self.status == SessionStatus::Running
	}
}

/// A physical or emulated unit observed by discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
	pub id: DeviceId,
	pub platform: Platform,
	pub kind: DeviceKind,
	pub name: String,
	pub state: DeviceState,
	pub connected_at: u64,
	pub last_seen: u64,
	pub disconnected_at: Option<u64>,
	pub session: Option<Session>,
}

impl Device {
	/// Creates a freshly observed, connected device.
	pub fn new(id: DeviceId, platform: Platform, kind: DeviceKind, name: impl Into<String>) -> Self {
		let now = now_ts();
		Self {
			id,
			platform,
			kind,
			name: name.into(),
			state: DeviceState::Connected,
			connected_at: now,
			last_seen: now,
			disconnected_at: None,
			session: None,
		}
	}

	/// Returns `true` when the device owns a non-stopped session.
	pub fn has_running_session(&self) -> bool {
		self.session.as_ref().is_some_and(Session::is_running)
	}
}

/// Current unix timestamp in whole seconds.
pub fn now_ts() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn port_counts_per_platform() {
		assert_eq!(Platform::Android.port_count(), 2);
		assert_eq!(Platform::Ios.port_count(), 3);
	}

	#[test]
	fn session_id_derives_from_device_id() {
		let device = DeviceId::new("emulator-5554");
		assert_eq!(SessionId::for_device(&device).as_str(), "emulator-5554");
	}

	#[test]
	fn new_device_is_connected_and_sessionless() {
		let device = Device::new(DeviceId::new("abc123"), Platform::Ios, DeviceKind::Physical, "iPhone 15");
		assert_eq!(device.state, DeviceState::Connected);
		assert!(!device.has_running_session());
		assert!(device.disconnected_at.is_none());
		assert!(device.connected_at > 0);
	}

	#[test]
	fn stopped_session_is_not_running() {
		let device_id = DeviceId::new("abc123");
		let mut session = Session {
			id: SessionId::for_device(&device_id),
			device_id,
			ports: vec![4723, 4724],
			pid: Some(4242),
			started_at: now_ts(),
			status: SessionStatus::Running,
		};
		assert!(session.is_running());
		session.status = SessionStatus::Stopped;
		assert!(!session.is_running());
	}
}
