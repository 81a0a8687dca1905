//! Lifecycle event sink.

use serde::Serialize;
use tracing::info;

use crate::device::{DeviceId, Platform, SessionId};

/// Device/session lifecycle transitions worth announcing.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HerdEvent {
	DeviceConnected { device_id: DeviceId, platform: Platform },
	DeviceDisconnected { device_id: DeviceId },
	SessionStarted { device_id: DeviceId, session_id: SessionId, ports: Vec<u16> },
	SessionEnded { device_id: DeviceId },
}

/// Outward notification sink.
///
/// Emission is fire-and-forget: implementations must swallow their own
/// failures so a broken sink can never affect registry or orchestrator
/// state.
pub trait EventSink: Send + Sync {
	/// Delivers one event.
	fn emit(&self, event: &HerdEvent);
}

/// Default sink writing structured log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
	fn emit(&self, event: &HerdEvent) {
		info!(target = "herd.events", event = ?event, "lifecycle event");
	}
}
