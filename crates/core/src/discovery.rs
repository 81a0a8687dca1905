//! Device discovery collaborator trait.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::device::{DeviceId, DeviceKind, Platform};
use crate::error::Result;

/// Answers which devices of one platform family are currently attached.
///
/// Implementations shell out to platform tools and live outside the core;
/// the poller only ever sees this trait.
#[async_trait]
pub trait DeviceDiscovery: Send + Sync {
	/// Platform family this collaborator covers.
	fn platform(&self) -> Platform;

	/// Ids of all currently attached devices.
	async fn list_connected(&self) -> Result<BTreeSet<DeviceId>>;

	/// Human-readable name for `id`.
	async fn display_name(&self, id: &DeviceId) -> Result<String>;

	/// Classifies `id` as hardware or emulator.
	fn kind_of(&self, id: &DeviceId) -> DeviceKind {
		let _ = id;
		DeviceKind::Physical
	}
}
