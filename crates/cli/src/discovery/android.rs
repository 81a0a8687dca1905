//! Android device discovery via `adb`.

use std::collections::BTreeSet;
use std::path::PathBuf;

use async_trait::async_trait;
use herd::error::{HerdError, Result};
use herd::{DeviceDiscovery, DeviceId, DeviceKind, Platform};

use super::run_tool;

/// Discovery shelling out to the Android debug bridge.
pub struct AdbDiscovery {
	adb: PathBuf,
}

impl AdbDiscovery {
	/// Finds `adb` on PATH.
	pub fn locate() -> Option<Self> {
		which::which("adb").ok().map(|adb| Self { adb })
	}
}

#[async_trait]
impl DeviceDiscovery for AdbDiscovery {
	fn platform(&self) -> Platform {
		Platform::Android
	}

	async fn list_connected(&self) -> Result<BTreeSet<DeviceId>> {
		let output = run_tool(&self.adb, &["devices", "-l"]).await?;
		Ok(parse_device_list(&output))
	}

	async fn display_name(&self, id: &DeviceId) -> Result<String> {
		let output = run_tool(&self.adb, &["-s", id.as_str(), "shell", "getprop", "ro.product.model"]).await?;
		let model = output.trim();
		if model.is_empty() {
			return Err(HerdError::Discovery(format!("empty model name for {id}")));
		}
		Ok(model.to_string())
	}

	fn kind_of(&self, id: &DeviceId) -> DeviceKind {
		if id.as_str().starts_with("emulator-") {
			DeviceKind::Emulator
		} else {
			DeviceKind::Physical
		}
	}
}

/// Extracts serials in the `device` state from `adb devices -l` output.
///
/// Devices reported as `offline`, `unauthorized`, or `recovery` are not
/// usable for automation and are skipped.
fn parse_device_list(output: &str) -> BTreeSet<DeviceId> {
	output
		.lines()
		.filter(|line| !line.starts_with('*'))
		.filter_map(|line| {
			let mut fields = line.split_whitespace();
			let serial = fields.next()?;
			let state = fields.next()?;
			(state == "device").then(|| DeviceId::new(serial))
		})
		.collect()
}
