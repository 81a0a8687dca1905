//! iOS device discovery via libimobiledevice tools.

use std::collections::BTreeSet;
use std::path::PathBuf;

use async_trait::async_trait;
use herd::error::{HerdError, Result};
use herd::{DeviceDiscovery, DeviceId, Platform};

use super::run_tool;

/// Discovery shelling out to `idevice_id`, with `idevicename` for display
/// names when installed.
pub struct IosDiscovery {
	idevice_id: PathBuf,
	idevicename: Option<PathBuf>,
}

impl IosDiscovery {
	/// Finds `idevice_id` on PATH.
	pub fn locate() -> Option<Self> {
		which::which("idevice_id").ok().map(|idevice_id| Self {
			idevice_id,
			idevicename: which::which("idevicename").ok(),
		})
	}
}

#[async_trait]
impl DeviceDiscovery for IosDiscovery {
	fn platform(&self) -> Platform {
		Platform::Ios
	}

	async fn list_connected(&self) -> Result<BTreeSet<DeviceId>> {
		let output = run_tool(&self.idevice_id, &["-l"]).await?;
		Ok(parse_udid_list(&output))
	}

	async fn display_name(&self, id: &DeviceId) -> Result<String> {
		let Some(idevicename) = &self.idevicename else {
			return Err(HerdError::Discovery("idevicename not installed".to_string()));
		};
		let output = run_tool(idevicename, &["-u", id.as_str()]).await?;
		let name = output.trim();
		if name.is_empty() {
			return Err(HerdError::Discovery(format!("empty device name for {id}")));
		}
		Ok(name.to_string())
	}
}

/// Extracts udids from `idevice_id -l` output, one per line.
fn parse_udid_list(output: &str) -> BTreeSet<DeviceId> {
	output
		.lines()
		.map(str::trim)
		.filter(|line| !line.is_empty())
		.map(DeviceId::new)
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_one_udid_per_line() {
		let ids = parse_udid_list("00008120-000A1B2C3D4E5F67\n00008030-AABBCCDDEEFF0011\n\n");
		assert_eq!(
			ids,
			BTreeSet::from([
				DeviceId::new("00008120-000A1B2C3D4E5F67"),
				DeviceId::new("00008030-AABBCCDDEEFF0011"),
			])
		);
	}

	#[test]
	fn empty_output_parses_to_no_devices() {
		assert!(parse_udid_list("").is_empty());
		assert!(parse_udid_list("\n  \n").is_empty());
	}
}
