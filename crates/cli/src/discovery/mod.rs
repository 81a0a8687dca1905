//! Device discovery adapters over platform tools.

mod android;
mod ios;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use herd::error::{HerdError, Result};
use herd::DeviceDiscovery;
use tokio::process::Command;
use tracing::info;

pub use android::AdbDiscovery;
pub use ios::IosDiscovery;

/// Bounded runtime for one external tool invocation.
const TOOL_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds a discovery for every platform family whose tooling is installed.
///
/// A missing tool just drops that family from polling; it is reported once
/// here rather than on every tick.
pub fn available() -> Vec<Arc<dyn DeviceDiscovery>> {
	let mut found: Vec<Arc<dyn DeviceDiscovery>> = Vec::new();

	match AdbDiscovery::locate() {
		Some(adb) => found.push(Arc::new(adb)),
		None => info!(target = "herd.discovery", "adb not found; Android devices will not be polled"),
	}
	match IosDiscovery::locate() {
		Some(ios) => found.push(Arc::new(ios)),
		None => info!(target = "herd.discovery", "idevice_id not found; iOS devices will not be polled"),
	}

	found
}

/// Runs `program` with `args`, returning stdout on success.
pub(crate) async fn run_tool(program: &Path, args: &[&str]) -> Result<String> {
	let output = tokio::time::timeout(
		TOOL_TIMEOUT,
		Command::new(program).args(args).kill_on_drop(true).output(),
	)
	.await
	.map_err(|_| HerdError::Discovery(format!("{} timed out after {:?}", program.display(), TOOL_TIMEOUT)))?
	.map_err(HerdError::Io)?;

	if !output.status.success() {
		let stderr = String::from_utf8_lossy(&output.stderr);
		return Err(HerdError::Discovery(format!(
			"{} {} failed: {}",
			program.display(),
			args.join(" "),
			stderr.trim()
		)));
	}

	Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
