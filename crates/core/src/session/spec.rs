//! Automation-server launch spec construction.

use herd_runtime::LaunchSpec;

use crate::config::OrchestratorConfig;
use crate::device::{Device, Platform};

/// Builds the launch spec for `device` bound to `ports`.
///
/// `ports` must hold exactly `device.platform.port_count()` entries: the
/// first is the server's command port, the rest are platform-specific
/// auxiliary ports encoded into the default capabilities.
pub fn build_launch_spec(config: &OrchestratorConfig, device: &Device, ports: &[u16]) -> LaunchSpec {
	debug_assert_eq!(ports.len(), usize::from(device.platform.port_count()));

	let mut spec = LaunchSpec::new(&config.server_program)
		.arg("--port")
		.arg(ports[0].to_string())
		.args(["--session-override", "--log-timestamp", "--log-no-colors"])
		.arg("--default-capabilities")
		.arg(default_capabilities(device, ports).to_string());

	if let Some(dir) = &config.work_dir {
		spec = spec.current_dir(dir);
	}
	spec
}

fn default_capabilities(device: &Device, ports: &[u16]) -> serde_json::Value {
	match device.platform {
		Platform::Android => serde_json::json!({
			"appium:udid": device.id.as_str(),
			"appium:systemPort": ports[1],
		}),
		Platform::Ios => serde_json::json!({
			"appium:udid": device.id.as_str(),
			"appium:wdaLocalPort": ports[1],
			"appium:mjpegServerPort": ports[2],
		}),
	}
}
