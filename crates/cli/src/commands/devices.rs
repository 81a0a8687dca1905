//! `herd devices`: one-shot discovery listing.

use colored::Colorize;
use herd::DeviceKind;

use crate::cli::DevicesArgs;
use crate::discovery;

pub async fn devices(args: DevicesArgs) -> anyhow::Result<()> {
	let discoveries = discovery::available();
	anyhow::ensure!(
		!discoveries.is_empty(),
		"no device discovery tools found; install adb and/or idevice_id"
	);

	let mut rows = Vec::new();
	for discovery in &discoveries {
		for id in discovery.list_connected().await? {
			let name = discovery.display_name(&id).await.unwrap_or_else(|_| id.as_str().to_string());
			let kind = discovery.kind_of(&id);
			rows.push((discovery.platform(), id, name, kind));
		}
	}

	if args.json {
		let payload: Vec<_> = rows
			.iter()
			.map(|(platform, id, name, kind)| {
				serde_json::json!({
					"id": id,
					"platform": platform,
					"name": name,
					"kind": kind,
				})
			})
			.collect();
		println!("{}", serde_json::to_string_pretty(&payload)?);
		return Ok(());
	}

	if rows.is_empty() {
		println!("No devices attached.");
		return Ok(());
	}
	for (platform, id, name, kind) in rows {
		let kind = match kind {
			DeviceKind::Physical => "physical",
			DeviceKind::Emulator => "emulator",
		};
		println!("{:<9} {:<28} {:<28} {}", platform.as_str().cyan(), id.to_string(), name, kind.dimmed());
	}
	Ok(())
}
