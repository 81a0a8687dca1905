//! Sanitized capture of server stdout/stderr into per-session log files.

use std::path::{Path, PathBuf};

use herd_runtime::launcher::OutputStream;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::device::SessionId;

/// Log file location for a session under `log_dir`.
pub(crate) fn log_path(log_dir: &Path, session_id: &SessionId) -> PathBuf {
	let stem: String = session_id
		.as_str()
		.chars()
		.map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
		.collect();
	log_dir.join(format!("{stem}.log"))
}

/// Spawns a task copying `stream` into the session log until EOF.
pub(crate) fn spawn_reader(path: PathBuf, label: &'static str, stream: OutputStream) {
	tokio::spawn(async move {
		if let Err(err) = copy_sanitized(&path, label, stream).await {
			debug!(target = "herd.session", path = %path.display(), error = %err, "server log capture ended");
		}
	});
}

async fn copy_sanitized(path: &Path, label: &'static str, stream: OutputStream) -> std::io::Result<()> {
	if let Some(parent) = path.parent() {
		tokio::fs::create_dir_all(parent).await?;
	}
	let mut file = OpenOptions::new().create(true).append(true).open(path).await?;

	let mut lines = BufReader::new(stream).lines();
	while let Some(line) = lines.next_line().await? {
		let clean = sanitize_line(&line);
		file.write_all(format!("[{label}] {clean}\n").as_bytes()).await?;
	}
	file.flush().await
}

/// Drops control characters that would corrupt the log file; tabs survive.
fn sanitize_line(line: &str) -> String {
	line.chars().filter(|c| !c.is_control() || *c == '\t').collect()
}
