//! Process launch trait, managed handles, and the host implementation.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::spec::LaunchSpec;

/// Byte stream handed out for a child's stdout or stderr, once each.
pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Error spawning a child process.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
	/// The host refused to execute the program; retrying cannot help.
	#[error("permission denied launching {program}: {source}")]
	PermissionDenied {
		program: String,
		#[source]
		source: io::Error,
	},
	/// Spawn failed for a reason that may clear on retry.
	#[error("failed to launch {program}: {source}")]
	Spawn {
		program: String,
		#[source]
		source: io::Error,
	},
}

impl LaunchError {
	/// Returns `true` when retrying the launch cannot succeed.
	pub fn is_permanent(&self) -> bool {
		matches!(self, LaunchError::PermissionDenied { .. })
	}

	fn from_spawn(spec: &LaunchSpec, source: io::Error) -> Self {
		let program = spec.program().display().to_string();
		if source.kind() == io::ErrorKind::PermissionDenied {
			LaunchError::PermissionDenied { program, source }
		} else {
			LaunchError::Spawn { program, source }
		}
	}
}

/// Launches child processes described by a [`LaunchSpec`].
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
	/// Spawns the process and returns a managed handle to it.
	async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ManagedProcess>, LaunchError>;
}

/// Live handle to a launched process tree.
#[async_trait]
pub trait ManagedProcess: Send {
	/// OS pid, when the spawn recorded one.
	fn pid(&self) -> Option<u32>;

	/// Returns `true` once the process has exited.
	fn has_exited(&mut self) -> bool;

	/// Requests termination of the whole process tree.
	async fn kill_tree(&mut self) -> io::Result<()>;

	/// Waits up to `timeout` for the process to exit; `true` when it is gone.
	async fn wait_with_timeout(&mut self, timeout: Duration) -> bool;

	/// Takes the stdout stream. Subsequent calls return `None`.
	fn take_stdout(&mut self) -> Option<OutputStream>;

	/// Takes the stderr stream. Subsequent calls return `None`.
	fn take_stderr(&mut self) -> Option<OutputStream>;
}

/// [`ProcessLauncher`] backed by `tokio::process` on the local host.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostLauncher;

impl HostLauncher {
	/// Creates a host launcher.
	pub fn new() -> Self {
		Self
	}
}

#[async_trait]
impl ProcessLauncher for HostLauncher {
	async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ManagedProcess>, LaunchError> {
		let mut cmd = Command::new(spec.program());
		cmd.args(&spec.args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);

		if let Some(dir) = &spec.cwd {
			cmd.current_dir(dir);
		}
		for (key, value) in &spec.env {
			cmd.env(key, value);
		}

		// Own process group so the whole server tree can be signalled at once.
		#[cfg(unix)]
		cmd.process_group(0);

		let child = cmd.spawn().map_err(|e| LaunchError::from_spawn(spec, e))?;
		let pid = child.id();
		debug!(target = "herd.launch", program = %spec.program().display(), pid, "spawned child process");

		Ok(Box::new(HostProcess { child, pid }))
	}
}

struct HostProcess {
	child: Child,
	pid: Option<u32>,
}

#[async_trait]
impl ManagedProcess for HostProcess {
	fn pid(&self) -> Option<u32> {
		self.pid
	}

	fn has_exited(&mut self) -> bool {
		self.child.try_wait().map(|status| status.is_some()).unwrap_or(false)
	}

	async fn kill_tree(&mut self) -> io::Result<()> {
		#[cfg(unix)]
		if let Some(pid) = self.pid {
			// The child is its own process group leader; signal the group.
			let _ = Command::new("kill").args(["-TERM", &format!("-{pid}")]).status().await;
		}

		match self.child.start_kill() {
			Ok(()) => Ok(()),
			Err(err) if err.kind() == io::ErrorKind::InvalidInput => Ok(()),
			Err(err) => Err(err),
		}
	}

	async fn wait_with_timeout(&mut self, timeout: Duration) -> bool {
		tokio::time::timeout(timeout, self.child.wait()).await.is_ok()
	}

	fn take_stdout(&mut self) -> Option<OutputStream> {
		self.child.stdout.take().map(|s| Box::new(s) as OutputStream)
	}

	fn take_stderr(&mut self) -> Option<OutputStream> {
		self.child.stderr.take().map(|s| Box::new(s) as OutputStream)
	}
}

#[cfg(test)]
mod tests {
	use tokio::io::{AsyncBufReadExt, BufReader};

	use super::*;

	#[tokio::test]
	async fn missing_program_is_a_transient_spawn_error() {
		let spec = LaunchSpec::new("/nonexistent/herd-test-binary");
		let err = match HostLauncher::new().launch(&spec).await {
			Err(err) => err,
			Ok(_) => panic!("spawn should fail"),
		};
		assert!(!err.is_permanent());
	}

	#[tokio::test]
	async fn short_lived_child_reports_exit() {
		let spec = LaunchSpec::new("sh").args(["-c", "exit 0"]);
		let mut handle = HostLauncher::new().launch(&spec).await.expect("sh should spawn");
		assert!(handle.wait_with_timeout(Duration::from_secs(5)).await);
		assert!(handle.has_exited());
	}

	#[tokio::test]
	async fn stdout_stream_delivers_lines() {
		let spec = LaunchSpec::new("sh").args(["-c", "printf 'one\\ntwo\\n'"]);
		let mut handle = HostLauncher::new().launch(&spec).await.expect("sh should spawn");
		let stdout = handle.take_stdout().expect("stdout should be piped");
		assert!(handle.take_stdout().is_none());

		let mut lines = BufReader::new(stdout).lines();
		assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("one"));
		assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("two"));
		assert_eq!(lines.next_line().await.unwrap(), None);
	}

	#[tokio::test]
	async fn kill_tree_terminates_a_sleeping_child() {
		let spec = LaunchSpec::new("sh").args(["-c", "sleep 30"]);
		let mut handle = HostLauncher::new().launch(&spec).await.expect("sh should spawn");
		assert!(!handle.has_exited());
		handle.kill_tree().await.expect("kill should be accepted");
		assert!(handle.wait_with_timeout(Duration::from_secs(5)).await);
	}
}
