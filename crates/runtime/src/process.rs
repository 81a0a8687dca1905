//! Port-bind and pid liveness probes.

use std::path::PathBuf;

/// Returns `true` when `port` can be bound on the loopback interface.
///
/// The probe opens and immediately drops a listening socket, so a `true`
/// answer is only a point-in-time observation; callers that need exclusivity
/// must reserve the port in their own bookkeeping as well.
pub fn port_available(port: u16) -> bool {
	std::net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// Returns `true` when a process with `pid` appears alive on this host.
pub fn pid_is_alive(pid: u32) -> bool {
	if pid == 0 {
		return false;
	}

	if PathBuf::from("/proc").join(pid.to_string()).exists() {
		return true;
	}

	std::process::Command::new("kill")
		.arg("-0")
		.arg(pid.to_string())
		.status()
		.map(|status| status.success())
		.unwrap_or(pid == std::process::id())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bound_port_is_reported_unavailable() {
		let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
		let port = listener.local_addr().unwrap().port();
		assert!(!port_available(port));
		drop(listener);
		assert!(port_available(port));
	}

	#[test]
	fn current_process_is_alive() {
		assert!(pid_is_alive(std::process::id()));
	}

	#[test]
	fn pid_zero_is_never_alive() {
		assert!(!pid_is_alive(0));
	}
}
