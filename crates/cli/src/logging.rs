//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Initializes the global subscriber from the `-v` count; `RUST_LOG` wins
/// when set.
pub fn init_logging(verbose: u8) {
	let default_level = match verbose {
		0 => "info",
		1 => "debug",
		_ => "trace",
	};
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

	tracing_subscriber::fmt().with_env_filter(filter).with_target(verbose > 0).init();
}
