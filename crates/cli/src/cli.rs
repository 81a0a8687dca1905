//! Command-line interface definition.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{ArgAction, Args, Parser, Subcommand};

/// Local device-farm control plane: one supervised automation server per
/// attached device.
#[derive(Debug, Parser)]
#[command(name = "herd", version, about)]
pub struct Cli {
	/// Increase log verbosity (-v debug, -vv trace).
	#[arg(short, long, action = ArgAction::Count, global = true)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
	/// Run the control plane until interrupted.
	Run(RunArgs),
	/// List currently attached devices and exit.
	Devices(DevicesArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
	/// Inclusive port range handed out to automation servers.
	#[arg(long, default_value = "4723-4899")]
	pub ports: PortRange,

	/// Seconds between presence polls.
	#[arg(long, default_value_t = 2)]
	pub interval: u64,

	/// Observe devices without starting sessions.
	#[arg(long)]
	pub no_auto: bool,

	/// Automation server program, resolved on PATH when not a path.
	#[arg(long, default_value = "appium")]
	pub server: PathBuf,

	/// Directory receiving per-session server logs.
	#[arg(long)]
	pub log_dir: Option<PathBuf>,

	/// Snapshot file for restart continuity.
	#[arg(long)]
	pub state_file: Option<PathBuf>,

	/// Disable snapshot persistence entirely.
	#[arg(long, conflicts_with = "state_file")]
	pub no_state: bool,
}

#[derive(Debug, Args)]
pub struct DevicesArgs {
	/// Emit the device list as JSON.
	#[arg(long)]
	pub json: bool,
}

/// Inclusive port range written as `start-end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
	pub start: u16,
	pub end: u16,
}

impl FromStr for PortRange {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (start, end) = s.split_once('-').ok_or_else(|| format!("expected start-end, got `{s}`"))?;
		let start: u16 = start.trim().parse().map_err(|_| format!("invalid start port `{start}`"))?;
		let end: u16 = end.trim().parse().map_err(|_| format!("invalid end port `{end}`"))?;
		if start > end {
			return Err(format!("range start {start} exceeds end {end}"));
		}
		Ok(Self { start, end })
	}
}

#[cfg(test)]
mod tests {
	use clap::CommandFactory;

	use super::*;

	#[test]
	fn cli_definition_is_consistent() {
		Cli::command().debug_assert();
	}

	#[test]
	fn port_range_parses_and_validates() {
		assert_eq!("4723-4899".parse::<PortRange>().unwrap(), PortRange { start: 4723, end: 4899 });
		assert_eq!("5000-5000".parse::<PortRange>().unwrap(), PortRange { start: 5000, end: 5000 });
		assert!("4899-4723".parse::<PortRange>().is_err());
		assert!("4723".parse::<PortRange>().is_err());
		assert!("a-b".parse::<PortRange>().is_err());
	}

	#[test]
	fn run_args_pick_up_overrides() {
		let cli = Cli::try_parse_from(["herd", "run", "--ports", "5000-5100", "--interval", "5", "--no-auto"]).unwrap();
		let Commands::Run(args) = cli.command else {
			panic!("expected run command");
		};
		assert_eq!(args.ports, PortRange { start: 5000, end: 5100 });
		assert_eq!(args.interval, 5);
		assert!(args.no_auto);
		assert!(!args.no_state);
	}
}
