//! Command dispatch.

mod devices;
mod run;

use crate::cli::Commands;

/// Routes a parsed command to its implementation.
pub async fn dispatch(command: Commands) -> anyhow::Result<()> {
	match command {
		Commands::Run(args) => run::run(args).await,
		Commands::Devices(args) => devices::devices(args).await,
	}
}
