//! Session orchestration: start, supervise, stop.
//!
//! The orchestrator owns the `session id → process handle` map and drives
//! the launcher; all registry state it touches goes through the registry's
//! session update entry points.

mod orchestrator;
mod output;
mod spec;

/// Session orchestrator and its start-attempt error taxonomy.
pub use orchestrator::{SessionOrchestrator, StartError};
/// Automation-server launch spec construction.
pub use spec::build_launch_spec;
