//! Process launch and port lifecycle primitives shared by herd crates.

/// Launch trait, managed process handles, and the host implementation.
pub mod launcher;
/// Port-bind and pid liveness probes.
pub mod process;
/// Child process launch specification.
pub mod spec;

/// Process launch collaborators.
pub use launcher::{HostLauncher, LaunchError, ManagedProcess, ProcessLauncher};
/// Launch specification builder.
pub use spec::LaunchSpec;
