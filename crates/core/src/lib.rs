//! Local device-farm control plane.
//!
//! Keeps one automation-server process per attached device: the presence
//! poller diffs discovery results against the registry and drives the
//! session orchestrator, which allocates port blocks and supervises the
//! spawned servers.

/// Component configuration types.
pub mod config;
/// Device and session data model.
pub mod device;
/// Device discovery collaborator trait.
pub mod discovery;
/// Crate error type and result alias.
pub mod error;
/// Lifecycle event sink.
pub mod events;
/// Consecutive port-block allocation.
pub mod ports;
/// Fixed-interval presence poller.
pub mod poller;
/// Authoritative device/session registry.
pub mod registry;
/// Session orchestration: start, supervise, stop.
pub mod session;
/// Registry snapshot persistence.
pub mod snapshot;
/// Test doubles for launcher, discovery, and event collaborators.
pub mod testing;

pub use config::{OrchestratorConfig, PollerConfig};
pub use device::{Device, DeviceId, DeviceKind, DeviceState, Platform, Session, SessionId, SessionStatus};
pub use discovery::DeviceDiscovery;
pub use error::{HerdError, Result};
pub use events::{EventSink, HerdEvent, LogSink};
pub use poller::PresencePoller;
pub use ports::PortPool;
pub use registry::DeviceRegistry;
pub use session::SessionOrchestrator;
pub use snapshot::{spawn_snapshot_task, SnapshotStore};
