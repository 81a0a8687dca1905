//! Crate error type and result alias.

use thiserror::Error;

/// Errors surfaced by herd components.
#[derive(Debug, Error)]
pub enum HerdError {
	/// A discovery collaborator failed to answer.
	#[error("discovery failed: {0}")]
	Discovery(String),

	/// Filesystem or socket operation failed.
	#[error(transparent)]
	Io(#[from] std::io::Error),

	/// Snapshot (de)serialization failed.
	#[error("state serialization failed: {0}")]
	Serialize(#[from] serde_json::Error),
}

/// Result alias used throughout herd.
pub type Result<T> = std::result::Result<T, HerdError>;
