//! Error types for glide-netcode

use glide_core::EntityId;
use thiserror::Error;

/// Netcode error type
#[derive(Debug, Error)]
pub enum Error {
    /// Entity was never registered with the session
    #[error("Entity {0} is not registered")]
    UnknownEntity(EntityId),

    /// Core error (invalid configuration and the like)
    #[error("core error: {0}")]
    Core(#[from] glide_core::Error),
}

/// Result type for netcode operations
pub type Result<T> = std::result::Result<T, Error>;
