//! # Storage Module
//!
//! Persistence for the user's imported-token list. The registry talks to a
//! [`TokenStore`]: read the whole list, write the whole list.
//!
//! ```text
//! db.rs     - sled-backed store, survives restarts
//! memory.rs - in-process store for ephemeral sessions and tests
//! ```
//!
//! The native token is never persisted. The registry synthesises it.

pub mod db;
pub mod memory;

pub use db::SledTokenStore;
pub use memory::MemoryTokenStore;

use crate::token::registry::RegistryEntry;

/// Errors that can occur while reading or writing the token list.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence collaborator for the token registry.
///
/// Implementations must make `write` all-or-nothing: after an `Err`, a
/// subsequent `read` returns the previous list.
pub trait TokenStore: Send + Sync {
    /// Load every persisted entry, in insertion order.
    fn read(&self) -> StoreResult<Vec<RegistryEntry>>;

    /// Replace the persisted list with `entries`.
    fn write(&self, entries: &[RegistryEntry]) -> StoreResult<()>;
}
