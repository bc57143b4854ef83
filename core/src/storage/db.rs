//! # SledTokenStore - Persistent Token List
//!
//! Keeps the imported-token list in a dedicated sled tree:
//!
//! | Tree              | Key      | Value                        |
//! |-------------------|----------|------------------------------|
//! | `imported_tokens` | `tokens` | `bincode(Vec<RegistryEntry>)`|
//!
//! One key, one value, replaced on every write and flushed before `write`
//! returns. A crash mid-write leaves either the old list or the new one.
//!
//! The underlying `Db` handle is exposed so other components (the local
//! ledger) can open their own trees in the same database.

use sled::{Db, Tree};
use std::path::Path;

use super::{StoreError, StoreResult, TokenStore};
use crate::config::{TOKENS_KEY, TOKENS_TREE};
use crate::token::registry::RegistryEntry;

#[derive(Debug, Clone)]
pub struct SledTokenStore {
    db: Db,
    tokens: Tree,
}

impl SledTokenStore {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Database that lives in memory and disappears when dropped.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    /// Use an already-open database.
    pub fn from_db(db: Db) -> StoreResult<Self> {
        let tokens = db.open_tree(TOKENS_TREE)?;
        Ok(Self { db, tokens })
    }

    /// The shared database handle.
    pub fn db(&self) -> &Db {
        &self.db
    }
}

impl TokenStore for SledTokenStore {
    fn read(&self) -> StoreResult<Vec<RegistryEntry>> {
        match self.tokens.get(TOKENS_KEY)? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    fn write(&self, entries: &[RegistryEntry]) -> StoreResult<()> {
        let bytes =
            bincode::serialize(entries).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.tokens.insert(TOKENS_KEY, bytes)?;
        self.db.flush()?;
        Ok(())
    }
}
