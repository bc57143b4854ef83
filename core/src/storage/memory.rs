//! In-process [`TokenStore`]. Nothing survives the process.

use parking_lot::RwLock;

use super::{StoreResult, TokenStore};
use crate::token::registry::RegistryEntry;

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: RwLock<Vec<RegistryEntry>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with `entries`, as if a previous session had
    /// written them.
    pub fn with_entries(entries: Vec<RegistryEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn read(&self) -> StoreResult<Vec<RegistryEntry>> {
        Ok(self.entries.read().clone())
    }

    fn write(&self, entries: &[RegistryEntry]) -> StoreResult<()> {
        *self.entries.write() = entries.to_vec();
        Ok(())
    }
}
