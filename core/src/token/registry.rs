//! # Token Registry
//!
//! The user's list of tracked tokens. The registry owns every
//! [`RegistryEntry`] and the persisted list behind them.
//!
//! ## Write-then-reflect
//!
//! Every mutation builds the next list, hands it to the [`TokenStore`], and
//! only swaps it into memory once the store accepted it. A storage failure
//! therefore leaves the in-memory view exactly as it was: what the user sees
//! is always what is on disk.
//!
//! Writers are serialised by a dedicated mutex; readers never wait on
//! storage I/O and always receive a full copy of the list, never a live view.
//!
//! ## The native entry
//!
//! The native token is always listed first and is never persisted. It cannot
//! be added or removed.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::descriptor::{TokenDescriptor, TokenIdentity};
use crate::storage::{StoreError, TokenStore};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RegistryError {
    /// An entry with the same identity is already tracked.
    #[error("token {0} is already imported")]
    AlreadyImported(TokenIdentity),

    /// No entry with this identity is tracked.
    #[error("token {0} is not imported")]
    NotFound(TokenIdentity),

    /// The persisted list could not be read or written. The in-memory view
    /// is unchanged.
    #[error("token storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),

    /// The native token is built in and cannot be added or removed.
    #[error("the native token is built in")]
    NativeIsBuiltIn,
}

// ---------------------------------------------------------------------------
// Balance cache hook
// ---------------------------------------------------------------------------

/// Something holding per-token state that must be dropped when a token
/// leaves the registry. Passed explicitly to [`TokenRegistry::remove`],
/// [`TokenRegistry::clear`] and [`TokenRegistry::reload`].
pub trait BalanceCache: Send + Sync {
    fn evict(&self, identity: &TokenIdentity);
}

// ---------------------------------------------------------------------------
// RegistryEntry
// ---------------------------------------------------------------------------

/// A tracked token plus registry bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    descriptor: TokenDescriptor,
    /// Insertion index. The native entry is `0`.
    index: u64,
    imported_at: DateTime<Utc>,
}

impl RegistryEntry {
    pub fn new(descriptor: TokenDescriptor, index: u64) -> Self {
        Self {
            descriptor,
            index,
            imported_at: Utc::now(),
        }
    }

    fn native() -> Self {
        Self {
            descriptor: TokenDescriptor::native(),
            index: 0,
            imported_at: DateTime::<Utc>::default(),
        }
    }

    pub fn descriptor(&self) -> &TokenDescriptor {
        &self.descriptor
    }

    pub fn identity(&self) -> &TokenIdentity {
        self.descriptor.identity()
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn imported_at(&self) -> DateTime<Utc> {
        self.imported_at
    }

    pub fn with_imported_at(mut self, at: DateTime<Utc>) -> Self {
        self.imported_at = at;
        self
    }
}

// ---------------------------------------------------------------------------
// TokenRegistry
// ---------------------------------------------------------------------------

pub struct TokenRegistry {
    store: Arc<dyn TokenStore>,
    /// Imported entries in insertion order. Never contains the native entry.
    entries: RwLock<Vec<RegistryEntry>>,
    /// Serialises mutations so two writers never race on the store. Guards
    /// the highest index handed out so far.
    write_lock: Mutex<u64>,
    native: RegistryEntry,
}

impl std::fmt::Debug for TokenRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRegistry")
            .field("imported", &self.entries.read().len())
            .finish()
    }
}

impl TokenRegistry {
    /// Load the registry from `store`.
    pub fn open(store: Arc<dyn TokenStore>) -> Result<Self, RegistryError> {
        let entries = sanitize(store.read()?);
        info!(imported = entries.len(), "token registry loaded");
        Ok(Self {
            store,
            write_lock: Mutex::new(highest_index(&entries)),
            entries: RwLock::new(entries),
            native: RegistryEntry::native(),
        })
    }

    /// Every tracked token, native first, then imports in insertion order.
    pub fn list(&self) -> Vec<RegistryEntry> {
        let entries = self.entries.read();
        let mut out = Vec::with_capacity(entries.len() + 1);
        out.push(self.native.clone());
        out.extend(entries.iter().cloned());
        out
    }

    /// Imported tokens only.
    pub fn imported(&self) -> Vec<RegistryEntry> {
        self.entries.read().clone()
    }

    /// Number of imported tokens (the native entry is not counted).
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `identity` is tracked. The native token always is.
    pub fn has(&self, identity: &TokenIdentity) -> bool {
        identity.is_native() || self.entries.read().iter().any(|e| e.identity() == identity)
    }

    pub fn get(&self, identity: &TokenIdentity) -> Option<RegistryEntry> {
        if identity.is_native() {
            return Some(self.native.clone());
        }
        self.entries
            .read()
            .iter()
            .find(|e| e.identity() == identity)
            .cloned()
    }

    /// Track a new token. New entries have no cached balance, so nothing is
    /// invalidated.
    ///
    /// Indexes are never reused while the registry is open, even when the
    /// newest entry was removed in between.
    pub fn add(&self, descriptor: TokenDescriptor) -> Result<RegistryEntry, RegistryError> {
        if descriptor.identity().is_native() {
            return Err(RegistryError::NativeIsBuiltIn);
        }

        let mut highest = self.write_lock.lock();
        let current = self.entries.read().clone();

        if current.iter().any(|e| e.identity() == descriptor.identity()) {
            return Err(RegistryError::AlreadyImported(descriptor.identity().clone()));
        }

        let next_index = (*highest).max(highest_index(&current)) + 1;
        let entry = RegistryEntry::new(descriptor, next_index);

        let mut next = current;
        next.push(entry.clone());
        self.commit(next)?;
        *highest = next_index;

        info!(token = %entry.identity(), index = entry.index, "token imported");
        Ok(entry)
    }

    /// Stop tracking a token and drop its cached balance from `cache`.
    pub fn remove(
        &self,
        identity: &TokenIdentity,
        cache: &dyn BalanceCache,
    ) -> Result<RegistryEntry, RegistryError> {
        if identity.is_native() {
            return Err(RegistryError::NativeIsBuiltIn);
        }

        let _guard = self.write_lock.lock();
        let mut next = self.entries.read().clone();

        let position = next
            .iter()
            .position(|e| e.identity() == identity)
            .ok_or_else(|| RegistryError::NotFound(identity.clone()))?;
        let removed = next.remove(position);
        self.commit(next)?;

        cache.evict(identity);
        info!(token = %identity, "token removed");
        Ok(removed)
    }

    /// Replace an entry's name and symbol. The rest of the entry, its
    /// position included, is untouched.
    pub fn refresh_metadata(
        &self,
        identity: &TokenIdentity,
        name: &str,
        symbol: &str,
    ) -> Result<RegistryEntry, RegistryError> {
        if identity.is_native() {
            return Err(RegistryError::NativeIsBuiltIn);
        }

        let _guard = self.write_lock.lock();
        let mut next = self.entries.read().clone();

        let entry = next
            .iter_mut()
            .find(|e| e.identity() == identity)
            .ok_or_else(|| RegistryError::NotFound(identity.clone()))?;
        entry.descriptor = entry.descriptor.with_display(name, symbol);
        let updated = entry.clone();
        self.commit(next)?;

        Ok(updated)
    }

    /// Forget every imported token. Returns how many were removed.
    pub fn clear(&self, cache: &dyn BalanceCache) -> Result<usize, RegistryError> {
        let _guard = self.write_lock.lock();
        let previous = self.entries.read().clone();
        self.commit(Vec::new())?;

        for entry in &previous {
            cache.evict(entry.identity());
        }
        info!(removed = previous.len(), "token registry cleared");
        Ok(previous.len())
    }

    /// Re-read the persisted list, discarding the in-memory copy.
    ///
    /// Tokens that are gone from the persisted list, or whose descriptor
    /// changed there, lose their cached balance in `cache`.
    pub fn reload(&self, cache: &dyn BalanceCache) -> Result<(), RegistryError> {
        let mut highest = self.write_lock.lock();
        let entries = sanitize(self.store.read()?);
        *highest = (*highest).max(highest_index(&entries));
        let previous = std::mem::replace(&mut *self.entries.write(), entries.clone());

        let mut evicted = 0usize;
        for old in &previous {
            if !entries.iter().any(|e| e.descriptor() == old.descriptor()) {
                cache.evict(old.identity());
                evicted += 1;
            }
        }
        info!(imported = entries.len(), evicted, "token registry reloaded");
        Ok(())
    }

    /// Persist `next`, then make it visible. Called with `write_lock` held.
    fn commit(&self, next: Vec<RegistryEntry>) -> Result<(), RegistryError> {
        if let Err(e) = self.store.write(&next) {
            warn!(error = %e, "token list write failed; in-memory view unchanged");
            return Err(e.into());
        }
        *self.entries.write() = next;
        Ok(())
    }
}

fn highest_index(entries: &[RegistryEntry]) -> u64 {
    entries.iter().map(|e| e.index).max().unwrap_or(0)
}

/// Drop native entries and later duplicates from a persisted list. Older
/// stores keyed NFTs by contract alone and could hold the same identity
/// twice; the first occurrence wins.
fn sanitize(entries: Vec<RegistryEntry>) -> Vec<RegistryEntry> {
    let mut out: Vec<RegistryEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.identity().is_native() || out.iter().any(|e| e.identity() == entry.identity()) {
            continue;
        }
        out.push(entry);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryTokenStore, StoreResult};
    use std::sync::atomic::{AtomicBool, Ordering};

    const AA: &str = "0x00000000000000000000000000000000000000aa";
    const BB: &str = "0x00000000000000000000000000000000000000bb";
    const CC: &str = "0x00000000000000000000000000000000000000cc";

    fn foo() -> TokenDescriptor {
        TokenDescriptor::fungible(AA, "Foo", "FOO", 18).unwrap()
    }

    fn bar() -> TokenDescriptor {
        TokenDescriptor::fungible(BB, "Bar", "BAR", 6).unwrap()
    }

    fn registry() -> TokenRegistry {
        TokenRegistry::open(Arc::new(MemoryTokenStore::new())).unwrap()
    }

    /// Records evictions.
    #[derive(Default)]
    struct RecordingCache(Mutex<Vec<TokenIdentity>>);

    impl BalanceCache for RecordingCache {
        fn evict(&self, identity: &TokenIdentity) {
            self.0.lock().push(identity.clone());
        }
    }

    /// Store whose writes can be switched off.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryTokenStore,
        fail: AtomicBool,
    }

    impl TokenStore for FlakyStore {
        fn read(&self) -> StoreResult<Vec<RegistryEntry>> {
            self.inner.read()
        }

        fn write(&self, entries: &[RegistryEntry]) -> StoreResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("disk full".into()));
            }
            self.inner.write(entries)
        }
    }

    #[test]
    fn empty_registry_lists_native_only() {
        let reg = registry();
        let list = reg.list();
        assert_eq!(list.len(), 1);
        assert!(list[0].identity().is_native());
        assert!(reg.is_empty());
    }

    #[test]
    fn add_appends_after_native() {
        let reg = registry();
        reg.add(foo()).unwrap();
        reg.add(bar()).unwrap();

        let symbols: Vec<_> = reg.list().iter().map(|e| e.descriptor().symbol().to_string()).collect();
        assert_eq!(symbols, vec!["COTI", "FOO", "BAR"]);
    }

    #[test]
    fn add_twice_is_already_imported() {
        let reg = registry();
        reg.add(foo()).unwrap();
        let err = reg.add(foo()).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyImported(_)));
        assert_eq!(reg.list().len(), 2);
    }

    #[test]
    fn identity_dedup_ignores_address_case_and_display_fields() {
        let reg = registry();
        reg.add(foo()).unwrap();
        let shouty = TokenDescriptor::fungible(&AA.to_uppercase().replace("0X", "0x"), "Other", "OTH", 2)
            .unwrap();
        assert!(matches!(reg.add(shouty), Err(RegistryError::AlreadyImported(_))));
    }

    #[test]
    fn nfts_of_same_contract_are_distinct() {
        let reg = registry();
        reg.add(TokenDescriptor::nft(AA, "1", "Art").unwrap()).unwrap();
        reg.add(TokenDescriptor::nft(AA, "2", "Art").unwrap()).unwrap();
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn native_cannot_be_added_or_removed() {
        let reg = registry();
        let cache = RecordingCache::default();
        assert!(matches!(
            reg.add(TokenDescriptor::native()),
            Err(RegistryError::NativeIsBuiltIn)
        ));
        assert!(matches!(
            reg.remove(&TokenIdentity::native(), &cache),
            Err(RegistryError::NativeIsBuiltIn)
        ));
        assert!(reg.has(&TokenIdentity::native()));
    }

    #[test]
    fn remove_drops_entry_and_evicts_cache() {
        let reg = registry();
        let cache = RecordingCache::default();
        reg.add(foo()).unwrap();

        reg.remove(foo().identity(), &cache).unwrap();
        assert!(!reg.has(foo().identity()));
        assert_eq!(reg.list().len(), 1);
        assert_eq!(cache.0.lock().as_slice(), &[foo().identity().clone()]);
    }

    #[test]
    fn remove_unknown_is_not_found() {
        let reg = registry();
        let cache = RecordingCache::default();
        assert!(matches!(
            reg.remove(foo().identity(), &cache),
            Err(RegistryError::NotFound(_))
        ));
        assert!(cache.0.lock().is_empty());
    }

    #[test]
    fn failed_write_leaves_memory_untouched() {
        let store = Arc::new(FlakyStore::default());
        let reg = TokenRegistry::open(store.clone()).unwrap();
        let cache = RecordingCache::default();
        reg.add(foo()).unwrap();

        store.fail.store(true, Ordering::SeqCst);

        assert!(matches!(reg.add(bar()), Err(RegistryError::StorageUnavailable(_))));
        assert!(!reg.has(bar().identity()));

        assert!(matches!(
            reg.remove(foo().identity(), &cache),
            Err(RegistryError::StorageUnavailable(_))
        ));
        assert!(reg.has(foo().identity()));
        assert!(cache.0.lock().is_empty(), "no eviction without a committed removal");

        assert_eq!(reg.imported(), store.read().unwrap());
    }

    #[test]
    fn indexes_stay_monotonic_across_removal() {
        let reg = registry();
        let cache = RecordingCache::default();
        let first = reg.add(foo()).unwrap();
        let second = reg.add(bar()).unwrap();
        reg.remove(foo().identity(), &cache).unwrap();
        let third = reg.add(foo()).unwrap();

        assert!(first.index() < second.index());
        assert!(second.index() < third.index());
    }

    #[test]
    fn removing_newest_entry_does_not_recycle_its_index() {
        let reg = registry();
        let cache = RecordingCache::default();
        reg.add(foo()).unwrap();
        let second = reg.add(bar()).unwrap();
        reg.remove(bar().identity(), &cache).unwrap();

        let baz = TokenDescriptor::fungible(CC, "Baz", "BAZ", 2).unwrap();
        let third = reg.add(baz).unwrap();
        assert!(third.index() > second.index());
    }

    #[test]
    fn refresh_metadata_replaces_display_fields() {
        let reg = registry();
        reg.add(foo()).unwrap();
        reg.add(bar()).unwrap();

        let updated = reg.refresh_metadata(foo().identity(), "Foo Token", "FOOT").unwrap();
        assert_eq!(updated.descriptor().name(), "Foo Token");
        assert_eq!(updated.descriptor().decimals(), 18);

        let list = reg.list();
        assert_eq!(list[1].descriptor().symbol(), "FOOT");
        assert_eq!(list[2].descriptor().symbol(), "BAR");
    }

    #[test]
    fn clear_evicts_every_import() {
        let reg = registry();
        let cache = RecordingCache::default();
        reg.add(foo()).unwrap();
        reg.add(bar()).unwrap();

        assert_eq!(reg.clear(&cache).unwrap(), 2);
        assert_eq!(reg.list().len(), 1);
        assert_eq!(cache.0.lock().len(), 2);
    }

    #[test]
    fn reopen_restores_persisted_entries() {
        let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        {
            let reg = TokenRegistry::open(store.clone()).unwrap();
            reg.add(foo()).unwrap();
        }
        let reg = TokenRegistry::open(store).unwrap();
        assert!(reg.has(foo().identity()));
    }

    #[test]
    fn reload_picks_up_external_changes() {
        let store = Arc::new(MemoryTokenStore::new());
        let reg = TokenRegistry::open(store.clone()).unwrap();
        let cache = RecordingCache::default();
        store.write(&[RegistryEntry::new(bar(), 7)]).unwrap();

        assert!(!reg.has(bar().identity()));
        reg.reload(&cache).unwrap();
        assert!(reg.has(bar().identity()));
        assert!(cache.0.lock().is_empty());

        // New imports continue after the reloaded index.
        assert!(reg.add(foo()).unwrap().index() > 7);
    }

    #[test]
    fn reload_evicts_tokens_dropped_or_changed_in_storage() {
        let store = Arc::new(MemoryTokenStore::new());
        let reg = TokenRegistry::open(store.clone()).unwrap();
        let cache = RecordingCache::default();
        let kept = reg.add(foo()).unwrap();
        reg.add(bar()).unwrap();
        let baz = reg
            .add(TokenDescriptor::fungible(CC, "Baz", "BAZ", 2).unwrap())
            .unwrap();

        let rescaled = TokenDescriptor::fungible(CC, "Baz", "BAZ", 6).unwrap();
        store
            .write(&[kept.clone(), RegistryEntry::new(rescaled, baz.index())])
            .unwrap();
        reg.reload(&cache).unwrap();

        assert!(!reg.has(bar().identity()));
        assert_eq!(
            cache.0.lock().as_slice(),
            &[bar().identity().clone(), baz.identity().clone()]
        );
    }

    #[test]
    fn duplicate_persisted_entries_are_collapsed() {
        let store = Arc::new(MemoryTokenStore::with_entries(vec![
            RegistryEntry::new(foo(), 1),
            RegistryEntry::new(foo().with_display("Dup", "DUP"), 2),
        ]));
        let reg = TokenRegistry::open(store).unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.list()[1].descriptor().symbol(), "FOO");
    }
}
