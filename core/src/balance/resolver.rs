//! Encrypted-balance cache with in-flight de-duplication.
//!
//! Cache entries are tagged with the fingerprint of the key that produced
//! them and are only ever served to a caller holding the same key. Entries
//! are never invalidated eagerly on a key change; a resolve under a new key
//! simply misses and overwrites.
//!
//! Each decrypt runs on its own spawned task behind a `Shared` future, so
//! callers that give up waiting never cancel the call, and every caller that
//! arrived while it was outstanding receives the same result.
//!
//! At most one decrypt per token is outstanding for a given key fingerprint.
//! A resolve under a different fingerprint does not join the running call;
//! it starts its own and supersedes the older one, which still answers its
//! waiters but no longer writes the cache. Flipping keys `k1 -> k2 -> k1`
//! while calls are slow can therefore leave several decrypts for the same
//! token running at once, two of them under `k1`.

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::view::{BalanceView, ResolveError};
use crate::config::ResolverConfig;
use crate::keys::{AesKey, KeyFingerprint, KeyState};
use crate::ledger::{LedgerClient, LedgerError};
use crate::token::{BalanceCache, ResolvableToken, TokenIdentity, TokenRegistry};

type PendingCall = Shared<BoxFuture<'static, BalanceView>>;

/// A finished resolve, published to every [`BalanceResolver::subscribe`]r.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceUpdate {
    pub identity: TokenIdentity,
    pub view: BalanceView,
}

struct CacheEntry {
    view: BalanceView,
    /// Logical time at which the producing call was issued.
    resolved_at: u64,
    fingerprint: KeyFingerprint,
    /// Set for `Failed` results only.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn serves(&self, fingerprint: &KeyFingerprint, now: Instant) -> bool {
        &self.fingerprint == fingerprint && self.expires_at.map_or(true, |at| now < at)
    }
}

struct Pending {
    fingerprint: KeyFingerprint,
    ticket: u64,
    call: PendingCall,
}

enum Lookup {
    Ready(BalanceView),
    Pending(PendingCall),
}

struct Inner {
    registry: Arc<TokenRegistry>,
    ledger: Arc<dyn LedgerClient>,
    config: ResolverConfig,
    cache: DashMap<TokenIdentity, CacheEntry>,
    /// Lock order: `inflight` before `cache`.
    inflight: Mutex<HashMap<TokenIdentity, Pending>>,
    /// Tokens last shown the placeholder, re-resolved when a key arrives.
    awaiting_key: Mutex<HashMap<TokenIdentity, ResolvableToken>>,
    clock: AtomicU64,
    updates: broadcast::Sender<BalanceUpdate>,
}

/// Cheap to clone; clones share one cache.
#[derive(Clone)]
pub struct BalanceResolver {
    inner: Arc<Inner>,
}

impl fmt::Debug for BalanceResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BalanceResolver")
            .field("cached", &self.inner.cache.len())
            .field("in_flight", &self.inner.inflight.lock().len())
            .finish()
    }
}

impl BalanceResolver {
    pub fn new(registry: Arc<TokenRegistry>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self::with_config(registry, ledger, ResolverConfig::default())
    }

    pub fn with_config(
        registry: Arc<TokenRegistry>,
        ledger: Arc<dyn LedgerClient>,
        config: ResolverConfig,
    ) -> Self {
        let (updates, _) = broadcast::channel(config.update_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                registry,
                ledger,
                config,
                cache: DashMap::new(),
                inflight: Mutex::new(HashMap::new()),
                awaiting_key: Mutex::new(HashMap::new()),
                clock: AtomicU64::new(0),
                updates,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<TokenRegistry> {
        &self.inner.registry
    }

    /// Resolve `token` under `key`, waiting for the ledger if needed.
    ///
    /// A call already in flight for the same token and key is joined, not
    /// repeated. Errors are folded into [`BalanceView::Failed`].
    pub async fn resolve(&self, token: &ResolvableToken, key: &KeyState) -> BalanceView {
        match self.lookup(token, key) {
            Lookup::Ready(view) => view,
            Lookup::Pending(call) => call.await,
        }
    }

    /// Non-blocking [`resolve`](Self::resolve): returns [`BalanceView::Loading`]
    /// instead of waiting, leaving the call running in the background. Its
    /// result arrives on [`subscribe`](Self::subscribe).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn view(&self, token: &ResolvableToken, key: &KeyState) -> BalanceView {
        match self.lookup(token, key) {
            Lookup::Ready(view) => view,
            Lookup::Pending(_) => BalanceView::Loading,
        }
    }

    /// Receiver of every completed resolve.
    pub fn subscribe(&self) -> broadcast::Receiver<BalanceUpdate> {
        self.inner.updates.subscribe()
    }

    /// Watch `keys` and, whenever a key becomes available, re-resolve every
    /// token that was shown the placeholder. Runs until the sender side of
    /// `keys` is dropped.
    pub fn follow_keys(&self, mut keys: watch::Receiver<KeyState>) -> JoinHandle<()> {
        let resolver = self.clone();
        tokio::spawn(async move {
            loop {
                let state = keys.borrow_and_update().clone();
                if state.is_available() {
                    resolver.refresh_awaiting(&state);
                }
                if keys.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Start background resolves for every token waiting on a key. Returns
    /// how many were started.
    pub fn refresh_awaiting(&self, key: &KeyState) -> usize {
        if !key.is_available() {
            return 0;
        }
        let waiting: Vec<ResolvableToken> = self
            .inner
            .awaiting_key
            .lock()
            .drain()
            .map(|(_, token)| token)
            .collect();
        for token in &waiting {
            self.view(token, key);
        }
        if !waiting.is_empty() {
            debug!(tokens = waiting.len(), "key available; re-resolving placeholders");
        }
        waiting.len()
    }

    /// The cached view for `identity`, regardless of key or expiry.
    pub fn cached(&self, identity: &TokenIdentity) -> Option<BalanceView> {
        self.inner.cache.get(identity).map(|e| e.view.clone())
    }

    /// Logical time of the call that produced the cached entry.
    pub fn resolved_at(&self, identity: &TokenIdentity) -> Option<u64> {
        self.inner.cache.get(identity).map(|e| e.resolved_at)
    }

    pub fn cache_len(&self) -> usize {
        self.inner.cache.len()
    }

    pub fn is_in_flight(&self, identity: &TokenIdentity) -> bool {
        self.inner.inflight.lock().contains_key(identity)
    }

    fn lookup(&self, token: &ResolvableToken, key: &KeyState) -> Lookup {
        if token.is_native() {
            return Lookup::Pending(self.fetch_native());
        }

        let identity = token.identity();
        let Some(aes_key) = key.key() else {
            self.inner
                .awaiting_key
                .lock()
                .insert(identity.clone(), token.clone());
            debug!(token = %identity, "no key available; showing placeholder");
            return Lookup::Ready(BalanceView::Encrypted);
        };
        let fingerprint = aes_key.fingerprint();

        let mut inflight = self.inner.inflight.lock();
        if let Some(entry) = self.inner.cache.get(identity) {
            if entry.serves(&fingerprint, Instant::now()) {
                debug!(token = %identity, fingerprint = %fingerprint, "balance cache hit");
                return Lookup::Ready(entry.view.clone());
            }
        }
        self.inner.awaiting_key.lock().remove(identity);

        if let Some(pending) = inflight.get(identity) {
            if pending.fingerprint == fingerprint {
                debug!(token = %identity, "joining in-flight decrypt");
                return Lookup::Pending(pending.call.clone());
            }
            debug!(
                token = %identity,
                stale = %pending.fingerprint,
                "key changed; superseding in-flight decrypt"
            );
        }

        let pending = self.start_decrypt(token, aes_key.clone(), fingerprint);
        let call = pending.call.clone();
        inflight.insert(identity.clone(), pending);
        Lookup::Pending(call)
    }

    /// Spawn the decrypt. Called with `inflight` locked, so the task cannot
    /// complete before its ticket is registered.
    fn start_decrypt(
        &self,
        token: &ResolvableToken,
        key: AesKey,
        fingerprint: KeyFingerprint,
    ) -> Pending {
        let ticket = self.inner.clock.fetch_add(1, Ordering::SeqCst) + 1;
        let identity = token.identity().clone();
        let address = token.descriptor().contract_address().to_string();
        debug!(token = %identity, fingerprint = %fingerprint, ticket, "decrypting balance");

        let inner = Arc::clone(&self.inner);
        let produced_by = fingerprint.clone();
        let task = tokio::spawn(async move {
            let view = match inner.ledger.decrypt_balance(&address, &key).await {
                Ok(value) => BalanceView::Value(value),
                Err(e) => {
                    warn!(token = %identity, error = %e, "balance decrypt failed");
                    BalanceView::Failed(resolve_error(e))
                }
            };
            inner.complete(&identity, ticket, produced_by, &view);
            view
        });

        let inner = Arc::clone(&self.inner);
        let identity = token.identity().clone();
        let call = async move {
            match task.await {
                Ok(view) => view,
                Err(e) => {
                    inner.abandon(&identity, ticket);
                    BalanceView::Failed(ResolveError::DecryptFailed(e.to_string()))
                }
            }
        }
        .boxed()
        .shared();

        Pending {
            fingerprint,
            ticket,
            call,
        }
    }

    /// Native balances are fetched fresh on every call and never cached.
    fn fetch_native(&self) -> PendingCall {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let view = match inner.ledger.native_balance().await {
                Ok(value) => BalanceView::Plain(value),
                Err(e) => {
                    warn!(error = %e, "native balance fetch failed");
                    BalanceView::Failed(ResolveError::BalanceFetchFailed(e.to_string()))
                }
            };
            let _ = inner.updates.send(BalanceUpdate {
                identity: TokenIdentity::native(),
                view: view.clone(),
            });
            view
        });

        async move {
            task.await
                .unwrap_or_else(|e| BalanceView::Failed(ResolveError::BalanceFetchFailed(e.to_string())))
        }
        .boxed()
        .shared()
    }
}

impl Inner {
    /// Store a finished decrypt if it is still wanted: its ticket must be
    /// the current one for the token, and the token must still be tracked.
    fn complete(
        &self,
        identity: &TokenIdentity,
        ticket: u64,
        fingerprint: KeyFingerprint,
        view: &BalanceView,
    ) {
        let mut inflight = self.inflight.lock();
        if inflight.get(identity).map(|p| p.ticket) != Some(ticket) {
            debug!(token = %identity, ticket, "decrypt superseded or evicted; result discarded");
            return;
        }
        inflight.remove(identity);

        if !self.registry.has(identity) {
            debug!(token = %identity, "token no longer tracked; result discarded");
            return;
        }

        let expires_at = matches!(view, BalanceView::Failed(_))
            .then(|| Instant::now() + self.config.failure_ttl);
        self.cache.insert(
            identity.clone(),
            CacheEntry {
                view: view.clone(),
                resolved_at: ticket,
                fingerprint,
                expires_at,
            },
        );
        drop(inflight);

        let _ = self.updates.send(BalanceUpdate {
            identity: identity.clone(),
            view: view.clone(),
        });
    }

    fn abandon(&self, identity: &TokenIdentity, ticket: u64) {
        let mut inflight = self.inflight.lock();
        if inflight.get(identity).map(|p| p.ticket) == Some(ticket) {
            inflight.remove(identity);
        }
    }
}

fn resolve_error(e: LedgerError) -> ResolveError {
    match e {
        LedgerError::UnknownContract(_) => ResolveError::MetadataFetchFailed(e.to_string()),
        other => ResolveError::DecryptFailed(other.to_string()),
    }
}

impl BalanceCache for BalanceResolver {
    /// Drop everything held for `identity`. A decrypt still in flight keeps
    /// running for its waiters but will not write the cache.
    fn evict(&self, identity: &TokenIdentity) {
        let mut inflight = self.inner.inflight.lock();
        let cancelled = inflight.remove(identity).is_some();
        let cached = self.inner.cache.remove(identity).is_some();
        drop(inflight);
        self.inner.awaiting_key.lock().remove(identity);
        debug!(token = %identity, cached, cancelled, "balance evicted");
    }
}
