//! Key state, fingerprints and the request/forget state machine.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{KEY_FINGERPRINT_CONTEXT, KEY_FINGERPRINT_HEX_LENGTH};
use crate::crypto::hash::blake3_derive;

// ---------------------------------------------------------------------------
// AesKey & KeyFingerprint
// ---------------------------------------------------------------------------

/// The user's symmetric balance key, as handed out by the wallet.
///
/// `Debug` and `Display` print the fingerprint only; the key itself is
/// reachable through [`AesKey::expose`] and nowhere else.
#[derive(Clone, PartialEq, Eq)]
pub struct AesKey(String);

impl AesKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key material. Hand it to the ledger client and nothing else.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn fingerprint(&self) -> KeyFingerprint {
        let digest = blake3_derive(KEY_FINGERPRINT_CONTEXT, self.0.as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(KEY_FINGERPRINT_HEX_LENGTH);
        KeyFingerprint(hex)
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AesKey({})", self.fingerprint())
    }
}

/// Short content hash identifying which key produced a cached value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyFingerprint(String);

impl KeyFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// KeyState
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum KeyState {
    #[default]
    Absent,
    Requesting,
    Available(AesKey),
    Error(String),
}

impl KeyState {
    pub fn key(&self) -> Option<&AesKey> {
        match self {
            KeyState::Available(key) => Some(key),
            _ => None,
        }
    }

    /// Fingerprint of the available key, `None` in every other state.
    pub fn fingerprint(&self) -> Option<KeyFingerprint> {
        self.key().map(AesKey::fingerprint)
    }

    pub fn is_available(&self) -> bool {
        matches!(self, KeyState::Available(_))
    }
}

// ---------------------------------------------------------------------------
// Errors & wallet collaborator
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("key request failed: {0}")]
    KeyRequestFailed(String),

    #[error("the user rejected the key request")]
    Rejected,

    #[error("account is not onboarded; no AES key exists yet")]
    NotOnboarded,
}

/// The wallet extension, as far as keys are concerned.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Retrieve the existing AES key for the connected account.
    async fn fetch_key(&self) -> Result<AesKey, KeyError>;

    /// Onboard the connected account, creating and registering a new key.
    async fn onboard(&self) -> Result<AesKey, KeyError>;
}

// ---------------------------------------------------------------------------
// KeyProvisioner
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
enum Operation {
    Fetch,
    Onboard,
}

type PendingRequest = Shared<BoxFuture<'static, KeyState>>;

/// Single writer of [`KeyState`].
///
/// At most one wallet call is outstanding at any time: `request()` or
/// `onboard()` while another call is pending attaches to that call and
/// returns its outcome.
pub struct KeyProvisioner {
    source: Arc<dyn KeySource>,
    state: Arc<watch::Sender<KeyState>>,
    pending: Arc<Mutex<Option<PendingRequest>>>,
}

impl fmt::Debug for KeyProvisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyProvisioner")
            .field("state", &*self.state.borrow())
            .field("pending", &self.pending.lock().is_some())
            .finish()
    }
}

impl KeyProvisioner {
    pub fn new(source: Arc<dyn KeySource>) -> Self {
        let (state, _) = watch::channel(KeyState::Absent);
        Self {
            source,
            state: Arc::new(state),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Snapshot of the current state.
    pub fn current(&self) -> KeyState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every transition.
    pub fn subscribe(&self) -> watch::Receiver<KeyState> {
        self.state.subscribe()
    }

    /// Ask the wallet for the existing key. Returns immediately when a key
    /// is already available.
    pub async fn request(&self) -> KeyState {
        self.run(Operation::Fetch).await
    }

    /// Onboard the account and obtain its new key. Returns immediately
    /// when a key is already available.
    pub async fn onboard(&self) -> KeyState {
        self.run(Operation::Onboard).await
    }

    /// Drop the key and return to `Absent`. A request still in flight will
    /// publish its outcome when it lands.
    pub fn forget(&self) {
        self.state.send_replace(KeyState::Absent);
        info!("AES key forgotten");
    }

    async fn run(&self, op: Operation) -> KeyState {
        let current = self.current();
        if current.is_available() {
            return current;
        }
        self.start_or_join(op).await
    }

    fn start_or_join(&self, op: Operation) -> PendingRequest {
        let mut pending = self.pending.lock();
        if let Some(request) = pending.as_ref() {
            debug!(?op, "joining in-flight key request");
            return request.clone();
        }

        self.state.send_replace(KeyState::Requesting);
        info!(?op, "requesting AES key from wallet");

        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let slot = Arc::clone(&self.pending);
        let task = tokio::spawn(async move {
            let result = match op {
                Operation::Fetch => source.fetch_key().await,
                Operation::Onboard => source.onboard().await,
            };
            let next = match result {
                Ok(key) => {
                    info!(fingerprint = %key.fingerprint(), "AES key available");
                    KeyState::Available(key)
                }
                Err(e) => {
                    warn!(error = %e, "AES key request failed");
                    KeyState::Error(e.to_string())
                }
            };
            publish(&slot, &state, next)
        });

        let slot = Arc::clone(&self.pending);
        let state = Arc::clone(&self.state);
        let request = async move {
            match task.await {
                Ok(next) => next,
                Err(e) => publish(
                    &slot,
                    &state,
                    KeyState::Error(KeyError::KeyRequestFailed(e.to_string()).to_string()),
                ),
            }
        }
        .boxed()
        .shared();

        *pending = Some(request.clone());
        request
    }
}

/// Clear the in-flight slot, then publish `next`.
fn publish(
    slot: &Mutex<Option<PendingRequest>>,
    state: &watch::Sender<KeyState>,
    next: KeyState,
) -> KeyState {
    slot.lock().take();
    state.send_replace(next.clone());
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    /// Wallet double: counts calls, blocks until the gate opens.
    struct GatedSource {
        calls: AtomicUsize,
        gate: Semaphore,
        outcome: Result<AesKey, KeyError>,
    }

    impl GatedSource {
        fn new(outcome: Result<AesKey, KeyError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Semaphore::new(0),
                outcome,
            })
        }

        fn open(&self) {
            self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }

        async fn answer(&self) -> Result<AesKey, KeyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await.expect("gate closed");
            self.outcome.clone()
        }
    }

    #[async_trait]
    impl KeySource for GatedSource {
        async fn fetch_key(&self) -> Result<AesKey, KeyError> {
            self.answer().await
        }

        async fn onboard(&self) -> Result<AesKey, KeyError> {
            self.answer().await
        }
    }

    #[test]
    fn fingerprint_is_stable_and_distinct() {
        let k1 = AesKey::new("k1");
        assert_eq!(k1.fingerprint(), AesKey::new("k1").fingerprint());
        assert_ne!(k1.fingerprint(), AesKey::new("k2").fingerprint());
        assert_eq!(k1.fingerprint().as_str().len(), KEY_FINGERPRINT_HEX_LENGTH);
    }

    #[test]
    fn debug_output_hides_key_material() {
        let key = AesKey::new("super-secret-material");
        let rendered = format!("{:?}", KeyState::Available(key));
        assert!(!rendered.contains("super-secret-material"));
    }

    #[test]
    fn fingerprint_only_when_available() {
        assert_eq!(KeyState::Absent.fingerprint(), None);
        assert_eq!(KeyState::Requesting.fingerprint(), None);
        assert_eq!(KeyState::Error("x".into()).fingerprint(), None);
        assert!(KeyState::Available(AesKey::new("k")).fingerprint().is_some());
    }

    #[tokio::test]
    async fn request_transitions_to_available() {
        let source = GatedSource::new(Ok(AesKey::new("k1")));
        source.open();
        let keys = KeyProvisioner::new(source.clone());

        assert_eq!(keys.current(), KeyState::Absent);
        let state = keys.request().await;
        assert_eq!(state, KeyState::Available(AesKey::new("k1")));
        assert_eq!(keys.current(), state);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_wallet_call() {
        let source = GatedSource::new(Ok(AesKey::new("k1")));
        let keys = Arc::new(KeyProvisioner::new(source.clone()));

        let first = tokio::spawn({
            let keys = Arc::clone(&keys);
            async move { keys.request().await }
        });
        tokio::task::yield_now().await;
        assert_eq!(keys.current(), KeyState::Requesting);

        let second = tokio::spawn({
            let keys = Arc::clone(&keys);
            async move { keys.onboard().await }
        });
        tokio::task::yield_now().await;

        source.open();
        let (a, b) = (first.await.unwrap(), second.await.unwrap());
        assert_eq!(a, b);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_publishes_error_and_allows_retry() {
        let source = GatedSource::new(Err(KeyError::Rejected));
        source.open();
        let keys = KeyProvisioner::new(source.clone());

        let state = keys.request().await;
        assert!(matches!(state, KeyState::Error(_)));

        keys.request().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn available_is_terminal_until_forget() {
        let source = GatedSource::new(Ok(AesKey::new("k1")));
        source.open();
        let keys = KeyProvisioner::new(source.clone());

        keys.request().await;
        keys.request().await;
        keys.onboard().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        keys.forget();
        assert_eq!(keys.current(), KeyState::Absent);
        keys.request().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn subscribers_observe_transitions() {
        let source = GatedSource::new(Ok(AesKey::new("k1")));
        let keys = KeyProvisioner::new(source.clone());
        let mut rx = keys.subscribe();

        let pending = keys.start_or_join(Operation::Fetch);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), KeyState::Requesting);

        source.open();
        pending.await;
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_available());
    }
}
