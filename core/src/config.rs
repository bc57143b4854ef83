//! # Constants & Tunables
//!
//! Every magic number in Coffer lives here. Display strings, cryptographic
//! lengths, storage tree names and the resolver's default timings are all
//! defined once and referenced everywhere else.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Native Token
// ---------------------------------------------------------------------------

/// Display name of the chain's base currency.
pub const NATIVE_TOKEN_NAME: &str = "COTI";

/// Ticker of the chain's base currency.
pub const NATIVE_TOKEN_SYMBOL: &str = "COTI";

/// Decimal places of the base currency (wei-style, 10^-18).
pub const NATIVE_TOKEN_DECIMALS: u8 = 18;

/// Largest decimals value a token may declare. `10^38` is the biggest power
/// of ten a `u128` holds.
pub const MAX_TOKEN_DECIMALS: u8 = 38;

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// Shown in place of a balance that cannot be decrypted without a key.
pub const ENCRYPTED_PLACEHOLDER: &str = "(encrypted)";

/// Shown while a decrypt call is outstanding.
pub const LOADING_TEXT: &str = "Loading...";

/// Shown when a decrypt call failed.
pub const FAILED_TEXT: &str = "(unavailable)";

/// Balances longer than this are cut and suffixed with `...` in list views.
pub const MAX_BALANCE_DISPLAY_LENGTH: usize = 12;

/// Symbol recorded for imported NFTs. Collections rarely expose a useful one.
pub const NFT_SYMBOL: &str = "NFT";

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// Number of hex digits in a contract or account address (20 bytes).
pub const ADDRESS_HEX_LENGTH: usize = 40;

/// Prefix every address must carry.
pub const ADDRESS_PREFIX: &str = "0x";

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// Number of hex characters of a key fingerprint kept for display and
/// cache tagging. 16 hex chars = 64 bits, plenty to tell keys apart.
pub const KEY_FINGERPRINT_HEX_LENGTH: usize = 16;

/// Domain separator mixed into key fingerprints so they can never collide
/// with any other BLAKE3 digest of the raw key material.
pub const KEY_FINGERPRINT_CONTEXT: &str = "coffer/key-fingerprint/v1";

// ---------------------------------------------------------------------------
// Resolver Timing
// ---------------------------------------------------------------------------

/// How long a failed decrypt stays cached before a fresh resolve retries.
pub const FAILED_RESULT_TTL: Duration = Duration::from_secs(5);

/// Capacity of the balance-update broadcast channel.
pub const BALANCE_UPDATE_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// sled tree holding the imported-token list.
pub const TOKENS_TREE: &str = "imported_tokens";

/// Key (inside [`TOKENS_TREE`]) under which the whole list is stored.
pub const TOKENS_KEY: &[u8] = b"tokens";

/// Default on-disk database directory name inside the data dir.
pub const DB_DIR_NAME: &str = "db";

/// Runtime tunables for the balance resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Validity window of a cached `Failed` result.
    pub failure_ttl: Duration,

    /// Capacity of the broadcast channel carrying completed resolves.
    pub update_capacity: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            failure_ttl: FAILED_RESULT_TTL,
            update_capacity: BALANCE_UPDATE_CHANNEL_CAPACITY,
        }
    }
}
