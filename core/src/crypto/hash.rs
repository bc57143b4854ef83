//! # Hashing Utilities
//!
//! - **BLAKE3** for everything Coffer-internal: key fingerprints and
//!   cache tags. Keyed derivation mode gives us domain separation for free.
//! - **SHA-256** for turning an arbitrary-length wallet key string into a
//!   32-byte AES-256 key, matching what the wallet extension does on its side.

use sha2::{Digest, Sha256};

use crate::config::AES_KEY_LENGTH;

/// Compute the BLAKE3 hash of the input data.
///
/// # Example
///
/// ```
/// use coffer_core::crypto::blake3_hash;
///
/// let hash = blake3_hash(b"coffer");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// BLAKE3 in key-derivation mode. `context` must be a hardcoded,
/// globally unique string; two different contexts never produce related
/// outputs for the same input.
pub fn blake3_derive(context: &str, material: &[u8]) -> [u8; 32] {
    blake3::derive_key(context, material)
}

/// Compute the SHA-256 hash and return a fixed-size array.
pub fn sha256_array(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Stretch a user AES key (as handed out by the wallet, usually a hex
/// string) into an AES-256 cipher key.
pub fn derive_cipher_key(user_key: &str) -> [u8; AES_KEY_LENGTH] {
    sha256_array(user_key.as_bytes())
}
