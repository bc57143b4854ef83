//! # Cryptographic Primitives
//!
//! Thin, type-safe wrappers around audited implementations:
//!
//! - **AES-256-GCM** seals encrypted balances held by the local ledger.
//! - **BLAKE3** derives key fingerprints used to tag cached balances.
//! - **SHA-256** stretches a wallet-provided AES key string into a
//!   fixed-size cipher key.

pub mod encryption;
pub mod hash;

pub use encryption::{decrypt, encrypt, EncryptionError};
pub use hash::{blake3_hash, derive_cipher_key, sha256_array};
