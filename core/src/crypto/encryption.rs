//! # AES-256-GCM Encryption
//!
//! Authenticated encryption for balances held by the local ledger. A
//! balance is sealed under the owner's cipher key with the token's contract
//! address as additional authenticated data, so a ciphertext copied from one
//! token's slot into another's fails to open instead of silently reporting
//! the wrong amount.
//!
//! ## Wire format
//!
//! `encrypt()` returns `nonce || ciphertext` as a single `Vec<u8>`: 12 bytes
//! of random nonce followed by the ciphertext and its 16-byte tag.
//! `decrypt()` expects the same layout.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH};

/// Errors that can occur during encryption/decryption. A wrong key and a
/// corrupted ciphertext produce the same `DecryptFailed`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    DecryptFailed,

    #[error("ciphertext too short: must be at least {AES_NONCE_LENGTH} bytes")]
    CiphertextTooShort,
}

/// Encrypt `plaintext` with a random nonce, authenticating `aad` alongside.
///
/// # Example
///
/// ```
/// use coffer_core::crypto::encryption::{decrypt, encrypt};
///
/// let key = [0x42u8; 32];
/// let sealed = encrypt(&key, b"1000", b"0xaa").unwrap();
/// assert_eq!(decrypt(&key, &sealed, b"0xaa").unwrap(), b"1000");
/// ```
pub fn encrypt(
    key: &[u8; AES_KEY_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;

    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::EncryptFailed)?;

    let mut out = Vec::with_capacity(AES_NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt data previously sealed with [`encrypt`] under the same `aad`.
pub fn decrypt(
    key: &[u8; AES_KEY_LENGTH],
    data: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    if data.len() < AES_NONCE_LENGTH {
        return Err(EncryptionError::CiphertextTooShort);
    }

    let (nonce_bytes, ciphertext) = data.split_at(AES_NONCE_LENGTH);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::DecryptFailed)
}
