//! # Ledger Module - Contract-Call Collaborator
//!
//! Everything Coffer needs from the chain goes through a [`LedgerClient`]:
//! the native balance, decrypting an encrypted token balance with the user's
//! AES key, reading token metadata, and submitting transfers.
//!
//! Reads are assumed idempotent and may be repeated. Transfers are not, and
//! nothing in this crate ever retries one.
//!
//! ```text
//! mod.rs   - the collaborator trait and its data types
//! local.rs - sled-backed development ledger with AES-GCM sealed balances
//! ```

pub mod local;

pub use local::LocalLedger;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keys::AesKey;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The encrypted balance could not be opened with the supplied key.
    #[error("balance decryption failed: {0}")]
    Decrypt(String),

    /// No token contract is deployed at this address.
    #[error("no token contract at {0}")]
    UnknownContract(String),

    /// The sender does not hold enough to cover a transfer.
    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: u128, required: u128 },

    /// The call reached the chain and was refused, or never reached it.
    #[error("contract call failed: {0}")]
    Call(String),
}

/// What a token contract says about itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// A transfer ready for submission. Amounts are in base units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOrder {
    /// Token contract, empty for the native currency.
    pub contract_address: String,
    pub recipient: String,
    pub amount: u128,
}

/// Acknowledgement of a submitted transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub tx_hash: String,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Formatted native balance of the connected account.
    async fn native_balance(&self) -> Result<String, LedgerError>;

    /// Decrypt and format the account's balance of the token at
    /// `contract_address`.
    async fn decrypt_balance(
        &self,
        contract_address: &str,
        key: &AesKey,
    ) -> Result<String, LedgerError>;

    async fn token_metadata(&self, contract_address: &str) -> Result<TokenMetadata, LedgerError>;

    /// Submit a transfer. Encrypted-token transfers need the AES key to
    /// encrypt the amount; native transfers pass `None`.
    async fn transfer(
        &self,
        order: &TransferOrder,
        key: Option<&AesKey>,
    ) -> Result<TransferReceipt, LedgerError>;
}
