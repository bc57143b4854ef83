//! # LocalLedger - Development Ledger over sled
//!
//! A self-contained stand-in for the chain, good enough to drive the CLI
//! and integration tests end to end. Token balances are stored the way the
//! real network stores them: encrypted, openable only with the account's
//! AES key.
//!
//! | Tree               | Key                   | Value                                 |
//! |--------------------|-----------------------|---------------------------------------|
//! | `ledger_tokens`    | contract address      | `bincode(TokenMetadata)`              |
//! | `ledger_balances`  | contract address      | `AES-GCM(raw balance, aad = address)` |
//! | `ledger_meta`      | `native_balance`      | raw native balance (16B BE)           |
//! | `ledger_transfers` | sequence (8B BE)      | `bincode(TransferRecord)`             |
//!
//! The cipher key is SHA-256 of the user's AES key string. Minting or
//! paying under one key and reading under another fails with
//! [`LedgerError::Decrypt`], exactly like a wrong key against the real
//! contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use tracing::{debug, info};

use super::{LedgerClient, LedgerError, TokenMetadata, TransferOrder, TransferReceipt};
use crate::config::NATIVE_TOKEN_DECIMALS;
use crate::crypto::encryption::{decrypt, encrypt};
use crate::crypto::hash::{blake3_hash, derive_cipher_key};
use crate::keys::AesKey;
use crate::token::descriptor::normalize_address;
use crate::token::units::format_units;

const TOKENS_TREE: &str = "ledger_tokens";
const BALANCES_TREE: &str = "ledger_balances";
const META_TREE: &str = "ledger_meta";
const TRANSFERS_TREE: &str = "ledger_transfers";

const META_NATIVE_BALANCE: &[u8] = b"native_balance";

/// One executed transfer, kept for inspection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub order: TransferOrder,
    pub tx_hash: String,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct LocalLedger {
    db: Db,
    tokens: Tree,
    balances: Tree,
    meta: Tree,
    transfers: Tree,
    /// Serialises read-modify-write cycles on balances.
    write_lock: Mutex<()>,
}

fn storage_err(e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Call(format!("ledger storage: {e}"))
}

impl LocalLedger {
    /// Open the ledger's trees inside an existing database.
    pub fn open(db: &Db) -> Result<Self, LedgerError> {
        Ok(Self {
            db: db.clone(),
            tokens: db.open_tree(TOKENS_TREE).map_err(storage_err)?,
            balances: db.open_tree(BALANCES_TREE).map_err(storage_err)?,
            meta: db.open_tree(META_TREE).map_err(storage_err)?,
            transfers: db.open_tree(TRANSFERS_TREE).map_err(storage_err)?,
            write_lock: Mutex::new(()),
        })
    }

    /// A throwaway in-memory ledger.
    pub fn open_temporary() -> Result<Self, LedgerError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(storage_err)?;
        Self::open(&db)
    }

    /// Register a token contract.
    pub fn deploy_token(&self, address: &str, metadata: TokenMetadata) -> Result<(), LedgerError> {
        let address = normalize(address)?;
        let bytes = bincode::serialize(&metadata).map_err(storage_err)?;
        self.tokens.insert(address.as_bytes(), bytes).map_err(storage_err)?;
        info!(contract = %address, symbol = %metadata.symbol, "token deployed");
        Ok(())
    }

    /// Credit `amount` base units of a token, sealed under `key`.
    pub fn mint(&self, address: &str, amount: u128, key: &AesKey) -> Result<u128, LedgerError> {
        let address = normalize(address)?;
        self.metadata_of(&address)?;

        let _guard = self.write_lock.lock();
        let current = self.read_sealed(&address, key)?;
        let next = current
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Call("balance overflow".into()))?;
        self.write_sealed(&address, next, key)?;
        Ok(next)
    }

    /// Set the native balance in base units.
    pub fn set_native_balance(&self, amount: u128) -> Result<(), LedgerError> {
        self.meta
            .insert(META_NATIVE_BALANCE, &amount.to_be_bytes()[..])
            .map_err(storage_err)?;
        Ok(())
    }

    /// Every executed transfer, oldest first.
    pub fn transfers(&self) -> Result<Vec<TransferRecord>, LedgerError> {
        self.transfers
            .iter()
            .values()
            .map(|value| {
                let bytes = value.map_err(storage_err)?;
                bincode::deserialize(&bytes).map_err(storage_err)
            })
            .collect()
    }

    fn metadata_of(&self, address: &str) -> Result<TokenMetadata, LedgerError> {
        let bytes = self
            .tokens
            .get(address.as_bytes())
            .map_err(storage_err)?
            .ok_or_else(|| LedgerError::UnknownContract(address.to_string()))?;
        bincode::deserialize(&bytes).map_err(storage_err)
    }

    fn native_raw(&self) -> Result<u128, LedgerError> {
        match self.meta.get(META_NATIVE_BALANCE).map_err(storage_err)? {
            Some(bytes) => {
                let arr: [u8; 16] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| storage_err("invalid native balance bytes"))?;
                Ok(u128::from_be_bytes(arr))
            }
            None => Ok(0),
        }
    }

    /// Open the sealed balance for `address`. A token never credited to
    /// this account holds zero.
    fn read_sealed(&self, address: &str, key: &AesKey) -> Result<u128, LedgerError> {
        let Some(sealed) = self.balances.get(address.as_bytes()).map_err(storage_err)? else {
            return Ok(0);
        };
        let cipher_key = derive_cipher_key(key.expose());
        let plain = decrypt(&cipher_key, &sealed, address.as_bytes())
            .map_err(|e| LedgerError::Decrypt(e.to_string()))?;
        std::str::from_utf8(&plain)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| LedgerError::Decrypt("malformed balance plaintext".into()))
    }

    fn write_sealed(&self, address: &str, amount: u128, key: &AesKey) -> Result<(), LedgerError> {
        let cipher_key = derive_cipher_key(key.expose());
        let sealed = encrypt(&cipher_key, amount.to_string().as_bytes(), address.as_bytes())
            .map_err(|e| LedgerError::Call(e.to_string()))?;
        self.balances
            .insert(address.as_bytes(), sealed)
            .map_err(storage_err)?;
        Ok(())
    }

    fn record(&self, order: &TransferOrder) -> Result<TransferReceipt, LedgerError> {
        let seq = self.db.generate_id().map_err(storage_err)?;
        let mut preimage = bincode::serialize(order).map_err(storage_err)?;
        preimage.extend_from_slice(&seq.to_be_bytes());
        let tx_hash = format!("0x{}", hex::encode(blake3_hash(&preimage)));

        let record = TransferRecord {
            order: order.clone(),
            tx_hash: tx_hash.clone(),
            executed_at: Utc::now(),
        };
        let bytes = bincode::serialize(&record).map_err(storage_err)?;
        self.transfers
            .insert(seq.to_be_bytes(), bytes)
            .map_err(storage_err)?;
        self.db.flush().map_err(storage_err)?;

        info!(tx = %tx_hash, amount = order.amount, "transfer executed");
        Ok(TransferReceipt { tx_hash })
    }
}

fn normalize(address: &str) -> Result<String, LedgerError> {
    normalize_address(address).map_err(|e| LedgerError::Call(e.to_string()))
}

#[async_trait]
impl LedgerClient for LocalLedger {
    async fn native_balance(&self) -> Result<String, LedgerError> {
        Ok(format_units(self.native_raw()?, NATIVE_TOKEN_DECIMALS))
    }

    async fn decrypt_balance(
        &self,
        contract_address: &str,
        key: &AesKey,
    ) -> Result<String, LedgerError> {
        let address = normalize(contract_address)?;
        let metadata = self.metadata_of(&address)?;
        let raw = self.read_sealed(&address, key)?;
        debug!(contract = %address, "balance decrypted");
        Ok(format_units(raw, metadata.decimals))
    }

    async fn token_metadata(&self, contract_address: &str) -> Result<TokenMetadata, LedgerError> {
        self.metadata_of(&normalize(contract_address)?)
    }

    async fn transfer(
        &self,
        order: &TransferOrder,
        key: Option<&AesKey>,
    ) -> Result<TransferReceipt, LedgerError> {
        let _guard = self.write_lock.lock();

        if order.contract_address.is_empty() {
            let available = self.native_raw()?;
            let remaining = available.checked_sub(order.amount).ok_or(
                LedgerError::InsufficientBalance {
                    available,
                    required: order.amount,
                },
            )?;
            self.set_native_balance(remaining)?;
            return self.record(order);
        }

        let key = key.ok_or_else(|| {
            LedgerError::Call("encrypted transfers need the sender's AES key".into())
        })?;
        let address = normalize(&order.contract_address)?;
        self.metadata_of(&address)?;

        let available = self.read_sealed(&address, key)?;
        let remaining =
            available
                .checked_sub(order.amount)
                .ok_or(LedgerError::InsufficientBalance {
                    available,
                    required: order.amount,
                })?;
        self.write_sealed(&address, remaining, key)?;
        self.record(order)
    }
}
