//! Token transfers.
//!
//! A transfer is validated locally, submitted to the ledger exactly once,
//! and on success the token's cached balance is dropped so the next resolve
//! reads the new amount. Failed submissions are reported, never retried.

use thiserror::Error;
use tracing::{info, warn};

use crate::keys::KeyState;
use crate::ledger::{LedgerClient, LedgerError, TransferOrder, TransferReceipt};
use crate::token::{
    normalize_address, parse_units, BalanceCache, ResolvableToken, UnitsError, ValidationError,
};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("invalid recipient: {0}")]
    InvalidRecipient(ValidationError),

    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] UnitsError),

    #[error("transfer amount must be greater than zero")]
    ZeroAmount,

    #[error("an AES key is required to transfer an encrypted token")]
    KeyRequired,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Send `amount` (a decimal string in the token's units) of `token` to
/// `recipient`.
pub async fn transfer(
    ledger: &dyn LedgerClient,
    cache: &dyn BalanceCache,
    token: &ResolvableToken,
    recipient: &str,
    amount: &str,
    key: &KeyState,
) -> Result<TransferReceipt, TransferError> {
    let recipient = normalize_address(recipient).map_err(TransferError::InvalidRecipient)?;
    let amount = parse_units(amount, token.descriptor().decimals())?;
    if amount == 0 {
        return Err(TransferError::ZeroAmount);
    }

    let key = if token.is_native() {
        None
    } else {
        Some(key.key().ok_or(TransferError::KeyRequired)?)
    };

    let order = TransferOrder {
        contract_address: token.descriptor().contract_address().to_string(),
        recipient,
        amount,
    };

    match ledger.transfer(&order, key).await {
        Ok(receipt) => {
            cache.evict(token.identity());
            info!(token = %token.identity(), tx = %receipt.tx_hash, "transfer submitted");
            Ok(receipt)
        }
        Err(e) => {
            warn!(token = %token.identity(), error = %e, "transfer failed");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::AesKey;
    use crate::ledger::TokenMetadata;
    use crate::token::{TokenDescriptor, TokenIdentity};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    const AA: &str = "0x00000000000000000000000000000000000000aa";
    const TO: &str = "0x1111111111111111111111111111111111111111";

    #[derive(Default)]
    struct RecordingLedger {
        orders: Mutex<Vec<(TransferOrder, bool)>>,
        reject: bool,
    }

    #[async_trait]
    impl LedgerClient for RecordingLedger {
        async fn native_balance(&self) -> Result<String, LedgerError> {
            Ok("0".into())
        }

        async fn decrypt_balance(&self, _: &str, _: &AesKey) -> Result<String, LedgerError> {
            Ok("0".into())
        }

        async fn token_metadata(&self, a: &str) -> Result<TokenMetadata, LedgerError> {
            Err(LedgerError::UnknownContract(a.into()))
        }

        async fn transfer(
            &self,
            order: &TransferOrder,
            key: Option<&AesKey>,
        ) -> Result<TransferReceipt, LedgerError> {
            self.orders.lock().push((order.clone(), key.is_some()));
            if self.reject {
                return Err(LedgerError::Call("reverted".into()));
            }
            Ok(TransferReceipt {
                tx_hash: "0xabc".into(),
            })
        }
    }

    #[derive(Default)]
    struct Evictions(Mutex<Vec<TokenIdentity>>);

    impl BalanceCache for Evictions {
        fn evict(&self, identity: &TokenIdentity) {
            self.0.lock().push(identity.clone());
        }
    }

    fn foo() -> ResolvableToken {
        TokenDescriptor::fungible(AA, "Foo", "FOO", 6)
            .unwrap()
            .resolvable()
            .unwrap()
    }

    #[tokio::test]
    async fn encrypted_transfer_uses_key_and_evicts() {
        let ledger = RecordingLedger::default();
        let cache = Evictions::default();
        let key = KeyState::Available(AesKey::new("k1"));

        let receipt = transfer(&ledger, &cache, &foo(), TO, "1.5", &key)
            .await
            .unwrap();

        assert_eq!(receipt.tx_hash, "0xabc");
        let orders = ledger.orders.lock();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].0.amount, 1_500_000);
        assert_eq!(orders[0].0.contract_address, AA);
        assert!(orders[0].1);
        assert_eq!(cache.0.lock().as_slice(), &[foo().identity().clone()]);
    }

    #[tokio::test]
    async fn native_transfer_needs_no_key() {
        let ledger = RecordingLedger::default();
        let cache = Evictions::default();

        transfer(&ledger, &cache, &ResolvableToken::native(), TO, "2", &KeyState::Absent)
            .await
            .unwrap();

        let orders = ledger.orders.lock();
        assert!(orders[0].0.contract_address.is_empty());
        assert!(!orders[0].1);
    }

    #[tokio::test]
    async fn encrypted_transfer_without_key_is_rejected() {
        let ledger = RecordingLedger::default();
        let err = transfer(&ledger, &Evictions::default(), &foo(), TO, "1", &KeyState::Absent)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::KeyRequired));
        assert!(ledger.orders.lock().is_empty());
    }

    #[tokio::test]
    async fn local_validation_happens_before_submission() {
        let ledger = RecordingLedger::default();
        let cache = Evictions::default();
        let key = KeyState::Available(AesKey::new("k1"));

        let bad_recipient = transfer(&ledger, &cache, &foo(), "0x12", "1", &key).await;
        let zero = transfer(&ledger, &cache, &foo(), TO, "0.0", &key).await;
        let too_precise = transfer(&ledger, &cache, &foo(), TO, "0.0000001", &key).await;

        assert!(matches!(bad_recipient, Err(TransferError::InvalidRecipient(_))));
        assert!(matches!(zero, Err(TransferError::ZeroAmount)));
        assert!(matches!(
            too_precise,
            Err(TransferError::InvalidAmount(UnitsError::TooPrecise { .. }))
        ));
        assert!(ledger.orders.lock().is_empty());
    }

    #[tokio::test]
    async fn failed_transfer_is_not_retried() {
        let ledger = RecordingLedger {
            reject: true,
            ..Default::default()
        };
        let cache = Evictions::default();
        let key = KeyState::Available(AesKey::new("k1"));

        let err = transfer(&ledger, &cache, &foo(), TO, "1", &key)
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Ledger(LedgerError::Call(_))));
        assert_eq!(ledger.orders.lock().len(), 1);
        assert!(cache.0.lock().is_empty());
    }
}
