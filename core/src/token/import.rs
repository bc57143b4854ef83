//! Import flows for fungible tokens and NFTs.
//!
//! Both flows run the cheap checks first: address and token-id validation,
//! then a registry lookup. A token that is already tracked is rejected
//! before any ledger call is made.

use thiserror::Error;
use tracing::debug;

use super::descriptor::{validate_decimals, TokenDescriptor, TokenIdentity, ValidationError};
use super::registry::{RegistryEntry, RegistryError, TokenRegistry};
use crate::ledger::{LedgerClient, LedgerError};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("could not fetch token metadata: {0}")]
    MetadataFetchFailed(LedgerError),
}

/// User-supplied values that win over what the contract reports.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportOverrides {
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
}

/// Import the fungible token at `address`.
pub async fn import_token(
    registry: &TokenRegistry,
    ledger: &dyn LedgerClient,
    address: &str,
    overrides: &ImportOverrides,
) -> Result<RegistryEntry, ImportError> {
    let identity = TokenIdentity::fungible(address)?;
    if let Some(decimals) = overrides.decimals {
        validate_decimals(decimals)?;
    }
    ensure_new(registry, &identity)?;

    let metadata = ledger
        .token_metadata(identity.contract_address())
        .await
        .map_err(ImportError::MetadataFetchFailed)?;

    let symbol = overrides
        .symbol
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(&metadata.symbol);
    let decimals = overrides.decimals.unwrap_or(metadata.decimals);

    let descriptor =
        TokenDescriptor::fungible(identity.contract_address(), &metadata.name, symbol, decimals)?;
    Ok(registry.add(descriptor)?)
}

/// Import token `token_id` of the NFT contract at `address`.
pub async fn import_nft(
    registry: &TokenRegistry,
    ledger: &dyn LedgerClient,
    address: &str,
    token_id: &str,
) -> Result<RegistryEntry, ImportError> {
    let identity = TokenIdentity::nft(address, token_id)?;
    ensure_new(registry, &identity)?;

    let metadata = ledger
        .token_metadata(identity.contract_address())
        .await
        .map_err(ImportError::MetadataFetchFailed)?;

    let descriptor =
        TokenDescriptor::nft(identity.contract_address(), identity.token_id(), &metadata.name)?;
    Ok(registry.add(descriptor)?)
}

fn ensure_new(registry: &TokenRegistry, identity: &TokenIdentity) -> Result<(), ImportError> {
    if registry.has(identity) {
        debug!(token = %identity, "import rejected before metadata fetch");
        return Err(RegistryError::AlreadyImported(identity.clone()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::AesKey;
    use crate::ledger::{TokenMetadata, TransferOrder, TransferReceipt};
    use crate::storage::MemoryTokenStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const AA: &str = "0x00000000000000000000000000000000000000AA";

    /// Ledger that only answers metadata, counting the calls.
    #[derive(Default)]
    struct MetadataLedger {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl LedgerClient for MetadataLedger {
        async fn native_balance(&self) -> Result<String, LedgerError> {
            Ok("0".into())
        }

        async fn decrypt_balance(&self, _: &str, _: &AesKey) -> Result<String, LedgerError> {
            Err(LedgerError::Call("unused".into()))
        }

        async fn token_metadata(&self, address: &str) -> Result<TokenMetadata, LedgerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LedgerError::UnknownContract(address.into()));
            }
            Ok(TokenMetadata {
                name: "Foo".into(),
                symbol: "FOO".into(),
                decimals: 18,
            })
        }

        async fn transfer(
            &self,
            _: &TransferOrder,
            _: Option<&AesKey>,
        ) -> Result<TransferReceipt, LedgerError> {
            Err(LedgerError::Call("unused".into()))
        }
    }

    fn registry() -> TokenRegistry {
        TokenRegistry::open(Arc::new(MemoryTokenStore::new())).unwrap()
    }

    #[tokio::test]
    async fn import_uses_contract_metadata() {
        let reg = registry();
        let ledger = MetadataLedger::default();

        let entry = import_token(&reg, &ledger, AA, &ImportOverrides::default())
            .await
            .unwrap();
        assert_eq!(entry.descriptor().symbol(), "FOO");
        assert_eq!(entry.descriptor().decimals(), 18);
        assert_eq!(
            entry.descriptor().contract_address(),
            "0x00000000000000000000000000000000000000aa"
        );
    }

    #[tokio::test]
    async fn overrides_win_over_metadata() {
        let reg = registry();
        let ledger = MetadataLedger::default();
        let overrides = ImportOverrides {
            symbol: Some("MYFOO".into()),
            decimals: Some(6),
        };

        let entry = import_token(&reg, &ledger, AA, &overrides).await.unwrap();
        assert_eq!(entry.descriptor().symbol(), "MYFOO");
        assert_eq!(entry.descriptor().decimals(), 6);
        assert_eq!(entry.descriptor().name(), "Foo");
    }

    #[tokio::test]
    async fn duplicate_import_makes_no_ledger_call() {
        let reg = registry();
        let ledger = MetadataLedger::default();
        import_token(&reg, &ledger, AA, &ImportOverrides::default())
            .await
            .unwrap();

        let err = import_token(&reg, &ledger, &AA.to_lowercase(), &ImportOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ImportError::Registry(RegistryError::AlreadyImported(_))
        ));
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_address_makes_no_ledger_call() {
        let reg = registry();
        let ledger = MetadataLedger::default();
        let err = import_token(&reg, &ledger, "0x123", &ImportOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Invalid(_)));
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn oversized_decimals_override_makes_no_ledger_call() {
        let reg = registry();
        let ledger = MetadataLedger::default();
        let overrides = ImportOverrides {
            symbol: None,
            decimals: Some(77),
        };

        let err = import_token(&reg, &ledger, AA, &overrides).await.unwrap_err();
        assert!(matches!(
            err,
            ImportError::Invalid(ValidationError::DecimalsOutOfRange(77))
        ));
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 0);
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn metadata_failure_is_surfaced() {
        let reg = registry();
        let ledger = MetadataLedger {
            fail: true,
            ..Default::default()
        };
        let err = import_token(&reg, &ledger, AA, &ImportOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::MetadataFetchFailed(_)));
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn nft_import_is_keyed_by_token_id() {
        let reg = registry();
        let ledger = MetadataLedger::default();

        import_nft(&reg, &ledger, AA, "1").await.unwrap();
        import_nft(&reg, &ledger, AA, "2").await.unwrap();
        let err = import_nft(&reg, &ledger, AA, "1").await.unwrap_err();

        assert!(matches!(
            err,
            ImportError::Registry(RegistryError::AlreadyImported(_))
        ));
        assert_eq!(reg.len(), 2);
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn nft_token_id_must_be_numeric() {
        let reg = registry();
        let ledger = MetadataLedger::default();
        let err = import_nft(&reg, &ledger, AA, "abc").await.unwrap_err();
        assert!(matches!(
            err,
            ImportError::Invalid(ValidationError::InvalidTokenId(_))
        ));
    }
}
