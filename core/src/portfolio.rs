//! # Portfolio - One Handle Over Registry, Resolver, Keys & Ledger
//!
//! The pieces of Coffer are usable on their own, but most callers want the
//! same wiring: one registry, one resolver evicting on its behalf, one key
//! provisioner, one ledger. [`Portfolio`] owns that wiring and exposes the
//! user-level operations.

use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use crate::balance::{sort_rows, BalanceResolver, SortOrder, TokenRow};
use crate::config::ResolverConfig;
use crate::keys::KeyProvisioner;
use crate::ledger::{LedgerClient, LedgerError, TransferReceipt};
use crate::token::{
    import_nft, import_token, ImportError, ImportOverrides, RegistryEntry, RegistryError,
    TokenIdentity, TokenKind, TokenRegistry, ValidationError,
};
use crate::transfer::{self, TransferError};

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("could not fetch token metadata: {0}")]
    Metadata(LedgerError),
}

pub struct Portfolio {
    registry: Arc<TokenRegistry>,
    ledger: Arc<dyn LedgerClient>,
    resolver: BalanceResolver,
    keys: Arc<KeyProvisioner>,
}

impl Portfolio {
    pub fn new(
        registry: Arc<TokenRegistry>,
        ledger: Arc<dyn LedgerClient>,
        keys: Arc<KeyProvisioner>,
    ) -> Self {
        Self::with_config(registry, ledger, keys, ResolverConfig::default())
    }

    pub fn with_config(
        registry: Arc<TokenRegistry>,
        ledger: Arc<dyn LedgerClient>,
        keys: Arc<KeyProvisioner>,
        config: ResolverConfig,
    ) -> Self {
        let resolver = BalanceResolver::with_config(Arc::clone(&registry), Arc::clone(&ledger), config);
        Self {
            registry,
            ledger,
            resolver,
            keys,
        }
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &BalanceResolver {
        &self.resolver
    }

    pub fn keys(&self) -> &KeyProvisioner {
        &self.keys
    }

    /// Keep placeholder balances in step with the key provisioner.
    pub fn follow_keys(&self) -> JoinHandle<()> {
        self.resolver.follow_keys(self.keys.subscribe())
    }

    /// Native and fungible tokens with their balances under the current key.
    /// Balances resolve concurrently; a failed one shows as failed without
    /// holding up the rest.
    pub async fn rows(&self, order: SortOrder) -> Vec<TokenRow> {
        let key = self.keys.current();
        let tokens: Vec<_> = self
            .registry
            .list()
            .into_iter()
            .filter_map(|entry| entry.descriptor().resolvable())
            .collect();

        let balances = join_all(tokens.iter().map(|t| self.resolver.resolve(t, &key))).await;

        let mut rows: Vec<TokenRow> = tokens
            .into_iter()
            .zip(balances)
            .map(|(token, balance)| TokenRow {
                descriptor: token.into_descriptor(),
                balance,
            })
            .collect();
        sort_rows(&mut rows, order);
        rows
    }

    /// Imported NFTs in import order.
    pub fn nfts(&self) -> Vec<RegistryEntry> {
        self.registry
            .imported()
            .into_iter()
            .filter(|e| e.descriptor().kind() == TokenKind::Nft)
            .collect()
    }

    pub async fn import_token(
        &self,
        address: &str,
        overrides: &ImportOverrides,
    ) -> Result<RegistryEntry, PortfolioError> {
        Ok(import_token(&self.registry, self.ledger.as_ref(), address, overrides).await?)
    }

    pub async fn import_nft(
        &self,
        address: &str,
        token_id: &str,
    ) -> Result<RegistryEntry, PortfolioError> {
        Ok(import_nft(&self.registry, self.ledger.as_ref(), address, token_id).await?)
    }

    /// Stop tracking the token at `address` (and `token_id`, for NFTs).
    pub fn remove(
        &self,
        address: &str,
        token_id: Option<&str>,
    ) -> Result<RegistryEntry, PortfolioError> {
        let identity = TokenIdentity::parse(address, token_id)?;
        Ok(self.registry.remove(&identity, &self.resolver)?)
    }

    pub fn clear(&self) -> Result<usize, PortfolioError> {
        Ok(self.registry.clear(&self.resolver)?)
    }

    /// Pick up changes another process made to the persisted token list.
    pub fn reload(&self) -> Result<(), PortfolioError> {
        Ok(self.registry.reload(&self.resolver)?)
    }

    /// Re-read name and symbol from the contract.
    pub async fn refresh_metadata(
        &self,
        identity: &TokenIdentity,
    ) -> Result<RegistryEntry, PortfolioError> {
        if !self.registry.has(identity) {
            return Err(RegistryError::NotFound(identity.clone()).into());
        }
        let metadata = self
            .ledger
            .token_metadata(identity.contract_address())
            .await
            .map_err(PortfolioError::Metadata)?;
        Ok(self
            .registry
            .refresh_metadata(identity, &metadata.name, &metadata.symbol)?)
    }

    /// Transfer a tracked token. `address` of `None` sends the native
    /// currency.
    pub async fn transfer(
        &self,
        address: Option<&str>,
        recipient: &str,
        amount: &str,
    ) -> Result<TransferReceipt, PortfolioError> {
        let identity = match address {
            Some(address) => TokenIdentity::fungible(address)?,
            None => TokenIdentity::native(),
        };
        let entry = self
            .registry
            .get(&identity)
            .ok_or_else(|| RegistryError::NotFound(identity.clone()))?;
        let token = entry
            .descriptor()
            .resolvable()
            .ok_or_else(|| ValidationError::NotResolvable(identity.clone()))?;

        let receipt = transfer::transfer(
            self.ledger.as_ref(),
            &self.resolver,
            &token,
            recipient,
            amount,
            &self.keys.current(),
        )
        .await?;
        info!(token = %identity, "portfolio transfer complete");
        Ok(receipt)
    }
}
