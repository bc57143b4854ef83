// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Coffer CLI
//!
//! Entry point for the `coffer` binary. Parses CLI arguments, initializes
//! logging, opens the data directory and runs one wallet command against
//! the local development ledger.
//!
//! - `init`       - create the data directory and onboard an AES key
//! - `tokens`     - list tokens with balances
//! - `import`     - import a fungible token
//! - `import-nft` - import an NFT
//! - `nfts`       - list NFTs
//! - `remove`     - stop tracking a token or NFT
//! - `mint`       - credit the local ledger
//! - `transfer`   - send tokens
//! - `version`    - print build version information

mod cli;
mod logging;
mod wallet;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;

use coffer_core::config::{DB_DIR_NAME, NATIVE_TOKEN_DECIMALS};
use coffer_core::keys::{AesKey, KeyProvisioner, KeySource, KeyState};
use coffer_core::ledger::{LedgerClient, LedgerError, LocalLedger, TokenMetadata};
use coffer_core::portfolio::Portfolio;
use coffer_core::storage::SledTokenStore;
use coffer_core::token::{parse_units, ImportOverrides, RegistryEntry, TokenRegistry};

use cli::{Commands, CofferCli};
use wallet::FileKeySource;

const DEFAULT_LOG_FILTER: &str = "coffer=info,coffer_core=info";

/// Everything a command needs, opened from the data directory.
struct Wallet {
    portfolio: Portfolio,
    ledger: Arc<LocalLedger>,
    keys: Arc<KeyProvisioner>,
    key_source: Arc<FileKeySource>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CofferCli::parse();

    if let Commands::Version = cli.command {
        print_version();
        return Ok(());
    }

    logging::init_logging(DEFAULT_LOG_FILTER, cli.log_format);

    if let Commands::Init = cli.command {
        std::fs::create_dir_all(&cli.data_dir).with_context(|| {
            format!("failed to create data directory: {}", cli.data_dir.display())
        })?;
    }
    let wallet = open_wallet(&cli.data_dir, cli.aes_key.clone())?;

    match cli.command {
        Commands::Init => init(&wallet, &cli.data_dir).await,
        Commands::Tokens(args) => list_tokens(&wallet, args).await,
        Commands::Import(args) => import(&wallet, args).await,
        Commands::ImportNft(args) => import_nft(&wallet, args).await,
        Commands::Nfts(args) => list_nfts(&wallet, args),
        Commands::Remove(args) => remove(&wallet, args),
        Commands::Mint(args) => mint(&wallet, args).await,
        Commands::Transfer(args) => transfer(&wallet, args).await,
        Commands::Version => Ok(()),
    }
}

fn open_wallet(data_dir: &Path, aes_key: Option<String>) -> Result<Wallet> {
    if !data_dir.is_dir() {
        bail!(
            "data directory {} does not exist; run `coffer init` first",
            data_dir.display()
        );
    }

    let db_path = data_dir.join(DB_DIR_NAME);
    let store = SledTokenStore::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    let ledger = Arc::new(LocalLedger::open(store.db()).context("failed to open the local ledger")?);
    let registry =
        Arc::new(TokenRegistry::open(Arc::new(store)).context("failed to load token list")?);
    tracing::debug!(path = %db_path.display(), tokens = registry.len(), "database opened");

    let key_source = Arc::new(FileKeySource::new(data_dir, aes_key));
    let keys = Arc::new(KeyProvisioner::new(
        Arc::clone(&key_source) as Arc<dyn KeySource>
    ));
    let portfolio = Portfolio::new(
        registry,
        Arc::clone(&ledger) as Arc<dyn LedgerClient>,
        Arc::clone(&keys),
    );

    Ok(Wallet {
        portfolio,
        ledger,
        keys,
        key_source,
    })
}

/// Ask for the key and return it, failing with a readable message when
/// there is none.
async fn require_key(wallet: &Wallet) -> Result<AesKey> {
    match wallet.keys.request().await {
        KeyState::Available(key) => Ok(key),
        KeyState::Error(reason) => bail!("no AES key available: {reason}"),
        other => bail!("no AES key available ({other:?})"),
    }
}

async fn init(wallet: &Wallet, data_dir: &Path) -> Result<()> {
    let state = wallet.keys.onboard().await;
    let fingerprint = match &state {
        KeyState::Available(key) => key.fingerprint(),
        KeyState::Error(reason) => bail!("onboarding failed: {reason}"),
        other => bail!("onboarding did not complete ({other:?})"),
    };

    println!("Wallet initialized.");
    println!("  Data directory  : {}", data_dir.display());
    println!("  Key file        : {}", wallet.key_source.key_path().display());
    println!("  Key fingerprint : {fingerprint}");
    Ok(())
}

async fn list_tokens(wallet: &Wallet, args: cli::TokensArgs) -> Result<()> {
    // A missing key is not an error here; balances show the placeholder.
    wallet.keys.request().await;
    let rows = wallet.portfolio.rows(args.sort.into()).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{:<8} {:<24} {:>18}  ADDRESS", "SYMBOL", "NAME", "BALANCE");
    for row in &rows {
        let address = match row.descriptor.contract_address() {
            "" => "(native)",
            a => a,
        };
        println!(
            "{:<8} {:<24} {:>18}  {}",
            row.descriptor.symbol(),
            row.descriptor.name(),
            row.balance.display(None),
            address
        );
    }
    Ok(())
}

async fn import(wallet: &Wallet, args: cli::ImportArgs) -> Result<()> {
    let overrides = ImportOverrides {
        symbol: args.symbol,
        decimals: args.decimals,
    };
    let entry = wallet
        .portfolio
        .import_token(&args.address, &overrides)
        .await
        .with_context(|| format!("failed to import token {}", args.address))?;
    print_imported(&entry);
    Ok(())
}

async fn import_nft(wallet: &Wallet, args: cli::ImportNftArgs) -> Result<()> {
    let entry = wallet
        .portfolio
        .import_nft(&args.address, &args.token_id)
        .await
        .with_context(|| format!("failed to import NFT {} #{}", args.address, args.token_id))?;
    print_imported(&entry);
    Ok(())
}

fn print_imported(entry: &RegistryEntry) {
    let d = entry.descriptor();
    println!("Imported {} ({}) [{}]", d.name(), d.symbol(), entry.identity());
}

fn list_nfts(wallet: &Wallet, args: cli::NftsArgs) -> Result<()> {
    let nfts = wallet.portfolio.nfts();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&nfts)?);
        return Ok(());
    }
    if nfts.is_empty() {
        println!("No NFTs imported.");
    }
    for entry in &nfts {
        let d = entry.descriptor();
        println!(
            "{:<24} #{:<10} {}",
            d.name(),
            d.token_id().unwrap_or_default(),
            d.contract_address()
        );
    }
    Ok(())
}

fn remove(wallet: &Wallet, args: cli::RemoveArgs) -> Result<()> {
    let removed = wallet
        .portfolio
        .remove(&args.address, args.token_id.as_deref())
        .context("failed to remove token")?;
    println!("Removed {} [{}]", removed.descriptor().name(), removed.identity());
    Ok(())
}

async fn mint(wallet: &Wallet, args: cli::MintArgs) -> Result<()> {
    let ledger = &wallet.ledger;

    let Some(address) = args.address else {
        let current = parse_units(&ledger.native_balance().await?, NATIVE_TOKEN_DECIMALS)?;
        let amount = parse_units(&args.amount, NATIVE_TOKEN_DECIMALS)?;
        let next = current
            .checked_add(amount)
            .context("native balance overflow")?;
        ledger.set_native_balance(next)?;
        println!("Native balance credited with {}", args.amount);
        return Ok(());
    };

    let metadata = match ledger.token_metadata(&address).await {
        Ok(metadata) => metadata,
        Err(LedgerError::UnknownContract(_)) => {
            let metadata = TokenMetadata {
                name: args.name,
                symbol: args.symbol,
                decimals: args.decimals,
            };
            ledger
                .deploy_token(&address, metadata.clone())
                .with_context(|| format!("failed to deploy token at {address}"))?;
            println!("Deployed {} ({}) at {address}", metadata.name, metadata.symbol);
            metadata
        }
        Err(e) => return Err(e).context("failed to read token metadata"),
    };

    let key = require_key(wallet).await?;
    let amount = parse_units(&args.amount, metadata.decimals)?;
    ledger
        .mint(&address, amount, &key)
        .with_context(|| format!("failed to mint {}", metadata.symbol))?;
    println!("Minted {} {}", args.amount, metadata.symbol);
    Ok(())
}

async fn transfer(wallet: &Wallet, args: cli::TransferArgs) -> Result<()> {
    if args.address.is_some() {
        require_key(wallet).await?;
    }
    let receipt = wallet
        .portfolio
        .transfer(args.address.as_deref(), &args.to, &args.amount)
        .await
        .context("transfer failed")?;
    println!("Sent {} to {}", args.amount, args.to);
    println!("  tx: {}", receipt.tx_hash);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("coffer {}", env!("CARGO_PKG_VERSION"));
    println!("rustc  {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}
