//! # CLI Interface
//!
//! Defines the command-line argument structure for `coffer` using `clap`
//! derive. Global options select the data directory, the AES key and the
//! log format; each subcommand is one user-level wallet action.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use coffer_core::balance::SortOrder;

use crate::logging::LogFormat;

/// Coffer encrypted-balance wallet.
///
/// Tracks imported tokens and NFTs, shows balances that are stored on the
/// ledger as ciphertext, and sends transfers. Runs against a local
/// development ledger kept in the data directory.
#[derive(Parser, Debug)]
#[command(
    name = "coffer",
    about = "Coffer encrypted-balance wallet",
    version,
    propagate_version = true
)]
pub struct CofferCli {
    /// Data directory holding the token list, the local ledger and the key
    /// file. Created by `coffer init`.
    #[arg(
        long,
        short = 'd',
        global = true,
        env = "COFFER_DATA_DIR",
        default_value = ".coffer"
    )]
    pub data_dir: PathBuf,

    /// AES key used to decrypt balances. Overrides the key file written by
    /// `coffer init`.
    #[arg(long, global = true, env = "COFFER_AES_KEY", hide_env_values = true)]
    pub aes_key: Option<String>,

    /// Log output format.
    #[arg(
        long,
        global = true,
        env = "COFFER_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Pretty
    )]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data directory and onboard a new AES key.
    Init,
    /// List the native token and imported fungible tokens with balances.
    Tokens(TokensArgs),
    /// Import a fungible token by contract address.
    Import(ImportArgs),
    /// Import one NFT by contract address and token id.
    ImportNft(ImportNftArgs),
    /// List imported NFTs.
    Nfts(NftsArgs),
    /// Stop tracking a token or NFT.
    Remove(RemoveArgs),
    /// Credit the local ledger, deploying the token contract if needed.
    Mint(MintArgs),
    /// Send tokens. Omit `--address` to send the native currency.
    Transfer(TransferArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    /// Registry order, native first.
    Registry,
    /// A to Z by name.
    #[value(name = "az")]
    Alphabetical,
    /// Largest balance first.
    Balance,
}

impl From<SortArg> for SortOrder {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Registry => SortOrder::Registry,
            SortArg::Alphabetical => SortOrder::Alphabetical,
            SortArg::Balance => SortOrder::DecliningBalance,
        }
    }
}

#[derive(Parser, Debug)]
pub struct TokensArgs {
    #[arg(long, value_enum, default_value_t = SortArg::Registry)]
    pub sort: SortArg,

    /// Print JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ImportArgs {
    /// Token contract address (0x followed by 40 hex digits).
    #[arg(long, short = 'a')]
    pub address: String,

    /// Symbol to show instead of the one the contract reports.
    #[arg(long)]
    pub symbol: Option<String>,

    /// Decimals to use instead of the ones the contract reports.
    #[arg(long)]
    pub decimals: Option<u8>,
}

#[derive(Parser, Debug)]
pub struct ImportNftArgs {
    #[arg(long, short = 'a')]
    pub address: String,

    #[arg(long)]
    pub token_id: String,
}

#[derive(Parser, Debug)]
pub struct NftsArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct RemoveArgs {
    #[arg(long, short = 'a')]
    pub address: String,

    /// Required for NFTs.
    #[arg(long)]
    pub token_id: Option<String>,
}

#[derive(Parser, Debug)]
pub struct MintArgs {
    /// Token contract to credit. Omit to credit the native currency.
    #[arg(long, short = 'a')]
    pub address: Option<String>,

    /// Decimal amount in the token's units.
    #[arg(long)]
    pub amount: String,

    /// Name used when the contract has to be deployed first.
    #[arg(long, default_value = "Test Token")]
    pub name: String,

    /// Symbol used when the contract has to be deployed first.
    #[arg(long, default_value = "TEST")]
    pub symbol: String,

    /// Decimals used when the contract has to be deployed first.
    #[arg(long, default_value_t = 18)]
    pub decimals: u8,
}

#[derive(Parser, Debug)]
pub struct TransferArgs {
    /// Token contract. Omit to send the native currency.
    #[arg(long, short = 'a')]
    pub address: Option<String>,

    /// Recipient address.
    #[arg(long)]
    pub to: String,

    /// Decimal amount in the token's units.
    #[arg(long)]
    pub amount: String,
}
