//! Terminal walkthrough of the Coffer balance lifecycle.
//!
//! Deploys two tokens on a throwaway local ledger, imports them, and shows
//! what the balance list looks like before the AES key arrives, after it
//! arrives, after a transfer, and after the key is forgotten. Output uses
//! ANSI escape codes for storytelling-style terminal rendering.
//!
//! Run with:
//!   cargo run --example demo

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use coffer_core::balance::{SortOrder, TokenRow};
use coffer_core::keys::{AesKey, KeyError, KeyProvisioner, KeySource};
use coffer_core::ledger::{LedgerClient, LocalLedger, TokenMetadata};
use coffer_core::portfolio::Portfolio;
use coffer_core::storage::MemoryTokenStore;
use coffer_core::token::{ImportOverrides, TokenRegistry};

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

const BG_BLUE: &str = "\x1b[44m";

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn banner() {
    println!();
    println!("{BG_BLUE}{BOLD}{WHITE}                                                        {RESET}");
    println!("{BG_BLUE}{BOLD}{WHITE}    COFFER  --  Encrypted Balance Walkthrough           {RESET}");
    println!("{BG_BLUE}{BOLD}{WHITE}                                                        {RESET}");
    println!();
}

fn section(num: u32, title: &str) {
    println!();
    println!("{BOLD}{CYAN}===[{YELLOW} Step {num} {CYAN}]========================================{RESET}");
    println!("{BOLD}{WHITE}  {title}{RESET}");
}

fn success(text: &str) {
    println!("{GREEN}  [OK] {text}{RESET}");
}

fn timing(label: &str, elapsed: std::time::Duration) {
    let ms = elapsed.as_secs_f64() * 1000.0;
    println!("{DIM}  [{label}: {ms:.2} ms]{RESET}");
}

fn table(rows: &[TokenRow]) {
    for row in rows {
        let symbol = row.descriptor.symbol();
        println!(
            "  {BOLD}{:<8}{RESET} {WHITE}{:>20}{RESET}",
            symbol,
            row.balance.display(Some(symbol))
        );
    }
}

// ---------------------------------------------------------------------------
// Wallet stand-in
// ---------------------------------------------------------------------------

struct DemoWallet;

#[async_trait]
impl KeySource for DemoWallet {
    async fn fetch_key(&self) -> Result<AesKey, KeyError> {
        Err(KeyError::NotOnboarded)
    }

    async fn onboard(&self) -> Result<AesKey, KeyError> {
        Ok(AesKey::new("demo-aes-key"))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    banner();

    const FOO: &str = "0x00000000000000000000000000000000000000aa";
    const BAR: &str = "0x00000000000000000000000000000000000000bb";
    const BOB: &str = "0x4444444444444444444444444444444444444444";

    section(1, "Deploy tokens on the local ledger");
    let ledger = Arc::new(LocalLedger::open_temporary()?);
    for (address, name, symbol, decimals) in [(FOO, "Foo Token", "FOO", 18), (BAR, "Bar Token", "BAR", 6)] {
        ledger.deploy_token(
            address,
            TokenMetadata {
                name: name.into(),
                symbol: symbol.into(),
                decimals,
            },
        )?;
    }
    ledger.mint(FOO, 42 * 10u128.pow(18), &AesKey::new("demo-aes-key"))?;
    ledger.mint(BAR, 1_234_567_891, &AesKey::new("demo-aes-key"))?;
    ledger.set_native_balance(10u128.pow(18))?;
    success("FOO and BAR deployed, balances sealed under the demo key");

    section(2, "Import both tokens");
    let registry = Arc::new(TokenRegistry::open(Arc::new(MemoryTokenStore::new()))?);
    let keys = Arc::new(KeyProvisioner::new(Arc::new(DemoWallet)));
    let portfolio = Portfolio::new(
        registry,
        Arc::clone(&ledger) as Arc<dyn LedgerClient>,
        Arc::clone(&keys),
    );
    portfolio.import_token(FOO, &ImportOverrides::default()).await?;
    portfolio.import_token(BAR, &ImportOverrides::default()).await?;
    table(&portfolio.rows(SortOrder::Registry).await);

    section(3, "Onboard and obtain the AES key");
    let state = keys.onboard().await;
    if let Some(fp) = state.fingerprint() {
        success(&format!("key available, fingerprint {fp}"));
    }
    let start = Instant::now();
    table(&portfolio.rows(SortOrder::DecliningBalance).await);
    timing("first resolve", start.elapsed());
    let start = Instant::now();
    portfolio.rows(SortOrder::DecliningBalance).await;
    timing("cached resolve", start.elapsed());

    section(4, "Send 2.5 FOO");
    let receipt = portfolio.transfer(Some(FOO), BOB, "2.5").await?;
    success(&format!("tx {}", receipt.tx_hash));
    table(&portfolio.rows(SortOrder::Registry).await);

    section(5, "Forget the key");
    keys.forget();
    table(&portfolio.rows(SortOrder::Registry).await);

    println!();
    Ok(())
}
