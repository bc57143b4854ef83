//! What a balance looks like on screen.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{ENCRYPTED_PLACEHOLDER, FAILED_TEXT, LOADING_TEXT, MAX_BALANCE_DISPLAY_LENGTH};
use crate::token::TokenDescriptor;

/// Why a balance could not be produced. Carried inside
/// [`BalanceView::Failed`], never returned as an `Err`.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolveError {
    #[error("decrypt failed: {0}")]
    DecryptFailed(String),

    #[error("token metadata unavailable: {0}")]
    MetadataFetchFailed(String),

    #[error("native balance unavailable: {0}")]
    BalanceFetchFailed(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum BalanceView {
    /// Native balance, straight from the ledger.
    Plain(String),
    /// No key available; the balance stays hidden.
    Encrypted,
    /// A decrypt for this token is outstanding.
    Loading,
    /// Decrypted balance.
    Value(String),
    Failed(ResolveError),
}

impl BalanceView {
    /// The amount, for views that carry one.
    pub fn amount(&self) -> Option<&str> {
        match self {
            BalanceView::Plain(v) | BalanceView::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Full display text, without truncation.
    pub fn text(&self) -> String {
        match self {
            BalanceView::Plain(v) | BalanceView::Value(v) => zero_if_blank(v).to_string(),
            BalanceView::Encrypted => ENCRYPTED_PLACEHOLDER.to_string(),
            BalanceView::Loading => LOADING_TEXT.to_string(),
            BalanceView::Failed(_) => FAILED_TEXT.to_string(),
        }
    }

    /// List-view text: amounts are truncated and suffixed with `symbol`.
    pub fn display(&self, symbol: Option<&str>) -> String {
        match (self.amount(), symbol) {
            (Some(v), Some(sym)) => format!("{} {sym}", truncate_balance(zero_if_blank(v))),
            (Some(v), None) => truncate_balance(zero_if_blank(v)),
            (None, _) => self.text(),
        }
    }

    /// Numeric value used for ordering. Anything without an amount counts
    /// as zero.
    fn sort_key(&self) -> f64 {
        self.amount()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .unwrap_or(0.0)
    }
}

impl fmt::Display for BalanceView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

fn zero_if_blank(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "0" {
        "0"
    } else {
        trimmed
    }
}

/// Cut `value` to the display width, marking the cut with `...`.
pub fn truncate_balance(value: &str) -> String {
    if value.chars().count() <= MAX_BALANCE_DISPLAY_LENGTH {
        return value.to_string();
    }
    let cut: String = value.chars().take(MAX_BALANCE_DISPLAY_LENGTH).collect();
    format!("{cut}...")
}

// ---------------------------------------------------------------------------
// Rows & sorting
// ---------------------------------------------------------------------------

/// One line of the token list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRow {
    pub descriptor: TokenDescriptor,
    pub balance: BalanceView,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Registry order, native first.
    #[default]
    Registry,
    /// A to Z by name, case-insensitive.
    Alphabetical,
    /// Largest balance first.
    DecliningBalance,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "registry" | "none" => Ok(SortOrder::Registry),
            "az" | "a-z" | "name" => Ok(SortOrder::Alphabetical),
            "balance" | "desc" => Ok(SortOrder::DecliningBalance),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

/// Stable sort; ties keep registry order.
pub fn sort_rows(rows: &mut [TokenRow], order: SortOrder) {
    match order {
        SortOrder::Registry => {}
        SortOrder::Alphabetical => rows.sort_by(|a, b| {
            a.descriptor
                .name()
                .to_lowercase()
                .cmp(&b.descriptor.name().to_lowercase())
        }),
        SortOrder::DecliningBalance => rows.sort_by(|a, b| {
            b.balance
                .sort_key()
                .partial_cmp(&a.balance.sort_key())
                .unwrap_or(Ordering::Equal)
        }),
    }
}
