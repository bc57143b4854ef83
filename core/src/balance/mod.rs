//! # Balance Module - Display Values & Encrypted-Balance Resolution
//!
//! ```text
//! view.rs     - BalanceView, display text, row sorting
//! resolver.rs - per-token cache keyed by key fingerprint, in-flight joins
//! ```
//!
//! The resolver decides what to show for a token given the current
//! [`KeyState`](crate::keys::KeyState): the native balance as reported, a
//! placeholder when no key is available, or the decrypted value. A decrypt
//! runs at most once per token per key; everything else is served from the
//! cache or joins the call already in flight.

pub mod resolver;
pub mod view;

pub use resolver::{BalanceResolver, BalanceUpdate};
pub use view::{sort_rows, truncate_balance, BalanceView, ResolveError, SortOrder, TokenRow};
