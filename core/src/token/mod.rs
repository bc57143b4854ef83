//! # Token Module - Descriptors, Registry & Import
//!
//! ```text
//! descriptor.rs - TokenKind, TokenIdentity, TokenDescriptor, ResolvableToken
//! registry.rs   - persisted, deduplicated list of tracked tokens
//! import.rs     - validate → dedup → fetch metadata → add
//! units.rs      - base-unit ⇄ decimal string conversions
//! ```
//!
//! Identity is the composite `(contract_address, token_id)`. Everything
//! that compares tokens compares identities, never names or symbols.

pub mod descriptor;
pub mod import;
pub mod registry;
pub mod units;

pub use descriptor::{
    normalize_address, validate_decimals, validate_token_id, ResolvableToken, TokenDescriptor,
    TokenIdentity, TokenKind, ValidationError,
};
pub use import::{import_nft, import_token, ImportError, ImportOverrides};
pub use registry::{BalanceCache, RegistryEntry, RegistryError, TokenRegistry};
pub use units::{format_units, parse_units, UnitsError};
