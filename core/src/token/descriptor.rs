//! # Token Descriptors & Identity
//!
//! A [`TokenDescriptor`] names one trackable asset: the native currency, an
//! encrypted-balance fungible token, or a single NFT. Its [`TokenIdentity`]
//! is the composite `(contract_address, token_id)` pair, with an empty
//! `token_id` for everything that is not an NFT and both parts empty for the
//! native sentinel. Two different token ids of the same NFT contract are two
//! different identities.
//!
//! Addresses are validated and lowercased on the way in, so identity
//! comparison is effectively case-insensitive.
//!
//! NFTs never have a balance. That rule is carried by the type system:
//! only a [`ResolvableToken`] can be handed to the balance resolver, and one
//! can only be built from a native or fungible descriptor.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::{
    ADDRESS_HEX_LENGTH, ADDRESS_PREFIX, MAX_TOKEN_DECIMALS, NATIVE_TOKEN_DECIMALS,
    NATIVE_TOKEN_NAME, NATIVE_TOKEN_SYMBOL, NFT_SYMBOL,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Rejected descriptor input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid token id: {0:?} (expected a decimal number)")]
    InvalidTokenId(String),

    #[error("token {0} is an NFT and has no balance")]
    NotResolvable(TokenIdentity),

    #[error("{0} decimals is more than the supported {MAX_TOKEN_DECIMALS}")]
    DecimalsOutOfRange(u8),
}

/// Validate an address (`0x` + 40 hex digits) and return its lowercase form.
pub fn normalize_address(address: &str) -> Result<String, ValidationError> {
    let trimmed = address.trim();
    let digits = trimmed
        .strip_prefix(ADDRESS_PREFIX)
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| ValidationError::InvalidAddress(address.to_string()))?;

    if digits.len() != ADDRESS_HEX_LENGTH || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidAddress(address.to_string()));
    }

    Ok(format!("{ADDRESS_PREFIX}{}", digits.to_ascii_lowercase()))
}

/// Check that base units with `decimals` places fit the `u128` arithmetic.
pub fn validate_decimals(decimals: u8) -> Result<u8, ValidationError> {
    if decimals > MAX_TOKEN_DECIMALS {
        return Err(ValidationError::DecimalsOutOfRange(decimals));
    }
    Ok(decimals)
}

/// Validate an NFT token id: a non-empty run of decimal digits.
pub fn validate_token_id(token_id: &str) -> Result<String, ValidationError> {
    let trimmed = token_id.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidTokenId(token_id.to_string()));
    }
    Ok(trimmed.to_string())
}

// ---------------------------------------------------------------------------
// TokenKind
// ---------------------------------------------------------------------------

/// What sort of asset a descriptor names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    /// The chain's base currency. Balance supplied by the ledger in plain.
    Native,
    /// ERC-20 style token with an encrypted on-chain balance.
    Fungible,
    /// One non-fungible token (contract + token id). Existence only.
    Nft,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Native => write!(f, "native"),
            TokenKind::Fungible => write!(f, "fungible"),
            TokenKind::Nft => write!(f, "nft"),
        }
    }
}

// ---------------------------------------------------------------------------
// TokenIdentity
// ---------------------------------------------------------------------------

/// Composite identity of a tracked asset.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenIdentity {
    contract_address: String,
    token_id: String,
}

impl TokenIdentity {
    /// The native-token sentinel: empty address, empty token id.
    pub fn native() -> Self {
        Self {
            contract_address: String::new(),
            token_id: String::new(),
        }
    }

    /// Identity of a fungible token at `address`.
    pub fn fungible(address: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            contract_address: normalize_address(address)?,
            token_id: String::new(),
        })
    }

    /// Identity of token `token_id` within NFT contract `address`.
    pub fn nft(address: &str, token_id: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            contract_address: normalize_address(address)?,
            token_id: validate_token_id(token_id)?,
        })
    }

    /// Build an identity from an address and an optional token id, the
    /// shape user input arrives in.
    pub fn parse(address: &str, token_id: Option<&str>) -> Result<Self, ValidationError> {
        match token_id {
            Some(id) => Self::nft(address, id),
            None => Self::fungible(address),
        }
    }

    pub fn contract_address(&self) -> &str {
        &self.contract_address
    }

    /// Token id, or `""` for anything that is not an NFT.
    pub fn token_id(&self) -> &str {
        &self.token_id
    }

    pub fn is_native(&self) -> bool {
        self.contract_address.is_empty()
    }
}

impl fmt::Display for TokenIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.contract_address.is_empty(), self.token_id.is_empty()) {
            (true, _) => write!(f, "native"),
            (false, true) => write!(f, "{}", self.contract_address),
            (false, false) => write!(f, "{}-{}", self.contract_address, self.token_id),
        }
    }
}

// ---------------------------------------------------------------------------
// TokenDescriptor
// ---------------------------------------------------------------------------

/// Everything Coffer knows about one trackable asset.
///
/// Constructed only through [`TokenDescriptor::native`],
/// [`TokenDescriptor::fungible`] and [`TokenDescriptor::nft`], which keep
/// `kind`, `token_id` and `decimals` consistent with one another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    kind: TokenKind,
    identity: TokenIdentity,
    name: String,
    symbol: String,
    decimals: u8,
}

impl TokenDescriptor {
    /// The chain's base currency.
    pub fn native() -> Self {
        Self {
            kind: TokenKind::Native,
            identity: TokenIdentity::native(),
            name: NATIVE_TOKEN_NAME.to_string(),
            symbol: NATIVE_TOKEN_SYMBOL.to_string(),
            decimals: NATIVE_TOKEN_DECIMALS,
        }
    }

    /// A fungible token with an encrypted balance. Rejects decimals above
    /// [`MAX_TOKEN_DECIMALS`].
    pub fn fungible(
        address: &str,
        name: &str,
        symbol: &str,
        decimals: u8,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            kind: TokenKind::Fungible,
            identity: TokenIdentity::fungible(address)?,
            name: name.to_string(),
            symbol: symbol.to_string(),
            decimals: validate_decimals(decimals)?,
        })
    }

    /// A single NFT. Decimals are always zero and the symbol is fixed.
    pub fn nft(address: &str, token_id: &str, name: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            kind: TokenKind::Nft,
            identity: TokenIdentity::nft(address, token_id)?,
            name: name.to_string(),
            symbol: NFT_SYMBOL.to_string(),
            decimals: 0,
        })
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn identity(&self) -> &TokenIdentity {
        &self.identity
    }

    pub fn contract_address(&self) -> &str {
        self.identity.contract_address()
    }

    /// Token id for NFTs, `None` otherwise.
    pub fn token_id(&self) -> Option<&str> {
        match self.kind {
            TokenKind::Nft => Some(self.identity.token_id()),
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Returns a copy with the display fields replaced wholesale.
    pub fn with_display(&self, name: &str, symbol: &str) -> Self {
        Self {
            name: name.to_string(),
            symbol: symbol.to_string(),
            ..self.clone()
        }
    }

    /// The balance-bearing view of this descriptor, or `None` for NFTs.
    pub fn resolvable(&self) -> Option<ResolvableToken> {
        ResolvableToken::try_from(self.clone()).ok()
    }
}

// ---------------------------------------------------------------------------
// ResolvableToken
// ---------------------------------------------------------------------------

/// A descriptor whose kind is `Native` or `Fungible`. The only thing the
/// balance resolver accepts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvableToken(TokenDescriptor);

impl ResolvableToken {
    pub fn native() -> Self {
        Self(TokenDescriptor::native())
    }

    pub fn descriptor(&self) -> &TokenDescriptor {
        &self.0
    }

    pub fn identity(&self) -> &TokenIdentity {
        self.0.identity()
    }

    pub fn is_native(&self) -> bool {
        self.0.kind == TokenKind::Native
    }

    pub fn into_descriptor(self) -> TokenDescriptor {
        self.0
    }
}

impl TryFrom<TokenDescriptor> for ResolvableToken {
    type Error = ValidationError;

    fn try_from(descriptor: TokenDescriptor) -> Result<Self, Self::Error> {
        match descriptor.kind {
            TokenKind::Nft => Err(ValidationError::NotResolvable(descriptor.identity)),
            TokenKind::Native | TokenKind::Fungible => Ok(Self(descriptor)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0x00000000000000000000000000000000000000AA";

    #[test]
    fn normalize_lowercases_and_validates() {
        assert_eq!(
            normalize_address(ADDR).unwrap(),
            "0x00000000000000000000000000000000000000aa"
        );
        assert!(normalize_address("0xAA").is_err());
        assert!(normalize_address("00000000000000000000000000000000000000aa").is_err());
        assert!(normalize_address("0x00000000000000000000000000000000000000zz").is_err());
    }

    #[test]
    fn token_id_must_be_decimal() {
        assert_eq!(validate_token_id(" 17 ").unwrap(), "17");
        assert!(validate_token_id("").is_err());
        assert!(validate_token_id("0x11").is_err());
        assert!(validate_token_id("-1").is_err());
    }

    #[test]
    fn identity_is_case_insensitive() {
        let upper = TokenIdentity::fungible(ADDR).unwrap();
        let lower = TokenIdentity::fungible(&ADDR.to_lowercase()).unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn nft_identity_is_composite() {
        let a = TokenIdentity::nft(ADDR, "1").unwrap();
        let b = TokenIdentity::nft(ADDR, "2").unwrap();
        let contract = TokenIdentity::fungible(ADDR).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, contract);
        assert_eq!(a.to_string(), "0x00000000000000000000000000000000000000aa-1");
    }

    #[test]
    fn native_sentinel() {
        let native = TokenDescriptor::native();
        assert!(native.identity().is_native());
        assert_eq!(native.contract_address(), "");
        assert_eq!(native.token_id(), None);
        assert_eq!(native.identity().to_string(), "native");
    }

    #[test]
    fn nft_has_zero_decimals_and_is_not_resolvable() {
        let nft = TokenDescriptor::nft(ADDR, "9", "Punks").unwrap();
        assert_eq!(nft.decimals(), 0);
        assert_eq!(nft.symbol(), NFT_SYMBOL);
        assert_eq!(nft.token_id(), Some("9"));
        assert!(nft.resolvable().is_none());
        assert!(matches!(
            ResolvableToken::try_from(nft),
            Err(ValidationError::NotResolvable(_))
        ));
    }

    #[test]
    fn fungible_decimals_are_bounded() {
        assert!(TokenDescriptor::fungible(ADDR, "Foo", "FOO", MAX_TOKEN_DECIMALS).is_ok());
        assert_eq!(
            TokenDescriptor::fungible(ADDR, "Foo", "FOO", 39).unwrap_err(),
            ValidationError::DecimalsOutOfRange(39)
        );
    }

    #[test]
    fn fungible_is_resolvable() {
        let foo = TokenDescriptor::fungible(ADDR, "Foo", "FOO", 18).unwrap();
        let resolvable = foo.resolvable().unwrap();
        assert!(!resolvable.is_native());
        assert_eq!(resolvable.descriptor(), &foo);
    }

    #[test]
    fn with_display_replaces_only_display_fields() {
        let foo = TokenDescriptor::fungible(ADDR, "Foo", "FOO", 18).unwrap();
        let renamed = foo.with_display("Foo v2", "FOO2");
        assert_eq!(renamed.identity(), foo.identity());
        assert_eq!(renamed.decimals(), 18);
        assert_eq!(renamed.name(), "Foo v2");
        assert_eq!(renamed.symbol(), "FOO2");
    }

    #[test]
    fn descriptor_serialization_roundtrip() {
        let nft = TokenDescriptor::nft(ADDR, "3", "Art").unwrap();
        let json = serde_json::to_string(&nft).expect("serialize");
        let recovered: TokenDescriptor = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(nft, recovered);
    }
}
