//! # Keys Module - AES Key Lifecycle
//!
//! Encrypted balances can only be read with the user's AES key, which lives
//! in the wallet extension. This module models that key from the outside:
//!
//! ```text
//! Absent ──request()/onboard()──▶ Requesting ──ok──▶ Available(key)
//!    ▲                                 │
//!    │                                 └──err──▶ Error(reason)
//!    └───────────── forget() ─────────────────────────┘
//! ```
//!
//! [`KeyState`] values are plain data and are passed explicitly into the
//! balance resolver. The [`KeyProvisioner`] is the single writer and
//! publishes every transition on a `tokio::sync::watch` channel.

pub mod provisioner;

pub use provisioner::{AesKey, KeyError, KeyFingerprint, KeyProvisioner, KeySource, KeyState};
