// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Coffer - Core Library
//!
//! Coffer keeps track of the tokens a wallet user cares about and shows
//! their balances, even when those balances live on chain as ciphertext
//! that only the user's AES key can open.
//!
//! The hard rule is simple: decrypt as rarely as possible, and never show a
//! value decrypted under one key to someone holding another.
//!
//! ## Architecture
//!
//! - **token** - Descriptors, composite identities, the persisted registry,
//!   and the import flows.
//! - **balance** - Display values and the encrypted-balance resolver.
//! - **keys** - The AES key lifecycle, as seen from outside the wallet.
//! - **ledger** - The contract-call collaborator and a local sled-backed
//!   implementation.
//! - **storage** - Where the token list is persisted.
//! - **transfer** - Validated, never-retried transfers.
//! - **portfolio** - All of the above wired together.
//! - **crypto** - AES-256-GCM and hashing helpers.
//! - **config** - Constants and tunables.
//!
//! ## Ground Rules
//!
//! 1. The registry writes to storage first and updates memory second.
//! 2. One decrypt per token per key. Everyone else joins or hits the cache.
//! 3. Errors in one token's balance never stop another's from rendering.
//! 4. NFTs never reach the resolver; the type system sees to that.

pub mod balance;
pub mod config;
pub mod crypto;
pub mod keys;
pub mod ledger;
pub mod portfolio;
pub mod storage;
pub mod token;
pub mod transfer;
