//! # Shared Token Agent Library
//!
//! Keeps short-lived access tokens shared by many anonymous visitors: one token per
//! token type, refreshed single-flight in the background, backed up to disk and
//! restored on start.
//!
//! Modules:
//! - `config` — service configuration, loading and validation
//! - `cache` — token records, the token store and the visitor ledger
//! - `registry` — refresh coordination, visitor bookkeeping, per-visitor facade
//! - `persistence` — backup file format, snapshot and restore
//! - `scheduler` — periodic backup and inactive visitor cleanup
//! - `sources` — HTTP and simulated auth servers
//! - `parser` — parsing auth server responses into tokens

pub mod cache;
pub mod config;
pub mod helpers;
pub mod observability;
pub mod parser;
pub mod persistence;
pub mod registry;
pub mod resilience;
pub mod scheduler;
pub mod server;
pub mod sources;
pub mod tests;
pub mod utils;

pub use crate::config::sources::*;
pub use crate::registry::{RegistrySettings, TokenContext, TokenRegistry};
