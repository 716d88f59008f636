//! # vela-core
//!
//! Core crate for the Vela trading agent, providing:
//!
//! - **Types** (`types`) — enums, market data structs, trading structs
//! - **Configuration** (`config`) — JSON config deserialization
//! - **Error types** (`error`) — domain errors and typed gateway errors via thiserror
//! - **Precision** (`precision`) — tick-size / lot-size quantization rules
//! - **Pair utilities** (`pair`) — base/quote asset ↔ symbol conversion
//! - **Deduplication** (`dedup`) — event-sequence deduplicator for push streams
//! - **Time utilities** (`time_util`) — wall-clock timestamps
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod config;
pub mod dedup;
pub mod error;
pub mod logging;
pub mod pair;
pub mod precision;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
