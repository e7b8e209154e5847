//! gitvault - durable key/value storage on a Git content API
//!
//! Keeps JSON documents in a GitHub repository behind an in-memory
//! write-back cache, with optimistic concurrency, retry and rate-limit
//! handling, and chunking for values too large for a single file.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod large;
pub mod remote;
pub mod store;
pub mod vault;

pub use error::{VaultError, VaultResult};
pub use vault::Vault;
