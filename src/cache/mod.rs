//! Write-back cache of remote objects
//!
//! Reads are served from memory. Writes mark a path dirty and are pushed to
//! the remote by [`VersionedCache::flush_one`], by the periodic
//! [`FlushTask`], or by a forced flush at shutdown.
//!
//! # Path States
//!
//! | State | Meaning |
//! |-------|---------|
//! | clean | cached value matches the last successful write or read |
//! | dirty | local changes not yet accepted by the remote |
//! | uncached | never loaded or set; `get` returns `None` |

mod flusher;
mod versioned;

pub use flusher::FlushTask;
pub use versioned::{decode_content, encode_value, FlushFailure, FlushReport, VersionedCache};
