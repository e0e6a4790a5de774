//! Per-repository persistent cache with compression and expiry.
//!
//! Each repository gets its own store, named after a sanitized
//! `owner/name` namespace, so eviction and storage accounting stay scoped
//! per project. Values are gzip-compressed JSON envelopes carrying the
//! time they were written; reads past the kind-specific TTL, or reads of
//! anything malformed, resolve to a miss and force a fresh upstream fetch.

mod codec;
pub mod keys;
mod store;

pub use codec::{decode, encode};
pub use store::{CacheStore, ConfiguredStore, MemoryStore, SqliteStore, TtlConfig};
