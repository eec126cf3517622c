//! Tag-aware cache store and cache-approval policies.
//!
//! The store contract is deliberately small: get-or-compute under a key,
//! delete a key, invalidate tags. Tags are the only invalidation index the
//! caching layer relies on; which tags an entry carries is decided entirely
//! by the caller at compute time, through the [`EntrySetup`] handle passed
//! into the miss callback.
//!
//! # Single-flight
//!
//! `get_or_compute` must never run two concurrent computations for the same
//! key. Stampede protection is a store obligation, not something callers
//! re-implement; [`MemoryTagCache`] honors it with a per-key computation
//! lock.
//!
//! # Policies
//!
//! A [`PolicyChain`] aggregates independent [`CachePolicy`] voters. A query
//! is cacheable only when every voter approves; the empty chain approves
//! everything.

pub mod memory;
pub mod policy;
pub mod store;

pub use memory::{CacheStats, MemoryTagCache};
pub use policy::{ApproveAll, CachePolicy, PolicyChain};
pub use store::{EntrySetup, TagAwareCache};
