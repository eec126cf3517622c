//! mica core - shared value model and foundations
//!
//! Types every other mica crate builds on: the SQL scalar and row
//! representation, the error taxonomy, and the cache configuration object.
//! This crate contains no caching logic of its own.

use sha2::{Digest, Sha256};

pub mod config;
pub mod error;
pub mod tag;
pub mod value;

pub use config::{CacheConfig, DEFAULT_TTL_SECS};
pub use error::{CacheStoreError, ConfigError, ConnectionError, MicaError, MicaResult};
pub use tag::{is_real_table, row_tag, sanitize_tag};
pub use value::{Row, SqlValue};

// ============================================================================
// CONTENT HASHING
// ============================================================================

/// SHA-256 content hash, the fixed-width digest behind cache keys.
pub type ContentHash = [u8; 32];

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

// ============================================================================
// TESTS
// ============================================================================
