//! Cache-approval policy voters and their aggregating chain.
//!
//! A voter sees the raw query text and its parameters and votes on whether
//! the result may be cached. Voters stay independent of each other; the
//! chain combines them with a short-circuiting AND. Decisions are computed
//! fresh on every call and never cached.

use mica_core::SqlValue;
use std::sync::Arc;

/// One cache-approval voter.
pub trait CachePolicy: Send + Sync {
    /// Whether the result of `(sql, params)` may be cached.
    fn approves(&self, sql: &str, params: &[SqlValue]) -> bool;
}

/// Closures are voters too: `|sql, _| !sql.contains("RAND()")`.
impl<F> CachePolicy for F
where
    F: Fn(&str, &[SqlValue]) -> bool + Send + Sync,
{
    fn approves(&self, sql: &str, params: &[SqlValue]) -> bool {
        self(sql, params)
    }
}

/// The default voter: approves every query.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproveAll;

impl CachePolicy for ApproveAll {
    fn approves(&self, _sql: &str, _params: &[SqlValue]) -> bool {
        true
    }
}

/// Ordered collection of voters combined with a short-circuiting AND.
///
/// The empty chain approves everything: caching is permitted by default and
/// voters only ever take queries out. A chain is itself a [`CachePolicy`],
/// so chains nest.
#[derive(Clone, Default)]
pub struct PolicyChain {
    voters: Vec<Arc<dyn CachePolicy>>,
}

impl PolicyChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a voter. Evaluation order is registration order.
    pub fn push(&mut self, voter: Arc<dyn CachePolicy>) {
        self.voters.push(voter);
    }

    pub fn with_voter(mut self, voter: Arc<dyn CachePolicy>) -> Self {
        self.push(voter);
        self
    }

    pub fn len(&self) -> usize {
        self.voters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voters.is_empty()
    }
}

impl CachePolicy for PolicyChain {
    fn approves(&self, sql: &str, params: &[SqlValue]) -> bool {
        self.voters.iter().all(|voter| voter.approves(sql, params))
    }
}

impl std::fmt::Debug for PolicyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyChain")
            .field("voters", &self.voters.len())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
