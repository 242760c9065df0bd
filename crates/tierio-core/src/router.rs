//! Request router
//!
//! Every operation carries a [`DomainQuery`] that either names a lane or
//! says "route me". Resolution happens at scheduling time: a `Direct` query
//! is taken as-is and never re-routed; a `Route` query runs locally when the
//! scheduled lane already caches the entry (the lane owner predicates), and
//! is otherwise rewritten to the lane owning the routing hash and marked
//! direct.
//!
//! Write routes use the same hash as read routes, so the creator of a blob
//! is also its reader. The hash is seeded with fixed keys and stable for
//! the lifetime of a deployment; rehashing is out of scope.

use ahash::RandomState;
use std::hash::BuildHasher;
use tierio_common::{BlobId, TagId};

/// Fixed hash seeds; routing must agree across restarts.
const SEEDS: [u64; 4] = [
    0x9e37_79b9_7f4a_7c15,
    0x2545_f491_4f6c_dd1d,
    0x1234_5678_9abc_def0,
    0x0fed_cba9_8765_4321,
];

/// Where an operation should run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DomainQuery {
    /// Resolve the owning lane from the routing key
    #[default]
    Route,
    /// Run on this lane; never re-routed
    Direct {
        /// Lane index
        lane: usize,
    },
}

impl DomainQuery {
    /// Whether this query bypasses routing
    #[must_use]
    pub const fn is_direct(&self) -> bool {
        matches!(self, Self::Direct { .. })
    }
}

/// Stable routing-hash helper for a fixed lane count
pub struct Router {
    lane_count: usize,
    state: RandomState,
}

impl Router {
    /// Create a router over `lane_count` lanes
    #[must_use]
    pub fn new(lane_count: usize) -> Self {
        assert!(lane_count > 0, "lane_count must be non-zero");
        Self {
            lane_count,
            state: RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]),
        }
    }

    /// Number of lanes
    #[must_use]
    pub fn lane_count(&self) -> usize {
        self.lane_count
    }

    /// Lane owning a routing hash
    #[must_use]
    pub fn lane_of(&self, hash: u32) -> usize {
        hash as usize % self.lane_count
    }

    /// Routing hash of a tag name
    #[must_use]
    pub fn hash_tag_name(&self, name: &str) -> u32 {
        self.state.hash_one(name) as u32
    }

    /// Routing hash of a blob name qualified by its tag
    #[must_use]
    pub fn hash_blob_name(&self, tag_id: &TagId, name: &str) -> u32 {
        self.state.hash_one((tag_id.node_id, tag_id.hash, tag_id.unique, name)) as u32
    }

    /// Routing key for a tag operation: the name when present, else the
    /// hash embedded in the id.
    #[must_use]
    pub fn tag_route(&self, name: Option<&str>, id: &TagId) -> u32 {
        match name {
            Some(name) => self.hash_tag_name(name),
            None => id.hash,
        }
    }

    /// Routing key for a blob operation: the qualified name when present,
    /// else the name hash embedded in the blob id.
    #[must_use]
    pub fn blob_route(&self, tag_id: &TagId, name: Option<&str>, id: Option<&BlobId>) -> u32 {
        match (name, id) {
            (Some(name), _) => self.hash_blob_name(tag_id, name),
            (None, Some(id)) => id.hash,
            (None, None) => tag_id.hash,
        }
    }

    /// Resolve a query against the hashed owner lane.
    ///
    /// `cache_hit` is the owner predicate of the lane the task was
    /// scheduled on: when set, the task runs there without rewriting;
    /// otherwise the query is rewritten to `hashed` and marked direct so it
    /// is not routed again.
    #[must_use]
    pub fn resolve(&self, query: DomainQuery, hashed: usize, cache_hit: bool) -> (usize, DomainQuery) {
        match query {
            DomainQuery::Direct { lane } => (lane, query),
            DomainQuery::Route if cache_hit => (hashed, DomainQuery::Route),
            DomainQuery::Route => (hashed, DomainQuery::Direct { lane: hashed }),
        }
    }
}
