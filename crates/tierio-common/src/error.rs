//! Error types for TierIO
//!
//! Missing tags and blobs are not errors: lookups return null ids or empty
//! values and data operations report short byte counts. The variants here
//! cover the failures that cannot be expressed that way.

use crate::types::{TagId, TargetId};
use thiserror::Error;

/// Common result type for TierIO operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for TierIO
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no target had capacity for the request")]
    AllocationFailure,

    #[error("no healthy target available for placement")]
    NoTargetsAvailable,

    #[error("target {target} unavailable: {reason}")]
    TargetUnavailable { target: TargetId, reason: String },

    #[error("no stager registered for tag {tag_id}")]
    StagerMissing { tag_id: TagId },

    #[error("stager operation failed: {0}")]
    Stager(String),

    #[error("invalid stager parameters: {0}")]
    InvalidStagerParams(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether the operation may succeed if retried later
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::AllocationFailure | Self::NoTargetsAvailable | Self::TargetUnavailable { .. }
        )
    }
}
