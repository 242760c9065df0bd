//! TierIO Core - the per-node metadata and data-placement engine
//!
//! This crate implements the buffering cache's core:
//! - lane-sharded tag and blob metadata with cooperative locking
//! - the request router directing operations to the lane owning each key
//! - the blob put/get pipeline with multi-tier allocation and spillover
//! - staging integration for external backing stores
//! - the background flush loop
//! - the access-pattern telemetry ring
//!
//! Everything hangs off one explicit [`Engine`] value:
//!
//! ```ignore
//! let engine = Engine::new(config).await?;
//! engine.spawn_flush_loop();
//! let tag = engine
//!     .get_or_create_tag("dataset", true, 0, TagFlags::empty(), "")
//!     .await?;
//! let put = engine
//!     .put_blob(tag, Some("page0"), None, 0, payload, 1.0, BlobFlags::empty())
//!     .await?;
//! ```

pub mod blob;
pub mod engine;
pub mod flush;
pub mod iolog;
pub(crate) mod lane;
pub mod router;
pub mod staging;
pub mod tag;

pub use blob::{GetOutcome, PutOutcome};
pub use engine::Engine;
pub use flush::flush_loop;
pub use iolog::AccessPatternLog;
pub use router::{DomainQuery, Router};

// Re-export the types callers need to drive the engine.
pub use tierio_common::{
    BlobFlags, BlobId, BlobMetadata, BufferInfo, DestroyFlags, EngineConfig, Error, IoStat, IoType,
    PlacementConfig, PlacementPolicyKind, Result, TagFlags, TagId, TagMetadata, TargetConfig,
    TargetId, TargetKind, TargetMetadata, TargetStats, UpdateSizeMode,
};
pub use tierio_stage::{Stager, StagerSpec};
pub use tierio_target::Target;
