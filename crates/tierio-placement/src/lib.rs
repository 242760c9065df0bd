//! TierIO Placement - the data placement engine (DPE)
//!
//! Given a list of byte sizes to place, a snapshot of the buffering targets,
//! and a placement context, the DPE produces one *placement schema* per size:
//! an ordered list of per-target sub-allocations summing to the request.
//!
//! The ordering is the contract: when the engine's allocation loop comes up
//! short on sub-placement *i*, the remainder spills into sub-placement
//! *i + 1*. The DPE itself never appends the fallback target; the engine does
//! that so placement stays a pure function of the snapshot.

pub mod minimize;
pub mod policy;
pub mod rotate;
pub mod schema;

pub use minimize::MinimizeIoTime;
pub use policy::{policy_for, PlacementContext, PlacementPolicy};
pub use rotate::{Random, RoundRobin};
pub use schema::{PlacementSchema, SubPlacement, TargetSnapshot};
