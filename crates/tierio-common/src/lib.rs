//! TierIO Common - Shared types and utilities
//!
//! This crate provides the identifier types, flag sets, error definitions,
//! and configuration structures used across all TierIO components.

pub mod config;
pub mod error;
pub mod types;

pub use config::{EngineConfig, PlacementConfig, PlacementPolicyKind, TargetConfig, TargetKind};
pub use error::{Error, Result};
pub use types::*;
