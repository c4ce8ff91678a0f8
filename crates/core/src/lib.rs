//! Core domain types and shared logic for the notary timestamp and quota core.
//!
//! This crate defines the vocabulary used across all other crates:
//! - Storage providers and the quota class they charge
//! - Inspection statuses of the verification ledger
//! - Path normalization and prefix matching
//! - Storage gateway event payloads
//! - Size formatting for quota display

pub mod config;
pub mod error;
pub mod event;
pub mod path;
pub mod provider;
pub mod size;
pub mod status;

pub use error::{Error, Result};
pub use event::{EventAction, EventPayload, FileEvent, FileKind, FileMetadata, MoveEndpoint};
pub use provider::{Provider, StorageType};
pub use size::{abbreviate_size, format_size};
pub use status::InspectionStatus;

/// Name of the primary storage provider.
pub const PRIMARY_PROVIDER: &str = "osfstorage";

/// Region assigned when a user has no affiliated institution with its own region.
pub const DEFAULT_REGION_ID: &str = "us";

/// Divisor used when abbreviating byte counts.
pub const BASE_FOR_METRIC_PREFIX: u64 = 1024;

/// Default per-user quota: 100 GiB.
pub const DEFAULT_MAX_QUOTA_GB: u64 = 100;
