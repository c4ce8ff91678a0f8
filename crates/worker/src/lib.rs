//! Timestamp verification, path reconciliation and quota accounting.
//!
//! This crate provides the services behind `notaryd`:
//! - Per-user key pairs and timestamp tokens for stored files
//! - The verification ledger and its local status checks
//! - Path reconciliation for moves, renames, copies and deletions
//! - Quota accounting per user and storage class
//! - Gateway event dispatch, project sweeps and the institutional poller

pub mod error;
pub mod events;
pub mod keys;
pub mod ledger;
pub mod lock;
pub mod poller;
pub mod quota;
pub mod reconcile;
pub mod records;
pub mod state;
pub mod sweep;
pub mod throttle;
pub mod timestamp;

pub use error::{WorkerError, WorkerResult};
pub use events::{EventSummary, handle_event, handle_payload};
pub use ledger::{LocalCheck, classify_local};
pub use lock::{DirLock, Lease};
pub use state::AppState;
pub use sweep::{SweepStats, error_report, verify_project};
pub use throttle::Throttle;
pub use timestamp::{CheckOutcome, FileDescriptor};
