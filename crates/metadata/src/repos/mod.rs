//! Repository traits for metadata operations.

pub mod files;
pub mod keys;
pub mod poll_state;
pub mod projects;
pub mod quota;
pub mod verifications;

pub use files::FileRecordRepo;
pub use keys::KeyRepo;
pub use poll_state::PollStateRepo;
pub use projects::ProjectRepo;
pub use quota::QuotaRepo;
pub use verifications::VerificationRepo;
