//! Inspection statuses recorded on the verification ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of the last timestamp check for a file.
///
/// Codes are persisted and shown to administrators, so every failure mode
/// keeps its own status instead of collapsing into a single error bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionStatus {
    /// Row created, no check performed yet.
    Unchecked,
    /// Token is valid for the current content.
    Success,
    /// Stored content no longer matches the token.
    Ng,
    /// File exists but has no ledger row.
    TokenMissing,
    /// File and ledger row exist, but no token was ever obtained.
    NoData,
    /// File was deleted before a ledger row existed.
    FileNotExists,
    /// File was deleted or lost after a ledger row existed.
    FileNotFound,
    /// The verification command itself failed.
    VerificationError,
    /// The storage provider is no longer attached to the project.
    StorageDisconnected,
    /// The storage provider root could not be listed.
    StorageNotAccessible,
}

impl InspectionStatus {
    /// Stored integer code.
    pub fn code(self) -> i64 {
        match self {
            Self::Unchecked => 0,
            Self::Success => 1,
            Self::Ng => 2,
            Self::TokenMissing => 3,
            Self::NoData => 4,
            Self::FileNotExists => 5,
            Self::FileNotFound => 6,
            Self::VerificationError => 7,
            Self::StorageDisconnected => 8,
            Self::StorageNotAccessible => 9,
        }
    }

    /// Parse a stored integer code.
    pub fn from_code(code: i64) -> crate::Result<Self> {
        Ok(match code {
            0 => Self::Unchecked,
            1 => Self::Success,
            2 => Self::Ng,
            3 => Self::TokenMissing,
            4 => Self::NoData,
            5 => Self::FileNotExists,
            6 => Self::FileNotFound,
            7 => Self::VerificationError,
            8 => Self::StorageDisconnected,
            9 => Self::StorageNotAccessible,
            other => return Err(crate::Error::InvalidStatus(other)),
        })
    }

    /// Human-readable label shown in reports.
    pub fn title(self) -> &'static str {
        match self {
            Self::Unchecked => "Unchecked",
            Self::Success => "OK",
            Self::Ng => "NG",
            Self::TokenMissing => "TST missing(Unverify)",
            Self::NoData => "TST missing(Retrieving Failed)",
            Self::FileNotExists => "FILE missing",
            Self::FileNotFound => "FILE missing(Unverify)",
            Self::VerificationError => "TST verification error",
            Self::StorageDisconnected => "Storage disconnected",
            Self::StorageNotAccessible => "Storage not accessible",
        }
    }

    /// Intentional absence markers. A scan that merely fails to reach a file
    /// must never overwrite these.
    pub fn is_intentional(self) -> bool {
        matches!(self, Self::FileNotExists | Self::StorageDisconnected)
    }

    /// Codes of the intentional set, for use in ledger queries.
    pub fn intentional_codes() -> [i64; 2] {
        [
            Self::FileNotExists.code(),
            Self::StorageDisconnected.code(),
        ]
    }
}

impl fmt::Display for InspectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}
