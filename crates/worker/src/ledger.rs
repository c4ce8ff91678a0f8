//! Local ledger checks that decide a file's status without touching its content.

use notary_core::{InspectionStatus, Provider};
use notary_metadata::models::{FileRecordRow, VerificationResultRow};

/// What the local state alone says about a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalCheck {
    /// The status is settled; no token verification is needed.
    Conclusive(InspectionStatus),
    /// The file is live and has a token that must be verified.
    NeedsVerification,
}

/// Classify a file from its cached record and ledger row.
///
/// | record            | ledger row             | result                         |
/// |-------------------|------------------------|--------------------------------|
/// | missing / trashed | none                   | FILE_NOT_EXISTS                |
/// | missing / trashed | any                    | kept if intentional, else FILE_NOT_FOUND |
/// | live              | none                   | TST missing                    |
/// | live              | no token               | no data                        |
/// | live, addon       | NG                     | NG (sticky)                    |
/// | live              | token                  | verify                         |
pub fn classify_local(
    record: Option<&FileRecordRow>,
    result: Option<&VerificationResultRow>,
    provider: &Provider,
) -> LocalCheck {
    let live = record.is_some_and(|r| !r.is_trashed());

    let Some(row) = result else {
        return LocalCheck::Conclusive(if live {
            InspectionStatus::TokenMissing
        } else {
            InspectionStatus::FileNotExists
        });
    };

    if !live {
        let current = row.status();
        return LocalCheck::Conclusive(if current.is_intentional() {
            current
        } else {
            InspectionStatus::FileNotFound
        });
    }

    if row.timestamp_token.is_none() {
        return LocalCheck::Conclusive(InspectionStatus::NoData);
    }

    // An addon file that once failed stays failed until it is re-stamped.
    if !provider.is_primary() && row.status() == InspectionStatus::Ng {
        return LocalCheck::Conclusive(InspectionStatus::Ng);
    }

    LocalCheck::NeedsVerification
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn record(trashed: bool) -> FileRecordRow {
        let now = OffsetDateTime::now_utc();
        FileRecordRow {
            file_id: Uuid::new_v4(),
            project_id: "abc12".to_string(),
            provider: "osfstorage".to_string(),
            kind: "file".to_string(),
            name: "b.txt".to_string(),
            provider_path: "/5f1a".to_string(),
            materialized_path: "/a/b.txt".to_string(),
            parent_id: None,
            size: Some(3),
            version: None,
            file_created_at: None,
            file_modified_at: None,
            trashed_at: trashed.then_some(now),
            created_at: now,
            updated_at: now,
        }
    }

    fn row(status: InspectionStatus, token: bool) -> VerificationResultRow {
        let mut row = VerificationResultRow::new(
            Uuid::new_v4(),
            "abc12",
            &Provider::OsfStorage,
            "/a/b.txt",
            status,
        );
        if token {
            row.timestamp_token = Some(b"token".to_vec());
        }
        row
    }

    #[test]
    fn test_missing_file_without_row() {
        assert_eq!(
            classify_local(None, None, &Provider::OsfStorage),
            LocalCheck::Conclusive(InspectionStatus::FileNotExists)
        );
        let trashed = record(true);
        assert_eq!(
            classify_local(Some(&trashed), None, &Provider::OsfStorage),
            LocalCheck::Conclusive(InspectionStatus::FileNotExists)
        );
    }

    #[test]
    fn test_missing_file_with_row() {
        let trashed = record(true);
        let success = row(InspectionStatus::Success, true);
        assert_eq!(
            classify_local(Some(&trashed), Some(&success), &Provider::OsfStorage),
            LocalCheck::Conclusive(InspectionStatus::FileNotFound)
        );

        for intentional in [
            InspectionStatus::FileNotExists,
            InspectionStatus::StorageDisconnected,
        ] {
            let kept = row(intentional, true);
            assert_eq!(
                classify_local(None, Some(&kept), &Provider::OsfStorage),
                LocalCheck::Conclusive(intentional)
            );
        }
    }

    #[test]
    fn test_live_file_states() {
        let live = record(false);
        assert_eq!(
            classify_local(Some(&live), None, &Provider::OsfStorage),
            LocalCheck::Conclusive(InspectionStatus::TokenMissing)
        );
        let no_token = row(InspectionStatus::Unchecked, false);
        assert_eq!(
            classify_local(Some(&live), Some(&no_token), &Provider::OsfStorage),
            LocalCheck::Conclusive(InspectionStatus::NoData)
        );
        let stamped = row(InspectionStatus::Success, true);
        assert_eq!(
            classify_local(Some(&live), Some(&stamped), &Provider::OsfStorage),
            LocalCheck::NeedsVerification
        );
    }

    #[test]
    fn test_ng_is_sticky_only_for_addons() {
        let live = record(false);
        let ng = row(InspectionStatus::Ng, true);
        assert_eq!(
            classify_local(Some(&live), Some(&ng), &Provider::NextcloudInstitutions),
            LocalCheck::Conclusive(InspectionStatus::Ng)
        );
        assert_eq!(
            classify_local(Some(&live), Some(&ng), &Provider::OsfStorage),
            LocalCheck::NeedsVerification
        );
    }
}
