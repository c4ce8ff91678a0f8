//! Per-user key pairs.
//!
//! Each user owns exactly one private/public key file pair, created the first
//! time a token is requested on their behalf. The metadata store only records
//! the file names; the files live under `timestamp.key_dir`.

use crate::error::{WorkerError, WorkerResult};
use crate::state::AppState;
use notary_metadata::models::{KeyKind, UserKeyRow};
use time::OffsetDateTime;
use uuid::Uuid;

/// Whether the user already has both halves of a key pair on record.
pub async fn has_keypair(state: &AppState, user_id: &str) -> WorkerResult<bool> {
    let rows = state.metadata.get_user_keys(user_id).await?;
    let has = |kind: KeyKind| rows.iter().any(|r| r.key_kind == kind.as_str());
    Ok(has(KeyKind::Private) && has(KeyKind::Public))
}

/// Return the user's private key file name, generating a key pair first if
/// the user has none.
///
/// Concurrent callers for the same user may both generate files; only one
/// pair is recorded and the other caller adopts it.
pub async fn ensure_keypair(state: &AppState, user_id: &str) -> WorkerResult<String> {
    if let Some(name) = private_key_name(state, user_id).await? {
        return Ok(name);
    }

    let now = OffsetDateTime::now_utc();
    let key_name = format!(
        "{}_{}_{}",
        sanitize(user_id),
        now.unix_timestamp(),
        &Uuid::new_v4().simple().to_string()[..8]
    );
    let files = state
        .timestamp
        .keygen
        .generate(&state.config.timestamp.key_dir, &key_name)
        .await?;

    let row = |kind: KeyKind, path: &std::path::Path| UserKeyRow {
        key_id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        key_kind: kind.as_str().to_string(),
        key_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| key_name.clone()),
        created_at: now,
    };
    let private = row(KeyKind::Private, &files.private_path);
    let public = row(KeyKind::Public, &files.public_path);

    if state.metadata.insert_user_keys(&private, &public).await? {
        tracing::info!(
            user_id = %user_id,
            key_name = %private.key_name,
            algorithm = state.timestamp.keygen.algorithm(),
            "generated user key pair"
        );
        return Ok(private.key_name);
    }

    tracing::debug!(
        user_id = %user_id,
        orphaned = %files.private_path.display(),
        "key pair recorded concurrently, adopting existing one"
    );
    private_key_name(state, user_id)
        .await?
        .ok_or_else(|| WorkerError::NotFound(format!("key pair of user {user_id}")))
}

async fn private_key_name(state: &AppState, user_id: &str) -> WorkerResult<Option<String>> {
    Ok(state
        .metadata
        .get_user_keys(user_id)
        .await?
        .into_iter()
        .find(|r| r.key_kind == KeyKind::Private.as_str())
        .map(|r| r.key_name))
}

/// User ids become part of a file name.
fn sanitize(user_id: &str) -> String {
    user_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_user_id() {
        assert_eq!(sanitize("abc12"), "abc12");
        assert_eq!(sanitize("../evil"), "___evil");
        assert_eq!(sanitize("a.b@c"), "a_b_c");
    }
}
