//! Nextcloud activity API change feed.

use crate::error::{GatewayError, GatewayResult};
use crate::traits::{ChangeFeed, ChangedFile};
use async_trait::async_trait;
use notary_core::FileKind;
use notary_core::config::InstitutionAccountConfig;
use reqwest::Url;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const ACTIVITY_PATH: &str = "ocs/v2.php/apps/activity/api/v2/activity/files";

#[derive(Deserialize)]
struct OcsResponse {
    ocs: OcsBody,
}

#[derive(Deserialize)]
struct OcsBody {
    #[serde(default)]
    data: Vec<Activity>,
}

#[derive(Deserialize)]
struct Activity {
    activity_id: i64,
    #[serde(default)]
    object_type: String,
    #[serde(default)]
    object_name: String,
    datetime: String,
}

/// Change feed backed by the Nextcloud activity API.
pub struct NextcloudChangeFeed {
    http: reqwest::Client,
    endpoint: Url,
    username: String,
    password: Option<String>,
    page_limit: u32,
}

impl NextcloudChangeFeed {
    pub fn new(
        base_url: &str,
        username: &str,
        password: Option<String>,
        page_limit: u32,
        timeout: Duration,
    ) -> GatewayResult<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| GatewayError::InvalidUrl(format!("{base_url}: {e}")))?;
        let base = if base.path().ends_with('/') {
            base
        } else {
            Url::parse(&format!("{base}/"))
                .map_err(|e| GatewayError::InvalidUrl(format!("{base_url}: {e}")))?
        };
        let endpoint = base
            .join(ACTIVITY_PATH)
            .map_err(|e| GatewayError::InvalidUrl(e.to_string()))?;
        if page_limit == 0 {
            return Err(GatewayError::Config("page_limit cannot be 0".to_string()));
        }
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            endpoint,
            username: username.to_string(),
            password,
            page_limit,
        })
    }

    pub fn from_account(account: &InstitutionAccountConfig, timeout: Duration) -> GatewayResult<Self> {
        Self::new(
            &account.base_url,
            &account.username,
            account.password.clone(),
            account.page_limit,
            timeout,
        )
    }

    /// One page of activities, newest first, older than `before` when set.
    /// `None` means the server has nothing more to return.
    async fn fetch_page(&self, before: Option<i64>) -> GatewayResult<Option<Vec<Activity>>> {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("format", "json")
                .append_pair("sort", "desc")
                .append_pair("limit", &self.page_limit.to_string());
            if let Some(id) = before {
                query.append_pair("since", &id.to_string());
            }
        }

        let response = self
            .http
            .get(url)
            .basic_auth(&self.username, self.password.as_deref())
            .header("OCS-APIRequest", "true")
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::unavailable(Some(status.as_u16()), body));
        }

        let body = response.bytes().await?;
        let parsed: OcsResponse = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        Ok(Some(parsed.ocs.data))
    }
}

#[async_trait]
impl ChangeFeed for NextcloudChangeFeed {
    async fn changed_since(&self, since: OffsetDateTime) -> GatewayResult<Vec<ChangedFile>> {
        let mut latest: BTreeMap<String, ChangedFile> = BTreeMap::new();
        let mut cursor = None;

        'pages: loop {
            let Some(page) = self.fetch_page(cursor).await? else {
                break;
            };
            let full_page = page.len() >= self.page_limit as usize;

            for activity in &page {
                cursor = Some(activity.activity_id);
                let changed_at = match OffsetDateTime::parse(&activity.datetime, &Rfc3339) {
                    Ok(at) => at,
                    Err(e) => {
                        tracing::warn!(
                            activity_id = activity.activity_id,
                            datetime = %activity.datetime,
                            error = %e,
                            "skipping activity with unparseable datetime"
                        );
                        continue;
                    }
                };
                if changed_at < since {
                    break 'pages;
                }
                if activity.object_type != "files" || activity.object_name.is_empty() {
                    continue;
                }
                let path = notary_core::path::normalize(&activity.object_name);
                let kind = if path.ends_with('/') {
                    FileKind::Folder
                } else {
                    FileKind::File
                };
                // Newest first, so the first entry seen per path wins.
                latest.entry(path.clone()).or_insert(ChangedFile {
                    path,
                    kind,
                    changed_at,
                });
            }

            if !full_page {
                break;
            }
        }

        let mut changes: Vec<ChangedFile> = latest.into_values().collect();
        changes.sort_by(|a, b| a.changed_at.cmp(&b.changed_at).then_with(|| a.path.cmp(&b.path)));
        Ok(changes)
    }
}
