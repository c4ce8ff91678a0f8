//! HTTP client for the storage gateway.
//!
//! Resources live at `{base}/v1/resources/{project}/providers/{provider}{path}`.
//! Metadata and folder listings are requested with `?meta=` and come back in a
//! `{"data": ...}` envelope; content is streamed from the bare resource URL.

use crate::error::{GatewayError, GatewayResult};
use crate::traits::{SessionStore, StorageGateway};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use notary_core::config::GatewayConfig;
use notary_core::{FileMetadata, Provider};
use reqwest::Url;
use reqwest::header::COOKIE;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Deserialize)]
struct Resource {
    attributes: FileMetadata,
}

/// Storage gateway reached over HTTP.
pub struct HttpGateway {
    http: reqwest::Client,
    base_url: Url,
    cookie_name: String,
    sessions: Arc<dyn SessionStore>,
}

impl HttpGateway {
    pub fn new(
        base_url: &str,
        cookie_name: &str,
        timeout: Duration,
        sessions: Arc<dyn SessionStore>,
    ) -> GatewayResult<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| GatewayError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::InvalidUrl(format!(
                "{base_url} cannot be used as a base URL"
            )));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url,
            cookie_name: cookie_name.to_string(),
            sessions,
        })
    }

    pub fn from_config(config: &GatewayConfig, sessions: Arc<dyn SessionStore>) -> GatewayResult<Self> {
        Self::new(
            &config.base_url,
            &config.cookie_name,
            Duration::from_secs(config.timeout_secs),
            sessions,
        )
    }

    /// URL of a resource. Every path segment is percent-encoded.
    fn resource_url(&self, project_id: &str, provider: &Provider, path: &str) -> GatewayResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| GatewayError::InvalidUrl(self.base_url.to_string()))?;
            segments
                .pop_if_empty()
                .extend(["v1", "resources", project_id, "providers", provider.as_str()]);
            for segment in path.trim_start_matches('/').split('/') {
                segments.push(segment);
            }
        }
        Ok(url)
    }

    fn meta_url(&self, project_id: &str, provider: &Provider, path: &str) -> GatewayResult<Url> {
        let mut url = self.resource_url(project_id, provider, path)?;
        url.query_pairs_mut().append_pair("meta", "");
        Ok(url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder, user_id: &str) -> reqwest::RequestBuilder {
        match self.sessions.cookie_for(user_id) {
            Some(cookie) => req.header(COOKIE, format!("{}={}", self.cookie_name, cookie)),
            None => {
                tracing::debug!(user_id = %user_id, "no gateway session for user, sending anonymous request");
                req
            }
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder, user_id: &str) -> GatewayResult<reqwest::Response> {
        let response = self.authorize(req, user_id).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::unavailable(Some(status.as_u16()), body));
        }
        Ok(response)
    }

    async fn send_envelope<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        user_id: &str,
    ) -> GatewayResult<T> {
        let response = self.send(req, user_id).await?;
        let body = response.bytes().await?;
        let envelope: Envelope<T> = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        envelope
            .data
            .ok_or_else(|| GatewayError::unavailable(Some(200), "response has no data"))
    }
}

#[async_trait]
impl StorageGateway for HttpGateway {
    async fn metadata(
        &self,
        user_id: &str,
        project_id: &str,
        provider: &Provider,
        path: &str,
    ) -> GatewayResult<FileMetadata> {
        let url = self.meta_url(project_id, provider, path)?;
        let resource: Resource = self.send_envelope(self.http.get(url), user_id).await?;
        Ok(resource.attributes)
    }

    async fn list_folder(
        &self,
        user_id: &str,
        project_id: &str,
        provider: &Provider,
        folder: &str,
    ) -> GatewayResult<Vec<FileMetadata>> {
        let folder = if folder.ends_with('/') {
            folder.to_string()
        } else {
            format!("{folder}/")
        };
        let url = self.meta_url(project_id, provider, &folder)?;
        let resources: Vec<Resource> = self.send_envelope(self.http.get(url), user_id).await?;
        Ok(resources.into_iter().map(|r| r.attributes).collect())
    }

    async fn download(
        &self,
        user_id: &str,
        project_id: &str,
        provider: &Provider,
        path: &str,
        dest: &Path,
    ) -> GatewayResult<u64> {
        let url = self.resource_url(project_id, provider, path)?;
        let response = self.send(self.http.get(url), user_id).await?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!(
            project_id = %project_id,
            provider = %provider,
            path = %path,
            bytes = written,
            "downloaded file from gateway"
        );
        Ok(written)
    }

    async fn upload(
        &self,
        user_id: &str,
        project_id: &str,
        provider: &Provider,
        folder: &str,
        name: &str,
        data: Bytes,
    ) -> GatewayResult<FileMetadata> {
        let folder = if folder.ends_with('/') {
            folder.to_string()
        } else {
            format!("{folder}/")
        };
        let mut url = self.resource_url(project_id, provider, &folder)?;
        url.query_pairs_mut()
            .append_pair("kind", "file")
            .append_pair("name", name);
        let resource: Resource = self
            .send_envelope(self.http.put(url).body(data), user_id)
            .await?;
        Ok(resource.attributes)
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConfigSessions;

    fn gateway(base: &str) -> HttpGateway {
        HttpGateway::new(
            base,
            "osf",
            Duration::from_secs(5),
            Arc::new(ConfigSessions::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_resource_url_encodes_segments() {
        let gw = gateway("http://localhost:7777");
        let url = gw
            .resource_url("abc12", &Provider::Nextcloud, "/my folder/a#b.txt")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:7777/v1/resources/abc12/providers/nextcloud/my%20folder/a%23b.txt"
        );
    }

    #[test]
    fn test_folder_url_keeps_trailing_slash() {
        let gw = gateway("http://localhost:7777/");
        let url = gw.meta_url("abc12", &Provider::OsfStorage, "/").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:7777/v1/resources/abc12/providers/osfstorage/?meta="
        );
    }

    #[test]
    fn test_rejects_non_base_url() {
        let result = HttpGateway::new(
            "mailto:someone@example.org",
            "osf",
            Duration::from_secs(5),
            Arc::new(ConfigSessions::default()),
        );
        assert!(matches!(result, Err(GatewayError::InvalidUrl(_))));
    }
}
