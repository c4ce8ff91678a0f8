//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// SQLite database file path (`:memory:` for an in-process database).
    #[serde(default = "default_metadata_path")]
    pub path: PathBuf,
    /// Query timeout in seconds (advisory only - SQLite cannot force-cancel queries).
    #[serde(default = "default_sqlite_query_timeout_secs")]
    pub query_timeout_secs: Option<u64>,
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from("./data/notary.db")
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(600)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            path: default_metadata_path(),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("metadata.path cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Storage gateway client configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the gateway (e.g., "http://localhost:7777").
    #[serde(default = "default_gateway_url")]
    pub base_url: String,
    /// Name of the session cookie sent with every request.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Session cookie used when acting as the service itself.
    /// WARNING: Prefer NOTARY_GATEWAY__SERVICE_COOKIE over storing in config.
    #[serde(default)]
    pub service_cookie: Option<String>,
    /// Per-user session cookies, keyed by user id.
    #[serde(default)]
    pub user_cookies: std::collections::HashMap<String, String>,
    /// Request timeout in seconds.
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_gateway_url() -> String {
    "http://localhost:7777".to_string()
}

fn default_cookie_name() -> String {
    "osf".to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    60
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_url(),
            cookie_name: default_cookie_name(),
            service_cookie: None,
            user_cookies: Default::default(),
            timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(format!(
                "gateway.base_url must be an http(s) URL, got {}",
                self.base_url
            ));
        }
        if self.timeout_secs == 0 {
            return Err("gateway.timeout_secs cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Where timestamp tokens come from.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthorityConfig {
    /// RFC 3161 Time-Stamp Authority reached over HTTP.
    Tsa {
        /// Endpoint URL.
        url: String,
        /// Request timeout in seconds.
        #[serde(default = "default_tsa_timeout_secs")]
        timeout_secs: u64,
    },
    /// External UPKI signing command. `{file}` and `{output}` in `args` are
    /// replaced with the input file and token output paths.
    Upki {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// In-process Ed25519 authority (development and tests).
    Local {
        /// Signing key file in `name:base64` form. Generated when absent.
        key_path: Option<PathBuf>,
        /// Key name used when generating.
        #[serde(default = "default_local_key_name")]
        key_name: String,
    },
}

fn default_tsa_timeout_secs() -> u64 {
    30
}

fn default_local_key_name() -> String {
    "notary-local-1".to_string()
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self::Local {
            key_path: None,
            key_name: default_local_key_name(),
        }
    }
}

/// How stored tokens are verified.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VerifierConfig {
    /// `openssl ts -verify` against a trusted root certificate.
    Openssl {
        #[serde(default = "default_openssl_binary")]
        binary: String,
        root_cert: PathBuf,
        /// Intermediate certificates, if the TSA needs them.
        #[serde(default)]
        untrusted: Option<PathBuf>,
    },
    /// Native Ed25519 verification of tokens issued by the local authority.
    Native {
        /// Trusted public keys in `name:base64` form.
        #[serde(default)]
        public_keys: Vec<String>,
    },
}

fn default_openssl_binary() -> String {
    "openssl".to_string()
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self::Native {
            public_keys: Vec::new(),
        }
    }
}

/// How per-user key files are generated.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KeyGeneratorConfig {
    /// `openssl genrsa` + `openssl rsa -pubout`.
    Openssl {
        #[serde(default = "default_openssl_binary")]
        binary: String,
        #[serde(default = "default_rsa_bits")]
        bits: u32,
    },
    /// Native Ed25519 key files.
    #[default]
    Native,
}

fn default_rsa_bits() -> u32 {
    2048
}

/// Timestamp token service configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimestampConfig {
    #[serde(default)]
    pub authority: AuthorityConfig,
    #[serde(default)]
    pub verifier: VerifierConfig,
    #[serde(default)]
    pub key_generator: KeyGeneratorConfig,
    /// Directory holding per-user key files.
    #[serde(default = "default_key_dir")]
    pub key_dir: PathBuf,
    /// Parent of the per-operation scratch directories (system temp dir if unset).
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    /// Cap on TSA-bound checks during a verification sweep.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

fn default_key_dir() -> PathBuf {
    PathBuf::from("./data/keys")
}

fn default_requests_per_minute() -> u32 {
    30
}

impl Default for TimestampConfig {
    fn default() -> Self {
        Self {
            authority: AuthorityConfig::default(),
            verifier: VerifierConfig::default(),
            key_generator: KeyGeneratorConfig::default(),
            key_dir: default_key_dir(),
            scratch_dir: None,
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

impl TimestampConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.requests_per_minute == 0 {
            return Err("timestamp.requests_per_minute cannot be 0".to_string());
        }
        match &self.authority {
            AuthorityConfig::Tsa { url, .. } if url.is_empty() => {
                return Err("timestamp.authority.url cannot be empty".to_string());
            }
            AuthorityConfig::Upki { command, .. } if command.is_empty() => {
                return Err("timestamp.authority.command cannot be empty".to_string());
            }
            _ => {}
        }
        let local = matches!(self.authority, AuthorityConfig::Local { .. });
        let native = matches!(self.verifier, VerifierConfig::Native { .. });
        if local != native {
            return Err(
                "timestamp.verifier must be native exactly when timestamp.authority is local"
                    .to_string(),
            );
        }
        if let KeyGeneratorConfig::Openssl { bits, .. } = &self.key_generator
            && *bits < 2048
        {
            return Err(format!(
                "timestamp.key_generator.bits {bits} is too small (minimum 2048)"
            ));
        }
        Ok(())
    }
}

/// Quota accounting configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Max quota for lazily created ledger entries, in GiB.
    #[serde(default = "default_max_quota_gb")]
    pub default_max_quota_gb: u64,
}

fn default_max_quota_gb() -> u64 {
    crate::DEFAULT_MAX_QUOTA_GB
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            default_max_quota_gb: default_max_quota_gb(),
        }
    }
}

impl QuotaConfig {
    /// Default max quota in bytes.
    pub fn default_max_quota_bytes(&self) -> u64 {
        crate::size::gib_to_bytes(self.default_max_quota_gb)
    }
}

/// An institutional storage account polled for changes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstitutionAccountConfig {
    /// External account id, matched against project storage settings.
    pub account_id: String,
    /// Provider name of the account's storage.
    #[serde(default = "default_institution_provider")]
    pub provider: String,
    /// Base URL of the Nextcloud server.
    pub base_url: String,
    pub username: String,
    /// WARNING: Prefer NOTARY_POLLER__ACCOUNTS__0__PASSWORD over storing in config.
    #[serde(default)]
    pub password: Option<String>,
    /// Page size for activity listings.
    #[serde(default = "default_activity_limit")]
    pub page_limit: u32,
}

fn default_institution_provider() -> String {
    "nextcloudinstitutions".to_string()
}

fn default_activity_limit() -> u32 {
    100
}

/// Institutional change poller configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Directory holding per-account lock directories.
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,
    /// Seconds between the two passes of one poll, and between polls in `run`.
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    /// Attempts made by the blocking lock variant.
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,
    #[serde(default)]
    pub accounts: Vec<InstitutionAccountConfig>,
}

fn default_lock_dir() -> PathBuf {
    PathBuf::from("./data/locks")
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_lock_retries() -> u32 {
    10
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            lock_dir: default_lock_dir(),
            interval_secs: default_poll_interval_secs(),
            lock_retries: default_lock_retries(),
            accounts: Vec::new(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.interval_secs == 0 {
            return Err("poller.interval_secs cannot be 0".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for account in &self.accounts {
            if !seen.insert(account.account_id.as_str()) {
                return Err(format!(
                    "poller.accounts has duplicate account_id {}",
                    account.account_id
                ));
            }
            if !crate::Provider::parse(&account.provider)
                .map(|p| p.is_institutional())
                .unwrap_or(false)
            {
                return Err(format!(
                    "poller account {} uses non-institutional provider {}",
                    account.account_id, account.provider
                ));
            }
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub timestamp: TimestampConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub poller: PollerConfig,
}

impl AppConfig {
    /// Create a test configuration.
    ///
    /// **For testing only.** In-memory SQLite, the local Ed25519 authority
    /// and native verifier, and a generous request rate.
    pub fn for_testing() -> Self {
        Self {
            metadata: MetadataConfig {
                path: PathBuf::from(":memory:"),
                query_timeout_secs: None,
            },
            gateway: GatewayConfig::default(),
            timestamp: TimestampConfig {
                requests_per_minute: 60_000,
                ..TimestampConfig::default()
            },
            quota: QuotaConfig::default(),
            poller: PollerConfig {
                interval_secs: 1,
                ..PollerConfig::default()
            },
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.metadata.validate()?;
        self.gateway.validate()?;
        self.timestamp.validate()?;
        self.poller.validate()?;
        Ok(())
    }
}
