//! Storage gateway clients for notary.
//!
//! This crate provides:
//! - The [`StorageGateway`] trait over the file-storage proxy, with an HTTP
//!   client and an in-memory implementation
//! - Session cookie lookup for calls made on behalf of a user
//! - [`ChangeFeed`] listings of institutional storage accounts (Nextcloud
//!   activity API, in-memory)

pub mod error;
pub mod http;
pub mod memory;
pub mod nextcloud;
pub mod session;
pub mod traits;

pub use error::{GatewayError, GatewayResult};
pub use http::HttpGateway;
pub use memory::{InMemoryChangeFeed, InMemoryGateway};
pub use nextcloud::NextcloudChangeFeed;
pub use session::ConfigSessions;
pub use traits::{ChangeFeed, ChangedFile, SessionStore, StorageGateway};

use notary_core::config::{GatewayConfig, InstitutionAccountConfig};
use std::sync::Arc;
use std::time::Duration;

/// Create the HTTP storage gateway from configuration.
pub fn from_config(config: &GatewayConfig) -> GatewayResult<Arc<dyn StorageGateway>> {
    config.validate().map_err(GatewayError::Config)?;
    let sessions = Arc::new(ConfigSessions::from_config(config));
    let gateway = HttpGateway::from_config(config, sessions)?;
    Ok(Arc::new(gateway))
}

/// Create the change feed of one institutional account.
pub fn change_feed_for(
    account: &InstitutionAccountConfig,
    timeout: Duration,
) -> GatewayResult<Arc<dyn ChangeFeed>> {
    let feed = NextcloudChangeFeed::from_account(account, timeout)?;
    Ok(Arc::new(feed))
}
