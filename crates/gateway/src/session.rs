//! Configuration-backed session store.

use crate::traits::SessionStore;
use notary_core::config::GatewayConfig;
use std::collections::HashMap;

/// Session cookies taken from configuration, falling back to the service cookie.
#[derive(Clone, Debug, Default)]
pub struct ConfigSessions {
    user_cookies: HashMap<String, String>,
    service_cookie: Option<String>,
}

impl ConfigSessions {
    pub fn new(user_cookies: HashMap<String, String>, service_cookie: Option<String>) -> Self {
        Self {
            user_cookies,
            service_cookie,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.user_cookies.clone(), config.service_cookie.clone())
    }
}

impl SessionStore for ConfigSessions {
    fn cookie_for(&self, user_id: &str) -> Option<String> {
        self.user_cookies
            .get(user_id)
            .cloned()
            .or_else(|| self.service_cookie.clone())
    }
}
