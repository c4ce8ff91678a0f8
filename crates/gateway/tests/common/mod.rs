//! Shared helpers for gateway integration tests.

#![allow(dead_code)]

use notary_gateway::{ConfigSessions, HttpGateway};
use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

pub const PROJECT: &str = "abc12";
pub const USER: &str = "u1";
pub const USER_COOKIE: &str = "user-session";

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

/// HTTP gateway pointed at a mock server, with a cookie for [`USER`].
pub fn http_gateway(base_url: &str) -> HttpGateway {
    let mut cookies = HashMap::new();
    cookies.insert(USER.to_string(), USER_COOKIE.to_string());
    let sessions = Arc::new(ConfigSessions::new(cookies, None));
    HttpGateway::new(base_url, "osf", Duration::from_secs(5), sessions).unwrap()
}
