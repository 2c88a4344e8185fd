//! Caller identification without login.
//!
//! The storage partition of a request is a truncated SHA-256 of the client
//! address, user agent and accept-language. It is a convenience for keeping
//! browsers apart, anyone sending the same headers from the same address gets
//! the same partition.

use crate::config::Config;
use crate::error::Error;
use axum::async_trait;
use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap, HeaderName},
};
use sha2::{Digest, Sha256};
use std::{fmt, net::SocketAddr, sync::Arc};

const UNKNOWN: &str = "unknown";
const ID_LENGTH: usize = 16;

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
static X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn resolve(
        address: Option<&str>,
        user_agent: Option<&str>,
        accept_language: Option<&str>,
    ) -> Self {
        let identifier = format!(
            "{}-{}-{}",
            address.unwrap_or(UNKNOWN),
            user_agent.unwrap_or(UNKNOWN),
            accept_language.unwrap_or(UNKNOWN)
        );
        let mut digest = hex::encode(Sha256::digest(identifier.as_bytes()));
        digest.truncate(ID_LENGTH);
        Self(digest)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn forwarded_address(headers: &HeaderMap) -> Option<String> {
    header_value(headers, &X_FORWARDED_FOR)
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .or_else(|| header_value(headers, &X_REAL_IP))
        .map(String::from)
}

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
    Arc<Config>: FromRef<S>,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Arc::<Config>::from_ref(state);

        let socket = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let forwarded = forwarded_address(&parts.headers);
        let address = if config.trust_forwarded_headers {
            forwarded.or(socket)
        } else {
            socket.or(forwarded)
        };

        let user = UserId::resolve(
            address.as_deref(),
            header_value(&parts.headers, &header::USER_AGENT),
            header_value(&parts.headers, &header::ACCEPT_LANGUAGE),
        );
        trace!(%user, "identified caller");

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn same_metadata_same_partition() {
        let a = UserId::resolve(Some("10.0.0.1"), Some("Firefox"), Some("fi-FI"));
        let b = UserId::resolve(Some("10.0.0.1"), Some("Firefox"), Some("fi-FI"));

        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 16);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn any_difference_changes_partition() {
        let base = UserId::resolve(Some("10.0.0.1"), Some("Firefox"), Some("fi-FI"));

        assert_ne!(base, UserId::resolve(Some("10.0.0.2"), Some("Firefox"), Some("fi-FI")));
        assert_ne!(base, UserId::resolve(Some("10.0.0.1"), Some("Chrome"), Some("fi-FI")));
        assert_ne!(base, UserId::resolve(Some("10.0.0.1"), Some("Firefox"), Some("en-US")));
    }

    #[test]
    fn missing_metadata_uses_placeholder() {
        let missing = UserId::resolve(None, None, None);
        let explicit = UserId::resolve(Some("unknown"), Some("unknown"), Some("unknown"));

        assert_eq!(missing, explicit);
    }

    #[test]
    fn forwarded_chain_uses_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            X_FORWARDED_FOR.clone(),
            HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"),
        );
        headers.insert(X_REAL_IP.clone(), HeaderValue::from_static("10.0.0.9"));

        assert_eq!(forwarded_address(&headers).as_deref(), Some("203.0.113.7"));

        headers.remove(&X_FORWARDED_FOR);
        assert_eq!(forwarded_address(&headers).as_deref(), Some("10.0.0.9"));
    }
}
