//! HTTP negotiation.
//!
//! `POST {url}{negotiate_path}?negotiateVersion=1` yields the connection token
//! both channels are opened with. Cookies set by the server are forwarded
//! verbatim on the socket requests.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::SET_COOKIE;
use serde::Deserialize;

use voxlink_core::error::{Result, VoxlinkError};

use crate::config::HubSection;
use crate::transport::negotiate_url;

/// Outcome of a successful negotiation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Negotiation {
    pub token: String,
    pub cookies: BTreeMap<String, String>,
}

impl Negotiation {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            cookies: BTreeMap::new(),
        }
    }
}

/// Obtains a [`Negotiation`] from the server.
#[async_trait]
pub trait Negotiator: Send + Sync {
    async fn negotiate(&self) -> Result<Negotiation>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NegotiateResponse {
    #[serde(default)]
    connection_token: Option<String>,
}

/// reqwest-backed negotiator.
#[derive(Debug, Clone)]
pub struct HttpNegotiator {
    http: reqwest::Client,
    url: String,
}

impl HttpNegotiator {
    pub fn new(hub: &HubSection) -> Result<Self> {
        let url = negotiate_url(&hub.url, &hub.negotiate_path)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(hub.connect_timeout_ms))
            .build()
            .map_err(|e| VoxlinkError::Internal(format!("http client build failed: {e}")))?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl Negotiator for HttpNegotiator {
    async fn negotiate(&self) -> Result<Negotiation> {
        tracing::debug!(url = %self.url, "negotiating");

        let resp = self
            .http
            .post(&self.url)
            .send()
            .await
            .map_err(|e| VoxlinkError::NegotiationFailed(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(VoxlinkError::NegotiationFailed(format!(
                "server answered {status}"
            )));
        }

        let cookies = resp
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect();

        let body: NegotiateResponse = resp
            .json()
            .await
            .map_err(|e| VoxlinkError::NegotiationFailed(format!("invalid response body: {e}")))?;

        let token = body
            .connection_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| VoxlinkError::NegotiationFailed("missing connectionToken".into()))?;

        Ok(Negotiation { token, cookies })
    }
}

/// `name=value; Path=/; HttpOnly` -> `(name, value)`.
pub fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_cookie_keeps_only_the_pair() {
        assert_eq!(
            parse_set_cookie("ARRAffinity=abc123; Path=/; HttpOnly"),
            Some(("ARRAffinity".into(), "abc123".into()))
        );
        assert_eq!(
            parse_set_cookie("token=a=b"),
            Some(("token".into(), "a=b".into()))
        );
        assert_eq!(parse_set_cookie("; Path=/"), None);
        assert_eq!(parse_set_cookie("novalue"), None);
    }
}
