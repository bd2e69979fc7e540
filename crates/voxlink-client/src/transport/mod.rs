//! Transport seam.
//!
//! The hub client and the audio sidecar only talk to the network through the
//! traits in this module. `ws` provides the tokio-tungstenite implementation
//! and `negotiate` the HTTP negotiation; tests plug in in-memory transports.

pub mod negotiate;
pub mod ws;

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;

use voxlink_core::error::{Result, VoxlinkError};

pub use negotiate::{HttpNegotiator, Negotiation, Negotiator};
pub use ws::WsConnector;

/// One transport-level message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Text(String),
    Binary(Bytes),
    /// Peer closed the socket, with its close reason if any.
    Close(Option<String>),
}

/// Everything needed to open one socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub url: String,
    pub cookies: BTreeMap<String, String>,
}

impl ConnectRequest {
    pub fn new(url: impl Into<String>, cookies: BTreeMap<String, String>) -> Self {
        Self {
            url: url.into(),
            cookies,
        }
    }

    /// `Cookie` header value, if any cookies were negotiated.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Write half of an open socket.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: WireFrame) -> Result<()>;

    /// Send a close frame and release the socket.
    async fn close(&mut self) -> Result<()>;
}

/// Read half of an open socket. `None` means the stream ended.
#[async_trait]
pub trait FrameStream: Send {
    async fn recv(&mut self) -> Option<Result<WireFrame>>;
}

/// Opens sockets.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)>;
}

fn parse_base(base: &str) -> Result<Url> {
    Url::parse(base).map_err(|e| VoxlinkError::InvalidConfig(format!("invalid url {base}: {e}")))
}

fn join_path(url: &mut Url, path: &str) {
    let joined = format!("{}{}", url.path().trim_end_matches('/'), path);
    url.set_path(&joined);
}

fn with_scheme(mut url: Url, secure: &str, plain: &str) -> Result<Url> {
    let scheme = match url.scheme() {
        "https" | "wss" => secure,
        "http" | "ws" => plain,
        other => {
            return Err(VoxlinkError::InvalidConfig(format!(
                "unsupported url scheme: {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| VoxlinkError::Internal(format!("cannot switch url scheme to {scheme}")))?;
    Ok(url)
}

/// `ws(s)://host{path}?id=<token>` for a channel on `base`.
pub fn channel_url(base: &str, path: &str, token: &str) -> Result<String> {
    let mut url = with_scheme(parse_base(base)?, "wss", "ws")?;
    join_path(&mut url, path);
    url.query_pairs_mut().clear().append_pair("id", token);
    Ok(url.into())
}

/// `http(s)://host{path}?negotiateVersion=1` on `base`.
pub fn negotiate_url(base: &str, path: &str) -> Result<String> {
    let mut url = with_scheme(parse_base(base)?, "https", "http")?;
    join_path(&mut url, path);
    url.query_pairs_mut()
        .clear()
        .append_pair("negotiateVersion", "1");
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn channel_url_switches_scheme_and_encodes_token() {
        assert_eq!(
            channel_url("http://localhost:5384", "/hub", "a+b/c=").unwrap(),
            "ws://localhost:5384/hub?id=a%2Bb%2Fc%3D"
        );
        assert_eq!(
            channel_url("https://voxta.example/base/", "/hub/audio", "T").unwrap(),
            "wss://voxta.example/base/hub/audio?id=T"
        );
    }

    #[test]
    fn negotiate_url_is_http() {
        assert_eq!(
            negotiate_url("ws://localhost:5384", "/hub/negotiate").unwrap(),
            "http://localhost:5384/hub/negotiate?negotiateVersion=1"
        );
    }

    #[test]
    fn rejects_other_schemes() {
        let err = channel_url("ftp://localhost", "/hub", "T").unwrap_err();
        assert_eq!(err.code().as_str(), "INVALID_CONFIG");
    }

    #[test]
    fn cookie_header_joins_pairs() {
        let mut cookies = BTreeMap::new();
        assert_eq!(ConnectRequest::new("ws://x", cookies.clone()).cookie_header(), None);
        cookies.insert("b".to_string(), "2".to_string());
        cookies.insert("a".to_string(), "1".to_string());
        assert_eq!(
            ConnectRequest::new("ws://x", cookies).cookie_header().as_deref(),
            Some("a=1; b=2")
        );
    }
}
