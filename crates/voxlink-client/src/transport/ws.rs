//! tokio-tungstenite transport.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use voxlink_core::error::{Result, VoxlinkError};

use crate::transport::{ConnectRequest, Connector, FrameSink, FrameStream, WireFrame};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

fn closed(e: impl std::fmt::Display) -> VoxlinkError {
    VoxlinkError::TransportClosed(e.to_string())
}

/// Opens real WebSocket connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
        let mut req = request
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| VoxlinkError::InvalidConfig(format!("invalid socket url: {e}")))?;

        if let Some(cookie) = request.cookie_header() {
            let value = HeaderValue::from_str(&cookie)
                .map_err(|e| VoxlinkError::NegotiationFailed(format!("invalid cookie: {e}")))?;
            req.headers_mut().insert("Cookie", value);
        }

        let (stream, _resp) = tokio_tungstenite::connect_async(req)
            .await
            .map_err(|e| closed(format!("connect {} failed: {e}", request.url)))?;
        tracing::debug!(url = %request.url, "socket open");

        let (sink, stream) = stream.split();
        Ok((Box::new(WsSink { sink }), Box::new(WsSource { stream })))
    }
}

struct WsSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: WireFrame) -> Result<()> {
        let msg = match frame {
            WireFrame::Text(s) => Message::Text(s),
            WireFrame::Binary(b) => Message::Binary(b.to_vec()),
            WireFrame::Close(_) => Message::Close(None),
        };
        self.sink.send(msg).await.map_err(closed)
    }

    async fn close(&mut self) -> Result<()> {
        let sent = self.sink.send(Message::Close(None)).await.map_err(closed);
        let _ = self.sink.close().await;
        sent
    }
}

struct WsSource {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameStream for WsSource {
    async fn recv(&mut self) -> Option<Result<WireFrame>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(closed(e))),
            };
            match msg {
                Message::Text(s) => return Some(Ok(WireFrame::Text(s))),
                Message::Binary(b) => return Some(Ok(WireFrame::Binary(Bytes::from(b)))),
                Message::Close(frame) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty());
                    return Some(Ok(WireFrame::Close(reason)));
                }
                // tungstenite answers pings on its own
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }
}
