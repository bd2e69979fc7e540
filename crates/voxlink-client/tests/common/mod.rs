//! In-memory transports and helpers shared by the client tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use voxlink_client::config::{self, VoxlinkConfig};
use voxlink_client::transport::{
    ConnectRequest, Connector, FrameSink, FrameStream, Negotiation, Negotiator, WireFrame,
};
use voxlink_client::{CancellationToken, HubClient};
use voxlink_core::error::{Result, VoxlinkError};
use voxlink_core::protocol::incoming::EventRecord;

pub const WAIT: Duration = Duration::from_secs(2);

/// Client section without the automatic `registerApp`.
pub const QUIET_CLIENT: &str = "  auto_register_app: false";

/// Short timeouts; `client` and `hub` are spliced into their sections.
pub fn test_config_with(client: &str, hub: &str) -> VoxlinkConfig {
    let yaml = format!(
        r#"
version: 1
hub:
  url: "http://mock.local"
  ready_timeout_ms: 500
  close_timeout_ms: 500
{hub}
client:
{client}
"#
    );
    config::load_from_str(&yaml).expect("test config must parse")
}

pub fn test_config() -> VoxlinkConfig {
    test_config_with(QUIET_CLIENT, "")
}

// --------------------
// Mock socket
// --------------------

/// Server side of one mock socket.
pub struct MockServer {
    pub from_client: mpsc::UnboundedReceiver<WireFrame>,
    pub to_client: mpsc::UnboundedSender<WireFrame>,
}

impl MockServer {
    pub async fn next_frame(&mut self) -> WireFrame {
        tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client socket dropped")
    }

    /// Next record the client wrote, separator stripped.
    pub async fn next_record(&mut self) -> Value {
        match self.next_frame().await {
            WireFrame::Text(text) => {
                let body = text.strip_suffix('\u{1e}').expect("record separator missing");
                assert!(!body.contains('\u{1e}'), "one record per frame");
                serde_json::from_str(body).unwrap()
            }
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    pub fn push_record(&self, record: Value) {
        self.push_raw(&format!("{record}\u{1e}"));
    }

    pub fn push_raw(&self, text: &str) {
        self.to_client
            .send(WireFrame::Text(text.to_string()))
            .unwrap();
    }

    pub fn push_event(&self, payload: Value) {
        self.push_record(json!({
            "type": 1,
            "target": "ReceiveMessage",
            "arguments": [payload],
        }));
    }

    /// Answer the handshake and return the `authenticate` envelope.
    pub async fn accept(&mut self) -> Value {
        let handshake = self.next_record().await;
        assert_eq!(handshake, json!({"protocol": "json", "version": 1}));
        self.push_record(json!({}));

        let auth = self.next_record().await;
        assert_eq!(auth["type"], 1);
        assert_eq!(auth["target"], "SendMessage");
        assert_eq!(auth["arguments"][0]["$type"], "authenticate");
        auth
    }

    pub fn welcome(&self) {
        self.push_event(json!({
            "$type": "welcome",
            "user": {"id": "u1", "name": "Ann"},
        }));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    Accept,
    Refuse,
    Hang,
}

/// Connector handing every opened socket to the test as a [`MockServer`].
pub struct MockConnector {
    mode: Mutex<ConnectMode>,
    servers: mpsc::UnboundedSender<MockServer>,
    pub requests: Mutex<Vec<ConnectRequest>>,
    /// Frames successfully written by the client, over all sockets.
    pub writes: Arc<AtomicUsize>,
    /// When set, every write fails.
    pub fail_writes: Arc<AtomicBool>,
    /// When set, writes and close frames never complete.
    pub stall_writes: Arc<AtomicBool>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockServer>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            mode: Mutex::new(ConnectMode::Accept),
            servers,
            requests: Mutex::new(Vec::new()),
            writes: Arc::new(AtomicUsize::new(0)),
            fail_writes: Arc::new(AtomicBool::new(false)),
            stall_writes: Arc::new(AtomicBool::new(false)),
        });
        (connector, rx)
    }

    pub fn set_mode(&self, mode: ConnectMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
        self.requests.lock().unwrap().push(request.clone());
        let mode = *self.mode.lock().unwrap();
        match mode {
            ConnectMode::Refuse => {
                return Err(VoxlinkError::TransportClosed("connection refused".into()))
            }
            ConnectMode::Hang => std::future::pending::<()>().await,
            ConnectMode::Accept => {}
        }

        let (client_tx, from_client) = mpsc::unbounded_channel();
        let (to_client, client_rx) = mpsc::unbounded_channel();
        self.servers
            .send(MockServer {
                from_client,
                to_client,
            })
            .unwrap();

        Ok((
            Box::new(MockSink {
                tx: client_tx,
                writes: self.writes.clone(),
                fail: self.fail_writes.clone(),
                stall: self.stall_writes.clone(),
            }),
            Box::new(MockStream { rx: client_rx }),
        ))
    }
}

struct MockSink {
    tx: mpsc::UnboundedSender<WireFrame>,
    writes: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    stall: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, frame: WireFrame) -> Result<()> {
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(VoxlinkError::TransportClosed("mock write failure".into()));
        }
        self.tx
            .send(frame)
            .map_err(|_| VoxlinkError::TransportClosed("mock peer gone".into()))?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let _ = self.tx.send(WireFrame::Close(None));
        Ok(())
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<WireFrame>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn recv(&mut self) -> Option<Result<WireFrame>> {
        self.rx.recv().await.map(Ok)
    }
}

// --------------------
// Mock negotiation
// --------------------

pub struct MockNegotiator {
    pub outcome: Mutex<Option<Negotiation>>,
}

impl MockNegotiator {
    pub fn token(token: &str) -> Arc<Self> {
        let mut cookies = BTreeMap::new();
        cookies.insert("affinity".to_string(), "abc".to_string());
        Arc::new(Self {
            outcome: Mutex::new(Some(Negotiation {
                token: token.to_string(),
                cookies,
            })),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Negotiator for MockNegotiator {
    async fn negotiate(&self) -> Result<Negotiation> {
        self.outcome
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| VoxlinkError::NegotiationFailed("server answered 500".into()))
    }
}

// --------------------
// Engine helpers
// --------------------

pub fn mock_client(cfg: VoxlinkConfig) -> (HubClient, Arc<MockConnector>, mpsc::UnboundedReceiver<MockServer>) {
    let (connector, servers) = MockConnector::new();
    let client = HubClient::with_transport(cfg, connector.clone(), MockNegotiator::token("T"));
    (client, connector, servers)
}

/// Connect `client` against the next mock socket and complete the welcome.
pub async fn connect_ready(
    client: &HubClient,
    servers: &mut mpsc::UnboundedReceiver<MockServer>,
) -> MockServer {
    let c = client.clone();
    let connecting =
        tokio::spawn(async move { c.connect(&Negotiation::new("T"), &CancellationToken::new()).await });

    let mut server = tokio::time::timeout(WAIT, servers.recv())
        .await
        .expect("no socket opened")
        .expect("connector dropped");
    server.accept().await;
    server.welcome();

    connecting.await.unwrap().expect("connect must succeed");
    server
}

/// Forward every event named in `names` into a channel.
pub fn record_events(client: &HubClient, names: &[&str]) -> mpsc::UnboundedReceiver<EventRecord> {
    let (tx, rx) = mpsc::unbounded_channel();
    for name in names {
        let tx = tx.clone();
        client.on(*name, move |ev| {
            let _ = tx.send(ev);
            async { Ok(()) }
        });
    }
    rx
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<EventRecord>) -> EventRecord {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Next event with the given name, skipping others.
pub async fn next_named(rx: &mut mpsc::UnboundedReceiver<EventRecord>, name: &str) -> EventRecord {
    loop {
        let ev = next_event(rx).await;
        if ev.name == name {
            return ev;
        }
    }
}

/// Assert nothing arrives within `ms`.
pub async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<EventRecord>, ms: u64) {
    if let Ok(Some(ev)) = tokio::time::timeout(Duration::from_millis(ms), rx.recv()).await {
        panic!("unexpected event {} {}", ev.name, ev.payload);
    }
}
