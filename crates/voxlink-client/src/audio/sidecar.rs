use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use voxlink_core::error::{Result, VoxlinkError};

use crate::config::VoxlinkConfig;
use crate::dispatch::BoxError;
use crate::hub::ConnectionState;
use crate::transport::{
    channel_url, ConnectRequest, Connector, FrameSink, FrameStream, Negotiation, WireFrame,
    WsConnector,
};

/// Handler for inbound audio frames.
pub type AudioHandler = Arc<dyn Fn(Bytes) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Binary audio channel, independent from the control channel.
///
/// Outgoing frames go through a bounded queue drained by one writer task.
/// A frame holds its queue slot until the socket write finishes, so at most
/// `queue_capacity` frames are pending at once, including the one being
/// written. Frames still pending when the channel stops are discarded and
/// counted in a warning.
///
/// Inbound binary frames are handed to every `on_audio` handler in arrival
/// order by the reader task.
#[derive(Clone)]
pub struct AudioClient {
    inner: Arc<AudioInner>,
}

struct AudioInner {
    base_url: String,
    path: String,
    queue_capacity: usize,
    sample_rate: u32,
    connect_timeout: Duration,
    close_timeout: Duration,
    connector: Arc<dyn Connector>,
    handlers: RwLock<Vec<AudioHandler>>,
    state: watch::Sender<ConnectionState>,
    queue: Mutex<Option<AudioQueue>>,
    tasks: Mutex<Option<AudioTasks>>,
}

/// A frame and the queue slot it occupies until written.
type Queued = (Bytes, OwnedSemaphorePermit);

struct AudioQueue {
    tx: mpsc::Sender<Queued>,
    slots: Arc<Semaphore>,
}

struct AudioTasks {
    shutdown: CancellationToken,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl AudioClient {
    pub fn new(cfg: &VoxlinkConfig) -> Self {
        Self::with_connector(cfg, Arc::new(WsConnector))
    }

    pub fn with_connector(cfg: &VoxlinkConfig, connector: Arc<dyn Connector>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(AudioInner {
                base_url: cfg.hub.url.clone(),
                path: cfg.audio.path.clone(),
                queue_capacity: cfg.audio.queue_capacity,
                sample_rate: cfg.audio.sample_rate,
                connect_timeout: Duration::from_millis(cfg.hub.connect_timeout_ms),
                close_timeout: Duration::from_millis(cfg.hub.close_timeout_ms),
                connector,
                handlers: RwLock::new(Vec::new()),
                state,
                queue: Mutex::new(None),
                tasks: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Register a handler called once per inbound binary frame.
    ///
    /// A failing or panicking handler is logged; later handlers and frames
    /// are still delivered.
    pub fn on_audio<F>(&self, f: F)
    where
        F: Fn(Bytes) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(f));
    }

    /// Open the audio socket with the token of a prior negotiation.
    pub async fn connect(&self, negotiation: &Negotiation, cancel: &CancellationToken) -> Result<()> {
        let url = channel_url(&self.inner.base_url, &self.inner.path, &negotiation.token)?;

        let mut refused = None;
        self.inner.state.send_if_modified(|s| {
            if s.is_idle() {
                *s = ConnectionState::SocketOpen;
                true
            } else {
                refused = Some(*s);
                false
            }
        });
        if let Some(s) = refused {
            return Err(VoxlinkError::NotReady(format!(
                "cannot open audio channel while {s}"
            )));
        }

        let request = ConnectRequest::new(url, negotiation.cookies.clone());
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(VoxlinkError::Cancelled),
            r = tokio::time::timeout(self.inner.connect_timeout, self.inner.connector.connect(&request)) => {
                r.unwrap_or_else(|_| Err(VoxlinkError::Timeout("audio socket open".into())))
            }
        };
        let (sink, stream) = match opened {
            Ok(halves) => halves,
            Err(e) => {
                let next = match e {
                    VoxlinkError::Cancelled | VoxlinkError::Timeout(_) => {
                        ConnectionState::Disconnected
                    }
                    _ => ConnectionState::Failed,
                };
                self.inner.state.send_replace(next);
                tracing::warn!(error = %e, "audio socket open failed");
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel::<Queued>(self.inner.queue_capacity);
        let slots = Arc::new(Semaphore::new(self.inner.queue_capacity));
        let shutdown = CancellationToken::new();
        let writer = tokio::spawn(write_loop(sink, rx, slots.clone(), shutdown.clone()));
        let reader = tokio::spawn(self.clone().read_loop(stream, shutdown.clone()));

        *self.lock_queue() = Some(AudioQueue { tx, slots });
        *self.lock_tasks() = Some(AudioTasks {
            shutdown,
            writer,
            reader,
        });

        let ready = self.inner.state.send_if_modified(|s| {
            if *s == ConnectionState::SocketOpen {
                *s = ConnectionState::Ready;
                true
            } else {
                false
            }
        });
        if !ready {
            return Err(VoxlinkError::TransportClosed(
                "audio socket closed while opening".into(),
            ));
        }

        tracing::info!(
            path = %self.inner.path,
            sample_rate = self.inner.sample_rate,
            queue_capacity = self.inner.queue_capacity,
            "audio channel open"
        );
        Ok(())
    }

    /// Queue one frame for sending. Never waits: with `queue_capacity`
    /// frames pending the call fails with `Backpressure` and the frame is
    /// not queued.
    pub fn send_audio(&self, frame: Bytes) -> Result<()> {
        let guard = self.lock_queue();
        let Some(queue) = guard.as_ref() else {
            return Err(VoxlinkError::NotReady(format!(
                "audio channel {}",
                self.state()
            )));
        };
        let slot = queue.slots.clone().try_acquire_owned().map_err(|e| match e {
            TryAcquireError::NoPermits => VoxlinkError::Backpressure,
            TryAcquireError::Closed => closed_channel(),
        })?;
        queue.tx.try_send((frame, slot)).map_err(|e| match e {
            TrySendError::Full(_) => VoxlinkError::Backpressure,
            TrySendError::Closed(_) => closed_channel(),
        })
    }

    /// Release the socket. Pending frames are discarded. No-op when not open.
    pub async fn close(&self, cancel: &CancellationToken) -> Result<()> {
        let Some(tasks) = self.lock_tasks().take() else {
            return Ok(());
        };
        self.lock_queue().take();
        self.inner.state.send_if_modified(|s| {
            if s.is_open() {
                *s = ConnectionState::Closing;
                true
            } else {
                false
            }
        });

        let AudioTasks {
            shutdown,
            mut writer,
            mut reader,
        } = tasks;
        shutdown.cancel();

        let outcome = {
            let joined = async {
                let _ = (&mut writer).await;
                let _ = (&mut reader).await;
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(VoxlinkError::Cancelled),
                r = tokio::time::timeout(self.inner.close_timeout, joined) => {
                    if r.is_err() {
                        tracing::warn!("audio tasks did not stop in time");
                    }
                    Ok(())
                }
            }
        };

        writer.abort();
        reader.abort();
        self.inner.state.send_replace(ConnectionState::Closed);
        outcome
    }

    async fn read_loop(self, mut stream: Box<dyn FrameStream>, shutdown: CancellationToken) {
        let reason = loop {
            tokio::select! {
                _ = shutdown.cancelled() => break "closed by client",
                incoming = stream.recv() => match incoming {
                    None => break "socket closed",
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "audio read failed");
                        break "read failed";
                    }
                    Some(Ok(WireFrame::Close(_))) => break "closed by server",
                    Some(Ok(WireFrame::Binary(frame))) => self.deliver(frame),
                    Some(Ok(WireFrame::Text(text))) => {
                        tracing::debug!(len = text.len(), "text frame on audio channel ignored");
                    }
                },
            }
        };

        shutdown.cancel();
        self.inner.state.send_replace(ConnectionState::Closed);
        tracing::info!(reason, "audio channel closed");
    }

    fn deliver(&self, frame: Bytes) {
        let handlers: Vec<AudioHandler> = self
            .inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for handler in handlers {
            let frame = frame.clone();
            match std::panic::catch_unwind(AssertUnwindSafe(|| handler(frame))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "audio handler failed"),
                Err(_) => tracing::error!("audio handler panicked"),
            }
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, Option<AudioQueue>> {
        self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Option<AudioTasks>> {
        self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn closed_channel() -> VoxlinkError {
    VoxlinkError::TransportClosed("audio channel closed".into())
}

async fn write_loop(
    mut sink: Box<dyn FrameSink>,
    mut rx: mpsc::Receiver<Queued>,
    slots: Arc<Semaphore>,
    shutdown: CancellationToken,
) {
    let mut discarded = 0usize;
    loop {
        let (frame, slot) = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = rx.recv() => match next {
                Some(queued) => queued,
                None => break,
            },
        };
        let sent = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            r = sink.send(WireFrame::Binary(frame)) => Some(r),
        };
        drop(slot);
        match sent {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                tracing::warn!(error = %e, "audio write failed");
                shutdown.cancel();
                break;
            }
            None => {
                discarded += 1;
                break;
            }
        }
    }

    // Stop accepting frames before the socket goes away.
    slots.close();
    rx.close();
    while rx.try_recv().is_ok() {
        discarded += 1;
    }
    if discarded > 0 {
        tracing::warn!(discarded, "pending audio frames discarded");
    }
    if let Err(e) = sink.close().await {
        tracing::debug!(error = %e, "audio close frame not sent");
    }
}
