//! WebSocket session with correlated, deadline-bounded listening.
//!
//! The transport pushes frames from its own reader task; callers want an
//! ordinary blocking call. The session bridges the two with a bounded FIFO
//! frame queue drained by [`WsClient::listen`], a write-once
//! [`ErrorLatch`](crate::mcp::latch::ErrorLatch) for terminal transport
//! failures, and a bounded worker pool for user-registered hooks so slow
//! hook code never stalls the reader.
//!
//! A client owns exactly one session and is a single-consumer primitive:
//! two concurrent `listen` calls on the same client are not supported. Run
//! one client per concurrent handshake.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::mcp::error::{ConnectError, ListenError, SendError, TransportError};
use crate::mcp::latch::ErrorLatch;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_SESSION_BUDGET: Duration = Duration::from_secs(5);
const DEFAULT_QUEUE_CAPACITY: usize = 100;
const DEFAULT_MAX_FRAME_BYTES: usize = 8 * 1024;
const DEFAULT_CALLBACK_QUEUE: usize = 64;
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An inbound frame in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Hook invoked for every inbound text frame.
pub type TextHook = Arc<dyn Fn(String) + Send + Sync>;
/// Hook invoked for every inbound binary frame.
pub type BinaryHook = Arc<dyn Fn(Vec<u8>) + Send + Sync>;
/// Hook invoked once when the transport fails.
pub type ErrorHook = Arc<dyn Fn(TransportError) + Send + Sync>;

type CallbackJob = Box<dyn FnOnce() + Send + 'static>;

/// Bounded worker pool for hook dispatch.
///
/// Hooks are advisory: when the pool's queue is full the dispatch is
/// dropped with a warning rather than stalling the transport reader. Must
/// be created inside a tokio runtime. One pool can be shared across
/// sessions through [`ConnectionConfig::callback_pool`].
pub struct CallbackPool {
    jobs: mpsc::Sender<CallbackJob>,
    workers: usize,
}

impl CallbackPool {
    pub fn new(workers: usize, queue_capacity: usize) -> Arc<Self> {
        let workers = workers.max(1);
        let (jobs, job_rx) = mpsc::channel::<CallbackJob>(queue_capacity.max(1));
        let job_rx = Arc::new(Mutex::new(job_rx));
        for _ in 0..workers {
            let job_rx = Arc::clone(&job_rx);
            tokio::spawn(async move {
                loop {
                    let job = { job_rx.lock().await.recv().await };
                    match job {
                        Some(job) => job(),
                        None => break,
                    }
                }
            });
        }
        Arc::new(Self { jobs, workers })
    }

    fn with_default_size() -> Arc<Self> {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::new(workers, DEFAULT_CALLBACK_QUEUE)
    }

    fn dispatch(&self, job: CallbackJob) {
        if self.jobs.try_send(job).is_err() {
            warn!(workers = self.workers, "callback pool saturated, hook dispatch dropped");
        }
    }
}

impl fmt::Debug for CallbackPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackPool")
            .field("workers", &self.workers)
            .finish()
    }
}

/// Immutable parameters for one WebSocket session.
///
/// Plain options record; construct with [`ConnectionConfig::new`] and
/// override fields as needed before connecting.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Target address (`ws://` or `wss://`).
    pub address: String,
    /// Extra handshake headers as name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Hard upper bound on connect + WebSocket handshake.
    pub connect_timeout: Duration,
    /// Total budget shared by every `listen` call on the session. The
    /// deadline is anchored at successful connect and never resets.
    pub session_budget: Duration,
    /// Capacity of the inbound frame queue. The reader blocks when it is
    /// full; correlated frames are never dropped.
    pub queue_capacity: usize,
    /// Maximum accepted frame/message size in bytes.
    pub max_frame_bytes: usize,
    /// Shared hook worker pool; a private pool is created when absent.
    pub callback_pool: Option<Arc<CallbackPool>>,
    /// Hook for inbound text frames.
    pub on_text: Option<TextHook>,
    /// Hook for inbound binary frames.
    pub on_binary: Option<BinaryHook>,
    /// Hook for the terminal transport failure.
    pub on_error: Option<ErrorHook>,
}

impl ConnectionConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            headers: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            session_budget: DEFAULT_SESSION_BUDGET,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            callback_pool: None,
            on_text: None,
            on_binary: None,
            on_error: None,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("address", &self.address)
            .field("headers", &self.headers.len())
            .field("connect_timeout", &self.connect_timeout)
            .field("session_budget", &self.session_budget)
            .field("queue_capacity", &self.queue_capacity)
            .field("max_frame_bytes", &self.max_frame_bytes)
            .finish()
    }
}

struct Hooks {
    on_text: Option<TextHook>,
    on_binary: Option<BinaryHook>,
    on_error: Option<ErrorHook>,
    pool: Arc<CallbackPool>,
}

impl Hooks {
    fn dispatch(&self, job: impl FnOnce() + Send + 'static) {
        self.pool.dispatch(Box::new(job));
    }
}

/// One live WebSocket session.
///
/// No reconnect: once closed or failed, build a fresh client for a retry.
pub struct WsClient {
    sink: Mutex<Option<SplitSink<WsStream, Message>>>,
    frames: Mutex<mpsc::Receiver<InboundFrame>>,
    latch: ErrorLatch,
    deadline: Instant,
    closed: AtomicBool,
    reader: StdMutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for WsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsClient")
            .field("deadline", &self.deadline)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl WsClient {
    /// Open a session, bounded by the configured connect timeout.
    ///
    /// On any failure no resources are left open.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, ConnectError> {
        let mut request = config.address.as_str().into_client_request().map_err(|err| {
            ConnectError::InvalidRequest {
                address: config.address.clone(),
                reason: err.to_string(),
            }
        })?;
        for (name, value) in &config.headers {
            let name: HeaderName =
                name.parse().map_err(|_| ConnectError::InvalidRequest {
                    address: config.address.clone(),
                    reason: format!("invalid header name: {name}"),
                })?;
            let value = HeaderValue::from_str(value).map_err(|_| ConnectError::InvalidRequest {
                address: config.address.clone(),
                reason: format!("invalid value for header {name}"),
            })?;
            request.headers_mut().append(name, value);
        }

        let ws_config = WebSocketConfig::default()
            .max_message_size(Some(config.max_frame_bytes))
            .max_frame_size(Some(config.max_frame_bytes));

        let (stream, _response) = tokio::time::timeout(
            config.connect_timeout,
            connect_async_with_config(request, Some(ws_config), false),
        )
        .await
        .map_err(|_| ConnectError::Timeout(config.connect_timeout))?
        .map_err(|err| ConnectError::Handshake(err.to_string()))?;

        debug!(address = %config.address, "websocket session established");

        let (sink, stream) = stream.split();
        let (frame_tx, frame_rx) = mpsc::channel(config.queue_capacity.max(1));
        let latch = ErrorLatch::new();
        let hooks = Hooks {
            on_text: config.on_text,
            on_binary: config.on_binary,
            on_error: config.on_error,
            pool: config
                .callback_pool
                .unwrap_or_else(CallbackPool::with_default_size),
        };
        let reader = tokio::spawn(route_inbound(stream, frame_tx, latch.clone(), hooks));

        Ok(Self {
            sink: Mutex::new(Some(sink)),
            frames: Mutex::new(frame_rx),
            latch,
            deadline: Instant::now() + config.session_budget,
            closed: AtomicBool::new(false),
            reader: StdMutex::new(Some(reader)),
        })
    }

    /// Whether the session has been closed or has latched a failure.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.latch.is_set()
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), SendError> {
        self.send_message(Message::text(text.into())).await
    }

    pub async fn send_binary(&self, data: Vec<u8>) -> Result<(), SendError> {
        self.send_message(Message::binary(data)).await
    }

    /// Serialize a payload and send it as a text frame.
    pub async fn send_json<T: Serialize>(&self, payload: &T) -> Result<(), SendError> {
        let json = serde_json::to_string(payload)?;
        self.send_message(Message::text(json)).await
    }

    async fn send_message(&self, message: Message) -> Result<(), SendError> {
        if let Some(cause) = self.latch.get() {
            return Err(SendError::Closed(cause));
        }
        let mut sink = self.sink.lock().await;
        let Some(sink) = sink.as_mut() else {
            return Err(SendError::Closed(TransportError::closed_locally()));
        };
        sink.send(message)
            .await
            .map_err(|err| SendError::Io(err.to_string()))
    }

    /// Collect frames in arrival order until `predicate` matches, then
    /// close the session.
    ///
    /// The returned list is the minimal prefix of the inbound stream whose
    /// last frame satisfies the predicate. Fails with
    /// [`ListenError::Timeout`] when the shared session budget runs out,
    /// or with the latched transport cause.
    pub async fn listen<P>(&self, predicate: P) -> Result<Vec<InboundFrame>, ListenError>
    where
        P: FnMut(&InboundFrame) -> bool,
    {
        let collected = self.listen_keep_open(predicate).await?;
        self.close().await;
        Ok(collected)
    }

    /// Same as [`listen`](Self::listen) but leaves the session open after a
    /// successful match, for multi-step exchanges reusing one connection.
    ///
    /// A timed-out or failed wait still tears the session down: there is no
    /// dangling open socket after an unsuccessful listen.
    pub async fn listen_keep_open<P>(
        &self,
        predicate: P,
    ) -> Result<Vec<InboundFrame>, ListenError>
    where
        P: FnMut(&InboundFrame) -> bool,
    {
        let result = {
            let mut frames = self.frames.lock().await;
            self.collect_until(&mut frames, predicate).await
        };
        if result.is_err() {
            self.close().await;
        }
        result
    }

    async fn collect_until<P>(
        &self,
        frames: &mut mpsc::Receiver<InboundFrame>,
        mut predicate: P,
    ) -> Result<Vec<InboundFrame>, ListenError>
    where
        P: FnMut(&InboundFrame) -> bool,
    {
        let mut latch_rx = self.latch.subscribe();
        let mut collected = Vec::new();

        loop {
            if let Some(cause) = self.latch.get() {
                return Err(ListenError::Transport(cause));
            }
            if Instant::now() >= self.deadline {
                return Err(ListenError::Timeout);
            }

            tokio::select! {
                frame = frames.recv() => match frame {
                    Some(frame) => {
                        let done = predicate(&frame);
                        collected.push(frame);
                        if done {
                            return Ok(collected);
                        }
                    }
                    // Reader gone; the cause is latched (or will be picked
                    // up as a plain close on the next iteration).
                    None => {
                        let cause = self
                            .latch
                            .get()
                            .unwrap_or(TransportError::Closed { reason: None });
                        return Err(ListenError::Transport(cause));
                    }
                },
                _ = latch_rx.changed() => {}
                _ = tokio::time::sleep_until(self.deadline) => {
                    return Err(ListenError::Timeout);
                }
            }
        }
    }

    /// Close the session. Idempotent and safe to race from the timeout
    /// path, the normal-completion path and external callers; after it
    /// returns no further frames are routed.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut reader) = self.reader.lock() {
            if let Some(handle) = reader.take() {
                handle.abort();
            }
        }
        if let Some(mut sink) = self.sink.lock().await.take() {
            // Best effort: a dead peer must not hold up teardown.
            let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, async {
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
            })
            .await;
        }
        self.latch.set(TransportError::closed_locally());
        debug!("websocket session closed");
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        if let Ok(mut reader) = self.reader.lock() {
            if let Some(handle) = reader.take() {
                handle.abort();
            }
        }
    }
}

/// Reader task: routes every inbound frame into the bounded queue and
/// dispatches registered hooks; latches the first transport failure.
async fn route_inbound(
    mut stream: SplitStream<WsStream>,
    frames: mpsc::Sender<InboundFrame>,
    latch: ErrorLatch,
    hooks: Hooks,
) {
    while let Some(next) = stream.next().await {
        match next {
            Ok(Message::Text(text)) => {
                let text = text.as_str().to_owned();
                if let Some(hook) = hooks.on_text.clone() {
                    let payload = text.clone();
                    hooks.dispatch(move || hook(payload));
                }
                if frames.send(InboundFrame::Text(text)).await.is_err() {
                    break;
                }
            }
            Ok(Message::Binary(data)) => {
                let data = data.to_vec();
                if let Some(hook) = hooks.on_binary.clone() {
                    let payload = data.clone();
                    hooks.dispatch(move || hook(payload));
                }
                if frames.send(InboundFrame::Binary(data)).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|frame| frame.reason.as_str().to_owned())
                    .filter(|reason| !reason.is_empty());
                debug!(reason = ?reason, "peer closed websocket");
                latch.set(TransportError::Closed { reason });
                break;
            }
            // Ping/pong replies are handled by the protocol stack.
            Ok(_) => {}
            Err(err) => {
                let cause = TransportError::Io(err.to_string());
                warn!(error = %cause, "websocket transport error");
                if let Some(hook) = hooks.on_error.clone() {
                    let payload = cause.clone();
                    hooks.dispatch(move || hook(payload));
                }
                latch.set(cause);
                break;
            }
        }
    }
    // Stream exhausted without a close frame still counts as closed.
    latch.set(TransportError::Closed { reason: None });
}
