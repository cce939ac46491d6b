//! The WebSocket bus: a [`Transport`] implementation that multiplexes the
//! four primitives over a single `tokio-tungstenite` connection to one peer,
//! addressed by a `ws://`/`wss://` URL. Unlike [`crate::binary_bus::BinaryBus`]
//! there is no shared in-process state between the two sides talking over
//! the socket — each end tracks only its own local subscribers and
//! handlers, and a small control-message protocol carries publications,
//! requests and commands across the wire.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::instrument;

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::transport::{
    CommandHandler, CommandHandlerFn, RequestHandler, RequestHandlerFn, Service, SlotFn,
    Subscription, Transport,
};

type Conn = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Serialize, Deserialize)]
enum WireMessage {
    Publish { channel: String, payload: Option<Vec<u8>> },
    Request { id: u64, name: String, payload: Option<Vec<u8>> },
    Response { id: u64, payload: Option<Vec<u8>> },
    Command { id: u64, name: String, payload: Option<Vec<u8>>, ack: bool },
    Ack { id: u64 },
}

fn encode(buf: &Buffer) -> Option<Vec<u8>> {
    if buf.is_null() {
        None
    } else {
        Some(buf.as_bytes().to_vec())
    }
}

fn decode(payload: Option<Vec<u8>>) -> Buffer {
    match payload {
        Some(bytes) => Buffer::adopt(bytes),
        None => Buffer::null(),
    }
}

fn guarded<R>(f: impl FnOnce() -> R + std::panic::UnwindSafe) -> Result<R> {
    std::panic::catch_unwind(f).map_err(|_| Error::Failure("user callback panicked".into()))
}

struct Inner {
    sink: Mutex<futures::stream::SplitSink<Conn, WsMessage>>,
    subscribers: RwLock<HashMap<String, SlotFn>>,
    request_handlers: RwLock<HashMap<String, RequestHandlerFn>>,
    command_handlers: RwLock<HashMap<String, CommandHandlerFn>>,
    pending_responses: RwLock<HashMap<u64, oneshot::Sender<Buffer>>>,
    pending_acks: RwLock<HashMap<u64, oneshot::Sender<()>>>,
    next_id: AtomicU64,
}

/// One end of a `ws://`/`wss://` connection, carrying all four transport
/// primitives over a single socket.
pub struct WebSocketBus {
    inner: Arc<Inner>,
    reader: tokio::task::JoinHandle<()>,
}

impl WebSocketBus {
    /// Connects to a peer acting as WebSocket server.
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::Failure(format!("websocket connect failed: {e}")))?;
        Ok(Self::from_stream(stream))
    }

    /// Accepts a single inbound connection on `listener` and wraps it.
    pub async fn accept(listener: &tokio::net::TcpListener) -> Result<Self> {
        let (tcp, _peer) = listener
            .accept()
            .await
            .map_err(|e| Error::Failure(format!("accept failed: {e}")))?;
        let stream = tokio_tungstenite::accept_async(MaybeTlsStream::Plain(tcp))
            .await
            .map_err(|e| Error::Failure(format!("websocket handshake failed: {e}")))?;
        Ok(Self::from_stream(stream))
    }

    fn from_stream(stream: Conn) -> Self {
        let (sink, mut source) = stream.split();
        let inner = Arc::new(Inner {
            sink: Mutex::new(sink),
            subscribers: RwLock::new(HashMap::new()),
            request_handlers: RwLock::new(HashMap::new()),
            command_handlers: RwLock::new(HashMap::new()),
            pending_responses: RwLock::new(HashMap::new()),
            pending_acks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        });

        let dispatch_inner = inner.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let Ok(WsMessage::Binary(bytes)) = frame else { continue };
                let Ok(message) = serde_json::from_slice::<WireMessage>(&bytes) else { continue };
                dispatch_inner.handle(message).await;
            }
        });

        Self { inner, reader }
    }

    async fn send(&self, message: &WireMessage) -> Result<()> {
        self.inner.write(message).await
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Inner {
    async fn write(&self, message: &WireMessage) -> Result<()> {
        let bytes = serde_json::to_vec(message)
            .map_err(|e| Error::Failure(format!("wire encode failed: {e}")))?;
        self.sink
            .lock()
            .await
            .send(WsMessage::Binary(bytes))
            .await
            .map_err(|e| Error::Failure(format!("websocket send failed: {e}")))
    }

    async fn handle(self: &Arc<Self>, message: WireMessage) {
        match message {
            WireMessage::Publish { channel, payload } => {
                let slot = self.subscribers.read().unwrap().get(&channel).cloned();
                if let Some(slot) = slot {
                    let buf = decode(payload);
                    let _ = guarded(AssertUnwindSafe(|| slot(buf)));
                }
            }
            WireMessage::Request { id, name, payload } => {
                let handler = self.request_handlers.read().unwrap().get(&name).cloned();
                let Some(handler) = handler else { return };
                let buf = decode(payload);
                let this = self.clone();
                tokio::spawn(async move {
                    let response = guarded(AssertUnwindSafe(|| handler(buf)))
                        .unwrap_or_else(|_| Buffer::null());
                    let msg = WireMessage::Response { id, payload: encode(&response) };
                    if let Ok(bytes) = serde_json::to_vec(&msg) {
                        let _ = this.sink.lock().await.send(WsMessage::Binary(bytes)).await;
                    }
                });
            }
            WireMessage::Response { id, payload } => {
                if let Some(tx) = self.pending_responses.write().unwrap().remove(&id) {
                    let _ = tx.send(decode(payload));
                }
            }
            WireMessage::Command { id, name, payload, ack } => {
                let handler = self.command_handlers.read().unwrap().get(&name).cloned();
                let buf = decode(payload);
                if ack {
                    let msg = WireMessage::Ack { id };
                    if let Ok(bytes) = serde_json::to_vec(&msg) {
                        let _ = self.sink.lock().await.send(WsMessage::Binary(bytes)).await;
                    }
                }
                if let Some(handler) = handler {
                    let _ = guarded(AssertUnwindSafe(|| handler(buf)));
                }
            }
            WireMessage::Ack { id } => {
                if let Some(tx) = self.pending_acks.write().unwrap().remove(&id) {
                    let _ = tx.send(());
                }
            }
        }
    }
}

impl Drop for WebSocketBus {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

struct WsService {
    name: String,
    bus: Arc<Inner>,
}

#[async_trait]
impl Service for WsService {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, payload), fields(channel = %self.name))]
    async fn publish(&self, payload: Buffer) -> Result<()> {
        let message = WireMessage::Publish { channel: self.name.clone(), payload: encode(&payload) };
        self.bus.write(&message).await
    }
}

struct WsSubscription {
    channel: String,
    bus: Arc<Inner>,
}

#[async_trait]
impl Subscription for WsSubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn unsubscribe(&self) -> Result<()> {
        self.bus.subscribers.write().unwrap().remove(&self.channel);
        Ok(())
    }
}

struct WsRequestHandler {
    name: String,
    bus: Arc<Inner>,
}

#[async_trait]
impl RequestHandler for WsRequestHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn close(&self) -> Result<()> {
        self.bus.request_handlers.write().unwrap().remove(&self.name);
        Ok(())
    }
}

struct WsCommandHandler {
    name: String,
    bus: Arc<Inner>,
}

#[async_trait]
impl CommandHandler for WsCommandHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn close(&self) -> Result<()> {
        self.bus.command_handlers.write().unwrap().remove(&self.name);
        Ok(())
    }
}

#[async_trait]
impl Transport for WebSocketBus {
    async fn create_service(&self, name: &str) -> Result<Arc<dyn Service>> {
        Ok(Arc::new(WsService { name: name.to_string(), bus: self.inner.clone() }))
    }

    #[instrument(skip(self, slot))]
    async fn subscribe(&self, name: &str, slot: SlotFn) -> Result<Arc<dyn Subscription>> {
        let mut subscribers = self.inner.subscribers.write().unwrap();
        if subscribers.contains_key(name) {
            return Err(Error::AlreadyPresent(name.to_string()));
        }
        subscribers.insert(name.to_string(), slot);
        drop(subscribers);
        Ok(Arc::new(WsSubscription { channel: name.to_string(), bus: self.inner.clone() }))
    }

    #[instrument(skip(self, handler))]
    async fn create_request_handler(&self, name: &str, handler: RequestHandlerFn) -> Result<Arc<dyn RequestHandler>> {
        let mut handlers = self.inner.request_handlers.write().unwrap();
        if handlers.contains_key(name) {
            return Err(Error::AlreadyPresent(name.to_string()));
        }
        handlers.insert(name.to_string(), handler);
        Ok(Arc::new(WsRequestHandler { name: name.to_string(), bus: self.inner.clone() }))
    }

    #[instrument(skip(self, payload))]
    async fn send_request(&self, name: &str, payload: Buffer, timeout: Duration) -> Result<Buffer> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.inner.pending_responses.write().unwrap().insert(id, tx);
        self.send(&WireMessage::Request { id, name: name.to_string(), payload: encode(&payload) }).await?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(buf)) => Ok(buf),
            Ok(Err(_)) => Err(Error::Failure("response channel dropped".into())),
            Err(_) => {
                self.inner.pending_responses.write().unwrap().remove(&id);
                Err(Error::Timeout(timeout))
            }
        }
    }

    #[instrument(skip(self, handler))]
    async fn create_command_handler(&self, name: &str, handler: CommandHandlerFn) -> Result<Arc<dyn CommandHandler>> {
        let mut handlers = self.inner.command_handlers.write().unwrap();
        if handlers.contains_key(name) {
            return Err(Error::AlreadyPresent(name.to_string()));
        }
        handlers.insert(name.to_string(), handler);
        Ok(Arc::new(WsCommandHandler { name: name.to_string(), bus: self.inner.clone() }))
    }

    #[instrument(skip(self, payload))]
    async fn send_command(&self, name: &str, payload: Buffer, blocking: bool) -> Result<()> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        if blocking {
            self.inner.pending_acks.write().unwrap().insert(id, tx);
        } else {
            drop(tx);
        }
        self.send(&WireMessage::Command { id, name: name.to_string(), payload: encode(&payload), ack: blocking })
            .await?;
        if blocking {
            rx.await.map_err(|_| Error::Failure("ack channel dropped".into()))?;
        }
        Ok(())
    }
}
