//! The transport capability surface: four primitives —
//! service, subscription, request handler, command handler — implemented
//! identically by every back-end. The choice of back-end is a run-time
//! policy (see [`crate::from_addr`]), never a compile-time constraint —
//! several interchangeable back-ends implement one shared contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::buffer::Buffer;
use crate::error::Result;

/// Server side of a pub/sub channel: every connected subscriber receives
/// every published value, in publication order.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;
    async fn publish(&self, payload: Buffer) -> Result<()>;
}

/// Client side of a pub/sub channel.
#[async_trait]
pub trait Subscription: Send + Sync {
    fn channel(&self) -> &str;
    async fn unsubscribe(&self) -> Result<()>;
}

/// A slot invoked on the client's dispatch thread for each publication.
pub type SlotFn = Arc<dyn Fn(Buffer) + Send + Sync>;

/// A name-addressed RPC endpoint; closing it stops answering new requests.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn close(&self) -> Result<()>;
}

/// The server-side hook that turns a request [`Buffer`] into a response
/// one.
pub type RequestHandlerFn = Arc<dyn Fn(Buffer) -> Buffer + Send + Sync>;

/// A fire-and-forget command endpoint.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn close(&self) -> Result<()>;
}

pub type CommandHandlerFn = Arc<dyn Fn(Buffer) + Send + Sync>;

/// One transport back-end. Two interchangeable implementations exist
/// ([`crate::binary_bus::BinaryBus`], [`crate::websocket_bus::WebSocketBus`]);
/// their observable contracts are identical modulo which [`crate::Error`]
/// variants they surface.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Creates (server-side) a named publish channel. Fails
    /// `ALREADY_PRESENT` if the name is taken.
    async fn create_service(&self, name: &str) -> Result<Arc<dyn Service>>;

    /// Attaches `slot` to the named channel. Fails `NOT_FOUND` if no
    /// service has been created under that name yet.
    async fn subscribe(&self, name: &str, slot: SlotFn) -> Result<Arc<dyn Subscription>>;

    /// Registers a request handler under `name`. Fails `ALREADY_PRESENT`
    /// if the name is taken.
    async fn create_request_handler(&self, name: &str, handler: RequestHandlerFn) -> Result<Arc<dyn RequestHandler>>;

    /// Blocks the caller until a response arrives or `timeout` elapses.
    /// Expiry is a terminal `TIMEOUT` error, never a retry.
    async fn send_request(&self, name: &str, payload: Buffer, timeout: Duration) -> Result<Buffer>;

    /// Registers a command handler under `name`. Fails `ALREADY_PRESENT`
    /// if the name is taken.
    async fn create_command_handler(&self, name: &str, handler: CommandHandlerFn) -> Result<Arc<dyn CommandHandler>>;

    /// Sends a fire-and-forget command. `blocking` waits for the remote
    /// side to acknowledge reception (not completion); non-blocking
    /// returns as soon as the command is queued for delivery.
    async fn send_command(&self, name: &str, payload: Buffer, blocking: bool) -> Result<()>;
}
