//! The message transport: a move-only [`Buffer`] envelope
//! carried over one of two interchangeable back-ends, selected at runtime
//! by URL scheme.

pub mod binary_bus;
pub mod buffer;
pub mod error;
pub mod from_addr;
pub mod transport;
pub mod websocket_bus;

pub use binary_bus::BinaryBus;
pub use buffer::Buffer;
pub use error::{Error, Result};
pub use from_addr::from_addr;
pub use transport::{
    CommandHandler, CommandHandlerFn, RequestHandler, RequestHandlerFn, Service, SlotFn,
    Subscription, Transport,
};
pub use websocket_bus::WebSocketBus;
