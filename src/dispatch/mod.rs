//! Dispatch module - request/confirm correlation and indication routing.
//!
//! Provides:
//! - [`Dispatcher`] - owns the link, drives the poll loop, runs synchronous calls
//! - [`CallbackTable`] - maps command ids to handlers with a generic fallback
//! - [`Handshake`] - optional RXRDY/RXFAIL acks for UARTs without flow control
//!
//! # Example
//!
//! ```ignore
//! use ca821x_link::dispatch::{Dispatcher, Disposition};
//! use ca821x_link::protocol::{CommandId, Frame};
//!
//! let mut dispatcher: Dispatcher<_> = Dispatcher::new(port, config, clock)?;
//!
//! // Asynchronous indications
//! dispatcher.register(CommandId::MCPS_DATA_INDICATION, |frame: &Frame| {
//!     println!("data {:?}", frame.payload());
//!     Ok(Disposition::Handled)
//! });
//!
//! // Synchronous request
//! let confirm = dispatcher.downstream(&Frame::empty(CommandId::MLME_RESET_REQUEST))?;
//! ```

mod dispatcher;
mod handshake;
mod registry;

pub use dispatcher::{Dispatcher, DispatcherBuilder, WaitKind};
pub use handshake::{Ack, Handshake, MAX_MISSED_ACKS};
pub use registry::{
    CallbackTable, ContextHandler, Dispatched, Disposition, Handler, HandlerResult,
};
