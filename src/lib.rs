//! # ca821x-link
//!
//! Host-side command/response link to a CA-821x IEEE 802.15.4 radio.
//!
//! The radio is driven over a byte-oriented transport (UART, SPI bridge,
//! USB HID) carrying `[SOM][cmd][len][data]` frames. Requests flow down;
//! confirms and indications flow up.
//!
//! ## Architecture
//!
//! - **Frame receiver**: rebuilds frames from arbitrarily chunked input
//! - **Dispatcher**: sends requests, correlates the single outstanding
//!   synchronous confirm, routes indications to registered handlers
//! - **Tasklet scheduler**: fixed-capacity, wraparound-safe timer queue
//!   bounding waits and running deferred work
//!
//! Everything runs cooperatively on one thread: a poll loop pulls bytes,
//! dispatches completed frames and fires due tasklets. Blocking calls such
//! as [`Dispatcher::downstream`] drive that same loop until they finish.
//!
//! ## Example
//!
//! ```ignore
//! use ca821x_link::{CommandId, Dispatcher, Disposition, Frame, LinkConfig, SystemClock};
//! use ca821x_link::transport::IoPort;
//!
//! let port = IoPort::new(serial);
//! let mut dispatcher: Dispatcher<_> = Dispatcher::builder(port)
//!     .config(LinkConfig::default())
//!     .clock(SystemClock::shared())
//!     .handle(CommandId::MCPS_DATA_INDICATION, |frame: &Frame| {
//!         println!("rx {:02X?}", frame.payload());
//!         Ok(Disposition::Handled)
//!     })
//!     .build()?;
//!
//! // MLME-GET.request for phyCurrentChannel
//! let request = Frame::new(CommandId::MLME_GET_REQUEST, vec![0x00, 0x00])?;
//! let confirm = dispatcher.downstream(&request)?;
//!
//! loop {
//!     dispatcher.poll()?;
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod tasklet;
pub mod transport;

pub use config::LinkConfig;
pub use dispatch::{Dispatcher, DispatcherBuilder, Disposition};
pub use error::{LinkError, Result};
pub use protocol::{CommandId, Frame, FrameReceiver};
pub use tasklet::{Clock, ManualClock, Scheduler, SystemClock, TaskletId};
