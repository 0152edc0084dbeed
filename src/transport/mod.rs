//! Transport module - byte source and byte sink abstractions.
//!
//! Provides:
//! - [`ByteSource`] / [`ByteSink`] / [`Port`] traits the dispatcher drives
//! - [`MemoryPort`] for simulation and tests
//! - [`IoPort`] over any non-blocking `std::io` stream
//! - [`spawn_bridge`] to drive an async reader/writer pair from tokio tasks

mod bridge;
mod io;
mod memory;

pub use bridge::{spawn_bridge, BridgePort, BridgeTasks, DEFAULT_BRIDGE_CAPACITY};
pub use io::IoPort;
pub use memory::{MemoryPort, MemoryPortHandle};

use crate::error::Result;

/// Non-blocking source of inbound bytes.
pub trait ByteSource {
    /// Copy available bytes into `buf`.
    ///
    /// Returns the number copied; 0 means nothing is available right now.
    /// Never blocks.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Sink for outbound bytes.
pub trait ByteSink {
    /// Transmit all of `data`.
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Push out anything buffered.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A bidirectional link to the radio.
pub trait Port: ByteSource + ByteSink {}

impl<T: ByteSource + ByteSink> Port for T {}
