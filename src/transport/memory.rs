//! In-memory port.
//!
//! A [`MemoryPort`] is handed to the dispatcher while the matching
//! [`MemoryPortHandle`] plays the radio. Replies registered with
//! [`MemoryPortHandle::reply_to`] are injected as soon as the request is
//! written.
//!
//! # Example
//!
//! ```ignore
//! use ca821x_link::transport::MemoryPort;
//!
//! let (port, radio) = MemoryPort::new(0xDE);
//!
//! // Answer every MLME-GET.request with a confirm
//! radio.reply_to(CommandId::MLME_GET_REQUEST, confirm);
//!
//! let mut dispatcher = Dispatcher::new(port, config, clock)?;
//! let response = dispatcher.downstream(&request)?;
//! ```

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ByteSink, ByteSource};
use crate::error::{LinkError, Result};
use crate::protocol::{CommandId, Frame, FrameReceiver};

#[derive(Default)]
struct Shared {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    replies: HashMap<CommandId, VecDeque<Frame>>,
    fail_writes: bool,
    read_chunk: Option<usize>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// Dispatcher side of an in-memory link.
pub struct MemoryPort {
    shared: Arc<Mutex<Shared>>,
    start_marker: u8,
}

/// Radio side of an in-memory link.
#[derive(Clone)]
pub struct MemoryPortHandle {
    shared: Arc<Mutex<Shared>>,
    start_marker: u8,
}

impl MemoryPort {
    /// Create a connected port and handle framing with `start_marker`.
    pub fn new(start_marker: u8) -> (Self, MemoryPortHandle) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                shared: shared.clone(),
                start_marker,
            },
            MemoryPortHandle {
                shared,
                start_marker,
            },
        )
    }
}

impl ByteSource for MemoryPort {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut shared = lock(&self.shared);
        let limit = shared.read_chunk.unwrap_or(buf.len()).min(buf.len());
        let n = limit.min(shared.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(shared.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl ByteSink for MemoryPort {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut shared = lock(&self.shared);
        if shared.fail_writes {
            return Err(LinkError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write failure injected",
            )));
        }
        shared.outbound.extend_from_slice(data);

        // data[1] is the command byte of a whole encoded frame
        if data.len() >= 3 && data[0] == self.start_marker {
            let command = CommandId(data[1]);
            let reply = shared
                .replies
                .get_mut(&command)
                .and_then(|queue| queue.pop_front());
            if let Some(reply) = reply {
                tracing::debug!("Auto-replying to {} with {}", command, reply.command());
                shared.inbound.extend(reply.encode(self.start_marker));
            }
        }
        Ok(())
    }
}

impl MemoryPortHandle {
    /// Queue raw bytes for the dispatcher to read.
    pub fn inject(&self, bytes: &[u8]) {
        lock(&self.shared).inbound.extend(bytes.iter().copied());
    }

    /// Queue an encoded frame for the dispatcher to read.
    pub fn inject_frame(&self, frame: &Frame) {
        self.inject(&frame.encode(self.start_marker));
    }

    /// Answer the next write of `request` by injecting `reply`.
    ///
    /// Replies queue up per request and are used once each.
    pub fn reply_to(&self, request: CommandId, reply: Frame) {
        lock(&self.shared)
            .replies
            .entry(request)
            .or_default()
            .push_back(reply);
    }

    /// Make every write fail until turned off again.
    pub fn fail_writes(&self, fail: bool) {
        lock(&self.shared).fail_writes = fail;
    }

    /// Limit how many bytes a single read hands out.
    pub fn set_read_chunk(&self, chunk: Option<usize>) {
        lock(&self.shared).read_chunk = chunk.map(|n| n.max(1));
    }

    /// Bytes not yet read by the dispatcher.
    pub fn unread(&self) -> usize {
        lock(&self.shared).inbound.len()
    }

    /// Take everything written so far.
    pub fn written(&self) -> Vec<u8> {
        std::mem::take(&mut lock(&self.shared).outbound)
    }

    /// Take everything written so far, parsed into frames.
    pub fn written_frames(&self) -> Vec<Frame> {
        let bytes = self.written();
        FrameReceiver::with_start_marker(self.start_marker).push(&bytes)
    }
}
