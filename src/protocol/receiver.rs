//! Frame receiver for incrementally delivered bytes.
//!
//! Implements the receive state machine:
//! - `Idle`: hunting for the start-of-message marker
//! - `ReadingHeader`: collecting the command and length bytes
//! - `ReadingData`: collecting `length` payload bytes
//!
//! Output never depends on how the input was chunked. A frame fed through
//! the timed entry points ([`push_at`](FrameReceiver::push_at),
//! [`consume_at`](FrameReceiver::consume_at)) is dropped once it stays
//! incomplete longer than the configured RX timeout.
//!
//! # Example
//!
//! ```ignore
//! use ca821x_link::protocol::FrameReceiver;
//!
//! let mut receiver = FrameReceiver::with_start_marker(0xDE);
//!
//! // Bytes arrive in arbitrary pieces from the serial port
//! let frames = receiver.push(&chunk);
//!
//! for frame in frames {
//!     println!("Got {}", frame.command());
//! }
//! ```

use std::collections::VecDeque;

use super::command::CommandId;
use super::frame::{Frame, DEFAULT_START_MARKER, HEADER_SIZE, MAX_PAYLOAD_LEN};
use crate::config::{LinkConfig, DEFAULT_RX_QUEUE_DEPTH};

/// Receive state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    /// Waiting for the start-of-message marker.
    Idle,
    /// Marker seen, `filled` header bytes collected.
    ReadingHeader { filled: usize },
    /// Header complete, `filled` of `length` payload bytes collected.
    ReadingData {
        command: CommandId,
        length: usize,
        filled: usize,
    },
}

/// Byte-stream parser that turns raw input into [`Frame`]s.
///
/// Partial frames are held in fixed buffers sized for the largest frame.
/// Completed frames are either returned directly ([`push`](Self::push)) or
/// parked in a bounded queue ([`consume`](Self::consume)).
pub struct FrameReceiver {
    start_marker: u8,
    state: RxState,
    header: [u8; HEADER_SIZE],
    data: [u8; MAX_PAYLOAD_LEN],
    queue: VecDeque<Frame>,
    queue_depth: usize,
    rx_timeout_ms: Option<u32>,
    /// Time of the current timed feed.
    stamp: Option<u32>,
    /// When the marker of the partial frame was seen.
    started_at: Option<u32>,
    discarded: u64,
    overwritten: u64,
    timeouts: u64,
}

impl FrameReceiver {
    /// Create a receiver from link settings.
    pub fn new(config: &LinkConfig) -> Self {
        let queue_depth = config.rx_queue_depth.max(1);
        Self {
            start_marker: config.start_marker,
            state: RxState::Idle,
            header: [0; HEADER_SIZE],
            data: [0; MAX_PAYLOAD_LEN],
            queue: VecDeque::with_capacity(queue_depth),
            queue_depth,
            rx_timeout_ms: config.rx_timeout_ms,
            stamp: None,
            started_at: None,
            discarded: 0,
            overwritten: 0,
            timeouts: 0,
        }
    }

    /// Create a receiver with default queue depth and a custom marker.
    pub fn with_start_marker(start_marker: u8) -> Self {
        Self::new(
            &LinkConfig::default()
                .with_start_marker(start_marker)
                .with_rx_queue_depth(DEFAULT_RX_QUEUE_DEPTH),
        )
    }

    /// Feed bytes and return every completed frame.
    ///
    /// Frames still parked in the queue from earlier [`consume`](Self::consume)
    /// calls come first, so arrival order is kept.
    pub fn push(&mut self, input: &[u8]) -> Vec<Frame> {
        let mut frames: Vec<Frame> = self.queue.drain(..).collect();

        let mut rest = input;
        while !rest.is_empty() {
            let (used, frame) = self.advance(rest);
            rest = &rest[used..];
            frames.extend(frame);
        }

        frames
    }

    /// Feed bytes, parking completed frames in the bounded queue.
    ///
    /// When the queue is full the oldest unread frame is overwritten.
    /// Returns the number of frames completed by this call.
    pub fn consume(&mut self, input: &[u8]) -> usize {
        let mut completed = 0;

        let mut rest = input;
        while !rest.is_empty() {
            let (used, frame) = self.advance(rest);
            rest = &rest[used..];
            if let Some(frame) = frame {
                completed += 1;
                self.enqueue(frame);
            }
        }

        completed
    }

    /// [`push`](Self::push) bytes that arrived at `now_ms`.
    ///
    /// A partial frame older than the RX timeout is dropped first.
    pub fn push_at(&mut self, now_ms: u32, input: &[u8]) -> Vec<Frame> {
        self.expire(now_ms);
        self.stamp = Some(now_ms);
        let frames = self.push(input);
        self.stamp = None;
        frames
    }

    /// [`consume`](Self::consume) bytes that arrived at `now_ms`.
    ///
    /// A partial frame older than the RX timeout is dropped first.
    pub fn consume_at(&mut self, now_ms: u32, input: &[u8]) -> usize {
        self.expire(now_ms);
        self.stamp = Some(now_ms);
        let completed = self.consume(input);
        self.stamp = None;
        completed
    }

    /// Drop the partial frame if it started more than the RX timeout
    /// before `now_ms`. Returns true if one was dropped.
    ///
    /// Only frames whose marker arrived through a timed entry point expire.
    pub fn expire(&mut self, now_ms: u32) -> bool {
        let (timeout_ms, started_at) = match (self.rx_timeout_ms, self.started_at) {
            (Some(timeout_ms), Some(started_at)) => (timeout_ms, started_at),
            _ => return false,
        };
        if self.is_idle() || now_ms.wrapping_sub(started_at) <= timeout_ms {
            return false;
        }

        tracing::warn!("RX timed out in state {:?}", self.state);
        self.state = RxState::Idle;
        self.started_at = None;
        self.timeouts += 1;
        true
    }

    /// Take the oldest parked frame.
    pub fn next_frame(&mut self) -> Option<Frame> {
        self.queue.pop_front()
    }

    /// Number of parked frames.
    pub fn pending_frames(&self) -> usize {
        self.queue.len()
    }

    /// Drop any partially received frame and return to `Idle`.
    ///
    /// Parked frames are kept.
    pub fn reset(&mut self) {
        if self.state != RxState::Idle {
            tracing::debug!("Discarding partial frame in state {:?}", self.state);
        }
        self.state = RxState::Idle;
        self.started_at = None;
    }

    /// True when no frame is in progress.
    pub fn is_idle(&self) -> bool {
        self.state == RxState::Idle
    }

    /// Current receive state.
    pub fn state(&self) -> RxState {
        self.state
    }

    /// Start-of-message byte this receiver hunts for.
    pub fn start_marker(&self) -> u8 {
        self.start_marker
    }

    /// Bytes skipped while hunting for the start marker.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Parked frames lost to queue overflow.
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }

    /// Partial frames dropped by the RX timeout.
    pub fn timeouts(&self) -> u64 {
        self.timeouts
    }

    /// Partial frame timeout in milliseconds.
    pub fn rx_timeout_ms(&self) -> Option<u32> {
        self.rx_timeout_ms
    }

    fn enqueue(&mut self, frame: Frame) {
        if self.queue.len() >= self.queue_depth {
            if let Some(lost) = self.queue.pop_front() {
                self.overwritten += 1;
                tracing::warn!("RX queue full, overwriting unread {}", lost.command());
            }
        }
        self.queue.push_back(frame);
    }

    /// Run the state machine until one frame completes or input runs out.
    ///
    /// Returns the number of bytes used and the completed frame, if any.
    fn advance(&mut self, input: &[u8]) -> (usize, Option<Frame>) {
        let mut pos = 0;

        while pos < input.len() {
            match self.state {
                RxState::Idle => {
                    let byte = input[pos];
                    pos += 1;
                    if byte == self.start_marker {
                        self.state = RxState::ReadingHeader { filled: 0 };
                        self.started_at = self.stamp;
                    } else {
                        self.discarded += 1;
                        tracing::warn!("No start marker, got 0x{:02X}", byte);
                    }
                }

                RxState::ReadingHeader { filled } => {
                    self.header[filled] = input[pos];
                    pos += 1;

                    let filled = filled + 1;
                    if filled < HEADER_SIZE {
                        self.state = RxState::ReadingHeader { filled };
                        continue;
                    }

                    let command = CommandId(self.header[0]);
                    let length = self.header[1] as usize;
                    if length == 0 {
                        self.state = RxState::Idle;
                        return (pos, Some(self.emit(command, 0)));
                    }
                    self.state = RxState::ReadingData {
                        command,
                        length,
                        filled: 0,
                    };
                }

                RxState::ReadingData {
                    command,
                    length,
                    filled,
                } => {
                    let take = (length - filled).min(input.len() - pos);
                    self.data[filled..filled + take].copy_from_slice(&input[pos..pos + take]);
                    pos += take;

                    let filled = filled + take;
                    if filled == length {
                        self.state = RxState::Idle;
                        return (pos, Some(self.emit(command, length)));
                    }
                    self.state = RxState::ReadingData {
                        command,
                        length,
                        filled,
                    };
                }
            }
        }

        (pos, None)
    }

    fn emit(&self, command: CommandId, length: usize) -> Frame {
        tracing::debug!("Received {} with {} byte payload", command, length);
        Frame::from_parts(command, &self.data[..length])
    }
}

impl Default for FrameReceiver {
    fn default() -> Self {
        Self::with_start_marker(DEFAULT_START_MARKER)
    }
}
