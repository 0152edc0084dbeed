//! RXRDY/RXFAIL flow control for UART links.
//!
//! Links without hardware flow control acknowledge every frame. The
//! receiver answers each complete frame with an empty `EVBME_RXRDY` and
//! each timed-out partial frame with an empty `EVBME_RXFAIL`. A sender
//! stalls after every transmission until the peer's RXRDY arrives, and
//! retransmits its last frame on RXFAIL.
//!
//! A stall ends after the ack timeout. Once [`MAX_MISSED_ACKS`] acks in a
//! row are missed the peer is treated as not acknowledging and
//! transmissions stop stalling until the next RXRDY.

use crate::config::LinkConfig;
use crate::protocol::{CommandId, Frame};

/// Consecutive missed acks before stalling is given up.
pub const MAX_MISSED_ACKS: u8 = 5;

/// Acknowledgement frame received from the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// `EVBME_RXRDY`: the last transmission arrived.
    Ready,
    /// `EVBME_RXFAIL`: the last transmission was lost.
    Fail,
}

impl Ack {
    /// Classify an inbound frame. Only empty RXRDY/RXFAIL frames are acks.
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        if !frame.is_empty() {
            return None;
        }
        match frame.command() {
            CommandId::EVBME_RXRDY => Some(Ack::Ready),
            CommandId::EVBME_RXFAIL => Some(Ack::Fail),
            _ => None,
        }
    }

    /// The empty frame carrying this ack.
    pub fn frame(self) -> Frame {
        match self {
            Ack::Ready => Frame::empty(CommandId::EVBME_RXRDY),
            Ack::Fail => Frame::empty(CommandId::EVBME_RXFAIL),
        }
    }
}

/// Transmit-side ack tracking.
#[derive(Debug)]
pub struct Handshake {
    enabled: bool,
    ack_timeout_ms: u32,
    stalled_since: Option<u32>,
    last_sent: Option<Frame>,
    missed: u8,
}

impl Handshake {
    /// Create from link settings.
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            enabled: config.handshake,
            ack_timeout_ms: config.ack_timeout_ms,
            stalled_since: None,
            last_sent: None,
            missed: 0,
        }
    }

    /// True when acks are exchanged on this link.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// True while waiting for the peer's RXRDY.
    pub fn is_stalled(&self) -> bool {
        self.stalled_since.is_some()
    }

    /// Consecutive acks missed.
    pub fn missed(&self) -> u8 {
        self.missed
    }

    /// Milliseconds left before the current stall times out.
    pub fn remaining(&self, now_ms: u32) -> Option<u32> {
        self.stalled_since.map(|since| {
            self.ack_timeout_ms
                .saturating_sub(now_ms.wrapping_sub(since))
        })
    }

    /// Record a transmission made at `now_ms`.
    pub(crate) fn sent(&mut self, frame: &Frame, now_ms: u32) {
        if !self.enabled {
            return;
        }
        self.last_sent = Some(frame.clone());
        if self.missed < MAX_MISSED_ACKS {
            self.stalled_since = Some(now_ms);
        }
    }

    /// End a stall whose ack timeout has passed. Returns true if one ended.
    pub(crate) fn expire(&mut self, now_ms: u32) -> bool {
        match self.stalled_since {
            Some(since) if now_ms.wrapping_sub(since) > self.ack_timeout_ms => {
                self.stalled_since = None;
                self.missed = self.missed.saturating_add(1);
                tracing::warn!("Ack missed ({} in a row)", self.missed);
                true
            }
            _ => false,
        }
    }

    /// Apply an ack from the peer.
    ///
    /// Returns the frame to retransmit for [`Ack::Fail`].
    pub(crate) fn receive(&mut self, ack: Ack, now_ms: u32) -> Option<Frame> {
        self.missed = 0;
        match ack {
            Ack::Ready => {
                tracing::trace!("Processed ack");
                self.stalled_since = None;
                None
            }
            Ack::Fail => {
                tracing::debug!("Received nack");
                let resend = self.last_sent.clone();
                if resend.is_some() {
                    self.stalled_since = Some(now_ms);
                }
                resend
            }
        }
    }
}
