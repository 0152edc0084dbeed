//! Link configuration.
//!
//! # Example
//!
//! ```
//! use ca821x_link::LinkConfig;
//!
//! let config = LinkConfig::from_json(r#"{ "sync_timeout_ms": 250 }"#).unwrap();
//! assert_eq!(config.sync_timeout_ms, 250);
//! assert_eq!(config.start_marker, 0xDE);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};
use crate::protocol::DEFAULT_START_MARKER;
use crate::tasklet::HORIZON_MS;

/// Default synchronous response timeout in milliseconds.
pub const DEFAULT_SYNC_TIMEOUT_MS: u32 = 500;

/// Default number of completed frames buffered between polls.
pub const DEFAULT_RX_QUEUE_DEPTH: usize = 7;

/// Default time a partial frame may stay incomplete before it is dropped.
pub const DEFAULT_RX_TIMEOUT_MS: u32 = 200;

/// Default time to wait for the peer's RXRDY after a transmission.
pub const DEFAULT_ACK_TIMEOUT_MS: u32 = 1000;

/// Settings for a [`Dispatcher`](crate::Dispatcher) and its receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Start-of-message byte framing every message.
    pub start_marker: u8,
    /// Timeout applied by `downstream` when none is given.
    pub sync_timeout_ms: u32,
    /// Capacity of the receive queue; the oldest unread frame is overwritten when full.
    pub rx_queue_depth: usize,
    /// Drop a partial frame once it has been incomplete this long. `None` waits forever.
    pub rx_timeout_ms: Option<u32>,
    /// Exchange RXRDY/RXFAIL acks with the peer, for UARTs without flow control.
    pub handshake: bool,
    /// How long a transmission stalls waiting for RXRDY.
    pub ack_timeout_ms: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            start_marker: DEFAULT_START_MARKER,
            sync_timeout_ms: DEFAULT_SYNC_TIMEOUT_MS,
            rx_queue_depth: DEFAULT_RX_QUEUE_DEPTH,
            rx_timeout_ms: Some(DEFAULT_RX_TIMEOUT_MS),
            handshake: false,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
        }
    }
}

impl LinkConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the start-of-message byte.
    pub fn with_start_marker(mut self, marker: u8) -> Self {
        self.start_marker = marker;
        self
    }

    /// Set the default synchronous timeout.
    pub fn with_sync_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.sync_timeout_ms = timeout_ms;
        self
    }

    /// Set the receive queue depth.
    pub fn with_rx_queue_depth(mut self, depth: usize) -> Self {
        self.rx_queue_depth = depth;
        self
    }

    /// Set or disable the partial frame timeout.
    pub fn with_rx_timeout_ms(mut self, timeout_ms: Option<u32>) -> Self {
        self.rx_timeout_ms = timeout_ms;
        self
    }

    /// Turn the RXRDY/RXFAIL handshake on or off.
    pub fn with_handshake(mut self, enabled: bool) -> Self {
        self.handshake = enabled;
        self
    }

    /// Set how long a transmission waits for RXRDY.
    pub fn with_ack_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.ack_timeout_ms = timeout_ms;
        self
    }

    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.rx_queue_depth == 0 {
            return Err(LinkError::InvalidArgs(
                "rx_queue_depth must be at least 1".to_string(),
            ));
        }
        validate_timeout(self.sync_timeout_ms)?;
        if let Some(rx_timeout_ms) = self.rx_timeout_ms {
            validate_timeout(rx_timeout_ms)?;
        }
        validate_timeout(self.ack_timeout_ms)
    }
}

/// Timeouts must be non-zero and below the scheduler horizon.
pub(crate) fn validate_timeout(timeout_ms: u32) -> Result<()> {
    if timeout_ms == 0 || timeout_ms >= HORIZON_MS {
        return Err(LinkError::InvalidArgs(format!(
            "timeout of {}ms outside 1..{}",
            timeout_ms, HORIZON_MS
        )));
    }
    Ok(())
}
