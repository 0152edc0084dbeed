//! Frame struct and wire encoding.
//!
//! A frame is a command identifier plus a payload of at most 255 bytes. On
//! the wire it is preceded by a start-of-message marker and the payload
//! length:
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬─────────────────────┐
//! │ SOM (1B) │ Cmd (1B) │ Len (1B) │ Data (Len bytes)    │
//! └──────────┴──────────┴──────────┴─────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use ca821x_link::protocol::{CommandId, Frame};
//!
//! let frame = Frame::new(CommandId::MLME_GET_REQUEST, vec![0x53, 0x00]).unwrap();
//! assert_eq!(frame.encode(0xDE), vec![0xDE, 0x45, 0x02, 0x53, 0x00]);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::command::CommandId;
use crate::error::{LinkError, Result};

/// Command byte + length byte.
pub const HEADER_SIZE: usize = 2;

/// Largest payload a one-byte length can describe.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// Largest encoded frame: marker, header and a full payload.
pub const MAX_FRAME_LEN: usize = 1 + HEADER_SIZE + MAX_PAYLOAD_LEN;

/// Start-of-message byte used by the UART link.
pub const DEFAULT_START_MARKER: u8 = 0xDE;

/// A complete protocol frame.
///
/// Fields are private so every frame carries at most [`MAX_PAYLOAD_LEN`]
/// payload bytes and its length byte always matches. Frames can only be
/// built through the checked constructors:
///
/// ```compile_fail
/// use ca821x_link::protocol::{CommandId, Frame};
///
/// let frame = Frame {
///     command: CommandId::MCPS_DATA_REQUEST,
///     payload: vec![0u8; 300].into(),
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    command: CommandId,
    payload: Bytes,
}

impl Frame {
    /// Create a frame, rejecting payloads longer than [`MAX_PAYLOAD_LEN`].
    pub fn new(command: impl Into<CommandId>, payload: impl Into<Bytes>) -> Result<Self> {
        let command = command.into();
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(LinkError::InvalidArgs(format!(
                "payload of {} bytes for {} exceeds {} bytes",
                payload.len(),
                command,
                MAX_PAYLOAD_LEN
            )));
        }
        Ok(Self { command, payload })
    }

    /// Create a frame with no payload.
    pub fn empty(command: impl Into<CommandId>) -> Self {
        Self {
            command: command.into(),
            payload: Bytes::new(),
        }
    }

    /// Build a frame from parts the receiver already length-checked.
    pub(crate) fn from_parts(command: CommandId, payload: &[u8]) -> Self {
        Self {
            command,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// Command identifier.
    #[inline]
    pub fn command(&self) -> CommandId {
        self.command
    }

    /// Payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload as a shared buffer.
    #[inline]
    pub fn payload_bytes(&self) -> &Bytes {
        &self.payload
    }

    /// Split into command and payload.
    pub fn into_parts(self) -> (CommandId, Bytes) {
        (self.command, self.payload)
    }

    /// Declared length byte.
    #[inline]
    pub fn len(&self) -> u8 {
        // Constructors keep the payload within MAX_PAYLOAD_LEN
        u8::try_from(self.payload.len()).unwrap_or(u8::MAX)
    }

    /// True for frames without payload.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Size of the encoded frame including the start marker.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        1 + HEADER_SIZE + self.payload.len()
    }

    /// Encode as `[SOM][cmd][len][data]`.
    pub fn encode(&self, start_marker: u8) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(start_marker);
        buf.push(self.command.raw());
        buf.push(self.len());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Append the encoded frame to `buf`.
    pub fn encode_into(&self, start_marker: u8, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u8(start_marker);
        buf.put_u8(self.command.raw());
        buf.put_u8(self.len());
        buf.put_slice(&self.payload);
    }
}

/// Encode a command and payload without building a [`Frame`] first.
///
/// # Example
///
/// ```
/// use ca821x_link::protocol::{build_frame, CommandId};
///
/// let bytes = build_frame(0xDE, CommandId::EVBME_COMM_CHECK, b"hi").unwrap();
/// assert_eq!(bytes, vec![0xDE, 0xA1, 0x02, b'h', b'i']);
/// ```
pub fn build_frame(start_marker: u8, command: CommandId, payload: &[u8]) -> Result<Vec<u8>> {
    let frame = Frame::new(command, Bytes::copy_from_slice(payload))?;
    Ok(frame.encode(start_marker))
}
