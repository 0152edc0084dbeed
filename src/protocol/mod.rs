//! Protocol module - command ids, frames, and the receive state machine.
//!
//! This module implements the byte-level link:
//! - One-byte command identifiers with the uplink/downlink/sync bit layout
//! - `[SOM][cmd][len][data]` frame encoding
//! - Frame receiver for incrementally delivered bytes

mod command;
mod frame;
mod receiver;

pub use command::{masks, CommandId};
pub use frame::{
    build_frame, Frame, DEFAULT_START_MARKER, HEADER_SIZE, MAX_FRAME_LEN, MAX_PAYLOAD_LEN,
};
pub use receiver::{FrameReceiver, RxState};
