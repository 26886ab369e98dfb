//! Protocol module - envelopes, message kinds and byte-stream framing.
//!
//! This module implements the wire side of a gate:
//! - [`Envelope`] with its `meta` block and payload, as sent through a port
//! - [`Message`], the validated typed view of an envelope
//! - Length-prefixed frames for ports running over byte streams

mod envelope;
mod frame;
mod frame_buffer;
mod message;

pub use envelope::{Action, Envelope, Meta, MessageType};
pub use frame::{build_frame, Frame, FrameHeader, FrameKind, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE};
pub use frame_buffer::FrameBuffer;
pub use message::Message;
