//! Frames for ports running over byte streams.
//!
//! Each frame has a 5-byte header followed by the payload:
//! ```text
//! ┌───────┬──────────┐
//! │ Kind  │ Length   │
//! │ 1 byte│ 4 bytes  │
//! │       │ uint32 BE│
//! └───────┴──────────┘
//! ```
//!
//! An envelope frame holds one MsgPack-encoded [`Envelope`](super::Envelope).
//! Buffers transferred with that envelope are sent as buffer frames right
//! before it, in transfer-list order.

use bytes::Bytes;

use crate::error::{GateError, Result};

/// Header size in bytes.
pub const HEADER_SIZE: usize = 5;

/// Default maximum payload size of a single frame (64 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Payload kind of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// MsgPack-encoded envelope; completes a packet.
    Envelope,
    /// Raw bytes of a transferred buffer.
    Buffer,
}

impl FrameKind {
    fn to_byte(self) -> u8 {
        match self {
            FrameKind::Envelope => 0,
            FrameKind::Buffer => 1,
        }
    }

    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(FrameKind::Envelope),
            1 => Ok(FrameKind::Buffer),
            other => Err(GateError::Protocol(format!("unknown frame kind {}", other))),
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload kind.
    pub kind: FrameKind,
    /// Payload length in bytes.
    pub length: u32,
}

impl FrameHeader {
    /// Create a new header.
    pub fn new(kind: FrameKind, length: u32) -> Self {
        Self { kind, length }
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.kind.to_byte();
        buf[1..].copy_from_slice(&self.length.to_be_bytes());
        buf
    }

    /// Decode from wire bytes. `bytes` must hold at least [`HEADER_SIZE`] bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(GateError::Protocol(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }
        let kind = FrameKind::from_byte(bytes[0])?;
        let length = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        Ok(Self { kind, length })
    }
}

/// A complete frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: FrameHeader,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame from header and payload.
    pub fn new(header: FrameHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Payload kind.
    #[inline]
    pub fn kind(&self) -> FrameKind {
        self.header.kind
    }
}

/// Build a complete frame (header + payload) as one buffer.
pub fn build_frame(kind: FrameKind, payload: &[u8]) -> Result<Vec<u8>> {
    let length = u32::try_from(payload.len())
        .map_err(|_| GateError::Protocol(format!("payload of {} bytes too large", payload.len())))?;
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&FrameHeader::new(kind, length).encode());
    out.extend_from_slice(payload);
    Ok(out)
}
