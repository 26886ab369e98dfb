//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` so payloads are split off without copying.
//! Parsing is a two-state machine:
//! - `WaitingForHeader`: need at least 5 bytes
//! - `WaitingForPayload`: header parsed, need N more payload bytes

use bytes::{Bytes, BytesMut};

use super::frame::{Frame, FrameHeader, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE};
use crate::error::{GateError, Result};

#[derive(Debug, Clone)]
enum State {
    WaitingForHeader,
    WaitingForPayload { header: FrameHeader },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    buffer: BytesMut,
    state: State,
    max_frame_size: u32,
}

impl FrameBuffer {
    /// Create a frame buffer with the default 64 MiB frame limit.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a frame buffer with a custom frame size limit.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_frame_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if a header announces a payload larger than
    /// the limit or carries an unknown kind.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        loop {
            match &self.state {
                State::WaitingForHeader => {
                    if self.buffer.len() < HEADER_SIZE {
                        return Ok(None);
                    }

                    let header = FrameHeader::decode(&self.buffer[..HEADER_SIZE])?;
                    if header.length > self.max_frame_size {
                        return Err(GateError::Protocol(format!(
                            "Frame size {} exceeds maximum {}",
                            header.length, self.max_frame_size
                        )));
                    }

                    let _ = self.buffer.split_to(HEADER_SIZE);

                    if header.length == 0 {
                        return Ok(Some(Frame::new(header, Bytes::new())));
                    }
                    self.state = State::WaitingForPayload { header };
                }

                State::WaitingForPayload { header } => {
                    let header = *header;
                    let length = header.length as usize;
                    if self.buffer.len() < length {
                        return Ok(None);
                    }

                    let payload = self.buffer.split_to(length).freeze();
                    self.state = State::WaitingForHeader;
                    return Ok(Some(Frame::new(header, payload)));
                }
            }
        }
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
