//! Ports over byte streams.
//!
//! [`Port::from_stream`] turns any tokio reader/writer pair (a socket, a
//! child's stdio, `tokio::io::duplex`) into a [`Port`]. Two tasks run per
//! port:
//!
//! ```text
//! Gate ─► mpsc::UnboundedSender<Vec<Bytes>> ─► writer task ─► AsyncWrite
//! Gate ◄─ mpsc::UnboundedReceiver<Inbound>  ◄─ reader task ◄─ AsyncRead
//! ```
//!
//! Transferred buffers are written as buffer frames ahead of their
//! envelope. Ports cannot be moved across a byte stream.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::port::{Inbound, Packet, Port, PortSink};
use super::Transferable;
use crate::codec::MsgPackCodec;
use crate::error::{GateError, Result};
use crate::protocol::{build_frame, FrameBuffer, FrameKind, DEFAULT_MAX_FRAME_SIZE};

/// Default read buffer size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Maximum packets to batch in a single write pass.
const MAX_BATCH_SIZE: usize = 64;

/// Configuration for a byte-stream port.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Largest accepted frame payload.
    pub max_frame_size: u32,
    /// Size of the buffer used for each read.
    pub read_buffer_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// Outbound side of a byte-stream port.
///
/// Packets are encoded on the caller's task, so encoding failures and
/// unsupported transfers are reported by `send` itself.
#[derive(Clone)]
pub(crate) struct StreamWriter {
    tx: mpsc::UnboundedSender<Vec<Bytes>>,
}

impl StreamWriter {
    pub(crate) fn send(&self, packet: Packet) -> Result<()> {
        let frames = encode_packet(packet)?;
        self.tx.send(frames).map_err(|_| GateError::ChannelClosed)
    }
}

/// Encode a packet as its buffer frames followed by the envelope frame.
fn encode_packet(packet: Packet) -> Result<Vec<Bytes>> {
    let mut frames = Vec::with_capacity(packet.transfer.len() + 1);
    for item in packet.transfer {
        match item {
            Transferable::Buffer(buf) => {
                frames.push(Bytes::from(build_frame(FrameKind::Buffer, &buf)?));
            }
            Transferable::Port(_) => {
                return Err(GateError::TransferUnsupported(
                    "ports cannot be moved across a byte stream",
                ));
            }
        }
    }
    let envelope = MsgPackCodec::encode_envelope(&packet.envelope)?;
    frames.push(Bytes::from(build_frame(FrameKind::Envelope, &envelope)?));
    Ok(frames)
}

impl Port {
    /// Build a port on top of a byte stream with default settings.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_stream<R, W>(reader: R, writer: W) -> Port
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::from_stream_with_config(reader, writer, StreamConfig::default())
    }

    /// Build a port on top of a byte stream.
    pub fn from_stream_with_config<R, W>(reader: R, writer: W, config: StreamConfig) -> Port
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        spawn_writer_task(writer, outbound_rx, inbound_tx.downgrade());
        spawn_reader_task(reader, inbound_tx, config);

        Port::from_parts(PortSink::Stream(StreamWriter { tx: outbound_tx }), inbound_rx)
    }
}

fn spawn_writer_task<W>(
    writer: W,
    rx: mpsc::UnboundedReceiver<Vec<Bytes>>,
    errors: mpsc::WeakUnboundedSender<Inbound>,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = writer_loop(rx, writer).await {
            tracing::error!("Stream writer error: {}", e);
            if let Some(tx) = errors.upgrade() {
                let _ = tx.send(Inbound::Error(e));
            }
        }
    })
}

/// Receives encoded packets and writes them, batching whatever is queued.
async fn writer_loop<W>(mut rx: mpsc::UnboundedReceiver<Vec<Bytes>>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(frames) => frames,
            None => {
                // Every sink handle is gone: the port was closed.
                writer.shutdown().await?;
                return Ok(());
            }
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frames) => batch.push(frames),
                Err(_) => break,
            }
        }

        for frames in &batch {
            for frame in frames {
                writer.write_all(frame).await?;
            }
        }
        writer.flush().await?;
    }
}

fn spawn_reader_task<R>(
    reader: R,
    tx: mpsc::UnboundedSender<Inbound>,
    config: StreamConfig,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = read_loop(reader, &tx, config).await {
            tracing::debug!("Stream reader stopped: {}", e);
            let _ = tx.send(Inbound::Error(e));
        }
    })
}

/// Reads frames, groups buffer frames with the envelope that follows them,
/// and forwards complete packets. Returns `Ok` on clean end of stream or when
/// the port itself was dropped.
async fn read_loop<R>(
    mut reader: R,
    tx: &mpsc::UnboundedSender<Inbound>,
    config: StreamConfig,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut frame_buffer = FrameBuffer::with_max_frame_size(config.max_frame_size);
    let mut buf = vec![0u8; config.read_buffer_size];
    let mut transfer = Vec::new();

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            if !frame_buffer.is_empty() || !transfer.is_empty() {
                return Err(GateError::Protocol(
                    "stream ended in the middle of a packet".to_string(),
                ));
            }
            return Ok(());
        }

        for frame in frame_buffer.push(&buf[..n])? {
            match frame.kind() {
                FrameKind::Buffer => {
                    transfer.push(Transferable::Buffer(BytesMut::from(&frame.payload[..])));
                }
                FrameKind::Envelope => {
                    let envelope = MsgPackCodec::decode_envelope(&frame.payload)?;
                    let packet = Packet {
                        envelope,
                        transfer: std::mem::take(&mut transfer),
                    };
                    if tx.send(Inbound::Packet(packet)).is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Envelope;
    use serde_json::json;
    use tokio::io::duplex;

    fn stream_pair() -> (Port, Port) {
        let (left, right) = duplex(4096);
        let (left_r, left_w) = tokio::io::split(left);
        let (right_r, right_w) = tokio::io::split(right);
        (Port::from_stream(left_r, left_w), Port::from_stream(right_r, right_w))
    }

    #[tokio::test]
    async fn test_envelopes_cross_the_stream_in_order() {
        let (a, mut b) = stream_pair();
        for i in 0..5 {
            a.send(Envelope::post(i, "n".into(), json!(i)), Vec::new()).unwrap();
        }

        for i in 0..5u64 {
            match b.recv().await {
                Some(Inbound::Packet(packet)) => assert_eq!(packet.envelope.meta.id, Some(i)),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_buffers_travel_with_their_envelope() {
        let (a, mut b) = stream_pair();
        let transfer = vec![
            Transferable::from(BytesMut::from(&b"one"[..])),
            Transferable::from(BytesMut::from(&b"two"[..])),
        ];
        a.send(Envelope::send("bufs".into(), json!(null)), transfer).unwrap();

        match b.recv().await {
            Some(Inbound::Packet(packet)) => {
                let bufs: Vec<BytesMut> = packet
                    .transfer
                    .into_iter()
                    .filter_map(Transferable::into_buffer)
                    .collect();
                assert_eq!(bufs.len(), 2);
                assert_eq!(&bufs[0][..], b"one");
                assert_eq!(&bufs[1][..], b"two");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_port_transfer_rejected() {
        let (a, _b) = stream_pair();
        let (inner, _other) = Port::pair();

        let err = a
            .send(Envelope::send("port".into(), json!(null)), vec![inner.into()])
            .unwrap_err();
        assert!(matches!(err, GateError::TransferUnsupported(_)));
    }

    #[tokio::test]
    async fn test_garbage_raises_error_event() {
        let (mut raw, right) = duplex(1024);
        let (right_r, right_w) = tokio::io::split(right);
        let mut port = Port::from_stream(right_r, right_w);

        // Valid header, payload that is not MsgPack.
        raw.write_all(&build_frame(FrameKind::Envelope, b"\xc1\xc1").unwrap())
            .await
            .unwrap();

        assert!(matches!(port.recv().await, Some(Inbound::Error(_))));
    }

    #[tokio::test]
    async fn test_end_of_stream_ends_port() {
        let (raw, right) = duplex(1024);
        let (right_r, right_w) = tokio::io::split(right);
        let mut port = Port::from_stream(right_r, right_w);

        drop(raw);
        assert!(port.recv().await.is_none());
    }

    #[test]
    fn test_stream_config_default() {
        let config = StreamConfig::default();
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
    }
}
