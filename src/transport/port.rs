//! In-process channel endpoints.
//!
//! A [`Port`] is one end of a duplex channel. Anything sent on one end of a
//! pair arrives, in order, on the other end. Ports are themselves
//! transferable, which is how a fresh channel end reaches a context that did
//! not create it.
//!
//! # Example
//!
//! ```
//! use message_gate::protocol::Envelope;
//! use message_gate::transport::{Inbound, Port};
//!
//! # tokio_test_block_on(async {
//! let (a, mut b) = Port::pair();
//! a.send(Envelope::close(), Vec::new()).unwrap();
//!
//! match b.recv().await {
//!     Some(Inbound::Packet(packet)) => assert_eq!(packet.envelope, Envelope::close()),
//!     other => panic!("unexpected {:?}", other),
//! }
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use super::stream::StreamWriter;
use super::Transferable;
use crate::error::{GateError, Result};
use crate::protocol::Envelope;

static NEXT_PORT_ID: AtomicU64 = AtomicU64::new(1);

/// An envelope together with the resources moving with it.
#[derive(Debug)]
pub struct Packet {
    /// The wire message.
    pub envelope: Envelope,
    /// Resources whose ownership moves to the receiver.
    pub transfer: Vec<Transferable>,
}

impl Packet {
    /// Packet without transferred resources.
    pub fn new(envelope: Envelope) -> Self {
        Self {
            envelope,
            transfer: Vec::new(),
        }
    }
}

/// Event raised on the receiving end of a port.
#[derive(Debug)]
pub enum Inbound {
    /// A message arrived.
    Packet(Packet),
    /// The transport failed to deliver a message.
    Error(GateError),
}

/// Outbound half of a port.
#[derive(Clone)]
pub(crate) enum PortSink {
    Local(mpsc::UnboundedSender<Inbound>),
    Stream(StreamWriter),
}

impl PortSink {
    pub(crate) fn send(&self, packet: Packet) -> Result<()> {
        match self {
            PortSink::Local(tx) => tx
                .send(Inbound::Packet(packet))
                .map_err(|_| GateError::ChannelClosed),
            PortSink::Stream(writer) => writer.send(packet),
        }
    }
}

/// One end of a duplex channel.
pub struct Port {
    id: u64,
    sink: PortSink,
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

impl Port {
    /// Create two linked ports.
    pub fn pair() -> (Port, Port) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();

        let a = Port::from_parts(PortSink::Local(b_tx), a_rx);
        let b = Port::from_parts(PortSink::Local(a_tx), b_rx);
        (a, b)
    }

    pub(crate) fn from_parts(sink: PortSink, inbound: mpsc::UnboundedReceiver<Inbound>) -> Port {
        Port {
            id: NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed),
            sink,
            inbound,
        }
    }

    /// Process-unique id, useful in logs.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Send an envelope, moving `transfer` to the other end.
    ///
    /// Fails with [`GateError::ChannelClosed`] once the other end is gone.
    pub fn send(&self, envelope: Envelope, transfer: Vec<Transferable>) -> Result<()> {
        self.sink.send(Packet { envelope, transfer })
    }

    /// Receive the next inbound event; `None` once the other end is gone.
    pub async fn recv(&mut self) -> Option<Inbound> {
        self.inbound.recv().await
    }

    /// Close this end. The other end observes the channel ending.
    pub fn close(self) {
        tracing::trace!("closing port {}", self.id);
        drop(self);
    }

    pub(crate) fn into_parts(self) -> (PortSink, mpsc::UnboundedReceiver<Inbound>) {
        (self.sink, self.inbound)
    }

    /// Whether this port runs over a byte stream.
    pub fn is_stream(&self) -> bool {
        matches!(self.sink, PortSink::Stream(_))
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("id", &self.id)
            .field("stream", &self.is_stream())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use serde_json::json;

    fn expect_packet(event: Option<Inbound>) -> Packet {
        match event {
            Some(Inbound::Packet(packet)) => packet,
            other => panic!("expected packet, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pair_delivers_both_ways() {
        let (mut a, mut b) = Port::pair();

        a.send(Envelope::send("ping".into(), json!(1)), Vec::new()).unwrap();
        b.send(Envelope::send("pong".into(), json!(2)), Vec::new()).unwrap();

        assert_eq!(expect_packet(b.recv().await).envelope.data, json!(1));
        assert_eq!(expect_packet(a.recv().await).envelope.data, json!(2));
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (a, mut b) = Port::pair();
        for i in 0..10 {
            a.send(Envelope::send("n".into(), json!(i)), Vec::new()).unwrap();
        }

        for i in 0..10 {
            assert_eq!(expect_packet(b.recv().await).envelope.data, json!(i));
        }
    }

    #[tokio::test]
    async fn test_transfer_moves_buffer() {
        let (a, mut b) = Port::pair();
        let buf = BytesMut::from(&b"owned"[..]);

        a.send(Envelope::send("take".into(), json!(null)), vec![buf.into()])
            .unwrap();

        let packet = expect_packet(b.recv().await);
        let received = packet.transfer.into_iter().next().unwrap().into_buffer().unwrap();
        assert_eq!(&received[..], b"owned");
    }

    #[tokio::test]
    async fn test_transferred_port_stays_connected() {
        let (a, mut b) = Port::pair();
        let (inner_a, mut inner_b) = Port::pair();

        a.send(Envelope::send("port".into(), json!(null)), vec![inner_a.into()])
            .unwrap();

        let packet = expect_packet(b.recv().await);
        let moved = packet.transfer.into_iter().next().unwrap().into_port().unwrap();
        moved.send(Envelope::close(), Vec::new()).unwrap();

        assert_eq!(expect_packet(inner_b.recv().await).envelope, Envelope::close());
    }

    #[tokio::test]
    async fn test_send_after_peer_dropped() {
        let (a, b) = Port::pair();
        b.close();

        let err = a.send(Envelope::close(), Vec::new()).unwrap_err();
        assert!(matches!(err, GateError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_recv_none_after_peer_dropped() {
        let (a, mut b) = Port::pair();
        drop(a);
        assert!(b.recv().await.is_none());
    }

    #[test]
    fn test_port_ids_unique() {
        let (a, b) = Port::pair();
        assert_ne!(a.id(), b.id());
    }
}
