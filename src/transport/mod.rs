//! Transport module - channel endpoints and transferable resources.
//!
//! Provides:
//! - [`Port`] - one end of a duplex channel, in-process or over a byte stream
//! - [`Transferable`] / [`TransferList`] - resources moved rather than copied
//! - [`Inbound`] - message and error events raised on a port

mod port;
mod stream;
mod transfer;

pub use port::{Inbound, Packet, Port};
pub(crate) use port::PortSink;
pub use stream::{StreamConfig, DEFAULT_READ_BUFFER_SIZE};
pub use transfer::{TransferList, Transferable};
