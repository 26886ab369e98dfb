//! Codec module - payload encoding for byte-stream ports.
//!
//! In-process ports hand envelopes over as values and never encode them.
//! Ports built on a byte stream encode every envelope with
//! [`MsgPackCodec`] before framing it.
//!
//! # Example
//!
//! ```
//! use message_gate::codec::MsgPackCodec;
//! use message_gate::protocol::Envelope;
//!
//! let bytes = MsgPackCodec::encode_envelope(&Envelope::close()).unwrap();
//! let decoded = MsgPackCodec::decode_envelope(&bytes).unwrap();
//! assert_eq!(decoded, Envelope::close());
//! ```

mod msgpack;

pub use msgpack::MsgPackCodec;
