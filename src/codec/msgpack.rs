//! MsgPack codec using `rmp-serde`.
//!
//! Always `to_vec_named`: structs are written as maps with field names, so
//! an envelope reads as `{ meta: {...}, data: ... }` on the wire, the same
//! shape as its JSON form.

use crate::error::Result;
use crate::protocol::Envelope;

/// MessagePack codec for envelopes and payloads.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map).
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Encode an envelope for an envelope frame.
    pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>> {
        Self::encode(envelope)
    }

    /// Decode the payload of an envelope frame.
    pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope> {
        Self::decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GateError, RemoteError};
    use crate::protocol::{Action, MessageType};
    use serde_json::json;

    #[test]
    fn test_envelope_is_encoded_as_map() {
        let envelope = Envelope::post(1, "add".into(), json!(41));
        let encoded = MsgPackCodec::encode_envelope(&envelope).unwrap();

        // fixmap with 2 entries: meta, data
        assert_eq!(encoded[0], 0x82);
    }

    #[test]
    fn test_envelope_fields_survive_encoding() {
        let envelope = Envelope::post(7, Action::Code(3), json!({ "list": [1, 2, 3], "flag": true }));
        let decoded = MsgPackCodec::decode_envelope(&MsgPackCodec::encode_envelope(&envelope).unwrap()).unwrap();

        assert_eq!(decoded.meta.kind, MessageType::Post);
        assert_eq!(decoded.meta.action, Some(Action::Code(3)));
        assert_eq!(decoded.meta.id, Some(7));
        assert_eq!(decoded.data["list"][2], 3);
        assert_eq!(decoded.data["flag"], true);
    }

    #[test]
    fn test_failure_answer_survives_encoding() {
        let envelope = Envelope::failure(2, RemoteError::new("boom").details(json!({ "at": "step 3" })));
        let decoded = MsgPackCodec::decode_envelope(&MsgPackCodec::encode_envelope(&envelope).unwrap()).unwrap();

        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_close_type_code_is_negative() {
        let encoded = MsgPackCodec::encode_envelope(&Envelope::close()).unwrap();
        let raw: serde_json::Value = MsgPackCodec::decode(&encoded).unwrap();

        assert_eq!(raw["meta"]["type"], -1);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result = MsgPackCodec::decode_envelope(b"not valid msgpack");
        assert!(matches!(result, Err(GateError::MsgPackDecode(_))));
    }
}
