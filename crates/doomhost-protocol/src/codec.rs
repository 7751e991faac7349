//! Codec trait for control-plane messages.
//!
//! The control listener only needs "bytes in, typed request out" and
//! "typed reply in, bytes out". Keeping that behind [`Codec`] lets the
//! frame reader stay ignorant of the body format; [`JsonCodec`] is the
//! format the control clients speak today.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts control messages to and from bytes.
///
/// `Send + Sync + 'static` because the codec lives inside the listener's
/// shared state for as long as the daemon runs.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// ```rust
/// use doomhost_protocol::{Codec, ControlReply, JsonCodec};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&ControlReply::ok("Killed server on port 10666.")).unwrap();
/// let decoded: ControlReply = codec.decode(&bytes).unwrap();
/// assert!(decoded.is_ok());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Action, ControlReply, ControlRequest, Status};

    #[test]
    fn test_json_codec_decodes_request_with_extra_fields() {
        let raw = br#"{"secret":"s3","username":"u","password":"p","action":"kill","port":10667}"#;
        let req: ControlRequest = JsonCodec.decode(raw).unwrap();
        assert_eq!(req.secret.as_deref(), Some("s3"));
        assert_eq!(req.action().unwrap(), Action::Kill);
        assert_eq!(req.fields.get("port").and_then(|v| v.as_u64()), Some(10667));
    }

    #[test]
    fn test_json_codec_rejects_malformed_json() {
        let result: Result<ControlRequest, _> = JsonCodec.decode(b"{not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_codec_encodes_reply_status_as_number() {
        let bytes = JsonCodec.encode(&ControlReply::error("nope")).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["status"], 0);
        assert_eq!(value["message"], "nope");

        let reply: ControlReply = JsonCodec
            .decode(br#"{"status":1,"message":"fine"}"#)
            .unwrap();
        assert_eq!(reply.status, Status::Ok);
    }
}
