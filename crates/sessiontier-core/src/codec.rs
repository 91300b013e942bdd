//! Payload codec.
//!
//! Converts a `StateBlob` to and from the JSON text stored in both the cache
//! tier and the durable store. Only the field map is encoded; the `partial`
//! tag is never part of the payload.

use serde_json::Value;
use sessiontier_types::error::CodecError;
use sessiontier_types::state::StateBlob;

/// JSON codec for state payloads.
pub struct PayloadCodec;

impl PayloadCodec {
    pub fn encode(blob: &StateBlob) -> Result<String, CodecError> {
        serde_json::to_string(blob.fields()).map_err(|e| CodecError::Malformed(e.to_string()))
    }

    /// Decode a payload into a complete blob.
    ///
    /// The payload must be a JSON object; any other JSON value is rejected.
    pub fn decode(payload: &str) -> Result<StateBlob, CodecError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| CodecError::Malformed(e.to_string()))?;
        match value {
            Value::Object(map) => Ok(StateBlob::from_fields(map)),
            Value::Null => Err(CodecError::NotAnObject("null")),
            Value::Bool(_) => Err(CodecError::NotAnObject("bool")),
            Value::Number(_) => Err(CodecError::NotAnObject("number")),
            Value::String(_) => Err(CodecError::NotAnObject("string")),
            Value::Array(_) => Err(CodecError::NotAnObject("array")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_then_decode_preserves_fields() {
        let mut blob = StateBlob::new();
        blob.insert("esperando", "file_upload");
        blob.insert("tenantId", "T1");
        blob.insert("rows", json!([{"amount": 12.5}]));

        let payload = PayloadCodec::encode(&blob).unwrap();
        let decoded = PayloadCodec::decode(&payload).unwrap();
        assert_eq!(decoded, blob);
    }

    #[test]
    fn encode_drops_partial_tag() {
        let mut fields = serde_json::Map::new();
        fields.insert("tenantId".to_string(), json!("T1"));
        let payload = PayloadCodec::encode(&StateBlob::partial(fields)).unwrap();
        let decoded = PayloadCodec::decode(&payload).unwrap();
        assert!(!decoded.is_partial());
        assert_eq!(decoded.tenant_id(), Some("T1"));
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = PayloadCodec::decode("{not json").unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn decode_rejects_non_object() {
        assert!(matches!(
            PayloadCodec::decode("[1,2]"),
            Err(CodecError::NotAnObject("array"))
        ));
        assert!(matches!(
            PayloadCodec::decode("null"),
            Err(CodecError::NotAnObject("null"))
        ));
    }

    #[test]
    fn empty_object_decodes_to_empty_blob() {
        let blob = PayloadCodec::decode("{}").unwrap();
        assert!(blob.is_empty());
    }
}
