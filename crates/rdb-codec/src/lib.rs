//! The `{type, value}` wire envelope.
//!
//! A stored value is logically either a JSON-representable value or an
//! opaque blob. Both are wrapped in a tagged [`Envelope`] before they touch a
//! backend or the wire: `object` envelopes carry the value as JSON directly,
//! `pickle` envelopes carry it as a base64 string. The envelope, serialized
//! to its JSON text, is the unit every backend stores as an opaque byte
//! value.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rdb_error::{ErrorKind, RdbError};
use serde::{Deserialize, Serialize};

const BASE64_ENGINE: base64::engine::GeneralPurpose = BASE64;

/// Which of the two wire representations an [`Envelope`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// The payload is the value itself, as JSON.
    Object,
    /// The payload is an opaque blob, base64-encoded for ASCII safety.
    Pickle,
}

/// The tagged record `{"type": Kind, "value": ...}` that is the unit of
/// on-wire and on-disk storage for a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: Kind,
    pub value: serde_json::Value,
}

/// The logical value a caller works with, before it is wrapped into an
/// [`Envelope`]: either something JSON can represent natively, or an opaque
/// blob that must round-trip as bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A JSON-representable scalar, array, mapping, or null.
    Json(serde_json::Value),
    /// An opaque byte blob with no native JSON representation.
    Blob(Vec<u8>),
}

impl Value {
    /// Shorthand for a JSON null value.
    pub fn null() -> Self {
        Self::Json(serde_json::Value::Null)
    }
}

/// Wrap a logical [`Value`] into its wire [`Envelope`].
pub fn encode(value: &Value) -> Envelope {
    match value {
        Value::Json(v) => Envelope {
            kind: Kind::Object,
            value: v.clone(),
        },
        Value::Blob(bytes) => Envelope {
            kind: Kind::Pickle,
            value: serde_json::Value::String(BASE64_ENGINE.encode(bytes)),
        },
    }
}

/// Unwrap an [`Envelope`] back into its logical [`Value`].
///
/// Fails with [`ErrorKind::BadWireFormat`] if the kind is `pickle` but the
/// payload is not a valid base64 string.
pub fn decode(envelope: &Envelope) -> Result<Value, RdbError> {
    match envelope.kind {
        Kind::Object => Ok(Value::Json(envelope.value.clone())),
        Kind::Pickle => {
            let s = envelope.value.as_str().ok_or_else(|| {
                RdbError::new(
                    ErrorKind::BadWireFormat,
                    "pickle envelope payload must be a string",
                )
            })?;
            let bytes = BASE64_ENGINE.decode(s).map_err(|e| {
                RdbError::new(
                    ErrorKind::BadWireFormat,
                    format!("pickle envelope payload is not valid base64: {e}"),
                )
                .with_source(e)
            })?;
            Ok(Value::Blob(bytes))
        }
    }
}

/// Serialize an [`Envelope`] to its wire form: the JSON text of the record.
/// This is the opaque byte string every backend actually stores.
pub fn to_bytes(envelope: &Envelope) -> Vec<u8> {
    // `Envelope` only contains JSON-representable fields, so this cannot fail.
    serde_json::to_vec(envelope).expect("Envelope always serializes")
}

/// Parse the wire form (JSON text) back into an [`Envelope`].
///
/// Fails with [`ErrorKind::BadWireFormat`] if `bytes` is not a well-formed
/// envelope — unknown `type` tag, missing fields, or invalid JSON.
pub fn from_bytes(bytes: &[u8]) -> Result<Envelope, RdbError> {
    serde_json::from_slice(bytes).map_err(|e| {
        RdbError::new(
            ErrorKind::BadWireFormat,
            format!("malformed envelope: {e}"),
        )
        .with_source(e)
    })
}

/// Convenience: encode `value` straight to wire bytes.
pub fn encode_bytes(value: &Value) -> Vec<u8> {
    to_bytes(&encode(value))
}

/// Convenience: decode wire bytes straight to a logical [`Value`].
pub fn decode_bytes(bytes: &[u8]) -> Result<Value, RdbError> {
    decode(&from_bytes(bytes)?)
}
