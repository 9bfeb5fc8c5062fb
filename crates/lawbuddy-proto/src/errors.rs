//! Codec error types.

use thiserror::Error;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// A frame that could not be encoded, parsed, or routed.
///
/// Protocol errors never affect connection state: the receiver logs and drops
/// the frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Input was not valid JSON, or an envelope failed to serialize.
    #[error("malformed json: {0}")]
    Json(String),

    /// Frame parsed but is not a JSON object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// Frame has no string `type` field.
    #[error("frame has no string `type` field")]
    MissingType,

    /// Frame `type` is not one this client understands.
    #[error("unknown frame type: {0}")]
    UnknownType(String),

    /// A field required by the frame type is absent.
    #[error("{frame} frame missing field `{field}`")]
    MissingField {
        /// Frame type being decoded
        frame: &'static str,
        /// Name of the missing field
        field: &'static str,
    },
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
