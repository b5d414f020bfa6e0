//! Codec error types.

use thiserror::Error;
use tree_common::{DataError, StructureKind};

pub type CodecResult<T> = Result<T, CodecError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CodecError {
    /// No accepted format is available for the structure kind.
    #[error("none of [{requested}] is available for {kind} data; available: [{available}]")]
    NotAcceptable {
        kind: StructureKind,
        requested: String,
        available: String,
    },

    /// A `format` parameter that names neither a media type nor an alias.
    #[error("unknown format '{0}'")]
    UnknownFormat(String),

    /// The codec cannot represent this particular payload.
    #[error("{media_type} cannot encode this payload: {reason}")]
    Unencodable { media_type: String, reason: String },

    #[error("encoding failed: {0}")]
    Encode(String),

    #[error("malformed {media_type} input: {reason}")]
    Decode { media_type: String, reason: String },
}

impl CodecError {
    pub(crate) fn decode(media_type: &str, reason: impl Into<String>) -> Self {
        CodecError::Decode {
            media_type: media_type.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unencodable(media_type: &str, reason: impl Into<String>) -> Self {
        CodecError::Unencodable {
            media_type: media_type.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<CodecError> for DataError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::NotAcceptable { .. } | CodecError::Unencodable { .. } => {
                DataError::UnsupportedMediaType(err.to_string())
            }
            CodecError::UnknownFormat(_) => DataError::Validation(err.to_string()),
            CodecError::Encode(_) | CodecError::Decode { .. } => DataError::Internal(err.to_string()),
        }
    }
}
