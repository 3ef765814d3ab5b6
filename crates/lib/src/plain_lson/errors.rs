//! Error types for PlainLson decoding.
//!
//! A decode error aborts the whole decode. Callers that collect with
//! [`decode_all`](super::decode_all) never see partial output.

use thiserror::Error;

/// Structured errors raised while decoding a PlainLson document.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A `liveblocksType` tag names no known container
    #[error("unknown liveblocksType {found:?} at {path}")]
    UnknownLiveType { path: String, found: String },

    /// A container's shape is wrong, e.g. a LiveList whose `data` is not an array
    #[error("malformed container at {path}: {reason}")]
    MalformedContainer { path: String, reason: String },

    /// The document root is not a LiveObject
    #[error("document root must be a LiveObject, found {found}")]
    RootNotObject { found: String },

    /// The input is not valid JSON
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl DecodeError {
    /// Check if this error is about a container kind (unknown tag, wrong root kind)
    pub fn is_type_error(&self) -> bool {
        matches!(
            self,
            DecodeError::UnknownLiveType { .. } | DecodeError::RootNotObject { .. }
        )
    }

    /// Check if this error is about the document's shape rather than a tag
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            DecodeError::MalformedContainer { .. } | DecodeError::Json(_)
        )
    }

    /// Path of the offending value inside the document, if known
    pub fn path(&self) -> Option<&str> {
        match self {
            DecodeError::UnknownLiveType { path, .. }
            | DecodeError::MalformedContainer { path, .. } => Some(path),
            DecodeError::RootNotObject { .. } | DecodeError::Json(_) => None,
        }
    }
}

impl From<DecodeError> for crate::Error {
    fn from(err: DecodeError) -> Self {
        crate::Error::Decode(err)
    }
}
