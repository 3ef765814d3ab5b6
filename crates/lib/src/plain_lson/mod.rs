//! PlainLson: the nested JSON interchange format of a storage tree.
//!
//! Every container is written as a two-key object:
//!
//! ```json
//! { "liveblocksType": "LiveObject", "data": { "title": "groceries", "items": {
//!     "liveblocksType": "LiveList", "data": ["milk", "eggs"] } } }
//! ```
//!
//! Object and Map payloads are JSON objects, List payloads are arrays in
//! Position order. Anything without a `liveblocksType` key is a plain value,
//! including ordinary JSON objects.
//!
//! Key order is kept: Object and Map payloads encode in the order their keys
//! were decoded or first written.
//!
//! Decoding is a lazy pre-order walk ([`decode`]); encoding comes in an eager
//! form that builds the whole document ([`encode`]) and a streaming form that
//! yields text fragments ([`encode_lazy`]). Both encoders produce the same
//! bytes.

use crate::{
    Json,
    constants::{DATA, LIVE_LIST, LIVE_MAP, LIVE_OBJECT, LIVEBLOCKS_TYPE},
    node::NodeKind,
};

mod decode;
mod encode;
pub mod errors;
mod stream;

pub use decode::{Decode, decode, decode_all, decode_tree, decode_value};
pub use encode::{encode, encode_node, encode_to_string, to_immutable};
pub use errors::DecodeError;
pub use stream::{EncodeLazy, encode_lazy, encode_node_lazy};

/// One PlainLson value, classified.
#[derive(Debug, Clone, Copy)]
pub(crate) enum LiveValue<'a> {
    /// A plain JSON value, stored inline or in a Register
    Scalar(&'a Json),
    /// A container of the given kind with its payload
    Container(NodeKind, &'a Json),
}

/// Returns true if `value` is tagged as a container.
///
/// This only looks for the tag; [`decode`] validates it.
pub fn is_live(value: &Json) -> bool {
    value
        .as_object()
        .is_some_and(|map| map.contains_key(LIVEBLOCKS_TYPE))
}

/// Classifies `value`, validating the container tag and payload shape.
pub(crate) fn classify<'a>(value: &'a Json, path: &str) -> Result<LiveValue<'a>, DecodeError> {
    let Some(map) = value.as_object() else {
        return Ok(LiveValue::Scalar(value));
    };
    let Some(tag) = map.get(LIVEBLOCKS_TYPE) else {
        return Ok(LiveValue::Scalar(value));
    };

    let kind = match tag.as_str() {
        Some(LIVE_OBJECT) => NodeKind::Object,
        Some(LIVE_MAP) => NodeKind::Map,
        Some(LIVE_LIST) => NodeKind::List,
        Some(other) => {
            return Err(DecodeError::UnknownLiveType {
                path: path.to_string(),
                found: other.to_string(),
            });
        }
        None => {
            return Err(DecodeError::UnknownLiveType {
                path: path.to_string(),
                found: tag.to_string(),
            });
        }
    };

    let data = map.get(DATA).ok_or_else(|| DecodeError::MalformedContainer {
        path: path.to_string(),
        reason: format!("{} has no data", live_tag(kind)),
    })?;
    let shape_ok = match kind {
        NodeKind::List => data.is_array(),
        _ => data.is_object(),
    };
    if !shape_ok {
        return Err(DecodeError::MalformedContainer {
            path: path.to_string(),
            reason: format!(
                "{} data must be {}",
                live_tag(kind),
                if kind == NodeKind::List {
                    "an array"
                } else {
                    "an object"
                }
            ),
        });
    }
    Ok(LiveValue::Container(kind, data))
}

/// The `liveblocksType` tag of a container kind.
pub(crate) fn live_tag(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Object | NodeKind::Register => LIVE_OBJECT,
        NodeKind::Map => LIVE_MAP,
        NodeKind::List => LIVE_LIST,
    }
}
