//! Eager PlainLson encoder.

use super::live_tag;
use crate::{
    Fields, Json,
    constants::{DATA, LIVE_OBJECT, LIVEBLOCKS_TYPE, ROOT_ID},
    node::NodeTree,
};

/// Encodes the whole tree as a PlainLson document.
pub fn encode(tree: &NodeTree) -> Json {
    encode_node(tree, ROOT_ID).unwrap_or_else(|| wrap(LIVE_OBJECT, Json::Object(Fields::new())))
}

/// Encodes the whole tree as compact JSON text.
///
/// This is exactly the concatenation of [`encode_lazy`](super::encode_lazy).
pub fn encode_to_string(tree: &NodeTree) -> String {
    encode(tree).to_string()
}

/// Encodes the subtree rooted at `id`. A Register encodes as its plain value.
///
/// Object and Map payloads list their keys in stored order, scalar fields
/// and child containers alike.
pub fn encode_node(tree: &NodeTree, id: &str) -> Option<Json> {
    tree.fold_json(id, |kind, payload| wrap(live_tag(kind), payload))
}

/// Plain JSON view of the whole tree, without container tags.
pub fn to_immutable(tree: &NodeTree) -> Json {
    tree.to_immutable(ROOT_ID)
        .unwrap_or_else(|| Json::Object(Fields::new()))
}

fn wrap(tag: &str, data: Json) -> Json {
    let mut container = Fields::new();
    container.insert(LIVEBLOCKS_TYPE.to_string(), Json::from(tag));
    container.insert(DATA.to_string(), data);
    Json::Object(container)
}
