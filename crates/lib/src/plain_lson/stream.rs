//! Streaming PlainLson encoder.
//!
//! [`EncodeLazy`] walks the tree with an explicit stack and yields JSON text
//! one field or element at a time, so peak memory is bounded by tree depth
//! and the largest single scalar rather than by document size. Joining the
//! fragments gives exactly the text of [`encode_to_string`](super::encode_to_string).

use std::slice;

use super::live_tag;
use crate::{
    Json,
    constants::{DATA, LIVEBLOCKS_TYPE, ROOT_ID},
    node::{KeyedEntries, KeyedEntry, NodeData, NodeId, NodeTree},
    position::Position,
};

/// Streams the whole tree as PlainLson text fragments.
pub fn encode_lazy(tree: &NodeTree) -> EncodeLazy<'_> {
    encode_node_lazy(tree, ROOT_ID)
}

/// Streams the subtree rooted at `id`. Yields nothing if `id` is unknown.
pub fn encode_node_lazy<'a>(tree: &'a NodeTree, id: &'a str) -> EncodeLazy<'a> {
    EncodeLazy {
        tree,
        start: Some(id),
        stack: Vec::new(),
    }
}

enum Frame<'a> {
    /// An Object or Map
    Keyed {
        entries: KeyedEntries<'a>,
        first: bool,
    },
    List {
        children: slice::Iter<'a, (Position, NodeId)>,
        first: bool,
    },
}

/// Iterator of JSON text fragments, see [`encode_lazy`].
///
/// Single pass: start a new one to encode again.
pub struct EncodeLazy<'a> {
    tree: &'a NodeTree,
    start: Option<&'a str>,
    stack: Vec<Frame<'a>>,
}

impl<'a> EncodeLazy<'a> {
    /// Emits `prefix` followed by the opening text of `id`, pushing a frame
    /// if it is a container.
    fn open(&mut self, id: &'a str, mut prefix: String) -> String {
        let Some(node) = self.tree.get(id) else {
            prefix.push_str("null");
            return prefix;
        };
        let frame = match &node.data {
            NodeData::Register(value) => {
                prefix.push_str(&value.to_string());
                return prefix;
            }
            NodeData::Object(_) | NodeData::Map => match self.tree.keyed_entries(id) {
                Ok(entries) => Frame::Keyed {
                    entries,
                    first: true,
                },
                Err(_) => {
                    prefix.push_str("null");
                    return prefix;
                }
            },
            NodeData::List => Frame::List {
                children: self.tree.list_children(id).unwrap_or(&[]).iter(),
                first: true,
            },
        };
        let bracket = if matches!(frame, Frame::List { .. }) {
            '['
        } else {
            '{'
        };
        self.stack.push(frame);
        prefix.push_str(&format!(
            "{{{}:{},{}:{bracket}",
            quoted(LIVEBLOCKS_TYPE),
            quoted(live_tag(node.kind())),
            quoted(DATA)
        ));
        prefix
    }

}

impl Iterator for EncodeLazy<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if let Some(id) = self.start.take() {
            if self.tree.contains(id) {
                return Some(self.open(id, String::new()));
            }
            return None;
        }

        let (prefix, child) = match self.stack.last_mut()? {
            Frame::Keyed { entries, first } => match entries.next() {
                Some((key, KeyedEntry::Field(value))) => {
                    return Some(format!("{}{}:{value}", separator(first), quoted(key)));
                }
                Some((key, KeyedEntry::Child(child))) => {
                    (format!("{}{}:", separator(first), quoted(key)), child)
                }
                None => {
                    self.stack.pop();
                    return Some("}}".to_string());
                }
            },
            Frame::List { children, first } => match children.next() {
                Some((_, child)) => (separator(first).to_string(), child),
                None => {
                    self.stack.pop();
                    return Some("]}".to_string());
                }
            },
        };
        Some(self.open(child.as_str(), prefix))
    }
}

/// `""` for the first entry of a container, `","` after that.
fn separator(first: &mut bool) -> &'static str {
    if std::mem::take(first) { "" } else { "," }
}

fn quoted(s: &str) -> String {
    Json::from(s).to_string()
}
