//! Lazy PlainLson decoder.

use std::slice;

use serde_json::map;

use super::{DecodeError, LiveValue, classify, is_live, live_tag};
use crate::{
    Fields, Json,
    clock::IdClock,
    node::{NodeData, NodeId, NodeKind, NodeTree, ParentLink, StorageNode},
    position::{PositionAllocator, PositionSequence},
};

/// Decodes a whole document into storage nodes.
///
/// The root keeps the fixed root id; every other container and every
/// Map/List scalar gets a fresh id from `ids`. Nodes come out in pre-order,
/// so each node's parent has always been yielded before it.
///
/// The walk happens as the iterator is pulled and keeps only one frame per
/// nesting level. After the first error it yields nothing more.
pub fn decode<'a>(doc: &'a Json, ids: &'a mut IdClock) -> Decode<'a> {
    Decode::new(Start::Root(doc), ids)
}

/// Decodes a whole document, failing if any part of it is invalid.
pub fn decode_all(doc: &Json, ids: &mut IdClock) -> Result<Vec<StorageNode>, DecodeError> {
    decode(doc, ids).collect()
}

/// Decodes a whole document into a tree, keeping the document's key order.
///
/// Object keys keep their order even where scalar fields and child
/// containers are interleaved.
pub fn decode_tree(doc: &Json, ids: &mut IdClock) -> crate::Result<NodeTree> {
    let mut decoder = decode(doc, ids);
    let mut failed = None;
    let built = NodeTree::from_nodes(decoder.by_ref().map_while(|item| match item {
        Ok(node) => Some(node),
        Err(error) => {
            failed = Some(error);
            None
        }
    }));
    if let Some(error) = failed {
        return Err(error.into());
    }
    let mut tree = built?;
    for (id, keys) in &decoder.layouts {
        tree.order_keys(id.as_str(), keys.iter().map(String::as_str));
    }
    Ok(tree)
}

/// Decodes one PlainLson value as a new subtree attached at `parent`.
///
/// A container becomes a subtree; a plain value becomes a single Register.
pub fn decode_value<'a>(value: &'a Json, parent: ParentLink, ids: &'a mut IdClock) -> Decode<'a> {
    Decode::new(Start::Value { parent, value }, ids)
}

enum Start<'a> {
    Root(&'a Json),
    Value { parent: ParentLink, value: &'a Json },
}

/// One container whose children are still being walked.
enum Frame<'a> {
    Object {
        id: NodeId,
        path: String,
        entries: map::Iter<'a>,
    },
    Map {
        id: NodeId,
        path: String,
        entries: map::Iter<'a>,
    },
    List {
        id: NodeId,
        path: String,
        items: slice::Iter<'a, Json>,
        positions: PositionSequence,
        index: usize,
    },
}

/// Iterator returned by [`decode`] and [`decode_value`].
pub struct Decode<'a> {
    ids: &'a mut IdClock,
    positions: PositionAllocator,
    start: Option<Start<'a>>,
    stack: Vec<Frame<'a>>,
    /// Key order of Objects that put a container key before a scalar one
    layouts: Vec<(NodeId, Vec<String>)>,
    done: bool,
}

impl<'a> Decode<'a> {
    fn new(start: Start<'a>, ids: &'a mut IdClock) -> Self {
        Self {
            positions: PositionAllocator::new(ids.actor()),
            ids,
            start: Some(start),
            stack: Vec::new(),
            layouts: Vec::new(),
            done: false,
        }
    }

    fn step(&mut self) -> Option<Result<StorageNode, DecodeError>> {
        if let Some(start) = self.start.take() {
            return Some(match start {
                Start::Root(doc) => self.root(doc),
                Start::Value { parent, value } => self.node(parent, value, "$".to_string()),
            });
        }

        loop {
            let next = match self.stack.last_mut()? {
                Frame::Object { id, path, entries } => entries
                    // Scalars were stored inline when the object was opened.
                    .find(|(_, value)| is_live(value))
                    .map(|(key, value)| {
                        (
                            ParentLink::field(id.clone(), key.clone()),
                            value,
                            format!("{path}.{key}"),
                        )
                    }),
                Frame::Map { id, path, entries } => entries.next().map(|(key, value)| {
                    (
                        ParentLink::field(id.clone(), key.clone()),
                        value,
                        format!("{path}.{key}"),
                    )
                }),
                Frame::List {
                    id,
                    path,
                    items,
                    positions,
                    index,
                } => match (items.next(), positions.next()) {
                    (Some(value), Some(position)) => {
                        let at = *index;
                        *index += 1;
                        Some((
                            ParentLink::position(id.clone(), position),
                            value,
                            format!("{path}[{at}]"),
                        ))
                    }
                    _ => None,
                },
            };
            match next {
                Some((parent, value, path)) => return Some(self.node(parent, value, path)),
                None => {
                    self.stack.pop();
                }
            }
        }
    }

    fn root(&mut self, doc: &'a Json) -> Result<StorageNode, DecodeError> {
        match classify(doc, "$")? {
            LiveValue::Container(NodeKind::Object, data) => {
                let id = NodeId::root();
                let data = self.open(id.clone(), NodeKind::Object, data, "$".to_string())?;
                Ok(StorageNode {
                    id,
                    parent: None,
                    data,
                })
            }
            LiveValue::Container(kind, _) => Err(DecodeError::RootNotObject {
                found: live_tag(kind).to_string(),
            }),
            LiveValue::Scalar(value) => Err(DecodeError::RootNotObject {
                found: json_type(value).to_string(),
            }),
        }
    }

    fn node(
        &mut self,
        parent: ParentLink,
        value: &'a Json,
        path: String,
    ) -> Result<StorageNode, DecodeError> {
        match classify(value, &path)? {
            LiveValue::Scalar(value) => Ok(StorageNode::new(
                self.ids.next_node_id(),
                parent,
                NodeData::Register(value.clone()),
            )),
            LiveValue::Container(kind, data) => {
                let id = self.ids.next_node_id();
                let data = self.open(id.clone(), kind, data, path)?;
                Ok(StorageNode::new(id, parent, data))
            }
        }
    }

    /// Builds the node payload and pushes a frame for the container's children.
    fn open(
        &mut self,
        id: NodeId,
        kind: NodeKind,
        data: &'a Json,
        path: String,
    ) -> Result<NodeData, DecodeError> {
        match (kind, data) {
            (NodeKind::Object, Json::Object(entries)) => {
                let mut fields = Fields::new();
                let (mut seen_container, mut interleaved) = (false, false);
                for (key, value) in entries {
                    match classify(value, &format!("{path}.{key}"))? {
                        LiveValue::Scalar(value) => {
                            interleaved |= seen_container;
                            fields.insert(key.clone(), value.clone());
                        }
                        LiveValue::Container(..) => seen_container = true,
                    }
                }
                if interleaved {
                    self.layouts.push((id.clone(), entries.keys().cloned().collect()));
                }
                self.stack.push(Frame::Object {
                    id,
                    path,
                    entries: entries.iter(),
                });
                Ok(NodeData::Object(fields))
            }
            (NodeKind::Map, Json::Object(entries)) => {
                self.stack.push(Frame::Map {
                    id,
                    path,
                    entries: entries.iter(),
                });
                Ok(NodeData::Map)
            }
            (NodeKind::List, Json::Array(items)) => {
                self.stack.push(Frame::List {
                    id,
                    path,
                    items: items.iter(),
                    positions: self.positions.sequence(items.len()),
                    index: 0,
                });
                Ok(NodeData::List)
            }
            _ => Err(DecodeError::MalformedContainer {
                path,
                reason: format!("unexpected payload for {kind}"),
            }),
        }
    }
}

impl Iterator for Decode<'_> {
    type Item = Result<StorageNode, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.step();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
            self.stack.clear();
        }
        item
    }
}

fn json_type(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "a plain object",
    }
}
