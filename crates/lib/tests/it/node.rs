//! NodeTree snapshots in wire form.

use livetree::{
    NodeKind, NodeTree,
    node::{SerializedNode, TreeError},
};
use serde_json::json;

fn snapshot(value: serde_json::Value) -> Vec<SerializedNode> {
    serde_json::from_value(value).unwrap()
}

fn sample() -> Vec<SerializedNode> {
    snapshot(json!([
        ["root", {"type": "Object", "data": {"title": "todo", "done": null}}],
        ["1:0", {"type": "List", "parentId": "root", "parentKey": "items"}],
        ["1:1", {"type": "Register", "parentId": "1:0", "parentKey": "Q", "data": "milk"}],
        ["1:2", {"type": "Register", "parentId": "1:0", "parentKey": "P", "data": null}],
        ["1:3", {"type": "Map", "parentId": "root", "parentKey": "tags"}],
        ["1:4", {"type": "Object", "parentId": "1:3", "parentKey": "red", "data": {"hex": "#f00"}}]
    ]))
}

#[test]
fn test_snapshot_builds_tree() {
    let tree = NodeTree::from_serialized(sample()).unwrap();
    assert_eq!(tree.node_count(), 6);
    assert_eq!(tree.kind("1:3").unwrap(), NodeKind::Map);
    assert_eq!(
        tree.to_immutable("root").unwrap(),
        json!({
            "title": "todo",
            "done": null,
            "items": [null, "milk"],
            "tags": {"red": {"hex": "#f00"}}
        })
    );
}

#[test]
fn test_snapshot_order_does_not_matter() {
    let mut nodes = sample();
    nodes.reverse();
    let reversed = NodeTree::from_serialized(nodes).unwrap();
    assert_eq!(reversed, NodeTree::from_serialized(sample()).unwrap());
}

#[test]
fn test_serialize_is_parent_first_and_round_trips() {
    let tree = NodeTree::from_serialized(sample()).unwrap();
    let nodes = tree.serialize();
    let mut seen = std::collections::HashSet::new();
    for SerializedNode(id, crdt) in &nodes {
        if let Some(parent) = &crdt.parent_id {
            assert!(seen.contains(parent), "{id} emitted before its parent {parent}");
        }
        seen.insert(id.clone());
    }
    let text = serde_json::to_string(&nodes).unwrap();
    let again: Vec<SerializedNode> = serde_json::from_str(&text).unwrap();
    assert_eq!(NodeTree::from_serialized(again).unwrap(), tree);
}

#[test]
fn test_orphan_is_rejected() {
    let nodes = snapshot(json!([
        ["root", {"type": "Object", "data": {}}],
        ["1:1", {"type": "Register", "parentId": "1:9", "parentKey": "a", "data": 1}]
    ]));
    let err = NodeTree::from_serialized(nodes).unwrap_err();
    assert!(matches!(err, TreeError::ParentNotFound { .. }));
}

#[test]
fn test_cycle_is_rejected() {
    let nodes = snapshot(json!([
        ["root", {"type": "Object", "data": {}}],
        ["1:1", {"type": "Map", "parentId": "1:2", "parentKey": "a"}],
        ["1:2", {"type": "Map", "parentId": "1:1", "parentKey": "b"}]
    ]));
    let err = NodeTree::from_serialized(nodes).unwrap_err();
    assert!(matches!(err, TreeError::Cycle { .. }));
    assert!(err.is_structural());
}

#[test]
fn test_duplicate_ids_are_rejected() {
    let nodes = snapshot(json!([
        ["root", {"type": "Object", "data": {}}],
        ["1:1", {"type": "Map", "parentId": "root", "parentKey": "a"}],
        ["1:1", {"type": "Map", "parentId": "root", "parentKey": "b"}]
    ]));
    assert!(matches!(
        NodeTree::from_serialized(nodes),
        Err(TreeError::DuplicateNode { .. })
    ));
}

#[test]
fn test_missing_root_is_rejected() {
    let nodes = snapshot(json!([
        ["1:1", {"type": "Map", "parentId": "root", "parentKey": "a"}]
    ]));
    assert!(NodeTree::from_serialized(nodes).unwrap_err().is_not_found());
}

#[test]
fn test_bad_list_position_is_rejected() {
    let nodes = snapshot(json!([
        ["root", {"type": "Object", "data": {}}],
        ["1:0", {"type": "List", "parentId": "root", "parentKey": "l"}],
        ["1:1", {"type": "Register", "parentId": "1:0", "parentKey": "a!", "data": 1}]
    ]));
    assert!(matches!(
        NodeTree::from_serialized(nodes),
        Err(TreeError::InvalidParentKey { .. })
    ));
}

#[test]
fn test_register_under_object_is_rejected() {
    let nodes = snapshot(json!([
        ["root", {"type": "Object", "data": {}}],
        ["1:1", {"type": "Register", "parentId": "root", "parentKey": "a", "data": 1}]
    ]));
    assert!(NodeTree::from_serialized(nodes).is_err());
}

#[test]
fn test_null_register_survives_round_trip() {
    let tree = NodeTree::from_serialized(sample()).unwrap();
    let node = tree.get("1:2").unwrap();
    assert_eq!(node.register_value(), Some(&serde_json::Value::Null));
    let wire = serde_json::to_value(node.to_serialized()).unwrap();
    assert_eq!(wire[1]["data"], serde_json::Value::Null);
    assert!(wire[1].as_object().unwrap().contains_key("data"));
}
