use livetree::{NodeId, Room, RoomConfig, transport::NullTransport};
use serde_json::json;

use crate::helpers::{Cluster, live_list, offline_room};

fn room_with_list(values: &[&str]) -> (Room, NodeId) {
    let mut room = offline_room(1);
    room.object_set(&NodeId::root(), "list", live_list(values))
        .unwrap();
    let list = room.child_at(&NodeId::root(), "list").unwrap();
    room.clear_history();
    (room, list)
}

#[test]
fn test_undo_redo_insert() {
    let (mut room, list) = room_with_list(&["A"]);
    room.list_push(&list, json!("B")).unwrap();
    assert!(room.undo().unwrap());
    assert_eq!(room.to_immutable(), json!({"list": ["A"]}));
    assert!(room.can_redo());
    assert!(room.redo().unwrap());
    assert_eq!(room.to_immutable(), json!({"list": ["A", "B"]}));
    assert!(!room.can_redo());
}

#[test]
fn test_undo_delete_recreates_with_fresh_ids() {
    let mut room = offline_room(1);
    let root = NodeId::root();
    room.object_set(&root, "todos", live_list(&[])).unwrap();
    let todos = room.child_at(&root, "todos").unwrap();
    room.list_push(
        &todos,
        json!({"liveblocksType": "LiveObject", "data": {
            "text": "milk",
            "tags": {"liveblocksType": "LiveList", "data": ["x"]}
        }}),
    )
    .unwrap();
    let original = room.list_id_at(&todos, 0).unwrap();
    let snapshot = room.to_immutable();

    room.list_delete(&todos, 0).unwrap();
    assert_eq!(room.to_immutable(), json!({"todos": []}));
    room.undo().unwrap();
    assert_eq!(room.to_immutable(), snapshot);

    let recreated = room.list_id_at(&todos, 0).unwrap();
    assert_ne!(recreated, original);
    assert!(room.tree().is_tombstoned(original.as_str()));

    // Redo deletes the recreated node, undo brings it back again.
    room.redo().unwrap();
    assert_eq!(room.to_immutable(), json!({"todos": []}));
    room.undo().unwrap();
    assert_eq!(room.to_immutable(), snapshot);
}

#[test]
fn test_undo_after_recreate_targets_new_id() {
    let (mut room, list) = room_with_list(&["A"]);
    room.list_set(&list, 0, json!("B")).unwrap();
    room.list_delete(&list, 0).unwrap();
    room.undo().unwrap();
    // The set is undone on the recreated node.
    room.undo().unwrap();
    assert_eq!(room.to_immutable(), json!({"list": ["A"]}));
}

#[test]
fn test_undo_move_and_set() {
    let (mut room, list) = room_with_list(&["A", "B", "C"]);
    room.list_move(&list, 0, 3).unwrap();
    room.list_set(&list, 0, json!("X")).unwrap();
    assert_eq!(room.to_immutable(), json!({"list": ["X", "C", "A"]}));
    room.undo().unwrap();
    assert_eq!(room.to_immutable(), json!({"list": ["B", "C", "A"]}));
    room.undo().unwrap();
    assert_eq!(room.to_immutable(), json!({"list": ["A", "B", "C"]}));
    assert!(!room.undo().unwrap());
}

#[test]
fn test_undo_object_fields() {
    let mut room = offline_room(1);
    let root = NodeId::root();
    room.object_set(&root, "a", json!(1)).unwrap();
    room.object_set(&root, "a", json!(null)).unwrap();
    room.object_set(&root, "a", live_list(&["x"])).unwrap();
    room.object_delete(&root, "a").unwrap();

    room.undo().unwrap();
    assert_eq!(room.to_immutable(), json!({"a": ["x"]}));
    room.undo().unwrap();
    assert_eq!(room.to_immutable(), json!({"a": null}));
    room.undo().unwrap();
    assert_eq!(room.to_immutable(), json!({"a": 1}));
    room.undo().unwrap();
    assert_eq!(room.to_immutable(), json!({}));
}

#[test]
fn test_new_mutation_clears_redo() {
    let (mut room, list) = room_with_list(&["A"]);
    room.list_push(&list, json!("B")).unwrap();
    room.undo().unwrap();
    room.list_push(&list, json!("C")).unwrap();
    assert!(!room.can_redo());
    assert!(!room.redo().unwrap());
}

#[test]
fn test_batch_is_one_step_and_one_message() {
    let (mut cluster, list) = Cluster::with_list(2, &["A"]);
    cluster.room(0).clear_history();
    let sent = cluster.server.len();
    cluster
        .room(0)
        .batch(|room| {
            room.list_push(&list, json!("B"))?;
            room.list_push(&list, json!("C"))?;
            room.list_delete(&list, 0)
        })
        .unwrap()
        .unwrap();
    assert_eq!(cluster.server.len(), sent + 3);
    assert_eq!(cluster.list(0), json!(["B", "C"]));

    cluster.room(0).undo().unwrap();
    assert_eq!(cluster.list(0), json!(["A"]));
    assert!(!cluster.room(0).can_undo());
    cluster.deliver_all();
    cluster.assert_converged();
}

#[test]
fn test_history_is_rejected_inside_batch() {
    let (mut room, list) = room_with_list(&["A"]);
    room.list_push(&list, json!("B")).unwrap();
    let err = room.batch(|room| room.undo()).unwrap().unwrap_err();
    assert!(matches!(
        err,
        livetree::Error::Room(livetree::room::RoomError::HistoryInBatch)
    ));
    assert!(room.batch(|room| room.redo()).unwrap().is_err());
    assert!(room.can_undo());
}

#[test]
fn test_history_limit() {
    let mut room = Room::new(
        RoomConfig::default().with_actor(1).with_history_limit(2),
        Box::new(NullTransport),
    );
    let root = NodeId::root();
    for i in 0..5 {
        room.object_set(&root, "n", json!(i)).unwrap();
    }
    assert!(room.undo().unwrap());
    assert!(room.undo().unwrap());
    assert!(!room.undo().unwrap());
    assert_eq!(room.to_immutable(), json!({"n": 2}));
}

#[test]
fn test_remote_ops_are_not_undone() {
    let (mut cluster, list) = Cluster::with_list(2, &["A"]);
    cluster.room(0).clear_history();
    cluster.room(1).list_push(&list, json!("B")).unwrap();
    cluster.deliver_all();
    assert!(!cluster.room(0).can_undo());
    cluster.room(0).list_set(&list, 0, json!("X")).unwrap();
    cluster.room(0).undo().unwrap();
    cluster.deliver_all();
    cluster.assert_converged();
    assert_eq!(cluster.list(1), json!(["A", "B"]));
}

#[test]
fn test_undo_of_remotely_deleted_node_is_noop() {
    let (mut cluster, list) = Cluster::with_list(2, &["A", "B"]);
    cluster.room(0).clear_history();
    cluster.room(0).list_set(&list, 0, json!("X")).unwrap();
    cluster.room(1).list_delete(&list, 0).unwrap();
    cluster.deliver_all();
    assert_eq!(cluster.list(0), json!(["B"]));

    cluster.room(0).undo().unwrap();
    cluster.deliver_all();
    cluster.assert_converged();
    assert_eq!(cluster.list(0), json!(["B"]));
}
