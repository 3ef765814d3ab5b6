use livetree::{
    NodeId, NodeTree, Room, RoomConfig, resolver,
    transport::{LoopbackServer, NullTransport},
};
use serde_json::json;

use crate::helpers::{Cluster, live_list, offline_room};

#[test]
fn test_late_joiner_starts_from_snapshot() {
    let (mut cluster, list) = Cluster::with_list(1, &["a", "b"]);
    cluster.room(0).list_delete(&list, 0).unwrap();
    cluster.deliver_all();

    let mut late = Room::new(
        RoomConfig::default().with_actor(9),
        Box::new(cluster.server.connect()),
    );
    late.apply_initial_storage(cluster.server.snapshot()).unwrap();
    assert_eq!(late.to_immutable(), cluster.clients[0].room.to_immutable());

    late.list_push(&list, json!("c")).unwrap();
    cluster.deliver_all();
    assert_eq!(cluster.list(0), json!(["b", "c"]));
}

#[test]
fn test_pending_ops_replay_over_new_snapshot() {
    let (mut cluster, list) = Cluster::with_list(2, &["a"]);

    // A third client joins offline: its edit stays pending and never reaches the server.
    let mut offline = Room::new(RoomConfig::default().with_actor(3), Box::new(NullTransport));
    offline
        .apply_initial_storage(cluster.server.snapshot())
        .unwrap();
    offline.list_push(&list, json!("mine")).unwrap();

    cluster.room(1).list_set(&list, 0, json!("theirs")).unwrap();
    cluster.deliver_all();

    // Reconnect: fresh snapshot, pending op replayed on top.
    offline
        .apply_initial_storage(cluster.server.snapshot())
        .unwrap();
    assert_eq!(offline.to_immutable(), json!({"list": ["theirs", "mine"]}));
    assert_eq!(offline.pending_ops().len(), 1);

    // The server accepts the resent op and echoes it back as an ack.
    cluster.server.submit(offline.pending_ops().to_vec());
    let (ops, _) = cluster.server.ops_since(cluster.server.len() - 1);
    offline.apply_remote_ops(ops);
    assert!(offline.pending_ops().is_empty());
    cluster.deliver_all();
    assert_eq!(cluster.list(1), json!(["theirs", "mine"]));
    assert_eq!(offline.to_immutable(), cluster.clients[1].room.to_immutable());
}

#[test]
fn test_resend_pending_reaches_server() {
    let server = LoopbackServer::new();
    let mut room = Room::new(RoomConfig::default().with_actor(1), Box::new(server.connect()));
    room.object_set(&NodeId::root(), "a", json!(1)).unwrap();
    assert_eq!(server.len(), 1);
    room.resend_pending();
    assert_eq!(server.len(), 2);

    // A duplicate delivery of the same op is harmless.
    let (ops, _) = server.ops_since(0);
    room.apply_remote_ops(ops);
    assert!(room.pending_ops().is_empty());
    assert_eq!(room.to_immutable(), json!({"a": 1}));
}

#[test]
fn test_invalid_snapshot_keeps_current_state() {
    let mut room = Room::new(RoomConfig::default().with_actor(1), Box::new(NullTransport));
    room.object_set(&NodeId::root(), "l", live_list(&["x"])).unwrap();
    let before = room.to_immutable();
    let cycle = serde_json::from_value(json!([
        ["root", {"type": "Object", "data": {}}],
        ["1:0", {"type": "Map", "parentId": "1:1", "parentKey": "x"}],
        ["1:1", {"type": "Map", "parentId": "1:0", "parentKey": "y"}]
    ]))
    .unwrap();
    assert!(room.apply_initial_storage(cycle).is_err());
    assert_eq!(room.to_immutable(), before);
}

#[test]
fn test_server_tree_matches_replayed_log() {
    let (mut cluster, list) = Cluster::with_list(2, &["a", "b"]);
    cluster.room(0).list_move(&list, 0, 2).unwrap();
    cluster.room(1).list_delete(&list, 1).unwrap();
    cluster.deliver_all();

    let mut replayed = NodeTree::new();
    for op in cluster.server.ops_since(0).0 {
        livetree::resolver::apply_or_drop(&mut replayed, &op.kind);
    }
    assert_eq!(replayed, cluster.server.tree());
    cluster.assert_converged();
}

#[test]
fn test_late_ops_on_nodes_deleted_before_snapshot_are_ignored() {
    let (mut cluster, list) = Cluster::with_list(2, &["a", "b"]);
    let a = cluster.room(1).list_id_at(&list, 0).unwrap();
    cluster.room(0).list_delete(&list, 0).unwrap();
    let snapshot = cluster.server.snapshot();
    let cursor = cluster.server.len();
    // Client 1 has not seen the delete and edits the element it removed.
    cluster.room(1).list_set(&list, 0, json!("edited")).unwrap();

    let mut joined = offline_room(9);
    joined.apply_initial_storage(snapshot).unwrap();
    assert!(joined.tree().is_deleted(a.as_str()));
    assert!(!joined.tree().is_tombstoned(a.as_str()));

    let (late, _) = cluster.server.ops_since(cursor);
    assert_eq!(late.len(), 1);
    let mut tree = joined.tree().clone();
    let applied = resolver::apply_op(&mut tree, &late[0].kind).unwrap();
    assert!(applied.is_noop());

    joined.apply_remote_ops(late);
    assert_eq!(joined.to_immutable(), json!({"list": ["b"]}));
    cluster.deliver_all();
    assert_eq!(cluster.list(1), json!(["b"]));
}

#[test]
fn test_resync_remembers_ids_deleted_since_the_last_snapshot() {
    let (mut cluster, list) = Cluster::with_list(2, &["a", "b"]);
    let a = cluster.room(1).list_id_at(&list, 0).unwrap();
    cluster.room(0).list_delete(&list, 0).unwrap();

    // Client 1 reconnects without replaying the log.
    let snapshot = cluster.server.snapshot();
    let room = cluster.room(1);
    room.apply_initial_storage(snapshot).unwrap();
    assert!(room.confirmed_tree().is_tombstoned(a.as_str()));
    assert_eq!(room.to_immutable(), json!({"list": ["b"]}));
}
