use serde_json::json;

use crate::helpers::Cluster;

/// Runs `first` on client 0 and `second` on client 1 without either seeing
/// the other, in both server orders, and returns the converged lists.
fn race(
    initial: &[&str],
    first: impl Fn(&mut Cluster, &livetree::NodeId),
    second: impl Fn(&mut Cluster, &livetree::NodeId),
) -> (serde_json::Value, serde_json::Value) {
    let mut outcomes = Vec::new();
    for client_zero_first in [true, false] {
        let (mut cluster, list) = Cluster::with_list(2, initial);
        if client_zero_first {
            first(&mut cluster, &list);
            second(&mut cluster, &list);
        } else {
            second(&mut cluster, &list);
            first(&mut cluster, &list);
        }
        cluster.deliver_all();
        cluster.assert_converged();
        outcomes.push(cluster.list(0));
    }
    (outcomes.remove(0), outcomes.remove(0))
}

#[test]
fn test_move_and_set_converge() {
    let (a, b) = race(
        &["A", "B"],
        |c, list| c.room(0).list_move(list, 0, 1).unwrap(),
        |c, list| c.room(1).list_set(list, 0, json!("C")).unwrap(),
    );
    assert_eq!(a, json!(["C", "B"]));
    assert_eq!(b, json!(["C", "B"]));
}

#[test]
fn test_real_move_and_set_commute() {
    let (a, b) = race(
        &["A", "B", "C"],
        |c, list| c.room(0).list_move(list, 0, 3).unwrap(),
        |c, list| c.room(1).list_set(list, 0, json!("X")).unwrap(),
    );
    assert_eq!(a, json!(["B", "C", "X"]));
    assert_eq!(b, a);
}

#[test]
fn test_concurrent_pushes_order_by_server() {
    let (mut cluster, list) = Cluster::with_list(2, &[]);
    cluster.room(0).list_push(&list, json!("A")).unwrap();
    cluster.room(1).list_push(&list, json!("B")).unwrap();

    // Each side sees only its own push until delivery.
    assert_eq!(cluster.list(0), json!(["A"]));
    assert_eq!(cluster.list(1), json!(["B"]));

    cluster.deliver_all();
    cluster.assert_converged();
    assert_eq!(cluster.list(0), json!(["A", "B"]));
}

#[test]
fn test_concurrent_pushes_in_reverse_send_order() {
    let (mut cluster, list) = Cluster::with_list(2, &[]);
    cluster.room(1).list_push(&list, json!("B")).unwrap();
    cluster.room(0).list_push(&list, json!("A")).unwrap();
    cluster.deliver_all();
    cluster.assert_converged();
    // Same neighbors, so the actor discriminator decides.
    assert_eq!(cluster.list(0), json!(["A", "B"]));
}

#[test]
fn test_delete_and_set_converge_to_delete() {
    let (a, b) = race(
        &["A", "B"],
        |c, list| c.room(0).list_delete(list, 0).unwrap(),
        |c, list| c.room(1).list_set(list, 0, json!("C")).unwrap(),
    );
    assert_eq!(a, json!(["B"]));
    assert_eq!(b, json!(["B"]));
}

#[test]
fn test_delete_and_container_set_converge() {
    let (a, b) = race(
        &["A", "B"],
        |c, list| c.room(0).list_delete(list, 0).unwrap(),
        |c, list| {
            c.room(1)
                .list_set(list, 0, json!({"liveblocksType": "LiveObject", "data": {"v": 1}}))
                .unwrap()
        },
    );
    // Delete first retires A and the replacement is dropped. Replacement
    // first retires A itself, so the late delete has nothing to remove.
    assert_eq!(a, json!(["B"]));
    assert_eq!(b, json!([{"v": 1}, "B"]));
}

#[test]
fn test_delete_and_move_converge() {
    let (a, b) = race(
        &["A", "B", "C"],
        |c, list| c.room(0).list_delete(list, 0).unwrap(),
        |c, list| c.room(1).list_move(list, 0, 3).unwrap(),
    );
    assert_eq!(a, json!(["B", "C"]));
    assert_eq!(b, a);
}

#[test]
fn test_concurrent_inserts_at_same_index() {
    let (a, b) = race(
        &["A", "B"],
        |c, list| c.room(0).list_insert(list, 1, json!("x")).unwrap(),
        |c, list| c.room(1).list_insert(list, 1, json!("y")).unwrap(),
    );
    assert_eq!(a, json!(["A", "x", "y", "B"]));
    assert_eq!(b, a);
}

#[test]
fn test_concurrent_sets_resolve_to_last_delivered() {
    let (mut cluster, list) = Cluster::with_list(2, &["A"]);
    cluster.room(0).list_set(&list, 0, json!("X")).unwrap();
    cluster.room(1).list_set(&list, 0, json!("Y")).unwrap();

    // Client 0 speculatively shows its own write until the server order arrives.
    assert_eq!(cluster.list(0), json!(["X"]));
    cluster.deliver(0);
    assert_eq!(cluster.list(0), json!(["Y"]));
    cluster.deliver(1);
    cluster.assert_converged();
}

#[test]
fn test_concurrent_moves_resolve_to_last_delivered() {
    let (mut cluster, list) = Cluster::with_list(2, &["A", "B", "C"]);
    cluster.room(0).list_move(&list, 0, 2).unwrap();
    cluster.room(1).list_move(&list, 0, 3).unwrap();
    cluster.deliver_all();
    cluster.assert_converged();
    assert_eq!(cluster.list(0), json!(["B", "C", "A"]));
}

#[test]
fn test_concurrent_map_sets_last_writer_wins() {
    let mut cluster = Cluster::new(2);
    let root = livetree::NodeId::root();
    cluster
        .room(0)
        .object_set(&root, "m", json!({"liveblocksType": "LiveMap", "data": {}}))
        .unwrap();
    cluster.deliver_all();
    let map = cluster.room(0).child_at(&root, "m").unwrap();

    cluster.room(0).map_set(&map, "k", json!(1)).unwrap();
    cluster
        .room(1)
        .map_set(&map, "k", json!({"liveblocksType": "LiveList", "data": [2]}))
        .unwrap();
    cluster.deliver_all();
    cluster.assert_converged();
    assert_eq!(cluster.room(0).map_get(&map, "k"), Some(json!([2])));
}

#[test]
fn test_object_fields_merge_per_key() {
    let mut cluster = Cluster::new(2);
    let root = livetree::NodeId::root();
    cluster.room(0).object_set(&root, "a", json!(1)).unwrap();
    cluster.room(1).object_set(&root, "b", json!(2)).unwrap();
    cluster.room(1).object_set(&root, "a", json!(3)).unwrap();
    cluster.room(0).object_delete(&root, "b").unwrap();
    cluster.deliver_all();
    cluster.assert_converged();
    assert_eq!(cluster.clients[0].room.to_immutable(), json!({"a": 3, "b": 2}));
}

#[test]
fn test_map_keys_keep_write_order_everywhere() {
    let mut cluster = Cluster::new(2);
    let root = livetree::NodeId::root();
    cluster
        .room(0)
        .object_set(&root, "m", json!({"liveblocksType": "LiveMap", "data": {}}))
        .unwrap();
    let map = cluster.room(0).child_at(&root, "m").unwrap();
    for (key, value) in [("b", 1), ("a", 2), ("c", 3)] {
        cluster.room(0).map_set(&map, key, json!(value)).unwrap();
    }
    // A replacement keeps the key where it was.
    cluster.room(0).map_set(&map, "a", json!("new")).unwrap();
    cluster.deliver_all();
    cluster.assert_converged();
    for client in &cluster.clients {
        assert_eq!(
            client.room.to_immutable()["m"].to_string(),
            r#"{"b":1,"a":"new","c":3}"#
        );
    }

    cluster.room(0).undo().unwrap();
    cluster.deliver_all();
    assert_eq!(
        cluster.clients[1].room.to_immutable()["m"].to_string(),
        r#"{"b":1,"a":2,"c":3}"#
    );
}
