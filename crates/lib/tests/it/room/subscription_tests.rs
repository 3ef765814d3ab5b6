use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use livetree::NodeId;
use serde_json::json;

use crate::helpers::{Cluster, live_list, offline_room};

fn counter() -> (Arc<AtomicUsize>, impl FnMut(&[NodeId]) + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = Arc::clone(&count);
    (count, move |_: &[NodeId]| {
        inner.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_shallow_subscriber_sees_own_node_only() {
    let mut room = offline_room(1);
    let root = NodeId::root();
    room.object_set(&root, "list", live_list(&["a"])).unwrap();
    let list = room.child_at(&root, "list").unwrap();

    let (list_hits, on_list) = counter();
    let (root_hits, on_root) = counter();
    room.subscribe(list.clone(), false, on_list);
    room.subscribe(root.clone(), false, on_root);

    room.list_push(&list, json!("b")).unwrap();
    assert_eq!(list_hits.load(Ordering::SeqCst), 1);
    assert_eq!(root_hits.load(Ordering::SeqCst), 0);

    // Content of an element changes the element, not the list.
    room.list_set(&list, 0, json!("z")).unwrap();
    assert_eq!(list_hits.load(Ordering::SeqCst), 1);

    room.list_move(&list, 0, 2).unwrap();
    assert_eq!(list_hits.load(Ordering::SeqCst), 2);
}

#[test]
fn test_deep_subscriber_sees_descendants() {
    let mut room = offline_room(1);
    let root = NodeId::root();
    room.object_set(&root, "list", live_list(&["a"])).unwrap();
    let list = room.child_at(&root, "list").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    room.subscribe(root.clone(), true, move |ids: &[NodeId]| {
        sink.lock().unwrap().extend_from_slice(ids);
    });

    room.list_set(&list, 0, json!("z")).unwrap();
    let element = room.list_id_at(&list, 0).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![element]);

    room.list_delete(&list, 0).unwrap();
    assert!(seen.lock().unwrap().contains(&list));
}

#[test]
fn test_unsubscribe_stops_notifications() {
    let mut room = offline_room(1);
    let root = NodeId::root();
    let (hits, callback) = counter();
    let id = room.subscribe(root.clone(), false, callback);
    room.object_set(&root, "a", json!(1)).unwrap();
    assert!(room.unsubscribe(id));
    assert!(!room.unsubscribe(id));
    room.object_set(&root, "a", json!(2)).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_batch_notifies_once() {
    let mut room = offline_room(1);
    let root = NodeId::root();
    room.object_set(&root, "list", live_list(&[])).unwrap();
    let list = room.child_at(&root, "list").unwrap();
    let (hits, callback) = counter();
    room.subscribe(list.clone(), false, callback);

    room.batch(|room| {
        for i in 0..5 {
            room.list_push(&list, json!(i)).unwrap();
        }
    })
    .unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_remote_changes_notify_but_own_acks_do_not() {
    let (mut cluster, list) = Cluster::with_list(2, &["a"]);
    let (hits, callback) = counter();
    cluster.room(0).subscribe(list.clone(), false, callback);

    cluster.room(0).list_push(&list, json!("b")).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    cluster.deliver(0);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    cluster.room(1).list_push(&list, json!("c")).unwrap();
    cluster.deliver(0);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
