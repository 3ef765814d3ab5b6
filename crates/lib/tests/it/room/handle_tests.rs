use livetree::{NodeId, Room, RoomConfig, RoomHandle, transport::ChannelTransport};
use serde_json::json;

use crate::helpers::live_list;

fn spawn(actor: u32) -> (RoomHandle, tokio::sync::mpsc::UnboundedReceiver<Vec<livetree::Op>>) {
    let (transport, outbox) = ChannelTransport::new();
    let room = Room::new(RoomConfig::default().with_actor(actor), Box::new(transport));
    (RoomHandle::spawn(room), outbox)
}

#[tokio::test]
async fn test_handle_runs_mutations_in_order() {
    let (handle, mut outbox) = spawn(1);
    handle
        .with(|room| room.object_set(&NodeId::root(), "list", live_list(&["a"])))
        .await
        .unwrap()
        .unwrap();
    for value in ["b", "c"] {
        handle
            .with(move |room| {
                let list = room.child_at(&NodeId::root(), "list").unwrap();
                room.list_push(&list, json!(value))
            })
            .await
            .unwrap()
            .unwrap();
    }
    assert_eq!(handle.to_immutable().await.unwrap(), json!({"list": ["a", "b", "c"]}));

    let mut messages = 0;
    while let Ok(ops) = outbox.try_recv() {
        assert!(!ops.is_empty());
        messages += 1;
    }
    assert_eq!(messages, 3);
}

#[tokio::test]
async fn test_two_handles_converge_through_their_outboxes() {
    let (first, mut first_out) = spawn(1);
    let (second, mut second_out) = spawn(2);

    first
        .with(|room| room.object_set(&NodeId::root(), "list", live_list(&[])))
        .await
        .unwrap()
        .unwrap();
    let created = first_out.recv().await.unwrap();
    // The server would sequence this and echo it to everyone.
    first.apply_remote_ops(created.clone()).await.unwrap();
    second.apply_remote_ops(created).await.unwrap();

    let push = |value: &'static str| {
        move |room: &mut Room| {
            let list = room.child_at(&NodeId::root(), "list").unwrap();
            room.list_push(&list, json!(value))
        }
    };
    first.with(push("A")).await.unwrap().unwrap();
    second.with(push("B")).await.unwrap().unwrap();

    let mut log = first_out.recv().await.unwrap();
    log.extend(second_out.recv().await.unwrap());
    first.apply_remote_ops(log.clone()).await.unwrap();
    second.apply_remote_ops(log).await.unwrap();

    let expected = json!({"list": ["A", "B"]});
    assert_eq!(first.to_immutable().await.unwrap(), expected);
    assert_eq!(second.to_immutable().await.unwrap(), expected);
    assert!(first.with(|room| room.pending_ops().is_empty()).await.unwrap());
}

#[tokio::test]
async fn test_initial_storage_through_handle() {
    let (handle, _outbox) = spawn(1);
    let nodes = serde_json::from_value(json!([
        ["root", {"type": "Object", "data": {"title": "hi"}}]
    ]))
    .unwrap();
    handle.apply_initial_storage(nodes).await.unwrap();
    assert_eq!(handle.to_immutable().await.unwrap(), json!({"title": "hi"}));

    let orphan = serde_json::from_value(json!([
        ["root", {"type": "Object", "data": {}}],
        ["1:0", {"type": "Map", "parentId": "9:9", "parentKey": "x"}]
    ]))
    .unwrap();
    let err = handle.apply_initial_storage(orphan).await.unwrap_err();
    assert!(err.is_structural_error());
    assert_eq!(handle.to_immutable().await.unwrap(), json!({"title": "hi"}));
}

#[tokio::test]
async fn test_shutdown_closes_handle() {
    let (handle, _outbox) = spawn(1);
    let clone = handle.clone();
    handle.shutdown().await.unwrap();
    let err = clone.with(|room| room.actor()).await.unwrap_err();
    assert!(err.is_closed());
}
