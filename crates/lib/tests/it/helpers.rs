//! Shared fixtures: rooms wired to an in-process server.

use livetree::{
    Json, NodeId, Room, RoomConfig,
    transport::{LoopbackServer, NullTransport},
};
use serde_json::json;

/// A room plus its read cursor into the server log.
pub struct Client {
    pub room: Room,
    cursor: usize,
}

/// Several clients sharing one [`LoopbackServer`]. Client `i` has actor `i + 1`.
///
/// Local mutations reach the server immediately; nothing reaches a client
/// until [`Cluster::deliver`] is called for it.
pub struct Cluster {
    pub server: LoopbackServer,
    pub clients: Vec<Client>,
}

impl Cluster {
    pub fn new(count: usize) -> Self {
        let server = LoopbackServer::new();
        let clients = (0..count)
            .map(|i| Client {
                room: Room::new(
                    RoomConfig::default().with_actor(i as u32 + 1),
                    Box::new(server.connect()),
                ),
                cursor: 0,
            })
            .collect();
        Self { server, clients }
    }

    /// A cluster where client 0 created `root.list` holding `values`, already
    /// delivered everywhere.
    pub fn with_list(count: usize, values: &[&str]) -> (Self, NodeId) {
        let mut cluster = Self::new(count);
        let room = cluster.room(0);
        room.object_set(&NodeId::root(), "list", live_list(values))
            .expect("create list");
        let list = room
            .child_at(&NodeId::root(), "list")
            .expect("list exists");
        cluster.deliver_all();
        (cluster, list)
    }

    pub fn room(&mut self, i: usize) -> &mut Room {
        &mut self.clients[i].room
    }

    /// Delivers everything the server has sequenced that client `i` has not seen.
    pub fn deliver(&mut self, i: usize) {
        let client = &mut self.clients[i];
        let (ops, cursor) = self.server.ops_since(client.cursor);
        client.cursor = cursor;
        client.room.apply_remote_ops(ops);
    }

    pub fn deliver_all(&mut self) {
        for i in 0..self.clients.len() {
            self.deliver(i);
        }
    }

    /// Plain value of `root.list` as client `i` sees it.
    pub fn list(&self, i: usize) -> Json {
        self.clients[i]
            .room
            .object_get(&NodeId::root(), "list")
            .unwrap_or(Json::Null)
    }

    /// Asserts every client and the server hold the same confirmed tree and
    /// nothing is pending.
    pub fn assert_converged(&self) {
        let server = self.server.tree();
        for (i, client) in self.clients.iter().enumerate() {
            assert!(
                client.room.pending_ops().is_empty(),
                "client {i} still has pending ops"
            );
            assert_eq!(
                client.room.confirmed_tree(),
                &server,
                "client {i} diverged from the server"
            );
            assert_eq!(client.room.to_immutable(), self.clients[0].room.to_immutable());
        }
    }
}

/// PlainLson for a list of strings.
pub fn live_list(values: &[&str]) -> Json {
    json!({"liveblocksType": "LiveList", "data": values})
}

/// A room that sends nowhere.
pub fn offline_room(actor: u32) -> Room {
    Room::new(RoomConfig::default().with_actor(actor), Box::new(NullTransport))
}
