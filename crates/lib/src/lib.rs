//!
//! Livetree: the client-side replicated storage engine of a collaborative
//! document.
//!
//! A document is a tree of typed nodes that many clients mutate at once. Each
//! client applies its own changes immediately and sends them as operations;
//! the server rebroadcasts every operation in a single per-room total order,
//! and replaying that order yields the same tree on every client.
//!
//! ## Core Concepts
//!
//! * **Positions (`position::Position`)**: Densely orderable string keys that order list children
//!   independently of numeric indices. `position::PositionAllocator` hands them out.
//! * **Nodes (`node::StorageNode`)**: Object, Map, List and Register nodes, stored flat by id in a
//!   `node::NodeTree` with parent links and per-parent child indices.
//! * **Operations (`op::Op`)**: The wire unit of change. `resolver::apply_op` applies one operation
//!   to a tree and decides what wins when operations race.
//! * **Rooms (`room::Room`)**: One client's replica. It turns index-based list calls and field writes
//!   into operations, keeps confirmed and speculative state apart, and offers subscriptions and undo.
//!   `room::RoomHandle` runs a room on its own tokio task.
//! * **PlainLson (`plain_lson`)**: The nested JSON interchange format, with a lazy decoder and both
//!   eager and streaming encoders.

pub mod clock;
pub mod constants;
pub mod node;
pub mod op;
pub mod plain_lson;
pub mod position;
pub mod resolver;
pub mod room;
pub mod transport;

pub use node::{NodeId, NodeKind, NodeTree, StorageNode};
pub use op::{Op, OpKind};
pub use position::{Position, PositionAllocator};
pub use room::{Room, RoomConfig, RoomHandle};

/// A JSON value: register content, object fields, PlainLson documents.
pub type Json = serde_json::Value;

/// Insertion-ordered scalar fields of an Object node.
pub type Fields = serde_json::Map<String, Json>;

/// Result type used throughout the livetree library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the livetree library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured errors from the node model
    #[error(transparent)]
    Tree(node::TreeError),

    /// Structured errors from the PlainLson decoder
    #[error(transparent)]
    Decode(plain_lson::DecodeError),

    /// Structured errors from the room
    #[error(transparent)]
    Room(room::RoomError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Tree(_) => "node",
            Error::Decode(_) => "plain_lson",
            Error::Room(_) => "room",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error indicates a node or parent was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Tree(tree_err) => tree_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is structural (missing nodes, cycles, occupied keys).
    pub fn is_structural_error(&self) -> bool {
        match self {
            Error::Tree(tree_err) => tree_err.is_structural(),
            Error::Room(room::RoomError::InvalidSnapshot(tree_err)) => tree_err.is_structural(),
            _ => false,
        }
    }

    /// Check if this error is a node kind mismatch.
    pub fn is_type_error(&self) -> bool {
        match self {
            Error::Tree(tree_err) => tree_err.is_type_mismatch(),
            Error::Decode(decode_err) => decode_err.is_type_error(),
            _ => false,
        }
    }

    /// Check if this error came from decoding a PlainLson document.
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Error::Decode(_))
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    /// Check if this error means the room's actor has shut down.
    pub fn is_closed(&self) -> bool {
        match self {
            Error::Room(room_err) => room_err.is_closed(),
            _ => false,
        }
    }
}
