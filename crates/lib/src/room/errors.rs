//! Error types for the room.

use thiserror::Error;

use crate::node::TreeError;

/// Errors raised by [`Room`](super::Room) and [`RoomHandle`](super::RoomHandle)
/// beyond those of the node model.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RoomError {
    /// The room's actor task has stopped
    #[error("room handle is closed")]
    HandleClosed,

    /// Initial storage from the server does not form a valid tree
    #[error("invalid initial storage: {0}")]
    InvalidSnapshot(#[source] TreeError),

    /// `batch` was called from inside another batch
    #[error("batches cannot be nested")]
    NestedBatch,

    /// `undo` or `redo` was called inside a batch
    #[error("undo and redo are not allowed inside a batch")]
    HistoryInBatch,
}

impl RoomError {
    /// Check if this error means the room's actor has shut down
    pub fn is_closed(&self) -> bool {
        matches!(self, RoomError::HandleClosed)
    }
}

impl From<RoomError> for crate::Error {
    fn from(err: RoomError) -> Self {
        crate::Error::Room(err)
    }
}
