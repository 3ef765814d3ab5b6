//! Actor wrapper that gives a [`Room`] a single owner task.
//!
//! The node model is not meant to be read while it is being mutated, so in a
//! multi-threaded host the room lives on its own tokio task and everything
//! else talks to it through a cloneable [`RoomHandle`]. Commands are handled
//! one at a time in arrival order.

use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, debug_span, trace};

use super::{Room, RoomError};
use crate::{Json, Result, node::SerializedNode, op::Op};

type RoomFn = Box<dyn FnOnce(&mut Room) + Send>;

/// Commands processed by the room task.
pub(crate) enum RoomCommand {
    /// Run a closure against the room
    Run(RoomFn),
    /// Ops sequenced by the server
    ApplyRemoteOps { ops: Vec<Op> },
    /// Full resync from a server snapshot
    ApplyInitialStorage {
        nodes: Vec<SerializedNode>,
        response: oneshot::Sender<Result<()>>,
    },
    /// Stop the task after the commands already queued
    Shutdown,
}

// Manual Debug impl: closures and oneshot senders don't implement Debug.
impl std::fmt::Debug for RoomCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Run(_) => write!(f, "Run"),
            Self::ApplyRemoteOps { ops } => f
                .debug_struct("ApplyRemoteOps")
                .field("ops_count", &ops.len())
                .finish(),
            Self::ApplyInitialStorage { nodes, .. } => f
                .debug_struct("ApplyInitialStorage")
                .field("nodes_count", &nodes.len())
                .finish(),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Cloneable handle to a room running on its own task.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    tx: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Moves `room` onto a new tokio task and returns a handle to it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(room: Room) -> Self {
        let (tx, rx) = mpsc::channel(room.config().handle_capacity);
        let span = debug_span!("room", actor = room.actor());
        tokio::spawn(run(room, rx).instrument(span));
        Self { tx }
    }

    /// Runs `f` on the room task and returns its result.
    pub async fn with<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Room) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (response, rx) = oneshot::channel();
        self.send(RoomCommand::Run(Box::new(move |room| {
            // The caller may have stopped waiting.
            let _ = response.send(f(room));
        })))
        .await?;
        rx.await.map_err(|_| RoomError::HandleClosed.into())
    }

    /// Queues server ops. They are applied in the order queued.
    pub async fn apply_remote_ops(&self, ops: Vec<Op>) -> Result<()> {
        self.send(RoomCommand::ApplyRemoteOps { ops }).await
    }

    pub async fn apply_initial_storage(&self, nodes: Vec<SerializedNode>) -> Result<()> {
        let (response, rx) = oneshot::channel();
        self.send(RoomCommand::ApplyInitialStorage { nodes, response })
            .await?;
        rx.await.map_err(|_| RoomError::HandleClosed)?
    }

    pub async fn to_immutable(&self) -> Result<Json> {
        self.with(|room| room.to_immutable()).await
    }

    /// Asks the task to stop once it has drained earlier commands.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(RoomCommand::Shutdown).await
    }

    /// True once the room task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, command: RoomCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| RoomError::HandleClosed.into())
    }
}

async fn run(mut room: Room, mut rx: mpsc::Receiver<RoomCommand>) {
    debug!("room task started");
    while let Some(command) = rx.recv().await {
        trace!(?command, "room command");
        match command {
            RoomCommand::Run(f) => f(&mut room),
            RoomCommand::ApplyRemoteOps { ops } => room.apply_remote_ops(ops),
            RoomCommand::ApplyInitialStorage { nodes, response } => {
                let _ = response.send(room.apply_initial_storage(nodes));
            }
            RoomCommand::Shutdown => break,
        }
    }
    debug!("room task stopped");
}
