//! Transport abstraction for outgoing operations.
//!
//! A [`Room`](crate::room::Room) never talks to the network itself: it is
//! handed a [`Transport`] at construction and calls [`Transport::send`] with
//! every batch of local ops. Incoming ops travel the other way through
//! [`Room::apply_remote_ops`](crate::room::Room::apply_remote_ops), driven by
//! whoever owns the connection.
//!
//! Three implementations ship with the crate:
//!
//! - [`NullTransport`] drops everything, for offline rooms and tools.
//! - [`ChannelTransport`] forwards batches into a tokio channel.
//! - [`LoopbackServer`] is an in-process sequencer: every connected room
//!   appends to one shared log, whose order is the room's total order, and
//!   pulls what others wrote by cursor. It also keeps the authoritative tree
//!   so late joiners can start from a snapshot.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{node::NodeTree, node::SerializedNode, op::Op, resolver};

/// Sink for the ops a room produces.
pub trait Transport: Send {
    /// Sends one message worth of ops. Ops must reach the server in the
    /// order of `send` calls.
    fn send(&mut self, ops: Vec<Op>);
}

/// Discards all ops.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn send(&mut self, ops: Vec<Op>) {
        trace!(count = ops.len(), "discarding ops");
    }
}

/// Forwards each message into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Vec<Op>>,
}

impl ChannelTransport {
    /// Creates the transport and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<Op>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, ops: Vec<Op>) {
        if self.tx.send(ops).is_err() {
            debug!("transport channel closed, dropping ops");
        }
    }
}

#[derive(Debug, Default)]
struct ServerState {
    log: Vec<Op>,
    tree: NodeTree,
}

/// In-process stand-in for the room server.
///
/// Cloning gives another handle to the same server.
#[derive(Debug, Clone, Default)]
pub struct LoopbackServer {
    state: Arc<Mutex<ServerState>>,
}

impl LoopbackServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the server from an existing document.
    pub fn with_tree(tree: NodeTree) -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                log: Vec::new(),
                tree,
            })),
        }
    }

    /// A transport that submits ops to this server.
    pub fn connect(&self) -> LoopbackTransport {
        LoopbackTransport {
            server: self.clone(),
        }
    }

    /// Appends a message to the log, in arrival order.
    pub fn submit(&self, ops: Vec<Op>) {
        let mut state = self.lock();
        for op in &ops {
            resolver::apply_or_drop(&mut state.tree, &op.kind);
        }
        state.log.extend(ops);
    }

    /// Every op after `cursor`, and the cursor to use next time.
    pub fn ops_since(&self, cursor: usize) -> (Vec<Op>, usize) {
        let state = self.lock();
        let ops = state.log.get(cursor..).unwrap_or_default().to_vec();
        (ops, state.log.len())
    }

    /// Number of ops in the log.
    pub fn len(&self) -> usize {
        self.lock().log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().log.is_empty()
    }

    /// The authoritative document, for initial storage.
    pub fn snapshot(&self) -> Vec<SerializedNode> {
        self.lock().tree.serialize()
    }

    /// A copy of the authoritative tree.
    pub fn tree(&self) -> NodeTree {
        self.lock().tree.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Client side of a [`LoopbackServer`].
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    server: LoopbackServer,
}

impl Transport for LoopbackTransport {
    fn send(&mut self, ops: Vec<Op>) {
        self.server.submit(ops);
    }
}
