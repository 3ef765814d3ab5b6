//! Id sources for nodes and operations.
//!
//! Ids have the shape `"{actor}:{counter}"`. The actor number is unique per
//! connection, so ids minted by different clients never collide, and the
//! counter only ever grows, so an id retired by a delete is never handed out
//! again.
//!
//! # Example
//!
//! ```
//! use livetree::clock::IdClock;
//!
//! let mut clock = IdClock::new(7);
//! assert_eq!(clock.next_node_id().as_str(), "7:0");
//! assert_eq!(clock.next_node_id().as_str(), "7:1");
//! assert_eq!(clock.next_op_id().as_str(), "7:0");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// Identifies an operation so the server's echo can acknowledge it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpId(String);

impl OpId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OpId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Monotonic counters for one actor's node ids and op ids.
///
/// The two counters are independent: node ids name tree nodes, op ids name
/// messages, and neither namespace is ever compared with the other.
#[derive(Debug, Clone)]
pub struct IdClock {
    actor: u32,
    node_clock: u64,
    op_clock: u64,
}

impl IdClock {
    pub fn new(actor: u32) -> Self {
        Self {
            actor,
            node_clock: 0,
            op_clock: 0,
        }
    }

    pub fn actor(&self) -> u32 {
        self.actor
    }

    /// Mints a node id that no replica has used before.
    pub fn next_node_id(&mut self) -> NodeId {
        let id = NodeId::new(format!("{}:{}", self.actor, self.node_clock));
        self.node_clock += 1;
        id
    }

    pub fn next_op_id(&mut self) -> OpId {
        let id = OpId::new(format!("{}:{}", self.actor, self.op_clock));
        self.op_clock += 1;
        id
    }
}
