//! Change subscriptions.

use std::{collections::BTreeMap, fmt};

use tracing::debug;

use crate::node::{NodeId, NodeTree};

/// Callback invoked with the ids of changed nodes.
pub type Callback = Box<dyn FnMut(&[NodeId]) + Send>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    node: NodeId,
    deep: bool,
    callback: Callback,
}

#[derive(Default)]
pub(crate) struct Subscriptions {
    next: u64,
    entries: BTreeMap<SubscriptionId, Subscription>,
}

impl fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriptions")
            .field("count", &self.entries.len())
            .finish()
    }
}

impl Subscriptions {
    pub(crate) fn add(&mut self, node: NodeId, deep: bool, callback: Callback) -> SubscriptionId {
        let id = SubscriptionId(self.next);
        self.next += 1;
        self.entries.insert(
            id,
            Subscription {
                node,
                deep,
                callback,
            },
        );
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Calls every subscriber interested in `changed`.
    ///
    /// A shallow subscriber fires when its node is in `changed`. A deep
    /// subscriber also fires for any changed node inside its subtree of
    /// `tree`. Each callback gets only the ids relevant to it.
    pub(crate) fn notify(&mut self, tree: &NodeTree, changed: &[NodeId]) {
        if changed.is_empty() {
            return;
        }
        for (id, sub) in &mut self.entries {
            let hits: Vec<NodeId> = changed
                .iter()
                .filter(|c| {
                    **c == sub.node || (sub.deep && tree.is_within(c.as_str(), sub.node.as_str()))
                })
                .cloned()
                .collect();
            if !hits.is_empty() {
                debug!(subscription = ?id, node = %sub.node, changed = hits.len(), "notifying subscriber");
                (sub.callback)(&hits);
            }
        }
    }
}
