//! Room configuration.

use serde::{Deserialize, Serialize};

/// Default number of undo entries kept per room.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Default command channel size of a [`RoomHandle`](super::RoomHandle).
pub const DEFAULT_HANDLE_CAPACITY: usize = 100;

/// Settings for one [`Room`](super::Room).
///
/// # Examples
///
/// ```
/// use livetree::RoomConfig;
///
/// let config = RoomConfig::default().with_actor(3).with_history_limit(10);
/// assert_eq!(config.actor, 3);
/// assert_eq!(config.history_limit, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Connection number baked into node ids, op ids and list positions.
    ///
    /// Must be unique among the clients of a room. The server normally
    /// assigns it; the default is random.
    #[serde(default = "random_actor")]
    pub actor: u32,

    /// Maximum number of undo entries retained
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Bounded command channel size used by `RoomHandle`
    #[serde(default = "default_handle_capacity")]
    pub handle_capacity: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            actor: random_actor(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            handle_capacity: DEFAULT_HANDLE_CAPACITY,
        }
    }
}

impl RoomConfig {
    pub fn with_actor(mut self, actor: u32) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_handle_capacity(mut self, capacity: usize) -> Self {
        self.handle_capacity = capacity.max(1);
        self
    }
}

fn random_actor() -> u32 {
    rand::random()
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_handle_capacity() -> usize {
    DEFAULT_HANDLE_CAPACITY
}
