//! Constants used throughout the livetree library.
//!
//! Fixed ids and the reserved keys of the PlainLson interchange format.

/// Id of the document root. Every document has exactly one root Object.
pub const ROOT_ID: &str = "root";

/// Key naming the container kind of a PlainLson value.
pub const LIVEBLOCKS_TYPE: &str = "liveblocksType";

/// Key holding a PlainLson container's payload.
pub const DATA: &str = "data";

/// PlainLson tag of an Object container.
pub const LIVE_OBJECT: &str = "LiveObject";

/// PlainLson tag of a Map container.
pub const LIVE_MAP: &str = "LiveMap";

/// PlainLson tag of a List container.
pub const LIVE_LIST: &str = "LiveList";
