//! Cursor and schema version types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version of the locally persisted table shapes.
///
/// Versions start at 1 and only ever increase.
pub type SchemaVersion = u32;

/// Server-clock watermark (milliseconds) up to which a client has a
/// complete and acknowledged view of server state.
///
/// Cursors are opaque to the client: they are only ever obtained from a
/// pull response and sent back verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(i64);

impl Cursor {
    /// Creates a cursor from a raw server timestamp.
    pub const fn new(timestamp: i64) -> Self {
        Self(timestamp)
    }

    /// Returns the raw server timestamp.
    pub const fn timestamp(&self) -> i64 {
        self.0
    }

    /// Returns true if `next` is a legal successor of `current`.
    ///
    /// Any cursor is a legal successor of "never synced".
    pub fn can_advance(current: Option<Cursor>, next: Cursor) -> bool {
        current.is_none_or(|c| next >= c)
    }
}

impl From<i64> for Cursor {
    fn from(timestamp: i64) -> Self {
        Self(timestamp)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_ordering() {
        assert!(Cursor::new(5) < Cursor::new(6));
        assert!(Cursor::can_advance(None, Cursor::new(0)));
        assert!(Cursor::can_advance(Some(Cursor::new(5)), Cursor::new(5)));
        assert!(Cursor::can_advance(Some(Cursor::new(5)), Cursor::new(9)));
        assert!(!Cursor::can_advance(Some(Cursor::new(5)), Cursor::new(4)));
    }

    #[test]
    fn cursor_serializes_as_integer() {
        let json = serde_json::to_string(&Cursor::new(1700000000123)).unwrap();
        assert_eq!(json, "1700000000123");
        let back: Cursor = serde_json::from_str(&json).unwrap();
        assert_eq!(back.timestamp(), 1700000000123);
    }
}
