//! Typed wire vocabulary for the log service.
//!
//! Loosely-typed JSON bodies from the transport become one strongly-typed
//! variant per message type, validated before anything reaches the store.
//! Replies carry the `_ok`-suffixed type of the request they answer.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One log record: a zero-based position in a named log plus its payload.
///
/// On the wire an entry is the two-element array `[offset, msg]`, not an
/// object; the shape is load-bearing for existing clients of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub offset: u64,
    pub msg: i64,
}

impl Serialize for Entry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.offset, self.msg).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Entry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (offset, msg) = <(u64, i64)>::deserialize(deserializer)?;
        Ok(Entry { offset, msg })
    }
}

/// Inbound request bodies, tagged by their `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Append `msg` to the log named `key`.
    Send { key: String, msg: i64 },
    /// Read entries from each named log starting at the given offset.
    Poll { offsets: BTreeMap<String, u64> },
    /// Record consumer progress per log; last write wins.
    CommitOffsets { offsets: BTreeMap<String, u64> },
    /// Look up the recorded consumer progress of each named log.
    ListCommittedOffsets { keys: Vec<String> },
}

/// Outbound reply bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    SendOk { offset: u64 },
    PollOk { msgs: BTreeMap<String, Vec<Entry>> },
    CommitOffsetsOk,
    ListCommittedOffsetsOk { offsets: BTreeMap<String, u64> },
    /// Request-level failure: malformed body or an aborted operation.
    Error { text: String },
}
