use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered mapping from column name to a sink-representable scalar value.
///
/// `serde_json::Map` preserves insertion order (the `preserve_order`
/// feature), so the column list of a batch follows the source column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

/// A resumable position in the source binlog stream.
///
/// `pos` is the end offset of the event it was taken from, so a dump
/// restarted at this position emits only subsequent events. Binlog file
/// names carry a zero-padded sequence suffix, which makes the derived
/// lexicographic ordering match stream order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BinlogPosition {
    pub file: String,
    pub pos: u64,
}

impl BinlogPosition {
    pub fn new(file: impl Into<String>, pos: u64) -> Self {
        Self {
            file: file.into(),
            pos,
        }
    }
}

impl fmt::Display for BinlogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.pos)
    }
}

/// Canonical in-memory representation of one row mutation.
///
/// Events are created by the converter, live only inside the pump's
/// in-flight path and the writer's batch buffer, and are destroyed once
/// flushed. Durability comes from the sink and the checkpoint marker, never
/// from the event itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Destination schema (source schema unless overridden by config).
    pub schema: String,
    /// Destination table (source table unless overridden by config).
    pub table: String,
    pub kind: ChangeKind,
    /// Column values already coerced to sink-representable scalars.
    pub row: Row,
    /// Position of the source record this event was derived from.
    pub position: BinlogPosition,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_ordering() {
        let a = BinlogPosition::new("binlog.000001", 400);
        let b = BinlogPosition::new("binlog.000001", 900);
        let c = BinlogPosition::new("binlog.000002", 4);

        assert!(a < b);
        assert!(b < c);
        assert_eq!(a, BinlogPosition::new("binlog.000001", 400));
    }

    #[test]
    fn test_position_display() {
        let pos = BinlogPosition::new("binlog.000003", 157);
        assert_eq!(pos.to_string(), "binlog.000003:157");
    }

    #[test]
    fn test_position_serde_round_trip() {
        let pos = BinlogPosition::new("binlog.000042", 1024);
        let json = serde_json::to_string(&pos).unwrap();
        let back: BinlogPosition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pos);
    }

    #[test]
    fn test_change_kind_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&ChangeKind::Insert).unwrap(),
            "\"INSERT\""
        );
        assert_eq!(ChangeKind::Delete.as_str(), "DELETE");
    }
}
