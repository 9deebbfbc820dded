//! The reader boundary: what the pump expects from a source stream.
//!
//! The source replication client (protocol handshake, wire-level position
//! bookkeeping) lives behind [`SourceStream`]; the pump only ever sees raw
//! records, end-of-stream, or a would-block signal. The production
//! implementation is [`crate::mysql::MysqlBinlogSource`]; tests drive the
//! pump with in-memory implementations.

use crate::event::{BinlogPosition, ChangeKind};
use crate::Result;

/// A source-native scalar value, prior to sink coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Bytes(Vec<u8>),
    Text(String),
}

/// One raw row mutation as read from the source log.
///
/// Column names and values are carried separately; their arity is validated
/// at the conversion boundary, not here.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub schema: String,
    pub table: String,
    pub kind: ChangeKind,
    pub columns: Vec<String>,
    pub values: Vec<SourceValue>,
    /// End offset of the binlog event this record came from.
    pub position: BinlogPosition,
}

/// Outcome of one pull from the source stream.
#[derive(Debug)]
pub enum ReadOutcome {
    Record(RawRecord),
    /// The source log is exhausted (non-blocking mode only).
    EndOfStream,
    /// No new data yet; the caller should wait and retry (blocking mode).
    WouldBlock,
}

/// Pull interface over the source replication stream.
///
/// A resumed stream must emit records strictly after the position it was
/// opened at: already-checkpointed data is never re-emitted, unconfirmed
/// data is never skipped.
#[allow(async_fn_in_trait)]
pub trait SourceStream {
    async fn next_record(&mut self) -> Result<ReadOutcome>;

    /// Current resumable position: the end offset of the last event read,
    /// whether or not that event produced a record the pump kept.
    fn position(&self) -> BinlogPosition;
}
