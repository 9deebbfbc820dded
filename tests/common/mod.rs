//! Shared in-memory endpoints for pump tests: a scripted source stream and
//! a sink that records every insert call instead of talking to ClickHouse.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use binlog_pump::event::{BinlogPosition, ChangeKind, Row};
use binlog_pump::reader::{RawRecord, ReadOutcome, SourceStream, SourceValue};
use binlog_pump::writer::SinkClient;
use binlog_pump::{Error, Result};

/// What the source does once its scripted records run out.
#[derive(Clone, Copy)]
pub enum Tail {
    End,
    Block,
}

pub struct MemorySource {
    items: VecDeque<Result<RawRecord>>,
    tail: Tail,
    position: BinlogPosition,
    shutdown_on_block: Option<watch::Sender<bool>>,
}

impl MemorySource {
    pub fn new(records: Vec<RawRecord>, tail: Tail, opened_at: BinlogPosition) -> Self {
        Self::with_read_results(records.into_iter().map(Ok).collect(), tail, opened_at)
    }

    /// A source whose reads are scripted individually, for error-path tests.
    pub fn with_read_results(
        items: Vec<Result<RawRecord>>,
        tail: Tail,
        opened_at: BinlogPosition,
    ) -> Self {
        Self {
            items: items.into(),
            tail,
            position: opened_at,
            shutdown_on_block: None,
        }
    }

    /// Flip the shutdown signal the first time the source would block,
    /// standing in for an operator stopping a tailing pump.
    pub fn shutdown_on_block(mut self, tx: watch::Sender<bool>) -> Self {
        self.shutdown_on_block = Some(tx);
        self
    }
}

impl SourceStream for MemorySource {
    async fn next_record(&mut self) -> Result<ReadOutcome> {
        if let Some(item) = self.items.pop_front() {
            let record = item?;
            // Records sharing a position model one source event decoded
            // into several rows; the reported position holds at the prior
            // event until the whole group is delivered.
            let group_pending = matches!(
                self.items.front(),
                Some(Ok(next)) if next.position == record.position
            );
            if !group_pending {
                self.position = record.position.clone();
            }
            return Ok(ReadOutcome::Record(record));
        }
        match self.tail {
            Tail::End => Ok(ReadOutcome::EndOfStream),
            Tail::Block => {
                if let Some(tx) = &self.shutdown_on_block {
                    let _ = tx.send(true);
                }
                Ok(ReadOutcome::WouldBlock)
            }
        }
    }

    fn position(&self) -> BinlogPosition {
        self.position.clone()
    }
}

#[derive(Debug, Clone)]
pub struct InsertCall {
    pub schema: String,
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Shared view of everything a [`RecordingSink`] was asked to insert.
#[derive(Clone, Default)]
pub struct SinkLog(Arc<Mutex<Vec<InsertCall>>>);

impl SinkLog {
    pub fn calls(&self) -> Vec<InsertCall> {
        self.0.lock().unwrap().clone()
    }

    /// All inserted `id` column values, across calls, in insert order.
    pub fn ids(&self) -> Vec<i64> {
        self.calls()
            .iter()
            .flat_map(|call| call.rows.iter())
            .filter_map(|row| row.get("id").and_then(|v| v.as_i64()))
            .collect()
    }
}

pub struct RecordingSink {
    log: SinkLog,
    fail_after: Option<usize>,
    inserts: usize,
}

impl RecordingSink {
    pub fn new(log: SinkLog) -> Self {
        Self {
            log,
            fail_after: None,
            inserts: 0,
        }
    }

    /// Accept this many inserts, then reject every later one.
    pub fn fail_after(mut self, inserts: usize) -> Self {
        self.fail_after = Some(inserts);
        self
    }
}

impl SinkClient for RecordingSink {
    async fn insert(
        &mut self,
        schema: &str,
        table: &str,
        columns: &[String],
        rows: &[Row],
    ) -> Result<()> {
        self.inserts += 1;
        if matches!(self.fail_after, Some(limit) if self.inserts > limit) {
            return Err(Error::BatchWrite {
                schema: schema.to_string(),
                table: table.to_string(),
                message: "sink rejected batch".to_string(),
            });
        }
        self.log.0.lock().unwrap().push(InsertCall {
            schema: schema.to_string(),
            table: table.to_string(),
            columns: columns.to_vec(),
            rows: rows.to_vec(),
        });
        Ok(())
    }
}

/// A one-column insert record for `schema.table` at the given offset.
pub fn record(schema: &str, table: &str, id: i64, pos: u64) -> RawRecord {
    RawRecord {
        schema: schema.to_string(),
        table: table.to_string(),
        kind: ChangeKind::Insert,
        columns: vec!["id".to_string()],
        values: vec![SourceValue::Int(id)],
        position: BinlogPosition::new("binlog.000001", pos),
    }
}

pub fn opened_at(pos: u64) -> BinlogPosition {
    BinlogPosition::new("binlog.000001", pos)
}
