//! MySQL binlog source stream.
//!
//! Consumes the binary log through `mysql_async`'s binlog dump and turns
//! row events into [`RawRecord`]s. A second, regular connection resolves
//! column names from `information_schema` (the binlog's table map events
//! don't carry names unless the server runs with full row metadata) and
//! caches them per table.
//!
//! Position tracking: every event header carries the end offset of that
//! event, and rotate events carry the next file name. One rows event can
//! decode into several records, so the offset of the last event read is
//! held back and only promoted into the reported position once every record
//! decoded from it has been handed out. The reported position is therefore
//! always "everything up to and including the last fully delivered event",
//! which is exactly what a restarted dump should start after.
//!
//! Blocking vs non-blocking: the server-side dump never terminates on its
//! own, and the protocol's non-block flag isn't exposed by the client
//! crate, so each read is bounded by a timeout. Hitting it means
//! `WouldBlock` when tailing and `EndOfStream` for a bounded backfill.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use futures::StreamExt;
use mysql_async::binlog::events::{Event as BinlogEvent, EventData, RowsEventData};
use mysql_async::binlog::row::BinlogRow;
use mysql_async::binlog::value::BinlogValue;
use mysql_async::prelude::Queryable;
use mysql_async::{BinlogStream, BinlogStreamRequest, Conn, Opts, OptsBuilder, Row as SqlRow};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use super::values::from_mysql;
use crate::config::SourceConfig;
use crate::event::{BinlogPosition, ChangeKind};
use crate::filter::TableFilter;
use crate::reader::{RawRecord, ReadOutcome, SourceStream, SourceValue};
use crate::{Error, Result};

const COLUMNS_QUERY: &str = "SELECT COLUMN_NAME FROM information_schema.COLUMNS \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION";

/// Decoded records awaiting delivery, tracking the resume-safe position.
///
/// `read` is the end offset of the last event taken off the wire. It is
/// promoted into `delivered` only once the queue is empty after a pop, so
/// the position reported to the pump never covers a record that is still
/// queued here. Checkpointing that position while part of a multi-row
/// event is undelivered would lose the rest of the event on restart.
struct PendingRecords {
    queue: VecDeque<RawRecord>,
    delivered: BinlogPosition,
    read: BinlogPosition,
}

impl PendingRecords {
    fn new(start: BinlogPosition) -> Self {
        Self {
            queue: VecDeque::new(),
            delivered: start.clone(),
            read: start,
        }
    }

    /// Records the end offset of the event just read.
    fn advance(&mut self, pos: u64) {
        self.read.pos = pos;
    }

    /// Switches to the next binlog file on rotate.
    fn rotate(&mut self, file: String, pos: u64) {
        self.read = BinlogPosition::new(file, pos);
    }

    fn extend(&mut self, records: Vec<RawRecord>) {
        self.queue.extend(records);
    }

    fn pop(&mut self) -> Option<RawRecord> {
        let record = self.queue.pop_front();
        if self.queue.is_empty() {
            self.delivered = self.read.clone();
        }
        record
    }

    /// Offset of the event the records being decoded belong to.
    fn read_position(&self) -> BinlogPosition {
        self.read.clone()
    }

    /// Resume-safe position: every event at or before it has been fully
    /// handed out (or produced nothing to hand out).
    fn position(&self) -> BinlogPosition {
        self.delivered.clone()
    }
}

pub struct MysqlBinlogSource {
    stream: BinlogStream,
    meta: Conn,
    filter: TableFilter,
    columns: HashMap<(String, String), Vec<String>>,
    pending: PendingRecords,
    blocking: bool,
    read_timeout: Duration,
}

impl MysqlBinlogSource {
    /// Opens the binlog stream.
    ///
    /// With a resume position the dump starts strictly after the last
    /// checkpointed event (positions are end-of-event offsets, so the dump
    /// offset itself is the first unseen byte). Without one it starts at
    /// the current end of the binlog.
    pub async fn connect(
        config: &SourceConfig,
        resume_from: Option<BinlogPosition>,
        filter: TableFilter,
        poll_interval: Duration,
    ) -> Result<Self> {
        let opts: Opts = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .into();

        let mut meta = Conn::new(opts.clone()).await?;

        let start = match resume_from {
            Some(position) => position,
            None => current_log_position(&mut meta).await?,
        };
        info!(
            position = %start,
            server_id = config.server_id,
            "Opening binlog stream"
        );

        let conn = Conn::new(opts).await?;
        let stream = conn
            .get_binlog_stream(
                BinlogStreamRequest::new(config.server_id)
                    .with_filename(start.file.as_bytes())
                    .with_pos(start.pos),
            )
            .await?;

        Ok(Self {
            stream,
            meta,
            filter,
            columns: HashMap::new(),
            pending: PendingRecords::new(start),
            blocking: config.blocking,
            read_timeout: poll_interval,
        })
    }

    async fn handle_event(&mut self, event: BinlogEvent) -> Result<()> {
        let end_pos = u64::from(event.header().log_pos());

        let data = match event.read_data() {
            Ok(Some(data)) => data,
            Ok(None) => {
                if end_pos > 0 {
                    self.pending.advance(end_pos);
                }
                return Ok(());
            }
            Err(e) => {
                return Err(Error::Connection(format!("binlog event decode: {}", e)));
            }
        };

        match data {
            EventData::RotateEvent(rotate) => {
                let file = String::from_utf8_lossy(rotate.name_raw()).into_owned();
                debug!(file = %file, position = rotate.position(), "Binlog rotate");
                self.pending.rotate(file, rotate.position());
                Ok(())
            }
            EventData::RowsEvent(rows) => {
                if end_pos > 0 {
                    self.pending.advance(end_pos);
                }
                self.handle_rows(rows).await
            }
            _ => {
                if end_pos > 0 {
                    self.pending.advance(end_pos);
                }
                Ok(())
            }
        }
    }

    async fn handle_rows(&mut self, rows: RowsEventData<'_>) -> Result<()> {
        let table_id = rows.table_id();

        let (schema, table) = match self.stream.get_tme(table_id) {
            Some(tme) => (
                tme.database_name().into_owned(),
                tme.table_name().into_owned(),
            ),
            None => {
                warn!(table_id, "Rows event without a table map; skipping");
                return Ok(());
            }
        };

        // Source-level filtering: rejected tables never cost a metadata
        // lookup or a conversion. The position still advances with the
        // event header like any other seen event.
        if !self.filter.accept(&schema, &table) {
            trace!(schema = %schema, table = %table, "Filtered at source");
            return Ok(());
        }

        let columns = self.table_columns(&schema, &table).await?;

        let tme = self
            .stream
            .get_tme(table_id)
            .ok_or_else(|| Error::Connection("table map vanished mid-event".to_string()))?;

        let position = self.pending.read_position();

        let mut records = Vec::new();
        let mut push = |kind: ChangeKind, image: Option<BinlogRow>| {
            if let Some(row) = image {
                records.push(raw_record(&schema, &table, kind, &columns, row, &position));
            }
        };

        match rows {
            RowsEventData::WriteRowsEvent(ev) => {
                for row in ev.rows(tme) {
                    let (_, after) = decode_row_pair(row)?;
                    push(ChangeKind::Insert, after);
                }
            }
            RowsEventData::WriteRowsEventV1(ev) => {
                for row in ev.rows(tme) {
                    let (_, after) = decode_row_pair(row)?;
                    push(ChangeKind::Insert, after);
                }
            }
            RowsEventData::UpdateRowsEvent(ev) => {
                for row in ev.rows(tme) {
                    let (_, after) = decode_row_pair(row)?;
                    push(ChangeKind::Update, after);
                }
            }
            RowsEventData::UpdateRowsEventV1(ev) => {
                for row in ev.rows(tme) {
                    let (_, after) = decode_row_pair(row)?;
                    push(ChangeKind::Update, after);
                }
            }
            RowsEventData::DeleteRowsEvent(ev) => {
                for row in ev.rows(tme) {
                    let (before, _) = decode_row_pair(row)?;
                    push(ChangeKind::Delete, before);
                }
            }
            RowsEventData::DeleteRowsEventV1(ev) => {
                for row in ev.rows(tme) {
                    let (before, _) = decode_row_pair(row)?;
                    push(ChangeKind::Delete, before);
                }
            }
            other => {
                trace!(table_id = other.table_id(), "Ignoring rows event variant");
            }
        }

        self.pending.extend(records);
        Ok(())
    }

    async fn table_columns(&mut self, schema: &str, table: &str) -> Result<Vec<String>> {
        let key = (schema.to_string(), table.to_string());
        if let Some(columns) = self.columns.get(&key) {
            return Ok(columns.clone());
        }

        let columns: Vec<String> = self.meta.exec(COLUMNS_QUERY, (schema, table)).await?;
        if columns.is_empty() {
            return Err(Error::Conversion {
                schema: schema.to_string(),
                table: table.to_string(),
                message: "no columns found in information_schema".to_string(),
            });
        }

        debug!(
            schema = %schema,
            table = %table,
            columns = columns.len(),
            "Cached column names"
        );
        self.columns.insert(key, columns.clone());
        Ok(columns)
    }
}

impl SourceStream for MysqlBinlogSource {
    async fn next_record(&mut self) -> Result<ReadOutcome> {
        loop {
            // An empty-queue pop promotes the last read offset, so the
            // reported position is current before waiting for more data.
            if let Some(record) = self.pending.pop() {
                return Ok(ReadOutcome::Record(record));
            }

            let item = match timeout(self.read_timeout, self.stream.next()).await {
                Err(_) => {
                    return Ok(if self.blocking {
                        ReadOutcome::WouldBlock
                    } else {
                        ReadOutcome::EndOfStream
                    });
                }
                Ok(None) => return Ok(ReadOutcome::EndOfStream),
                Ok(Some(item)) => item,
            };

            let event = item.map_err(|e| Error::Connection(format!("binlog stream: {}", e)))?;
            self.handle_event(event).await?;
        }
    }

    fn position(&self) -> BinlogPosition {
        self.pending.position()
    }
}

type RowPair = (Option<BinlogRow>, Option<BinlogRow>);

fn decode_row_pair<E: std::fmt::Display>(
    row: std::result::Result<RowPair, E>,
) -> Result<RowPair> {
    row.map_err(|e| Error::Connection(format!("binlog row decode: {}", e)))
}

fn raw_record(
    schema: &str,
    table: &str,
    kind: ChangeKind,
    columns: &[String],
    row: BinlogRow,
    position: &BinlogPosition,
) -> RawRecord {
    let mut values = Vec::with_capacity(row.len());
    for index in 0..row.len() {
        // TODO: decode JSONB column images (BinlogValue::Jsonb) instead of
        // nulling them.
        let value = match row.as_ref(index) {
            Some(BinlogValue::Value(v)) => from_mysql(v.clone()),
            Some(_) => {
                warn!(
                    schema = %schema,
                    table = %table,
                    index,
                    "Unsupported binlog value; storing NULL"
                );
                SourceValue::Null
            }
            None => SourceValue::Null,
        };
        values.push(value);
    }

    RawRecord {
        schema: schema.to_string(),
        table: table.to_string(),
        kind,
        columns: columns.to_vec(),
        values,
        position: position.clone(),
    }
}

async fn current_log_position(conn: &mut Conn) -> Result<BinlogPosition> {
    // SHOW BINARY LOG STATUS replaced SHOW MASTER STATUS in MySQL 8.2.
    let row: Option<SqlRow> = match conn.query_first("SHOW BINARY LOG STATUS").await {
        Ok(row) => row,
        Err(_) => conn.query_first("SHOW MASTER STATUS").await?,
    };

    let row = row.ok_or_else(|| {
        Error::Connection("binary logging appears to be disabled on the source".to_string())
    })?;

    let file: String = row
        .get(0)
        .ok_or_else(|| Error::Connection("malformed binlog status row".to_string()))?;
    let pos: u64 = row
        .get(1)
        .ok_or_else(|| Error::Connection("malformed binlog status row".to_string()))?;

    Ok(BinlogPosition::new(file, pos))
}
