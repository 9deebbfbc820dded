//! Batching writer for the destination sink.
//!
//! Staged events are grouped by destination `(schema, table)`; a flush
//! performs one bulk insert per group, with the column list taken from the
//! first row of the group. All rows in a group must share an identical
//! column set; divergence is a conversion bug upstream and fails the whole
//! batch rather than silently dropping columns. The writer performs no
//! partial-row retry; what to do after a failed batch is the pump's call.

use std::collections::BTreeMap;

use tracing::{debug, error};

use crate::convert::EventConverter;
use crate::event::{BinlogPosition, Event, Row};
use crate::{Error, Result};

/// Destination sink boundary: persist a set of rows addressed to one
/// schema+table in a single round-trip.
#[allow(async_fn_in_trait)]
pub trait SinkClient {
    async fn insert(
        &mut self,
        schema: &str,
        table: &str,
        columns: &[String],
        rows: &[Row],
    ) -> Result<()>;
}

pub struct Writer<S> {
    client: S,
    converter: EventConverter,
    dry: bool,
    staged: BTreeMap<(String, String), Vec<Event>>,
    staged_count: usize,
}

impl<S: SinkClient> Writer<S> {
    pub fn new(client: S, converter: EventConverter, dry: bool) -> Self {
        Self {
            client,
            converter,
            dry,
            staged: BTreeMap::new(),
            staged_count: 0,
        }
    }

    /// Buffers one event for the next flush, preserving staging order
    /// within its destination group.
    pub fn stage(&mut self, event: Event) {
        let key = (event.schema.clone(), event.table.clone());
        self.staged.entry(key).or_default().push(event);
        self.staged_count += 1;
    }

    pub fn staged(&self) -> usize {
        self.staged_count
    }

    pub fn is_empty(&self) -> bool {
        self.staged_count == 0
    }

    /// Flushes all staged events, one bulk insert per destination group.
    ///
    /// On success the buffer is cleared and the maximum position among the
    /// flushed events is returned (`None` when nothing was staged). On
    /// failure the whole batch counts as not written: the error is returned
    /// after logging enough context for manual replay, and the caller must
    /// not checkpoint past any position that was staged.
    ///
    /// In dry mode the sink is never called but flush behaves identically
    /// otherwise, so checkpoint handling upstream is exercised unchanged.
    pub async fn flush(&mut self) -> Result<Option<BinlogPosition>> {
        if self.staged_count == 0 {
            return Ok(None);
        }

        let batches = std::mem::take(&mut self.staged);
        let flushed = self.staged_count;
        self.staged_count = 0;

        let mut max_position: Option<BinlogPosition> = None;

        for ((schema, table), events) in batches {
            let rows: Vec<Row> = events.iter().map(|e| self.converter.sink_row(e)).collect();
            let columns: Vec<String> = rows[0].keys().cloned().collect();

            for (row, event) in rows.iter().zip(&events) {
                if row.len() != columns.len() || !columns.iter().all(|c| row.contains_key(c)) {
                    let found: Vec<&String> = row.keys().collect();
                    error!(
                        schema = %schema,
                        table = %table,
                        position = %event.position,
                        expected = ?columns,
                        found = ?found,
                        "Divergent column set in batch"
                    );
                    return Err(Error::BatchWrite {
                        schema,
                        table,
                        message: format!(
                            "divergent column set at {}: expected {:?}, found {:?}",
                            event.position, columns, found
                        ),
                    });
                }
            }

            let first = &events[0].position;
            let last = &events[events.len() - 1].position;

            if self.dry {
                debug!(
                    schema = %schema,
                    table = %table,
                    rows = rows.len(),
                    "Dry mode: skipping sink insert"
                );
            } else if let Err(e) = self.client.insert(&schema, &table, &columns, &rows).await {
                error!(
                    schema = %schema,
                    table = %table,
                    rows = rows.len(),
                    first_position = %first,
                    last_position = %last,
                    "Batch insert failed: {}",
                    e
                );
                return Err(e);
            }

            debug!(
                schema = %schema,
                table = %table,
                rows = rows.len(),
                last_position = %last,
                "Flushed batch"
            );

            for event in events {
                max_position = match max_position {
                    Some(p) if p >= event.position => Some(p),
                    _ => Some(event.position),
                };
            }
        }

        debug!(events = flushed, "Flush complete");
        Ok(max_position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChangeKind;

    #[derive(Default)]
    struct RecordingSink {
        calls: Vec<(String, String, Vec<String>, Vec<Row>)>,
        fail: bool,
    }

    impl SinkClient for RecordingSink {
        async fn insert(
            &mut self,
            schema: &str,
            table: &str,
            columns: &[String],
            rows: &[Row],
        ) -> Result<()> {
            if self.fail {
                return Err(Error::BatchWrite {
                    schema: schema.to_string(),
                    table: table.to_string(),
                    message: "sink rejected batch".to_string(),
                });
            }
            self.calls.push((
                schema.to_string(),
                table.to_string(),
                columns.to_vec(),
                rows.to_vec(),
            ));
            Ok(())
        }
    }

    fn event(schema: &str, table: &str, id: i64, pos: u64) -> Event {
        let mut row = Row::new();
        row.insert("id".to_string(), serde_json::json!(id));
        Event {
            schema: schema.to_string(),
            table: table.to_string(),
            kind: ChangeKind::Insert,
            row,
            position: BinlogPosition::new("binlog.000001", pos),
        }
    }

    fn writer(sink: RecordingSink, dry: bool) -> Writer<RecordingSink> {
        Writer::new(sink, EventConverter::default(), dry)
    }

    #[tokio::test]
    async fn test_flush_groups_by_destination() {
        let mut writer = writer(RecordingSink::default(), false);
        writer.stage(event("db1", "orders", 1, 10));
        writer.stage(event("db2", "logs", 2, 20));
        writer.stage(event("db1", "orders", 3, 30));
        assert_eq!(writer.staged(), 3);

        let max = writer.flush().await.unwrap().unwrap();
        assert_eq!(max, BinlogPosition::new("binlog.000001", 30));
        assert!(writer.is_empty());

        let calls = &writer.client.calls;
        assert_eq!(calls.len(), 2);

        let orders = calls
            .iter()
            .find(|(s, t, _, _)| s == "db1" && t == "orders")
            .unwrap();
        assert_eq!(orders.2, vec!["id".to_string()]);
        // Staging order preserved within the group.
        assert_eq!(orders.3[0]["id"], serde_json::json!(1));
        assert_eq!(orders.3[1]["id"], serde_json::json!(3));

        let logs = calls
            .iter()
            .find(|(s, t, _, _)| s == "db2" && t == "logs")
            .unwrap();
        assert_eq!(logs.3.len(), 1);
    }

    #[tokio::test]
    async fn test_flush_empty_is_noop() {
        let mut writer = writer(RecordingSink::default(), false);
        assert!(writer.flush().await.unwrap().is_none());
        assert!(writer.client.calls.is_empty());
    }

    #[tokio::test]
    async fn test_dry_mode_never_calls_sink() {
        let mut writer = writer(RecordingSink::default(), true);
        writer.stage(event("db1", "orders", 1, 10));
        writer.stage(event("db1", "orders", 2, 20));

        let max = writer.flush().await.unwrap().unwrap();
        assert_eq!(max.pos, 20);
        assert!(writer.client.calls.is_empty());
        assert!(writer.is_empty());
    }

    #[tokio::test]
    async fn test_divergent_column_set_fails_batch() {
        let mut writer = writer(RecordingSink::default(), false);
        writer.stage(event("db1", "orders", 1, 10));

        let mut row = Row::new();
        row.insert("id".to_string(), serde_json::json!(2));
        row.insert("extra".to_string(), serde_json::json!("x"));
        writer.stage(Event {
            schema: "db1".to_string(),
            table: "orders".to_string(),
            kind: ChangeKind::Insert,
            row,
            position: BinlogPosition::new("binlog.000001", 20),
        });

        match writer.flush().await {
            Err(Error::BatchWrite { schema, table, .. }) => {
                assert_eq!(schema, "db1");
                assert_eq!(table, "orders");
            }
            other => panic!("expected batch write error, got {:?}", other),
        }
        assert!(writer.client.calls.is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_propagates() {
        let sink = RecordingSink {
            fail: true,
            ..Default::default()
        };
        let mut writer = writer(sink, false);
        writer.stage(event("db1", "orders", 1, 10));

        assert!(matches!(
            writer.flush().await,
            Err(Error::BatchWrite { .. })
        ));
    }
}
