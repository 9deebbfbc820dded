//! Conversion between raw source records, events, and sink row payloads.
//!
//! The converter owns the three policy decisions the pump itself stays out
//! of: scalar coercion (source-native values to JSON scalars the sink
//! accepts), destination addressing (per-event schema/table unless a fixed
//! override is configured), and what to do with non-INSERT mutations
//! against an append-only sink.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::event::{ChangeKind, Event, Row};
use crate::reader::{RawRecord, SourceValue};
use crate::{Error, Result};

/// What to do with UPDATE/DELETE records against an append-only sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationPolicy {
    /// Drop non-INSERT records. The stream position still advances because
    /// the record was seen, not lost.
    #[default]
    InsertOnly,
    /// Materialize every mutation as a new row, tagged with a change-kind
    /// column: after-image for updates, before-image for deletes.
    MaterializeAll,
}

/// Column name used by [`MutationPolicy::MaterializeAll`] to tag rows.
pub const KIND_COLUMN: &str = "change_kind";

#[derive(Debug, Clone, Default)]
pub struct EventConverter {
    dst_schema: Option<String>,
    dst_table: Option<String>,
    policy: MutationPolicy,
}

impl EventConverter {
    pub fn new(
        dst_schema: Option<String>,
        dst_table: Option<String>,
        policy: MutationPolicy,
    ) -> Self {
        Self {
            dst_schema,
            dst_table,
            policy,
        }
    }

    /// Converts a raw source record into an [`Event`].
    ///
    /// Returns `Ok(None)` when the mutation policy deliberately drops the
    /// record. A column-name/value arity mismatch is a conversion error:
    /// the record cannot be represented as a row without guessing.
    pub fn to_event(&self, raw: RawRecord) -> Result<Option<Event>> {
        if self.policy == MutationPolicy::InsertOnly && raw.kind != ChangeKind::Insert {
            return Ok(None);
        }

        if raw.columns.len() != raw.values.len() {
            return Err(Error::Conversion {
                schema: raw.schema,
                table: raw.table,
                message: format!(
                    "column/value count mismatch: {} columns, {} values at {}",
                    raw.columns.len(),
                    raw.values.len(),
                    raw.position
                ),
            });
        }

        let mut row = Row::new();
        for (name, value) in raw.columns.into_iter().zip(raw.values) {
            row.insert(name, coerce(value));
        }

        let schema = self.dst_schema.clone().unwrap_or(raw.schema);
        let table = self.dst_table.clone().unwrap_or(raw.table);

        Ok(Some(Event {
            schema,
            table,
            kind: raw.kind,
            row,
            position: raw.position,
        }))
    }

    /// Builds the row payload handed to the sink for one event.
    pub fn sink_row(&self, event: &Event) -> Row {
        let mut row = event.row.clone();
        if self.policy == MutationPolicy::MaterializeAll {
            row.insert(
                KIND_COLUMN.to_string(),
                serde_json::Value::String(event.kind.as_str().to_string()),
            );
        }
        row
    }
}

fn coerce(value: SourceValue) -> serde_json::Value {
    match value {
        SourceValue::Null => serde_json::Value::Null,
        SourceValue::Int(i) => serde_json::Value::from(i),
        SourceValue::UInt(u) => serde_json::Value::from(u),
        // Non-finite floats have no JSON representation; store null.
        SourceValue::Float(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        SourceValue::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => serde_json::Value::String(text),
            Err(err) => serde_json::Value::String(BASE64.encode(err.as_bytes())),
        },
        SourceValue::Text(text) => serde_json::Value::String(text),
    }
}
