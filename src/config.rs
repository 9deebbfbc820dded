use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::convert::MutationPolicy;

/// Immutable run configuration, constructed once at startup and handed into
/// the source, writer, and pump by reference or ownership. There is no
/// ambient global configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub source: SourceConfig,
    pub sink: SinkConfig,
    pub pump: PumpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Dry mode: the pipeline runs end to end but the writer performs no
    /// destructive sink operation.
    #[serde(default)]
    pub dry: bool,
    #[serde(default = "default_checkpoint_file")]
    pub checkpoint_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// server_id this pump registers with when reading the binlog; must be
    /// unique among the source's replicas.
    pub server_id: u32,
    pub only_schemas: Option<Vec<String>>,
    pub only_tables: Option<Vec<String>>,
    /// Blocking mode: wait for new records instead of terminating at the
    /// end of the binlog.
    #[serde(default)]
    pub blocking: bool,
    /// Resume from the persisted checkpoint instead of the current end of
    /// the binlog.
    #[serde(default)]
    pub resume: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    pub host: String,
    /// ClickHouse HTTP interface port.
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Fixed destination schema; per-event source schema when unset.
    pub schema: Option<String>,
    /// Fixed destination table; per-event source table when unset.
    pub table: Option<String>,
}

impl SinkConfig {
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpConfig {
    /// Staged-event count that triggers a flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Elapsed time that triggers a flush of a partial batch.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Sleep between polls while the source would block.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub mutation_policy: MutationPolicy,
    #[serde(default)]
    pub on_conversion_error: ConversionPolicy,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            mutation_policy: MutationPolicy::default(),
            on_conversion_error: ConversionPolicy::default(),
        }
    }
}

/// What to do when a record cannot be coerced into a sink row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConversionPolicy {
    /// Log the record with its position and continue.
    #[default]
    Skip,
    /// Treat the conversion error as fatal for the run.
    Abort,
}

/// Splits a comma-separated CLI list, treating an empty string as unset.
pub fn parse_list(raw: &str) -> Option<Vec<String>> {
    let items: Vec<String> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

fn default_checkpoint_file() -> PathBuf {
    PathBuf::from("binlog-pump.checkpoint")
}

fn default_batch_size() -> usize {
    1000
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list(""), None);
        assert_eq!(parse_list(" , "), None);
        assert_eq!(
            parse_list("db1,db2"),
            Some(vec!["db1".to_string(), "db2".to_string()])
        );
        assert_eq!(
            parse_list(" db1 , db2.orders "),
            Some(vec!["db1".to_string(), "db2.orders".to_string()])
        );
    }

    #[test]
    fn test_sink_endpoint() {
        let sink = SinkConfig {
            host: "10.0.0.5".to_string(),
            port: 8123,
            user: "default".to_string(),
            password: String::new(),
            schema: None,
            table: None,
        };
        assert_eq!(sink.endpoint(), "http://10.0.0.5:8123/");
    }
}
