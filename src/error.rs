//! Error types and result handling for binlog-pump.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use binlog_pump::{Error, Result};
//!
//! fn connect_to_source() -> Result<()> {
//!     // Simulating a connection error
//!     Err(Error::Connection("Failed to connect".to_string()))
//! }
//!
//! match connect_to_source() {
//!     Ok(()) => println!("Connected"),
//!     Err(Error::Connection(msg)) => eprintln!("Connection error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use thiserror::Error;

/// The main error type for binlog-pump operations.
///
/// This enum represents all possible errors that can occur during
/// replication, from configuration issues to runtime failures. Variants
/// map to the pump's failure taxonomy: connection loss and checkpoint
/// persistence failures are always fatal, conversion errors follow the
/// configured policy, and batch write failures are fatal for the run
/// because a whole-batch insert gives no safe partial-success signal.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, typically from invalid CLI arguments.
    #[error("Configuration error: {0}")]
    Config(String),

    /// MySQL client or binlog protocol error.
    #[error("MySQL error: {0}")]
    Source(#[from] mysql_async::Error),

    /// ClickHouse HTTP transport error.
    #[error("ClickHouse error: {0}")]
    Sink(#[from] reqwest::Error),

    /// Generic connection error not covered by specific types.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A record whose shape cannot be coerced into a sink row.
    ///
    /// Depending on the configured policy this either skips the record
    /// (logged with enough context for manual replay) or aborts the run.
    #[error("Conversion error for {schema}.{table}: {message}")]
    Conversion {
        /// Source schema of the offending record
        schema: String,
        /// Source table of the offending record
        table: String,
        /// Description of what could not be coerced
        message: String,
    },

    /// The sink rejected a batch; none of its rows are durably written.
    #[error("Batch write failed for {schema}.{table}: {message}")]
    BatchWrite {
        /// Destination schema of the failed batch
        schema: String,
        /// Destination table of the failed batch
        table: String,
        /// Sink-reported failure detail
        message: String,
    },

    /// The resume checkpoint could not be durably persisted.
    ///
    /// Always fatal: proceeding without checkpoint durability would risk
    /// duplicate replay being interpreted as success.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// JSON serialization error when encoding rows or checkpoints.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error, typically from checkpoint file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenient Result type alias for binlog-pump operations.
///
/// This is equivalent to `std::result::Result<T, binlog_pump::Error>`.
///
/// # Example
///
/// ```rust
/// use binlog_pump::Result;
///
/// fn do_something() -> Result<String> {
///     Ok("Success".to_string())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;
