//! Checkpoint management for resumable replication.
//!
//! This module provides checkpoint persistence to ensure that replication
//! can resume from the last processed binlog position after a restart or
//! failure.
//!
//! # Example
//!
//! ```rust,no_run
//! use binlog_pump::checkpoint::{Checkpoint, CheckpointManager};
//! use binlog_pump::event::BinlogPosition;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = CheckpointManager::new("checkpoint.json");
//!
//!     // Load existing checkpoint
//!     if let Some(checkpoint) = manager.load().await? {
//!         println!("Resuming from {}", checkpoint.position);
//!     }
//!
//!     // Save new checkpoint
//!     let checkpoint = Checkpoint::new(BinlogPosition::new("binlog.000001", 4), 100);
//!     manager.save(&checkpoint).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::event::BinlogPosition;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

/// Represents a checkpoint in the replication stream.
///
/// A checkpoint contains the last position whose events were all durably
/// written to the sink (or deliberately dropped by a filter or policy),
/// plus metadata about the replication progress. This allows replication
/// to resume from the exact position after a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The last fully processed binlog position
    pub position: BinlogPosition,
    /// The timestamp when this checkpoint was created
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Number of events written to the sink since startup
    pub events_pumped: u64,
}

impl Checkpoint {
    /// Creates a new checkpoint with the current timestamp.
    pub fn new(position: BinlogPosition, events_pumped: u64) -> Self {
        Self {
            position,
            timestamp: chrono::Utc::now(),
            events_pumped,
        }
    }
}

/// Manages checkpoint persistence to disk.
///
/// The `CheckpointManager` handles atomic writes to ensure that checkpoints
/// are never corrupted, even if the process crashes during a write
/// operation.
pub struct CheckpointManager {
    file_path: PathBuf,
}

impl CheckpointManager {
    /// Creates a new checkpoint manager with the specified file path.
    pub fn new(checkpoint_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: checkpoint_path.as_ref().to_path_buf(),
        }
    }

    /// Loads checkpoint from disk if it exists.
    ///
    /// Returns `None` if the checkpoint file doesn't exist, which typically
    /// means this is the first run or the checkpoint was deleted.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file exists but cannot be read, or does not
    /// parse as a checkpoint.
    pub async fn load(&self) -> Result<Option<Checkpoint>> {
        if !self.file_path.exists() {
            debug!("No checkpoint file found at {:?}", self.file_path);
            return Ok(None);
        }

        match fs::read_to_string(&self.file_path).await {
            Ok(content) => match serde_json::from_str::<Checkpoint>(&content) {
                Ok(checkpoint) => {
                    info!(
                        "Loaded checkpoint: position={}, timestamp={}",
                        checkpoint.position, checkpoint.timestamp
                    );
                    Ok(Some(checkpoint))
                }
                Err(e) => {
                    error!("Failed to parse checkpoint file: {}", e);
                    Err(Error::Checkpoint(format!("invalid checkpoint file: {}", e)))
                }
            },
            Err(e) => {
                error!("Failed to read checkpoint file: {}", e);
                Err(Error::Checkpoint(format!(
                    "cannot read {:?}: {}",
                    self.file_path, e
                )))
            }
        }
    }

    /// Saves checkpoint to disk atomically.
    ///
    /// This method ensures that the checkpoint is written atomically by:
    /// 1. Writing to a temporary file
    /// 2. Syncing the file to ensure data is on disk
    /// 3. Atomically renaming the temp file to the final location
    ///
    /// This guarantees that the checkpoint file is never partially written.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        debug!("Saving checkpoint: position={}", checkpoint.position);

        let temp_path = self.file_path.with_extension("tmp");

        let json = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| Error::Checkpoint(format!("cannot serialize checkpoint: {}", e)))?;

        let persist = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(json.as_bytes()).await?;
            file.sync_all().await?;
            fs::rename(&temp_path, &self.file_path).await
        };

        persist.await.map_err(|e: std::io::Error| {
            Error::Checkpoint(format!("cannot persist {:?}: {}", self.file_path, e))
        })?;

        debug!("Checkpoint saved successfully");
        Ok(())
    }

    /// Deletes the checkpoint file if it exists.
    ///
    /// This is useful for resetting replication to start from the current
    /// end of the binlog.
    pub async fn delete(&self) -> Result<()> {
        if self.file_path.exists() {
            fs::remove_file(&self.file_path).await?;
            info!("Deleted checkpoint file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_checkpoint_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let checkpoint_path = temp_dir.path().join("checkpoint.json");

        let manager = CheckpointManager::new(&checkpoint_path);

        // Initially no checkpoint
        assert!(manager.load().await.unwrap().is_none());

        // Save checkpoint
        let checkpoint = Checkpoint::new(BinlogPosition::new("binlog.000007", 1234), 100);
        manager.save(&checkpoint).await.unwrap();

        // Load checkpoint
        let loaded = manager.load().await.unwrap().unwrap();
        assert_eq!(loaded.position, BinlogPosition::new("binlog.000007", 1234));
        assert_eq!(loaded.events_pumped, 100);
    }

    #[tokio::test]
    async fn test_checkpoint_atomic_write() {
        let temp_dir = TempDir::new().unwrap();
        let checkpoint_path = temp_dir.path().join("checkpoint.json");

        let manager = CheckpointManager::new(&checkpoint_path);

        // Save first checkpoint
        let checkpoint1 = Checkpoint::new(BinlogPosition::new("binlog.000001", 50), 50);
        manager.save(&checkpoint1).await.unwrap();

        // Save second checkpoint (should overwrite atomically)
        let checkpoint2 = Checkpoint::new(BinlogPosition::new("binlog.000002", 75), 150);
        manager.save(&checkpoint2).await.unwrap();

        // Load should get the second checkpoint
        let loaded = manager.load().await.unwrap().unwrap();
        assert_eq!(loaded.position, BinlogPosition::new("binlog.000002", 75));
        assert_eq!(loaded.events_pumped, 150);
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let checkpoint_path = temp_dir.path().join("checkpoint.json");
        std::fs::write(&checkpoint_path, "not json").unwrap();

        let manager = CheckpointManager::new(&checkpoint_path);
        assert!(matches!(manager.load().await, Err(Error::Checkpoint(_))));
    }

    #[tokio::test]
    async fn test_delete_resets_state() {
        let temp_dir = TempDir::new().unwrap();
        let checkpoint_path = temp_dir.path().join("checkpoint.json");

        let manager = CheckpointManager::new(&checkpoint_path);
        let checkpoint = Checkpoint::new(BinlogPosition::new("binlog.000001", 4), 1);
        manager.save(&checkpoint).await.unwrap();

        manager.delete().await.unwrap();
        assert!(manager.load().await.unwrap().is_none());
    }
}
