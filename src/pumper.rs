//! The pump orchestrator: drives reader → filter → converter → writer,
//! manages flush cadence and position checkpointing, and handles
//! resume-on-start and shutdown draining.
//!
//! State machine: `Starting → Streaming → (Draining → Stopped) | Failed`.
//! A failed state never advances the checkpoint further; the process exits
//! nonzero after the error is logged.
//!
//! Ordering: events are staged in reader order, and a checkpoint is written
//! only after a successful flush, when the staged buffer is empty. At that
//! moment every record read so far has either been durably written or
//! deliberately dropped by the filter or mutation policy, so the reader's
//! current position is safe to persist. Dropped records advance the
//! checkpoint because they were seen, not lost.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::checkpoint::{Checkpoint, CheckpointManager};
use crate::config::{ConversionPolicy, PumpConfig};
use crate::convert::EventConverter;
use crate::event::BinlogPosition;
use crate::filter::TableFilter;
use crate::reader::{ReadOutcome, SourceStream};
use crate::writer::{SinkClient, Writer};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Starting,
    Streaming,
    Draining,
    Stopped,
    Failed,
}

/// Counters reported when a run ends cleanly.
#[derive(Debug, Clone, Default)]
pub struct PumpSummary {
    /// Records pulled from the reader, including filtered ones.
    pub records_seen: u64,
    /// Events staged for the sink (written, unless the run was dry).
    pub events_pumped: u64,
    /// Last checkpoint persisted, if any.
    pub last_checkpoint: Option<BinlogPosition>,
}

pub struct Pumper<R, S> {
    reader: R,
    writer: Writer<S>,
    filter: TableFilter,
    converter: EventConverter,
    checkpoints: CheckpointManager,
    config: PumpConfig,
    shutdown: watch::Receiver<bool>,
    state: PumpState,
    records_seen: u64,
    events_pumped: u64,
    last_checkpoint: Option<BinlogPosition>,
}

impl<R: SourceStream, S: SinkClient> Pumper<R, S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reader: R,
        writer: Writer<S>,
        filter: TableFilter,
        converter: EventConverter,
        checkpoints: CheckpointManager,
        config: PumpConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            reader,
            writer,
            filter,
            converter,
            checkpoints,
            config,
            shutdown,
            state: PumpState::Starting,
            records_seen: 0,
            events_pumped: 0,
            last_checkpoint: None,
        }
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    /// Runs the pump until end of stream, shutdown, or a fatal error.
    ///
    /// On a clean stop the pump drains: one final forced flush of staged
    /// events followed by a final checkpoint, so an external stop never
    /// tears down mid-batch.
    pub async fn run(&mut self) -> Result<PumpSummary> {
        info!(from = %self.reader.position(), "Pump streaming");
        self.state = PumpState::Streaming;

        match self.stream().await {
            Ok(()) => {
                self.state = PumpState::Draining;
                debug!("Draining staged events");
                match self.flush_and_checkpoint().await {
                    Ok(()) => {
                        self.state = PumpState::Stopped;
                        let summary = self.summary();
                        info!(
                            records_seen = summary.records_seen,
                            events_pumped = summary.events_pumped,
                            "Pump stopped"
                        );
                        Ok(summary)
                    }
                    Err(e) => {
                        self.state = PumpState::Failed;
                        error!("Pump failed during drain: {}", e);
                        Err(e)
                    }
                }
            }
            Err(e) => {
                self.state = PumpState::Failed;
                error!("Pump failed: {}", e);
                Err(e)
            }
        }
    }

    async fn stream(&mut self) -> Result<()> {
        let flush_interval = Duration::from_millis(self.config.flush_interval_ms);
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut last_flush = Instant::now();

        loop {
            if *self.shutdown.borrow() {
                info!("Shutdown requested; finishing current batch");
                return Ok(());
            }

            // Reader-side conversion failures (a rows event whose table has
            // no resolvable column metadata, say) follow the same policy as
            // converter failures.
            let outcome = match self.reader.next_record().await {
                Ok(outcome) => outcome,
                Err(e @ Error::Conversion { .. }) => match self.config.on_conversion_error {
                    ConversionPolicy::Skip => {
                        warn!("Skipping unconvertible source data: {}", e);
                        continue;
                    }
                    ConversionPolicy::Abort => return Err(e),
                },
                Err(e) => return Err(e),
            };

            match outcome {
                ReadOutcome::Record(raw) => {
                    self.records_seen += 1;

                    if self.filter.accept(&raw.schema, &raw.table) {
                        match self.converter.to_event(raw) {
                            Ok(Some(event)) => {
                                self.writer.stage(event);
                                self.events_pumped += 1;
                            }
                            // Dropped by mutation policy; the record was
                            // seen, so its position still advances.
                            Ok(None) => {}
                            Err(e @ Error::Conversion { .. }) => {
                                match self.config.on_conversion_error {
                                    ConversionPolicy::Skip => {
                                        warn!("Skipping unconvertible record: {}", e)
                                    }
                                    ConversionPolicy::Abort => return Err(e),
                                }
                            }
                            Err(e) => return Err(e),
                        }
                    }

                    if self.writer.staged() >= self.config.batch_size {
                        self.flush_and_checkpoint().await?;
                        last_flush = Instant::now();
                    }
                }
                ReadOutcome::EndOfStream => {
                    info!("End of stream reached");
                    return Ok(());
                }
                ReadOutcome::WouldBlock => {
                    // The pipeline's only suspension point: wait for new
                    // data or for a shutdown signal, never a busy spin.
                    tokio::select! {
                        _ = sleep(poll_interval) => {}
                        _ = self.shutdown.changed() => {}
                    }
                }
            }

            if !self.writer.is_empty() && last_flush.elapsed() >= flush_interval {
                self.flush_and_checkpoint().await?;
                last_flush = Instant::now();
            }
        }
    }

    async fn flush_and_checkpoint(&mut self) -> Result<()> {
        if let Some(max_flushed) = self.writer.flush().await? {
            debug!(max_flushed = %max_flushed, "Batch flushed");
        }

        // The staged buffer is empty now, so everything read up to the
        // reader's position is accounted for.
        let position = self.reader.position();
        if self.last_checkpoint.as_ref() == Some(&position) {
            return Ok(());
        }

        let checkpoint = Checkpoint::new(position.clone(), self.events_pumped);
        self.checkpoints.save(&checkpoint).await?;
        self.last_checkpoint = Some(position);
        Ok(())
    }

    fn summary(&self) -> PumpSummary {
        PumpSummary {
            records_seen: self.records_seen,
            events_pumped: self.events_pumped,
            last_checkpoint: self.last_checkpoint.clone(),
        }
    }
}
