//! Aggregator entry point
//!
//! Wires the signal catalog, the dispatch table and the record store together
//! and runs the consumption loop over a [`FrameSource`].

use crate::config::AggregatorConfig;
use crate::dispatch::{DispatchTable, Outcome};
use crate::freshness::FreshnessPolicy;
use crate::message_decoder::FieldDecoder;
use crate::records::Snapshot;
use crate::signals::SignalDatabase;
use crate::source::FrameSource;
use crate::store::RecordStore;
use crate::types::{CanFrame, DispatchError, Result, SourceError, Timestamp};
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Where the loop takes "now" from when stamping a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    /// Wall clock at processing time (live buses)
    #[default]
    Wall,
    /// The frame's capture timestamp (log replay). A frame without one
    /// reuses the last capture timestamp seen, or the wall clock before any.
    FrameTimestamp,
}

impl Clock {
    pub fn now(self, frame: &CanFrame) -> Timestamp {
        self.now_after(frame, None)
    }

    /// Like [`Clock::now`], with `previous` standing in for a missing
    /// capture timestamp so a replay stays on the log's timeline.
    pub fn now_after(self, frame: &CanFrame, previous: Option<Timestamp>) -> Timestamp {
        match self {
            Clock::Wall => Utc::now(),
            Clock::FrameTimestamp if frame.timestamp_ns > 0 => frame.timestamp(),
            Clock::FrameTimestamp => previous.unwrap_or_else(Utc::now),
        }
    }
}

/// Counters of one [`Aggregator::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Frames received from the source
    pub frames: u64,
    pub applied: u64,
    /// Unknown identifiers and filtered channels
    pub ignored: u64,
    pub decode_errors: u64,
    pub contention_drops: u64,
    /// Receives that returned without a frame
    pub timeouts: u64,
    /// Malformed log lines skipped
    pub source_errors: u64,
    /// Replayed frames without a capture timestamp
    pub unstamped: u64,
}

impl RunStats {
    fn record(&mut self, result: &std::result::Result<Outcome, DispatchError>) {
        match result {
            Ok(Outcome::Applied { .. }) => self.applied += 1,
            Ok(Outcome::Ignored) => self.ignored += 1,
            Err(DispatchError::Decode(_)) => self.decode_errors += 1,
            Err(DispatchError::StoreContention { .. }) => self.contention_drops += 1,
        }
    }
}

/// The decode-dispatch-aggregate core
pub struct Aggregator<D = SignalDatabase> {
    decoder: D,
    table: DispatchTable,
    store: Arc<RecordStore>,
    config: AggregatorConfig,
}

impl Aggregator<SignalDatabase> {
    /// Load the camera's DBC and build the dispatch table from `config`.
    ///
    /// Signals the table expects but the DBC lacks are logged; frames for
    /// those identifiers will fail to decode.
    pub fn from_dbc(path: &Path, config: AggregatorConfig) -> Result<Self> {
        let mut database = SignalDatabase::new();
        database.add_dbc(path)?;

        let aggregator = Self::new(database, config)?;
        let missing = aggregator.check_catalog_coverage();
        if missing > 0 {
            log::warn!(
                "{} dispatched signal(s) not found in {:?}; affected frames will be rejected",
                missing,
                path
            );
        }
        Ok(aggregator)
    }

    /// Count table signals the catalog does not define, logging each one
    pub fn check_catalog_coverage(&self) -> usize {
        let mut missing = 0;
        for can_id in self.table.identifiers() {
            let Some(entry) = self.table.get(can_id) else {
                continue;
            };
            if self.decoder.get_message(can_id).is_none() {
                log::warn!("CAN ID 0x{:X} ({}) has no DBC message", can_id, entry.slot());
                missing += entry.signal_names().len();
                continue;
            }
            for name in entry.signal_names() {
                if !self.decoder.message_has_signal(can_id, name) {
                    log::warn!("Signal '{}' missing from DBC message 0x{:X}", name, can_id);
                    missing += 1;
                }
            }
        }
        missing
    }
}

impl<D: FieldDecoder> Aggregator<D> {
    /// Build with the table described by `config.layout` and `config.signals`
    pub fn new(decoder: D, config: AggregatorConfig) -> Result<Self> {
        let table = DispatchTable::from_layout(&config.layout, &config.signals)?;
        Ok(Self::with_table(decoder, table, config))
    }

    /// Build with an explicit dispatch table
    pub fn with_table(decoder: D, table: DispatchTable, config: AggregatorConfig) -> Self {
        log::debug!("Dispatch table holds {} identifiers", table.len());
        Self {
            decoder,
            table,
            store: Arc::new(RecordStore::with_lock_timeout(config.lock_timeout())),
            config,
        }
    }

    /// Shared handle to the record store for snapshot readers
    pub fn store(&self) -> Arc<RecordStore> {
        Arc::clone(&self.store)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Freshness policy using the configured threshold
    pub fn freshness_policy(&self) -> FreshnessPolicy {
        FreshnessPolicy::new(self.config.freshness_threshold())
    }

    /// Dispatch one frame, stamping its slot with `now`
    pub fn process_frame(
        &self,
        frame: &CanFrame,
        now: Timestamp,
    ) -> std::result::Result<Outcome, DispatchError> {
        if !self.config.should_process_channel(frame.channel) {
            log::trace!(
                "Skipping CAN ID 0x{:X} on filtered channel {}",
                frame.can_id,
                frame.channel
            );
            return Ok(Outcome::Ignored);
        }
        self.table
            .dispatch(&self.decoder, &self.store, frame.can_id, &frame.data, now)
    }

    /// Consume frames until `stop` is raised or a finite source runs dry.
    ///
    /// The stop flag is checked once per iteration, so the loop ends at most
    /// one receive timeout after it is set. Frame-level errors are logged and
    /// counted; only a source I/O error ends the loop early.
    pub fn run<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        stop: &AtomicBool,
        clock: Clock,
    ) -> std::result::Result<RunStats, SourceError> {
        let timeout = self.config.receive_timeout();
        let mut stats = RunStats::default();
        let mut last_stamp: Option<Timestamp> = None;
        log::info!("Aggregator loop started (receive timeout {:?})", timeout);

        while !stop.load(Ordering::Relaxed) {
            let frame = match source.receive(timeout) {
                Ok(Some(frame)) => frame,
                Ok(None) if source.is_exhausted() => {
                    log::info!("Frame source exhausted");
                    break;
                }
                Ok(None) => {
                    stats.timeouts += 1;
                    continue;
                }
                Err(SourceError::Parse { line, reason }) => {
                    log::warn!("Skipping malformed log line {}: {}", line, reason);
                    stats.source_errors += 1;
                    continue;
                }
                Err(e) => {
                    log::error!("Frame source failed: {}", e);
                    return Err(e);
                }
            };

            stats.frames += 1;
            let now = clock.now_after(&frame, last_stamp);
            if clock == Clock::FrameTimestamp {
                if frame.timestamp_ns == 0 {
                    stats.unstamped += 1;
                    log::debug!(
                        "Frame 0x{:X} has no capture timestamp, stamping {}",
                        frame.can_id,
                        now
                    );
                } else {
                    last_stamp = Some(now);
                }
            }
            let result = self.process_frame(&frame, now);
            if let Err(e) = &result {
                log::warn!("{}", e);
            }
            stats.record(&result);
        }

        log::info!(
            "Aggregator loop stopped: {} frames, {} applied, {} ignored, {} decode errors, {} contention drops",
            stats.frames,
            stats.applied,
            stats.ignored,
            stats.decode_errors,
            stats.contention_drops
        );
        if stats.unstamped > 0 {
            log::warn!(
                "{} replayed frames had no capture timestamp",
                stats.unstamped
            );
        }
        Ok(stats)
    }
}
