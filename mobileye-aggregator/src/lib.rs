//! Mobileye Aggregator Library
//!
//! Decodes the CAN frames of a Mobileye-style front camera and assembles them
//! into a fixed set of record slots: ten tracked objects and two lane
//! boundaries. Every slot is refreshed field-group by field-group as its
//! frames arrive, and freshness is judged at read time.
//!
//! # Architecture
//!
//! - A [`FrameSource`] yields raw frames (live channel, candump log, replay)
//! - The [`SignalDatabase`] (loaded from a DBC) decodes a payload into named
//!   signal values
//! - The [`DispatchTable`] maps each identifier to the slot and field group it
//!   refreshes
//! - The [`RecordStore`] applies the partial update under one lock and stamps
//!   the slot
//! - [`FreshnessPolicy`] decides at read time which slots a consumer may use
//!
//! The library does NOT render anything or publish the records; consumers
//! take [`Snapshot`]s from the store.
//!
//! # Example Usage
//!
//! ```no_run
//! use mobileye_aggregator::{Aggregator, AggregatorConfig, CandumpSource, Clock};
//! use std::path::Path;
//! use std::sync::atomic::AtomicBool;
//!
//! let aggregator = Aggregator::from_dbc(Path::new("mobileye.dbc"), AggregatorConfig::new()).unwrap();
//! let mut source = CandumpSource::open(Path::new("drive.log")).unwrap();
//! let stop = AtomicBool::new(false);
//!
//! let stats = aggregator.run(&mut source, &stop, Clock::FrameTimestamp).unwrap();
//! println!("{} frames applied", stats.applied);
//!
//! let snapshot = aggregator.snapshot();
//! let policy = aggregator.freshness_policy();
//! for (index, object) in policy.fresh_objects(&snapshot, chrono::Utc::now()) {
//!     println!("object {}: {} at {:.1} m", index, object.class, object.longitudinal_distance);
//! }
//! ```

pub mod aggregator;
pub mod config;
pub mod dispatch;
pub mod formats;
pub mod freshness;
pub mod records;
pub mod signals;
pub mod source;
pub mod store;
pub mod types;

mod message_decoder;

// Re-export main types for convenience
pub use aggregator::{Aggregator, Clock, RunStats};
pub use config::{AggregatorConfig, IdentifierLayout, LaneIds, SignalNames};
pub use dispatch::{
    DispatchEntry, DispatchTable, EntryTarget, FieldGroup, LaneFields, ObjectFields, Outcome,
};
pub use formats::CandumpSource;
pub use freshness::{is_fresh, is_lane_usable, is_lowest_quality, FreshnessPolicy};
pub use message_decoder::FieldDecoder;
pub use records::{
    LaneBoundary, LaneSide, ObjectIndex, SlotRef, Snapshot, TrackedObject, OBJECT_SLOTS,
};
pub use signals::{DatabaseStats, SignalDatabase};
pub use source::{ChannelSource, FrameSource, ReplaySource};
pub use store::{RecordStore, SlotUpdate, StoreBusy};
pub use types::{
    AggregatorError, CanFrame, CatalogError, Category, DecodeError, DecodeErrorKind,
    DispatchError, FieldMap, Result, SignalValue, SourceError, TableError, Timestamp,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
