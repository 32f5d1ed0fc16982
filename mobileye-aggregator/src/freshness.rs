//! Read-time freshness and lane quality gating
//!
//! Nothing here mutates the record store. A stale slot keeps its last values
//! so they stay inspectable; consumers decide per read whether to trust them.

use crate::records::{LaneBoundary, LaneSide, ObjectIndex, Snapshot, TrackedObject};
use crate::types::{Category, Timestamp};
use chrono::Duration;

/// Name the camera uses for its lowest lane quality level
const LOWEST_QUALITY_NAME: &str = "very low quality";

/// True iff the slot has been updated at all and `now - last_update <= threshold`.
///
/// A `last_update` later than `now` (clock skew between frame and reader)
/// counts as fresh.
pub fn is_fresh(last_update: Timestamp, now: Timestamp, threshold: Duration) -> bool {
    if last_update <= Timestamp::default() {
        return false;
    }
    now.signed_duration_since(last_update) <= threshold
}

/// True when a quality value denotes the lowest (invalid) level.
///
/// Accepts the raw code 0, the value-table name, or free text spelling
/// "very low quality" in any letter case.
pub fn is_lowest_quality(quality: &Category) -> bool {
    if quality.code == Some(0) {
        return true;
    }
    quality
        .name
        .as_deref()
        .map(|name| name.trim().eq_ignore_ascii_case(LOWEST_QUALITY_NAME))
        .unwrap_or(false)
}

/// A lane is usable when it is fresh and its quality is above the lowest level
pub fn is_lane_usable(lane: &LaneBoundary, now: Timestamp, threshold: Duration) -> bool {
    is_fresh(lane.last_update, now, threshold) && !is_lowest_quality(&lane.quality)
}

/// Freshness threshold bundled with the checks that use it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub threshold: Duration,
}

impl FreshnessPolicy {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn from_millis(threshold_ms: u64) -> Self {
        Self::new(Duration::milliseconds(threshold_ms.min(i64::MAX as u64) as i64))
    }

    pub fn object_is_fresh(&self, object: &TrackedObject, now: Timestamp) -> bool {
        is_fresh(object.last_update, now, self.threshold)
    }

    pub fn lane_is_usable(&self, lane: &LaneBoundary, now: Timestamp) -> bool {
        is_lane_usable(lane, now, self.threshold)
    }

    /// Fresh tracked objects of a snapshot, by index
    pub fn fresh_objects<'a>(
        &'a self,
        snapshot: &'a Snapshot,
        now: Timestamp,
    ) -> impl Iterator<Item = (ObjectIndex, &'a TrackedObject)> + 'a {
        snapshot
            .updated_objects()
            .filter(move |(_, object)| self.object_is_fresh(object, now))
    }

    /// Lanes of a snapshot that pass both the freshness and the quality gate
    pub fn usable_lanes<'a>(
        &'a self,
        snapshot: &'a Snapshot,
        now: Timestamp,
    ) -> impl Iterator<Item = (LaneSide, &'a LaneBoundary)> + 'a {
        [LaneSide::Left, LaneSide::Right]
            .into_iter()
            .map(move |side| (side, snapshot.lane(side)))
            .filter(move |(_, lane)| self.lane_is_usable(lane, now))
    }
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::from_millis(crate::config::DEFAULT_FRESHNESS_THRESHOLD_MS)
    }
}
