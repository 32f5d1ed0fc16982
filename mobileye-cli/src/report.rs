//! Snapshot reports
//!
//! Renders the record store as a text table or as one JSON line per
//! snapshot. Freshness and lane usability are evaluated at render time.

use crate::config::OutputFormat;
use chrono::Utc;
use mobileye_aggregator::{
    Clock, FreshnessPolicy, LaneBoundary, LaneSide, RunStats, Snapshot, Timestamp, TrackedObject,
};
use serde::Serialize;
use std::io::{self, Write};

/// Reference time for freshness checks.
///
/// A replay is judged against the newest frame it has applied, a live
/// session against the wall clock.
pub fn reference_time(snapshot: &Snapshot, clock: Clock) -> Timestamp {
    match clock {
        Clock::Wall => Utc::now(),
        Clock::FrameTimestamp => snapshot
            .objects
            .iter()
            .map(|o| o.last_update)
            .chain([snapshot.left_lane.last_update, snapshot.right_lane.last_update])
            .max()
            .filter(|latest| *latest > Timestamp::default())
            .unwrap_or_else(Utc::now),
    }
}

#[derive(Serialize)]
struct ObjectEntry<'a> {
    index: usize,
    fresh: bool,
    #[serde(flatten)]
    object: &'a TrackedObject,
}

#[derive(Serialize)]
struct LaneEntry<'a> {
    side: String,
    usable: bool,
    #[serde(flatten)]
    lane: &'a LaneBoundary,
}

#[derive(Serialize)]
struct SnapshotEntry<'a> {
    time: Timestamp,
    objects: Vec<ObjectEntry<'a>>,
    lanes: Vec<LaneEntry<'a>>,
}

/// Writes snapshots in the configured format
pub struct Reporter {
    format: OutputFormat,
    policy: FreshnessPolicy,
}

impl Reporter {
    pub fn new(format: OutputFormat, policy: FreshnessPolicy) -> Self {
        Self { format, policy }
    }

    pub fn write_snapshot<W: Write>(
        &self,
        out: &mut W,
        snapshot: &Snapshot,
        now: Timestamp,
    ) -> io::Result<()> {
        match self.format {
            OutputFormat::Txt => self.write_text(out, snapshot, now),
            OutputFormat::Json => self.write_json(out, snapshot, now),
        }
    }

    fn write_text<W: Write>(&self, out: &mut W, snapshot: &Snapshot, now: Timestamp) -> io::Result<()> {
        writeln!(out, "=== Snapshot at {} ===", now.format("%H:%M:%S%.3f"))?;

        let mut any = false;
        for (index, object) in snapshot.updated_objects() {
            if !any {
                writeln!(
                    out,
                    "{:>3}  {:<6} {:<12} {:>8} {:>8} {:>8} {:>8} {:<12} {:>6}",
                    "#", "state", "class", "long m", "lat m", "vx m/s", "vy m/s", "motion", "age"
                )?;
                any = true;
            }
            let state = if self.policy.object_is_fresh(object, now) {
                "fresh"
            } else {
                "stale"
            };
            writeln!(
                out,
                "{:>3}  {:<6} {:<12} {:>8.2} {:>8.2} {:>8.2} {:>8.2} {:<12} {:>6}",
                index,
                state,
                object.class.to_string(),
                object.longitudinal_distance,
                object.lateral_distance,
                object.absolute_long_velocity,
                object.absolute_lateral_velocity,
                object.motion_status.to_string(),
                object.age
            )?;
        }
        if !any {
            writeln!(out, "  no tracked objects")?;
        }

        for side in [LaneSide::Left, LaneSide::Right] {
            let lane = snapshot.lane(side);
            if !lane.has_update() {
                writeln!(out, "  {} lane: never seen", side)?;
                continue;
            }
            let state = if self.policy.lane_is_usable(lane, now) {
                "usable"
            } else {
                "unusable"
            };
            writeln!(
                out,
                "  {} lane: {} (quality {}, {}) c0={:.3} c1={:.5} c2={:.6} c3={:.8}",
                side, state, lane.quality, lane.classification, lane.c0, lane.c1, lane.c2, lane.c3
            )?;
        }
        Ok(())
    }

    fn write_json<W: Write>(&self, out: &mut W, snapshot: &Snapshot, now: Timestamp) -> io::Result<()> {
        let entry = SnapshotEntry {
            time: now,
            objects: snapshot
                .updated_objects()
                .map(|(index, object)| ObjectEntry {
                    index: index.get(),
                    fresh: self.policy.object_is_fresh(object, now),
                    object,
                })
                .collect(),
            lanes: [LaneSide::Left, LaneSide::Right]
                .into_iter()
                .map(|side| {
                    let lane = snapshot.lane(side);
                    LaneEntry {
                        side: side.to_string(),
                        usable: self.policy.lane_is_usable(lane, now),
                        lane,
                    }
                })
                .collect(),
        };
        serde_json::to_writer(&mut *out, &entry)?;
        writeln!(out)
    }

    pub fn write_stats<W: Write>(&self, out: &mut W, stats: &RunStats) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_writer(&mut *out, stats)?;
                writeln!(out)
            }
            OutputFormat::Txt => {
                writeln!(out, "=== Run statistics ===")?;
                writeln!(out, "  Frames:           {}", stats.frames)?;
                writeln!(out, "  Applied:          {}", stats.applied)?;
                writeln!(out, "  Ignored:          {}", stats.ignored)?;
                writeln!(out, "  Decode errors:    {}", stats.decode_errors)?;
                writeln!(out, "  Contention drops: {}", stats.contention_drops)?;
                writeln!(out, "  Malformed lines:  {}", stats.source_errors)?;
                writeln!(out, "  Unstamped frames: {}", stats.unstamped)?;
                writeln!(out, "  Idle receives:    {}", stats.timeouts)
            }
        }
    }
}
