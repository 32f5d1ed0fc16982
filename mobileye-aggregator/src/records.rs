//! Domain records assembled from partial frames
//!
//! Ten tracked-object slots and two lane-boundary slots. Every slot carries
//! the timestamp of its most recent contributing frame; a default slot has
//! the epoch as `last_update` and counts as never updated.

use crate::types::{Category, Timestamp};
use serde::Serialize;
use std::fmt;

/// Number of tracked-object slots
pub const OBJECT_SLOTS: usize = 10;

/// One tracked object as reported by the camera
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackedObject {
    /// Object class (vehicle, pedestrian, ...)
    pub class: Category,
    /// Longitudinal distance in meters
    pub longitudinal_distance: f64,
    /// Lateral distance in meters
    pub lateral_distance: f64,
    /// Absolute longitudinal velocity in m/s
    pub absolute_long_velocity: f64,
    /// Absolute lateral velocity in m/s
    pub absolute_lateral_velocity: f64,
    /// Track id assigned by the sensor
    pub id: u32,
    /// Motion status (moving, stationary, ...)
    pub motion_status: Category,
    /// Number of observation cycles
    pub age: u32,
    /// Timestamp of the most recent contributing frame
    pub last_update: Timestamp,
}

impl TrackedObject {
    /// True once any frame group has been applied to this slot
    pub fn has_update(&self) -> bool {
        self.last_update > Timestamp::default()
    }
}

/// One lane marking modelled as a cubic polynomial
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LaneBoundary {
    pub classification: Category,
    pub quality: Category,
    /// Lateral offset in meters
    pub c0: f64,
    /// Heading angle in radians
    pub c1: f64,
    /// Curvature in 1/m
    pub c2: f64,
    /// Curvature rate in 1/m²
    pub c3: f64,
    /// Timestamp of the most recent contributing frame
    pub last_update: Timestamp,
}

impl LaneBoundary {
    pub fn has_update(&self) -> bool {
        self.last_update > Timestamp::default()
    }

    /// Lateral position of the marking `x` meters ahead
    pub fn lateral_offset_at(&self, x: f64) -> f64 {
        // Horner form of c0 + c1 x + c2 x² + c3 x³
        self.c0 + x * (self.c1 + x * (self.c2 + x * self.c3))
    }

    /// Sample the marking on an evenly spaced grid from 0 to `max_distance`.
    ///
    /// Returns `(x, y)` pairs, or nothing for a lane that was never updated.
    pub fn sample(&self, max_distance: f64, points: usize) -> Vec<(f64, f64)> {
        if !self.has_update() || points == 0 {
            return Vec::new();
        }
        if points == 1 {
            return vec![(0.0, self.c0)];
        }

        let step = max_distance / (points - 1) as f64;
        (0..points)
            .map(|i| {
                let x = step * i as f64;
                (x, self.lateral_offset_at(x))
            })
            .collect()
    }
}

/// Validated tracked-object index in 1..=10
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObjectIndex(u8);

impl ObjectIndex {
    /// Returns `None` outside 1..=10
    pub fn new(index: usize) -> Option<Self> {
        if (1..=OBJECT_SLOTS).contains(&index) {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    /// One-based index as used on the bus
    pub fn get(self) -> usize {
        self.0 as usize
    }

    /// Zero-based position in the store
    pub(crate) fn offset(self) -> usize {
        self.0 as usize - 1
    }

    /// All ten indices in ascending order
    pub fn all() -> impl Iterator<Item = ObjectIndex> {
        (1..=OBJECT_SLOTS as u8).map(ObjectIndex)
    }
}

impl fmt::Display for ObjectIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which lane boundary a frame refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LaneSide {
    Left,
    Right,
}

impl LaneSide {
    /// Suffix used in the signal names ("Lh" / "Rh")
    pub fn signal_suffix(self) -> &'static str {
        match self {
            LaneSide::Left => "Lh",
            LaneSide::Right => "Rh",
        }
    }
}

impl fmt::Display for LaneSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneSide::Left => write!(f, "left"),
            LaneSide::Right => write!(f, "right"),
        }
    }
}

/// Address of one record slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SlotRef {
    Object(ObjectIndex),
    Lane(LaneSide),
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotRef::Object(index) => write!(f, "object {}", index),
            SlotRef::Lane(side) => write!(f, "{} lane", side),
        }
    }
}

/// Copy of every slot at one moment
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub objects: [TrackedObject; OBJECT_SLOTS],
    pub left_lane: LaneBoundary,
    pub right_lane: LaneBoundary,
}

impl Snapshot {
    pub fn object(&self, index: ObjectIndex) -> &TrackedObject {
        &self.objects[index.offset()]
    }

    pub fn lane(&self, side: LaneSide) -> &LaneBoundary {
        match side {
            LaneSide::Left => &self.left_lane,
            LaneSide::Right => &self.right_lane,
        }
    }

    /// Objects that have received at least one frame, with their index
    pub fn updated_objects(&self) -> impl Iterator<Item = (ObjectIndex, &TrackedObject)> {
        ObjectIndex::all()
            .map(move |index| (index, self.object(index)))
            .filter(|(_, object)| object.has_update())
    }
}
