//! Record store
//!
//! Holds the ten tracked-object slots and the two lane slots behind one
//! coarse lock. The dispatch loop is the only writer; snapshot readers run
//! concurrently and never see a half-applied field group.

use crate::records::{LaneBoundary, LaneSide, ObjectIndex, SlotRef, Snapshot, TrackedObject};
use crate::types::{Category, Timestamp};
use parking_lot::RwLock;
use std::time::Duration;

/// Default bounded wait for the write lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(50);

/// Field group carried by a tracked object's kinematics frame
#[derive(Debug, Clone, PartialEq)]
pub struct Kinematics {
    pub class: Category,
    pub longitudinal_distance: f64,
    pub lateral_distance: f64,
    pub absolute_long_velocity: f64,
    pub absolute_lateral_velocity: f64,
    pub id: u32,
}

/// Partial update of one tracked object
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectPatch {
    Kinematics(Kinematics),
    Motion { motion_status: Category },
    Age { age: u32 },
}

/// Partial update of one lane boundary
#[derive(Debug, Clone, PartialEq)]
pub enum LanePatch {
    /// Classification, quality and the even coefficients
    Geometry {
        classification: Category,
        quality: Category,
        c0: f64,
        c2: f64,
    },
    /// The odd coefficients
    Curvature { c1: f64, c3: f64 },
}

/// One frame's worth of fields, bound to the slot it belongs to
#[derive(Debug, Clone, PartialEq)]
pub enum SlotUpdate {
    Object(ObjectIndex, ObjectPatch),
    Lane(LaneSide, LanePatch),
}

impl SlotUpdate {
    pub fn target(&self) -> SlotRef {
        match self {
            SlotUpdate::Object(index, _) => SlotRef::Object(*index),
            SlotUpdate::Lane(side, _) => SlotRef::Lane(*side),
        }
    }
}

impl ObjectPatch {
    fn apply(&self, object: &mut TrackedObject) {
        match self {
            ObjectPatch::Kinematics(k) => {
                object.class = k.class.clone();
                object.longitudinal_distance = k.longitudinal_distance;
                object.lateral_distance = k.lateral_distance;
                object.absolute_long_velocity = k.absolute_long_velocity;
                object.absolute_lateral_velocity = k.absolute_lateral_velocity;
                object.id = k.id;
            }
            ObjectPatch::Motion { motion_status } => {
                object.motion_status = motion_status.clone();
            }
            ObjectPatch::Age { age } => {
                object.age = *age;
            }
        }
    }
}

impl LanePatch {
    fn apply(&self, lane: &mut LaneBoundary) {
        match self {
            LanePatch::Geometry {
                classification,
                quality,
                c0,
                c2,
            } => {
                lane.classification = classification.clone();
                lane.quality = quality.clone();
                lane.c0 = *c0;
                lane.c2 = *c2;
            }
            LanePatch::Curvature { c1, c3 } => {
                lane.c1 = *c1;
                lane.c3 = *c3;
            }
        }
    }
}

/// The write lock could not be taken within two bounded waits
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("record store write lock not acquired within {0:?} (twice)")]
pub struct StoreBusy(pub Duration);

/// Thread-safe holder of all record slots
#[derive(Debug)]
pub struct RecordStore {
    slots: RwLock<Snapshot>,
    lock_timeout: Duration,
}

impl RecordStore {
    /// Create a store with all slots at their defaults
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            slots: RwLock::new(Snapshot::default()),
            lock_timeout,
        }
    }

    /// Overwrite only the fields carried by `update` and stamp its slot.
    ///
    /// The whole field group lands under one write lock. The lock wait is
    /// bounded and retried once before giving up.
    pub fn apply_partial(&self, update: &SlotUpdate, now: Timestamp) -> Result<(), StoreBusy> {
        let mut slots = match self.slots.try_write_for(self.lock_timeout) {
            Some(guard) => guard,
            None => {
                log::debug!("Record store busy, retrying {}", update.target());
                self.slots
                    .try_write_for(self.lock_timeout)
                    .ok_or(StoreBusy(self.lock_timeout))?
            }
        };

        match update {
            SlotUpdate::Object(index, patch) => {
                let object = &mut slots.objects[index.offset()];
                patch.apply(object);
                object.last_update = now;
            }
            SlotUpdate::Lane(side, patch) => {
                let lane = match side {
                    LaneSide::Left => &mut slots.left_lane,
                    LaneSide::Right => &mut slots.right_lane,
                };
                patch.apply(lane);
                lane.last_update = now;
            }
        }

        Ok(())
    }

    /// Consistent copy of every slot
    pub fn snapshot(&self) -> Snapshot {
        self.slots.read().clone()
    }

    /// Reset every slot to defaults and zero timestamps
    pub fn clear(&self) {
        *self.slots.write() = Snapshot::default();
        log::info!("Record store cleared");
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}
