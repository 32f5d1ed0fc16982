//! Identifier dispatch table
//!
//! Maps every CAN identifier the camera uses to the slot it refreshes and the
//! signal names that fill the slot's fields. The table is plain data built
//! once from an [`IdentifierLayout`] and validated up front: a duplicate
//! identifier or an out-of-range object index is a construction error, never
//! a runtime surprise.

use crate::config::{lane_signal, object_signal, IdentifierLayout, SignalNames};
use crate::message_decoder::FieldDecoder;
use crate::records::{LaneSide, ObjectIndex, SlotRef, OBJECT_SLOTS};
use crate::store::{Kinematics, LanePatch, ObjectPatch, RecordStore, SlotUpdate};
use crate::types::{
    Category, DecodeError, DecodeErrorKind, DispatchError, FieldMap, SignalValue, TableError,
    Timestamp,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Which subset of a slot's fields a frame carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FieldGroup {
    /// Class, distances, velocities and track id
    ObjectKinematics,
    ObjectMotion,
    ObjectAge,
    /// Classification, quality, c0 and c2
    LaneGeometry,
    /// c1 and c3
    LaneCurvature,
}

impl fmt::Display for FieldGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldGroup::ObjectKinematics => "kinematics",
            FieldGroup::ObjectMotion => "motion status",
            FieldGroup::ObjectAge => "age",
            FieldGroup::LaneGeometry => "lane geometry",
            FieldGroup::LaneCurvature => "lane curvature",
        };
        write!(f, "{}", name)
    }
}

/// Signal names feeding a tracked object's field group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectFields {
    Kinematics {
        class: String,
        longitudinal_distance: String,
        lateral_distance: String,
        absolute_long_velocity: String,
        absolute_lateral_velocity: String,
        id: String,
    },
    Motion {
        motion_status: String,
    },
    Age {
        age: String,
    },
}

/// Signal names feeding a lane boundary's field group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaneFields {
    Geometry {
        classification: String,
        quality: String,
        c0: String,
        c2: String,
    },
    Curvature {
        c1: String,
        c3: String,
    },
}

/// Slot and field bindings of one identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryTarget {
    Object(ObjectIndex, ObjectFields),
    Lane(LaneSide, LaneFields),
}

/// One row of the dispatch table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchEntry {
    pub can_id: u32,
    pub target: EntryTarget,
}

impl DispatchEntry {
    /// Entry for tracked object `index` (1..=10)
    pub fn object(can_id: u32, index: usize, fields: ObjectFields) -> Result<Self, TableError> {
        let index = ObjectIndex::new(index).ok_or(TableError::SlotOutOfRange(index))?;
        Ok(Self {
            can_id,
            target: EntryTarget::Object(index, fields),
        })
    }

    pub fn lane(can_id: u32, side: LaneSide, fields: LaneFields) -> Self {
        Self {
            can_id,
            target: EntryTarget::Lane(side, fields),
        }
    }

    pub fn slot(&self) -> SlotRef {
        match &self.target {
            EntryTarget::Object(index, _) => SlotRef::Object(*index),
            EntryTarget::Lane(side, _) => SlotRef::Lane(*side),
        }
    }

    pub fn group(&self) -> FieldGroup {
        match &self.target {
            EntryTarget::Object(_, ObjectFields::Kinematics { .. }) => FieldGroup::ObjectKinematics,
            EntryTarget::Object(_, ObjectFields::Motion { .. }) => FieldGroup::ObjectMotion,
            EntryTarget::Object(_, ObjectFields::Age { .. }) => FieldGroup::ObjectAge,
            EntryTarget::Lane(_, LaneFields::Geometry { .. }) => FieldGroup::LaneGeometry,
            EntryTarget::Lane(_, LaneFields::Curvature { .. }) => FieldGroup::LaneCurvature,
        }
    }

    /// Signal names this entry reads, in field order
    pub fn signal_names(&self) -> Vec<&str> {
        match &self.target {
            EntryTarget::Object(_, fields) => match fields {
                ObjectFields::Kinematics {
                    class,
                    longitudinal_distance,
                    lateral_distance,
                    absolute_long_velocity,
                    absolute_lateral_velocity,
                    id,
                } => vec![
                    class,
                    longitudinal_distance,
                    lateral_distance,
                    absolute_long_velocity,
                    absolute_lateral_velocity,
                    id,
                ],
                ObjectFields::Motion { motion_status } => vec![motion_status],
                ObjectFields::Age { age } => vec![age],
            },
            EntryTarget::Lane(_, fields) => match fields {
                LaneFields::Geometry {
                    classification,
                    quality,
                    c0,
                    c2,
                } => vec![classification, quality, c0, c2],
                LaneFields::Curvature { c1, c3 } => vec![c1, c3],
            },
        }
        .into_iter()
        .map(String::as_str)
        .collect()
    }

    /// Pull every bound field out of a decode result.
    ///
    /// All-or-nothing: one missing or mistyped signal fails the whole group.
    pub fn extract(&self, fields: &FieldMap) -> Result<SlotUpdate, DecodeErrorKind> {
        match &self.target {
            EntryTarget::Object(index, bindings) => {
                let patch = match bindings {
                    ObjectFields::Kinematics {
                        class,
                        longitudinal_distance,
                        lateral_distance,
                        absolute_long_velocity,
                        absolute_lateral_velocity,
                        id,
                    } => ObjectPatch::Kinematics(Kinematics {
                        class: category(fields, class)?,
                        longitudinal_distance: number(fields, longitudinal_distance)?,
                        lateral_distance: number(fields, lateral_distance)?,
                        absolute_long_velocity: number(fields, absolute_long_velocity)?,
                        absolute_lateral_velocity: number(fields, absolute_lateral_velocity)?,
                        id: count(fields, id)?,
                    }),
                    ObjectFields::Motion { motion_status } => ObjectPatch::Motion {
                        motion_status: category(fields, motion_status)?,
                    },
                    ObjectFields::Age { age } => ObjectPatch::Age {
                        age: count(fields, age)?,
                    },
                };
                Ok(SlotUpdate::Object(*index, patch))
            }
            EntryTarget::Lane(side, bindings) => {
                let patch = match bindings {
                    LaneFields::Geometry {
                        classification,
                        quality,
                        c0,
                        c2,
                    } => LanePatch::Geometry {
                        classification: category(fields, classification)?,
                        quality: category(fields, quality)?,
                        c0: number(fields, c0)?,
                        c2: number(fields, c2)?,
                    },
                    LaneFields::Curvature { c1, c3 } => LanePatch::Curvature {
                        c1: number(fields, c1)?,
                        c3: number(fields, c3)?,
                    },
                };
                Ok(SlotUpdate::Lane(*side, patch))
            }
        }
    }
}

fn field<'a>(fields: &'a FieldMap, name: &str) -> Result<&'a SignalValue, DecodeErrorKind> {
    fields
        .get(name)
        .ok_or_else(|| DecodeErrorKind::MissingSignal(name.to_string()))
}

fn incompatible(name: &str, value: &SignalValue) -> DecodeErrorKind {
    DecodeErrorKind::IncompatibleValue {
        signal: name.to_string(),
        value: value.to_string(),
    }
}

fn number(fields: &FieldMap, name: &str) -> Result<f64, DecodeErrorKind> {
    let value = field(fields, name)?;
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| incompatible(name, value))
}

fn count(fields: &FieldMap, name: &str) -> Result<u32, DecodeErrorKind> {
    let value = field(fields, name)?;
    value
        .as_i64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| incompatible(name, value))
}

fn category(fields: &FieldMap, name: &str) -> Result<Category, DecodeErrorKind> {
    let value = field(fields, name)?;
    Category::from_value(value).ok_or_else(|| incompatible(name, value))
}

/// Result of dispatching one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The frame refreshed one field group of one slot
    Applied { slot: SlotRef, group: FieldGroup },
    /// No entry for this identifier (or the frame was filtered out)
    Ignored,
}

/// Identifier -> entry lookup, validated at construction
#[derive(Debug, Clone)]
pub struct DispatchTable {
    entries: HashMap<u32, DispatchEntry>,
}

impl DispatchTable {
    /// Build a table from explicit entries, rejecting duplicate identifiers
    pub fn from_entries(entries: impl IntoIterator<Item = DispatchEntry>) -> Result<Self, TableError> {
        let mut table = HashMap::new();
        for entry in entries {
            let can_id = entry.can_id;
            if table.insert(can_id, entry).is_some() {
                return Err(TableError::DuplicateIdentifier(can_id));
            }
        }
        Ok(Self { entries: table })
    }

    /// Build the camera's table: three identifiers per tracked object and
    /// two per lane boundary.
    pub fn from_layout(layout: &IdentifierLayout, names: &SignalNames) -> Result<Self, TableError> {
        let mut entries = Vec::with_capacity(OBJECT_SLOTS * 3 + 4);

        for k in 1..=OBJECT_SLOTS {
            let first = (3 * (k as u32 - 1))
                .checked_add(layout.object_base)
                .filter(|first| first.checked_add(2).is_some())
                .ok_or(TableError::LayoutOverflow(layout.object_base))?;

            entries.push(DispatchEntry::object(
                first,
                k,
                ObjectFields::Kinematics {
                    class: object_signal(&names.object_class, k),
                    longitudinal_distance: object_signal(&names.longitudinal_distance, k),
                    lateral_distance: object_signal(&names.lateral_distance, k),
                    absolute_long_velocity: object_signal(&names.absolute_long_velocity, k),
                    absolute_lateral_velocity: object_signal(&names.absolute_lateral_velocity, k),
                    id: object_signal(&names.object_id, k),
                },
            )?);
            entries.push(DispatchEntry::object(
                first + 1,
                k,
                ObjectFields::Motion {
                    motion_status: object_signal(&names.motion_status, k),
                },
            )?);
            entries.push(DispatchEntry::object(
                first + 2,
                k,
                ObjectFields::Age {
                    age: object_signal(&names.object_age, k),
                },
            )?);
        }

        for side in [LaneSide::Left, LaneSide::Right] {
            let ids = layout.lane(side);
            entries.push(DispatchEntry::lane(
                ids.geometry,
                side,
                LaneFields::Geometry {
                    classification: lane_signal(&names.lane_classification, side),
                    quality: lane_signal(&names.lane_quality, side),
                    c0: lane_signal(&names.lane_c0, side),
                    c2: lane_signal(&names.lane_c2, side),
                },
            ));
            entries.push(DispatchEntry::lane(
                ids.curvature,
                side,
                LaneFields::Curvature {
                    c1: lane_signal(&names.lane_c1, side),
                    c3: lane_signal(&names.lane_c3, side),
                },
            ));
        }

        Self::from_entries(entries)
    }

    pub fn get(&self, can_id: u32) -> Option<&DispatchEntry> {
        self.entries.get(&can_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All identifiers in ascending order
    pub fn identifiers(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Route one frame into the store.
    ///
    /// Unknown identifiers are ignored without decoding. A decode failure
    /// leaves the store untouched and is reported for this frame only.
    pub fn dispatch(
        &self,
        decoder: &dyn FieldDecoder,
        store: &RecordStore,
        can_id: u32,
        payload: &[u8],
        now: Timestamp,
    ) -> Result<Outcome, DispatchError> {
        let Some(entry) = self.entries.get(&can_id) else {
            log::trace!("No dispatch entry for CAN ID 0x{:X}", can_id);
            return Ok(Outcome::Ignored);
        };

        let fields = decoder.decode(can_id, payload)?;
        let update = entry
            .extract(&fields)
            .map_err(|kind| DecodeError::new(can_id, kind))?;

        store
            .apply_partial(&update, now)
            .map_err(|_| DispatchError::StoreContention { can_id })?;

        let slot = entry.slot();
        let group = entry.group();
        log::debug!("0x{:X} -> {} ({})", can_id, slot, group);
        Ok(Outcome::Applied { slot, group })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LaneIds;

    fn default_table() -> DispatchTable {
        DispatchTable::from_layout(&IdentifierLayout::default(), &SignalNames::default()).unwrap()
    }

    #[test]
    fn test_layout_produces_every_identifier() {
        let table = default_table();
        assert_eq!(table.len(), 34);

        let mut expected: Vec<u32> = (568..=597).collect();
        expected.extend([614, 615, 616, 617]);
        assert_eq!(table.identifiers(), expected);
    }

    #[test]
    fn test_object_triplets_route_to_their_slot() {
        let table = default_table();
        for k in 1..=10u32 {
            let base = 568 + 3 * (k - 1);
            let slot = SlotRef::Object(ObjectIndex::new(k as usize).unwrap());
            let groups: Vec<(SlotRef, FieldGroup)> = (base..base + 3)
                .map(|id| {
                    let entry = table.get(id).unwrap();
                    (entry.slot(), entry.group())
                })
                .collect();
            assert_eq!(
                groups,
                vec![
                    (slot, FieldGroup::ObjectKinematics),
                    (slot, FieldGroup::ObjectMotion),
                    (slot, FieldGroup::ObjectAge),
                ]
            );
        }
    }

    #[test]
    fn test_signal_names_follow_templates() {
        let table = default_table();
        assert_eq!(
            table.get(574).unwrap().signal_names(),
            vec![
                "Object_Class_3_A",
                "Longitudinal_Distance_3_A",
                "Lateral_Distance_3_A",
                "Absolute_Long_Velocity_3_A",
                "Absolute_Lateral_Velocity_3_A",
                "ID_3_A",
            ]
        );
        assert_eq!(table.get(596).unwrap().signal_names(), vec!["Motion_Status_10_B"]);
        assert_eq!(
            table.get(615).unwrap().signal_names(),
            vec!["LaneMarkHeadingAngle_C1_Lh_ME", "LaneMarkModelDerivA_C3_Lh_ME"]
        );
        assert_eq!(table.get(616).unwrap().slot(), SlotRef::Lane(LaneSide::Right));
    }

    #[test]
    fn test_overlapping_lane_ids_fail_fast() {
        let layout = IdentifierLayout {
            left_lane: LaneIds {
                geometry: 570,
                curvature: 615,
            },
            ..IdentifierLayout::default()
        };
        let result = DispatchTable::from_layout(&layout, &SignalNames::default());
        assert_eq!(result.unwrap_err(), TableError::DuplicateIdentifier(570));
    }

    #[test]
    fn test_layout_overflow_fails_fast() {
        let layout = IdentifierLayout {
            object_base: u32::MAX - 10,
            ..IdentifierLayout::default()
        };
        let result = DispatchTable::from_layout(&layout, &SignalNames::default());
        assert_eq!(result.unwrap_err(), TableError::LayoutOverflow(u32::MAX - 10));
    }

    #[test]
    fn test_out_of_range_slot_fails_fast() {
        let err = DispatchEntry::object(0x300, 11, ObjectFields::Age { age: "Age".into() })
            .unwrap_err();
        assert_eq!(err, TableError::SlotOutOfRange(11));
        assert!(DispatchEntry::object(0x300, 0, ObjectFields::Age { age: "Age".into() }).is_err());
    }

    #[test]
    fn test_extract_requires_every_field() {
        let entry = DispatchEntry::lane(
            614,
            LaneSide::Left,
            LaneFields::Curvature {
                c1: "C1".into(),
                c3: "C3".into(),
            },
        );
        let mut fields = FieldMap::new();
        fields.insert("C1".into(), SignalValue::Float(0.1));
        assert_eq!(
            entry.extract(&fields),
            Err(DecodeErrorKind::MissingSignal("C3".into()))
        );

        fields.insert("C3".into(), SignalValue::Text("n/a".into()));
        assert!(matches!(
            entry.extract(&fields),
            Err(DecodeErrorKind::IncompatibleValue { .. })
        ));

        fields.insert("C3".into(), SignalValue::Float(0.0001));
        assert_eq!(
            entry.extract(&fields),
            Ok(SlotUpdate::Lane(
                LaneSide::Left,
                LanePatch::Curvature { c1: 0.1, c3: 0.0001 }
            ))
        );
    }

    #[test]
    fn test_negative_age_is_incompatible() {
        let entry = DispatchEntry::object(570, 1, ObjectFields::Age { age: "Age".into() }).unwrap();
        let fields = FieldMap::from([("Age".to_string(), SignalValue::Integer(-1))]);
        assert!(matches!(
            entry.extract(&fields),
            Err(DecodeErrorKind::IncompatibleValue { .. })
        ));
    }
}
