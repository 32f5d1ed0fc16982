// Dispatch properties checked against the full record store.
//
// A stub decoder stands in for the DBC catalog so every identifier of the
// default layout can be exercised with well-formed and broken decodes.

use chrono::{DateTime, Duration};
use mobileye_aggregator::{
    is_fresh, Category, DecodeError, DecodeErrorKind, DispatchError, DispatchTable, FieldDecoder,
    FieldGroup, FieldMap, IdentifierLayout, LaneBoundary, LaneSide, ObjectIndex, Outcome,
    RecordStore, SignalNames, SignalValue, SlotRef, Snapshot, Timestamp, TrackedObject,
};
use std::sync::atomic::{AtomicUsize, Ordering};

fn at_ms(ms: i64) -> Timestamp {
    DateTime::from_timestamp_millis(ms).unwrap()
}

fn table() -> DispatchTable {
    DispatchTable::from_layout(&IdentifierLayout::default(), &SignalNames::default()).unwrap()
}

/// Plausible value for a signal, derived from its name and a seed
fn value_for(name: &str, seed: i64) -> SignalValue {
    if name.starts_with("Object_Class") || name.starts_with("Classification") {
        SignalValue::Named {
            name: format!("Class {}", seed),
            raw: seed,
        }
    } else if name.starts_with("Motion_Status") {
        SignalValue::Text(format!("moving-{}", seed))
    } else if name.starts_with("Quality") {
        SignalValue::Integer(3)
    } else if name.starts_with("ID_") || name.starts_with("Object_Age") {
        SignalValue::Integer(seed)
    } else {
        SignalValue::Float(seed as f64 + 0.5)
    }
}

/// Field map holding every signal the entry for `can_id` reads
fn fields_for(table: &DispatchTable, can_id: u32, seed: i64) -> FieldMap {
    table
        .get(can_id)
        .unwrap()
        .signal_names()
        .into_iter()
        .map(|name| (name.to_string(), value_for(name, seed)))
        .collect()
}

/// Returns the same prepared fields for every identifier it knows
struct StubDecoder {
    frames: FieldMap,
    calls: AtomicUsize,
}

impl StubDecoder {
    fn new(frames: FieldMap) -> Self {
        Self {
            frames,
            calls: AtomicUsize::new(0),
        }
    }
}

impl FieldDecoder for StubDecoder {
    fn decode(&self, _can_id: u32, _payload: &[u8]) -> Result<FieldMap, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.frames.clone())
    }
}

/// Fails every decode
struct BrokenDecoder;

impl FieldDecoder for BrokenDecoder {
    fn decode(&self, can_id: u32, payload: &[u8]) -> Result<FieldMap, DecodeError> {
        Err(DecodeError::new(
            can_id,
            DecodeErrorKind::PayloadTooShort {
                expected: 8,
                actual: payload.len(),
            },
        ))
    }
}

fn dispatch_with(
    table: &DispatchTable,
    store: &RecordStore,
    can_id: u32,
    seed: i64,
    now: Timestamp,
) -> Outcome {
    let decoder = StubDecoder::new(fields_for(table, can_id, seed));
    table
        .dispatch(&decoder, store, can_id, &[0; 8], now)
        .unwrap()
}

/// Reset the fields a group owns, so only untouched fields remain
fn strip_object_group(mut object: TrackedObject, group: FieldGroup) -> TrackedObject {
    let blank = TrackedObject::default();
    match group {
        FieldGroup::ObjectKinematics => {
            object.class = blank.class;
            object.longitudinal_distance = blank.longitudinal_distance;
            object.lateral_distance = blank.lateral_distance;
            object.absolute_long_velocity = blank.absolute_long_velocity;
            object.absolute_lateral_velocity = blank.absolute_lateral_velocity;
            object.id = blank.id;
        }
        FieldGroup::ObjectMotion => object.motion_status = blank.motion_status,
        FieldGroup::ObjectAge => object.age = blank.age,
        other => panic!("{} is not an object group", other),
    }
    object.last_update = blank.last_update;
    object
}

fn strip_lane_group(mut lane: LaneBoundary, group: FieldGroup) -> LaneBoundary {
    let blank = LaneBoundary::default();
    match group {
        FieldGroup::LaneGeometry => {
            lane.classification = blank.classification;
            lane.quality = blank.quality;
            lane.c0 = blank.c0;
            lane.c2 = blank.c2;
        }
        FieldGroup::LaneCurvature => {
            lane.c1 = blank.c1;
            lane.c3 = blank.c3;
        }
        other => panic!("{} is not a lane group", other),
    }
    lane.last_update = blank.last_update;
    lane
}

#[test]
fn every_identifier_updates_exactly_its_fields() {
    let table = table();

    for can_id in table.identifiers() {
        let store = RecordStore::new();
        let outcome = dispatch_with(&table, &store, can_id, 7, at_ms(1_000));

        let Outcome::Applied { slot, group } = outcome else {
            panic!("0x{:X} was not applied", can_id);
        };
        let entry = table.get(can_id).unwrap();
        assert_eq!(slot, entry.slot());
        assert_eq!(group, entry.group());

        let mut snapshot = store.snapshot();
        match slot {
            SlotRef::Object(index) => {
                let object = snapshot.objects[index.get() - 1].clone();
                assert_eq!(object.last_update, at_ms(1_000));
                assert_ne!(object, TrackedObject::default());
                snapshot.objects[index.get() - 1] = strip_object_group(object, group);
            }
            SlotRef::Lane(side) => {
                let lane = snapshot.lane(side).clone();
                assert_eq!(lane.last_update, at_ms(1_000));
                let stripped = strip_lane_group(lane, group);
                match side {
                    LaneSide::Left => snapshot.left_lane = stripped,
                    LaneSide::Right => snapshot.right_lane = stripped,
                }
            }
        }

        assert_eq!(
            snapshot,
            Snapshot::default(),
            "0x{:X} touched fields outside its group",
            can_id
        );
    }
}

fn populated_store(table: &DispatchTable) -> RecordStore {
    let store = RecordStore::new();
    for (i, can_id) in table.identifiers().into_iter().enumerate() {
        dispatch_with(table, &store, can_id, i as i64 + 1, at_ms(500 + i as i64));
    }
    store
}

#[test]
fn decode_failure_leaves_store_unchanged() {
    let table = table();
    let store = populated_store(&table);
    let before = store.snapshot();

    for can_id in table.identifiers() {
        let err = table
            .dispatch(&BrokenDecoder, &store, can_id, &[0; 3], at_ms(9_000))
            .unwrap_err();
        assert_eq!(err.can_id(), can_id);
        assert!(matches!(err, DispatchError::Decode(_)));
    }

    assert_eq!(store.snapshot(), before);
}

#[test]
fn incomplete_decode_result_leaves_store_unchanged() {
    let table = table();
    let store = populated_store(&table);
    let before = store.snapshot();

    for can_id in table.identifiers() {
        let mut fields = fields_for(&table, can_id, 99);
        let last = table.get(can_id).unwrap().signal_names().last().unwrap().to_string();
        fields.remove(&last);

        let err = table
            .dispatch(&StubDecoder::new(fields), &store, can_id, &[0; 8], at_ms(9_000))
            .unwrap_err();
        match err {
            DispatchError::Decode(DecodeError {
                kind: DecodeErrorKind::MissingSignal(name),
                ..
            }) => assert_eq!(name, last),
            other => panic!("unexpected error {:?}", other),
        }
    }

    assert_eq!(store.snapshot(), before);
}

#[test]
fn reapplying_a_frame_is_idempotent() {
    let table = table();
    let once = RecordStore::new();
    let twice = RecordStore::new();

    for can_id in table.identifiers() {
        dispatch_with(&table, &once, can_id, 4, at_ms(2_000));
        dispatch_with(&table, &twice, can_id, 4, at_ms(2_000));
        dispatch_with(&table, &twice, can_id, 4, at_ms(2_500));
    }

    let mut once = once.snapshot();
    let twice = twice.snapshot();
    for object in &twice.objects {
        assert_eq!(object.last_update, at_ms(2_500));
    }
    assert_eq!(twice.left_lane.last_update, at_ms(2_500));

    for object in once.objects.iter_mut() {
        object.last_update = at_ms(2_500);
    }
    once.left_lane.last_update = at_ms(2_500);
    once.right_lane.last_update = at_ms(2_500);
    assert_eq!(once, twice);
}

#[test]
fn lane_halves_aggregate_field_by_field() {
    let table = table();
    let store = RecordStore::new();
    let threshold = Duration::milliseconds(1_000);

    dispatch_with(&table, &store, 614, 2, at_ms(10_000));
    let lane = store.snapshot().left_lane;
    assert!(is_fresh(lane.last_update, at_ms(10_100), threshold));
    assert_eq!(lane.c0, 2.5);
    assert_eq!(lane.c2, 2.5);
    assert_eq!(lane.c1, 0.0);
    assert_eq!(lane.c3, 0.0);
    assert_eq!(lane.quality, Category::from_code(3));

    dispatch_with(&table, &store, 615, 5, at_ms(10_050));
    let lane = store.snapshot().left_lane;
    assert_eq!(lane.c1, 5.5);
    assert_eq!(lane.c3, 5.5);
    assert_eq!(lane.c0, 2.5);
    assert_eq!(lane.c2, 2.5);
    assert_eq!(lane.classification, Category::named(2, "Class 2"));
    assert_eq!(lane.quality, Category::from_code(3));
    assert_eq!(lane.last_update, at_ms(10_050));
    assert_eq!(store.snapshot().right_lane, LaneBoundary::default());
}

#[test]
fn object_slot_assembles_in_any_order() {
    let table = table();
    let store = RecordStore::new();
    let base = 568 + 3 * 2;

    // age block, then class block, then motion block
    dispatch_with(&table, &store, base + 2, 12, at_ms(100));
    dispatch_with(&table, &store, base, 42, at_ms(110));
    dispatch_with(&table, &store, base + 1, 1, at_ms(120));

    let snapshot = store.snapshot();
    let object = snapshot.object(ObjectIndex::new(3).unwrap());
    assert_eq!(object.age, 12);
    assert_eq!(object.class, Category::named(42, "Class 42"));
    assert_eq!(object.id, 42);
    assert_eq!(object.longitudinal_distance, 42.5);
    assert_eq!(object.lateral_distance, 42.5);
    assert_eq!(object.absolute_long_velocity, 42.5);
    assert_eq!(object.absolute_lateral_velocity, 42.5);
    assert_eq!(object.motion_status, Category::from_name("moving-1"));
    assert_eq!(object.last_update, at_ms(120));

    let others: Vec<_> = snapshot.updated_objects().map(|(index, _)| index.get()).collect();
    assert_eq!(others, vec![3]);
}

#[test]
fn unknown_identifier_is_ignored_without_decoding() {
    let table = table();
    let store = populated_store(&table);
    let before = store.snapshot();
    let decoder = StubDecoder::new(FieldMap::new());

    for can_id in [0, 0x100, 567, 598, 613, 618, 0x1FFF_FFFF] {
        let outcome = table
            .dispatch(&decoder, &store, can_id, &[0xFF; 8], at_ms(50_000))
            .unwrap();
        assert_eq!(outcome, Outcome::Ignored);
    }

    assert_eq!(decoder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.snapshot(), before);
}
