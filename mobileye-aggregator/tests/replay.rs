// End-to-end replay: real DBC catalog, candump log, freshness at read time.

use chrono::Duration;
use mobileye_aggregator::{
    Aggregator, AggregatorConfig, CandumpSource, CanFrame, Category, ChannelSource, Clock,
    LaneSide, ObjectIndex, RunStats,
};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use tempfile::NamedTempFile;

const CAMERA_DBC: &str = r#"
VERSION ""

NS_ :
    NS_DESC_
    CM_
    BA_DEF_
    BA_
    VAL_
    CAT_DEF_
    CAT_
    FILTER
    BA_DEF_DEF_
    EV_DATA_
    ENVVAR_DATA_
    SGTYPE_
    SGTYPE_VAL_
    BA_DEF_SGTYPE_
    BA_SGTYPE_
    SIG_TYPE_REF_
    VAL_TABLE_
    SIG_GROUP_
    SIG_VALTYPE_
    SIGTYPE_VALTYPE_
    BO_TX_BU_
    BA_DEF_REL_
    BA_REL_
    BA_SGTYPE_REL_
    SG_MUL_VAL_

BS_:

BU_: Mobileye Host

BO_ 574 Obstacle_3_A: 8 Mobileye
 SG_ Object_Class_3_A : 0|8@1+ (1,0) [0|7] "" Host
 SG_ ID_3_A : 8|8@1+ (1,0) [0|255] "" Host
 SG_ Longitudinal_Distance_3_A : 16|16@1+ (0.1,0) [0|6553.5] "m" Host
 SG_ Lateral_Distance_3_A : 32|16@1- (0.01,0) [-327.68|327.67] "m" Host
 SG_ Absolute_Long_Velocity_3_A : 48|8@1- (0.5,0) [-64|63.5] "m/s" Host
 SG_ Absolute_Lateral_Velocity_3_A : 56|8@1- (0.25,0) [-32|31.75] "m/s" Host

BO_ 575 Obstacle_3_B: 8 Mobileye
 SG_ Motion_Status_3_B : 0|8@1+ (1,0) [0|4] "" Host

BO_ 576 Obstacle_3_C: 8 Mobileye
 SG_ Object_Age_3_C : 0|16@1+ (1,0) [0|65535] "" Host

BO_ 614 Lane_Lh_A: 8 Mobileye
 SG_ Classification_Lh_ME : 0|4@1+ (1,0) [0|15] "" Host
 SG_ Quality_Lh_ME : 4|2@1+ (1,0) [0|3] "" Host
 SG_ LaneMarkPosition_C0_Lh_ME : 8|16@1- (0.01,0) [-327.68|327.67] "m" Host
 SG_ LaneMarkModelA_C2_Lh_ME : 24|16@1- (0.000001,0) [-0.032768|0.032767] "1/m" Host

BO_ 615 Lane_Lh_B: 8 Mobileye
 SG_ LaneMarkHeadingAngle_C1_Lh_ME : 0|16@1- (0.0001,0) [-3.2768|3.2767] "rad" Host
 SG_ LaneMarkModelDerivA_C3_Lh_ME : 16|16@1- (0.00001,0) [-0.32768|0.32767] "1/m2" Host

BO_ 616 Lane_Rh_A: 8 Mobileye
 SG_ Classification_Rh_ME : 0|4@1+ (1,0) [0|15] "" Host
 SG_ Quality_Rh_ME : 4|2@1+ (1,0) [0|3] "" Host
 SG_ LaneMarkPosition_C0_Rh_ME : 8|16@1- (0.01,0) [-327.68|327.67] "m" Host
 SG_ LaneMarkModelA_C2_Rh_ME : 24|16@1- (0.000001,0) [-0.032768|0.032767] "1/m" Host

VAL_ 574 Object_Class_3_A 0 "Car" 1 "Truck" 2 "Bike" 3 "Pedestrian" ;
VAL_ 575 Motion_Status_3_B 0 "Undefined" 1 "Standing" 2 "Stopped" 3 "Moving" 4 "Oncoming" ;
VAL_ 614 Quality_Lh_ME 3 "High Quality" 2 "Medium Quality" 1 "Low Quality" 0 "Very Low Quality" ;
VAL_ 616 Quality_Rh_ME 3 "High Quality" 2 "Medium Quality" 1 "Low Quality" 0 "Very Low Quality" ;
"#;

// Object 3 arrives age block first, then class block, then motion block.
const CAPTURE: &str = "\
(1700000000.000000) vcan0 240#2301000000000000
(1700000000.010000) vcan0 23E#012AF4016AFFFC02
(1700000000.020000) vcan0 2BC#0102030405060708
(1700000000.030000) vcan0 23F#0300000000000000
(1700000000.040000) vcan0 garbage
(1700000000.050000) vcan0 266#314CFFDC05000000
(1700000000.060000) vcan0 267#6400FBFF00000000
(1700000000.070000) vcan0 268#014CFFDC05000000
(1700000000.080000) vcan0 238#0000000000000000
(1700000000.090000) vcan0 23A#0000
";

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}

fn replay() -> (Aggregator, RunStats) {
    let dbc = write_temp(CAMERA_DBC);
    let capture = write_temp(CAPTURE);

    let aggregator = Aggregator::from_dbc(dbc.path(), AggregatorConfig::new()).unwrap();
    let mut source = CandumpSource::open(capture.path()).unwrap();
    let stop = AtomicBool::new(false);
    let stats = aggregator
        .run(&mut source, &stop, Clock::FrameTimestamp)
        .unwrap();
    (aggregator, stats)
}

#[test]
fn replay_counts_every_outcome() {
    let (_, stats) = replay();
    assert_eq!(stats.frames, 9);
    assert_eq!(stats.applied, 6);
    assert_eq!(stats.ignored, 1);
    // 0x238 and 0x23A are dispatched but have no DBC message
    assert_eq!(stats.decode_errors, 2);
    assert_eq!(stats.source_errors, 1);
    assert_eq!(stats.contention_drops, 0);
    assert_eq!(stats.unstamped, 0);
}

#[test]
fn replay_assembles_object_out_of_order() {
    let (aggregator, _) = replay();
    let snapshot = aggregator.snapshot();

    let object = snapshot.object(ObjectIndex::new(3).unwrap());
    assert_eq!(object.class, Category::named(1, "Truck"));
    assert_eq!(object.id, 42);
    assert_close(object.longitudinal_distance, 50.0);
    assert_close(object.lateral_distance, -1.5);
    assert_close(object.absolute_long_velocity, -2.0);
    assert_close(object.absolute_lateral_velocity, 0.5);
    assert_eq!(object.motion_status, Category::named(3, "Moving"));
    assert_eq!(object.age, 291);
    assert_eq!(object.last_update.timestamp_millis(), 1_700_000_000_030);

    let updated: Vec<usize> = snapshot
        .updated_objects()
        .map(|(index, _)| index.get())
        .collect();
    assert_eq!(updated, vec![3]);
}

#[test]
fn replay_merges_lane_halves() {
    let (aggregator, _) = replay();
    let lane = aggregator.snapshot().left_lane;

    assert_eq!(lane.classification, Category::from_code(1));
    assert_eq!(lane.quality, Category::named(3, "High Quality"));
    assert_close(lane.c0, -1.8);
    assert_close(lane.c1, 0.01);
    assert_close(lane.c2, 0.0015);
    assert_close(lane.c3, -0.00005);
    assert_eq!(lane.last_update.timestamp_millis(), 1_700_000_000_060);

    let points = lane.sample(100.0, 100);
    assert_eq!(points.len(), 100);
    assert_close(points[0].1, -1.8);
}

#[test]
fn freshness_gates_at_read_time() {
    let (aggregator, _) = replay();
    let snapshot = aggregator.snapshot();
    let policy = aggregator.freshness_policy();
    let capture_end = snapshot.left_lane.last_update;

    let now = capture_end + Duration::milliseconds(500);
    let fresh: Vec<usize> = policy
        .fresh_objects(&snapshot, now)
        .map(|(index, _)| index.get())
        .collect();
    assert_eq!(fresh, vec![3]);

    // Right lane is fresh but reports the lowest quality
    assert!(snapshot.right_lane.has_update());
    let usable: Vec<LaneSide> = policy.usable_lanes(&snapshot, now).map(|(side, _)| side).collect();
    assert_eq!(usable, vec![LaneSide::Left]);

    let later = capture_end + Duration::seconds(2);
    assert_eq!(policy.fresh_objects(&snapshot, later).count(), 0);
    assert_eq!(policy.usable_lanes(&snapshot, later).count(), 0);

    // Stale data stays inspectable
    assert_eq!(aggregator.snapshot(), snapshot);
}

#[test]
fn catalog_coverage_reports_missing_signals() {
    let dbc = write_temp(CAMERA_DBC);
    let aggregator = Aggregator::from_dbc(dbc.path(), AggregatorConfig::new()).unwrap();

    // 9 objects x 8 signals plus the right lane's curvature pair
    assert_eq!(aggregator.check_catalog_coverage(), 9 * 8 + 2);
}

#[test]
fn stop_flag_ends_live_loop() {
    let dbc = write_temp(CAMERA_DBC);
    let config = AggregatorConfig::new().with_receive_timeout_ms(10);
    let aggregator = Aggregator::from_dbc(dbc.path(), config).unwrap();
    let store = aggregator.store();

    let (tx, rx) = mpsc::channel();
    let stop = AtomicBool::new(false);

    let stats = std::thread::scope(|scope| {
        let worker = scope.spawn(|| {
            let mut source = ChannelSource::new(rx);
            aggregator.run(&mut source, &stop, Clock::Wall).unwrap()
        });

        tx.send(CanFrame::new(0x240, vec![0x05, 0, 0, 0, 0, 0, 0, 0]))
            .unwrap();
        while !store.snapshot().objects[2].has_update() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        stop.store(true, Ordering::Relaxed);
        worker.join().unwrap()
    });

    assert_eq!(stats.applied, 1);
    assert_eq!(store.snapshot().objects[2].age, 5);
    // Sender still alive: the loop ended on the flag, not on exhaustion
    drop(tx);
}
