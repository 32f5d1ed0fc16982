//! Aggregator configuration types
//!
//! The identifier layout and the signal-name templates are data. Changing the
//! camera's CAN ids or DBC naming never requires touching dispatch code.

use crate::records::LaneSide;
use serde::{Deserialize, Serialize};

/// Default freshness threshold in milliseconds
pub const DEFAULT_FRESHNESS_THRESHOLD_MS: u64 = 1000;

/// Configuration for the aggregator library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Maximum age of a slot's last frame for it to count as fresh
    #[serde(default = "default_freshness_threshold")]
    pub freshness_threshold_ms: u64,

    /// How long one frame-source receive may block
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout_ms: u64,

    /// Bounded wait for the record store write lock
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_ms: u64,

    /// CAN identifiers of the object and lane frames
    #[serde(default)]
    pub layout: IdentifierLayout,

    /// Signal names expected in the DBC
    #[serde(default)]
    pub signals: SignalNames,

    /// Optional: only process frames from these CAN channels
    #[serde(default)]
    pub channel_filter: Option<Vec<u8>>,
}

fn default_freshness_threshold() -> u64 {
    DEFAULT_FRESHNESS_THRESHOLD_MS
}

fn default_receive_timeout() -> u64 {
    1000
}

fn default_lock_timeout() -> u64 {
    50
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            freshness_threshold_ms: default_freshness_threshold(),
            receive_timeout_ms: default_receive_timeout(),
            lock_timeout_ms: default_lock_timeout(),
            layout: IdentifierLayout::default(),
            signals: SignalNames::default(),
            channel_filter: None,
        }
    }
}

/// Identifier pair carrying one lane boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneIds {
    /// Classification, quality, c0 and c2
    pub geometry: u32,
    /// c1 and c3
    pub curvature: u32,
}

/// Where the camera's frames sit in the identifier space.
///
/// Tracked object `k` uses `object_base + 3*(k-1) + {0, 1, 2}` for its
/// kinematics, motion-status and age frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierLayout {
    #[serde(default = "default_object_base")]
    pub object_base: u32,
    #[serde(default = "default_left_lane")]
    pub left_lane: LaneIds,
    #[serde(default = "default_right_lane")]
    pub right_lane: LaneIds,
}

fn default_object_base() -> u32 {
    0x238
}

fn default_left_lane() -> LaneIds {
    LaneIds {
        geometry: 0x266,
        curvature: 0x267,
    }
}

fn default_right_lane() -> LaneIds {
    LaneIds {
        geometry: 0x268,
        curvature: 0x269,
    }
}

impl Default for IdentifierLayout {
    fn default() -> Self {
        Self {
            object_base: default_object_base(),
            left_lane: default_left_lane(),
            right_lane: default_right_lane(),
        }
    }
}

impl IdentifierLayout {
    pub fn lane(&self, side: LaneSide) -> LaneIds {
        match side {
            LaneSide::Left => self.left_lane,
            LaneSide::Right => self.right_lane,
        }
    }
}

/// Signal name templates.
///
/// `{k}` is replaced by the tracked-object index (1..=10), `{s}` by the lane
/// suffix (`Lh` / `Rh`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalNames {
    pub object_class: String,
    pub longitudinal_distance: String,
    pub lateral_distance: String,
    pub absolute_long_velocity: String,
    pub absolute_lateral_velocity: String,
    pub object_id: String,
    pub motion_status: String,
    pub object_age: String,
    pub lane_classification: String,
    pub lane_quality: String,
    pub lane_c0: String,
    pub lane_c1: String,
    pub lane_c2: String,
    pub lane_c3: String,
}

impl Default for SignalNames {
    fn default() -> Self {
        Self {
            object_class: "Object_Class_{k}_A".into(),
            longitudinal_distance: "Longitudinal_Distance_{k}_A".into(),
            lateral_distance: "Lateral_Distance_{k}_A".into(),
            absolute_long_velocity: "Absolute_Long_Velocity_{k}_A".into(),
            absolute_lateral_velocity: "Absolute_Lateral_Velocity_{k}_A".into(),
            object_id: "ID_{k}_A".into(),
            motion_status: "Motion_Status_{k}_B".into(),
            object_age: "Object_Age_{k}_C".into(),
            lane_classification: "Classification_{s}_ME".into(),
            lane_quality: "Quality_{s}_ME".into(),
            lane_c0: "LaneMarkPosition_C0_{s}_ME".into(),
            lane_c1: "LaneMarkHeadingAngle_C1_{s}_ME".into(),
            lane_c2: "LaneMarkModelA_C2_{s}_ME".into(),
            lane_c3: "LaneMarkModelDerivA_C3_{s}_ME".into(),
        }
    }
}

/// Expand an object template for index `k`
pub(crate) fn object_signal(template: &str, k: usize) -> String {
    template.replace("{k}", &k.to_string())
}

/// Expand a lane template for `side`
pub(crate) fn lane_signal(template: &str, side: LaneSide) -> String {
    template.replace("{s}", side.signal_suffix())
}

impl AggregatorConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the freshness threshold
    pub fn with_freshness_threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.freshness_threshold_ms = threshold_ms;
        self
    }

    /// Builder method: set the frame-source receive timeout
    pub fn with_receive_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.receive_timeout_ms = timeout_ms;
        self
    }

    /// Builder method: set the store lock wait
    pub fn with_lock_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.lock_timeout_ms = timeout_ms;
        self
    }

    /// Builder method: replace the identifier layout
    pub fn with_layout(mut self, layout: IdentifierLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Builder method: replace the signal name templates
    pub fn with_signals(mut self, signals: SignalNames) -> Self {
        self.signals = signals;
        self
    }

    /// Builder method: set channel filter
    pub fn with_channel_filter(mut self, channels: Vec<u8>) -> Self {
        self.channel_filter = Some(channels);
        self
    }

    /// Check if a channel should be processed
    pub fn should_process_channel(&self, channel: u8) -> bool {
        match &self.channel_filter {
            Some(channels) => channels.contains(&channel),
            None => true,
        }
    }

    pub fn freshness_threshold(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.freshness_threshold_ms.min(i64::MAX as u64) as i64)
    }

    pub fn receive_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lock_timeout_ms)
    }
}
