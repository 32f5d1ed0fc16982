//! Core types for the Mobileye aggregator library
//!
//! This module defines the frame and value types that flow between the frame
//! source, the signal catalog and the dispatch table, plus the error taxonomy
//! of the decode-dispatch-aggregate path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Timestamp type used throughout the aggregator.
///
/// The Unix epoch (`Timestamp::default()`) doubles as the "never updated"
/// marker for record slots.
pub type Timestamp = DateTime<Utc>;

/// Result type for library entry points
pub type Result<T> = std::result::Result<T, AggregatorError>;

/// Decoded signal values of one frame, keyed by signal name
pub type FieldMap = HashMap<String, SignalValue>;

/// Raw CAN frame as delivered by a frame source
#[derive(Debug, Clone, PartialEq)]
pub struct CanFrame {
    /// Timestamp in nanoseconds since epoch (0 when the source has none)
    pub timestamp_ns: u64,
    /// CAN channel number (e.g., 0, 1, 2...)
    pub channel: u8,
    /// CAN message ID (11-bit or 29-bit)
    pub can_id: u32,
    /// Frame data bytes (0-8 bytes for classic CAN)
    pub data: Vec<u8>,
    /// True if this is an extended (29-bit) CAN ID
    pub is_extended: bool,
}

impl CanFrame {
    /// Create a standard-id frame on channel 0 without a timestamp
    pub fn new(can_id: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp_ns: 0,
            channel: 0,
            can_id,
            data: data.into(),
            is_extended: can_id > 0x7FF,
        }
    }

    /// Builder method: attach a capture timestamp
    pub fn with_timestamp_ns(mut self, timestamp_ns: u64) -> Self {
        self.timestamp_ns = timestamp_ns;
        self
    }

    /// Builder method: set the channel number
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    /// Convert timestamp from nanoseconds to DateTime<Utc>
    pub fn timestamp(&self) -> Timestamp {
        let secs = (self.timestamp_ns / 1_000_000_000) as i64;
        let nsecs = (self.timestamp_ns % 1_000_000_000) as u32;
        DateTime::from_timestamp(secs, nsecs).unwrap_or_default()
    }

    /// Get the data length code (DLC) - number of data bytes
    pub fn dlc(&self) -> usize {
        self.data.len()
    }
}

/// Signal value types produced by the field decoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalValue {
    /// Signed integer value
    Integer(i64),
    /// Floating-point value (after scaling/offset)
    Float(f64),
    /// Boolean value (single unscaled bit)
    Boolean(bool),
    /// Free text value
    Text(String),
    /// Raw value with its value-table description (e.g. 0 = "Very Low Quality")
    Named { name: String, raw: i64 },
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Integer(v) => write!(f, "{}", v),
            SignalValue::Float(v) => write!(f, "{:.3}", v),
            SignalValue::Boolean(v) => write!(f, "{}", if *v { "true" } else { "false" }),
            SignalValue::Text(v) => write!(f, "{}", v),
            SignalValue::Named { name, .. } => write!(f, "{}", name),
        }
    }
}

impl SignalValue {
    /// Numeric view of the value; text has none
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SignalValue::Integer(v) => Some(*v as f64),
            SignalValue::Float(v) => Some(*v),
            SignalValue::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            SignalValue::Named { raw, .. } => Some(*raw as f64),
            SignalValue::Text(v) => v.trim().parse().ok(),
        }
    }

    /// Convert signal value to i64 if possible
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SignalValue::Integer(v) => Some(*v),
            SignalValue::Float(v) => Some(*v as i64),
            SignalValue::Boolean(v) => Some(if *v { 1 } else { 0 }),
            SignalValue::Named { raw, .. } => Some(*raw),
            SignalValue::Text(v) => v.trim().parse().ok(),
        }
    }

    /// Check if this is a boolean value
    pub fn as_bool(&self) -> bool {
        match self {
            SignalValue::Boolean(v) => *v,
            SignalValue::Integer(v) => *v != 0,
            SignalValue::Float(v) => *v != 0.0,
            SignalValue::Named { raw, .. } => *raw != 0,
            SignalValue::Text(v) => !v.is_empty(),
        }
    }
}

/// Normalized enumerated field (object class, motion status, lane
/// classification and quality).
///
/// Upstream schemas deliver these as raw codes, as free text, or as a code
/// with its value-table name. All three land here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Numeric code, when the encoding carried one
    pub code: Option<i64>,
    /// Symbolic name, when the encoding carried one
    pub name: Option<String>,
}

impl Category {
    /// A category known only by its numeric code
    pub fn from_code(code: i64) -> Self {
        Self {
            code: Some(code),
            name: None,
        }
    }

    /// A category known only by its name
    pub fn from_name(name: impl Into<String>) -> Self {
        Self {
            code: None,
            name: Some(name.into()),
        }
    }

    /// A category carrying both a code and its symbolic name
    pub fn named(code: i64, name: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            name: Some(name.into()),
        }
    }

    /// Normalize a decoded value. Floats are truncated to their code;
    /// a non-finite float yields `None`.
    pub fn from_value(value: &SignalValue) -> Option<Self> {
        match value {
            SignalValue::Named { name, raw } => Some(Self::named(*raw, name.clone())),
            SignalValue::Integer(v) => Some(Self::from_code(*v)),
            SignalValue::Float(v) if v.is_finite() => Some(Self::from_code(*v as i64)),
            SignalValue::Boolean(v) => Some(Self::from_code(i64::from(*v))),
            SignalValue::Text(v) => Some(Self::from_name(v.clone())),
            SignalValue::Float(_) => None,
        }
    }

    /// True when nothing has been received for this field
    pub fn is_unknown(&self) -> bool {
        self.code.is_none() && self.name.is_none()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, self.code) {
            (Some(name), _) => write!(f, "{}", name),
            (None, Some(code)) => write!(f, "{}", code),
            (None, None) => write!(f, "unknown"),
        }
    }
}

/// Why a frame payload did not match its schema
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeErrorKind {
    #[error("no message definition in catalog")]
    UnknownMessage,

    #[error("payload has {actual} bytes, schema expects {expected}")]
    PayloadTooShort { expected: usize, actual: usize },

    #[error("signal '{0}' missing from decoded fields")]
    MissingSignal(String),

    #[error("signal '{signal}' has incompatible value {value}")]
    IncompatibleValue { signal: String, value: String },
}

/// A frame payload that could not be decoded. Always local to one frame.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Failed to decode CAN ID 0x{can_id:X}: {kind}")]
pub struct DecodeError {
    /// Identifier of the rejected frame
    pub can_id: u32,
    /// What went wrong
    pub kind: DecodeErrorKind,
}

impl DecodeError {
    pub fn new(can_id: u32, kind: DecodeErrorKind) -> Self {
        Self { can_id, kind }
    }
}

/// Errors reported by a single dispatch. Neither is fatal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Record store busy, dropped frame 0x{can_id:X}")]
    StoreContention { can_id: u32 },
}

impl DispatchError {
    /// Identifier of the frame this error belongs to
    pub fn can_id(&self) -> u32 {
        match self {
            DispatchError::Decode(e) => e.can_id,
            DispatchError::StoreContention { can_id } => *can_id,
        }
    }
}

/// Dispatch table construction failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("Duplicate dispatch entry for CAN ID 0x{0:X}")]
    DuplicateIdentifier(u32),

    #[error("Tracked object index {0} outside 1..=10")]
    SlotOutOfRange(usize),

    #[error("Identifier layout overflows at base 0x{0:X}")]
    LayoutOverflow(u32),
}

/// Signal catalog (DBC) loading failures
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read DBC file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse DBC file: {0}")]
    Parse(String),

    #[error("Invalid signal definition: {0}")]
    InvalidSignalDefinition(String),
}

/// Frame source failures
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Frame source I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed log line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Umbrella error for library entry points
#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_value_conversions() {
        let int_val = SignalValue::Integer(42);
        assert_eq!(int_val.as_f64(), Some(42.0));
        assert_eq!(int_val.as_i64(), Some(42));
        assert!(int_val.as_bool());

        let float_val = SignalValue::Float(3.75);
        assert_eq!(float_val.as_f64(), Some(3.75));
        assert_eq!(float_val.as_i64(), Some(3));

        let named = SignalValue::Named {
            name: "Moving".to_string(),
            raw: 2,
        };
        assert_eq!(named.as_i64(), Some(2));

        assert_eq!(SignalValue::Text("moving".into()).as_f64(), None);
    }

    #[test]
    fn test_signal_value_display() {
        assert_eq!(format!("{}", SignalValue::Integer(42)), "42");
        assert_eq!(format!("{}", SignalValue::Float(3.14159)), "3.142");
        assert_eq!(format!("{}", SignalValue::Boolean(true)), "true");
        assert_eq!(
            format!(
                "{}",
                SignalValue::Named {
                    name: "Very Low Quality".into(),
                    raw: 0
                }
            ),
            "Very Low Quality"
        );
    }

    #[test]
    fn test_category_normalization() {
        let named = Category::from_value(&SignalValue::Named {
            name: "Stationary".into(),
            raw: 1,
        });
        assert_eq!(named, Some(Category::named(1, "Stationary")));
        assert_eq!(
            Category::from_value(&SignalValue::Float(2.0)),
            Some(Category::from_code(2))
        );
        assert_eq!(Category::from_value(&SignalValue::Float(f64::NAN)), None);
        assert!(Category::default().is_unknown());
        assert_eq!(Category::default().to_string(), "unknown");
        assert_eq!(Category::from_code(3).to_string(), "3");
    }

    #[test]
    fn test_frame_timestamp() {
        let frame = CanFrame::new(0x238, vec![0; 8]).with_timestamp_ns(1_500_000_000);
        assert_eq!(frame.timestamp().timestamp_millis(), 1500);
        assert_eq!(frame.dlc(), 8);
        assert!(!frame.is_extended);
        assert_eq!(CanFrame::new(0x1234, vec![]).timestamp(), Timestamp::default());
    }
}
