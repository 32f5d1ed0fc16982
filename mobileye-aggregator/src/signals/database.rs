//! Signal catalog
//!
//! Message and signal definitions loaded once from the camera's DBC.
//! Implements the field-decoder capability used by the dispatch table.

use crate::message_decoder::{FieldDecoder, MessageDecoder};
use crate::types::{CatalogError, DecodeError, DecodeErrorKind, FieldMap};
use std::collections::HashMap;
use std::path::Path;

/// A complete CAN message definition
#[derive(Debug, Clone)]
pub struct MessageDefinition {
    /// CAN message ID
    pub id: u32,
    /// Message name
    pub name: String,
    /// Message size in bytes
    pub size: usize,
    /// Sender ECU name (optional)
    pub sender: Option<String>,
    /// All signals in this message
    pub signals: Vec<SignalDefinition>,
    /// True if this message has multiplexed signals
    pub is_multiplexed: bool,
    /// Multiplexer signal name (if multiplexed)
    pub multiplexer_signal: Option<String>,
    /// Source file (DBC filename)
    pub source: String,
}

/// A CAN signal definition
#[derive(Debug, Clone)]
pub struct SignalDefinition {
    /// Signal name
    pub name: String,
    /// Start bit in the CAN frame
    pub start_bit: u16,
    /// Length in bits
    pub length: u16,
    /// Byte order
    pub byte_order: ByteOrder,
    /// Value type (signed/unsigned)
    pub value_type: ValueType,
    /// Scale factor to convert raw value to physical value
    pub factor: f64,
    /// Offset to add after scaling
    pub offset: f64,
    /// Minimum physical value
    pub min: f64,
    /// Maximum physical value
    pub max: f64,
    /// Engineering unit (e.g., "m", "m/s", "rad")
    pub unit: Option<String>,
    /// Value table for enum-like values (raw_value -> description)
    pub value_table: Option<HashMap<i64, String>>,
    /// Multiplexer info (None if not multiplexed)
    pub multiplexer_info: Option<MultiplexerInfo>,
}

/// Byte order for signal extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian (Intel format)
    LittleEndian,
    /// Big-endian (Motorola format)
    BigEndian,
}

/// Value type for signal interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// Signed integer
    Signed,
    /// Unsigned integer
    Unsigned,
}

/// Multiplexer information for multiplexed signals
#[derive(Debug, Clone)]
pub struct MultiplexerInfo {
    /// Name of the multiplexer signal that controls this signal
    pub multiplexer_signal: String,
    /// Multiplexer value(s) for which this signal is active
    pub multiplexer_values: Vec<u64>,
}

/// The signal catalog
#[derive(Debug, Default)]
pub struct SignalDatabase {
    /// Message definitions by CAN ID. A later definition for the same ID
    /// replaces an earlier one.
    messages: HashMap<u32, MessageDefinition>,

    /// Signal name lookup: signal name -> CAN IDs carrying it
    signal_lookup: HashMap<String, Vec<u32>>,
}

impl SignalDatabase {
    /// Create a new empty signal database
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a DBC file and add its definitions to the database
    pub fn add_dbc(&mut self, path: &Path) -> Result<(), CatalogError> {
        log::info!("Loading DBC file: {:?}", path);

        let messages = crate::signals::dbc::parse_dbc_file(path)?;
        for message in messages {
            self.add_message(message);
        }

        let stats = self.stats();
        log::info!(
            "DBC file loaded: {} messages, {} signals",
            stats.num_messages,
            stats.num_signals
        );
        Ok(())
    }

    /// Add a message definition to the database
    pub fn add_message(&mut self, message: MessageDefinition) {
        let can_id = message.id;

        if let Some(previous) = self.messages.remove(&can_id) {
            log::warn!(
                "Message 0x{:X} '{}' from {} replaced by '{}' from {}",
                can_id,
                previous.name,
                previous.source,
                message.name,
                message.source
            );
            for signal in &previous.signals {
                if let Some(ids) = self.signal_lookup.get_mut(&signal.name) {
                    ids.retain(|id| *id != can_id);
                }
            }
        }

        for signal in &message.signals {
            self.signal_lookup
                .entry(signal.name.clone())
                .or_default()
                .push(can_id);
        }

        self.messages.insert(can_id, message);
    }

    /// Get the message definition for a CAN ID
    pub fn get_message(&self, can_id: u32) -> Option<&MessageDefinition> {
        self.messages.get(&can_id)
    }

    /// Find all messages containing a specific signal name
    pub fn find_signal(&self, signal_name: &str) -> Vec<(u32, &SignalDefinition)> {
        self.signal_lookup
            .get(signal_name)
            .map(|ids| {
                ids.iter()
                    .filter_map(|can_id| {
                        self.get_message(*can_id)
                            .and_then(|msg| msg.signals.iter().find(|s| s.name == signal_name))
                            .map(|sig| (*can_id, sig))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// True if message `can_id` defines `signal_name`
    pub fn message_has_signal(&self, can_id: u32, signal_name: &str) -> bool {
        self.get_message(can_id)
            .map(|msg| msg.signals.iter().any(|s| s.name == signal_name))
            .unwrap_or(false)
    }

    /// Get database statistics
    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            num_messages: self.messages.len(),
            num_signals: self.messages.values().map(|msg| msg.signals.len()).sum(),
        }
    }

    /// Get all unique CAN IDs in the database
    pub fn get_all_can_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.messages.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl FieldDecoder for SignalDatabase {
    fn decode(&self, can_id: u32, payload: &[u8]) -> Result<FieldMap, DecodeError> {
        let message = self
            .get_message(can_id)
            .ok_or_else(|| DecodeError::new(can_id, DecodeErrorKind::UnknownMessage))?;
        MessageDecoder::decode_fields(payload, message)
    }
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Total number of message definitions
    pub num_messages: usize,
    /// Total number of signal definitions
    pub num_signals: usize,
}
