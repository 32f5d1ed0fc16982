//! Message Decoding Engine
//!
//! Extracts signal values from raw CAN payloads based on signal definitions
//! from the signal catalog. Handles bit extraction, endianness, multiplexing,
//! value tables and physical value conversion.

use crate::signals::database::{ByteOrder, MessageDefinition, SignalDefinition, ValueType};
use crate::types::{DecodeError, DecodeErrorKind, FieldMap, SignalValue};

/// Turns a frame payload into named field values.
///
/// Implementations must be pure with respect to the record store: a failed
/// decode has no side effects.
pub trait FieldDecoder: Send + Sync {
    /// Decode `payload` of frame `can_id`, failing on schema mismatch
    fn decode(&self, can_id: u32, payload: &[u8]) -> Result<FieldMap, DecodeError>;
}

/// Message decoder - extracts signals from CAN payloads
pub struct MessageDecoder;

impl MessageDecoder {
    /// Decode a payload into a field map.
    ///
    /// The payload must be at least as long as the message size declared in
    /// the catalog; extra trailing bytes are ignored. Multiplexed signals are
    /// only emitted when their multiplexer value is active.
    pub fn decode_fields(
        payload: &[u8],
        message_def: &MessageDefinition,
    ) -> Result<FieldMap, DecodeError> {
        if payload.len() < message_def.size {
            return Err(DecodeError::new(
                message_def.id,
                DecodeErrorKind::PayloadTooShort {
                    expected: message_def.size,
                    actual: payload.len(),
                },
            ));
        }

        let mut multiplexer_value: Option<u64> = None;

        // For multiplexed messages, first extract the multiplexer signal value
        if message_def.is_multiplexed {
            if let Some(ref mux_signal_name) = message_def.multiplexer_signal {
                if let Some(mux_signal) =
                    message_def.signals.iter().find(|s| s.name == *mux_signal_name)
                {
                    let raw = Self::extract_signal_value(payload, mux_signal)
                        .ok_or_else(|| Self::short_payload(message_def, mux_signal, payload))?;
                    multiplexer_value = Some(raw as u64);
                }
            }
        }

        let mut fields = FieldMap::with_capacity(message_def.signals.len());

        for signal in &message_def.signals {
            if let Some(ref mux_info) = signal.multiplexer_info {
                match multiplexer_value {
                    Some(current) if mux_info.multiplexer_values.contains(&current) => {}
                    _ => continue,
                }
            }

            let raw_value = Self::extract_signal_value(payload, signal)
                .ok_or_else(|| Self::short_payload(message_def, signal, payload))?;
            fields.insert(signal.name.clone(), Self::physical_value(signal, raw_value));
        }

        Ok(fields)
    }

    fn short_payload(
        message_def: &MessageDefinition,
        signal: &SignalDefinition,
        payload: &[u8],
    ) -> DecodeError {
        log::warn!(
            "Signal '{}' does not fit in {} byte payload of 0x{:X}",
            signal.name,
            payload.len(),
            message_def.id
        );
        DecodeError::new(
            message_def.id,
            DecodeErrorKind::PayloadTooShort {
                expected: Self::required_bytes(signal),
                actual: payload.len(),
            },
        )
    }

    /// Convert a raw value into its decoded representation
    fn physical_value(signal: &SignalDefinition, raw_value: i64) -> SignalValue {
        if let Some(name) = signal
            .value_table
            .as_ref()
            .and_then(|table| table.get(&raw_value))
        {
            return SignalValue::Named {
                name: name.clone(),
                raw: raw_value,
            };
        }

        if signal.factor == 1.0 && signal.offset == 0.0 && signal.length == 1 {
            // Boolean signal (single bit, no scaling)
            SignalValue::Boolean(raw_value != 0)
        } else if signal.factor != 1.0 || signal.offset != 0.0 {
            SignalValue::Float(signal.offset + signal.factor * (raw_value as f64))
        } else {
            SignalValue::Integer(raw_value)
        }
    }

    /// Number of payload bytes a signal touches
    fn required_bytes(signal: &SignalDefinition) -> usize {
        let start_bit = signal.start_bit as usize;
        let length = signal.length as usize;
        match signal.byte_order {
            ByteOrder::LittleEndian => (start_bit + length).div_ceil(8),
            ByteOrder::BigEndian => {
                // The MSB sits in byte start_bit / 8; the rest spills forward
                let msb_pos = 7 - (start_bit % 8);
                start_bit / 8 + (msb_pos + length).div_ceil(8)
            }
        }
    }

    /// Extract raw signal value from payload data, `None` if it does not fit
    fn extract_signal_value(data: &[u8], signal: &SignalDefinition) -> Option<i64> {
        let length = signal.length as usize;
        if length == 0 || length > 64 || Self::required_bytes(signal) > data.len() {
            return None;
        }

        let start_bit = signal.start_bit as usize;
        let raw_value = match signal.byte_order {
            ByteOrder::LittleEndian => Self::extract_little_endian(data, start_bit, length),
            ByteOrder::BigEndian => Self::extract_big_endian(data, start_bit, length),
        };

        let signed_value = match signal.value_type {
            ValueType::Unsigned => raw_value as i64,
            ValueType::Signed => Self::sign_extend(raw_value, length),
        };

        Some(signed_value)
    }

    /// Extract signal with little-endian (Intel) byte order
    ///
    /// Start bit points to the LSB; bits are numbered LSB-first within each
    /// byte and byte 0 comes first.
    fn extract_little_endian(data: &[u8], start_bit: usize, length: usize) -> u64 {
        let mut result: u64 = 0;

        for i in 0..length {
            let bit_pos = start_bit + i;
            let byte_idx = bit_pos / 8;
            let bit_in_byte = bit_pos % 8;

            if byte_idx < data.len() {
                let bit_value = (data[byte_idx] >> bit_in_byte) & 0x01;
                result |= (bit_value as u64) << i;
            }
        }

        result
    }

    /// Extract signal with big-endian (Motorola) byte order
    ///
    /// DBC numbering: start bit is the signal's MSB, given as
    /// `byte * 8 + bit` with bit 0 the LSB of the byte. Walking towards the
    /// LSB moves down within a byte, then to bit 7 of the next byte.
    fn extract_big_endian(data: &[u8], start_bit: usize, length: usize) -> u64 {
        let mut result: u64 = 0;
        let mut bit_pos = start_bit;

        for _ in 0..length {
            let byte_idx = bit_pos / 8;
            let bit_in_byte = bit_pos % 8;

            let bit_value = data.get(byte_idx).map(|b| (b >> bit_in_byte) & 0x01).unwrap_or(0);
            result = (result << 1) | bit_value as u64;

            bit_pos = if bit_in_byte == 0 { bit_pos + 15 } else { bit_pos - 1 };
        }

        result
    }

    /// Sign-extend a value from N bits to 64 bits
    ///
    /// If the value's MSB is 1, fill the upper bits with 1s.
    fn sign_extend(value: u64, bit_length: usize) -> i64 {
        if bit_length >= 64 {
            return value as i64;
        }

        let sign_bit = 1u64 << (bit_length - 1);
        if (value & sign_bit) != 0 {
            let mask = !0u64 << bit_length;
            (value | mask) as i64
        } else {
            value as i64
        }
    }
}
