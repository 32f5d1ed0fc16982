//! candump log replay
//!
//! Reads the text logs written by `candump -l` (SocketCAN can-utils):
//!
//! ```text
//! (1700000000.123456) vcan0 238#0011223344556677
//! (1700000000.124001) can1 18FEF100#11223344
//! ```
//!
//! Eight hex digits in the identifier mark an extended (29-bit) frame.
//! Remote frames (`#R`) carry no payload and are skipped. CAN FD lines
//! (`##<flags><data>`) are accepted. A malformed line is reported with its
//! line number and reading continues with the next one.

use crate::source::FrameSource;
use crate::types::{CanFrame, SourceError};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

/// Frame source over a candump log
pub struct CandumpSource<R> {
    reader: R,
    line_number: usize,
    exhausted: bool,
    buffer: Vec<u8>,
}

impl CandumpSource<BufReader<File>> {
    /// Open a candump log file
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        log::info!("Opening candump log: {:?}", path);
        let file = File::open(path)?;
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> CandumpSource<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            exhausted: false,
            buffer: Vec::new(),
        }
    }

    /// Line number of the most recently read line (1-based)
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    fn next_frame(&mut self) -> Result<Option<CanFrame>, SourceError> {
        loop {
            self.buffer.clear();
            if self.reader.read_until(b'\n', &mut self.buffer)? == 0 {
                if !self.exhausted {
                    log::debug!("candump log exhausted after {} lines", self.line_number);
                }
                self.exhausted = true;
                return Ok(None);
            }
            self.line_number += 1;

            let line = match std::str::from_utf8(&self.buffer) {
                Ok(text) => text.trim(),
                Err(e) => {
                    return Err(SourceError::Parse {
                        line: self.line_number,
                        reason: format!("line is not valid UTF-8: {}", e),
                    })
                }
            };
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match parse_line(line) {
                Ok(Some(frame)) => return Ok(Some(frame)),
                Ok(None) => continue,
                Err(reason) => {
                    return Err(SourceError::Parse {
                        line: self.line_number,
                        reason,
                    })
                }
            }
        }
    }
}

impl<R: BufRead> FrameSource for CandumpSource<R> {
    fn receive(&mut self, _timeout: Duration) -> Result<Option<CanFrame>, SourceError> {
        if self.exhausted {
            return Ok(None);
        }
        self.next_frame()
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

/// Parse one candump line. `Ok(None)` for frames without payload (RTR).
fn parse_line(line: &str) -> Result<Option<CanFrame>, String> {
    let mut parts = line.split_whitespace();
    let (Some(stamp), Some(interface), Some(body)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("expected '(timestamp) interface id#data', got '{}'", line));
    };

    let timestamp_ns = parse_timestamp(stamp)?;
    let channel = parse_channel(interface)?;

    let (id_text, data_text) = body
        .split_once('#')
        .ok_or_else(|| format!("missing '#' in frame '{}'", body))?;

    let (can_id, is_extended) = parse_identifier(id_text)?;

    let data = if let Some(fd) = data_text.strip_prefix('#') {
        // First hex digit after "##" is the FD flags nibble
        let mut chars = fd.chars();
        match chars.next() {
            Some(flags) if flags.is_ascii_hexdigit() => parse_hex_bytes(chars.as_str())?,
            _ => return Err(format!("missing CAN FD flags in '{}'", body)),
        }
    } else if data_text.starts_with('R') || data_text.starts_with('r') {
        log::trace!("Skipping remote frame 0x{:X}", can_id);
        return Ok(None);
    } else {
        parse_hex_bytes(data_text)?
    };

    Ok(Some(CanFrame {
        timestamp_ns,
        channel,
        can_id,
        data,
        is_extended,
    }))
}

/// `(seconds.fraction)` to nanoseconds since the epoch
fn parse_timestamp(stamp: &str) -> Result<u64, String> {
    let inner = stamp
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| format!("timestamp '{}' not in parentheses", stamp))?;

    let (secs, fraction) = inner.split_once('.').unwrap_or((inner, ""));
    let secs: u64 = secs
        .parse()
        .map_err(|_| format!("invalid timestamp seconds '{}'", secs))?;

    if fraction.len() > 9 || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("invalid timestamp fraction '{}'", fraction));
    }
    let nanos: u64 = if fraction.is_empty() {
        0
    } else {
        format!("{:0<9}", fraction)
            .parse()
            .map_err(|_| format!("invalid timestamp fraction '{}'", fraction))?
    };

    secs.checked_mul(1_000_000_000)
        .and_then(|ns| ns.checked_add(nanos))
        .ok_or_else(|| format!("timestamp '{}' out of range", inner))
}

/// Trailing digits of the interface name (`vcan0` -> 0, `can1` -> 1)
fn parse_channel(interface: &str) -> Result<u8, String> {
    let trailing = interface
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .count();
    // ASCII digits are one byte each
    let digits = &interface[interface.len() - trailing..];
    if digits.is_empty() {
        return Ok(0);
    }
    digits
        .parse()
        .map_err(|_| format!("channel number of '{}' out of range", interface))
}

fn parse_identifier(text: &str) -> Result<(u32, bool), String> {
    let can_id = u32::from_str_radix(text, 16)
        .map_err(|_| format!("invalid CAN identifier '{}'", text))?;
    match text.len() {
        1..=3 if can_id <= 0x7FF => Ok((can_id, false)),
        8 if can_id <= 0x1FFF_FFFF => Ok((can_id, true)),
        _ => Err(format!("CAN identifier '{}' has invalid width", text)),
    }
}

fn parse_hex_bytes(text: &str) -> Result<Vec<u8>, String> {
    if !text.is_ascii() {
        return Err(format!("non-ASCII payload '{}'", text));
    }
    // Some tools separate bytes with '.'
    let digits: Vec<u8> = text.bytes().filter(|b| *b != b'.').collect();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{}'", text));
    }
    if digits.len() > 128 {
        return Err(format!("payload '{}' longer than 64 bytes", text));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).unwrap_or_default();
            u8::from_str_radix(pair, 16).map_err(|_| format!("invalid hex byte '{}'", pair))
        })
        .collect()
}
