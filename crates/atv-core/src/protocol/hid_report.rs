//! The 3-byte HID Consumer Control report written over BLE.
//!
//! Wire format:
//! ```text
//! [report_id:1 = 0x01][usage_lo:1][usage_hi:1]
//! ```
//! The usage code is little-endian.  A key press is always followed by a
//! release report whose usage is zero: `[0x01, 0x00, 0x00]`.
//!
//! This is the only byte-exact format the BLE path depends on.

use crate::keymap::ConsumerUsage;
use crate::protocol::framing::ProtocolError;

/// Report ID of the consumer-control collection.
pub const CONSUMER_REPORT_ID: u8 = 0x01;

/// Encoded report length in bytes.
pub const REPORT_LEN: usize = 3;

/// The release report, sent after every press.
pub const RELEASE_REPORT: [u8; REPORT_LEN] = [CONSUMER_REPORT_ID, 0x00, 0x00];

/// A single consumer-control report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerReport {
    pub usage: u16,
}

impl ConsumerReport {
    /// Report for pressing `usage`.
    pub fn press(usage: ConsumerUsage) -> Self {
        Self {
            usage: usage.as_u16(),
        }
    }

    /// Report for releasing all keys.
    pub fn release() -> Self {
        Self { usage: 0 }
    }

    pub fn is_release(&self) -> bool {
        self.usage == 0
    }

    pub fn encode(&self) -> [u8; REPORT_LEN] {
        let [lo, hi] = self.usage.to_le_bytes();
        [CONSUMER_REPORT_ID, lo, hi]
    }

    /// Parses a report.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InsufficientData`] for short input and
    /// [`ProtocolError::MalformedPayload`] for a foreign report ID.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < REPORT_LEN {
            return Err(ProtocolError::InsufficientData {
                needed: REPORT_LEN,
                available: bytes.len(),
            });
        }
        if bytes[0] != CONSUMER_REPORT_ID {
            return Err(ProtocolError::MalformedPayload(format!(
                "unexpected report id 0x{:02X}",
                bytes[0]
            )));
        }
        Ok(Self {
            usage: u16::from_le_bytes([bytes[1], bytes[2]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_encodes_usage_little_endian() {
        // Arrange
        let report = ConsumerReport::press(ConsumerUsage::Home);

        // Act
        let bytes = report.encode();

        // Assert: 0x0223 → lo 0x23, hi 0x02
        assert_eq!(bytes, [0x01, 0x23, 0x02]);
    }

    #[test]
    fn test_single_byte_usage_has_zero_high_byte() {
        assert_eq!(
            ConsumerReport::press(ConsumerUsage::VolumeUp).encode(),
            [0x01, 0xE9, 0x00]
        );
    }

    #[test]
    fn test_release_encodes_to_release_report() {
        assert_eq!(ConsumerReport::release().encode(), RELEASE_REPORT);
        assert!(ConsumerReport::release().is_release());
    }

    #[test]
    fn test_decode_reads_usage() {
        let decoded = ConsumerReport::decode(&[0x01, 0x25, 0x02]).unwrap();
        assert_eq!(decoded.usage, ConsumerUsage::Pair.as_u16());
    }

    #[test]
    fn test_decode_short_input_returns_insufficient_data() {
        assert_eq!(
            ConsumerReport::decode(&[0x01, 0x30]),
            Err(ProtocolError::InsufficientData {
                needed: 3,
                available: 2
            })
        );
    }

    #[test]
    fn test_decode_wrong_report_id_is_malformed() {
        assert!(matches!(
            ConsumerReport::decode(&[0x02, 0x30, 0x00]),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }
}
