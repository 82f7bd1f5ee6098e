//! Wire format encoding and decoding.
//!
//! Implements the 4-byte CPX header:
//! ```text
//! ┌──────────┬─────────┬──────────┬─────────────┐
//! │ Length   │ Routing │ Function │ Payload     │
//! │ 2 bytes  │ 1 byte  │ 1 byte   │ length - 2  │
//! │ uint16 LE│         │          │             │
//! └──────────┴─────────┴──────────┴─────────────┘
//! ```
//!
//! `Length` counts the routing and function bytes plus the payload, so an
//! empty packet has length 2. The routing byte packs the destination in
//! bits 0-2, the source in bits 3-5 and the last-packet flag in bit 6.
//!
//! All multi-byte integers are Little Endian.

use std::fmt;

use crate::error::{CpxError, Result};

/// Header size in bytes (fixed, exactly 4).
pub const HEADER_SIZE: usize = 4;

/// Bytes of routing info counted by the length field (routing + function).
pub const ROUTING_INFO_SIZE: usize = 2;

/// Largest value the length field may carry.
pub const MAX_WIRE_LENGTH: usize = 1022;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD_SIZE: usize = MAX_WIRE_LENGTH - ROUTING_INFO_SIZE;

/// Routing byte bit layout.
pub mod routing {
    /// Destination target, bits 0-2.
    pub const DESTINATION_MASK: u8 = 0b0000_0111;
    /// Source target, bits 3-5.
    pub const SOURCE_SHIFT: u8 = 3;
    /// Last packet of a multi-frame message.
    pub const LAST_PACKET: u8 = 0b0100_0000;
    /// Reserved, always written as 0.
    pub const RESERVED_MASK: u8 = 0b1000_0000;
}

/// CPX endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Target {
    Stm32 = 1,
    Esp32 = 2,
    Host = 3,
    Gap8 = 4,
}

impl TryFrom<u8> for Target {
    type Error = CpxError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Target::Stm32),
            2 => Ok(Target::Esp32),
            3 => Ok(Target::Host),
            4 => Ok(Target::Gap8),
            other => Err(CpxError::Protocol(format!("Unknown CPX target {}", other))),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Target::Stm32 => "STM32",
            Target::Esp32 => "ESP32",
            Target::Host => "HOST",
            Target::Gap8 => "GAP8",
        };
        f.write_str(name)
    }
}

/// Logical service a packet is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Function {
    System = 0x01,
    Console = 0x02,
    Crtp = 0x03,
    WifiCtrl = 0x04,
    App = 0x05,
    Test = 0x0E,
    Bootloader = 0x0F,
}

impl TryFrom<u8> for Function {
    type Error = CpxError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Function::System),
            0x02 => Ok(Function::Console),
            0x03 => Ok(Function::Crtp),
            0x04 => Ok(Function::WifiCtrl),
            0x05 => Ok(Function::App),
            0x0E => Ok(Function::Test),
            0x0F => Ok(Function::Bootloader),
            other => Err(CpxError::Protocol(format!(
                "Unknown CPX function 0x{:02X}",
                other
            ))),
        }
    }
}

/// Decoded header from wire format.
///
/// `length` is the raw wire length and still includes the two routing bytes;
/// use [`Header::payload_len`] for the number of bytes that follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Wire length (payload + 2).
    pub length: u16,
    pub destination: Target,
    pub source: Target,
    pub function: Function,
    /// Set on the final frame of a multi-frame message.
    pub last_packet: bool,
}

impl Header {
    /// Create a header for a payload of `payload_len` bytes.
    ///
    /// Fails with `PacketTooLarge` if the frame would exceed the ceiling.
    pub fn new(
        destination: Target,
        source: Target,
        function: Function,
        last_packet: bool,
        payload_len: usize,
    ) -> Result<Self> {
        let wire_length = payload_len + ROUTING_INFO_SIZE;
        if wire_length > MAX_WIRE_LENGTH {
            return Err(CpxError::PacketTooLarge {
                wire_length,
                max: MAX_WIRE_LENGTH,
            });
        }

        Ok(Self {
            length: wire_length as u16,
            destination,
            source,
            function,
            last_packet,
        })
    }

    /// Pack destination, source and last-packet flag into the routing byte.
    #[inline]
    pub fn routing_byte(&self) -> u8 {
        let mut byte = ((self.source as u8 & routing::DESTINATION_MASK) << routing::SOURCE_SHIFT)
            | (self.destination as u8 & routing::DESTINATION_MASK);
        if self.last_packet {
            byte |= routing::LAST_PACKET;
        }
        byte
    }

    /// Encode header to bytes (Little Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use cpx_bootloader::protocol::{Function, Header, Target};
    ///
    /// let header = Header::new(Target::Gap8, Target::Host, Function::Bootloader, true, 1).unwrap();
    /// assert_eq!(header.encode(), [0x03, 0x00, 0x64, 0x0F]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let len = self.length.to_le_bytes();
        [len[0], len[1], self.routing_byte(), self.function as u8]
    }

    /// Decode header from bytes (Little Endian).
    ///
    /// Fails if the buffer is shorter than `HEADER_SIZE` or the routing
    /// fields name an unknown target or function. The length field is not
    /// range-checked here; see [`Header::validate`].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(CpxError::Protocol(format!(
                "Header needs {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        let routing_byte = buf[2];
        Ok(Self {
            length: u16::from_le_bytes([buf[0], buf[1]]),
            destination: Target::try_from(routing_byte & routing::DESTINATION_MASK)?,
            source: Target::try_from(
                (routing_byte >> routing::SOURCE_SHIFT) & routing::DESTINATION_MASK,
            )?,
            function: Function::try_from(buf[3])?,
            last_packet: routing_byte & routing::LAST_PACKET != 0,
        })
    }

    /// Validate the length field.
    ///
    /// Checks:
    /// - Length covers at least the two routing bytes
    /// - Length doesn't exceed the frame ceiling
    pub fn validate(&self) -> Result<()> {
        let length = self.length as usize;
        if length < ROUTING_INFO_SIZE {
            return Err(CpxError::Protocol(format!(
                "Frame length {} is shorter than the routing info",
                length
            )));
        }
        if length > MAX_WIRE_LENGTH {
            return Err(CpxError::Protocol(format!(
                "Frame length {} exceeds maximum {}",
                length, MAX_WIRE_LENGTH
            )));
        }
        Ok(())
    }

    /// Payload bytes following the header.
    pub fn payload_len(&self) -> Result<usize> {
        self.validate()?;
        Ok(self.length as usize - ROUTING_INFO_SIZE)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}->{:02X}/{:02X}",
            self.source as u8, self.destination as u8, self.function as u8
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(payload_len: usize, last_packet: bool) -> Header {
        Header::new(
            Target::Gap8,
            Target::Host,
            Function::Bootloader,
            last_packet,
            payload_len,
        )
        .unwrap()
    }

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = header(100, false);
        let decoded = Header::decode(&original.encode()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_routing_byte_packing() {
        let header = header(0, true);
        assert_eq!(header.routing_byte(), (3 << 3) | 4 | 0x40);
        assert_eq!(header.routing_byte(), 0x64);
    }

    #[test]
    fn test_routing_byte_unpacking() {
        let decoded = Header::decode(&[0x02, 0x00, 0x64, 0x0F]).unwrap();
        assert_eq!(decoded.destination, Target::Gap8);
        assert_eq!(decoded.source, Target::Host);
        assert!(decoded.last_packet);
        assert_eq!(decoded.function, Function::Bootloader);
    }

    #[test]
    fn test_reserved_bit_ignored_on_decode() {
        let decoded = Header::decode(&[0x02, 0x00, 0x80 | 0x1C, 0x05]).unwrap();
        assert_eq!(decoded.destination, Target::Gap8);
        assert_eq!(decoded.source, Target::Host);
        assert!(!decoded.last_packet);
    }

    #[test]
    fn test_header_little_endian_length() {
        let bytes = header(0x0102 - 2, false).encode();
        assert_eq!(bytes[0], 0x02);
        assert_eq!(bytes[1], 0x01);
    }

    #[test]
    fn test_length_counts_routing_info() {
        assert_eq!(header(0, false).length, 2);
        assert_eq!(header(5, false).length, 7);
    }

    #[test]
    fn test_max_payload_boundary() {
        let max = header(MAX_PAYLOAD_SIZE, false);
        assert_eq!(max.length as usize, MAX_WIRE_LENGTH);

        let result = Header::new(
            Target::Gap8,
            Target::Host,
            Function::Bootloader,
            false,
            MAX_PAYLOAD_SIZE + 1,
        );
        assert!(matches!(
            result,
            Err(CpxError::PacketTooLarge {
                wire_length: 1023,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_too_short_buffer() {
        assert!(Header::decode(&[0x02, 0x00, 0x64]).is_err());
    }

    #[test]
    fn test_decode_unknown_target() {
        // destination 0 is not a target
        let result = Header::decode(&[0x02, 0x00, 0x18, 0x0F]);
        assert!(result.unwrap_err().to_string().contains("Unknown CPX target"));
    }

    #[test]
    fn test_decode_rejects_unassigned_source() {
        for source in [0u8, 5, 6, 7] {
            let routing_byte = (source << routing::SOURCE_SHIFT) | Target::Host as u8;
            assert!(Header::decode(&[0x02, 0x00, routing_byte, 0x0F]).is_err());
        }
        assert!(Header::decode(&[0x02, 0x00, 0x23, 0x0F]).is_ok());
    }

    #[test]
    fn test_decode_unknown_function() {
        let result = Header::decode(&[0x02, 0x00, 0x1C, 0x42]);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Unknown CPX function"));
    }

    #[test]
    fn test_validate_rejects_short_length() {
        let decoded = Header::decode(&[0x01, 0x00, 0x1C, 0x0F]).unwrap();
        assert!(decoded.validate().is_err());
        assert!(decoded.payload_len().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_length() {
        let decoded = Header::decode(&[0xFF, 0x03, 0x1C, 0x0F]).unwrap();
        assert!(decoded
            .validate()
            .unwrap_err()
            .to_string()
            .contains("exceeds maximum"));
    }

    #[test]
    fn test_display() {
        assert_eq!(header(0, false).to_string(), "03->04/0F");
        assert_eq!(Target::Gap8.to_string(), "GAP8");
    }
}
