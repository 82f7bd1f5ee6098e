//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need at least 4 bytes
//! - `WaitingForPayload`: Header parsed, need N more payload bytes
//!
//! The host side reads frames with exact-length reads (see
//! [`Transport`](crate::transport::Transport)); this decoder is for the
//! other direction, where bytes arrive in arbitrary chunks and must be
//! split into packets, e.g. a device emulator or a traffic sniffer.
//!
//! # Example
//!
//! ```
//! use cpx_bootloader::protocol::{FrameBuffer, Function, RoutedPacket, Target};
//!
//! let wire = RoutedPacket::new(Target::Gap8, Function::Bootloader, vec![0x06])
//!     .encode()
//!     .unwrap();
//!
//! let mut buffer = FrameBuffer::new();
//! assert!(buffer.push(&wire[..3]).unwrap().is_empty());
//!
//! let packets = buffer.push(&wire[3..]).unwrap();
//! assert_eq!(packets[0].payload(), &[0x06]);
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{Header, HEADER_SIZE, MAX_WIRE_LENGTH};
use super::RoutedPacket;
use crate::error::Result;

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for complete header (need 4 bytes).
    WaitingForHeader,
    /// Header parsed, waiting for payload bytes.
    WaitingForPayload { header: Header, remaining: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete packets.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
}

impl FrameBuffer {
    /// Create a new frame buffer sized for a handful of full frames.
    pub fn new() -> Self {
        Self::with_capacity(4 * (HEADER_SIZE + MAX_WIRE_LENGTH))
    }

    /// Create a new frame buffer with custom initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: State::WaitingForHeader,
        }
    }

    /// Push data into the buffer and extract all complete packets.
    ///
    /// Partial data is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if a header is malformed or announces a
    /// length outside `2..=1022`. The buffer should be cleared afterwards,
    /// since frame boundaries are lost.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<RoutedPacket>> {
        self.buffer.extend_from_slice(data);

        let mut packets = Vec::new();
        while let Some(packet) = self.try_extract_one()? {
            packets.push(packet);
        }

        Ok(packets)
    }

    fn try_extract_one(&mut self) -> Result<Option<RoutedPacket>> {
        match &self.state {
            State::WaitingForHeader => {
                if self.buffer.len() < HEADER_SIZE {
                    return Ok(None);
                }

                let header = Header::decode(&self.buffer[..HEADER_SIZE])?;
                let remaining = header.payload_len()?;

                let _ = self.buffer.split_to(HEADER_SIZE);

                if remaining == 0 {
                    return RoutedPacket::from_parts(header, Bytes::new()).map(Some);
                }

                self.state = State::WaitingForPayload { header, remaining };
                self.try_extract_one()
            }

            State::WaitingForPayload { header, remaining } => {
                let remaining = *remaining;

                if self.buffer.len() < remaining {
                    return Ok(None);
                }

                let payload = self.buffer.split_to(remaining).freeze();
                let header = *header;

                self.state = State::WaitingForHeader;

                RoutedPacket::from_parts(header, payload).map(Some)
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Function, Target};

    fn make_frame_bytes(function: Function, payload: &[u8]) -> Vec<u8> {
        RoutedPacket::new(Target::Gap8, function, payload.to_vec())
            .encode()
            .unwrap()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let packets = buffer
            .push(&make_frame_bytes(Function::Bootloader, b"hello"))
            .unwrap();

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].function, Function::Bootloader);
        assert_eq!(packets[0].payload(), b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();

        let mut combined = make_frame_bytes(Function::System, b"first");
        combined.extend(make_frame_bytes(Function::Console, b"second"));
        combined.extend(make_frame_bytes(Function::App, b"third"));

        let packets = buffer.push(&combined).unwrap();

        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].function, Function::System);
        assert_eq!(packets[1].function, Function::Console);
        assert_eq!(packets[2].function, Function::App);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_header() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(Function::Bootloader, b"test");

        assert!(buffer.push(&bytes[..2]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");

        let packets = buffer.push(&bytes[2..]).unwrap();
        assert_eq!(packets.len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_payload() {
        let mut buffer = FrameBuffer::new();
        let payload = vec![0x5A; 600];
        let bytes = make_frame_bytes(Function::Bootloader, &payload);

        let split = HEADER_SIZE + 10;
        assert!(buffer.push(&bytes[..split]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForPayload");

        let packets = buffer.push(&bytes[split..]).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload(), &payload[..]);
    }

    #[test]
    fn test_empty_payload() {
        let mut buffer = FrameBuffer::new();
        let packets = buffer
            .push(&make_frame_bytes(Function::Bootloader, b""))
            .unwrap();

        assert_eq!(packets.len(), 1);
        assert!(packets[0].payload.is_empty());
    }

    #[test]
    fn test_short_length_rejected() {
        let mut buffer = FrameBuffer::new();
        let result = buffer.push(&[0x01, 0x00, 0x1C, 0x0F]);
        assert!(result.unwrap_err().to_string().contains("shorter than"));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut buffer = FrameBuffer::new();
        let result = buffer.push(&[0xFF, 0x03, 0x1C, 0x0F]);
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(Function::Bootloader, b"test");
        buffer.push(&bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(buffer.state_name(), "WaitingForPayload");

        buffer.clear();

        assert_eq!(buffer.state_name(), "WaitingForHeader");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(Function::Bootloader, b"hi");

        let mut all = Vec::new();
        for byte in &bytes {
            all.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all.len(), 1);
        assert_eq!(all[0].payload(), b"hi");
    }
}
