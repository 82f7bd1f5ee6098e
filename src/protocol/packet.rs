//! Routed packet: the addressed unit carried by one CPX frame.
//!
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use cpx_bootloader::protocol::{Function, RoutedPacket, Target};
//!
//! let packet = RoutedPacket::new(Target::Gap8, Function::Bootloader, vec![0x00]);
//! let wire = packet.encode().unwrap();
//!
//! assert_eq!(wire, [0x03, 0x00, 0x1C, 0x0F, 0x00]);
//! ```

use bytes::Bytes;

use super::wire_format::{Function, Header, Target, HEADER_SIZE};
use crate::error::{CpxError, Result};

/// A packet with routing and data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedPacket {
    pub source: Target,
    pub destination: Target,
    pub function: Function,
    /// Set on the final frame of a multi-frame message.
    pub last_packet: bool,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl RoutedPacket {
    /// Create a packet from the host to `destination`.
    pub fn new(destination: Target, function: Function, payload: impl Into<Bytes>) -> Self {
        Self {
            source: Target::Host,
            destination,
            function,
            last_packet: false,
            payload: payload.into(),
        }
    }

    /// Override the source target.
    pub fn with_source(mut self, source: Target) -> Self {
        self.source = source;
        self
    }

    /// Set the last-packet flag.
    pub fn with_last_packet(mut self, last_packet: bool) -> Self {
        self.last_packet = last_packet;
        self
    }

    /// Rebuild a packet from a decoded header and the payload read after it.
    ///
    /// The payload length must match what the header announced.
    pub fn from_parts(header: Header, payload: Bytes) -> Result<Self> {
        let expected = header.payload_len()?;
        if payload.len() != expected {
            return Err(CpxError::Protocol(format!(
                "Header announced {} payload bytes, got {}",
                expected,
                payload.len()
            )));
        }

        Ok(Self {
            source: header.source,
            destination: header.destination,
            function: header.function,
            last_packet: header.last_packet,
            payload,
        })
    }

    /// Build the wire header for this packet.
    pub fn header(&self) -> Result<Header> {
        Header::new(
            self.destination,
            self.source,
            self.function,
            self.last_packet,
            self.payload.len(),
        )
    }

    /// Encode into a contiguous frame (header followed by payload).
    ///
    /// Fails with `PacketTooLarge` when the payload exceeds
    /// [`MAX_PAYLOAD_SIZE`](super::MAX_PAYLOAD_SIZE); split the data before building the packet.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let header = self.header()?;
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&header.encode());
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}
