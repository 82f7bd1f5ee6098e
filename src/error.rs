//! Error types for cpx-bootloader.

use thiserror::Error;

/// Main error type for all CPX and bootloader operations.
#[derive(Debug, Error)]
pub enum CpxError {
    /// Packet would not fit in a single CPX frame. Caller must re-chunk.
    #[error("Packet too large: wire length {wire_length} exceeds {max}")]
    PacketTooLarge {
        /// Wire length the packet would have had (payload + 2).
        wire_length: usize,
        /// Largest wire length a frame can carry.
        max: usize,
    },

    /// Peer closed the connection before a complete frame arrived.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No data arrived within the configured read timeout.
    #[error("Read timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error (malformed header, undersized response, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Device-computed checksum differs from the local one.
    #[error("Checksum mismatch: expected {expected}, device reported {actual}")]
    ChecksumMismatch {
        /// Hex-encoded local digest.
        expected: String,
        /// Hex-encoded device digest.
        actual: String,
    },

    /// Nothing to flash.
    #[error("Firmware image is empty")]
    EmptyImage,

    /// Bootloader reported a version older than the configured minimum.
    #[error("Unsupported bootloader version 0x{reported:02X} (minimum 0x{minimum:02X})")]
    UnsupportedVersion { reported: u8, minimum: u8 },

    /// JSON serialization error (report output only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CpxError {
    /// Whether the session is unusable and the connection must be reopened.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            CpxError::ConnectionClosed | CpxError::Timeout(_) | CpxError::Io(_)
        )
    }
}

/// Result type alias using CpxError.
pub type Result<T> = std::result::Result<T, CpxError>;
