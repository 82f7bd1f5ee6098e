//! Flashing configuration.

use std::time::Duration;

use crate::bootloader::DEFAULT_CHUNK_SIZE;
use crate::protocol::MAX_PAYLOAD_SIZE;

/// Start of the application region in GAP8 flash.
pub const DEFAULT_BASE_ADDRESS: u32 = 0x40000;

/// Oldest bootloader version accepted by default.
pub const DEFAULT_MINIMUM_VERSION: u8 = 1;

/// Default read timeout while flashing.
///
/// Writes are not acknowledged, so the checksum reply only arrives after the
/// device has erased, written and hashed the whole image over a slow link.
pub const DEFAULT_FLASH_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for one flashing run.
///
/// Use the setters to override the defaults:
///
/// ```
/// use cpx_bootloader::flasher::FlashConfig;
///
/// let config = FlashConfig::new()
///     .chunk_size(256)
///     .minimum_version(None)
///     .start_on_success(false);
///
/// assert_eq!(config.base_address, 0x40000);
/// assert_eq!(config.chunk_size, 256);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashConfig {
    /// Flash address the image is written to.
    pub base_address: u32,
    /// Firmware bytes per write packet (1..=1020).
    pub chunk_size: usize,
    /// Read timeout applied to the transport. `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Refuse to write when the bootloader is older than this.
    /// `None` only logs the version.
    pub minimum_version: Option<u8>,
    /// Jump to the application once the checksum matches.
    pub start_on_success: bool,
}

impl FlashConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flash base address.
    pub fn base_address(mut self, base_address: u32) -> Self {
        self.base_address = base_address;
        self
    }

    /// Set the write chunk size, clamped to what one frame can carry.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_PAYLOAD_SIZE);
        self
    }

    /// Set the transport read timeout.
    pub fn read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Set the minimum accepted bootloader version.
    pub fn minimum_version(mut self, minimum_version: Option<u8>) -> Self {
        self.minimum_version = minimum_version;
        self
    }

    /// Choose whether a verified image is started.
    pub fn start_on_success(mut self, start_on_success: bool) -> Self {
        self.start_on_success = start_on_success;
        self
    }
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            base_address: DEFAULT_BASE_ADDRESS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_timeout: Some(DEFAULT_FLASH_READ_TIMEOUT),
            minimum_version: Some(DEFAULT_MINIMUM_VERSION),
            start_on_success: true,
        }
    }
}
