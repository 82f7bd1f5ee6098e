//! Flasher module - the end-to-end flashing sequence.
//!
//! A run walks the bootloader through:
//! 1. Query the version (and refuse bootloaders older than the minimum)
//! 2. Hash the image locally
//! 3. Send the write header and the image in chunks
//! 4. Ask the device for the MD5 of the written region and compare
//! 5. Start the application only if both digests match
//!
//! # Example
//!
//! ```ignore
//! use cpx_bootloader::flasher::{FlashConfig, Flasher};
//! use cpx_bootloader::transport::Transport;
//!
//! let transport = Transport::connect("192.168.4.1:5000", None).await?;
//! let mut flasher = Flasher::new(transport, FlashConfig::default());
//! let report = flasher.run_checked(std::fs::read("app.img")?.into()).await?;
//! println!("{}", report.state);
//! ```

mod config;
mod orchestrator;
mod state;

pub use config::{
    FlashConfig, DEFAULT_BASE_ADDRESS, DEFAULT_FLASH_READ_TIMEOUT, DEFAULT_MINIMUM_VERSION,
};
pub use orchestrator::{image_checksum, FlashReport, FlashSession, Flasher, CHECKSUM_SIZE};
pub use state::FlashState;
