//! # cpx-bootloader
//!
//! Host-side client for reflashing the GAP8 application over CPX.
//!
//! The AI-deck exposes its CPX router on a TCP socket. This crate speaks the
//! CPX framing over that socket and drives the GAP8 bootloader through a
//! complete update: query the version, write the image in chunks, compare
//! the device's MD5 of the written region with the local one, and start the
//! application only when they match.
//!
//! ## Layers
//!
//! - **Protocol**: 4-byte CPX header, routed packets, stream framing
//! - **Transport**: exact reads/writes of whole packets on one connection
//! - **Bootloader**: the bootloader command set as request/response calls
//! - **Flasher**: the end-to-end run and its state machine
//!
//! ## Example
//!
//! ```ignore
//! use cpx_bootloader::flasher::{FlashConfig, Flasher};
//! use cpx_bootloader::transport::ConnectionConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = ConnectionConfig::new("192.168.4.1", 5000).connect().await?;
//!     let image = std::fs::read("app.img")?;
//!
//!     let mut flasher = Flasher::new(transport, FlashConfig::default());
//!     let report = flasher.run_checked(image.into()).await?;
//!     println!("flashed {} bytes", report.image_len);
//!     Ok(())
//! }
//! ```

pub mod bootloader;
pub mod error;
pub mod flasher;
pub mod image;
pub mod output;
pub mod protocol;
pub mod transport;

pub use bootloader::Bootloader;
pub use error::{CpxError, Result};
pub use flasher::{FlashConfig, FlashReport, FlashState, Flasher};
pub use protocol::{Function, RoutedPacket, Target};
pub use transport::{ConnectionConfig, Transport};
