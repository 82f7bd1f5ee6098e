//! Bootloader module - the GAP8 bootloader command set.
//!
//! Commands are bootloader payloads addressed to GAP8 with the
//! `BOOTLOADER` function:
//! - `GetVersion`, `ComputeChecksum` - strict request/response
//! - `WriteFlashHeader` + chunks, `StartApplication` - send only
//! - `ReadFlash` - one request, replies spread over several packets
//!
//! # Example
//!
//! ```ignore
//! use cpx_bootloader::bootloader::Bootloader;
//! use cpx_bootloader::transport::Transport;
//!
//! let transport = Transport::connect("192.168.4.1:5000", None).await?;
//! let mut bootloader = Bootloader::new(transport);
//! println!("version 0x{:02X}", bootloader.get_version().await?);
//! ```

mod client;
mod command;

pub use client::{Bootloader, DEFAULT_CHUNK_SIZE};
pub use command::{opcode, Command, REGION_COMMAND_SIZE};
