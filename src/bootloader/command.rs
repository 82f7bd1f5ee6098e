//! Bootloader command encoding.
//!
//! Every command travels as the payload of a GAP8/BOOTLOADER packet: a
//! 1-byte opcode, optionally followed by little-endian `u32` fields.
//! ```text
//! ┌────────┬──────────┬──────────┐
//! │ Opcode │ Start    │ Count    │
//! │ 1 byte │ uint32 LE│ uint32 LE│
//! └────────┴──────────┴──────────┘
//! ```
//! Firmware chunks following a write header are sent as raw payloads
//! without an opcode.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CpxError, Result};

/// Opcode constants understood by the GAP8 bootloader.
pub mod opcode {
    pub const GET_VERSION: u8 = 0x00;
    pub const WRITE_FLASH: u8 = 0x02;
    pub const READ_FLASH: u8 = 0x03;
    pub const CHECKSUM: u8 = 0x04;
    pub const START_APPLICATION: u8 = 0x06;
}

/// Size of a command that carries start and count fields.
pub const REGION_COMMAND_SIZE: usize = 9;

/// One bootloader request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GetVersion,
    ReadFlash { start: u32, count: u32 },
    /// Announces `count` bytes of firmware chunks to be written at `start`.
    WriteFlashHeader { start: u32, count: u32 },
    /// Raw firmware data, only valid after a `WriteFlashHeader`.
    WriteFlashChunk { bytes: Bytes },
    ComputeChecksum { start: u32, count: u32 },
    StartApplication,
}

impl Command {
    /// Opcode byte, `None` for raw write chunks.
    pub fn opcode(&self) -> Option<u8> {
        match self {
            Command::GetVersion => Some(opcode::GET_VERSION),
            Command::ReadFlash { .. } => Some(opcode::READ_FLASH),
            Command::WriteFlashHeader { .. } => Some(opcode::WRITE_FLASH),
            Command::WriteFlashChunk { .. } => None,
            Command::ComputeChecksum { .. } => Some(opcode::CHECKSUM),
            Command::StartApplication => Some(opcode::START_APPLICATION),
        }
    }

    /// Encode to the packet payload.
    ///
    /// # Example
    ///
    /// ```
    /// use cpx_bootloader::bootloader::Command;
    ///
    /// let payload = Command::ComputeChecksum { start: 0x40000, count: 16 }.encode();
    /// assert_eq!(&payload[..], &[0x04, 0x00, 0x00, 0x04, 0x00, 0x10, 0x00, 0x00, 0x00]);
    /// ```
    pub fn encode(&self) -> Bytes {
        match self {
            Command::WriteFlashChunk { bytes } => bytes.clone(),
            Command::ReadFlash { start, count }
            | Command::WriteFlashHeader { start, count }
            | Command::ComputeChecksum { start, count } => {
                let mut buf = BytesMut::with_capacity(REGION_COMMAND_SIZE);
                buf.put_u8(self.opcode().unwrap_or_default());
                buf.put_u32_le(*start);
                buf.put_u32_le(*count);
                buf.freeze()
            }
            Command::GetVersion | Command::StartApplication => {
                Bytes::copy_from_slice(&[self.opcode().unwrap_or_default()])
            }
        }
    }

    /// Parse an opcode-prefixed command payload.
    ///
    /// Raw write chunks cannot be recognised on their own; a receiver must
    /// track the preceding `WriteFlashHeader` itself.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (&op, rest) = payload
            .split_first()
            .ok_or_else(|| CpxError::Protocol("Empty bootloader command".to_string()))?;

        match op {
            opcode::GET_VERSION => Ok(Command::GetVersion),
            opcode::START_APPLICATION => Ok(Command::StartApplication),
            opcode::WRITE_FLASH | opcode::READ_FLASH | opcode::CHECKSUM => {
                if rest.len() < REGION_COMMAND_SIZE - 1 {
                    return Err(CpxError::Protocol(format!(
                        "Command 0x{:02X} needs {} bytes, got {}",
                        op,
                        REGION_COMMAND_SIZE,
                        payload.len()
                    )));
                }
                let start = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
                let count = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]);
                Ok(match op {
                    opcode::WRITE_FLASH => Command::WriteFlashHeader { start, count },
                    opcode::READ_FLASH => Command::ReadFlash { start, count },
                    _ => Command::ComputeChecksum { start, count },
                })
            }
            other => Err(CpxError::Protocol(format!(
                "Unknown bootloader opcode 0x{:02X}",
                other
            ))),
        }
    }
}
