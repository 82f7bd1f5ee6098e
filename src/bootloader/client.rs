//! Request/response exchanges with the GAP8 bootloader.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};

use super::command::Command;
use crate::error::{CpxError, Result};
use crate::protocol::{Function, RoutedPacket, Target, MAX_PAYLOAD_SIZE};
use crate::transport::Transport;

/// Default firmware chunk size for flash writes.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Client for the bootloader running on GAP8.
///
/// Owns the [`Transport`], so commands on one connection are always issued
/// one after another.
pub struct Bootloader<S> {
    transport: Transport<S>,
    chunk_size: usize,
}

impl<S> Bootloader<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a bootloader client with the default chunk size.
    pub fn new(transport: Transport<S>) -> Self {
        Self {
            transport,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the write chunk size, clamped to what one frame can carry.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_PAYLOAD_SIZE);
        self
    }

    /// Current write chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn packet(command: &Command) -> RoutedPacket {
        RoutedPacket::new(Target::Gap8, Function::Bootloader, command.encode())
    }

    async fn send(&mut self, command: &Command) -> Result<()> {
        self.transport.send(&Self::packet(command)).await
    }

    async fn receive(&mut self) -> Result<RoutedPacket> {
        let packet = self.transport.receive().await?;
        if packet.function != Function::Bootloader {
            return Err(CpxError::Protocol(format!(
                "Expected bootloader reply, got function {:?} from {}",
                packet.function, packet.source
            )));
        }
        Ok(packet)
    }

    async fn transact(&mut self, command: &Command) -> Result<RoutedPacket> {
        self.send(command).await?;
        self.receive().await
    }

    /// Query the bootloader version.
    ///
    /// The reply carries a status byte followed by the version byte.
    pub async fn get_version(&mut self) -> Result<u8> {
        let reply = self.transact(&Command::GetVersion).await?;
        match reply.payload() {
            [_status, version, ..] => Ok(*version),
            other => Err(CpxError::Protocol(format!(
                "Version reply needs 2 bytes, got {}",
                other.len()
            ))),
        }
    }

    /// Write `data` to flash at `start`.
    ///
    /// Sends the write header, then the data as back-to-back chunks of at
    /// most `chunk_size` bytes. Nothing is read back; the device gives no
    /// per-chunk acknowledgement. Returns the number of chunks sent.
    pub async fn write_flash(&mut self, start: u32, data: &Bytes) -> Result<usize> {
        let count = region_len(data.len())?;
        self.send(&Command::WriteFlashHeader { start, count }).await?;

        let mut chunks = 0;
        let mut offset = 0;
        while offset < data.len() {
            let next = self.chunk_size.min(data.len() - offset);
            tracing::debug!(offset, len = next, "Writing flash chunk");
            self.send(&Command::WriteFlashChunk {
                bytes: data.slice(offset..offset + next),
            })
            .await?;
            offset += next;
            chunks += 1;
        }

        Ok(chunks)
    }

    /// Ask the device for the checksum of `count` bytes of flash at `start`.
    ///
    /// Returns the reply payload with its leading status byte removed.
    pub async fn compute_checksum(&mut self, start: u32, count: u32) -> Result<Bytes> {
        let reply = self
            .transact(&Command::ComputeChecksum { start, count })
            .await?;
        if reply.payload.is_empty() {
            return Err(CpxError::Protocol("Empty checksum reply".to_string()));
        }
        Ok(reply.payload.slice(1..))
    }

    /// Jump to the application. The device resets and never replies.
    pub async fn start_application(&mut self) -> Result<()> {
        self.send(&Command::StartApplication).await
    }

    /// Read `count` bytes of flash at `start`.
    ///
    /// The device answers with as many packets as it needs; each packet's
    /// payload is taken as-is until `count` bytes have arrived.
    ///
    /// A zero-length read is refused before anything is sent: the device
    /// still answers it with one empty packet, which would then be taken as
    /// the reply to the next command.
    pub async fn read_flash(&mut self, start: u32, count: u32) -> Result<Bytes> {
        if count == 0 {
            return Err(CpxError::Protocol(format!(
                "Read of 0 bytes at 0x{:X}",
                start
            )));
        }
        self.send(&Command::ReadFlash { start, count }).await?;

        let count = count as usize;
        let mut data = BytesMut::with_capacity(count);
        while data.len() < count {
            let reply = self.receive().await?;
            if reply.payload.is_empty() {
                return Err(CpxError::Protocol(format!(
                    "Empty read reply after {} of {} bytes",
                    data.len(),
                    count
                )));
            }
            if data.len() + reply.payload_len() > count {
                return Err(CpxError::Protocol(format!(
                    "Read reply overruns request: {} + {} > {}",
                    data.len(),
                    reply.payload_len(),
                    count
                )));
            }
            data.extend_from_slice(reply.payload());
        }

        Ok(data.freeze())
    }

    /// Get a mutable reference to the transport.
    pub fn transport_mut(&mut self) -> &mut Transport<S> {
        &mut self.transport
    }

    /// Give back the transport.
    pub fn into_transport(self) -> Transport<S> {
        self.transport
    }
}

/// Flash regions are addressed with 32-bit counts.
fn region_len(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| CpxError::Protocol(format!("Region of {} bytes exceeds u32", len)))
}
