//! Simulated GAP8 bootloader for integration tests.
//!
//! Serves one connection: decodes CPX packets, keeps an in-memory flash,
//! and answers version, checksum and read requests like the device does.

#![allow(dead_code)]

use bytes::Bytes;
use md5::{Digest, Md5};
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;

use cpx_bootloader::bootloader::Command;
use cpx_bootloader::protocol::{FrameBuffer, MAX_PAYLOAD_SIZE};
use cpx_bootloader::{Function, RoutedPacket, Target, Transport};

/// Simulated flash size, large enough for the default base address.
pub const FLASH_SIZE: usize = 0x8_0000;

#[derive(Debug, Clone)]
pub struct DeviceOptions {
    pub version: u8,
    /// Flip this byte of the next write, relative to its start address.
    pub corrupt_at: Option<usize>,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            version: 1,
            corrupt_at: None,
        }
    }
}

/// Everything the device saw before the host hung up.
#[derive(Debug, Default)]
pub struct DeviceLog {
    pub commands: Vec<Command>,
    pub chunk_sizes: Vec<usize>,
    pub starts: usize,
    pub flash: Vec<u8>,
}

impl DeviceLog {
    pub fn region(&self, start: u32, len: usize) -> &[u8] {
        &self.flash[start as usize..start as usize + len]
    }
}

struct PendingWrite {
    cursor: usize,
    remaining: usize,
    written: usize,
}

fn reply(payload: impl Into<Bytes>) -> RoutedPacket {
    RoutedPacket::new(Target::Host, Function::Bootloader, payload).with_source(Target::Gap8)
}

async fn send<S: AsyncWrite + Unpin>(stream: &mut S, packet: RoutedPacket) {
    let wire = packet.encode().expect("device reply fits in a frame");
    stream.write_all(&wire).await.expect("device write");
}

/// Run the device on `stream` until the host closes it.
pub async fn serve<S>(mut stream: S, options: DeviceOptions) -> DeviceLog
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut log = DeviceLog {
        flash: vec![0xFF; FLASH_SIZE],
        ..Default::default()
    };
    let mut frames = FrameBuffer::new();
    let mut pending: Option<PendingWrite> = None;
    let mut buf = vec![0u8; 4096];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };

        for packet in frames.push(&buf[..n]).expect("host sent a valid frame") {
            assert_eq!(packet.destination, Target::Gap8);
            assert_eq!(packet.function, Function::Bootloader);

            if let Some(write) = pending.as_mut() {
                let data = packet.payload();
                assert!(data.len() <= write.remaining, "chunk overruns write header");
                for (i, byte) in data.iter().enumerate() {
                    let corrupt = options.corrupt_at == Some(write.written + i);
                    log.flash[write.cursor + i] = if corrupt { !byte } else { *byte };
                }
                write.cursor += data.len();
                write.written += data.len();
                write.remaining -= data.len();
                log.chunk_sizes.push(data.len());
                if write.remaining == 0 {
                    pending = None;
                }
                continue;
            }

            let command = Command::parse(packet.payload()).expect("known command");
            log.commands.push(command.clone());
            match command {
                Command::GetVersion => send(&mut stream, reply(vec![0x00, options.version])).await,
                Command::WriteFlashHeader { start, count } => {
                    if count > 0 {
                        pending = Some(PendingWrite {
                            cursor: start as usize,
                            remaining: count as usize,
                            written: 0,
                        });
                    }
                }
                Command::ComputeChecksum { start, count } => {
                    let region = &log.flash[start as usize..(start + count) as usize];
                    let mut payload = vec![0x04];
                    payload.extend_from_slice(&Md5::digest(region));
                    send(&mut stream, reply(payload)).await;
                }
                Command::ReadFlash { start, count } => {
                    let region =
                        Bytes::copy_from_slice(&log.flash[start as usize..(start + count) as usize]);
                    // At least one packet, empty for a zero-length read.
                    let mut offset = 0;
                    loop {
                        let end = (offset + MAX_PAYLOAD_SIZE).min(region.len());
                        let last = end == region.len();
                        send(&mut stream, reply(region.slice(offset..end)).with_last_packet(last))
                            .await;
                        offset = end;
                        if last {
                            break;
                        }
                    }
                }
                Command::StartApplication => log.starts += 1,
                Command::WriteFlashChunk { .. } => unreachable!("parse never yields chunks"),
            }
        }
    }

    log
}

/// Host transport connected to a freshly spawned device.
pub fn spawn_device(
    options: DeviceOptions,
) -> (Transport<tokio::io::DuplexStream>, JoinHandle<DeviceLog>) {
    let (host, device) = duplex(64 * 1024);
    let handle = tokio::spawn(serve(device, options));
    (Transport::new(host), handle)
}

/// Deterministic test image.
pub fn image(len: usize) -> Bytes {
    (0..len).map(|i| (i * 31 + 7) as u8).collect::<Vec<u8>>().into()
}
