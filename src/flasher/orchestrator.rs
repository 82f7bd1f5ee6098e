//! End-to-end flashing run.

use bytes::Bytes;
use md5::{Digest, Md5};
use serde::{Serialize, Serializer};
use tokio::io::{AsyncRead, AsyncWrite};

use super::config::FlashConfig;
use super::state::FlashState;
use crate::bootloader::Bootloader;
use crate::error::{CpxError, Result};
use crate::transport::Transport;

/// Size of the MD5 digest the bootloader reports.
pub const CHECKSUM_SIZE: usize = 16;

/// MD5 of `data`, fed to the hasher `block` bytes at a time.
pub fn image_checksum(data: &[u8], block: usize) -> [u8; CHECKSUM_SIZE] {
    let mut hasher = Md5::new();
    for chunk in data.chunks(block.max(1)) {
        hasher.update(chunk);
    }
    let mut digest = [0u8; CHECKSUM_SIZE];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// State held for the duration of one run.
#[derive(Debug)]
pub struct FlashSession {
    pub base_address: u32,
    pub image: Bytes,
    pub bytes_written: usize,
    pub local_checksum: [u8; CHECKSUM_SIZE],
}

impl FlashSession {
    /// Start a session, hashing the whole image up front.
    pub fn new(base_address: u32, image: Bytes, block: usize) -> Self {
        let local_checksum = image_checksum(&image, block);
        Self {
            base_address,
            image,
            bytes_written: 0,
            local_checksum,
        }
    }

    /// Image length as sent in region commands.
    pub fn region_len(&self) -> Result<u32> {
        u32::try_from(self.image.len()).map_err(|_| {
            CpxError::Protocol(format!(
                "Image of {} bytes exceeds the flash address space",
                self.image.len()
            ))
        })
    }
}

fn as_hex<T, S>(bytes: &T, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    T: AsRef<[u8]>,
    S: Serializer,
{
    serializer.serialize_str(&hex::encode(bytes))
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct FlashReport {
    pub version: u8,
    pub image_len: usize,
    pub base_address: u32,
    /// Write packets sent after the header.
    pub chunks: usize,
    #[serde(serialize_with = "as_hex")]
    pub local_checksum: [u8; CHECKSUM_SIZE],
    #[serde(serialize_with = "as_hex")]
    pub device_checksum: Bytes,
    pub state: FlashState,
}

impl FlashReport {
    /// Device and local checksums agree.
    pub fn checksum_matches(&self) -> bool {
        self.device_checksum[..] == self.local_checksum[..]
    }

    /// Turn a mismatching report into `ChecksumMismatch`.
    pub fn into_result(self) -> Result<Self> {
        if self.checksum_matches() {
            Ok(self)
        } else {
            Err(CpxError::ChecksumMismatch {
                expected: hex::encode(self.local_checksum),
                actual: hex::encode(&self.device_checksum),
            })
        }
    }
}

/// Drives a full flashing run over one connection.
///
/// The flasher owns the connection; run one flasher per device.
pub struct Flasher<S> {
    bootloader: Bootloader<S>,
    config: FlashConfig,
    state: FlashState,
}

impl<S> Flasher<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a flasher, applying the configured timeout and chunk size.
    pub fn new(transport: Transport<S>, config: FlashConfig) -> Self {
        let transport = transport.with_read_timeout(config.read_timeout);
        let bootloader = Bootloader::new(transport).with_chunk_size(config.chunk_size);
        Self {
            bootloader,
            config,
            state: FlashState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> FlashState {
        self.state
    }

    /// Configuration in use.
    pub fn config(&self) -> &FlashConfig {
        &self.config
    }

    fn transition(&mut self, next: FlashState) {
        tracing::debug!(from = %self.state, to = %next, "Flash state");
        self.state = next;
    }

    /// Flash `image` and start it if the device checksum matches.
    ///
    /// A checksum mismatch is not an error here: the report comes back with
    /// state `Aborted` and the application is left unstarted. Use
    /// [`Flasher::run_checked`] to get `ChecksumMismatch` instead. Any other
    /// failure aborts the run and is returned as-is.
    ///
    /// A flasher runs once; later calls fail without touching the state of
    /// the finished run.
    pub async fn run(&mut self, image: Bytes) -> Result<FlashReport> {
        if self.state != FlashState::Idle {
            return Err(CpxError::Protocol(format!(
                "Flasher already used (state {})",
                self.state
            )));
        }

        let result = self.run_inner(image).await;
        if result.is_err() {
            self.transition(FlashState::Aborted);
        }
        result
    }

    /// Like [`Flasher::run`], but a mismatch is returned as an error.
    pub async fn run_checked(&mut self, image: Bytes) -> Result<FlashReport> {
        self.run(image).await?.into_result()
    }

    async fn run_inner(&mut self, image: Bytes) -> Result<FlashReport> {
        if image.is_empty() {
            return Err(CpxError::EmptyImage);
        }

        let version = self.bootloader.get_version().await?;
        tracing::info!("GAP8 bootloader is version 0x{:02X}", version);
        if let Some(minimum) = self.config.minimum_version {
            if version < minimum {
                tracing::error!(version, minimum, "Bootloader too old, not writing");
                return Err(CpxError::UnsupportedVersion {
                    reported: version,
                    minimum,
                });
            }
        }
        self.transition(FlashState::VersionChecked);

        let mut session = FlashSession::new(
            self.config.base_address,
            image,
            self.bootloader.chunk_size(),
        );
        let count = session.region_len()?;
        tracing::info!(
            len = session.image.len(),
            md5 = %hex::encode(session.local_checksum),
            "Firmware loaded"
        );
        self.transition(FlashState::Writing);

        let chunks = self
            .bootloader
            .write_flash(session.base_address, &session.image)
            .await?;
        session.bytes_written = session.image.len();
        tracing::info!(
            bytes = session.bytes_written,
            chunks,
            base = format_args!("0x{:X}", session.base_address),
            "Firmware sent"
        );
        self.transition(FlashState::Verifying);

        let device_checksum = self
            .bootloader
            .compute_checksum(session.base_address, count)
            .await?;
        if device_checksum.len() != CHECKSUM_SIZE {
            return Err(CpxError::Protocol(format!(
                "Checksum reply has {} bytes, expected {}",
                device_checksum.len(),
                CHECKSUM_SIZE
            )));
        }
        tracing::info!(md5 = %hex::encode(&device_checksum), "Device checksum");

        if device_checksum[..] == session.local_checksum[..] {
            self.transition(FlashState::Verified);
            if self.config.start_on_success {
                self.bootloader.start_application().await?;
                self.transition(FlashState::Started);
                tracing::info!("Flash OK, application started");
            } else {
                tracing::info!("Flash OK, application not started");
            }
        } else {
            self.transition(FlashState::Mismatch);
            tracing::error!(
                expected = %hex::encode(session.local_checksum),
                actual = %hex::encode(&device_checksum),
                "Flash FAIL, checksum mismatch"
            );
            self.transition(FlashState::Aborted);
        }

        Ok(FlashReport {
            version,
            image_len: session.image.len(),
            base_address: session.base_address,
            chunks,
            local_checksum: session.local_checksum,
            device_checksum,
            state: self.state,
        })
    }

    /// Give back the bootloader client.
    pub fn into_bootloader(self) -> Bootloader<S> {
        self.bootloader
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{duplex, AsyncWriteExt};

    use super::*;
    use crate::protocol::{Function, RoutedPacket, Target};

    fn version_reply(version: u8) -> Vec<u8> {
        RoutedPacket::new(Target::Host, Function::Bootloader, vec![0x00, version])
            .with_source(Target::Gap8)
            .encode()
            .unwrap()
    }

    #[test]
    fn test_image_checksum_known_value() {
        assert_eq!(
            hex::encode(image_checksum(b"", 512)),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            hex::encode(image_checksum(b"abc", 512)),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_image_checksum_independent_of_block() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i * 7) as u8).collect();
        assert_eq!(image_checksum(&data, 1), image_checksum(&data, 512));
        assert_eq!(image_checksum(&data, 0), image_checksum(&data, 4096));
    }

    #[test]
    fn test_report_json_hex() {
        let report = FlashReport {
            version: 1,
            image_len: 3,
            base_address: 0x40000,
            chunks: 1,
            local_checksum: [0xAB; CHECKSUM_SIZE],
            device_checksum: Bytes::from_static(&[0xAB; CHECKSUM_SIZE]),
            state: FlashState::Started,
        };
        assert!(report.checksum_matches());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["local_checksum"], "ab".repeat(16));
        assert_eq!(json["state"], "started");
    }

    #[test]
    fn test_report_mismatch_into_result() {
        let report = FlashReport {
            version: 1,
            image_len: 3,
            base_address: 0x40000,
            chunks: 1,
            local_checksum: [0x00; CHECKSUM_SIZE],
            device_checksum: Bytes::from_static(&[0x01; CHECKSUM_SIZE]),
            state: FlashState::Aborted,
        };
        assert!(matches!(
            report.into_result(),
            Err(CpxError::ChecksumMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_image_aborts_before_io() {
        let (host, _device) = duplex(1024);
        let mut flasher = Flasher::new(Transport::new(host), FlashConfig::default());

        let result = flasher.run(Bytes::new()).await;
        assert!(matches!(result, Err(CpxError::EmptyImage)));
        assert_eq!(flasher.state(), FlashState::Aborted);
    }

    #[tokio::test]
    async fn test_old_bootloader_rejected() {
        let (host, mut device) = duplex(1024);
        device.write_all(&version_reply(0)).await.unwrap();
        let mut flasher = Flasher::new(Transport::new(host), FlashConfig::default());

        let result = flasher.run(Bytes::from_static(b"image")).await;
        assert!(matches!(
            result,
            Err(CpxError::UnsupportedVersion {
                reported: 0,
                minimum: 1
            })
        ));
        assert_eq!(flasher.state(), FlashState::Aborted);
    }

    #[tokio::test]
    async fn test_connection_loss_aborts() {
        let (host, device) = duplex(1024);
        drop(device);
        let mut flasher = Flasher::new(Transport::new(host), FlashConfig::default());

        let err = flasher.run(Bytes::from_static(b"image")).await.unwrap_err();
        assert!(err.is_connection_lost());
        assert_eq!(flasher.state(), FlashState::Aborted);
    }

    #[tokio::test]
    async fn test_flasher_single_use() {
        let (host, _device) = duplex(1024);
        let mut flasher = Flasher::new(Transport::new(host), FlashConfig::default());
        let _ = flasher.run(Bytes::new()).await;

        let err = flasher.run(Bytes::from_static(b"x")).await.unwrap_err();
        assert!(err.to_string().contains("already used"));
    }

    #[tokio::test]
    async fn test_reuse_keeps_finished_state() {
        let (host, mut device) = duplex(64 * 1024);
        let image = Bytes::from_static(b"firmware");
        let mut checksum = vec![0x04];
        checksum.extend_from_slice(&image_checksum(&image, 512));

        let mut wire = version_reply(1);
        wire.extend(
            RoutedPacket::new(Target::Host, Function::Bootloader, checksum)
                .with_source(Target::Gap8)
                .encode()
                .unwrap(),
        );
        device.write_all(&wire).await.unwrap();

        let mut flasher = Flasher::new(Transport::new(host), FlashConfig::default());
        let report = flasher.run(image.clone()).await.unwrap();
        assert_eq!(report.state, FlashState::Started);

        let err = flasher.run(image).await.unwrap_err();
        assert!(matches!(err, CpxError::Protocol(_)));
        assert_eq!(flasher.state(), FlashState::Started);
    }
}
