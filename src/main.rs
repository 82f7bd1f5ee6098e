//! cpx-flash binary
//!
//! Flashes, reads back and inspects GAP8 application images over CPX.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

use cpx_bootloader::flasher::{FlashConfig, Flasher, DEFAULT_BASE_ADDRESS};
use cpx_bootloader::image::FirmwareImage;
use cpx_bootloader::output::{hex_dump, write_stdout_json, write_stdout_line};
use cpx_bootloader::transport::{
    ConnectionConfig, Transport, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_READ_TIMEOUT,
};
use cpx_bootloader::Bootloader;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// GAP8 bootloader client for the AI-deck
#[derive(Parser, Debug)]
#[command(name = "cpx-flash", version, about)]
struct Args {
    /// AI-deck IP
    #[arg(short = 'n', long, default_value = DEFAULT_HOST, value_name = "IP")]
    host: String,

    /// AI-deck port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Read timeout in milliseconds (0 waits forever)
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// TCP connect timeout in milliseconds (0 leaves it to the OS)
    #[arg(long, value_name = "MS")]
    connect_timeout_ms: Option<u64>,

    /// Print results as a single JSON line
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write an image, verify it and start it
    Flash {
        /// Firmware image to flash
        image: PathBuf,

        /// Flash address to write to
        #[arg(long, value_parser = parse_u32, default_value_t = DEFAULT_BASE_ADDRESS)]
        base: u32,

        /// Firmware bytes per packet
        #[arg(long, default_value_t = cpx_bootloader::bootloader::DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Leave the bootloader running after a successful write
        #[arg(long)]
        no_start: bool,

        /// Write even if the bootloader version is too old
        #[arg(long)]
        no_version_check: bool,
    },

    /// Print the bootloader version
    Version,

    /// Read a region of flash
    Read {
        #[arg(value_parser = parse_u32)]
        start: u32,
        #[arg(value_parser = parse_u32)]
        count: u32,
        /// Write the raw bytes here instead of a hex dump
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Print the device MD5 of a region of flash
    Checksum {
        #[arg(value_parser = parse_u32)]
        start: u32,
        #[arg(value_parser = parse_u32)]
        count: u32,
    },

    /// Check an image's segments against the bootloader's memory
    Inspect {
        /// Firmware image to inspect
        image: PathBuf,
    },
}

/// Accepts decimal or `0x`-prefixed hex.
fn parse_u32(value: &str) -> Result<u32, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", value, e))
}

impl Args {
    fn connection(&self) -> ConnectionConfig {
        let config = ConnectionConfig::new(self.host.clone(), self.port);
        match self.connect_timeout_ms {
            Some(0) => config.connect_timeout(None),
            Some(ms) => config.connect_timeout(Some(Duration::from_millis(ms))),
            None => config,
        }
    }

    fn read_timeout(&self, default: Option<Duration>) -> Option<Duration> {
        match self.timeout_ms {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => default,
        }
    }

    async fn bootloader(&self) -> CliResult<Bootloader<tokio::net::TcpStream>> {
        let transport = self.connection().connect().await?;
        let transport = transport.with_read_timeout(self.read_timeout(Some(DEFAULT_READ_TIMEOUT)));
        Ok(Bootloader::new(transport))
    }

    fn print<T: Serialize>(&self, value: &T, lines: &[String]) -> CliResult<()> {
        if self.json {
            write_stdout_json(value)?;
        } else {
            for line in lines {
                write_stdout_line(line)?;
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct VersionOutput {
    version: u8,
}

#[derive(Serialize)]
struct RegionOutput {
    start: u32,
    count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
}

#[derive(Serialize)]
struct InspectOutput {
    file_size: u64,
    #[serde(flatten)]
    image: FirmwareImage,
    #[serde(flatten)]
    report: cpx_bootloader::image::ImageReport,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
}

async fn flash(args: &Args, image: &Path, config: FlashConfig) -> CliResult<ExitCode> {
    let data = Bytes::from(std::fs::read(image)?);
    info!(path = %image.display(), len = data.len(), "Firmware is {} bytes", data.len());

    match FirmwareImage::parse(&data) {
        Ok(parsed) => {
            let report = parsed.inspect();
            if !report.is_ok() {
                warn!(
                    segments = ?report.overlapping,
                    "Image segments overlap the bootloader, the application may not start"
                );
            }
        }
        Err(e) => warn!("Not a recognised GAP8 image ({}), flashing anyway", e),
    }

    let transport: Transport<_> = args.connection().connect().await?;
    let mut flasher = Flasher::new(transport, config);
    let report = flasher.run(data).await?;

    let local = hex::encode(report.local_checksum);
    let device = hex::encode(&report.device_checksum);
    let verdict = if report.checksum_matches() {
        "Flash OK: Firmware MD5 matches!".to_string()
    } else {
        "Flash FAIL: Firmware MD5 does NOT match!".to_string()
    };
    args.print(
        &report,
        &[
            format!("GAP8 bootloader is version 0x{:02X}", report.version),
            format!("Firmware is {} bytes", report.image_len),
            format!("MD5: {}", local),
            format!("GAP8 MD5: {}", device),
            verdict,
        ],
    )?;

    Ok(if report.state.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

async fn run(args: &Args) -> CliResult<ExitCode> {
    match &args.command {
        Command::Flash {
            image,
            base,
            chunk_size,
            no_start,
            no_version_check,
        } => {
            let mut config = FlashConfig::new()
                .base_address(*base)
                .chunk_size(*chunk_size)
                .start_on_success(!no_start)
                .read_timeout(args.read_timeout(FlashConfig::default().read_timeout));
            if *no_version_check {
                config = config.minimum_version(None);
            }
            flash(args, image, config).await
        }

        Command::Version => {
            let version = args.bootloader().await?.get_version().await?;
            args.print(
                &VersionOutput { version },
                &[format!("GAP8 bootloader is version 0x{:02X}", version)],
            )?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Read {
            start,
            count,
            output,
        } => {
            let data = args.bootloader().await?.read_flash(*start, *count).await?;
            match output {
                Some(path) => {
                    std::fs::write(path, &data)?;
                    info!(path = %path.display(), len = data.len(), "Flash contents saved");
                    args.print(
                        &RegionOutput {
                            start: *start,
                            count: *count,
                            data: None,
                            checksum: None,
                        },
                        &[format!("Wrote {} bytes to {}", data.len(), path.display())],
                    )?;
                }
                None => args.print(
                    &RegionOutput {
                        start: *start,
                        count: *count,
                        data: Some(hex::encode(&data)),
                        checksum: None,
                    },
                    &[hex_dump(&data, Some(*start))],
                )?,
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Checksum { start, count } => {
            let checksum = args
                .bootloader()
                .await?
                .compute_checksum(*start, *count)
                .await?;
            let checksum = hex::encode(&checksum);
            args.print(
                &RegionOutput {
                    start: *start,
                    count: *count,
                    data: None,
                    checksum: Some(checksum.clone()),
                },
                &[checksum],
            )?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Inspect { image } => {
            let file_size = std::fs::metadata(image)?.len();
            let parsed = FirmwareImage::load(image)?;
            let report = parsed.inspect();

            let mut lines = vec![
                format!("Showing info for {}", image.display()),
                format!("Size on disk: {}", file_size),
                format!("Size: {}", parsed.total_size),
                format!("nSegments: {}", parsed.segments.len()),
                format!("Entrypoint: 0x{:X}", parsed.entry_point),
                format!("Entrypoint base?: 0x{:X}", parsed.entry_base),
            ];
            lines.extend(
                parsed
                    .segments
                    .iter()
                    .enumerate()
                    .map(|(i, segment)| format!("[{}]\t{}", i, segment)),
            );
            lines.push(format!(
                "Total L1 size: 0x{:X} ({})",
                report.total_l1, report.total_l1
            ));
            lines.push(format!(
                "Total L2 size: 0x{:X} ({})",
                report.total_l2, report.total_l2
            ));
            if report.is_ok() {
                lines.push("No overlap with bootloader, its all fine!".to_string());
            } else {
                lines.push("The following segments overlap with bootloader:".to_string());
                lines.extend(
                    report
                        .overlapping
                        .iter()
                        .map(|&i| format!("[{}]\t{}", i, parsed.segments[i])),
                );
            }

            let ok = report.is_ok();
            args.print(
                &InspectOutput {
                    file_size,
                    image: parsed,
                    report,
                },
                &lines,
            )?;
            Ok(if ok { ExitCode::SUCCESS } else { ExitCode::from(1) })
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();

    match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            if args.json {
                let _ = write_stdout_json(&ErrorOutput {
                    error: e.to_string(),
                });
            }
            ExitCode::from(2)
        }
    }
}
