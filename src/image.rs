//! GAP8 flash image inspection.
//!
//! A `.img` file starts with a table of little-endian `u32` values:
//! ```text
//! ┌────────────┬──────────────┬─────────────┬────────────┐
//! │ Total size │ Segment count│ Entry point │ Entry base │   header, 16 bytes
//! ├────────────┼──────────────┼─────────────┼────────────┤
//! │ Flash base │ RAM offset   │ Size        │ Blocks     │   × segment count
//! └────────────┴──────────────┴─────────────┴────────────┘
//! ```
//!
//! The bootloader itself runs from the top of L1 and L2. A segment loaded
//! over those regions overwrites the bootloader while it is copying the
//! application, so such images must be rejected before flashing. Moving data
//! to the L2 heap fixes it, since the heap is only used once the
//! application runs.

use std::fmt;
use std::ops::Range;

use serde::Serialize;
use thiserror::Error;

/// Size of the image header and of each segment record.
pub const RECORD_SIZE: usize = 16;

/// Largest segment count a valid image has.
pub const MAX_SEGMENTS: u32 = 16;

/// L1 memory window.
pub const L1_REGION: Range<u32> = 0x1B00_0000..0x1C00_0000;

/// L2 memory window.
pub const L2_REGION: Range<u32> = 0x1C00_0000..0x1D00_0000;

/// First L1 address used by the bootloader.
pub const BOOTLOADER_L1_START: u32 = 0x1B00_2000;

/// First L2 address used by the bootloader.
pub const BOOTLOADER_L2_START: u32 = 0x1C06_0000;

/// Errors while parsing an image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image truncated: need {needed} bytes, have {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("segment count {0} out of bounds (1..=16), is this really a GAP8 flash image?")]
    SegmentCountOutOfRange(u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One loadable segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Segment {
    /// Offset in flash from the start of the image.
    pub flash_base: u32,
    /// RAM address the segment is copied to.
    pub ram_offset: u32,
    pub size: u32,
    pub block_count: u32,
}

impl Segment {
    /// Last RAM address written, saturating at the top of the address space.
    fn ram_end(&self) -> u32 {
        self.ram_offset.saturating_add(self.size)
    }

    /// Whether the segment reaches into the bootloader's memory.
    pub fn overlaps_bootloader(&self) -> bool {
        if L2_REGION.contains(&self.ram_offset) {
            return self.ram_end() >= BOOTLOADER_L2_START;
        }
        if L1_REGION.contains(&self.ram_offset) {
            return self.ram_end() >= BOOTLOADER_L1_START;
        }
        false
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "base=0x{:X}\toffset=0x{:X}\tsize=0x{:X}\tnBlocks={}",
            self.flash_base, self.ram_offset, self.size, self.block_count
        )
    }
}

/// Parsed image header and segment table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirmwareImage {
    /// Size of the binary up to the partition table.
    pub total_size: u32,
    pub entry_point: u32,
    /// Base of the entry point / interrupt vector.
    pub entry_base: u32,
    pub segments: Vec<Segment>,
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn ensure_len(data: &[u8], needed: usize) -> Result<(), ImageError> {
    if data.len() < needed {
        return Err(ImageError::Truncated {
            needed,
            actual: data.len(),
        });
    }
    Ok(())
}

impl FirmwareImage {
    /// Parse the header and segment table.
    pub fn parse(data: &[u8]) -> Result<Self, ImageError> {
        ensure_len(data, RECORD_SIZE)?;

        let total_size = read_u32(data, 0);
        let segment_count = read_u32(data, 4);
        let entry_point = read_u32(data, 8);
        let entry_base = read_u32(data, 12);

        if segment_count == 0 || segment_count > MAX_SEGMENTS {
            return Err(ImageError::SegmentCountOutOfRange(segment_count));
        }

        let table_end = RECORD_SIZE * (1 + segment_count as usize);
        ensure_len(data, table_end)?;

        let segments = data[RECORD_SIZE..table_end]
            .chunks_exact(RECORD_SIZE)
            .map(|record| Segment {
                flash_base: read_u32(record, 0),
                ram_offset: read_u32(record, 4),
                size: read_u32(record, 8),
                block_count: read_u32(record, 12),
            })
            .collect();

        Ok(Self {
            total_size,
            entry_point,
            entry_base,
            segments,
        })
    }

    /// Read and parse an image file.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ImageError> {
        let data = std::fs::read(path)?;
        Self::parse(&data)
    }

    /// Summarise memory usage and bootloader overlaps.
    pub fn inspect(&self) -> ImageReport {
        let mut total_l1 = 0u64;
        let mut total_l2 = 0u64;
        let mut overlapping = Vec::new();

        for (index, segment) in self.segments.iter().enumerate() {
            if L2_REGION.contains(&segment.ram_offset) {
                total_l2 += u64::from(segment.size);
            } else if L1_REGION.contains(&segment.ram_offset) {
                total_l1 += u64::from(segment.size);
            }
            if segment.overlaps_bootloader() {
                overlapping.push(index);
            }
        }

        ImageReport {
            total_l1,
            total_l2,
            overlapping,
        }
    }
}

/// Result of [`FirmwareImage::inspect`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageReport {
    /// Bytes loaded into L1.
    pub total_l1: u64,
    /// Bytes loaded into L2.
    pub total_l2: u64,
    /// Indices of segments that overlap the bootloader.
    pub overlapping: Vec<usize>,
}

impl ImageReport {
    /// No segment overlaps the bootloader.
    pub fn is_ok(&self) -> bool {
        self.overlapping.is_empty()
    }
}
