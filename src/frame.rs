//! Frame codec: raw header/pixel buffers to typed frames.
//!
//! Each read from the camera fills two fixed-size buffers:
//!
//! | Offset | Size | Field                       | Type          |
//! |--------|------|-----------------------------|---------------|
//! | 0      | 4    | `header_id`                 | `u32` LE      |
//! | 4      | 4    | `frame_counter`             | opaque bytes  |
//! | 8      | 4    | `microseconds_high`         | `u32` LE      |
//! | 12     | 4    | `microseconds_low`          | `u32` LE      |
//! | 16     | 4    | `buffer_status`             | `i32` LE      |
//! | 20     | 4    | `reserved`                  | `i32` LE      |
//! | 24     | 4    | `status`                    | `i32` LE      |
//! | 28     | 4    | `bias_status`               | `i32` LE      |
//! | 32     | 32   | `regs`                      | opaque bytes  |
//!
//! and a pixel buffer of `model` signed 16-bit samples, reshaped row-major into
//! a square [`PixelGrid`].

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of the raw frame header in bytes.
pub const HEADER_LEN: usize = 64;

/// Length of the opaque register block at the end of the header.
pub const REGS_LEN: usize = 32;

/// Square grid of signed 16-bit samples, shape `(side, side)`.
pub type PixelGrid = Array2<i16>;

/// Sensor variant, named after its pixel count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraModel {
    /// 32 × 32 sensor.
    #[default]
    #[serde(rename = "1024")]
    Tachyon1024,
    /// 80 × 80 sensor.
    #[serde(rename = "6400")]
    Tachyon6400,
}

impl CameraModel {
    /// Identity string reported by a 1024-pixel camera.
    pub const DESCRIPTION_1024: &'static str = "TACHYON 1024 NEW_INFRARED_TECHN";
    /// Identity string reported by a 6400-pixel camera.
    pub const DESCRIPTION_6400: &'static str = "TACHYON 6400 NEW_INFRARED_TECHN";

    /// Total number of pixels in one frame.
    pub fn pixel_count(self) -> usize {
        match self {
            Self::Tachyon1024 => 1024,
            Self::Tachyon6400 => 6400,
        }
    }

    /// Side length of the square frame (`sqrt(pixel_count)`).
    pub fn frame_side(self) -> usize {
        match self {
            Self::Tachyon1024 => 32,
            Self::Tachyon6400 => 80,
        }
    }

    /// Match the description string from the camera identity.
    pub fn from_description(description: &str) -> Option<Self> {
        match description {
            Self::DESCRIPTION_1024 => Some(Self::Tachyon1024),
            Self::DESCRIPTION_6400 => Some(Self::Tachyon6400),
            _ => None,
        }
    }

    /// Model with the given pixel count.
    pub fn from_pixel_count(pixels: usize) -> Option<Self> {
        match pixels {
            1024 => Some(Self::Tachyon1024),
            6400 => Some(Self::Tachyon6400),
            _ => None,
        }
    }
}

impl fmt::Display for CameraModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tachyon {}", self.pixel_count())
    }
}

/// Decoded 64-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub header_id: u32,
    /// Kept as raw bytes; see [`FrameHeader::internal_frame_counter`].
    pub frame_counter: [u8; 4],
    pub microseconds_high: u32,
    pub microseconds_low: u32,
    pub buffer_status: i32,
    pub reserved: i32,
    pub status: i32,
    pub bias_status: i32,
    pub regs: [u8; REGS_LEN],
}

impl FrameHeader {
    /// Parse the fixed little-endian layout.
    pub fn parse(raw: &[u8; HEADER_LEN]) -> Self {
        let u32_at = |at: usize| u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);
        let i32_at = |at: usize| i32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);

        let mut regs = [0u8; REGS_LEN];
        regs.copy_from_slice(&raw[32..HEADER_LEN]);

        Self {
            header_id: u32_at(0),
            frame_counter: [raw[4], raw[5], raw[6], raw[7]],
            microseconds_high: u32_at(8),
            microseconds_low: u32_at(12),
            buffer_status: i32_at(16),
            reserved: i32_at(20),
            status: i32_at(24),
            bias_status: i32_at(28),
            regs,
        }
    }

    /// Frame counter maintained by the camera firmware.
    ///
    /// The firmware stores it word-swapped: bytes at offsets 4..8 are read in
    /// the order (6, 7, 4, 5) as a little-endian `u32`.
    pub fn internal_frame_counter(&self) -> u32 {
        let [b4, b5, b6, b7] = self.frame_counter;
        u32::from_le_bytes([b6, b7, b4, b5])
    }
}

impl fmt::Display for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Header_ID                 {:#010x}", self.header_id)?;
        writeln!(f, "Frame_counter             {:02x?}", self.frame_counter)?;
        writeln!(f, "Microseconds_counter_high {}", self.microseconds_high)?;
        writeln!(f, "Microseconds_counter_low  {}", self.microseconds_low)?;
        writeln!(f, "Buffer_status             {}", self.buffer_status)?;
        writeln!(f, "Reserved                  {}", self.reserved)?;
        writeln!(f, "Status                    {}", self.status)?;
        writeln!(f, "Bias_status               {}", self.bias_status)?;
        writeln!(f, "REGS                      {:02x?}", self.regs)?;
        write!(
            f,
            "Internal frame counter    {}",
            self.internal_frame_counter()
        )
    }
}

/// One acquisition unit: header plus pixel grid.
///
/// Owns its buffers; nothing is shared with the next read.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub raw_header: [u8; HEADER_LEN],
    pub pixels: PixelGrid,
}

impl Frame {
    /// Build a frame from the buffers filled by one `read_frame` call.
    ///
    /// Returns `None` when `pixels` does not hold exactly `model` samples.
    pub fn decode(model: CameraModel, raw_header: [u8; HEADER_LEN], pixels: Vec<i16>) -> Option<Self> {
        let side = model.frame_side();
        let pixels = Array2::from_shape_vec((side, side), pixels).ok()?;
        Some(Self {
            header: FrameHeader::parse(&raw_header),
            raw_header,
            pixels,
        })
    }

    /// Side length of the square grid.
    pub fn side(&self) -> usize {
        self.pixels.nrows()
    }

    pub fn internal_frame_counter(&self) -> u32 {
        self.header.internal_frame_counter()
    }

    /// Mean pixel value, used by the CLI summary.
    pub fn mean(&self) -> f64 {
        self.pixels.iter().map(|&p| f64::from(p)).sum::<f64>() / self.pixels.len().max(1) as f64
    }
}
