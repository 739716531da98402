//! Sensor configuration surface.
//!
//! The camera sensor exposes a small get/set surface: output frame size and
//! JPEG quality. [`SensorControl`] abstracts it so the control endpoint and
//! the status endpoint work against the simulator as well as real hardware.

use serde::{Deserialize, Serialize};

use crate::frame::PixelFormat;
use crate::{Result, RoverError};

/// Sensor output resolutions, indexed the way OV-series drivers number them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FrameSize {
    /// 160x120
    Qqvga,
    /// 128x160
    Qqvga2,
    /// 176x144
    Qcif,
    /// 240x176
    Hqvga,
    /// 320x240
    Qvga,
    /// 400x296
    Cif,
    /// 640x480
    Vga,
    /// 800x600
    Svga,
    /// 1024x768
    Xga,
    /// 1280x1024
    Sxga,
    /// 1600x1200
    Uxga,
}

impl FrameSize {
    const ALL: [FrameSize; 11] = [
        FrameSize::Qqvga,
        FrameSize::Qqvga2,
        FrameSize::Qcif,
        FrameSize::Hqvga,
        FrameSize::Qvga,
        FrameSize::Cif,
        FrameSize::Vga,
        FrameSize::Svga,
        FrameSize::Xga,
        FrameSize::Sxga,
        FrameSize::Uxga,
    ];

    /// Look up a frame size by its wire index, as sent by the control page.
    pub fn from_index(index: i64) -> Option<Self> {
        usize::try_from(index).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    /// Wire index of this frame size.
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Output dimensions in pixels (width, height).
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            FrameSize::Qqvga => (160, 120),
            FrameSize::Qqvga2 => (128, 160),
            FrameSize::Qcif => (176, 144),
            FrameSize::Hqvga => (240, 176),
            FrameSize::Qvga => (320, 240),
            FrameSize::Cif => (400, 296),
            FrameSize::Vga => (640, 480),
            FrameSize::Svga => (800, 600),
            FrameSize::Xga => (1024, 768),
            FrameSize::Sxga => (1280, 1024),
            FrameSize::Uxga => (1600, 1200),
        }
    }
}

/// Current sensor settings as reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorStatus {
    /// Wire index of the active frame size.
    pub framesize: u8,
    /// Active JPEG quality register value (0 = finest).
    pub quality: u8,
}

/// Trait for the sensor configuration object.
///
/// Setters return an error when the sensor rejects the value, which the
/// control endpoint surfaces as a 500, matching the nonzero result codes of
/// the hardware driver.
pub trait SensorControl: Send {
    /// Pixel format the sensor is currently producing.
    fn pixel_format(&self) -> PixelFormat;

    /// Active output resolution.
    fn frame_size(&self) -> FrameSize;

    /// Change the output resolution.
    fn set_frame_size(&mut self, size: FrameSize) -> Result<()>;

    /// Active quality register value.
    fn quality(&self) -> u8;

    /// Change the quality register. Sensor-defined range; OV-series parts
    /// accept 0–63 with lower meaning finer.
    fn set_quality(&mut self, quality: i64) -> Result<()>;

    /// Snapshot for the status endpoint.
    fn status(&self) -> SensorStatus {
        SensorStatus { framesize: self.frame_size().index(), quality: self.quality() }
    }
}

/// In-memory sensor settings, used by the synthetic camera and by tests.
///
/// Real hardware backends implement [`SensorControl`] over the driver's
/// register interface instead.
#[derive(Debug, Clone)]
pub struct StaticSensor {
    format: PixelFormat,
    size: FrameSize,
    quality: u8,
}

impl StaticSensor {
    /// Maximum accepted quality register value.
    pub const QUALITY_MAX: i64 = 63;

    /// Create sensor settings with the given output format.
    pub fn new(format: PixelFormat, size: FrameSize, quality: u8) -> Self {
        Self { format, size, quality }
    }
}

impl Default for StaticSensor {
    /// JPEG output at CIF, quality 10: the boot defaults of the rover.
    fn default() -> Self {
        Self::new(PixelFormat::Jpeg, FrameSize::Cif, 10)
    }
}

impl SensorControl for StaticSensor {
    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn frame_size(&self) -> FrameSize {
        self.size
    }

    fn set_frame_size(&mut self, size: FrameSize) -> Result<()> {
        self.size = size;
        Ok(())
    }

    fn quality(&self) -> u8 {
        self.quality
    }

    fn set_quality(&mut self, quality: i64) -> Result<()> {
        if !(0..=Self::QUALITY_MAX).contains(&quality) {
            return Err(RoverError::sensor(
                "quality",
                format!("value {quality} outside 0..={}", Self::QUALITY_MAX),
            ));
        }
        self.quality = quality as u8;
        Ok(())
    }
}
