//! Built-in backends for running without camera or PWM hardware.
//!
//! [`TestPatternSource`] renders a moving gradient at whatever resolution
//! and format the sensor settings call for, so the full pipeline (capture,
//! streaming, framesize and quality commands) can be exercised on a
//! workstation. [`TracePwm`] logs duty writes instead of touching a
//! peripheral. Real deployments swap both for hardware-backed
//! implementations of the same traits.

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::actuator::{PwmBackend, PwmChannel, lock_sensor};
use crate::encoder::encode_jpeg;
use crate::frame::{Frame, FrameSource, PixelFormat};
use crate::sensor::SensorControl;
use crate::Result;

/// Software frame source rendering a moving diagonal gradient.
pub struct TestPatternSource {
    sensor: Arc<Mutex<dyn SensorControl>>,
    counter: AtomicU64,
}

impl TestPatternSource {
    /// Create a pattern source that follows the given sensor settings.
    pub fn new(sensor: Arc<Mutex<dyn SensorControl>>) -> Self {
        Self { sensor, counter: AtomicU64::new(0) }
    }

    fn render(&self, width: u32, height: u32, format: PixelFormat, tick: u64) -> Vec<u8> {
        let shift = (tick * 7) as u32;
        let mut gray = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                gray.push(((x + y + shift) % 256) as u8);
            }
        }
        match format {
            PixelFormat::Gray8 | PixelFormat::Jpeg => gray,
            PixelFormat::Rgb888 => gray.iter().flat_map(|&v| [v, v, v]).collect(),
            PixelFormat::Rgb565 => gray
                .iter()
                .flat_map(|&v| {
                    let v = v as u16;
                    let packed = ((v >> 3) << 11) | ((v >> 2) << 5) | (v >> 3);
                    packed.to_be_bytes()
                })
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl FrameSource for TestPatternSource {
    async fn acquire(&self) -> Result<Frame> {
        let (format, size, quality) = {
            let sensor = lock_sensor(&self.sensor);
            (sensor.pixel_format(), sensor.frame_size(), sensor.quality())
        };
        let (width, height) = size.dimensions();
        let tick = self.counter.fetch_add(1, Ordering::Relaxed);
        let pixels = self.render(width, height, format, tick);

        if format == PixelFormat::Jpeg {
            // OV-style quality registers count down (0 = finest); invert
            // for the encoder's 1-100 scale
            let jpeg_quality = (100 - quality.min(63)).max(1);
            let raw = Frame::new(PixelFormat::Gray8, width, height, Bytes::from(pixels));
            let encoded = encode_jpeg(raw, jpeg_quality)?;
            return Ok(Frame::new(PixelFormat::Jpeg, width, height, encoded.bytes()));
        }

        Ok(Frame::new(format, width, height, Bytes::from(pixels)))
    }
}

/// PWM backend that logs duty writes instead of driving hardware.
#[derive(Debug, Default)]
pub struct TracePwm;

impl PwmBackend for TracePwm {
    fn write_duty(&mut self, channel: PwmChannel, duty: u32) {
        debug!("pwm channel {} ({:?}) duty {}", channel.id(), channel, duty);
    }
}
