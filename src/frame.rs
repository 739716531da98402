//! Camera frame handle and the frame source seam.
//!
//! A [`Frame`] is one buffer of pixel data produced by the camera for one
//! exposure. The camera owns the underlying buffer; the core borrows it via
//! this handle and gives it back exactly once, on every path: success,
//! encode failure, or transport failure. That return is wired through
//! [`Drop`], so ownership does the bookkeeping: moving a `Frame` into the
//! encoder or taking its bytes releases it at the right moment without any
//! manual cleanup calls.
//!
//! [`FrameSource`] is the seam to the camera driver. Production deployments
//! implement it over real hardware; [`TestPatternSource`](crate::synthetic)
//! implements it in software for bench runs and development.

use bytes::Bytes;
use std::fmt;

use crate::Result;

/// Pixel layout of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Already JPEG-compressed; streamed zero-copy.
    Jpeg,
    /// 8-bit grayscale, 1 byte per pixel.
    Gray8,
    /// RGB565, 2 bytes per pixel, big-endian as read off the sensor bus.
    Rgb565,
    /// RGB888, 3 bytes per pixel.
    Rgb888,
}

impl PixelFormat {
    /// Bytes per pixel for raw formats; `None` for compressed data.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Jpeg => None,
            PixelFormat::Gray8 => Some(1),
            PixelFormat::Rgb565 => Some(2),
            PixelFormat::Rgb888 => Some(3),
        }
    }
}

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// A borrowed camera frame: pixel data plus format and dimensions.
///
/// Dropping the frame runs its release hook (if any), returning the buffer
/// to the source. The hook runs exactly once.
pub struct Frame {
    format: PixelFormat,
    width: u32,
    height: u32,
    data: Bytes,
    release: Option<ReleaseHook>,
}

impl Frame {
    /// Create a frame over the given pixel data.
    pub fn new(format: PixelFormat, width: u32, height: u32, data: Bytes) -> Self {
        Self { format, width, height, data, release: None }
    }

    /// Attach a hook that runs exactly once when the frame is released.
    ///
    /// Sources use this to recycle the underlying buffer (and tests use it
    /// to count acquire/release balance).
    pub fn with_release_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(hook));
        self
    }

    /// Pixel layout of the buffer.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Byte length of the frame buffer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the frame buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the frame bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Take the frame bytes, releasing the frame immediately.
    ///
    /// The returned `Bytes` is a zero-copy handle that stays valid after the
    /// release; the source is only told the frame slot is free again.
    pub fn into_data(mut self) -> Bytes {
        std::mem::take(&mut self.data)
        // `self` drops here, running the release hook
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(hook) = self.release.take() {
            hook();
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Trait for camera frame sources.
///
/// The single operation mirrors the hardware frame buffer: ask for the next
/// exposure, get a [`Frame`] or an error when none is available. There is no
/// retry inside the core; a streaming request that hits
/// [`RoverError::FrameUnavailable`](crate::RoverError::FrameUnavailable)
/// terminates and the client reconnects.
#[async_trait::async_trait]
pub trait FrameSource: Send + Sync {
    /// Acquire the next frame from the camera.
    async fn acquire(&self) -> Result<Frame>;
}
