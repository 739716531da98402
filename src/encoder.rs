//! JPEG encoding for the capture and streaming paths.
//!
//! Frames that are already JPEG pass through zero-copy; raw formats are
//! transcoded with the `image` crate. Transcoding consumes the [`Frame`],
//! which releases it back to the source; the freshly allocated JPEG buffer
//! is what travels on. The encoded image is consumed either whole
//! ([`JpegImage::bytes`]) or as a finite, non-restartable sequence of byte
//! chunks ([`JpegImage::chunks`]) with at most one chunk materialized at a
//! time.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, ImageBuffer, RgbImage};

use crate::frame::{Frame, PixelFormat};
use crate::{Result, RoverError};

/// Fixed quality used when transcoding raw frames for streaming and capture.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Chunk size for the chunked capture path.
pub(crate) const ENCODE_CHUNK_SIZE: usize = 4096;

/// A JPEG ready to send: either the camera's own bytes or a transcode.
///
/// `Native` keeps the [`Frame`] alive until the image is dropped, so the
/// buffer is released only after its bytes have gone out. `Transcoded` owns
/// a new buffer; the source frame was already released by the transcode.
#[derive(Debug)]
pub enum JpegImage {
    /// The frame was already JPEG; its bytes are used directly.
    Native(Frame),
    /// The frame was raw and has been compressed into a new buffer.
    Transcoded(Bytes),
}

impl JpegImage {
    /// Byte length of the JPEG payload.
    pub fn len(&self) -> usize {
        match self {
            JpegImage::Native(frame) => frame.len(),
            JpegImage::Transcoded(data) => data.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero-copy handle to the JPEG bytes.
    pub fn bytes(&self) -> Bytes {
        match self {
            JpegImage::Native(frame) => frame.data().clone(),
            JpegImage::Transcoded(data) => data.clone(),
        }
    }

    /// Consume the image into a chunk iterator.
    ///
    /// The sequence is finite and cannot be restarted. A native frame stays
    /// held until the iterator is dropped.
    pub fn chunks(self, chunk_size: usize) -> JpegChunks {
        match self {
            JpegImage::Native(frame) => {
                let data = frame.data().clone();
                JpegChunks { data, pos: 0, chunk_size, _frame: Some(frame) }
            }
            JpegImage::Transcoded(data) => JpegChunks { data, pos: 0, chunk_size, _frame: None },
        }
    }
}

/// Finite iterator over the byte chunks of an encoded JPEG.
#[derive(Debug)]
pub struct JpegChunks {
    data: Bytes,
    pos: usize,
    chunk_size: usize,
    _frame: Option<Frame>,
}

impl Iterator for JpegChunks {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.pos >= self.data.len() {
            return None;
        }
        let end = (self.pos + self.chunk_size).min(self.data.len());
        let chunk = self.data.slice(self.pos..end);
        self.pos = end;
        Some(chunk)
    }
}

/// Encode a frame as JPEG, passing native JPEG frames through untouched.
///
/// Raw frames are compressed at `quality` (1–100); the frame is released as
/// part of the transcode. Fails when the buffer length does not match the
/// frame dimensions or the compressor rejects the data.
pub fn encode_jpeg(frame: Frame, quality: u8) -> Result<JpegImage> {
    if frame.format() == PixelFormat::Jpeg {
        return Ok(JpegImage::Native(frame));
    }
    let encoded = transcode(&frame, quality)?;
    // dropping `frame` here releases it; only the new buffer travels on
    Ok(JpegImage::Transcoded(Bytes::from(encoded)))
}

fn transcode(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let (width, height) = (frame.width(), frame.height());
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);

    match frame.format() {
        PixelFormat::Gray8 => {
            let img: GrayImage = ImageBuffer::from_raw(width, height, frame.data().to_vec())
                .ok_or_else(|| buffer_mismatch(frame))?;
            encoder.encode_image(&img).map_err(|e| RoverError::encode(e.to_string()))?;
        }
        PixelFormat::Rgb888 => {
            let img: RgbImage = ImageBuffer::from_raw(width, height, frame.data().to_vec())
                .ok_or_else(|| buffer_mismatch(frame))?;
            encoder.encode_image(&img).map_err(|e| RoverError::encode(e.to_string()))?;
        }
        PixelFormat::Rgb565 => {
            let rgb = rgb565_to_rgb888(frame.data());
            let img: RgbImage = ImageBuffer::from_raw(width, height, rgb)
                .ok_or_else(|| buffer_mismatch(frame))?;
            encoder.encode_image(&img).map_err(|e| RoverError::encode(e.to_string()))?;
        }
        PixelFormat::Jpeg => {
            return Err(RoverError::encode("frame is already JPEG-encoded"));
        }
    }

    Ok(out)
}

fn buffer_mismatch(frame: &Frame) -> RoverError {
    RoverError::encode(format!(
        "{}-byte buffer does not match {}x{} {:?} frame",
        frame.len(),
        frame.width(),
        frame.height(),
        frame.format(),
    ))
}

/// Expand big-endian RGB565 (as read off the sensor bus) to RGB888.
fn rgb565_to_rgb888(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2 * 3);
    for pair in data.chunks_exact(2) {
        let v = u16::from_be_bytes([pair[0], pair[1]]);
        let r5 = ((v >> 11) & 0x1f) as u8;
        let g6 = ((v >> 5) & 0x3f) as u8;
        let b5 = (v & 0x1f) as u8;
        out.push((r5 << 3) | (r5 >> 2));
        out.push((g6 << 2) | (g6 >> 4));
        out.push((b5 << 3) | (b5 >> 2));
    }
    out
}
