//! Still-image capture: exactly one JPEG per request.
//!
//! Native JPEG frames are sent as a single body with their exact length;
//! raw frames are transcoded and sent through the chunk iterator. Either
//! way the frame is released exactly once: by `into_data` on the direct
//! path, by the transcode on the other.

use bytes::Bytes;
use std::time::Instant;
use tracing::debug;

use crate::Result;
use crate::encoder::{ENCODE_CHUNK_SIZE, JpegChunks, encode_jpeg};
use crate::frame::{FrameSource, PixelFormat};

/// Filename hint attached to capture responses.
pub const CAPTURE_DISPOSITION: &str = "inline; filename=capture.jpg";

/// Body of a capture response.
#[derive(Debug)]
pub enum CaptureBody {
    /// Complete payload, sent with an exact Content-Length.
    Whole(Bytes),
    /// Transcoded payload, sent chunk by chunk.
    Chunked(JpegChunks),
}

/// One captured JPEG, ready to be turned into an HTTP response.
#[derive(Debug)]
pub struct CaptureImage {
    /// Byte length of the JPEG payload.
    pub len: usize,
    /// How the payload travels.
    pub body: CaptureBody,
}

/// Capture a single frame and encode it as JPEG.
///
/// Fails when the source has no frame or the transcode rejects the buffer;
/// the server surfaces either as a 500. Acquired frames are released on
/// every path.
pub async fn capture_jpeg(source: &dyn FrameSource, quality: u8) -> Result<CaptureImage> {
    let started = Instant::now();
    let frame = source.acquire().await?;

    if frame.format() == PixelFormat::Jpeg {
        let len = frame.len();
        let body = frame.into_data();
        debug!("JPG: {}B {}ms", len, started.elapsed().as_millis());
        return Ok(CaptureImage { len, body: CaptureBody::Whole(body) });
    }

    let image = encode_jpeg(frame, quality)?;
    let len = image.len();
    debug!("JPG: {}B {}ms (transcoded)", len, started.elapsed().as_millis());
    Ok(CaptureImage { len, body: CaptureBody::Chunked(image.chunks(ENCODE_CHUNK_SIZE)) })
}
