//! MJPEG streaming: multipart framing and the per-client streaming loop.
//!
//! Each connected client gets its own loop: acquire a frame, encode it,
//! frame it inside the multipart boundary, write it to the sink, forever.
//! The loop is a two-state machine: [`StreamState::Streaming`] until a
//! write, acquire, or encode failure flips it to
//! [`StreamState::Terminated`]. There is deliberately no timeout and no
//! frame-rate cap: throughput is bounded by the camera and the transport,
//! and the only way a healthy stream ends is the peer disconnecting.

use bytes::Bytes;
use std::time::Instant;
use tracing::{trace, warn};

use crate::encoder::encode_jpeg;
use crate::frame::FrameSource;
use crate::sink::ChunkSink;

/// Boundary separating successive images in the `x-mixed-replace` stream.
///
/// Clients key on this exact string; it is part of the wire contract.
pub const PART_BOUNDARY: &str = "123456789000000000000987654321";

/// Content type of the stream response.
pub const STREAM_CONTENT_TYPE: &str =
    "multipart/x-mixed-replace;boundary=123456789000000000000987654321";

/// Boundary terminator written after each frame's payload.
const STREAM_BOUNDARY: &str = "\r\n--123456789000000000000987654321\r\n";

/// Per-frame part header. The declared length must equal the byte length of
/// the JPEG payload that follows.
pub fn part_header(payload_len: usize) -> String {
    format!("Content-Type: image/jpeg\r\nContent-Length: {payload_len}\r\n\r\n")
}

/// State of one streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Frames are flowing.
    Streaming,
    /// The loop has ended; the connection is done.
    Terminated,
}

/// Why a streaming loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The frame source had nothing to hand out.
    SourceFailed,
    /// Transcoding a frame failed.
    EncodeFailed,
    /// A chunk write failed because the peer disconnected.
    TransportClosed,
}

/// Summary of a finished streaming loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    /// Complete frames delivered before termination.
    pub frames_sent: u64,
    /// What ended the loop.
    pub reason: StopReason,
}

/// Run the MJPEG loop until the transport, source, or encoder fails.
///
/// Per iteration: one acquire, one encode, three writes (header, payload,
/// boundary terminator). Frame buffers are released on every exit path by
/// ownership; a failed write drops the image before the loop ends.
pub async fn run_mjpeg_stream<S: ChunkSink>(
    source: &dyn FrameSource,
    sink: &mut S,
    quality: u8,
) -> StreamStats {
    let mut state = StreamState::Streaming;
    let mut reason = StopReason::TransportClosed;
    let mut frames_sent = 0u64;
    let mut last_frame = Instant::now();

    while state == StreamState::Streaming {
        let frame = match source.acquire().await {
            Ok(frame) => frame,
            Err(e) => {
                warn!("frame acquisition failed, ending stream: {e}");
                reason = StopReason::SourceFailed;
                state = StreamState::Terminated;
                continue;
            }
        };

        let image = match encode_jpeg(frame, quality) {
            Ok(image) => image,
            Err(e) => {
                warn!("encode failed, ending stream: {e}");
                reason = StopReason::EncodeFailed;
                state = StreamState::Terminated;
                continue;
            }
        };

        let payload = image.bytes();
        let payload_len = payload.len();
        let header = Bytes::from(part_header(payload_len));
        let boundary = Bytes::from_static(STREAM_BOUNDARY.as_bytes());

        let written = async {
            sink.write_chunk(header).await?;
            sink.write_chunk(payload).await?;
            sink.write_chunk(boundary).await
        }
        .await;
        // release the frame (or free the transcode buffer) before deciding
        // whether to continue
        drop(image);

        match written {
            Ok(()) => {
                frames_sent += 1;
                let frame_time = last_frame.elapsed();
                last_frame = Instant::now();
                let ms = frame_time.as_millis();
                trace!(
                    "MJPG: {}B {}ms ({:.1}fps)",
                    payload_len,
                    ms,
                    if ms > 0 { 1000.0 / ms as f64 } else { f64::INFINITY },
                );
            }
            Err(_) => {
                reason = StopReason::TransportClosed;
                state = StreamState::Terminated;
            }
        }
    }

    trace!("stream ended after {frames_sent} frames ({reason:?})");
    StreamStats { frames_sent, reason }
}
