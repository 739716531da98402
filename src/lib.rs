//! Camera rover control service: MJPEG streaming, still capture, and
//! actuator commands over HTTP.
//!
//! Rovercam drives a camera-equipped rover from a browser: a live
//! `multipart/x-mixed-replace` video stream, a single-shot `/capture`
//! endpoint, and a `/control` endpoint that maps query parameters onto
//! drive motors, servos, and the auxiliary light.
//!
//! # Architecture
//!
//! The hardware sits behind three narrow traits ([`FrameSource`],
//! [`SensorControl`], and [`PwmBackend`]), so the same pipeline runs
//! against real peripherals or the built-in synthetic backends:
//!
//! - [`stream`]: the per-client MJPEG loop and multipart framing
//! - [`capture`]: the single-shot encode-and-send path
//! - [`actuator`]: command parsing, clamping, and the drive state machine
//! - [`encoder`]: zero-copy JPEG pass-through or `image`-crate transcode
//! - [`server`]: the axum routers and the two-listener lifecycle
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rovercam::{
//!     CameraServer, SensorControl, ServerConfig, StaticSensor, TestPatternSource, TracePwm,
//! };
//! use std::sync::{Arc, Mutex};
//!
//! #[tokio::main]
//! async fn main() -> rovercam::Result<()> {
//!     let sensor: Arc<Mutex<dyn SensorControl>> =
//!         Arc::new(Mutex::new(StaticSensor::default()));
//!     let source = Arc::new(TestPatternSource::new(Arc::clone(&sensor)));
//!
//!     let server =
//!         CameraServer::new(ServerConfig::default(), source, sensor, Box::new(TracePwm));
//!     server.serve().await
//! }
//! ```

// Core pipeline
pub mod capture;
pub mod encoder;
pub mod frame;
pub mod sink;
pub mod stream;

// Command surface
pub mod actuator;
pub mod sensor;

// Service shell
pub mod config;
mod error;
pub mod server;
pub mod synthetic;

#[cfg(test)]
pub(crate) mod test_utils;

// Core exports
pub use error::{Result, RoverError};
pub use frame::{Frame, FrameSource, PixelFormat};

// Pipeline exports
pub use capture::{CAPTURE_DISPOSITION, CaptureBody, CaptureImage, capture_jpeg};
pub use encoder::{DEFAULT_JPEG_QUALITY, JpegChunks, JpegImage, encode_jpeg};
pub use sink::{ChannelSink, ChunkSink, TransportClosed};
pub use stream::{
    PART_BOUNDARY, STREAM_CONTENT_TYPE, StopReason, StreamState, StreamStats, part_header,
    run_mjpeg_stream,
};

// Command surface exports
pub use actuator::{
    Actuator, CarAction, DriveDirection, PwmBackend, PwmChannel, SettleDelays, Variable,
};
pub use sensor::{FrameSize, SensorControl, SensorStatus, StaticSensor};

// Service shell exports
pub use config::ServerConfig;
pub use server::{AppState, CameraServer, control_router, stream_router};
pub use synthetic::{TestPatternSource, TracePwm};
