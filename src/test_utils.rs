//! Test doubles for the hardware seams: a scripted frame source that counts
//! acquire/release balance, a sink with injectable write failures, and a
//! PWM recorder.

use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::actuator::{PwmBackend, PwmChannel};
use crate::frame::{Frame, FrameSource, PixelFormat};
use crate::sink::{ChunkSink, TransportClosed};
use crate::{Result, RoverError};

/// One frame the mock source will hand out.
pub(crate) enum ScriptedFrame {
    Jpeg(Vec<u8>),
    Raw { format: PixelFormat, width: u32, height: u32, data: Vec<u8> },
}

impl ScriptedFrame {
    pub(crate) fn jpeg(data: &[u8]) -> Self {
        ScriptedFrame::Jpeg(data.to_vec())
    }

    pub(crate) fn raw(format: PixelFormat, width: u32, height: u32, data: Vec<u8>) -> Self {
        ScriptedFrame::Raw { format, width, height, data }
    }
}

/// Frame source that plays a script and fails once it runs dry.
///
/// Every handed-out frame carries a release hook incrementing the shared
/// counter, so tests can assert exactly-once release on any code path.
pub(crate) struct MockFrameSource {
    script: Mutex<VecDeque<ScriptedFrame>>,
    acquired: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl MockFrameSource {
    pub(crate) fn new(frames: Vec<ScriptedFrame>) -> Self {
        Self {
            script: Mutex::new(frames.into()),
            acquired: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub(crate) fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl FrameSource for MockFrameSource {
    async fn acquire(&self) -> Result<Frame> {
        let Some(scripted) = self.script.lock().unwrap().pop_front() else {
            return Err(RoverError::FrameUnavailable);
        };
        self.acquired.fetch_add(1, Ordering::SeqCst);

        let frame = match scripted {
            ScriptedFrame::Jpeg(data) => {
                Frame::new(PixelFormat::Jpeg, 8, 8, Bytes::from(data))
            }
            ScriptedFrame::Raw { format, width, height, data } => {
                Frame::new(format, width, height, Bytes::from(data))
            }
        };

        let released = Arc::clone(&self.released);
        Ok(frame.with_release_hook(move || {
            released.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

/// Sink recording every chunk, optionally failing the nth write (0-based).
pub(crate) struct MockSink {
    written: Vec<Bytes>,
    fail_at: Option<usize>,
    writes: usize,
}

impl MockSink {
    pub(crate) fn unlimited() -> Self {
        Self { written: Vec::new(), fail_at: None, writes: 0 }
    }

    pub(crate) fn failing_at(write_index: usize) -> Self {
        Self { written: Vec::new(), fail_at: Some(write_index), writes: 0 }
    }

    pub(crate) fn written(&self) -> &[Bytes] {
        &self.written
    }
}

#[async_trait::async_trait]
impl ChunkSink for MockSink {
    async fn write_chunk(&mut self, chunk: Bytes) -> std::result::Result<(), TransportClosed> {
        let index = self.writes;
        self.writes += 1;
        if self.fail_at == Some(index) {
            return Err(TransportClosed);
        }
        self.written.push(chunk);
        Ok(())
    }
}

/// PWM backend recording every duty write into a shared list.
///
/// Clones share the same recording, so the actuator can own one clone while
/// the test inspects another.
#[derive(Clone)]
pub(crate) struct MockPwm {
    writes: Arc<Mutex<Vec<(PwmChannel, u32)>>>,
}

impl MockPwm {
    pub(crate) fn new() -> (Self, Self) {
        let pwm = Self { writes: Arc::new(Mutex::new(Vec::new())) };
        (pwm.clone(), pwm)
    }

    pub(crate) fn writes(&self) -> Vec<(PwmChannel, u32)> {
        self.writes.lock().unwrap().clone()
    }

    /// Last written duty per channel.
    pub(crate) fn final_duties(&self) -> HashMap<PwmChannel, u32> {
        let mut duties = HashMap::new();
        for (channel, duty) in self.writes.lock().unwrap().iter() {
            duties.insert(*channel, *duty);
        }
        duties
    }
}

impl PwmBackend for MockPwm {
    fn write_duty(&mut self, channel: PwmChannel, duty: u32) {
        self.writes.lock().unwrap().push((channel, duty));
    }
}
