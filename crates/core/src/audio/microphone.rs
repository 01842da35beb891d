//! Live capture seam.
//!
//! A [`CaptureDevice`] stands in for the platform permission prompt: asking
//! it for access either yields a running [`LiveSource`] or fails with
//! [`SourceError::PermissionDenied`]. The cpal-backed device is only built
//! with the `microphone` feature.

use std::{
    collections::VecDeque,
    fmt,
    sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError},
    thread::JoinHandle,
};

use super::source::{SampleSource, SourceKind};
use crate::SourceError;

/// Seconds of audio a sink holds before dropping the oldest samples.
const SINK_SECONDS: usize = 2;

/// Platform capture facility.
pub trait CaptureDevice: Send + Sync {
    /// Requests capture permission and starts streaming on success.
    fn request_access(&self) -> Result<Box<dyn SampleSource>, SourceError>;
}

/// The capture device compiled into this build, if any.
pub fn default_capture_device() -> Option<Arc<dyn CaptureDevice>> {
    #[cfg(feature = "microphone")]
    {
        Some(Arc::new(CpalMicrophone))
    }
    #[cfg(not(feature = "microphone"))]
    {
        None
    }
}

/// Bounded mono sample queue filled by a capture callback and drained by the
/// engine once per tick.
#[derive(Clone)]
pub struct SampleSink {
    queue: Arc<Mutex<VecDeque<f32>>>,
    capacity: usize,
}

impl SampleSink {
    pub fn new(sample_rate: u32) -> Self {
        let capacity = (sample_rate as usize).max(1) * SINK_SECONDS;
        Self {
            queue: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Pushes interleaved frames, averaging `channels` down to mono.
    pub fn push_interleaved<I>(&self, samples: I, channels: usize)
    where
        I: IntoIterator<Item = f32>,
    {
        let channels = channels.max(1);
        let mut queue = self.lock();
        let mut acc = 0.0;
        let mut count = 0;
        for sample in samples {
            acc += sample;
            count += 1;
            if count == channels {
                queue.push_back(acc / channels as f32);
                acc = 0.0;
                count = 0;
            }
        }
        let overflow = queue.len().saturating_sub(self.capacity);
        queue.drain(..overflow);
    }

    pub fn drain_into(&self, out: &mut Vec<f32>) {
        out.extend(self.lock().drain(..));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // The audio callback cannot report a poisoned lock, so keep the data.
    fn lock(&self) -> MutexGuard<'_, VecDeque<f32>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SampleSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleSink")
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Source backed by a capture callback that runs elsewhere.
///
/// The platform stream lives on a worker thread that parks until it is told to
/// stop; releasing (or dropping) the source stops it and joins the worker.
pub struct LiveSource {
    sample_rate: u32,
    sink: SampleSink,
    stop: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl LiveSource {
    pub fn new(
        sample_rate: u32,
        sink: SampleSink,
        stop: Option<mpsc::Sender<()>>,
        worker: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            sample_rate,
            sink,
            stop,
            worker,
        }
    }

    /// Source with no worker, fed directly through `sink`.
    pub fn from_sink(sample_rate: u32, sink: SampleSink) -> Self {
        Self::new(sample_rate, sink, None, None)
    }

    pub fn is_running(&self) -> bool {
        self.stop.is_some() || self.worker.is_some()
    }
}

impl SampleSource for LiveSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Microphone
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn pull(&mut self, out: &mut Vec<f32>) {
        self.sink.drain_into(out);
    }

    fn release(&mut self) {
        if let Some(stop) = self.stop.take() {
            // A worker that already exited has dropped its receiver.
            let _ = stop.send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("capture worker panicked");
            }
        }
        let mut discarded = Vec::new();
        self.sink.drain_into(&mut discarded);
    }
}

impl Drop for LiveSource {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for LiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSource")
            .field("sample_rate", &self.sample_rate)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(feature = "microphone")]
pub use cpal_input::CpalMicrophone;

#[cfg(feature = "microphone")]
mod cpal_input {
    use std::{sync::mpsc, thread};

    use cpal::{
        traits::{DeviceTrait, HostTrait, StreamTrait},
        SampleFormat,
    };

    use super::{CaptureDevice, LiveSource, SampleSink};
    use crate::{audio::SampleSource, SourceError};

    /// Default input device of the default cpal host.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct CpalMicrophone;

    impl CaptureDevice for CpalMicrophone {
        fn request_access(&self) -> Result<Box<dyn SampleSource>, SourceError> {
            let (ready_tx, ready_rx) = mpsc::channel();
            let (stop_tx, stop_rx) = mpsc::channel::<()>();

            let worker = thread::Builder::new()
                .name("microphone".into())
                .spawn(move || match open_stream() {
                    Ok((stream, sink, sample_rate)) => {
                        let _ = ready_tx.send(Ok((sink, sample_rate)));
                        // Parks until the source is released or dropped.
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                    }
                })
                .map_err(SourceError::decode)?;

            let (sink, sample_rate) = ready_rx
                .recv()
                .map_err(|_| SourceError::PermissionDenied)??;
            tracing::info!(sample_rate, "microphone capture started");
            Ok(Box::new(LiveSource::new(
                sample_rate,
                sink,
                Some(stop_tx),
                Some(worker),
            )))
        }
    }

    fn open_stream() -> Result<(cpal::Stream, SampleSink, u32), SourceError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(SourceError::PermissionDenied)?;
        let supported = device
            .default_input_config()
            .map_err(|_| SourceError::PermissionDenied)?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let config = supported.config();
        let sink = SampleSink::new(sample_rate);

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let sink = sink.clone();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        sink.push_interleaved(data.iter().copied(), channels)
                    },
                    stream_error,
                    None,
                )
            }
            SampleFormat::I16 => {
                let sink = sink.clone();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        sink.push_interleaved(
                            data.iter().map(|&sample| sample as f32 / i16::MAX as f32),
                            channels,
                        )
                    },
                    stream_error,
                    None,
                )
            }
            other => {
                return Err(SourceError::decode(format!(
                    "unsupported input sample format {other:?}"
                )))
            }
        }
        .map_err(|_| SourceError::PermissionDenied)?;

        stream.play().map_err(|_| SourceError::PermissionDenied)?;
        Ok((stream, sink, sample_rate))
    }

    fn stream_error(err: cpal::StreamError) {
        tracing::warn!(%err, "microphone stream error");
    }
}
