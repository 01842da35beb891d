//! Audio ingestion and the per-tick analysis engine.

mod decode;
mod microphone;
mod source;

pub use decode::{decode_bytes, fetch_url, read_file};
#[cfg(feature = "microphone")]
pub use microphone::CpalMicrophone;
pub use microphone::{default_capture_device, CaptureDevice, LiveSource, SampleSink};
pub use source::{DecodedAudio, DecodedSource, SampleSource, SourceKind, SourceRequest};

use std::{
    fmt,
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc,
    },
    thread,
};

use crate::{
    analysis::{Analyser, AudioFrame, BeatDetector},
    config::AppConfig,
    PlaybackClock, RecordingError, SourceError,
};

type Resolved = Result<Box<dyn SampleSource>, SourceError>;

/// Outcome of an attachment, reported once it completes.
pub type AttachResult = Result<SourceKind, SourceError>;

/// Owns the single active source and turns it into one [`AudioFrame`] per
/// tick.
pub struct AudioEngine {
    analyser: Analyser,
    beat: BeatDetector,
    resolver: SourceResolver,
    source: Option<Box<dyn SampleSource>>,
    pending: Option<PendingAttach>,
    finished: Option<AttachResult>,
    window: Vec<f32>,
    incoming: Vec<f32>,
    frame: AudioFrame,
    tap: Option<Sender<Vec<f32>>>,
}

impl AudioEngine {
    pub fn new(config: &AppConfig, clock: PlaybackClock) -> Self {
        let analyser = Analyser::new(&config.audio);
        let fft_size = analyser.fft_size();
        let bins = analyser.bin_count();
        Self {
            analyser,
            beat: BeatDetector::new(&config.beat),
            resolver: SourceResolver {
                clock,
                capture_device: default_capture_device(),
            },
            source: None,
            pending: None,
            finished: None,
            window: vec![0.0; fft_size],
            incoming: Vec::new(),
            frame: AudioFrame::silent(bins),
            tap: None,
        }
    }

    /// Replaces the capture device used for microphone requests.
    pub fn with_capture_device(mut self, device: Option<Arc<dyn CaptureDevice>>) -> Self {
        self.resolver.capture_device = device;
        self
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.resolver.clock
    }

    pub fn fft_size(&self) -> usize {
        self.analyser.fft_size()
    }

    pub fn bin_count(&self) -> usize {
        self.analyser.bin_count()
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        self.source.as_ref().map(|source| source.kind())
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.source.as_ref().map(|source| source.sample_rate())
    }

    pub fn is_attaching(&self) -> bool {
        self.pending.is_some()
    }

    pub fn trigger_threshold(&self) -> f32 {
        self.beat.trigger_threshold()
    }

    pub fn set_trigger_threshold(&mut self, threshold: f32) {
        self.beat.set_trigger_threshold(threshold);
    }

    /// The frame produced by the most recent tick.
    pub fn frame(&self) -> &AudioFrame {
        &self.frame
    }

    /// Resolves `request` and installs it in place of the current source. On
    /// failure the current source stays attached.
    pub fn attach_source(&mut self, request: SourceRequest) -> AttachResult {
        self.pending = None;
        let kind = request.kind();
        match self.resolver.resolve(request) {
            Ok(source) => {
                self.install(source);
                Ok(kind)
            }
            Err(err) => {
                tracing::warn!(%kind, %err, "source attachment failed");
                Err(err)
            }
        }
    }

    /// Installs an already opened source in place of the current one.
    pub fn install_source(&mut self, source: Box<dyn SampleSource>) -> SourceKind {
        self.pending = None;
        let kind = source.kind();
        self.install(source);
        kind
    }

    /// Resolves `request` on a worker thread. Ticks keep producing frames from
    /// the current source (or silence) until the result is picked up at the
    /// start of a later tick. A newer request supersedes an older one.
    pub fn begin_attach(&mut self, request: SourceRequest) {
        let kind = request.kind();
        let (sender, receiver) = mpsc::channel();
        let resolver = self.resolver.clone();
        let spawned = thread::Builder::new()
            .name("source-attach".into())
            .spawn(move || {
                // The engine may have moved on; nobody listening is fine.
                let _ = sender.send(resolver.resolve(request));
            });

        match spawned {
            Ok(_) => {
                tracing::debug!(%kind, "source attachment pending");
                self.pending = Some(PendingAttach { kind, receiver });
            }
            Err(err) => {
                self.pending = None;
                self.finished = Some(Err(SourceError::decode(err)));
            }
        }
    }

    /// Installs a finished background attachment, if any. Returns the outcome
    /// when one completed during this call.
    pub fn poll_attachment(&mut self) -> Option<AttachResult> {
        let pending = self.pending.as_ref()?;
        let kind = pending.kind;
        let resolved = match pending.receiver.try_recv() {
            Ok(resolved) => resolved,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                Err(SourceError::decode("attachment worker exited early"))
            }
        };
        self.pending = None;

        let outcome = match resolved {
            Ok(source) => {
                self.install(source);
                Ok(kind)
            }
            Err(err) => {
                tracing::warn!(%kind, %err, "source attachment failed");
                Err(err)
            }
        };
        self.finished = Some(outcome.clone());
        Some(outcome)
    }

    /// Takes the outcome of the last background attachment.
    pub fn take_attach_result(&mut self) -> Option<AttachResult> {
        self.finished.take()
    }

    /// Releases the current source and cancels any pending attachment. Safe
    /// to call with nothing attached.
    pub fn detach_source(&mut self) {
        self.pending = None;
        self.tap = None;
        if let Some(mut source) = self.source.take() {
            let kind = source.kind();
            source.release();
            tracing::info!(%kind, "audio source detached");
        }
        self.reset_analysis();
    }

    /// Produces this tick's frame.
    pub fn tick(&mut self) -> &AudioFrame {
        self.poll_attachment();

        let Some(source) = self.source.as_mut() else {
            return &self.frame;
        };

        self.incoming.clear();
        source.pull(&mut self.incoming);
        self.forward_to_tap();
        self.slide_window();

        let AudioFrame {
            frequency_bins,
            time_domain,
            beat_impulse,
        } = &mut self.frame;
        self.analyser.analyse(&self.window, frequency_bins, time_domain);
        *beat_impulse = self.beat.update(frequency_bins);
        &self.frame
    }

    /// Starts duplicating every sample the source delivers into a new audio
    /// tap. Replaces an earlier tap.
    pub fn open_tap(&mut self) -> Result<AudioTap, RecordingError> {
        let sample_rate = self.sample_rate().ok_or(RecordingError::NoSource)?;
        let (sender, receiver) = mpsc::channel();
        self.tap = Some(sender);
        tracing::debug!(sample_rate, "audio tap opened");
        Ok(AudioTap {
            receiver,
            sample_rate,
        })
    }

    pub fn close_tap(&mut self) {
        if self.tap.take().is_some() {
            tracing::debug!("audio tap closed");
        }
    }

    pub fn has_tap(&self) -> bool {
        self.tap.is_some()
    }

    fn install(&mut self, source: Box<dyn SampleSource>) {
        let kind = source.kind();
        let sample_rate = source.sample_rate();
        if let Some(mut previous) = self.source.take() {
            previous.release();
        }
        self.tap = None;
        self.reset_analysis();
        self.source = Some(source);
        tracing::info!(%kind, sample_rate, "audio source attached");
    }

    fn reset_analysis(&mut self) {
        self.analyser.reset();
        self.beat.reset();
        self.window.iter_mut().for_each(|sample| *sample = 0.0);
        self.frame = AudioFrame::silent(self.analyser.bin_count());
    }

    fn forward_to_tap(&mut self) {
        let Some(tap) = &self.tap else {
            return;
        };
        if self.incoming.is_empty() {
            return;
        }
        if tap.send(self.incoming.clone()).is_err() {
            tracing::debug!("audio tap receiver dropped");
            self.tap = None;
        }
    }

    fn slide_window(&mut self) {
        let size = self.window.len();
        let fresh = self.incoming.len();
        if fresh >= size {
            self.window.copy_from_slice(&self.incoming[fresh - size..]);
        } else if fresh > 0 {
            self.window.rotate_left(fresh);
            self.window[size - fresh..].copy_from_slice(&self.incoming);
        }
    }
}

impl fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioEngine")
            .field("analyser", &self.analyser)
            .field("source", &self.source_kind())
            .field("attaching", &self.is_attaching())
            .field("tap", &self.has_tap())
            .finish()
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
        }
    }
}

/// Receiving end of the duplicated source audio.
#[derive(Debug)]
pub struct AudioTap {
    receiver: Receiver<Vec<f32>>,
    sample_rate: u32,
}

impl AudioTap {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Moves every delivered block into `out`. Returns `false` once the
    /// engine side has closed the tap.
    pub fn drain_into(&self, out: &mut Vec<f32>) -> bool {
        loop {
            match self.receiver.try_recv() {
                Ok(block) => out.extend_from_slice(&block),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }
}

struct PendingAttach {
    kind: SourceKind,
    receiver: Receiver<Resolved>,
}

/// Everything needed to turn a request into a source, detached from the
/// engine so it can run on a worker thread.
#[derive(Clone)]
struct SourceResolver {
    clock: PlaybackClock,
    capture_device: Option<Arc<dyn CaptureDevice>>,
}

impl SourceResolver {
    fn resolve(&self, request: SourceRequest) -> Resolved {
        match request {
            SourceRequest::Url(url) => {
                let audio = decode::fetch_url(&url)?;
                Ok(Box::new(DecodedSource::new(SourceKind::Url, audio, self.clock.clone())))
            }
            SourceRequest::File(path) => {
                let audio = decode::read_file(&path)?;
                Ok(Box::new(DecodedSource::new(SourceKind::File, audio, self.clock.clone())))
            }
            SourceRequest::Microphone => match &self.capture_device {
                Some(device) => device.request_access(),
                None => Err(SourceError::PermissionDenied),
            },
        }
    }
}
