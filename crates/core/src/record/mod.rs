//! Recording: a fixed-resolution capture target plus the audio tap, muxed
//! into a single AVI artifact when the recording stops.

mod avi;

pub use avi::{pcm16, AviFormat, AviWriter};

use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use glam::UVec2;
use image::{buffer::ConvertBuffer, codecs::jpeg::JpegEncoder, ExtendedColorType, RgbImage};
use serde::Serialize;

use crate::{
    audio::{AudioEngine, AudioTap},
    config::CaptureConfig,
    render::{Renderer, TargetKind},
    RecordingError, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Idle,
    Recording,
    Finalizing,
}

/// The finished audio+video container.
#[derive(Debug, Clone)]
pub struct RecordingArtifact {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub video_frames: u32,
    pub audio_samples: u32,
}

impl RecordingArtifact {
    /// Writes the artifact. A directory `path` receives the suggested file
    /// name; anything else is used as the file path.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        let target = if path.is_dir() {
            path.join(&self.file_name)
        } else {
            path.to_path_buf()
        };
        fs::write(&target, &self.bytes)?;
        tracing::info!(path = %target.display(), bytes = self.bytes.len(), "recording saved");
        Ok(target)
    }
}

/// Everything held while a recording is active.
struct RecordingSession {
    writer: AviWriter,
    tap: AudioTap,
    tap_open: bool,
    started: Option<Duration>,
    samples: Vec<f32>,
    pcm: Vec<u8>,
    jpeg: Vec<u8>,
}

impl RecordingSession {
    fn flush_audio(&mut self) -> std::result::Result<(), RecordingError> {
        if self.tap_open && !self.tap.drain_into(&mut self.samples) {
            tracing::debug!("audio tap closed, continuing with video only");
            self.tap_open = false;
        }
        if self.samples.is_empty() {
            return Ok(());
        }
        self.pcm.clear();
        pcm16(&self.samples, &mut self.pcm);
        self.samples.clear();
        self.writer.push_audio(&self.pcm)
    }
}

/// Starts, feeds and finalises recordings.
pub struct CaptureController {
    config: CaptureConfig,
    session: Option<RecordingSession>,
    status: RecordingStatus,
    artifact: Option<RecordingArtifact>,
}

impl CaptureController {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            session: None,
            status: RecordingStatus::Idle,
            artifact: None,
        }
    }

    pub fn status(&self) -> RecordingStatus {
        self.status
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Artifact of the last completed recording.
    pub fn artifact(&self) -> Option<&RecordingArtifact> {
        self.artifact.as_ref()
    }

    pub fn take_artifact(&mut self) -> Option<RecordingArtifact> {
        self.artifact.take()
    }

    /// Allocates the capture target and opens the audio tap.
    pub fn start_recording(
        &mut self,
        engine: &mut AudioEngine,
        renderer: &mut Renderer,
        permitted: bool,
    ) -> std::result::Result<(), RecordingError> {
        if !permitted {
            return Err(RecordingError::NotPermitted);
        }
        if self.session.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }
        let tap = engine.open_tap()?;

        let format = AviFormat {
            width: self.config.width,
            height: self.config.height,
            fps: self.config.fps.max(1),
            sample_rate: tap.sample_rate(),
        };
        renderer.begin_capture(UVec2::new(format.width, format.height));
        self.artifact = None;
        self.session = Some(RecordingSession {
            writer: AviWriter::new(format),
            tap,
            tap_open: true,
            started: None,
            samples: Vec::new(),
            pcm: Vec::new(),
            jpeg: Vec::new(),
        });
        self.status = RecordingStatus::Recording;
        tracing::info!(
            width = format.width,
            height = format.height,
            fps = format.fps,
            sample_rate = format.sample_rate,
            "recording started"
        );
        Ok(())
    }

    /// Feeds one tick into the active recording: drains the audio tap and
    /// samples the capture target onto the fixed frame-rate grid, repeating
    /// or skipping frames as the host timestamps require. A failure aborts
    /// the recording without producing an artifact.
    pub fn capture(
        &mut self,
        engine: &mut AudioEngine,
        renderer: &mut Renderer,
        now: Duration,
    ) -> std::result::Result<(), RecordingError> {
        let quality = self.config.jpeg_quality.clamp(1, 100);
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let result = Self::capture_into(session, renderer, now, quality);
        if let Err(err) = &result {
            tracing::warn!(%err, "recording aborted");
            self.release(engine, renderer);
        }
        result
    }

    fn capture_into(
        session: &mut RecordingSession,
        renderer: &Renderer,
        now: Duration,
        quality: u8,
    ) -> std::result::Result<(), RecordingError> {
        session.flush_audio()?;

        let started = *session.started.get_or_insert(now);
        let fps = session.writer.format().fps as f64;
        let due = ((now.saturating_sub(started)).as_secs_f64() * fps).floor() as u64 + 1;
        let pending = due.saturating_sub(session.writer.video_frames() as u64);
        if pending == 0 {
            return Ok(());
        }
        let Some(image) = renderer.snapshot(TargetKind::Capture) else {
            return Ok(());
        };
        if image.width() == 0 || image.height() == 0 {
            return Ok(());
        }

        let rgb: RgbImage = image.convert();
        session.jpeg.clear();
        JpegEncoder::new_with_quality(&mut session.jpeg, quality)
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
            .map_err(|err| RecordingError::StreamCreationFailure(err.to_string()))?;
        if pending > 1 {
            tracing::debug!(
                repeated = pending - 1,
                "capture frame repeated to hold the frame rate"
            );
        }
        for _ in 0..pending {
            session.writer.push_video(&session.jpeg)?;
        }
        Ok(())
    }

    /// Finalises the artifact and releases the capture target and audio
    /// tap. No-op when not recording.
    pub fn stop_recording(
        &mut self,
        engine: &mut AudioEngine,
        renderer: &mut Renderer,
    ) -> Option<&RecordingArtifact> {
        let mut session = self.session.take()?;
        self.status = RecordingStatus::Finalizing;

        let flushed = session.flush_audio();
        engine.close_tap();
        renderer.end_capture();
        self.status = RecordingStatus::Idle;
        if let Err(err) = flushed {
            tracing::warn!(%err, "recording could not be finalised");
            return None;
        }

        let video_frames = session.writer.video_frames();
        let audio_samples = session.writer.audio_samples();
        let bytes = session.writer.finish();
        tracing::info!(video_frames, audio_samples, bytes = bytes.len(), "recording stopped");
        self.artifact = Some(RecordingArtifact {
            bytes,
            file_name: suggested_file_name(),
            video_frames,
            audio_samples,
        });
        self.artifact.as_ref()
    }

    /// Drops the active recording without producing an artifact.
    pub fn abort(&mut self, engine: &mut AudioEngine, renderer: &mut Renderer) {
        if self.session.is_some() {
            tracing::info!("recording discarded");
            self.release(engine, renderer);
        }
    }

    fn release(&mut self, engine: &mut AudioEngine, renderer: &mut Renderer) {
        self.session = None;
        engine.close_tap();
        renderer.end_capture();
        self.status = RecordingStatus::Idle;
    }
}

impl std::fmt::Debug for CaptureController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureController")
            .field("config", &self.config)
            .field("status", &self.status)
            .field("artifact", &self.artifact.as_ref().map(|a| &a.file_name))
            .finish()
    }
}

fn suggested_file_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!("visualiser-recording-{millis}.avi")
}
