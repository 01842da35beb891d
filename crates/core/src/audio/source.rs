use std::{fmt, path::PathBuf, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::PlaybackClock;

/// Where an attached source gets its samples from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Url,
    File,
    Microphone,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Url => "url",
            SourceKind::File => "file",
            SourceKind::Microphone => "microphone",
        };
        f.write_str(name)
    }
}

/// Request to attach a source of a given kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRequest {
    Url(String),
    File(PathBuf),
    Microphone,
}

impl SourceRequest {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceRequest::Url(_) => SourceKind::Url,
            SourceRequest::File(_) => SourceKind::File,
            SourceRequest::Microphone => SourceKind::Microphone,
        }
    }
}

/// A live or decoded stream of mono samples.
pub trait SampleSource: Send {
    fn kind(&self) -> SourceKind;

    fn sample_rate(&self) -> u32;

    /// Appends every sample that became available since the previous call.
    fn pull(&mut self, out: &mut Vec<f32>);

    /// Stops capture/playback and frees platform resources. Must be safe to
    /// call more than once.
    fn release(&mut self);
}

/// Fully decoded mono audio.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Plays decoded audio against a [`PlaybackClock`]. Once the clock runs past
/// the end of the audio the source yields silence.
#[derive(Debug)]
pub struct DecodedSource {
    kind: SourceKind,
    audio: Option<DecodedAudio>,
    sample_rate: u32,
    clock: PlaybackClock,
    origin: Duration,
    cursor: usize,
}

impl DecodedSource {
    pub fn new(kind: SourceKind, audio: DecodedAudio, clock: PlaybackClock) -> Self {
        let origin = clock.elapsed();
        Self {
            kind,
            sample_rate: audio.sample_rate,
            audio: Some(audio),
            clock,
            origin,
            cursor: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn is_released(&self) -> bool {
        self.audio.is_none()
    }
}

impl SampleSource for DecodedSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn pull(&mut self, out: &mut Vec<f32>) {
        let Some(audio) = &self.audio else {
            return;
        };
        let played = self.clock.elapsed().saturating_sub(self.origin);
        // Integer nanoseconds keep the sample count exact at any clock offset.
        let due = (played.as_nanos() * self.sample_rate as u128 / 1_000_000_000) as usize;
        if due <= self.cursor {
            return;
        }

        let available = audio.samples.len();
        let start = self.cursor.min(available);
        let end = due.min(available);
        out.extend_from_slice(&audio.samples[start..end]);
        let silent = (due - self.cursor) - (end - start);
        out.extend(std::iter::repeat(0.0).take(silent));
        self.cursor = due;
    }

    fn release(&mut self) {
        self.audio = None;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn source(samples: Vec<f32>, clock: &PlaybackClock) -> DecodedSource {
        let audio = DecodedAudio {
            samples: samples.into(),
            sample_rate: 100,
        };
        DecodedSource::new(SourceKind::File, audio, clock.clone())
    }

    #[test]
    fn pulls_samples_as_the_clock_advances() {
        let clock = PlaybackClock::manual();
        let mut source = source((0..100).map(|i| i as f32).collect(), &clock);
        let mut out = Vec::new();

        source.pull(&mut out);
        assert!(out.is_empty());

        clock.advance(Duration::from_millis(100));
        source.pull(&mut out);
        assert_eq!(out, (0..10).map(|i| i as f32).collect::<Vec<_>>());

        out.clear();
        clock.advance(Duration::from_millis(50));
        source.pull(&mut out);
        assert_eq!(out, vec![10.0, 11.0, 12.0, 13.0, 14.0]);
    }

    #[test]
    fn runs_into_silence_past_the_end() {
        let clock = PlaybackClock::manual();
        let mut source = source(vec![1.0; 5], &clock);
        let mut out = Vec::new();
        clock.advance(Duration::from_millis(100));
        source.pull(&mut out);
        assert_eq!(out.len(), 10);
        assert_eq!(&out[..5], &[1.0; 5]);
        assert_eq!(&out[5..], &[0.0; 5]);
    }

    #[test]
    fn starts_from_the_attach_time() {
        let clock = PlaybackClock::manual();
        clock.advance(Duration::from_secs(10));
        let mut source = source(vec![0.5; 50], &clock);
        let mut out = Vec::new();
        clock.advance(Duration::from_millis(200));
        source.pull(&mut out);
        assert_eq!(out.len(), 20);
    }

    #[test]
    fn frame_sized_steps_deliver_every_sample() {
        let clock = PlaybackClock::manual();
        clock.advance(Duration::from_millis(10_300));
        let mut source = DecodedSource::new(
            SourceKind::File,
            DecodedAudio {
                samples: vec![0.25; 48_000].into(),
                sample_rate: 44_100,
            },
            clock.clone(),
        );
        let mut total = 0;
        for _ in 0..60 {
            clock.advance(Duration::from_micros(16_667));
            let mut out = Vec::new();
            source.pull(&mut out);
            total += out.len();
        }
        // 60 x 16.667 ms = 1.00002 s
        assert_eq!(total, 44_100);
        assert_eq!(source.position(), 44_100);
    }

    #[test]
    fn released_source_is_silent_forever() {
        let clock = PlaybackClock::manual();
        let mut source = source(vec![1.0; 50], &clock);
        source.release();
        source.release();
        clock.advance(Duration::from_secs(1));
        let mut out = Vec::new();
        source.pull(&mut out);
        assert!(out.is_empty());
        assert!(source.is_released());
    }
}
