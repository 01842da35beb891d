use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{modes::ModeId, settings::Rgb, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub beat: BeatConfig,
    pub render: RenderConfig,
    pub capture: CaptureConfig,
}

impl AppConfig {
    /// Reads a (possibly partial) JSON configuration file. Missing fields fall
    /// back to their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(text)?;
        config.audio.fft_size = AudioConfig::normalise_fft_size(config.audio.fft_size);
        Ok(config)
    }
}

/// Configuration of the analyser stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Transform size. The frame exposes half this many bins.
    pub fft_size: usize,
    /// Per-bin smoothing time constant in `[0, 1)`.
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            fft_size: 4096,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AudioConfig {
    /// Number of bins in each frame produced with this configuration.
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    fn normalise_fft_size(size: usize) -> usize {
        size.clamp(32, 32_768).next_power_of_two()
    }
}

/// Beat detector tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatConfig {
    /// Number of leading frequency bins summed into the bass energy.
    pub bass_bins: usize,
    pub decay_rate: f32,
    pub trigger_threshold: f32,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            bass_bins: 32,
            decay_rate: 0.92,
            trigger_threshold: 3000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub preview_width: u32,
    pub preview_height: u32,
    pub beat_color: Rgb,
    pub initial_mode: ModeId,
    /// Seed for modes that scatter particles randomly.
    pub seed: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            preview_width: 320,
            preview_height: 180,
            beat_color: Rgb::new(0xff, 0x00, 0x00),
            initial_mode: ModeId::Circular,
            seed: 0x5eed,
        }
    }
}

/// Fixed properties of the recording output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub jpeg_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            jpeg_quality: 85,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = AppConfig::from_json(r#"{ "beat": { "trigger_threshold": 1500 } }"#).unwrap();
        assert_eq!(config.beat.trigger_threshold, 1500.0);
        assert_eq!(config.beat.bass_bins, 32);
        assert_eq!(config.audio.fft_size, 4096);
        assert_eq!(config.capture.fps, 30);
        assert_eq!(config.render.initial_mode, ModeId::Circular);
    }

    #[test]
    fn odd_transform_sizes_are_rounded_up() {
        let config = AppConfig::from_json(r#"{ "audio": { "fft_size": 1000 } }"#).unwrap();
        assert_eq!(config.audio.fft_size, 1024);
        assert_eq!(config.audio.bin_count(), 512);
    }

    #[test]
    fn beat_color_reads_hex_strings() {
        let config =
            AppConfig::from_json(r##"{ "render": { "beat_color": "#00ff00" } }"##).unwrap();
        assert_eq!(config.render.beat_color, Rgb::new(0, 255, 0));
    }
}
