//! Per-tick spectral and time-domain features.
//!
//! [`Analyser`] turns the most recent window of samples into byte spectra in
//! the style of a browser analyser node, and [`BeatDetector`] derives the
//! decaying beat impulse from the low end of that spectrum.

mod beat;

pub use beat::BeatDetector;

use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::config::AudioConfig;

/// Time-domain byte that represents a zero sample.
pub const SILENT_SAMPLE: u8 = 128;

/// One tick's snapshot of audio features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFrame {
    /// Byte magnitudes, `fft_size / 2` entries.
    pub frequency_bins: Vec<u8>,
    /// Byte waveform samples centred on [`SILENT_SAMPLE`], same length.
    pub time_domain: Vec<u8>,
    /// Decaying beat pulse in `[0, 1]`.
    pub beat_impulse: f32,
}

impl AudioFrame {
    /// Frame emitted while no source is attached.
    pub fn silent(bin_count: usize) -> Self {
        Self {
            frequency_bins: vec![0; bin_count],
            time_domain: vec![SILENT_SAMPLE; bin_count],
            beat_impulse: 0.0,
        }
    }

    pub fn bin_count(&self) -> usize {
        self.frequency_bins.len()
    }

    /// The first `limit` bins (fewer when the frame is shorter).
    pub fn usable_bins(&self, limit: usize) -> &[u8] {
        &self.frequency_bins[..limit.min(self.frequency_bins.len())]
    }

    /// Amplitude for element `index` of `count`, sampling bin
    /// `floor(index * usable.len() / count)` of `usable`.
    pub fn sample_bin(usable: &[u8], index: usize, count: usize) -> u8 {
        if count == 0 || usable.is_empty() {
            return 0;
        }
        usable.get(index * usable.len() / count).copied().unwrap_or(0)
    }

    /// Mean of `bins[range]` normalised to `[0, 1]`, where the divisor is the
    /// nominal width of the range even if the frame is shorter.
    pub fn band_level(bins: &[u8], start: usize, end: usize) -> f32 {
        if end <= start {
            return 0.0;
        }
        let sum: u32 = bins
            .iter()
            .skip(start)
            .take(end - start)
            .map(|&value| value as u32)
            .sum();
        sum as f32 / (end - start) as f32 / 255.0
    }
}

/// Emulation of an analyser node: Blackman window, magnitude smoothing and a
/// decibel-to-byte mapping.
pub struct Analyser {
    fft_size: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    fft: FftResources,
}

impl Analyser {
    pub fn new(config: &AudioConfig) -> Self {
        let fft_size = config.fft_size.max(2);
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(fft_size);
        let fft = FftResources {
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        };

        Self {
            fft_size,
            smoothing: config.smoothing.clamp(0.0, 0.999),
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels.max(config.min_decibels + 1.0),
            window: (0..fft_size).map(|i| blackman_value(i, fft_size)).collect(),
            smoothed: vec![0.0; fft_size / 2],
            fft,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Forgets the smoothing history.
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|value| *value = 0.0);
    }

    /// Analyses a window of exactly `fft_size` samples (oldest first) into the
    /// two byte arrays.
    pub fn analyse(&mut self, window: &[f32], frequency_bins: &mut [u8], time_domain: &mut [u8]) {
        let bins = self.bin_count();
        debug_assert_eq!(window.len(), self.fft_size);
        debug_assert_eq!(frequency_bins.len(), bins);

        for ((slot, sample), weight) in self
            .fft
            .input
            .iter_mut()
            .zip(window.iter())
            .zip(self.window.iter())
        {
            *slot = sample * weight;
        }

        if self
            .fft
            .plan
            .process_with_scratch(
                &mut self.fft.input,
                &mut self.fft.spectrum,
                &mut self.fft.scratch,
            )
            .is_err()
        {
            // Buffer sizes come from the plan itself, so this only happens if
            // the plan and buffers drift apart. Keep the previous spectrum.
            tracing::warn!("analyser transform rejected its buffers");
            return;
        }

        let scale = 1.0 / self.fft_size as f32;
        let range = self.max_decibels - self.min_decibels;
        for (index, byte) in frequency_bins.iter_mut().enumerate() {
            let magnitude = self.fft.spectrum[index].norm() * scale;
            let smoothed =
                self.smoothing * self.smoothed[index] + (1.0 - self.smoothing) * magnitude;
            self.smoothed[index] = if smoothed.is_finite() { smoothed } else { 0.0 };
            *byte = decibel_byte(self.smoothed[index], self.min_decibels, range);
        }

        for (byte, sample) in time_domain.iter_mut().zip(window.iter()) {
            *byte = waveform_byte(*sample);
        }
    }
}

impl fmt::Debug for Analyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyser")
            .field("fft_size", &self.fft_size)
            .field("smoothing", &self.smoothing)
            .field("min_decibels", &self.min_decibels)
            .field("max_decibels", &self.max_decibels)
            .finish()
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

fn blackman_value(index: usize, len: usize) -> f32 {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    let x = index as f32 / len as f32;
    a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
}

fn decibel_byte(magnitude: f32, min_decibels: f32, range: f32) -> u8 {
    if magnitude <= 0.0 {
        return 0;
    }
    let decibels = 20.0 * magnitude.log10();
    let scaled = 255.0 / range * (decibels - min_decibels);
    scaled.floor().clamp(0.0, 255.0) as u8
}

fn waveform_byte(sample: f32) -> u8 {
    (128.0 * (1.0 + sample)).floor().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyser(fft_size: usize) -> Analyser {
        Analyser::new(&AudioConfig {
            fft_size,
            ..AudioConfig::default()
        })
    }

    fn run(analyser: &mut Analyser, window: &[f32]) -> (Vec<u8>, Vec<u8>) {
        let mut bins = vec![0; analyser.bin_count()];
        let mut wave = vec![0; analyser.bin_count()];
        analyser.analyse(window, &mut bins, &mut wave);
        (bins, wave)
    }

    #[test]
    fn silence_gives_empty_spectrum_and_flat_waveform() {
        let mut analyser = analyser(256);
        let (bins, wave) = run(&mut analyser, &[0.0; 256]);
        assert!(bins.iter().all(|&b| b == 0));
        assert!(wave.iter().all(|&b| b == SILENT_SAMPLE));
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let size = 1024;
        let mut analyser = analyser(size);
        let target_bin = 16;
        let window: Vec<f32> = (0..size)
            .map(|i| 0.01 * (2.0 * PI * target_bin as f32 * i as f32 / size as f32).sin())
            .collect();

        let mut bins = Vec::new();
        for _ in 0..30 {
            bins = run(&mut analyser, &window).0;
        }

        let peak = bins
            .iter()
            .enumerate()
            .max_by_key(|(_, value)| **value)
            .map(|(index, _)| index)
            .unwrap();
        assert_eq!(peak, target_bin);
        assert!(bins[target_bin] > 150);
        assert!(bins[target_bin * 4] < bins[target_bin]);
    }

    #[test]
    fn smoothing_makes_spectrum_rise_gradually() {
        let size = 512;
        let mut analyser = analyser(size);
        let window: Vec<f32> = (0..size)
            .map(|i| 0.01 * (2.0 * PI * 8.0 * i as f32 / size as f32).sin())
            .collect();
        let first = run(&mut analyser, &window).0[8];
        let second = run(&mut analyser, &window).0[8];
        assert!(second > first);

        analyser.reset();
        let after_reset = run(&mut analyser, &window).0[8];
        assert_eq!(after_reset, first);
    }

    #[test]
    fn waveform_bytes_follow_sample_values() {
        assert_eq!(waveform_byte(0.0), 128);
        assert_eq!(waveform_byte(1.0), 255);
        assert_eq!(waveform_byte(-1.0), 0);
        assert_eq!(waveform_byte(0.5), 192);
    }

    #[test]
    fn bin_sampling_uses_floor_mapping() {
        let usable: Vec<u8> = (0..100).collect();
        assert_eq!(AudioFrame::sample_bin(&usable, 0, 10), 0);
        assert_eq!(AudioFrame::sample_bin(&usable, 3, 10), 30);
        assert_eq!(AudioFrame::sample_bin(&usable, 9, 10), 90);
        assert_eq!(AudioFrame::sample_bin(&usable, 1, 0), 0);
        assert_eq!(AudioFrame::sample_bin(&[], 1, 4), 0);

        // 39 * 370 / 65 is exactly 222; a float step lands on 221.
        let wide: Vec<u8> = (0..370).map(|i| (i % 256) as u8).collect();
        assert_eq!(AudioFrame::sample_bin(&wide, 39, 65), 222);
    }

    #[test]
    fn band_level_normalises_by_nominal_width() {
        let bins = vec![255u8; 10];
        assert_eq!(AudioFrame::band_level(&bins, 0, 10), 1.0);
        assert_eq!(AudioFrame::band_level(&bins, 0, 20), 0.5);
        assert_eq!(AudioFrame::band_level(&bins, 5, 5), 0.0);
    }
}
