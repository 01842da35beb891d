use crate::config::BeatConfig;

/// Delta-energy beat detector over the bass band.
///
/// The impulse jumps to exactly `1.0` when the bass energy rises by more than
/// the trigger threshold since the previous tick, and otherwise decays
/// geometrically towards zero.
#[derive(Debug, Clone)]
pub struct BeatDetector {
    bass_bins: usize,
    decay_rate: f32,
    trigger_threshold: f32,
    previous_bass_energy: f32,
    impulse: f32,
}

impl BeatDetector {
    pub fn new(config: &BeatConfig) -> Self {
        Self {
            bass_bins: config.bass_bins,
            decay_rate: config.decay_rate.clamp(0.0, 1.0),
            trigger_threshold: config.trigger_threshold,
            previous_bass_energy: 0.0,
            impulse: 0.0,
        }
    }

    pub fn impulse(&self) -> f32 {
        self.impulse
    }

    pub fn previous_bass_energy(&self) -> f32 {
        self.previous_bass_energy
    }

    pub fn trigger_threshold(&self) -> f32 {
        self.trigger_threshold
    }

    pub fn set_trigger_threshold(&mut self, threshold: f32) {
        if threshold.is_finite() {
            self.trigger_threshold = threshold.max(0.0);
        }
    }

    pub fn decay_rate(&self) -> f32 {
        self.decay_rate
    }

    /// Sum of the bass band of `frequency_bins`.
    pub fn bass_energy(&self, frequency_bins: &[u8]) -> f32 {
        frequency_bins
            .iter()
            .take(self.bass_bins)
            .map(|&value| value as u32)
            .sum::<u32>() as f32
    }

    /// Advances one tick and returns the new impulse.
    pub fn update(&mut self, frequency_bins: &[u8]) -> f32 {
        let bass_energy = self.bass_energy(frequency_bins);
        if bass_energy - self.previous_bass_energy > self.trigger_threshold {
            self.impulse = 1.0;
        } else {
            self.impulse = (self.impulse * self.decay_rate).max(0.0);
        }
        self.previous_bass_energy = bass_energy;
        self.impulse
    }

    pub fn reset(&mut self) {
        self.previous_bass_energy = 0.0;
        self.impulse = 0.0;
    }
}
