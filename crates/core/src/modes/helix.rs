use std::f32::consts::{PI, TAU};

use glam::Vec2;

use super::{reference_scale, DrawPass, Lifecycle, ModeContext, ModeId, Visualization};
use crate::{
    analysis::AudioFrame,
    render::Glow,
    settings::{Rgb, SettingSpec, Settings},
};

const SCHEMA: &[SettingSpec] = &[
    SettingSpec::number("segmentCount", "Segments", 50.0, 200.0, 1.0, 100.0).structural(),
    SettingSpec::number("helixRadius", "Helix Radius", 30.0, 150.0, 1.0, 80.0),
    SettingSpec::color("dnaColor", "Strand Color", Rgb::new(0x00, 0xff, 0xaa)),
];

const USABLE_BINS: usize = 370;
/// Rungs connect the strands on every n-th segment.
const RUNG_EVERY: usize = 3;

/// Double helix scrolling down the screen, widened by the spectrum.
#[derive(Debug)]
pub struct HelixMode {
    settings: Settings,
    status: Lifecycle,
    phase: f32,
    strand: Vec<Vec2>,
}

impl HelixMode {
    pub fn new() -> Self {
        Self {
            settings: Settings::defaults(SCHEMA),
            status: Lifecycle::Uninitialized,
            phase: 0.0,
            strand: Vec::new(),
        }
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }
}

/// Horizontal offset of both strands at segment `i`.
fn strand_offsets(i: usize, segments: usize, phase: f32, radius: f32) -> (f32, f32) {
    let angle = i as f32 / segments as f32 * 2.0 * TAU + phase;
    (angle.sin() * radius, (angle + PI).sin() * radius)
}

impl Default for HelixMode {
    fn default() -> Self {
        Self::new()
    }
}

impl Visualization for HelixMode {
    fn id(&self) -> ModeId {
        ModeId::Dna
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    fn status(&self) -> Lifecycle {
        self.status
    }

    fn init(&mut self, _ctx: &ModeContext) {
        self.phase = 0.0;
        self.strand = Vec::new();
        self.status = Lifecycle::Initialized;
    }

    fn render(&mut self, pass: &mut DrawPass<'_>, frame: &AudioFrame) {
        let beat = frame.beat_impulse;
        let usable = frame.usable_bins(USABLE_BINS);
        if pass.advance {
            self.phase += 0.05 + AudioFrame::band_level(usable, 0, 64) * 0.1;
        }

        let size = pass.size();
        let middle = size.x / 2.0;
        let segments = self.settings.count("segmentCount").max(1);
        let segment_height = size.y / segments as f32;
        let radius = self.settings.number("helixRadius") * reference_scale(size);
        let color = self.settings.color("dnaColor").blend(pass.beat_color, beat);
        let widening = |i: usize| {
            1.0 + AudioFrame::sample_bin(usable, i, segments) as f32 / 255.0 * 0.3
        };

        pass.canvas.fade(Rgb::BLACK, 0.12);
        pass.canvas.set_glow(Glow::new(10.0 + beat * 15.0, color));
        for strand in 0..2 {
            self.strand.clear();
            self.strand.extend((0..segments).map(|i| {
                let offsets = strand_offsets(i, segments, self.phase, radius * widening(i));
                let x = if strand == 0 { offsets.0 } else { offsets.1 };
                Vec2::new(middle + x, i as f32 * segment_height)
            }));
            pass.canvas
                .stroke_polyline(&self.strand, 2.0 + beat * 2.0, color.opaque(), false);
        }

        let rung = color.blend(Rgb::WHITE, 0.3).opaque();
        for i in (0..segments).step_by(RUNG_EVERY) {
            let (left, right) = strand_offsets(i, segments, self.phase, radius * widening(i));
            let y = i as f32 * segment_height;
            pass.canvas.stroke_line(
                Vec2::new(middle + left, y),
                Vec2::new(middle + right, y),
                1.5,
                rung,
            );
        }
        pass.canvas.set_glow(None);
    }

    fn dispose(&mut self) {
        self.strand = Vec::new();
        self.status = Lifecycle::Disposed;
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        modes::tests::*,
        render::Canvas,
        settings::{SettingValue, UpdateOutcome},
    };

    #[test]
    fn phase_advances_with_the_bass_and_resets_on_init() {
        let mut mode = HelixMode::new();
        mode.init(&context(0));
        let mut canvas = Canvas::new(80, 80);
        draw(&mut mode, &mut canvas, &AudioFrame::silent(2048));
        assert_relative_eq!(mode.phase(), 0.05);

        let mut frame = AudioFrame::silent(2048);
        frame.frequency_bins[..64].iter_mut().for_each(|bin| *bin = 255);
        draw(&mut mode, &mut canvas, &frame);
        assert_relative_eq!(mode.phase(), 0.2, epsilon = 1e-6);

        mode.init(&context(0));
        assert_eq!(mode.phase(), 0.0);
    }

    #[test]
    fn segment_count_reinitialises_the_helix() {
        let mut mode = HelixMode::new();
        let ctx = context(0);
        mode.init(&ctx);
        let mut canvas = Canvas::new(80, 80);
        for _ in 0..5 {
            draw(&mut mode, &mut canvas, &AudioFrame::silent(2048));
        }
        assert!(mode.phase() > 0.0);

        let outcome = mode.update_setting("segmentCount", &SettingValue::Number(60.0), &ctx);
        assert_eq!(outcome, UpdateOutcome::Structural);
        assert_eq!(mode.phase(), 0.0);
        assert_eq!(mode.status(), Lifecycle::Initialized);
        assert_eq!(mode.settings().count("segmentCount"), 60);
    }

    #[test]
    fn strands_are_mirror_images() {
        let (left, right) = strand_offsets(7, 100, 0.4, 50.0);
        assert_relative_eq!(left, -right, epsilon = 1e-4);
    }
}
