use std::f32::consts::TAU;

use glam::Vec2;

use super::{reference_scale, DrawPass, Lifecycle, ModeContext, ModeId, Visualization};
use crate::{
    analysis::AudioFrame,
    render::Glow,
    settings::{Rgb, SettingSpec, Settings},
};

const SCHEMA: &[SettingSpec] = &[
    SettingSpec::number("barCount", "Bar Count", 64.0, 512.0, 1.0, 256.0).structural(),
    SettingSpec::number("radius", "Radius", 50.0, 300.0, 1.0, 100.0),
    SettingSpec::number("lineWidth", "Line Width", 1.0, 10.0, 0.5, 3.0),
    SettingSpec::color("lineColor", "Line Color", Rgb::new(0x00, 0xff, 0xff)),
];

const USABLE_BINS: usize = 375;

/// Bars radiating from a ring, with a shock-wave ring on strong beats.
#[derive(Debug)]
pub struct CircularMode {
    settings: Settings,
    status: Lifecycle,
    shock_wave: f32,
}

impl CircularMode {
    pub fn new() -> Self {
        Self {
            settings: Settings::defaults(SCHEMA),
            status: Lifecycle::Uninitialized,
            shock_wave: 0.0,
        }
    }

    pub fn shock_wave(&self) -> f32 {
        self.shock_wave
    }
}

impl Default for CircularMode {
    fn default() -> Self {
        Self::new()
    }
}

impl Visualization for CircularMode {
    fn id(&self) -> ModeId {
        ModeId::Circular
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
        self.shock_wave = 0.0;
        self.status = Lifecycle::Initialized;
    }

    fn render(&mut self, pass: &mut DrawPass<'_>, frame: &AudioFrame) {
        let beat = frame.beat_impulse;
        let size = pass.size();
        let centre = size * 0.5;
        let half_min = size.min_element() / 2.3;
        let line_color = self.settings.color("lineColor");
        let color = line_color.blend(pass.beat_color, beat);
        let bar_count = self.settings.count("barCount");
        let usable = frame.usable_bins(USABLE_BINS);
        let radius = self.settings.number("radius") * reference_scale(size);
        let width = self.settings.number("lineWidth") * (1.0 + beat * 0.3);

        let canvas = &mut *pass.canvas;
        canvas.fade(Rgb::BLACK, 0.15);
        canvas.set_glow(Glow::new(10.0 + beat * 20.0, color));
        for i in 0..bar_count {
            let amplitude = AudioFrame::sample_bin(usable, i, bar_count) as f32;
            let length = amplitude * (half_min / 255.0) * (1.0 + beat * 0.6);
            if length <= 0.0 {
                continue;
            }
            let direction = Vec2::from_angle(i as f32 / bar_count as f32 * TAU);
            canvas.stroke_line(
                centre + direction * radius,
                centre + direction * (radius + length),
                width,
                color.opaque(),
            );
        }

        if pass.advance {
            if beat > 0.1 {
                self.shock_wave = beat * 80.0;
            } else {
                self.shock_wave *= 0.9;
            }
        }
        if self.shock_wave > 1.0 {
            let ring = line_color.blend(pass.beat_color, beat * 0.7);
            canvas.set_glow(Glow::new(20.0, ring));
            canvas.stroke_circle(centre, radius + self.shock_wave, 5.0, ring.opaque());
        }
        canvas.set_glow(None);
    }

    fn dispose(&mut self) {
        self.status = Lifecycle::Disposed;
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{modes::tests::*, render::Canvas};

    #[test]
    fn shock_wave_fires_on_beat_and_decays() {
        let mut mode = CircularMode::new();
        mode.init(&context(0));
        let mut canvas = Canvas::new(100, 100);
        let mut frame = loud_frame();

        draw(&mut mode, &mut canvas, &frame);
        assert_relative_eq!(mode.shock_wave(), 80.0);

        frame.beat_impulse = 0.0;
        draw(&mut mode, &mut canvas, &frame);
        assert_relative_eq!(mode.shock_wave(), 72.0);
    }

    #[test]
    fn only_advancing_passes_move_the_shock_wave() {
        let mut mode = CircularMode::new();
        mode.init(&context(0));
        let mut canvas = Canvas::new(50, 50);
        let frame = loud_frame();
        let mut pass = DrawPass {
            target: crate::render::TargetKind::Preview,
            canvas: &mut canvas,
            beat_color: Rgb::new(255, 0, 0),
            advance: false,
        };
        mode.render(&mut pass, &frame);
        assert_eq!(mode.shock_wave(), 0.0);
    }

    #[test]
    fn reinit_clears_the_shock_wave() {
        let mut mode = CircularMode::new();
        mode.init(&context(0));
        draw(&mut mode, &mut Canvas::new(40, 40), &loud_frame());
        mode.init(&context(0));
        assert_eq!(mode.shock_wave(), 0.0);
    }
}
