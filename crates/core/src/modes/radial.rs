use std::f32::consts::TAU;

use glam::Vec2;

use super::{reference_scale, DrawPass, Lifecycle, ModeContext, ModeId, Visualization};
use crate::{
    analysis::AudioFrame,
    render::Glow,
    settings::{Rgb, SettingSpec, Settings},
};

const SCHEMA: &[SettingSpec] = &[
    SettingSpec::number("rayCount", "Ray Count", 180.0, 720.0, 10.0, 360.0).structural(),
    SettingSpec::number("innerRadius", "Inner Radius", 10.0, 100.0, 1.0, 30.0),
    SettingSpec::color("radialColor", "Ray Color", Rgb::new(0xff, 0xff, 0x00)),
];

const USABLE_BINS: usize = 370;
/// Opacity at the centre end of each ray (`#rrggbbaa` with `aa` = `0xaa`).
const RAY_ALPHA: f32 = 170.0 / 255.0;

/// Sunburst of rays that fade out towards their tips.
#[derive(Debug)]
pub struct RadialMode {
    settings: Settings,
    status: Lifecycle,
}

impl RadialMode {
    pub fn new() -> Self {
        Self {
            settings: Settings::defaults(SCHEMA),
            status: Lifecycle::Uninitialized,
        }
    }
}

impl Default for RadialMode {
    fn default() -> Self {
        Self::new()
    }
}

impl Visualization for RadialMode {
    fn id(&self) -> ModeId {
        ModeId::Radial
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
        self.status = Lifecycle::Initialized;
    }

    fn render(&mut self, pass: &mut DrawPass<'_>, frame: &AudioFrame) {
        let beat = frame.beat_impulse;
        let size = pass.size();
        let centre = size * 0.5;
        let max_radius = size.min_element() / 2.0;
        let inner = self.settings.number("innerRadius") * reference_scale(size);
        let color = self.settings.color("radialColor").blend(pass.beat_color, beat);
        let rays = self.settings.count("rayCount");
        let width = 2.0 * (1.0 + beat * 0.5);
        let usable = frame.usable_bins(USABLE_BINS);

        let canvas = &mut *pass.canvas;
        canvas.fade(Rgb::BLACK, 0.1);
        canvas.set_glow(Glow::new(12.0 + beat * 20.0, color));
        for i in 0..rays {
            let amplitude = AudioFrame::sample_bin(usable, i, rays) as f32;
            let length = inner + amplitude / 255.0 * (max_radius - inner) * (1.0 + beat * 0.6);
            let direction = Vec2::from_angle(i as f32 / rays as f32 * TAU);
            canvas.stroke_line_fading(
                centre,
                centre + direction * length,
                width,
                color,
                RAY_ALPHA,
                0.0,
            );
        }
        canvas.set_glow(None);
    }

    fn dispose(&mut self) {
        self.status = Lifecycle::Disposed;
    }
}
