use std::f32::consts::TAU;

use glam::Vec2;

use super::{reference_scale, DrawPass, Lifecycle, ModeContext, ModeId, Visualization};
use crate::{
    analysis::AudioFrame,
    render::{quadratic_curve, Glow},
    settings::{Rgb, SettingSpec, Settings},
};

const SCHEMA: &[SettingSpec] = &[
    SettingSpec::number("petalCount", "Petal Count", 4.0, 48.0, 1.0, 16.0).structural(),
    SettingSpec::number("radius", "Radius", 20.0, 200.0, 1.0, 80.0),
    SettingSpec::number("lineWidth", "Line Width", 1.0, 10.0, 0.5, 2.0),
    SettingSpec::color("petalColor", "Petal Color", Rgb::new(0xff, 0x80, 0xff)),
];

const USABLE_BINS: usize = 370;
const CURVE_SEGMENTS: usize = 12;
/// Opacity of the petal fill (`#rrggbb40`).
const FILL_ALPHA: f32 = 64.0 / 255.0;

/// Ring of curved petals whose length follows the spectrum.
#[derive(Debug)]
pub struct FlowerMode {
    settings: Settings,
    status: Lifecycle,
    outline: Vec<Vec2>,
}

impl FlowerMode {
    pub fn new() -> Self {
        Self {
            settings: Settings::defaults(SCHEMA),
            status: Lifecycle::Uninitialized,
            outline: Vec::new(),
        }
    }

    /// Closed outline of one petal: anchor on the ring, out to the tip along
    /// one control point and back along the mirrored one.
    fn petal(&mut self, centre: Vec2, angle: f32, radius: f32, length: f32) {
        let direction = Vec2::from_angle(angle);
        let anchor = centre + direction * radius;
        let tip = centre + direction * (radius + length);
        let spread = 0.3 / (length / 250.0);
        let reach = radius + length / 1.5;
        let left = centre + Vec2::from_angle(angle - spread) * reach;
        let right = centre + Vec2::from_angle(angle + spread) * reach;

        self.outline.clear();
        self.outline.push(anchor);
        quadratic_curve(anchor, left, tip, CURVE_SEGMENTS, &mut self.outline);
        quadratic_curve(tip, right, anchor, CURVE_SEGMENTS, &mut self.outline);
    }
}

impl Default for FlowerMode {
    fn default() -> Self {
        Self::new()
    }
}

impl Visualization for FlowerMode {
    fn id(&self) -> ModeId {
        ModeId::Flower
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
        self.outline = Vec::with_capacity(2 * CURVE_SEGMENTS + 1);
        self.status = Lifecycle::Initialized;
    }

    fn render(&mut self, pass: &mut DrawPass<'_>, frame: &AudioFrame) {
        let beat = frame.beat_impulse;
        let size = pass.size();
        let centre = size * 0.5;
        let scale = reference_scale(size);
        let color = self.settings.color("petalColor").blend(pass.beat_color, beat);
        let petals = self.settings.count("petalCount");
        let radius = self.settings.number("radius") * scale;
        let width = self.settings.number("lineWidth") * (1.0 + beat * 0.5);
        let usable = frame.usable_bins(USABLE_BINS);

        pass.canvas.fade(Rgb::BLACK, 0.12);
        pass.canvas.set_glow(Glow::new(12.0 + beat * 18.0, color));
        for i in 0..petals {
            let amplitude = AudioFrame::sample_bin(usable, i, petals) as f32;
            let length = (20.0 + amplitude * 0.8) * scale * (1.0 + beat * 0.6);
            if length <= 0.0 {
                continue;
            }
            self.petal(centre, i as f32 / petals as f32 * TAU, radius, length);
            pass.canvas.fill_polygon(&self.outline, color.with_alpha(FILL_ALPHA));
            pass.canvas.stroke_polyline(&self.outline, width, color.opaque(), true);
        }
        pass.canvas.set_glow(None);
    }

    fn dispose(&mut self) {
        self.outline = Vec::new();
        self.status = Lifecycle::Disposed;
    }
}
