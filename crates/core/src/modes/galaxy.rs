use std::f32::consts::TAU;

use glam::Vec2;
use rand::Rng;

use super::{DrawPass, Lifecycle, ModeContext, ModeId, Visualization};
use crate::{
    analysis::AudioFrame,
    render::Glow,
    settings::{Rgb, SettingSpec, Settings},
};

const SCHEMA: &[SettingSpec] = &[
    SettingSpec::number("particleCount", "Star Count", 100.0, 2000.0, 50.0, 600.0).structural(),
    SettingSpec::number("particleSize", "Star Size", 0.5, 5.0, 0.1, 2.0),
    SettingSpec::number("rotationSpeed", "Rotation Speed", 0.0, 1.0, 0.01, 0.15).structural(),
];

const ARMS: usize = 4;
const ARM_SPREAD: f32 = 0.6;
const USABLE_BINS: usize = 512;

#[derive(Debug, Clone, Copy)]
struct Star {
    angle: f32,
    distance: f32,
    speed: f32,
    size: f32,
    brightness: f32,
}

/// Spiral galaxy whose stars orbit the centre, pulse with the bass and take
/// their hue from the mids and treble.
#[derive(Debug)]
pub struct GalaxyMode {
    settings: Settings,
    status: Lifecycle,
    stars: Vec<Star>,
    /// Primary-target size the star distances were generated for.
    reference: Vec2,
}

impl GalaxyMode {
    pub fn new() -> Self {
        Self {
            settings: Settings::defaults(SCHEMA),
            status: Lifecycle::Uninitialized,
            stars: Vec::new(),
            reference: Vec2::ZERO,
        }
    }

    pub fn star_count(&self) -> usize {
        self.stars.len()
    }
}

impl Default for GalaxyMode {
    fn default() -> Self {
        Self::new()
    }
}

impl Visualization for GalaxyMode {
    fn id(&self) -> ModeId {
        ModeId::Galaxy
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

    fn init(&mut self, ctx: &ModeContext) {
        let mut rng = ctx.rng(ModeId::Galaxy);
        self.reference = ctx.primary_size();
        let max_distance = self.reference.min_element() * 0.45;
        let rotation = self.settings.number("rotationSpeed");
        let count = self.settings.count("particleCount");

        self.stars = (0..count)
            .map(|i| {
                let arm = (i % ARMS) as f32 / ARMS as f32 * TAU;
                let distance = rng.random::<f32>().powf(0.7) * max_distance;
                let twist = distance / max_distance.max(f32::EPSILON) * TAU;
                Star {
                    angle: arm + twist + (rng.random::<f32>() - 0.5) * ARM_SPREAD,
                    distance,
                    speed: 1.0 / (distance + 50.0) * rotation * 0.08
                        + (rng.random::<f32>() - 0.5) * 0.0001,
                    size: rng.random::<f32>() + 0.5,
                    brightness: 0.3 + rng.random::<f32>() * 0.7,
                }
            })
            .collect();
        self.status = Lifecycle::Initialized;
    }

    fn render(&mut self, pass: &mut DrawPass<'_>, frame: &AudioFrame) {
        let beat = frame.beat_impulse;
        let usable = frame.usable_bins(USABLE_BINS);
        let bass = AudioFrame::band_level(usable, 0, 64);
        let mids = AudioFrame::band_level(usable, 64, 256);
        let treble = AudioFrame::band_level(usable, 256, USABLE_BINS);
        if pass.advance {
            for star in &mut self.stars {
                star.angle = (star.angle + star.speed) % TAU;
            }
        }

        let size = pass.size();
        let centre = size * 0.5;
        let scale = if self.reference.min_element() > 0.0 {
            size.min_element() / self.reference.min_element()
        } else {
            0.0
        };
        let expansion = 1.0 + bass * 0.15;
        let tint = Rgb::new(
            (100.0 + treble * 155.0) as u8,
            (100.0 + mids * 155.0) as u8,
            255,
        );
        let star_size = self.settings.number("particleSize") * (1.0 + beat * 1.2);

        pass.canvas.fade(Rgb::BLACK, 0.06);
        pass.canvas.set_glow(Glow::new(10.0, tint));
        for star in &self.stars {
            let position =
                centre + Vec2::from_angle(star.angle) * star.distance * expansion * scale;
            let color = tint
                .scale(star.brightness)
                .with_alpha(star.brightness * (0.7 + beat * 0.3));
            pass.canvas
                .fill_circle(position, star.size * star_size * scale, color);
        }
        pass.canvas.set_glow(None);
    }

    fn dispose(&mut self) {
        self.stars = Vec::new();
        self.status = Lifecycle::Disposed;
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{modes::tests::*, render::Canvas, settings::SettingValue};

    #[test]
    fn stars_stay_within_the_disc() {
        let ctx = context(11);
        let mut mode = GalaxyMode::new();
        mode.init(&ctx);
        assert_eq!(mode.star_count(), 600);
        let max = ctx.primary_size().min_element() * 0.45;
        assert!(mode.stars.iter().all(|s| s.distance <= max));
        assert!(mode.stars.iter().all(|s| (0.3..=1.0).contains(&s.brightness)));
    }

    #[test]
    fn zero_rotation_speed_leaves_only_jitter() {
        let ctx = context(4);
        let mut mode = GalaxyMode::new();
        mode.update_setting("rotationSpeed", &SettingValue::Number(0.0), &ctx);
        mode.init(&ctx);
        for star in &mode.stars {
            assert!(star.speed.abs() <= 0.00005 + f32::EPSILON);
        }
    }

    #[test]
    fn star_size_is_applied_live() {
        let ctx = context(4);
        let mut mode = GalaxyMode::new();
        mode.init(&ctx);
        let outcome = mode.update_setting("particleSize", &SettingValue::Number(4.5), &ctx);
        assert_eq!(outcome, crate::settings::UpdateOutcome::Applied);
        assert_relative_eq!(mode.settings().number("particleSize"), 4.5);
        draw(&mut mode, &mut Canvas::new(64, 64), &loud_frame());
    }
}
