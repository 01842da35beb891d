use glam::Vec2;
use rand::{rngs::StdRng, Rng};

use super::{DrawPass, Lifecycle, ModeContext, ModeId, Visualization};
use crate::{
    analysis::AudioFrame,
    render::Glow,
    settings::{Rgb, SettingSpec, Settings},
};

const SCHEMA: &[SettingSpec] = &[
    SettingSpec::number("particleCount", "Particle Count", 50.0, 1000.0, 10.0, 400.0).structural(),
    SettingSpec::number("particleSize", "Particle Size", 1.0, 10.0, 0.5, 3.0),
    SettingSpec::color("particleColor", "Particle Color", Rgb::new(0x00, 0xff, 0xff)),
];

const USABLE_BINS: usize = 256;
const DAMPING: f32 = 0.97;
const BOUNCE: f32 = -0.8;

#[derive(Debug, Clone, Copy)]
struct Particle {
    position: Vec2,
    velocity: Vec2,
    energy: f32,
}

/// Bouncing particles kicked around by the bass.
///
/// Positions live in primary-target pixels and are scaled onto whichever
/// target is being drawn.
#[derive(Debug)]
pub struct ParticleMode {
    settings: Settings,
    status: Lifecycle,
    particles: Vec<Particle>,
    bounds: Vec2,
    rng: Option<StdRng>,
}

impl ParticleMode {
    pub fn new() -> Self {
        Self {
            settings: Settings::defaults(SCHEMA),
            status: Lifecycle::Uninitialized,
            particles: Vec::new(),
            bounds: Vec2::ZERO,
            rng: None,
        }
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    fn step(&mut self, bass: f32) {
        let Some(rng) = self.rng.as_mut() else {
            return;
        };
        let bounds = self.bounds;
        for particle in &mut self.particles {
            let kick = Vec2::new(rng.random::<f32>() - 0.5, rng.random::<f32>() - 0.5);
            particle.velocity = (particle.velocity + kick * bass) * DAMPING;
            particle.position += particle.velocity;

            for axis in 0..2 {
                if particle.position[axis] < 0.0 || particle.position[axis] > bounds[axis] {
                    particle.velocity[axis] *= BOUNCE;
                    particle.position[axis] = particle.position[axis].clamp(0.0, bounds[axis]);
                }
            }
        }
    }
}

impl Default for ParticleMode {
    fn default() -> Self {
        Self::new()
    }
}

impl Visualization for ParticleMode {
    fn id(&self) -> ModeId {
        ModeId::Particle
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
        let mut rng = ctx.rng(ModeId::Particle);
        self.bounds = ctx.primary_size();
        let count = self.settings.count("particleCount");
        self.particles = (0..count)
            .map(|_| Particle {
                position: Vec2::new(rng.random(), rng.random()) * self.bounds,
                velocity: Vec2::new(rng.random::<f32>() - 0.5, rng.random::<f32>() - 0.5) * 3.0,
                energy: rng.random(),
            })
            .collect();
        self.rng = Some(rng);
        self.status = Lifecycle::Initialized;
    }

    fn render(&mut self, pass: &mut DrawPass<'_>, frame: &AudioFrame) {
        let beat = frame.beat_impulse;
        let usable = frame.usable_bins(USABLE_BINS);
        let bass = AudioFrame::band_level(usable, 0, 64);
        let mids = AudioFrame::band_level(usable, 64, 192);
        if pass.advance {
            self.step(bass);
        }

        let size = pass.size();
        let to_target = if self.bounds.min_element() > 0.0 {
            size / self.bounds
        } else {
            Vec2::ZERO
        };
        let radius_scale = to_target.min_element();
        let color = self.settings.color("particleColor").blend(pass.beat_color, beat);
        let base_size = self.settings.number("particleSize") * (1.0 + beat * 1.5 + mids * 0.5);

        pass.canvas.fade(Rgb::BLACK, 0.08);
        pass.canvas.set_glow(Glow::new(15.0 + beat * 20.0, color));
        for particle in &self.particles {
            let radius = base_size * (0.5 + particle.energy * 0.5) * radius_scale;
            pass.canvas
                .fill_circle(particle.position * to_target, radius, color.opaque());
        }
        pass.canvas.set_glow(None);
    }

    fn dispose(&mut self) {
        self.particles = Vec::new();
        self.rng = None;
        self.status = Lifecycle::Disposed;
    }
}
