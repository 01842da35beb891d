//! Visualisation modes.
//!
//! Every mode implements [`Visualization`] and is held by a [`ModeRegistry`]
//! keyed by [`ModeId`]. Modes own their settings and animation state; the
//! renderer only ever talks to them through the trait.

mod bars;
mod circular;
mod flower;
mod galaxy;
mod helix;
mod particle;
mod radial;
mod three_d;
mod waveform;

pub use bars::{LinearMode, ReflectedMode};
pub use circular::CircularMode;
pub use flower::FlowerMode;
pub use galaxy::GalaxyMode;
pub use helix::HelixMode;
pub use particle::ParticleMode;
pub use radial::RadialMode;
pub use three_d::ThreeDMode;
pub use waveform::WaveformMode;

use std::{fmt, str::FromStr};

use glam::{UVec2, Vec2};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    analysis::AudioFrame,
    render::{Camera, Canvas, SharedInput, TargetKind},
    settings::{Rgb, SettingSpec, SettingValue, Settings, UpdateOutcome},
    ModeError,
};

/// Key of a registered mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModeId {
    Circular,
    Linear,
    Reflected,
    Flower,
    Particle,
    Waveform,
    Galaxy,
    ThreeD,
    Radial,
    Dna,
}

impl ModeId {
    pub const ALL: [ModeId; 10] = [
        ModeId::Circular,
        ModeId::Linear,
        ModeId::Reflected,
        ModeId::Flower,
        ModeId::Particle,
        ModeId::Waveform,
        ModeId::Galaxy,
        ModeId::ThreeD,
        ModeId::Radial,
        ModeId::Dna,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModeId::Circular => "circular",
            ModeId::Linear => "linear",
            ModeId::Reflected => "reflected",
            ModeId::Flower => "flower",
            ModeId::Particle => "particle",
            ModeId::Waveform => "waveform",
            ModeId::Galaxy => "galaxy",
            ModeId::ThreeD => "threeD",
            ModeId::Radial => "radial",
            ModeId::Dna => "dna",
        }
    }

    /// Fresh, uninitialised instance with default settings.
    pub fn create(self) -> Box<dyn Visualization> {
        match self {
            ModeId::Circular => Box::new(CircularMode::new()),
            ModeId::Linear => Box::new(LinearMode::new()),
            ModeId::Reflected => Box::new(ReflectedMode::new()),
            ModeId::Flower => Box::new(FlowerMode::new()),
            ModeId::Particle => Box::new(ParticleMode::new()),
            ModeId::Waveform => Box::new(WaveformMode::new()),
            ModeId::Galaxy => Box::new(GalaxyMode::new()),
            ModeId::ThreeD => Box::new(ThreeDMode::new()),
            ModeId::Radial => Box::new(RadialMode::new()),
            ModeId::Dna => Box::new(HelixMode::new()),
        }
    }

    fn salt(self) -> u64 {
        (self as u64 + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15)
    }
}

impl fmt::Display for ModeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModeId {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModeId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ModeError::UnknownMode(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Uninitialized,
    Initialized,
    Disposed,
}

/// Which surface layer a mode paints on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceKind {
    Canvas,
    Scene,
}

/// What a mode may look at while (re)initialising.
#[derive(Debug, Clone)]
pub struct ModeContext {
    pub primary: UVec2,
    pub preview: UVec2,
    pub seed: u64,
    pub input: SharedInput,
}

impl ModeContext {
    pub fn primary_size(&self) -> Vec2 {
        self.primary.as_vec2()
    }

    /// Generator for `id`, derived only from this context's seed.
    pub fn rng(&self, id: ModeId) -> StdRng {
        StdRng::seed_from_u64(self.seed ^ id.salt())
    }
}

/// One draw call against one target.
#[derive(Debug)]
pub struct DrawPass<'a> {
    pub target: TargetKind,
    pub canvas: &'a mut Canvas,
    pub beat_color: Rgb,
    /// Set on the first drawn pass of a tick; only that pass steps animation
    /// state, so every target of a tick shows the same state.
    pub advance: bool,
}

impl DrawPass<'_> {
    pub fn size(&self) -> Vec2 {
        self.canvas.size()
    }
}

/// Capability set shared by every mode.
pub trait Visualization {
    fn id(&self) -> ModeId;

    fn settings(&self) -> &Settings;

    fn settings_mut(&mut self) -> &mut Settings;

    fn status(&self) -> Lifecycle;

    fn surface(&self) -> SurfaceKind {
        SurfaceKind::Canvas
    }

    /// (Re)allocates internal state from scratch.
    fn init(&mut self, ctx: &ModeContext);

    /// Paints one frame onto `pass.canvas`.
    fn render(&mut self, pass: &mut DrawPass<'_>, frame: &AudioFrame);

    fn on_resize(&mut self, ctx: &ModeContext) {
        self.init(ctx);
    }

    /// Stores a normalised value. Modes with live side effects override this.
    fn apply_setting(&mut self, key: &str, value: &SettingValue) -> UpdateOutcome {
        self.settings_mut().apply(key, value)
    }

    /// Applies `value` and re-initialises an active mode when the key is
    /// structural.
    fn update_setting(
        &mut self,
        key: &str,
        value: &SettingValue,
        ctx: &ModeContext,
    ) -> UpdateOutcome {
        let outcome = self.apply_setting(key, value);
        if outcome == UpdateOutcome::Structural && self.status() == Lifecycle::Initialized {
            tracing::debug!(mode = %self.id(), key, "structural setting changed, re-initialising");
            self.dispose();
            self.init(ctx);
        }
        outcome
    }

    /// Releases owned resources and listeners. Idempotent.
    fn dispose(&mut self);

    fn camera_mut(&mut self, _target: TargetKind) -> Option<&mut Camera> {
        None
    }
}

/// Settings schema of one mode, as published to UIs.
#[derive(Debug, Clone, Serialize)]
pub struct ModeSchema {
    pub id: ModeId,
    pub surface: SurfaceKind,
    pub settings: &'static [SettingSpec],
}

/// One long-lived instance per mode, so settings survive mode switches.
pub struct ModeRegistry {
    modes: Vec<Box<dyn Visualization>>,
}

impl ModeRegistry {
    pub fn new() -> Self {
        Self {
            modes: ModeId::ALL.into_iter().map(ModeId::create).collect(),
        }
    }

    pub fn empty() -> Self {
        Self { modes: Vec::new() }
    }

    /// Adds `mode`, replacing any instance with the same id.
    pub fn register(&mut self, mode: Box<dyn Visualization>) {
        let id = mode.id();
        match self.modes.iter_mut().find(|existing| existing.id() == id) {
            Some(slot) => *slot = mode,
            None => self.modes.push(mode),
        }
    }

    pub fn contains(&self, id: ModeId) -> bool {
        self.modes.iter().any(|mode| mode.id() == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ModeId> + '_ {
        self.modes.iter().map(|mode| mode.id())
    }

    pub fn get(&self, id: ModeId) -> Option<&dyn Visualization> {
        self.modes
            .iter()
            .find(|mode| mode.id() == id)
            .map(|mode| mode.as_ref())
    }

    pub fn get_mut(&mut self, id: ModeId) -> Option<&mut (dyn Visualization + 'static)> {
        self.modes
            .iter_mut()
            .find(|mode| mode.id() == id)
            .map(|mode| mode.as_mut())
    }

    pub fn schema(&self) -> Vec<ModeSchema> {
        self.modes
            .iter()
            .map(|mode| ModeSchema {
                id: mode.id(),
                surface: mode.surface(),
                settings: mode.settings().schema(),
            })
            .collect()
    }
}

impl Default for ModeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

/// Geometry scale relative to the 500px reference the mode sizes assume.
fn reference_scale(size: Vec2) -> f32 {
    size.min_element() / 500.0
}

#[cfg(test)]
pub(crate) mod tests {
    use std::f32::consts::TAU;

    use super::*;
    use crate::render::InputRegistry;

    pub(crate) fn context(seed: u64) -> ModeContext {
        ModeContext {
            primary: UVec2::new(160, 120),
            preview: UVec2::new(64, 36),
            seed,
            input: InputRegistry::shared(),
        }
    }

    pub(crate) fn loud_frame() -> AudioFrame {
        AudioFrame {
            frequency_bins: (0..2048).map(|i| 255 - (i % 200) as u8).collect(),
            time_domain: (0..2048)
                .map(|i| (128.0 + 100.0 * (TAU * i as f32 / 256.0).sin()) as u8)
                .collect(),
            beat_impulse: 1.0,
        }
    }

    pub(crate) fn draw(mode: &mut dyn Visualization, canvas: &mut Canvas, frame: &AudioFrame) {
        let mut pass = DrawPass {
            target: TargetKind::Primary,
            canvas,
            beat_color: Rgb::new(255, 0, 0),
            advance: true,
        };
        mode.render(&mut pass, frame);
    }

    fn lit_pixels(canvas: &Canvas) -> usize {
        canvas
            .image()
            .pixels()
            .filter(|p| p[0] > 0 || p[1] > 0 || p[2] > 0)
            .count()
    }

    #[test]
    fn ids_round_trip_through_their_names() {
        for id in ModeId::ALL {
            assert_eq!(id.as_str().parse::<ModeId>(), Ok(id));
            assert_eq!(id.create().id(), id);
        }
        assert_eq!(
            "kaleidoscope".parse::<ModeId>(),
            Err(ModeError::UnknownMode("kaleidoscope".into()))
        );
        assert_eq!(serde_json::to_string(&ModeId::ThreeD).unwrap(), "\"threeD\"");
    }

    #[test]
    fn every_mode_follows_the_lifecycle() {
        let ctx = context(7);
        for id in ModeId::ALL {
            let mut mode = id.create();
            assert_eq!(mode.status(), Lifecycle::Uninitialized);
            mode.dispose();
            mode.init(&ctx);
            assert_eq!(mode.status(), Lifecycle::Initialized, "{id}");
            mode.init(&ctx);
            assert_eq!(mode.status(), Lifecycle::Initialized, "{id}");
            mode.dispose();
            mode.dispose();
            assert_eq!(mode.status(), Lifecycle::Disposed, "{id}");
            mode.init(&ctx);
            assert_eq!(mode.status(), Lifecycle::Initialized, "{id}");
        }
    }

    #[test]
    fn every_mode_paints_a_loud_frame() {
        let ctx = context(7);
        let frame = loud_frame();
        for id in ModeId::ALL {
            let mut mode = id.create();
            mode.init(&ctx);
            let mut canvas = Canvas::new(160, 120);
            for _ in 0..3 {
                draw(mode.as_mut(), &mut canvas, &frame);
            }
            assert!(lit_pixels(&canvas) > 0, "{id} drew nothing");
        }
    }

    #[test]
    fn every_mode_tolerates_zero_area_and_empty_frames() {
        let ctx = context(1);
        let silent = AudioFrame::silent(0);
        for id in ModeId::ALL {
            let mut mode = id.create();
            mode.init(&ctx);
            let mut empty = Canvas::new(0, 0);
            draw(mode.as_mut(), &mut empty, &loud_frame());
            let mut canvas = Canvas::new(32, 32);
            draw(mode.as_mut(), &mut canvas, &silent);
        }
    }

    #[test]
    fn same_seed_renders_identically() {
        let frame = loud_frame();
        for id in ModeId::ALL {
            let run = || {
                let mut mode = id.create();
                mode.init(&context(42));
                let mut canvas = Canvas::new(120, 90);
                for _ in 0..4 {
                    draw(mode.as_mut(), &mut canvas, &frame);
                }
                canvas.image().clone()
            };
            assert!(run() == run(), "{id} is not deterministic");
        }
    }

    #[test]
    fn unknown_keys_are_ignored_everywhere() {
        let ctx = context(3);
        for id in ModeId::ALL {
            let mut mode = id.create();
            mode.init(&ctx);
            let outcome = mode.update_setting("noSuchKey", &SettingValue::Number(1.0), &ctx);
            assert_eq!(outcome, UpdateOutcome::Ignored);
            assert_eq!(mode.status(), Lifecycle::Initialized);
        }
    }

    #[test]
    fn registry_holds_one_instance_per_mode() {
        let mut registry = ModeRegistry::new();
        assert_eq!(registry.ids().count(), ModeId::ALL.len());
        let ctx = context(0);
        let galaxy = registry.get_mut(ModeId::Galaxy).unwrap();
        galaxy.update_setting("particleSize", &SettingValue::Number(4.0), &ctx);
        assert_eq!(
            registry.get(ModeId::Galaxy).unwrap().settings().number("particleSize"),
            4.0
        );

        let schema = serde_json::to_value(registry.schema()).unwrap();
        assert_eq!(schema[0]["id"], "circular");
        assert_eq!(schema[0]["settings"][0]["key"], "barCount");
        assert_eq!(schema[0]["settings"][0]["type"], "number");
    }

    #[test]
    fn registering_replaces_an_existing_id() {
        let mut registry = ModeRegistry::empty();
        registry.register(ModeId::Radial.create());
        registry.register(ModeId::Radial.create());
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec![ModeId::Radial]);
        assert!(!registry.contains(ModeId::Dna));
    }
}
