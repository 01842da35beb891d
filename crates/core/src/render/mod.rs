//! Render targets and the compositor that drives the active mode over them.
//!
//! The [`Renderer`] exclusively owns every target surface and the mode
//! registry. Each tick it hands the same [`AudioFrame`] to the active mode
//! once per visible target; only the first drawn pass of a tick is allowed to
//! step animation state.

mod canvas;
mod input;
mod scene;

pub use canvas::{quadratic_curve, Canvas, Glow};
pub use input::{InputRegistry, ListenerId, PointerEvent, PointerListener, SharedInput};
pub use scene::{render_scene, BoxMesh, Camera, Lighting, Scene};

use std::path::Path;

use glam::UVec2;
use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::{
    analysis::AudioFrame,
    config::RenderConfig,
    modes::{DrawPass, Lifecycle, ModeContext, ModeId, ModeRegistry, SurfaceKind, Visualization},
    settings::{Rgb, SettingValue, UpdateOutcome},
    Result, VisualiserError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Primary,
    Preview,
    Capture,
}

/// One drawable destination with a 2D layer and a scene layer of equal
/// size. Only the layer matching the active mode's surface is visible.
#[derive(Debug)]
pub struct RenderTarget {
    kind: TargetKind,
    canvas: Canvas,
    scene: Canvas,
    visible: SurfaceKind,
    draws: u64,
}

impl RenderTarget {
    fn new(kind: TargetKind, size: UVec2, visible: SurfaceKind) -> Self {
        Self {
            kind,
            canvas: Canvas::new(size.x, size.y),
            scene: Canvas::new(size.x, size.y),
            visible,
            draws: 0,
        }
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn size(&self) -> UVec2 {
        UVec2::new(self.canvas.width(), self.canvas.height())
    }

    pub fn is_empty(&self) -> bool {
        self.canvas.is_empty()
    }

    pub fn visible(&self) -> SurfaceKind {
        self.visible
    }

    /// Number of passes drawn onto this target.
    pub fn draws(&self) -> u64 {
        self.draws
    }

    pub fn image(&self) -> &RgbaImage {
        self.surface().image()
    }

    fn surface(&self) -> &Canvas {
        match self.visible {
            SurfaceKind::Canvas => &self.canvas,
            SurfaceKind::Scene => &self.scene,
        }
    }

    fn surface_mut(&mut self) -> &mut Canvas {
        match self.visible {
            SurfaceKind::Canvas => &mut self.canvas,
            SurfaceKind::Scene => &mut self.scene,
        }
    }

    fn resize(&mut self, size: UVec2) {
        self.canvas.resize(size.x, size.y);
        self.scene.resize(size.x, size.y);
    }

    fn show(&mut self, surface: SurfaceKind) {
        self.visible = surface;
        self.surface_mut().clear(Rgb::BLACK);
    }
}

/// Mixed into the configured seed on every re-initialisation.
const GENERATION_SALT: u64 = 0xa076_1d64_78bd_642f;

#[derive(Debug)]
pub struct Renderer {
    registry: ModeRegistry,
    active: Option<ModeId>,
    primary: RenderTarget,
    preview: RenderTarget,
    capture: Option<RenderTarget>,
    beat_color: Rgb,
    input: SharedInput,
    seed: u64,
    generation: u64,
}

impl Renderer {
    /// Renderer over every built-in mode, with `config.initial_mode` active.
    pub fn new(config: &RenderConfig) -> Self {
        Self::with_registry(config, ModeRegistry::new())
    }

    pub fn with_registry(config: &RenderConfig, registry: ModeRegistry) -> Self {
        let mut renderer = Self {
            registry,
            active: None,
            primary: RenderTarget::new(
                TargetKind::Primary,
                UVec2::new(config.width, config.height),
                SurfaceKind::Canvas,
            ),
            preview: RenderTarget::new(
                TargetKind::Preview,
                UVec2::new(config.preview_width, config.preview_height),
                SurfaceKind::Canvas,
            ),
            capture: None,
            beat_color: config.beat_color,
            input: InputRegistry::shared(),
            seed: config.seed,
            generation: 0,
        };
        renderer.set_mode(config.initial_mode);
        renderer
    }

    pub fn registry(&self) -> &ModeRegistry {
        &self.registry
    }

    pub fn active_mode(&self) -> Option<ModeId> {
        self.active
    }

    pub fn active(&self) -> Option<&dyn Visualization> {
        self.registry.get(self.active?)
    }

    pub fn beat_color(&self) -> Rgb {
        self.beat_color
    }

    pub fn set_beat_color(&mut self, color: Rgb) {
        self.beat_color = color;
    }

    pub fn input(&self) -> &SharedInput {
        &self.input
    }

    pub fn target(&self, kind: TargetKind) -> Option<&RenderTarget> {
        match kind {
            TargetKind::Primary => Some(&self.primary),
            TargetKind::Preview => Some(&self.preview),
            TargetKind::Capture => self.capture.as_ref(),
        }
    }

    /// Visible pixels of `kind`, if that target exists.
    pub fn snapshot(&self, kind: TargetKind) -> Option<&RgbaImage> {
        self.target(kind).map(RenderTarget::image)
    }

    /// Writes the visible pixels of `kind` to `path` as a PNG.
    pub fn save_snapshot(&self, kind: TargetKind, path: impl AsRef<Path>) -> Result<()> {
        let image = self
            .snapshot(kind)
            .ok_or_else(|| VisualiserError::msg(format!("no {kind:?} target to save")))?;
        image.save_with_format(path.as_ref(), ImageFormat::Png)?;
        tracing::debug!(kind = ?kind, path = %path.as_ref().display(), "snapshot saved");
        Ok(())
    }

    /// Switches to `id`. The outgoing mode is disposed before the incoming
    /// one is initialised. Returns `false` and keeps the current mode when
    /// `id` is not registered.
    pub fn set_mode(&mut self, id: ModeId) -> bool {
        if self.active == Some(id) {
            return true;
        }
        if !self.registry.contains(id) {
            tracing::warn!(mode = %id, "mode is not registered, keeping the current one");
            return false;
        }

        if let Some(outgoing) = self.active.take().and_then(|old| self.registry.get_mut(old)) {
            outgoing.dispose();
        }

        let ctx = self.next_context();
        let Some(mode) = self.registry.get_mut(id) else {
            return false;
        };
        let surface = mode.surface();
        for target in targets(&mut self.primary, &mut self.preview, &mut self.capture) {
            target.show(surface);
        }
        mode.init(&ctx);
        mode.on_resize(&ctx);
        self.active = Some(id);
        tracing::info!(mode = %id, ?surface, "mode activated");
        true
    }

    /// [`Renderer::set_mode`] for an externally supplied id. Unknown names
    /// are logged and ignored.
    pub fn set_mode_by_name(&mut self, name: &str) -> bool {
        match name.parse::<ModeId>() {
            Ok(id) => self.set_mode(id),
            Err(err) => {
                tracing::warn!(%err, "ignoring mode switch");
                false
            }
        }
    }

    /// Resizes the on-screen targets and lets the active mode adapt.
    pub fn resize(&mut self, primary: UVec2, preview: UVec2) {
        self.primary.resize(primary);
        self.preview.resize(preview);
        tracing::debug!(%primary, %preview, "targets resized");

        let ctx = self.next_context();
        if let Some(mode) = self.active.and_then(|id| self.registry.get_mut(id)) {
            if mode.status() == Lifecycle::Initialized {
                mode.on_resize(&ctx);
            }
        }
    }

    /// Renders `frame` onto every visible target with non-zero area.
    pub fn draw_all(&mut self, frame: &AudioFrame) {
        let Some(mode) = self.active.and_then(|id| self.registry.get_mut(id)) else {
            return;
        };
        if mode.status() != Lifecycle::Initialized {
            return;
        }

        let mut advance = true;
        for target in targets(&mut self.primary, &mut self.preview, &mut self.capture) {
            if target.is_empty() {
                continue;
            }
            let kind = target.kind;
            let size = target.size();
            let saved_aspect = match kind {
                TargetKind::Capture => mode.camera_mut(kind).map(|camera| {
                    let aspect = camera.aspect;
                    camera.set_aspect(Camera::aspect_of(size.x, size.y));
                    aspect
                }),
                _ => None,
            };

            let mut pass = DrawPass {
                target: kind,
                canvas: target.surface_mut(),
                beat_color: self.beat_color,
                advance,
            };
            mode.render(&mut pass, frame);
            target.draws += 1;
            advance = false;

            if let (Some(aspect), Some(camera)) = (saved_aspect, mode.camera_mut(kind)) {
                camera.set_aspect(aspect);
            }
        }
    }

    /// Routes pointer input to the listeners the active mode registered.
    pub fn pointer_event(&self, event: PointerEvent) {
        self.input.borrow_mut().dispatch(&event);
    }

    /// Updates a setting of the active mode.
    pub fn update_setting(&mut self, key: &str, value: &SettingValue) -> UpdateOutcome {
        match self.active {
            Some(id) => self.update_mode_setting(id, key, value),
            None => UpdateOutcome::Ignored,
        }
    }

    /// Updates a setting of any registered mode; inactive modes keep the
    /// value for their next activation.
    pub fn update_mode_setting(
        &mut self,
        id: ModeId,
        key: &str,
        value: &SettingValue,
    ) -> UpdateOutcome {
        let ctx = self.next_context();
        match self.registry.get_mut(id) {
            Some(mode) => mode.update_setting(key, value, &ctx),
            None => UpdateOutcome::Ignored,
        }
    }

    /// Allocates the capture target, showing the active mode's surface kind.
    pub fn begin_capture(&mut self, size: UVec2) {
        let surface = self.active().map_or(SurfaceKind::Canvas, |mode| mode.surface());
        self.capture = Some(RenderTarget::new(TargetKind::Capture, size, surface));
        tracing::debug!(%size, "capture target allocated");
    }

    pub fn end_capture(&mut self) {
        if self.capture.take().is_some() {
            tracing::debug!("capture target released");
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    fn next_context(&mut self) -> ModeContext {
        self.generation += 1;
        ModeContext {
            primary: self.primary.size(),
            preview: self.preview.size(),
            seed: self.seed ^ self.generation.wrapping_mul(GENERATION_SALT),
            input: self.input.clone(),
        }
    }
}

/// Targets in draw order: primary, preview, then capture when allocated.
fn targets<'a>(
    primary: &'a mut RenderTarget,
    preview: &'a mut RenderTarget,
    capture: &'a mut Option<RenderTarget>,
) -> impl Iterator<Item = &'a mut RenderTarget> {
    [Some(primary), Some(preview), capture.as_mut()].into_iter().flatten()
}
