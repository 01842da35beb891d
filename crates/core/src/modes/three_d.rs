//! Row of 3D bars under a perspective camera, orbited by dragging.

use std::{cell::RefCell, rc::Rc};

use glam::{Vec2, Vec3};

use super::{DrawPass, Lifecycle, ModeContext, ModeId, SurfaceKind, Visualization};
use crate::{
    analysis::AudioFrame,
    render::{
        render_scene, BoxMesh, Camera, ListenerId, PointerEvent, Scene, SharedInput, TargetKind,
    },
    settings::{Rgb, SettingSpec, SettingValue, Settings, UpdateOutcome},
};

const SCHEMA: &[SettingSpec] = &[
    SettingSpec::number("barCount", "Bar Count", 32.0, 256.0, 1.0, 128.0).structural(),
    SettingSpec::number("threeDCameraZ", "Camera Distance", 100.0, 1000.0, 10.0, 500.0),
    SettingSpec::number("threeDBarDepth", "Bar Depth", 10.0, 100.0, 1.0, 50.0).structural(),
    SettingSpec::number("threeDRotationSpeed", "Rotation Speed", 0.0, 10.0, 0.1, 1.0),
    SettingSpec::color("threeDBarColor", "Bar Color", Rgb::new(0xff, 0x00, 0xff)),
];

const USABLE_BINS: usize = 1024;
const BAR_WIDTH: f32 = 3.0;
const BAR_HEIGHT: f32 = 5.0;
const BAR_PITCH: f32 = 6.0;
/// Scene rotation per dragged pixel, in radians.
const DRAG_SENSITIVITY: f32 = 0.005;

/// Drag state shared with the pointer listener.
#[derive(Debug, Default)]
struct Orbit {
    dragging: bool,
    last: Vec2,
    rotation: Vec2,
}

impl Orbit {
    fn handle(&mut self, event: &PointerEvent) {
        match *event {
            PointerEvent::Down(at) => {
                self.dragging = true;
                self.last = at;
            }
            PointerEvent::Move(at) if self.dragging => {
                let delta = at - self.last;
                self.rotation.y += delta.x * DRAG_SENSITIVITY;
                self.rotation.x += delta.y * DRAG_SENSITIVITY;
                self.last = at;
            }
            PointerEvent::Move(_) => {}
            PointerEvent::Up => self.dragging = false,
        }
    }
}

#[derive(Debug)]
struct Cameras {
    primary: Camera,
    preview: Camera,
}

/// Listener registration, kept so dispose can remove it again.
#[derive(Debug)]
struct Registration {
    input: SharedInput,
    id: ListenerId,
}

#[derive(Debug)]
pub struct ThreeDMode {
    settings: Settings,
    status: Lifecycle,
    scene: Scene,
    cameras: Option<Cameras>,
    orbit: Rc<RefCell<Orbit>>,
    listener: Option<Registration>,
}

impl ThreeDMode {
    pub fn new() -> Self {
        Self {
            settings: Settings::defaults(SCHEMA),
            status: Lifecycle::Uninitialized,
            scene: Scene::default(),
            cameras: None,
            orbit: Rc::default(),
            listener: None,
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn rotation(&self) -> Vec2 {
        self.orbit.borrow().rotation
    }

    fn build_bars(&mut self) {
        let count = self.settings.count("barCount");
        let depth = self.settings.number("threeDBarDepth");
        let color = self.settings.color("threeDBarColor");
        let size = Vec3::new(BAR_WIDTH, BAR_HEIGHT, depth);
        self.scene.meshes = (0..count)
            .map(|i| {
                let x = (i as f32 - count as f32 / 2.0) * BAR_PITCH;
                BoxMesh::new(Vec3::new(x, 0.0, 0.0), size, color)
            })
            .collect();
    }

    fn step(&mut self, frame: &AudioFrame, beat_color: Rgb) {
        let beat = frame.beat_impulse;
        let usable = frame.usable_bins(USABLE_BINS);
        let color = self.settings.color("threeDBarColor").blend(beat_color, beat);
        let count = self.scene.meshes.len();
        for (i, mesh) in self.scene.meshes.iter_mut().enumerate() {
            let amplitude = AudioFrame::sample_bin(usable, i, count) as f32 / 255.0;
            mesh.scale.y = (1.0 + amplitude * 6.0 * (1.0 + beat * 0.8)).max(0.1);
            mesh.color = color;
            mesh.emissive = color;
            mesh.emissive_intensity = beat * 0.3;
        }

        let mut orbit = self.orbit.borrow_mut();
        if !orbit.dragging {
            orbit.rotation.y += self.settings.number("threeDRotationSpeed") / 1000.0;
        }
        self.scene.rotation = orbit.rotation;
    }

    fn unregister(&mut self) {
        if let Some(registration) = self.listener.take() {
            registration.input.borrow_mut().remove(registration.id);
        }
    }
}

impl Default for ThreeDMode {
    fn default() -> Self {
        Self::new()
    }
}

impl Visualization for ThreeDMode {
    fn id(&self) -> ModeId {
        ModeId::ThreeD
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

    fn surface(&self) -> SurfaceKind {
        SurfaceKind::Scene
    }

    fn init(&mut self, ctx: &ModeContext) {
        self.unregister();
        let distance = self.settings.number("threeDCameraZ");
        self.cameras = Some(Cameras {
            primary: Camera::new(Camera::aspect_of(ctx.primary.x, ctx.primary.y), distance),
            preview: Camera::new(Camera::aspect_of(ctx.preview.x, ctx.preview.y), distance),
        });
        self.scene = Scene::default();
        self.build_bars();
        *self.orbit.borrow_mut() = Orbit::default();

        let orbit = Rc::clone(&self.orbit);
        let id = ctx
            .input
            .borrow_mut()
            .add(Box::new(move |event| orbit.borrow_mut().handle(event)));
        self.listener = Some(Registration {
            input: Rc::clone(&ctx.input),
            id,
        });
        self.status = Lifecycle::Initialized;
    }

    fn render(&mut self, pass: &mut DrawPass<'_>, frame: &AudioFrame) {
        if pass.advance {
            self.step(frame, pass.beat_color);
        }
        let Some(cameras) = &self.cameras else {
            return;
        };
        let camera = match pass.target {
            TargetKind::Preview => &cameras.preview,
            TargetKind::Primary | TargetKind::Capture => &cameras.primary,
        };
        render_scene(&self.scene, camera, pass.canvas);
    }

    /// Only the camera aspects follow a resize; bars and orbit are kept.
    fn on_resize(&mut self, ctx: &ModeContext) {
        match self.cameras.as_mut() {
            Some(cameras) => {
                cameras
                    .primary
                    .set_aspect(Camera::aspect_of(ctx.primary.x, ctx.primary.y));
                cameras
                    .preview
                    .set_aspect(Camera::aspect_of(ctx.preview.x, ctx.preview.y));
            }
            None => self.init(ctx),
        }
    }

    fn apply_setting(&mut self, key: &str, value: &SettingValue) -> UpdateOutcome {
        let outcome = self.settings.apply(key, value);
        if outcome == UpdateOutcome::Applied && key == "threeDCameraZ" {
            let distance = self.settings.number("threeDCameraZ");
            if let Some(cameras) = self.cameras.as_mut() {
                cameras.primary.position.z = distance;
                cameras.preview.position.z = distance;
            }
        }
        outcome
    }

    fn dispose(&mut self) {
        self.unregister();
        self.cameras = None;
        self.scene.meshes = Vec::new();
        self.status = Lifecycle::Disposed;
    }

    fn camera_mut(&mut self, target: TargetKind) -> Option<&mut Camera> {
        let cameras = self.cameras.as_mut()?;
        Some(match target {
            TargetKind::Preview => &mut cameras.preview,
            TargetKind::Primary | TargetKind::Capture => &mut cameras.primary,
        })
    }
}

impl Drop for ThreeDMode {
    fn drop(&mut self) {
        self.unregister();
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{modes::tests::*, render::Canvas};

    #[test]
    fn init_builds_centred_bars_and_registers_one_listener() {
        let ctx = context(0);
        let mut mode = ThreeDMode::new();
        mode.init(&ctx);
        mode.init(&ctx);
        assert_eq!(ctx.input.borrow().len(), 1);
        let meshes = &mode.scene().meshes;
        assert_eq!(meshes.len(), 128);
        assert_relative_eq!(meshes[0].position.x, -384.0);
        assert_relative_eq!(meshes[0].size.z, 50.0);

        mode.dispose();
        assert!(ctx.input.borrow().is_empty());
    }

    #[test]
    fn dragging_rotates_and_pauses_auto_rotation() {
        let ctx = context(0);
        let mut mode = ThreeDMode::new();
        mode.init(&ctx);
        ctx.input
            .borrow_mut()
            .dispatch(&PointerEvent::Down(Vec2::new(10.0, 10.0)));
        ctx.input
            .borrow_mut()
            .dispatch(&PointerEvent::Move(Vec2::new(30.0, 0.0)));
        assert_relative_eq!(mode.rotation().y, 0.1, epsilon = 1e-6);
        assert_relative_eq!(mode.rotation().x, -0.05, epsilon = 1e-6);

        draw(&mut mode, &mut Canvas::new(64, 48), &loud_frame());
        assert_relative_eq!(mode.rotation().y, 0.1, epsilon = 1e-6);

        ctx.input.borrow_mut().dispatch(&PointerEvent::Up);
        draw(&mut mode, &mut Canvas::new(64, 48), &loud_frame());
        assert_relative_eq!(mode.rotation().y, 0.101, epsilon = 1e-6);
    }

    #[test]
    fn bar_heights_follow_the_spectrum() {
        let mut mode = ThreeDMode::new();
        mode.init(&context(0));
        let mut frame = AudioFrame::silent(2048);
        frame.frequency_bins[0] = 255;
        draw(&mut mode, &mut Canvas::new(64, 48), &frame);
        let meshes = &mode.scene().meshes;
        assert_relative_eq!(meshes[0].scale.y, 7.0);
        assert_relative_eq!(meshes[1].scale.y, 1.0);
        assert_eq!(meshes[0].emissive_intensity, 0.0);
    }

    #[test]
    fn camera_distance_is_live_and_resize_keeps_state() {
        let ctx = context(0);
        let mut mode = ThreeDMode::new();
        mode.init(&ctx);
        let outcome = mode.update_setting("threeDCameraZ", &SettingValue::Number(250.0), &ctx);
        assert_eq!(outcome, UpdateOutcome::Applied);
        for target in [TargetKind::Primary, TargetKind::Preview] {
            assert_relative_eq!(mode.camera_mut(target).unwrap().position.z, 250.0);
        }

        let resized = ModeContext {
            primary: glam::UVec2::new(300, 100),
            ..ctx.clone()
        };
        mode.on_resize(&resized);
        assert_relative_eq!(mode.camera_mut(TargetKind::Primary).unwrap().aspect, 3.0);
        assert_eq!(mode.scene().meshes.len(), 128);
        assert_eq!(ctx.input.borrow().len(), 1);
    }
}
