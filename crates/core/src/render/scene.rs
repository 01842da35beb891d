//! Minimal 3D scene: perspective camera, box meshes and a flat-shaded
//! software projection onto a [`Canvas`].

use glam::{EulerRot, Mat4, Vec2, Vec3, Vec4Swizzles};

use super::canvas::Canvas;
use crate::settings::Rgb;

/// Perspective camera looking down -Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub fov_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
}

impl Camera {
    pub fn new(aspect: f32, distance: f32) -> Self {
        Self {
            fov_degrees: 75.0,
            aspect: sane_aspect(aspect),
            near: 0.1,
            far: 1000.0,
            position: Vec3::new(0.0, 0.0, distance),
        }
    }

    /// Aspect ratio of a `width x height` viewport; degenerate sizes give 1.
    pub fn aspect_of(width: u32, height: u32) -> f32 {
        if width == 0 || height == 0 {
            return 1.0;
        }
        width as f32 / height as f32
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = sane_aspect(aspect);
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov_degrees.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view(&self) -> Mat4 {
        Mat4::from_translation(-self.position)
    }
}

fn sane_aspect(aspect: f32) -> f32 {
    if aspect.is_finite() && aspect > 0.0 {
        aspect
    } else {
        1.0
    }
}

/// Axis-aligned box centred on `position`; `scale` multiplies `size`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxMesh {
    pub position: Vec3,
    pub size: Vec3,
    pub scale: Vec3,
    pub color: Rgb,
    pub emissive: Rgb,
    pub emissive_intensity: f32,
}

impl BoxMesh {
    pub fn new(position: Vec3, size: Vec3, color: Rgb) -> Self {
        Self {
            position,
            size,
            scale: Vec3::ONE,
            color,
            emissive: Rgb::BLACK,
            emissive_intensity: 0.0,
        }
    }

    fn corner(&self, sign: Vec3) -> Vec3 {
        self.position + sign * self.size * self.scale * 0.5
    }
}

/// Ambient term plus a single directional light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lighting {
    pub ambient: Rgb,
    pub ambient_intensity: f32,
    pub directional: Rgb,
    pub directional_intensity: f32,
    /// Direction towards the light.
    pub direction: Vec3,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            ambient: Rgb::new(0x40, 0x40, 0x40),
            ambient_intensity: 2.0,
            directional: Rgb::WHITE,
            directional_intensity: 1.5,
            direction: Vec3::new(0.0, 1.0, 1.0).normalize(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scene {
    /// Euler rotation (x, y) applied to every mesh.
    pub rotation: Vec2,
    pub meshes: Vec<BoxMesh>,
    pub lighting: Lighting,
}

impl Scene {
    pub fn model(&self) -> Mat4 {
        Mat4::from_euler(EulerRot::XYZ, self.rotation.x, self.rotation.y, 0.0)
    }
}

/// Corner signs and outward normals of the six box faces.
const FACES: [([Vec3; 4], Vec3); 6] = [
    (
        [
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(1.0, 1.0, -1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
        ],
        Vec3::X,
    ),
    (
        [
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(-1.0, 1.0, 1.0),
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(-1.0, -1.0, -1.0),
        ],
        Vec3::NEG_X,
    ),
    (
        [
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(-1.0, 1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(1.0, 1.0, -1.0),
        ],
        Vec3::Y,
    ),
    (
        [
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(1.0, -1.0, 1.0),
        ],
        Vec3::NEG_Y,
    ),
    (
        [
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(-1.0, 1.0, 1.0),
        ],
        Vec3::Z,
    ),
    (
        [
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(1.0, 1.0, -1.0),
        ],
        Vec3::NEG_Z,
    ),
];

struct Face {
    depth: f32,
    points: [Vec2; 4],
    color: Rgb,
}

/// Draws `scene` through `camera` onto `canvas`, replacing its contents.
/// Faces are back-face culled and painted far to near.
pub fn render_scene(scene: &Scene, camera: &Camera, canvas: &mut Canvas) {
    canvas.clear(Rgb::BLACK);
    if canvas.is_empty() {
        return;
    }

    let model = scene.model();
    let view = camera.view();
    let clip_from_world = camera.projection() * view;
    let size = canvas.size();
    let mut faces = Vec::with_capacity(scene.meshes.len() * 3);

    for mesh in &scene.meshes {
        for &(signs, normal) in FACES.iter() {
            let world: [Vec3; 4] = signs.map(|sign| model.transform_point3(mesh.corner(sign)));
            let world_normal = model.transform_vector3(normal).normalize_or_zero();
            let centre = (world[0] + world[1] + world[2] + world[3]) * 0.25;
            if world_normal.dot(camera.position - centre) <= 0.0 {
                continue;
            }

            let mut points = [Vec2::ZERO; 4];
            let mut visible = true;
            for (slot, corner) in points.iter_mut().zip(world.iter()) {
                let clip = clip_from_world * corner.extend(1.0);
                if clip.w <= camera.near {
                    visible = false;
                    break;
                }
                let ndc = clip.xy() / clip.w;
                *slot = Vec2::new((ndc.x + 1.0) * 0.5 * size.x, (1.0 - ndc.y) * 0.5 * size.y);
            }
            if !visible {
                continue;
            }

            faces.push(Face {
                depth: view.transform_point3(centre).z,
                points,
                color: shade(mesh, world_normal, &scene.lighting),
            });
        }
    }

    // Most negative view-space z is furthest away.
    faces.sort_by(|a, b| a.depth.total_cmp(&b.depth));
    let glow = canvas.glow();
    canvas.set_glow(None);
    for face in &faces {
        canvas.fill_polygon(&face.points, face.color.opaque());
    }
    canvas.set_glow(glow);
}

fn shade(mesh: &BoxMesh, normal: Vec3, lighting: &Lighting) -> Rgb {
    let diffuse = normal.dot(lighting.direction).max(0.0);
    let light = |ambient: u8, direct: u8| {
        ambient as f32 / 255.0 * lighting.ambient_intensity
            + direct as f32 / 255.0 * lighting.directional_intensity * diffuse
    };
    let channel = |base: u8, ambient: u8, direct: u8, emissive: u8| -> u8 {
        let lit = base as f32 * light(ambient, direct);
        let glow = emissive as f32 * mesh.emissive_intensity;
        (lit + glow).round().clamp(0.0, 255.0) as u8
    };
    let (a, d, e, c) = (lighting.ambient, lighting.directional, mesh.emissive, mesh.color);
    Rgb::new(
        channel(c.r, a.r, d.r, e.r),
        channel(c.g, a.g, d.g, e.g),
        channel(c.b, a.b, d.b, e.b),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAGENTA: Rgb = Rgb::new(255, 0, 255);

    fn single_box() -> Scene {
        Scene {
            meshes: vec![BoxMesh::new(Vec3::ZERO, Vec3::splat(40.0), MAGENTA)],
            ..Scene::default()
        }
    }

    #[test]
    fn box_in_front_of_the_camera_lands_in_the_middle() {
        let mut canvas = Canvas::new(64, 48);
        render_scene(&single_box(), &Camera::new(64.0 / 48.0, 100.0), &mut canvas);
        assert_ne!(canvas.pixel(32, 24), Some(Rgb::BLACK));
        assert_eq!(canvas.pixel(0, 0), Some(Rgb::BLACK));
    }

    #[test]
    fn box_behind_the_camera_is_not_drawn() {
        let mut canvas = Canvas::new(64, 48);
        let mut scene = single_box();
        scene.meshes[0].position.z = 200.0;
        render_scene(&scene, &Camera::new(64.0 / 48.0, 100.0), &mut canvas);
        assert!(canvas.image().pixels().all(|p| p[0] == 0 && p[1] == 0 && p[2] == 0));
    }

    #[test]
    fn aspect_changes_the_projected_width() {
        let scene = single_box();
        let lit_columns = |aspect: f32| {
            let mut canvas = Canvas::new(100, 100);
            render_scene(&scene, &Camera::new(aspect, 100.0), &mut canvas);
            (0..100)
                .filter(|&x| canvas.pixel(x, 50) != Some(Rgb::BLACK))
                .count()
        };
        assert!(lit_columns(2.0) < lit_columns(1.0));
    }

    #[test]
    fn emissive_brightens_faces() {
        let mut mesh = BoxMesh::new(Vec3::ZERO, Vec3::ONE, Rgb::new(100, 0, 0));
        let lighting = Lighting::default();
        let plain = shade(&mesh, Vec3::Z, &lighting);
        mesh.emissive = Rgb::new(100, 0, 0);
        mesh.emissive_intensity = 0.3;
        let glowing = shade(&mesh, Vec3::Z, &lighting);
        assert!(glowing.r > plain.r);
    }

    #[test]
    fn degenerate_aspect_falls_back_to_square() {
        assert_eq!(Camera::aspect_of(0, 10), 1.0);
        let mut camera = Camera::new(f32::NAN, 500.0);
        assert_eq!(camera.aspect, 1.0);
        camera.set_aspect(0.0);
        assert_eq!(camera.aspect, 1.0);
    }
}
