//! Software 2D surface.
//!
//! Every shape is rasterised from a signed distance field evaluated at pixel
//! centres: negative inside, positive outside. Coverage comes from the
//! distance (one pixel of anti-aliasing) and the optional [`Glow`] paints a
//! soft halo over the first few pixels outside the shape.

use glam::Vec2;
use image::{Rgba as Pixel, RgbaImage};

use crate::settings::{Rgb, Rgba};

/// Peak opacity of a glow halo right at the shape edge.
const GLOW_ALPHA: f32 = 0.35;

/// Halo drawn around subsequent shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glow {
    pub radius: f32,
    pub color: Rgb,
}

impl Glow {
    pub fn new(radius: f32, color: Rgb) -> Option<Self> {
        (radius > 0.0 && radius.is_finite()).then_some(Self { radius, color })
    }
}

/// Opaque RGBA raster with source-over drawing.
#[derive(Debug, Clone)]
pub struct Canvas {
    pixels: RgbaImage,
    glow: Option<Glow>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width, height, Pixel([0, 0, 0, 255])),
            glow: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width() as f32, self.height() as f32)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Reallocates at the new size, cleared to black. Same-size calls keep
    /// the current contents.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.width() != width || self.height() != height {
            self.pixels = RgbaImage::from_pixel(width, height, Pixel([0, 0, 0, 255]));
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        self.pixels
            .get_pixel_checked(x, y)
            .map(|pixel| Rgb::new(pixel[0], pixel[1], pixel[2]))
    }

    pub fn set_glow(&mut self, glow: Option<Glow>) {
        self.glow = glow;
    }

    pub fn glow(&self) -> Option<Glow> {
        self.glow
    }

    pub fn clear(&mut self, color: Rgb) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = Pixel([color.r, color.g, color.b, 255]);
        }
    }

    /// Translucent fill over the whole surface, leaving motion trails.
    pub fn fade(&mut self, color: Rgb, alpha: f32) {
        let alpha = alpha.clamp(0.0, 1.0);
        if alpha == 0.0 {
            return;
        }
        for pixel in self.pixels.pixels_mut() {
            blend_into(pixel, color, alpha);
        }
    }

    pub fn fill_rect(&mut self, origin: Vec2, size: Vec2, color: Rgba) {
        self.fill_rect_with(origin, size, |_| color);
    }

    /// Rectangle filled with a vertical gradient through `stops`
    /// (`(offset, color)` pairs with offsets in `[0, 1]`, ascending).
    pub fn fill_rect_gradient(&mut self, origin: Vec2, size: Vec2, stops: &[(f32, Rgb)]) {
        let height = size.y.max(f32::EPSILON);
        self.fill_rect_with(origin, size, |y| {
            gradient_at(stops, (y - origin.y) / height).opaque()
        });
    }

    pub fn stroke_line(&mut self, from: Vec2, to: Vec2, width: f32, color: Rgba) {
        self.stroke_line_fading(from, to, width, color.rgb, color.alpha, color.alpha);
    }

    /// Line whose opacity interpolates from `start_alpha` to `end_alpha`.
    pub fn stroke_line_fading(
        &mut self,
        from: Vec2,
        to: Vec2,
        width: f32,
        color: Rgb,
        start_alpha: f32,
        end_alpha: f32,
    ) {
        let half = width.max(0.0) * 0.5;
        let bounds = Bounds::around(from.min(to), from.max(to), half + self.halo() + 1.0, self);
        for (x, y, centre) in bounds.pixels() {
            let (distance, t) = segment_distance(centre, from, to);
            let alpha = start_alpha + (end_alpha - start_alpha) * t;
            self.shade(x, y, distance - half, color, alpha);
        }
    }

    /// Connected line segments. Overlapping joints are painted once.
    pub fn stroke_polyline(&mut self, points: &[Vec2], width: f32, color: Rgba, closed: bool) {
        if points.len() < 2 {
            return;
        }
        let half = width.max(0.0) * 0.5;
        let reach = half + self.halo() + 1.0;
        let (min, max) = extent(points);
        let bounds = Bounds::around(min, max, reach, self);
        if bounds.is_empty() {
            return;
        }

        let mut field = DistanceField::new(bounds);
        let closing = closed.then(|| [points[points.len() - 1], points[0]]);
        for segment in points.windows(2).chain(closing.as_ref().map(|pair| &pair[..])) {
            let (a, b) = (segment[0], segment[1]);
            let local = Bounds::around(a.min(b), a.max(b), reach, self);
            for (x, y, centre) in local.pixels() {
                let (distance, _) = segment_distance(centre, a, b);
                field.min(x, y, distance - half);
            }
        }
        self.shade_field(&field, color);
    }

    pub fn fill_circle(&mut self, centre: Vec2, radius: f32, color: Rgba) {
        let radius = radius.max(0.0);
        let bounds = Bounds::around(centre, centre, radius + self.halo() + 1.0, self);
        for (x, y, point) in bounds.pixels() {
            self.shade(x, y, point.distance(centre) - radius, color.rgb, color.alpha);
        }
    }

    pub fn stroke_circle(&mut self, centre: Vec2, radius: f32, width: f32, color: Rgba) {
        let half = width.max(0.0) * 0.5;
        let bounds = Bounds::around(centre, centre, radius + half + self.halo() + 1.0, self);
        for (x, y, point) in bounds.pixels() {
            let distance = (point.distance(centre) - radius).abs() - half;
            self.shade(x, y, distance, color.rgb, color.alpha);
        }
    }

    /// Even-odd filled polygon.
    pub fn fill_polygon(&mut self, points: &[Vec2], color: Rgba) {
        if points.len() < 3 {
            return;
        }
        let (min, max) = extent(points);
        let bounds = Bounds::around(min, max, self.halo() + 1.0, self);
        for (x, y, centre) in bounds.pixels() {
            let distance = polygon_distance(centre, points);
            self.shade(x, y, distance, color.rgb, color.alpha);
        }
    }

    fn fill_rect_with<F>(&mut self, origin: Vec2, size: Vec2, color_at: F)
    where
        F: Fn(f32) -> Rgba,
    {
        if size.x <= 0.0 || size.y <= 0.0 {
            return;
        }
        let half = size * 0.5;
        let centre = origin + half;
        let bounds = Bounds::around(origin, origin + size, self.halo() + 1.0, self);
        for (x, y, point) in bounds.pixels() {
            let offset = (point - centre).abs() - half;
            let outside = offset.max(Vec2::ZERO).length();
            let inside = offset.x.max(offset.y).min(0.0);
            let color = color_at(point.y.clamp(origin.y, origin.y + size.y));
            self.shade(x, y, outside + inside, color.rgb, color.alpha);
        }
    }

    fn halo(&self) -> f32 {
        self.glow.map_or(0.0, |glow| glow.radius)
    }

    fn shade_field(&mut self, field: &DistanceField, color: Rgba) {
        let bounds = field.bounds;
        for (x, y, _) in bounds.pixels() {
            let distance = field.get(x, y);
            if distance.is_finite() {
                self.shade(x, y, distance, color.rgb, color.alpha);
            }
        }
    }

    fn shade(&mut self, x: u32, y: u32, distance: f32, color: Rgb, alpha: f32) {
        let pixel = self.pixels.get_pixel_mut(x, y);
        if let Some(glow) = self.glow {
            if distance > 0.0 && distance < glow.radius {
                let falloff = 1.0 - distance / glow.radius;
                blend_into(pixel, glow.color, GLOW_ALPHA * falloff * falloff * alpha);
            }
        }
        let coverage = (0.5 - distance).clamp(0.0, 1.0);
        if coverage > 0.0 {
            blend_into(pixel, color, coverage * alpha);
        }
    }
}

/// Flattens a quadratic Bézier into `segments` line pieces, appending the
/// points after `from` to `out`.
pub fn quadratic_curve(from: Vec2, control: Vec2, to: Vec2, segments: usize, out: &mut Vec<Vec2>) {
    let segments = segments.max(1);
    for step in 1..=segments {
        let t = step as f32 / segments as f32;
        let u = 1.0 - t;
        out.push(from * (u * u) + control * (2.0 * u * t) + to * (t * t));
    }
}

fn blend_into(pixel: &mut Pixel<u8>, color: Rgb, alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    let mix = |dst: u8, src: u8| -> u8 {
        (src as f32 * alpha + dst as f32 * (1.0 - alpha)).round() as u8
    };
    pixel[0] = mix(pixel[0], color.r);
    pixel[1] = mix(pixel[1], color.g);
    pixel[2] = mix(pixel[2], color.b);
    pixel[3] = 255;
}

fn gradient_at(stops: &[(f32, Rgb)], t: f32) -> Rgb {
    let Some(&(first_offset, first)) = stops.first() else {
        return Rgb::BLACK;
    };
    if t <= first_offset {
        return first;
    }
    for pair in stops.windows(2) {
        let ((start, from), (end, to)) = (pair[0], pair[1]);
        if t <= end {
            let span = (end - start).max(f32::EPSILON);
            return from.blend(to, (t - start) / span);
        }
    }
    stops.last().map_or(first, |&(_, last)| last)
}

/// Distance from `point` to segment `a..b` and the projection parameter.
fn segment_distance(point: Vec2, a: Vec2, b: Vec2) -> (f32, f32) {
    let ab = b - a;
    let length_sq = ab.length_squared();
    let t = if length_sq > 0.0 {
        ((point - a).dot(ab) / length_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    ((a + ab * t).distance(point), t)
}

fn polygon_distance(point: Vec2, points: &[Vec2]) -> f32 {
    let mut inside = false;
    let mut nearest = f32::INFINITY;
    let mut previous = points[points.len() - 1];
    for &current in points {
        nearest = nearest.min(segment_distance(point, previous, current).0);
        if (current.y > point.y) != (previous.y > point.y) {
            let cross = (previous.x - current.x) * (point.y - current.y)
                / (previous.y - current.y)
                + current.x;
            if point.x < cross {
                inside = !inside;
            }
        }
        previous = current;
    }
    if inside {
        -nearest
    } else {
        nearest
    }
}

fn extent(points: &[Vec2]) -> (Vec2, Vec2) {
    points.iter().fold(
        (Vec2::splat(f32::INFINITY), Vec2::splat(f32::NEG_INFINITY)),
        |(min, max), &point| (min.min(point), max.max(point)),
    )
}

/// Pixel rectangle `[x0, x1) x [y0, y1)` clipped to a canvas.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl Bounds {
    fn around(min: Vec2, max: Vec2, margin: f32, canvas: &Canvas) -> Self {
        let clip = |value: f32, limit: u32| -> u32 {
            if value.is_nan() {
                0
            } else {
                value.clamp(0.0, limit as f32) as u32
            }
        };
        let (width, height) = (canvas.width(), canvas.height());
        Self {
            x0: clip((min.x - margin).floor(), width),
            y0: clip((min.y - margin).floor(), height),
            x1: clip((max.x + margin).ceil(), width),
            y1: clip((max.y + margin).ceil(), height),
        }
    }

    fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    fn width(&self) -> usize {
        self.x1.saturating_sub(self.x0) as usize
    }

    /// `(x, y, pixel centre)` in row-major order.
    fn pixels(self) -> impl Iterator<Item = (u32, u32, Vec2)> {
        (self.y0..self.y1).flat_map(move |y| {
            (self.x0..self.x1).map(move |x| (x, y, Vec2::new(x as f32 + 0.5, y as f32 + 0.5)))
        })
    }
}

/// Per-pixel minimum distance over several shapes.
struct DistanceField {
    bounds: Bounds,
    values: Vec<f32>,
}

impl DistanceField {
    fn new(bounds: Bounds) -> Self {
        let len = bounds.width() * (bounds.y1 - bounds.y0) as usize;
        Self {
            bounds,
            values: vec![f32::INFINITY; len],
        }
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        let b = self.bounds;
        (x >= b.x0 && x < b.x1 && y >= b.y0 && y < b.y1)
            .then(|| (y - b.y0) as usize * b.width() + (x - b.x0) as usize)
    }

    fn min(&mut self, x: u32, y: u32, distance: f32) {
        if let Some(index) = self.index(x, y) {
            let slot = &mut self.values[index];
            *slot = slot.min(distance);
        }
    }

    fn get(&self, x: u32, y: u32) -> f32 {
        self.index(x, y)
            .map_or(f32::INFINITY, |index| self.values[index])
    }
}
