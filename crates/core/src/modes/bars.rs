//! Bar spectra along the bottom edge or mirrored around the middle.

use glam::Vec2;

use super::{DrawPass, Lifecycle, ModeContext, ModeId, Visualization};
use crate::{
    analysis::AudioFrame,
    render::Glow,
    settings::{Rgb, SettingSpec, Settings},
};

const USABLE_BINS: usize = 400;

const LINEAR_SCHEMA: &[SettingSpec] = &[
    SettingSpec::number("barCount", "Bar Count", 64.0, 512.0, 1.0, 256.0).structural(),
    SettingSpec::number("barHeight", "Min Bar Height", 1.0, 20.0, 1.0, 2.0),
    SettingSpec::number("barSpacing", "Bar Spacing", 0.0, 10.0, 1.0, 1.0),
    SettingSpec::color("barColor", "Bar Color", Rgb::new(0x00, 0xff, 0x88)),
];

const REFLECTED_SCHEMA: &[SettingSpec] = &[
    SettingSpec::number("barCount", "Bar Count", 64.0, 512.0, 1.0, 256.0).structural(),
    SettingSpec::number("barHeight", "Min Bar Height", 1.0, 20.0, 1.0, 2.0),
    SettingSpec::number("barSpacing", "Bar Spacing", 0.0, 10.0, 1.0, 1.0),
    SettingSpec::color("barColor", "Bar Color", Rgb::new(0xff, 0x66, 0x00)),
];

/// Horizontal layout shared by both bar modes.
struct BarLayout {
    count: usize,
    pitch: f32,
    width: f32,
    min_height: f32,
}

impl BarLayout {
    fn new(settings: &Settings, canvas_width: f32) -> Self {
        let count = settings.count("barCount").max(1);
        let pitch = canvas_width / count as f32;
        Self {
            count,
            pitch,
            width: (pitch - settings.number("barSpacing")).max(1.0),
            min_height: settings.number("barHeight"),
        }
    }
}

/// Spectrum bars rising from the bottom edge.
#[derive(Debug)]
pub struct LinearMode {
    settings: Settings,
    status: Lifecycle,
}

impl LinearMode {
    pub fn new() -> Self {
        Self {
            settings: Settings::defaults(LINEAR_SCHEMA),
            status: Lifecycle::Uninitialized,
        }
    }
}

impl Default for LinearMode {
    fn default() -> Self {
        Self::new()
    }
}

impl Visualization for LinearMode {
    fn id(&self) -> ModeId {
        ModeId::Linear
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
        let Vec2 { x: width, y: height } = pass.size();
        let color = self.settings.color("barColor").blend(pass.beat_color, beat);
        let shade = color.blend(Rgb::BLACK, 0.5);
        let layout = BarLayout::new(&self.settings, width);
        let usable = frame.usable_bins(USABLE_BINS);

        let canvas = &mut *pass.canvas;
        canvas.fade(Rgb::BLACK, 0.2);
        canvas.set_glow(Glow::new(10.0 + beat * 15.0, color));
        for i in 0..layout.count {
            let amplitude = AudioFrame::sample_bin(usable, i, layout.count) as f32;
            let bar_height = (amplitude * (height / 255.0) * 0.95 * (1.0 + beat * 0.5))
                .max(layout.min_height);
            canvas.fill_rect_gradient(
                Vec2::new(i as f32 * layout.pitch, height - bar_height),
                Vec2::new(layout.width, bar_height),
                &[(0.0, color), (1.0, shade)],
            );
        }
        canvas.set_glow(None);
    }

    fn dispose(&mut self) {
        self.status = Lifecycle::Disposed;
    }
}

/// Spectrum bars mirrored above and below the horizontal centre line.
#[derive(Debug)]
pub struct ReflectedMode {
    settings: Settings,
    status: Lifecycle,
}

impl ReflectedMode {
    pub fn new() -> Self {
        Self {
            settings: Settings::defaults(REFLECTED_SCHEMA),
            status: Lifecycle::Uninitialized,
        }
    }
}

impl Default for ReflectedMode {
    fn default() -> Self {
        Self::new()
    }
}

impl Visualization for ReflectedMode {
    fn id(&self) -> ModeId {
        ModeId::Reflected
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
        let Vec2 { x: width, y: height } = pass.size();
        let middle = height / 2.0;
        let color = self.settings.color("barColor").blend(pass.beat_color, beat);
        let edge = color.blend(Rgb::BLACK, 0.3);
        let layout = BarLayout::new(&self.settings, width);
        let usable = frame.usable_bins(USABLE_BINS);

        let canvas = &mut *pass.canvas;
        canvas.fade(Rgb::BLACK, 0.2);
        canvas.set_glow(Glow::new(8.0 + beat * 12.0, color));
        for i in 0..layout.count {
            let amplitude = AudioFrame::sample_bin(usable, i, layout.count) as f32;
            let bar_height = (amplitude * (middle / 255.0) * 0.98 * (1.0 + beat * 0.5))
                .max(layout.min_height);
            let x = i as f32 * layout.pitch;
            let size = Vec2::new(layout.width, bar_height);
            canvas.fill_rect_gradient(
                Vec2::new(x, middle - bar_height),
                size,
                &[(0.0, edge), (1.0, color)],
            );
            canvas.fill_rect_gradient(Vec2::new(x, middle), size, &[(0.0, color), (1.0, edge)]);
        }
        canvas.set_glow(None);
    }

    fn dispose(&mut self) {
        self.status = Lifecycle::Disposed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{modes::tests::*, render::Canvas, settings::SettingValue};

    fn quiet_frame() -> AudioFrame {
        AudioFrame {
            beat_impulse: 0.0,
            ..AudioFrame::silent(2048)
        }
    }

    #[test]
    fn silent_linear_bars_keep_their_minimum_height() {
        let mut mode = LinearMode::new();
        mode.init(&context(0));
        let mut canvas = Canvas::new(64, 40);
        draw(&mut mode, &mut canvas, &quiet_frame());
        assert!(canvas.pixel(0, 39).unwrap().g > 0);
        assert_eq!(canvas.pixel(0, 10), Some(Rgb::BLACK));
    }

    #[test]
    fn reflected_bars_are_symmetric_around_the_middle() {
        let mut mode = ReflectedMode::new();
        mode.init(&context(0));
        let ctx = context(0);
        mode.update_setting("barSpacing", &SettingValue::Number(0.0), &ctx);
        let mut canvas = Canvas::new(64, 40);
        draw(&mut mode, &mut canvas, &loud_frame());
        for offset in 1..10 {
            let above = canvas.pixel(20, 20 - offset).unwrap();
            let below = canvas.pixel(20, 19 + offset).unwrap();
            assert_eq!(above.r > 0, below.r > 0, "row offset {offset}");
        }
    }

    #[test]
    fn bar_count_is_structural_in_both_bar_modes() {
        let ctx = context(0);
        let mut modes: [Box<dyn Visualization>; 2] =
            [Box::new(LinearMode::new()), Box::new(ReflectedMode::new())];
        for mode in &mut modes {
            mode.init(&ctx);
            let outcome = mode.update_setting("barCount", &SettingValue::Number(128.0), &ctx);
            assert_eq!(outcome, crate::settings::UpdateOutcome::Structural);
            assert_eq!(mode.status(), Lifecycle::Initialized);
        }
    }

    #[test]
    fn bar_spacing_is_a_live_setting() {
        let mut mode = LinearMode::new();
        let ctx = context(0);
        mode.init(&ctx);
        let outcome = mode.update_setting("barSpacing", &SettingValue::Number(4.0), &ctx);
        assert_eq!(outcome, crate::settings::UpdateOutcome::Applied);
        assert_eq!(mode.settings().number("barSpacing"), 4.0);
    }
}
