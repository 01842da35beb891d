use glam::Vec2;

use super::{DrawPass, Lifecycle, ModeContext, ModeId, Visualization};
use crate::{
    analysis::{AudioFrame, SILENT_SAMPLE},
    render::Glow,
    settings::{Rgb, SettingSpec, Settings},
};

const SCHEMA: &[SettingSpec] = &[
    SettingSpec::number("waveformThickness", "Thickness", 1.0, 10.0, 0.5, 3.0),
    SettingSpec::color("waveformColor", "Waveform Color", Rgb::new(0x00, 0xff, 0x00)),
];

/// Oscilloscope trace of the time-domain samples.
#[derive(Debug)]
pub struct WaveformMode {
    settings: Settings,
    status: Lifecycle,
    points: Vec<Vec2>,
}

impl WaveformMode {
    pub fn new() -> Self {
        Self {
            settings: Settings::defaults(SCHEMA),
            status: Lifecycle::Uninitialized,
            points: Vec::new(),
        }
    }

    fn trace(&mut self, samples: &[u8], size: Vec2) {
        self.points.clear();
        if samples.is_empty() {
            self.points.push(Vec2::new(0.0, size.y / 2.0));
        } else {
            let step = size.x / samples.len() as f32;
            self.points.extend(samples.iter().enumerate().map(|(i, &sample)| {
                Vec2::new(i as f32 * step, sample as f32 / SILENT_SAMPLE as f32 * size.y / 2.0)
            }));
        }
        self.points.push(Vec2::new(size.x, size.y / 2.0));
    }
}

impl Default for WaveformMode {
    fn default() -> Self {
        Self::new()
    }
}

impl Visualization for WaveformMode {
    fn id(&self) -> ModeId {
        ModeId::Waveform
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
        self.points = Vec::new();
        self.status = Lifecycle::Initialized;
    }

    fn render(&mut self, pass: &mut DrawPass<'_>, frame: &AudioFrame) {
        let beat = frame.beat_impulse;
        let average = AudioFrame::band_level(&frame.frequency_bins, 0, frame.bin_count());
        let color = self.settings.color("waveformColor").blend(pass.beat_color, beat);
        let width = self.settings.number("waveformThickness") * (1.0 + beat * 2.0);
        self.trace(&frame.time_domain, pass.size());

        pass.canvas.fade(Rgb::BLACK, 0.15);
        pass.canvas
            .set_glow(Glow::new(15.0 + beat * 25.0 + average * 10.0, color));
        pass.canvas
            .stroke_polyline(&self.points, width, color.opaque(), false);
        pass.canvas.set_glow(None);
    }

    fn dispose(&mut self) {
        self.points = Vec::new();
        self.status = Lifecycle::Disposed;
    }
}
