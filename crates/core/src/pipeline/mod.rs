//! The per-tick pipeline: engine, renderer and capture controller driven by
//! one main loop.

use std::{sync::Arc, time::Duration};

use glam::UVec2;

use crate::{
    analysis::AudioFrame,
    audio::{AttachResult, AudioEngine, CaptureDevice, SourceRequest},
    config::AppConfig,
    modes::ModeId,
    record::{CaptureController, RecordingArtifact},
    render::{PointerEvent, Renderer},
    settings::{Rgb, SettingUpdate, UpdateOutcome},
    timeline::{FrameRequest, FrameScheduler, MainLoop, PlaybackClock},
    RecordingError,
};

/// Owns every component and performs `analyse → draw all → capture` once per
/// host frame.
#[derive(Debug)]
pub struct Visualiser {
    engine: AudioEngine,
    renderer: Renderer,
    capture: CaptureController,
    main_loop: MainLoop,
    recording_permitted: bool,
}

impl Visualiser {
    pub fn new(config: &AppConfig, clock: PlaybackClock) -> Self {
        Self {
            engine: AudioEngine::new(config, clock),
            renderer: Renderer::new(&config.render),
            capture: CaptureController::new(config.capture.clone()),
            main_loop: MainLoop::new(),
            recording_permitted: false,
        }
    }

    pub fn with_capture_device(mut self, device: Option<Arc<dyn CaptureDevice>>) -> Self {
        self.engine = self.engine.with_capture_device(device);
        self
    }

    pub fn engine(&self) -> &AudioEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut AudioEngine {
        &mut self.engine
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    pub fn capture(&self) -> &CaptureController {
        &self.capture
    }

    pub fn main_loop(&self) -> &MainLoop {
        &self.main_loop
    }

    pub fn frame(&self) -> &AudioFrame {
        self.engine.frame()
    }

    pub fn attach_source(&mut self, request: SourceRequest) -> AttachResult {
        self.engine.attach_source(request)
    }

    pub fn begin_attach(&mut self, request: SourceRequest) {
        self.engine.begin_attach(request);
    }

    pub fn detach_source(&mut self) {
        self.engine.detach_source();
    }

    pub fn set_trigger_threshold(&mut self, threshold: f32) {
        self.engine.set_trigger_threshold(threshold);
    }

    pub fn set_mode(&mut self, id: ModeId) -> bool {
        self.renderer.set_mode(id)
    }

    pub fn set_mode_by_name(&mut self, name: &str) -> bool {
        self.renderer.set_mode_by_name(name)
    }

    /// Applies a settings message to the active mode.
    pub fn apply(&mut self, update: &SettingUpdate) -> UpdateOutcome {
        let outcome = self.renderer.update_setting(&update.key, &update.value);
        if outcome == UpdateOutcome::Ignored {
            tracing::debug!(key = %update.key, "setting update ignored");
        }
        outcome
    }

    pub fn set_beat_color(&mut self, color: Rgb) {
        self.renderer.set_beat_color(color);
    }

    pub fn resize(&mut self, primary: UVec2, preview: UVec2) {
        self.renderer.resize(primary, preview);
    }

    pub fn pointer_event(&self, event: PointerEvent) {
        self.renderer.pointer_event(event);
    }

    /// The externally decided "capture permitted" flag.
    pub fn set_recording_permitted(&mut self, permitted: bool) {
        self.recording_permitted = permitted;
    }

    pub fn start_recording(&mut self) -> Result<(), RecordingError> {
        let result = self.capture.start_recording(
            &mut self.engine,
            &mut self.renderer,
            self.recording_permitted,
        );
        if let Err(err) = &result {
            tracing::warn!(%err, "recording not started");
        }
        result
    }

    pub fn stop_recording(&mut self) -> Option<&RecordingArtifact> {
        self.capture.stop_recording(&mut self.engine, &mut self.renderer)
    }

    pub fn take_recording(&mut self) -> Option<RecordingArtifact> {
        self.capture.take_artifact()
    }

    pub fn start(&mut self, host: &mut dyn FrameScheduler) {
        self.main_loop.start(host);
    }

    pub fn stop(&mut self, host: &mut dyn FrameScheduler) {
        self.main_loop.stop(host);
    }

    pub fn is_running(&self) -> bool {
        self.main_loop.is_running()
    }

    /// Host frame callback. `now` is the host timestamp of this frame.
    /// Returns whether a tick ran.
    pub fn on_frame(
        &mut self,
        request: FrameRequest,
        now: Duration,
        host: &mut dyn FrameScheduler,
    ) -> bool {
        let Self {
            engine,
            renderer,
            capture,
            main_loop,
            ..
        } = self;
        main_loop.on_frame(request, host, || tick(engine, renderer, capture, now))
    }

    /// Runs one tick outside the loop.
    pub fn tick(&mut self, now: Duration) {
        tick(&mut self.engine, &mut self.renderer, &mut self.capture, now);
    }
}

fn tick(
    engine: &mut AudioEngine,
    renderer: &mut Renderer,
    capture: &mut CaptureController,
    now: Duration,
) {
    if engine.clock().is_manual() {
        engine.clock().advance_to(now);
    }
    let frame = engine.tick();
    renderer.draw_all(frame);
    // Aborted recordings are logged by the controller; the loop keeps going.
    let _ = capture.capture(engine, renderer, now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::RenderConfig, render::TargetKind, timeline::FixedRateHost};

    fn visualiser() -> Visualiser {
        let config = AppConfig {
            render: RenderConfig {
                width: 64,
                height: 48,
                preview_width: 32,
                preview_height: 18,
                ..RenderConfig::default()
            },
            ..AppConfig::default()
        };
        Visualiser::new(&config, PlaybackClock::manual()).with_capture_device(None)
    }

    #[test]
    fn loop_ticks_once_per_host_frame_until_stopped() {
        let mut vis = visualiser();
        let mut host = FixedRateHost::new(60);
        vis.start(&mut host);
        vis.start(&mut host);
        assert_eq!(host.queued(), 1);

        for _ in 0..3 {
            let (request, now) = host.next_frame().unwrap();
            assert!(vis.on_frame(request, now, &mut host));
        }
        assert_eq!(vis.main_loop().ticks(), 3);
        assert_eq!(vis.renderer().target(TargetKind::Primary).unwrap().draws(), 3);

        vis.stop(&mut host);
        vis.stop(&mut host);
        assert!(!vis.is_running());
        assert_eq!(host.queued(), 0);
    }

    #[test]
    fn silence_keeps_the_loop_alive() {
        let mut vis = visualiser();
        for tick in 0..10 {
            vis.tick(Duration::from_millis(tick * 16));
            assert!(vis.frame().frequency_bins.iter().all(|&b| b == 0));
            assert_eq!(vis.frame().beat_impulse, 0.0);
        }
    }

    #[test]
    fn microphone_without_a_device_is_denied_and_loop_continues() {
        let mut vis = visualiser();
        assert_eq!(
            vis.attach_source(SourceRequest::Microphone),
            Err(crate::SourceError::PermissionDenied)
        );
        vis.tick(Duration::ZERO);
        assert!(!vis.engine().has_source());
    }

    #[test]
    fn recording_needs_permission_then_a_source() {
        let mut vis = visualiser();
        assert_eq!(vis.start_recording(), Err(RecordingError::NotPermitted));
        vis.set_recording_permitted(true);
        assert_eq!(vis.start_recording(), Err(RecordingError::NoSource));
        assert!(vis.stop_recording().is_none());
        assert!(vis.take_recording().is_none());
    }

    #[test]
    fn settings_messages_reach_the_active_mode() {
        let mut vis = visualiser();
        assert!(vis.set_mode_by_name("dna"));
        let outcome = vis.apply(&SettingUpdate::new("segmentCount", 60.0_f32));
        assert_eq!(outcome, UpdateOutcome::Structural);
        assert_eq!(vis.apply(&SettingUpdate::new("bogus", 1.0_f32)), UpdateOutcome::Ignored);
    }
}
