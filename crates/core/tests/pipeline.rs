use std::{f32::consts::TAU, path::PathBuf, time::Duration};

use glam::UVec2;
use reactive_visualiser_core::{
    render::TargetKind, AppConfig, FixedRateHost, ModeId, PlaybackClock, RecordingError,
    RenderConfig, SettingUpdate, SourceKind, SourceRequest, Visualiser,
};

const TICK: Duration = Duration::from_micros(16_667);

fn config(initial_mode: ModeId) -> AppConfig {
    AppConfig {
        render: RenderConfig {
            width: 160,
            height: 120,
            preview_width: 64,
            preview_height: 36,
            initial_mode,
            ..RenderConfig::default()
        },
        ..AppConfig::default()
    }
}

fn visualiser(initial_mode: ModeId) -> Visualiser {
    Visualiser::new(&config(initial_mode), PlaybackClock::manual()).with_capture_device(None)
}

/// One second of silence followed by one second of loud bass, as a 16-bit
/// mono WAV file in the temp directory.
fn bass_burst_wav(name: &str) -> PathBuf {
    let rate = 22_050u32;
    let samples: Vec<i16> = (0..rate * 2)
        .map(|i| {
            if i < rate {
                return 0;
            }
            let t = i as f32 / rate as f32;
            let value = [55.0, 110.0, 165.0]
                .iter()
                .map(|freq| (TAU * freq * t).sin() * 0.3)
                .sum::<f32>();
            (value * i16::MAX as f32) as i16
        })
        .collect();

    let data_len = (samples.len() * 2) as u32;
    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&rate.to_le_bytes());
    bytes.extend_from_slice(&(rate * 2).to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }

    let path = std::env::temp_dir().join(format!("{name}-{}.wav", std::process::id()));
    std::fs::write(&path, bytes).unwrap();
    path
}

fn run(vis: &mut Visualiser, ticks: u64) {
    let mut host = FixedRateHost::new(60);
    vis.start(&mut host);
    for _ in 0..ticks {
        let (request, now) = host.next_frame().unwrap();
        vis.on_frame(request, now, &mut host);
    }
    vis.stop(&mut host);
}

#[test]
fn silence_is_a_valid_frame_forever() {
    let mut vis = visualiser(ModeId::Circular);
    for tick in 0..120 {
        vis.tick(TICK * tick);
        let frame = vis.frame();
        assert_eq!(frame.bin_count(), 2048);
        assert!(frame.frequency_bins.iter().all(|&b| b == 0));
        assert_eq!(frame.beat_impulse, 0.0);
    }
}

#[test]
fn file_source_drives_beats_with_a_fixed_frame_shape() {
    let path = bass_burst_wav("beat");
    let mut vis = visualiser(ModeId::Linear);
    assert_eq!(vis.attach_source(SourceRequest::File(path.clone())), Ok(SourceKind::File));
    vis.set_trigger_threshold(500.0);

    let mut impulses = Vec::new();
    for tick in 0..110 {
        vis.tick(TICK * tick);
        let frame = vis.frame();
        assert_eq!(frame.frequency_bins.len(), 2048);
        assert_eq!(frame.time_domain.len(), 2048);
        impulses.push(frame.beat_impulse);
    }
    std::fs::remove_file(path).ok();

    assert!(impulses[..55].iter().all(|&impulse| impulse == 0.0));
    assert!(impulses.contains(&1.0));
    for pair in impulses.windows(2) {
        let (before, after) = (pair[0], pair[1]);
        assert!(after == 1.0 || (after - before * 0.92).abs() < 1e-6, "{before} -> {after}");
        assert!(after >= 0.0);
    }
}

#[test]
fn undecodable_files_fail_and_keep_the_loop_running() {
    let path = std::env::temp_dir().join(format!("not-audio-{}.wav", std::process::id()));
    std::fs::write(&path, b"definitely not audio").unwrap();
    let mut vis = visualiser(ModeId::Circular);
    let result = vis.attach_source(SourceRequest::File(path.clone()));
    std::fs::remove_file(path).ok();

    assert!(matches!(result, Err(reactive_visualiser_core::SourceError::DecodeFailure(_))));
    run(&mut vis, 5);
    assert_eq!(vis.main_loop().ticks(), 5);
}

#[test]
fn background_attachment_is_picked_up_by_a_later_tick() {
    let path = bass_burst_wav("async");
    let mut vis = visualiser(ModeId::Waveform);
    vis.begin_attach(SourceRequest::File(path.clone()));

    let mut now = Duration::ZERO;
    for _ in 0..500 {
        vis.tick(now);
        now += TICK;
        if vis.engine().has_source() {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    std::fs::remove_file(path).ok();
    assert_eq!(vis.engine().source_kind(), Some(SourceKind::File));
    assert_eq!(vis.engine_mut().take_attach_result(), Some(Ok(SourceKind::File)));
}

#[test]
fn identical_runs_render_identical_pixels() {
    let render = |mode: ModeId| {
        let mut vis = visualiser(mode);
        vis.apply(&SettingUpdate::new("noSuchKey", 1.0_f32));
        run(&mut vis, 8);
        vis.renderer()
            .snapshot(TargetKind::Primary)
            .map(|image| image.clone().into_raw())
    };
    for mode in [ModeId::Particle, ModeId::Galaxy, ModeId::ThreeD, ModeId::Dna] {
        assert_eq!(render(mode), render(mode), "{mode}");
    }
}

#[test]
fn zero_area_resize_is_absorbed() {
    let mut vis = visualiser(ModeId::Flower);
    vis.resize(UVec2::ZERO, UVec2::ZERO);
    run(&mut vis, 3);
    let renderer = vis.renderer();
    assert_eq!(renderer.target(TargetKind::Primary).unwrap().draws(), 0);
    assert_eq!(renderer.target(TargetKind::Preview).unwrap().draws(), 0);

    vis.resize(UVec2::new(120, 90), UVec2::new(48, 27));
    run(&mut vis, 2);
    assert_eq!(vis.renderer().target(TargetKind::Primary).unwrap().draws(), 2);
    assert_eq!(
        vis.renderer().target(TargetKind::Primary).unwrap().size(),
        UVec2::new(120, 90)
    );
}

#[test]
fn recording_without_a_source_leaves_no_artifact() {
    let mut vis = visualiser(ModeId::Circular);
    vis.set_recording_permitted(true);
    assert_eq!(vis.start_recording(), Err(RecordingError::NoSource));
    run(&mut vis, 2);
    assert!(vis.stop_recording().is_none());
    assert!(vis.renderer().target(TargetKind::Capture).is_none());
}

#[test]
fn capture_renders_a_separate_full_size_pass() {
    let path = bass_burst_wav("record");
    let mut vis = visualiser(ModeId::Circular);
    vis.attach_source(SourceRequest::File(path.clone())).unwrap();
    vis.set_recording_permitted(true);
    vis.start_recording().unwrap();
    assert_eq!(vis.start_recording(), Err(RecordingError::AlreadyRecording));

    run(&mut vis, 2);
    let capture = vis.renderer().target(TargetKind::Capture).unwrap();
    assert_eq!(capture.size(), UVec2::new(1920, 1080));
    assert_eq!(capture.draws(), 2);
    assert_eq!(vis.renderer().target(TargetKind::Primary).unwrap().draws(), 2);

    let artifact = vis.stop_recording().unwrap().clone();
    std::fs::remove_file(path).ok();
    assert_eq!(&artifact.bytes[8..12], b"AVI ");
    assert!(artifact.video_frames >= 1);
    assert!(vis.renderer().target(TargetKind::Capture).is_none());
    assert!(!vis.engine().has_tap());
}

#[test]
fn switching_modes_disposes_the_outgoing_one_first() {
    use reactive_visualiser_core::{modes::Lifecycle, Visualization};

    let mut vis = visualiser(ModeId::ThreeD);
    run(&mut vis, 2);
    assert!(vis.set_mode(ModeId::Galaxy));
    let registry = vis.renderer().registry();
    assert_eq!(registry.get(ModeId::ThreeD).unwrap().status(), Lifecycle::Disposed);
    assert_eq!(registry.get(ModeId::Galaxy).unwrap().status(), Lifecycle::Initialized);
    assert!(vis.renderer().input().borrow().is_empty());

    assert!(!vis.set_mode_by_name("kaleidoscope"));
    assert_eq!(vis.renderer().active_mode(), Some(ModeId::Galaxy));

    assert!(vis.set_mode(ModeId::ThreeD));
    assert!(!vis.renderer().input().borrow().is_empty());
    run(&mut vis, 1);
    assert_eq!(vis.renderer().target(TargetKind::Primary).unwrap().draws(), 3);
}
