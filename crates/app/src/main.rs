use std::{
    path::{Path, PathBuf},
    thread,
};

use clap::{Args, Parser, Subcommand};
use reactive_visualiser_core::{
    AppConfig, FixedRateHost, ModeRegistry, PlaybackClock, SettingUpdate, SourceRequest,
    TargetKind, Visualiser, Visualization,
};
use tracing_subscriber::EnvFilter;

const FRAME_RATE: u32 = 60;

fn main() -> reactive_visualiser_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Modes => print_modes(),
        Commands::Render {
            session,
            frames,
            output,
        } => run_render(config, &session, frames, &output),
        Commands::Record {
            session,
            seconds,
            output,
        } => run_record(config, &session, seconds, &output),
    }
}

fn print_modes() -> reactive_visualiser_core::Result<()> {
    let schema = ModeRegistry::new().schema();
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn run_render(
    config: AppConfig,
    session: &SessionArgs,
    frames: u64,
    output: &Path,
) -> reactive_visualiser_core::Result<()> {
    let mut vis = session.open(config)?;
    tracing::info!(frames, "rendering");
    drive(&mut vis, frames, session.source.mic);

    std::fs::create_dir_all(output)?;
    let mode = vis.renderer().active_mode().map(|id| id.as_str()).unwrap_or("none");
    for (kind, name) in [(TargetKind::Primary, "primary"), (TargetKind::Preview, "preview")] {
        let path = output.join(format!("{mode}-{name}.png"));
        vis.renderer().save_snapshot(kind, &path)?;
        tracing::info!(path = %path.display(), "snapshot written");
    }
    Ok(())
}

fn run_record(
    config: AppConfig,
    session: &SessionArgs,
    seconds: f32,
    output: &Path,
) -> reactive_visualiser_core::Result<()> {
    let mut vis = session.open(config)?;
    vis.set_recording_permitted(true);
    vis.start_recording()?;

    let frames = (seconds.max(0.0) * FRAME_RATE as f32).ceil() as u64;
    drive(&mut vis, frames, session.source.mic);

    let artifact = vis
        .stop_recording()
        .ok_or("recording produced no artifact")?;
    let path = artifact.save_to(output)?;
    println!("{}", path.display());
    Ok(())
}

/// Pumps `frames` host callbacks through the main loop. Live sources are
/// paced in real time; decoded sources run as fast as they render.
fn drive(vis: &mut Visualiser, frames: u64, realtime: bool) {
    let mut host = FixedRateHost::new(FRAME_RATE);
    vis.start(&mut host);
    for _ in 0..frames {
        let Some((request, now)) = host.next_frame() else {
            break;
        };
        if realtime {
            thread::sleep(host.interval());
        }
        vis.on_frame(request, now, &mut host);
    }
    vis.stop(&mut host);
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio reactive visualiser", long_about = None)]
struct Cli {
    /// JSON configuration file. Missing fields use their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the settings schema of every mode as JSON.
    Modes,
    /// Render a number of frames and write the primary and preview targets as PNGs.
    Render {
        #[command(flatten)]
        session: SessionArgs,
        /// Number of ticks to run before the snapshot.
        #[arg(long, default_value_t = 120)]
        frames: u64,
        /// Directory that receives the PNG files.
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Record the capture target together with the source audio as an AVI file.
    Record {
        #[command(flatten)]
        session: SessionArgs,
        /// Length of the recording.
        #[arg(long, default_value_t = 5.0)]
        seconds: f32,
        /// Output file, or a directory for a generated file name.
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// Audio file to decode.
    #[arg(long)]
    file: Option<PathBuf>,
    /// Audio stream URL to fetch and decode.
    #[arg(long)]
    url: Option<String>,
    /// Capture from the default input device.
    #[arg(long)]
    mic: bool,
}

impl SourceArgs {
    fn request(&self) -> SourceRequest {
        match (&self.file, &self.url) {
            (Some(path), _) => SourceRequest::File(path.clone()),
            (None, Some(url)) => SourceRequest::Url(url.clone()),
            (None, None) => SourceRequest::Microphone,
        }
    }
}

#[derive(Args, Debug)]
struct SessionArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Mode to activate, e.g. `circular`, `galaxy` or `threeD`.
    #[arg(short, long)]
    mode: Option<String>,
    /// Setting override for the chosen mode, as `key=value`. Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    settings: Vec<String>,
    /// Bass energy rise that counts as a beat.
    #[arg(long)]
    threshold: Option<f32>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
}

impl SessionArgs {
    /// Builds a visualiser with the source attached and overrides applied.
    fn open(&self, mut config: AppConfig) -> reactive_visualiser_core::Result<Visualiser> {
        if let Some(width) = self.width {
            config.render.width = width;
        }
        if let Some(height) = self.height {
            config.render.height = height;
        }

        let clock = if self.source.mic {
            PlaybackClock::start()
        } else {
            PlaybackClock::manual()
        };
        let mut vis = Visualiser::new(&config, clock);

        if let Some(mode) = &self.mode {
            if !vis.set_mode_by_name(mode) {
                return Err(format!("unknown mode `{mode}`").into());
            }
        }
        for setting in &self.settings {
            let update = parse_setting(&vis, setting)?;
            vis.apply(&update);
        }
        if let Some(threshold) = self.threshold {
            vis.set_trigger_threshold(threshold);
        }

        let kind = vis.attach_source(self.source.request())?;
        tracing::info!(%kind, "source attached");
        Ok(vis)
    }
}

/// Resolves `key=value` against the active mode's schema.
fn parse_setting(vis: &Visualiser, text: &str) -> reactive_visualiser_core::Result<SettingUpdate> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{text}`"))?;
    let spec = vis
        .renderer()
        .active()
        .and_then(|mode| mode.settings().spec(key.trim()))
        .ok_or_else(|| format!("the active mode has no setting `{key}`"))?;
    let value = spec
        .parse(value)
        .ok_or_else(|| format!("invalid value `{value}` for `{key}`"))?;
    Ok(SettingUpdate::new(spec.key, value))
}
