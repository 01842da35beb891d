//! Core library for the Reactive Visualiser.
//!
//! One tick of the pipeline turns the attached audio source into an
//! [`AudioFrame`] (`audio`, `analysis`), hands that frame to the active
//! visualisation mode once per render target (`modes`, `render`) and, while
//! recording, muxes the capture target and the audio tap into an AVI
//! artifact (`record`). [`Visualiser`] wires the pieces to a host frame
//! callback (`timeline`).

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod modes;
pub mod pipeline;
pub mod record;
pub mod render;
pub mod settings;
pub mod timeline;

pub use analysis::{AudioFrame, BeatDetector};
pub use audio::{AudioEngine, SourceKind, SourceRequest};
pub use config::{AppConfig, AudioConfig, BeatConfig, CaptureConfig, RenderConfig};
pub use error::{ModeError, RecordingError, Result, SourceError, VisualiserError};
pub use modes::{ModeId, ModeRegistry, Visualization};
pub use pipeline::Visualiser;
pub use record::{CaptureController, RecordingArtifact, RecordingStatus};
pub use render::{PointerEvent, Renderer, TargetKind};
pub use settings::{Rgb, SettingUpdate, SettingValue, UpdateOutcome};
pub use timeline::{FixedRateHost, MainLoop, PlaybackClock};
