//! Core library for the Audio Studio visualiser.
//!
//! The crate turns an uploaded audio file into per-frame render parameters.
//! An asset is decoded once, a transport tracks the playback position against
//! an injectable clock, and on every externally driven tick the render
//! scheduler samples a window around that position, extracts spectral and
//! level features, and maps them into the parameters of the active
//! visualisation mode. [`StudioController`] ties these together and is the
//! only type most hosts need.

pub mod analysis;
pub mod assets;
pub mod audio;
pub mod config;
pub mod error;
pub mod mapping;
pub mod record;
pub mod render;
pub mod sampler;
pub mod scene;
pub mod studio;
pub mod timeline;

pub use analysis::{FeatureExtractor, FeatureSet};
pub use assets::{decode, AssetInfo, AssetLoader, AudioAsset, LoadOutcome, LoadTicket};
pub use audio::{PlaybackEvent, Transport, TransportState};
pub use config::{AnalysisConfig, ModeConfig, StudioConfig, TransportConfig};
pub use error::{AnalysisFault, DecodeError, ErrorKind, Result, StudioError, TransportError};
pub use mapping::{FrameValues, ModeMapper, ParticleField, RenderFrame, VisualizationMode};
pub use record::{FrameRecorder, RecordingSettings};
pub use render::{RenderScheduler, TickReport};
pub use sampler::{FrameSampler, SampleWindow, WindowAlignment};
pub use scene::{ModeDescriptor, ModeId};
pub use studio::{Command, StudioController, StudioObserver, StudioPhase, StudioSnapshot};
pub use timeline::{format_timestamp, Clock, ManualClock, PlaybackClock, SystemClock};
