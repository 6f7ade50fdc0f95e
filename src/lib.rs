//! Audiomancer pattern playback engine
//!
//! Plays short generated note patterns through the audio output device,
//! supports stopping a pattern part-way, and reports when playback finishes.

pub mod audio;
pub mod config;
pub mod error;
pub mod logging;

pub use audio::engine::{AudioContext, DeviceState};
pub use audio::lifecycle::{ActivationPolicy, DeviceManager};
pub use audio::midi::{NoteEvent, Pattern, PatternPlayer, PatternType, PlaybackEvent};
pub use audio::output::{CpalBackend, OfflineBackend, OutputBackend};
pub use config::EngineConfig;
pub use error::{ConfigError, DeviceError, PatternError, PlaybackError};
