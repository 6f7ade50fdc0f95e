//! Error types for the playback engine
//!
//! - `DeviceError` - output device acquisition and stream control
//! - `PlaybackError` - what `PatternPlayer::start` can reject with
//! - `PatternError` - importing note lists from producers
//! - `ConfigError` - loading the engine configuration

use std::path::PathBuf;

use thiserror::Error;

/// Failures while acquiring or driving the audio output device.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// The activation policy requires a user gesture before the device may open.
    #[error("Audio output is not activated yet (waiting for a user gesture)")]
    NotActivated,

    #[error("No default output device found")]
    NoOutputDevice,

    #[error("Output device '{0}' not found")]
    DeviceNotFound(String),

    #[error("Failed to configure output device: {0}")]
    Config(String),

    #[error("Audio stream error: {0}")]
    Stream(String),

    /// The context was torn down.
    #[error("Audio context is closed")]
    Closed,

    /// Not enough room in the render queue to connect the whole batch.
    #[error("Render graph is full: {requested} voices requested, {available} slots free")]
    GraphFull { requested: usize, available: usize },
}

/// Reasons `start()` refuses to schedule a pattern.
///
/// `AlreadyPlaying` and `EmptyPattern` are benign: hosts usually ignore them
/// instead of showing an error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("A pattern is already playing")]
    AlreadyPlaying,

    #[error("Pattern has no notes")]
    EmptyPattern,

    #[error("Audio output unavailable: {0}")]
    DeviceUnavailable(#[from] DeviceError),

    #[error("Tempo {0} BPM is outside 40-240")]
    InvalidTempo(u32),

    #[error("Note {index} is malformed: {reason}")]
    InvalidNote { index: usize, reason: String },

    #[error("Pattern has {count} notes but at most {capacity} can be scheduled")]
    TooManyNotes { count: usize, capacity: usize },
}

/// Failures while importing notes handed over by a producer.
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("Invalid note JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected a JSON array of notes")]
    NotAnArray,

    #[error("Unknown pattern type '{0}'")]
    UnknownPatternType(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_converts_into_playback_error() {
        let err: PlaybackError = DeviceError::NoOutputDevice.into();
        assert_eq!(err, PlaybackError::DeviceUnavailable(DeviceError::NoOutputDevice));
        assert_eq!(
            err.to_string(),
            "Audio output unavailable: No default output device found"
        );
    }

    #[test]
    fn test_invalid_note_message() {
        let err = PlaybackError::InvalidNote {
            index: 3,
            reason: "duration must be at least 1 step".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Note 3 is malformed: duration must be at least 1 step"
        );
    }
}
