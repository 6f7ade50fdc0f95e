//! Audio engine for pattern playback
//!
//! Provides real-time pattern playback with:
//! - Lazy, gesture-gated output device acquisition
//! - Absolute-time voice scheduling against the device clock
//! - Oscillator + envelope voices chosen by pattern type
//! - Early cancellation and approximate completion detection

pub mod device;
pub mod engine;
pub mod lifecycle;
pub mod midi;
pub mod output;
pub mod synth;
pub mod voice;
