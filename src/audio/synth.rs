//! Voice synthesis: pitch, waveform and amplitude envelope for a note
//!
//! Everything here is a pure function of the note, the pattern type and the
//! note's time window, so voices never influence each other. Overlapping
//! notes are simply summed by the render graph.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use super::midi::patterns::{NoteEvent, PatternType};

/// Peak gain of a single voice
pub const VOICE_GAIN: f64 = 0.3;

/// Linear fade-in after the note starts (10ms)
pub const ATTACK_SECS: f64 = 0.01;

/// Linear fade-out before the note stops (50ms)
pub const RELEASE_SECS: f64 = 0.05;

/// Fraction of the nominal length a note sounds for, leaving a gap before the next step
pub const GATE_RATIO: f64 = 0.9;

/// Convert a MIDI note number to Hz (A4 = 69 = 440 Hz, equal temperament)
#[inline]
pub fn frequency(pitch: i32) -> f64 {
    440.0 * 2f64.powf((pitch as f64 - 69.0) / 12.0)
}

/// Seconds per eighth-note step at `tempo` BPM
#[inline]
pub fn step_duration(tempo: u32) -> f64 {
    60.0 / tempo as f64 / 2.0
}

/// Oscillator shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Sawtooth,
    Triangle,
}

impl Waveform {
    /// Timbre used for each pattern type
    pub fn for_pattern(pattern_type: PatternType) -> Self {
        match pattern_type {
            PatternType::Bassline => Waveform::Sawtooth,
            PatternType::Harmony => Waveform::Triangle,
            PatternType::Melody | PatternType::Drums => Waveform::Sine,
        }
    }

    /// Sample at `phase` cycles (only the fractional part matters), in -1.0..=1.0
    #[inline]
    pub fn sample(&self, phase: f64) -> f64 {
        let p = phase.rem_euclid(1.0);
        match self {
            Waveform::Sine => (TAU * p).sin(),
            // Rises from -1 to 1 over the cycle, then drops
            Waveform::Sawtooth => 2.0 * p - 1.0,
            // 0 -> 1 -> 0 -> -1 -> 0, matching the sine's starting phase
            Waveform::Triangle => {
                if p < 0.25 {
                    4.0 * p
                } else if p < 0.75 {
                    2.0 - 4.0 * p
                } else {
                    4.0 * p - 4.0
                }
            }
        }
    }
}

/// Trapezoid gain envelope over a voice's window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub start_time: f64,
    pub stop_time: f64,
    pub peak: f64,
}

impl Envelope {
    pub fn new(start_time: f64, stop_time: f64) -> Self {
        Self {
            start_time,
            stop_time,
            peak: VOICE_GAIN,
        }
    }

    fn attack_end(&self) -> f64 {
        (self.start_time + ATTACK_SECS).min(self.stop_time)
    }

    /// Where the fade-out begins; never before the attack has finished
    fn release_start(&self) -> f64 {
        (self.stop_time - RELEASE_SECS).max(self.attack_end())
    }

    /// Gain at absolute time `t`
    pub fn gain_at(&self, t: f64) -> f64 {
        if t < self.start_time || t >= self.stop_time {
            return 0.0;
        }

        let attack_end = self.attack_end();
        let release_start = self.release_start();

        if t < attack_end {
            self.peak * (t - self.start_time) / (attack_end - self.start_time)
        } else if t < release_start {
            self.peak
        } else {
            self.peak * (self.stop_time - t) / (self.stop_time - release_start)
        }
    }
}

/// Absolute time window of a note at a given tempo
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteTiming {
    pub start_time: f64,
    pub stop_time: f64,
}

impl NoteTiming {
    /// Place `note` relative to `now` on the device clock
    pub fn for_note(note: &NoteEvent, now: f64, step_duration: f64) -> Self {
        let start_time = now + note.step as f64 * step_duration;
        let stop_time = start_time + note.duration as f64 * step_duration * GATE_RATIO;
        Self {
            start_time,
            stop_time,
        }
    }
}

/// Everything needed to render one voice
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParams {
    pub pitch: i32,
    pub frequency: f64,
    pub waveform: Waveform,
    pub envelope: Envelope,
}

impl VoiceParams {
    pub fn for_note(note: &NoteEvent, pattern_type: PatternType, timing: NoteTiming) -> Self {
        Self {
            pitch: note.pitch,
            frequency: frequency(note.pitch),
            waveform: Waveform::for_pattern(pattern_type),
            envelope: Envelope::new(timing.start_time, timing.stop_time),
        }
    }

    pub fn start_time(&self) -> f64 {
        self.envelope.start_time
    }

    pub fn stop_time(&self) -> f64 {
        self.envelope.stop_time
    }

    /// Signal value at absolute time `t`; silent outside the window
    #[inline]
    pub fn sample_at(&self, t: f64) -> f64 {
        let gain = self.envelope.gain_at(t);
        if gain == 0.0 {
            return 0.0;
        }
        let phase = (t - self.envelope.start_time) * self.frequency;
        self.waveform.sample(phase) * gain
    }
}
