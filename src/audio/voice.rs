//! Scheduled voices: one oscillator + gain pair per note
//!
//! A voice is shared between the session that owns it and the render thread
//! that plays it, so its mutable bits (halt time, connection) are atomics.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::synth::VoiceParams;

/// Sentinel halt time meaning "not halted"
const NOT_HALTED: f64 = f64::INFINITY;

/// Helper to store f64 in AtomicU64
#[inline]
fn f64_to_u64(f: f64) -> u64 {
    f.to_bits()
}

/// Helper to load f64 from AtomicU64
#[inline]
fn u64_to_f64(u: u64) -> f64 {
    f64::from_bits(u)
}

/// Result of asking a voice to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltOutcome {
    /// The voice was scheduled or sounding and is now silenced
    Halted,
    /// The voice had already finished or been halted; nothing changed
    AlreadyStopped,
}

/// A voice living in the render graph
#[derive(Debug)]
pub struct VoiceNode {
    params: VoiceParams,
    /// Device time the oscillator was forced off (infinity while not halted)
    halted_at: AtomicU64,
    /// Whether the oscillator -> gain -> output chain is still wired
    connected: AtomicBool,
}

impl VoiceNode {
    pub fn new(params: VoiceParams) -> Self {
        Self {
            params,
            halted_at: AtomicU64::new(f64_to_u64(NOT_HALTED)),
            connected: AtomicBool::new(true),
        }
    }

    pub fn params(&self) -> &VoiceParams {
        &self.params
    }

    /// Force the oscillator off at device time `now`
    ///
    /// Halting a voice whose natural stop time has passed, or one that was
    /// already halted, reports `AlreadyStopped` and leaves it untouched.
    pub fn halt(&self, now: f64) -> HaltOutcome {
        if now >= self.params.stop_time() {
            return HaltOutcome::AlreadyStopped;
        }
        match self.halted_at.compare_exchange(
            f64_to_u64(NOT_HALTED),
            f64_to_u64(now),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => HaltOutcome::Halted,
            Err(_) => HaltOutcome::AlreadyStopped,
        }
    }

    /// Unwire the voice from the output. Returns false if it was already disconnected.
    pub fn disconnect(&self) -> bool {
        self.connected.swap(false, Ordering::AcqRel)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_halted(&self) -> bool {
        u64_to_f64(self.halted_at.load(Ordering::Acquire)) != NOT_HALTED
    }

    /// Time the voice stops producing sound, halted or not
    pub fn end_time(&self) -> f64 {
        u64_to_f64(self.halted_at.load(Ordering::Acquire)).min(self.params.stop_time())
    }

    /// Whether the render thread can forget this voice at time `t`
    pub fn is_finished(&self, t: f64) -> bool {
        !self.is_connected() || t >= self.end_time()
    }

    /// Output sample at absolute time `t`
    #[inline]
    pub fn sample_at(&self, t: f64) -> f64 {
        if !self.is_connected() || t >= self.end_time() {
            return 0.0;
        }
        self.params.sample_at(t)
    }
}
