//! Device context and render graph
//!
//! `AudioContext` is the handle the player schedules against: it exposes the
//! device clock, the suspended/running/closed state and a way to connect
//! voices. The render side (`AudioGraph::render`) runs on the output thread,
//! mixes every connected voice at its absolute schedule and advances the
//! clock.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};
use serde::Serialize;

use super::output::StreamControl;
use super::voice::VoiceNode;
use crate::error::DeviceError;

const STATE_SUSPENDED: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Playback state of the device context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Suspended,
    Running,
    Closed,
}

impl DeviceState {
    fn from_u8(v: u8) -> Self {
        match v {
            STATE_RUNNING => DeviceState::Running,
            STATE_CLOSED => DeviceState::Closed,
            _ => DeviceState::Suspended,
        }
    }
}

/// Render-side state shared with the output thread
pub struct AudioGraph {
    sample_rate: u32,
    /// Frames rendered since creation; the device clock
    frames_rendered: AtomicU64,
    state: AtomicU8,
    /// Newly connected voices on their way to the render thread
    producer: Mutex<ringbuf::HeapProd<Arc<VoiceNode>>>,
    /// Always try_lock'd from the render thread
    consumer: Mutex<ringbuf::HeapCons<Arc<VoiceNode>>>,
    /// Voices currently being mixed
    active: Mutex<Vec<Arc<VoiceNode>>>,
    capacity: usize,
}

impl AudioGraph {
    pub fn new(sample_rate: u32, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let rb = HeapRb::new(capacity);
        let (producer, consumer) = rb.split();
        Self {
            sample_rate,
            frames_rendered: AtomicU64::new(0),
            state: AtomicU8::new(STATE_SUSPENDED),
            producer: Mutex::new(producer),
            consumer: Mutex::new(consumer),
            active: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn state(&self) -> DeviceState {
        DeviceState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: DeviceState) {
        let v = match state {
            DeviceState::Suspended => STATE_SUSPENDED,
            DeviceState::Running => STATE_RUNNING,
            DeviceState::Closed => STATE_CLOSED,
        };
        self.state.store(v, Ordering::SeqCst);
    }

    /// Device clock in seconds
    pub fn current_time(&self) -> f64 {
        self.frames_rendered.load(Ordering::SeqCst) as f64 / self.sample_rate as f64
    }

    /// Number of voices currently being mixed (pending ones included)
    pub fn live_voices(&self) -> usize {
        let pending = self.consumer.lock().occupied_len();
        let now = self.current_time();
        let active = self.active.lock().iter().filter(|v| !v.is_finished(now)).count();
        pending + active
    }

    /// Hand a batch of voices to the render thread, all or nothing
    fn connect_all(&self, voices: &[Arc<VoiceNode>]) -> Result<(), DeviceError> {
        let mut producer = self.producer.lock();

        if producer.vacant_len() < voices.len() {
            // Make room by moving pending voices into the mix list
            let mut active = self.active.lock();
            self.drain_pending(&mut active, true);
        }

        let available = producer.vacant_len();
        if available < voices.len() {
            return Err(DeviceError::GraphFull {
                requested: voices.len(),
                available,
            });
        }

        for voice in voices {
            // Cannot fail: vacancy was checked while holding the producer
            let _ = producer.try_push(Arc::clone(voice));
        }
        Ok(())
    }

    fn drain_pending(&self, active: &mut Vec<Arc<VoiceNode>>, blocking: bool) {
        let consumer = if blocking {
            Some(self.consumer.lock())
        } else {
            self.consumer.try_lock()
        };
        if let Some(mut consumer) = consumer {
            let now = self.current_time();
            while let Some(voice) = consumer.try_pop() {
                if !voice.is_finished(now) {
                    active.push(voice);
                }
            }
        }
    }

    /// Mix all connected voices into `out` (interleaved, `channels` wide)
    ///
    /// Produces silence and leaves the clock alone unless the context is running.
    pub fn render(&self, out: &mut [f32], channels: usize) {
        if self.state() != DeviceState::Running || channels == 0 {
            out.fill(0.0);
            return;
        }

        let mut active = self.active.lock();
        self.drain_pending(&mut active, false);

        let start_frame = self.frames_rendered.load(Ordering::SeqCst);
        let sample_rate = self.sample_rate as f64;
        let mut frames = 0u64;

        for (i, frame) in out.chunks_mut(channels).enumerate() {
            let t = (start_frame + i as u64) as f64 / sample_rate;
            let mix: f64 = active.iter().map(|v| v.sample_at(t)).sum();

            // SAFETY LIMITER: never hand NaN or >0dB to the device
            let mut sample = mix as f32;
            if !sample.is_finite() {
                sample = 0.0;
            }
            frame.fill(sample.clamp(-1.0, 1.0));
            frames += 1;
        }

        self.frames_rendered.fetch_add(frames, Ordering::SeqCst);

        let now = self.current_time();
        active.retain(|v| !v.is_finished(now));
    }
}

/// Handle to an opened output device
pub struct AudioContext {
    graph: Arc<AudioGraph>,
    control: Box<dyn StreamControl>,
    backend: String,
}

impl AudioContext {
    pub fn new(graph: Arc<AudioGraph>, control: Box<dyn StreamControl>, backend: &str) -> Self {
        Self {
            graph,
            control,
            backend: backend.to_string(),
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn sample_rate(&self) -> u32 {
        self.graph.sample_rate()
    }

    /// Device clock in seconds
    pub fn current_time(&self) -> f64 {
        self.graph.current_time()
    }

    pub fn state(&self) -> DeviceState {
        self.graph.state()
    }

    /// Most voices that can be waiting for the render thread at once
    pub fn capacity(&self) -> usize {
        self.graph.capacity()
    }

    pub fn live_voices(&self) -> usize {
        self.graph.live_voices()
    }

    /// Start (or restart) the output stream
    pub fn resume(&self) -> Result<(), DeviceError> {
        match self.state() {
            DeviceState::Running => Ok(()),
            DeviceState::Closed => Err(DeviceError::Closed),
            DeviceState::Suspended => {
                self.control.resume()?;
                self.graph.set_state(DeviceState::Running);
                log::info!("Audio context resumed ({})", self.backend);
                Ok(())
            }
        }
    }

    /// Pause the output stream; the clock stops with it
    pub fn suspend(&self) -> Result<(), DeviceError> {
        match self.state() {
            DeviceState::Suspended => Ok(()),
            DeviceState::Closed => Err(DeviceError::Closed),
            DeviceState::Running => {
                self.control.suspend()?;
                self.graph.set_state(DeviceState::Suspended);
                log::info!("Audio context suspended ({})", self.backend);
                Ok(())
            }
        }
    }

    /// Release the device. Returns false if it was already closed.
    pub fn close(&self) -> bool {
        let previous = self.graph.state.swap(STATE_CLOSED, Ordering::SeqCst);
        if previous == STATE_CLOSED {
            return false;
        }
        self.control.close();
        log::info!("Audio context closed ({})", self.backend);
        true
    }

    /// Wire a batch of voices to the output
    pub fn connect_all(&self, voices: &[Arc<VoiceNode>]) -> Result<(), DeviceError> {
        if self.state() == DeviceState::Closed {
            return Err(DeviceError::Closed);
        }
        self.graph.connect_all(voices)
    }

    /// Render into `out` directly; used by offline contexts
    pub fn render(&self, out: &mut [f32], channels: usize) {
        self.graph.render(out, channels);
    }
}

impl Drop for AudioContext {
    fn drop(&mut self) {
        self.close();
    }
}
