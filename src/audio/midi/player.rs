//! Pattern player with tempo-based scheduling
//!
//! `start()` turns a note list into voices at absolute device times and
//! returns immediately; the device's own clock plays them. A per-player
//! completion timer marks the session finished roughly four steps after the
//! last note starts. `stop()` cancels early.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use super::events::{PlaybackEvent, PlaybackListener};
use super::patterns::{NoteEvent, Pattern, PatternType, MAX_TEMPO, MIN_TEMPO};
use super::timer::CompletionTimer;
use crate::audio::engine::{AudioContext, DeviceState};
use crate::audio::lifecycle::DeviceManager;
use crate::audio::synth::{step_duration, NoteTiming, VoiceParams};
use crate::audio::voice::{HaltOutcome, VoiceNode};
use crate::error::PlaybackError;

/// Steps allowed for the last note to ring out before the session is considered done
pub const TAIL_STEPS: f64 = 4.0;

/// A scheduled pattern and the resources it owns
struct ActiveSession {
    id: u64,
    context: Arc<AudioContext>,
    voices: Vec<Arc<VoiceNode>>,
}

impl ActiveSession {
    /// Silence and unwire every voice (explicit stop)
    fn halt_all(self) -> usize {
        let now = self.context.current_time();
        let mut halted = 0;
        for voice in &self.voices {
            if voice.halt(now) == HaltOutcome::Halted {
                halted += 1;
            }
            voice.disconnect();
        }
        halted
    }

    /// Give up ownership after natural completion
    ///
    /// Finished voices are unwired now; anything still ringing is left to the
    /// render graph, which drops it once its stop time passes.
    fn release(self) {
        let now = self.context.current_time();
        for voice in self.voices.iter().filter(|v| v.is_finished(now)) {
            voice.disconnect();
        }
    }
}

/// Shared state between player and timer thread
struct PlayerShared {
    is_playing: AtomicBool,
    session: Mutex<Option<ActiveSession>>,
    next_session: AtomicU64,
    listener: RwLock<Option<PlaybackListener>>,
}

impl PlayerShared {
    fn emit(&self, event: PlaybackEvent) {
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener(&event);
        }
    }

    /// Completion timer callback
    fn complete(&self, session_id: u64) {
        let finished = {
            let mut session = self.session.lock();
            match session.as_ref() {
                Some(active) if active.id == session_id => {}
                // Stopped already, or a newer session took over
                _ => return,
            }
            let finished = session.take();
            self.is_playing.store(false, Ordering::SeqCst);
            finished
        };

        if let Some(active) = finished {
            log::info!("Playback session {} completed", active.id);
            active.release();
            self.emit(PlaybackEvent::Completed {
                session: session_id,
            });
        }
    }
}

/// Plays one pattern at a time on the shared output device
pub struct PatternPlayer {
    devices: Arc<DeviceManager>,
    shared: Arc<PlayerShared>,
    timer: CompletionTimer,
}

impl PatternPlayer {
    /// Create a player scheduling onto `devices`
    pub fn new(devices: Arc<DeviceManager>) -> Self {
        let shared = Arc::new(PlayerShared {
            is_playing: AtomicBool::new(false),
            session: Mutex::new(None),
            next_session: AtomicU64::new(1),
            listener: RwLock::new(None),
        });

        let weak: Weak<PlayerShared> = Arc::downgrade(&shared);
        let timer = CompletionTimer::new(move |session_id| {
            if let Some(shared) = weak.upgrade() {
                shared.complete(session_id);
            }
        });

        Self {
            devices,
            shared,
            timer,
        }
    }

    pub fn devices(&self) -> &Arc<DeviceManager> {
        &self.devices
    }

    /// Receive `PlaybackEvent`s from now on, replacing any previous listener
    pub fn set_listener<F>(&self, listener: F)
    where
        F: Fn(&PlaybackEvent) + Send + Sync + 'static,
    {
        *self.shared.listener.write() = Some(Arc::new(listener));
    }

    pub fn clear_listener(&self) {
        *self.shared.listener.write() = None;
    }

    /// Check if playing
    pub fn is_playing(&self) -> bool {
        self.shared.is_playing.load(Ordering::SeqCst)
    }

    /// Whether anything this player scheduled may still be audible
    ///
    /// Stays true after completion while long notes ring past the tail.
    pub fn is_sounding(&self) -> bool {
        self.is_playing()
            || self
                .devices
                .current()
                .is_some_and(|ctx| ctx.state() == DeviceState::Running && ctx.live_voices() > 0)
    }

    /// Parameters of the voices owned by the active session
    pub fn current_voices(&self) -> Vec<VoiceParams> {
        self.shared
            .session
            .lock()
            .as_ref()
            .map(|s| s.voices.iter().map(|v| *v.params()).collect())
            .unwrap_or_default()
    }

    /// Schedule `pattern` from now
    pub fn play_pattern(&self, pattern: &Pattern) -> Result<(), PlaybackError> {
        self.start(&pattern.notes, pattern.tempo, pattern.pattern_type)
    }

    /// Schedule `notes` from now and return without waiting for them
    ///
    /// Nothing is scheduled unless every note is valid and the device is
    /// available; a rejected call leaves the player as it was.
    pub fn start(
        &self,
        notes: &[NoteEvent],
        tempo: u32,
        pattern_type: PatternType,
    ) -> Result<(), PlaybackError> {
        let mut session = self.shared.session.lock();

        if session.is_some() {
            log::debug!("Play requested while a session is active, ignoring");
            return Err(PlaybackError::AlreadyPlaying);
        }
        if notes.is_empty() {
            return Err(PlaybackError::EmptyPattern);
        }
        validate(notes, tempo)?;

        let context = self.devices.ensure_device()?;
        if notes.len() > context.capacity() {
            return Err(PlaybackError::TooManyNotes {
                count: notes.len(),
                capacity: context.capacity(),
            });
        }
        context.resume()?;

        let step = step_duration(tempo);
        let now = context.current_time();

        let voices: Vec<Arc<VoiceNode>> = notes
            .iter()
            .map(|note| {
                let timing = NoteTiming::for_note(note, now, step);
                Arc::new(VoiceNode::new(VoiceParams::for_note(note, pattern_type, timing)))
            })
            .collect();

        context.connect_all(&voices)?;

        let max_step = notes.iter().map(|n| n.step).max().unwrap_or(0);
        let total_duration = (max_step as f64 + TAIL_STEPS) * step;
        let id = self.shared.next_session.fetch_add(1, Ordering::SeqCst);
        let voice_count = voices.len();

        *session = Some(ActiveSession {
            id,
            context,
            voices,
        });
        self.shared.is_playing.store(true, Ordering::SeqCst);
        self.timer.arm(id, Duration::from_secs_f64(total_duration));
        drop(session);

        log::info!(
            "Playback session {} started: {} voices, {} at {} BPM, {:.2}s",
            id,
            voice_count,
            pattern_type,
            tempo,
            total_duration
        );
        self.shared.emit(PlaybackEvent::Started {
            session: id,
            voices: voice_count,
            total_duration,
        });

        Ok(())
    }

    /// Cancel the active session, silencing everything it scheduled
    ///
    /// Does nothing when idle, so it is safe to call repeatedly or after the
    /// session already completed on its own.
    pub fn stop(&self) {
        let stopped = {
            let mut session = self.shared.session.lock();
            let Some(active) = session.take() else {
                return;
            };
            self.timer.cancel(active.id);
            self.shared.is_playing.store(false, Ordering::SeqCst);
            active
        };

        let id = stopped.id;
        let halted = stopped.halt_all();
        log::info!("Playback session {} stopped ({} voices cut)", id, halted);
        self.shared.emit(PlaybackEvent::Stopped { session: id });
    }

    /// Stop playback and release the output device
    pub fn shutdown(&self) {
        self.stop();
        self.devices.teardown();
    }
}

impl Drop for PatternPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn validate(notes: &[NoteEvent], tempo: u32) -> Result<(), PlaybackError> {
    if !(MIN_TEMPO..=MAX_TEMPO).contains(&tempo) {
        return Err(PlaybackError::InvalidTempo(tempo));
    }
    for (index, note) in notes.iter().enumerate() {
        note.validate()
            .map_err(|reason| PlaybackError::InvalidNote { index, reason })?;
    }
    Ok(())
}
