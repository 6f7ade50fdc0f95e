//! Completion timer for playback sessions
//!
//! One worker thread per player sleeps until the armed deadline and then
//! reports which session ran out. Cancelling never joins the worker, so it is
//! safe to call while holding locks the callback also takes.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

struct Armed {
    session: u64,
    deadline: Instant,
}

struct TimerState {
    armed: Option<Armed>,
    shutdown: bool,
}

struct TimerShared {
    state: Mutex<TimerState>,
    wake: Condvar,
}

/// Single-shot, re-armable timer keyed by session id
pub struct CompletionTimer {
    shared: Arc<TimerShared>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl CompletionTimer {
    /// Spawn the worker; `on_fire` receives the id of the expired session
    pub fn new<F>(on_fire: F) -> Self
    where
        F: Fn(u64) + Send + 'static,
    {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                armed: None,
                shutdown: false,
            }),
            wake: Condvar::new(),
        });

        let shared_clone = Arc::clone(&shared);
        let thread_handle = thread::Builder::new()
            .name("playback-timer".to_string())
            .spawn(move || timer_thread(shared_clone, on_fire))
            .ok();

        if thread_handle.is_none() {
            log::error!("Failed to spawn playback timer thread; sessions will only end on stop()");
        }

        Self {
            shared,
            thread_handle,
        }
    }

    /// Fire for `session` after `after`, replacing any previous deadline
    pub fn arm(&self, session: u64, after: Duration) {
        let mut state = self.shared.state.lock();
        state.armed = Some(Armed {
            session,
            deadline: Instant::now() + after,
        });
        self.shared.wake.notify_one();
    }

    /// Disarm if still pending for `session`. Returns false if it already fired
    /// or was armed for another session.
    pub fn cancel(&self, session: u64) -> bool {
        let mut state = self.shared.state.lock();
        if !state.armed.as_ref().is_some_and(|a| a.session == session) {
            return false;
        }
        state.armed = None;
        self.shared.wake.notify_one();
        true
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.shared.state.lock().armed.is_some()
    }
}

impl Drop for CompletionTimer {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            state.armed = None;
            self.shared.wake.notify_one();
        }

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

fn timer_thread<F: Fn(u64)>(shared: Arc<TimerShared>, on_fire: F) {
    let mut state = shared.state.lock();

    loop {
        if state.shutdown {
            break;
        }

        let armed = state.armed.as_ref().map(|a| (a.session, a.deadline));
        let Some((session, deadline)) = armed else {
            shared.wake.wait(&mut state);
            continue;
        };

        if Instant::now() >= deadline {
            state.armed = None;
            // Run the callback unlocked so it may arm or cancel freely
            MutexGuard::unlocked(&mut state, || on_fire(session));
        } else {
            // Woken early by arm/cancel/shutdown or timed out; re-check either way
            let _ = shared.wake.wait_until(&mut state, deadline);
        }
    }
}
