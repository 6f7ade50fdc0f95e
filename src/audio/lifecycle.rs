//! Device lifecycle: one lazily opened audio context shared by every player
//!
//! Platforms commonly refuse to start audio output before the user has
//! interacted with the app, so under `ActivationPolicy::RequireGesture` the
//! context is only created once `user_gesture()` has been called. Hosts call
//! `teardown()` explicitly when the app shuts down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::device::AudioConfig;
use super::engine::AudioContext;
use super::output::OutputBackend;
use crate::error::DeviceError;

/// When the device may be opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationPolicy {
    /// Wait for `user_gesture()`
    #[default]
    RequireGesture,
    /// Open on first use
    Immediate,
}

/// Owner of the shared audio context
pub struct DeviceManager {
    backend: Box<dyn OutputBackend>,
    config: AudioConfig,
    graph_capacity: usize,
    policy: ActivationPolicy,
    activated: AtomicBool,
    context: Mutex<Option<Arc<AudioContext>>>,
}

impl DeviceManager {
    pub fn new(
        backend: Box<dyn OutputBackend>,
        config: AudioConfig,
        graph_capacity: usize,
        policy: ActivationPolicy,
    ) -> Self {
        Self {
            backend,
            config,
            graph_capacity,
            policy,
            activated: AtomicBool::new(policy == ActivationPolicy::Immediate),
            context: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> ActivationPolicy {
        self.policy
    }

    pub fn is_activated(&self) -> bool {
        self.activated.load(Ordering::SeqCst)
    }

    /// Whether a context is currently open
    pub fn is_open(&self) -> bool {
        self.context.lock().is_some()
    }

    /// The open context, without opening one
    pub fn current(&self) -> Option<Arc<AudioContext>> {
        self.context.lock().clone()
    }

    /// Record a qualifying user interaction and open the device
    ///
    /// Safe to call on every interaction; only the first one opens anything.
    pub fn user_gesture(&self) -> Result<Arc<AudioContext>, DeviceError> {
        if !self.activated.swap(true, Ordering::SeqCst) {
            log::debug!("User gesture received, audio output activated");
        }
        self.ensure_device()
    }

    /// Return the shared context, opening it on first use
    ///
    /// A failed open is reported to the caller and not retried; the next call
    /// makes a fresh attempt.
    pub fn ensure_device(&self) -> Result<Arc<AudioContext>, DeviceError> {
        if !self.is_activated() {
            return Err(DeviceError::NotActivated);
        }

        let mut context = self.context.lock();
        if let Some(ctx) = context.as_ref() {
            return Ok(Arc::clone(ctx));
        }

        log::info!("Opening audio context via {} backend", self.backend.name());
        let ctx = Arc::new(self.backend.open(&self.config, self.graph_capacity)?);
        log::info!(
            "Audio context ready: {} Hz, state {:?}",
            ctx.sample_rate(),
            ctx.state()
        );
        *context = Some(Arc::clone(&ctx));
        Ok(ctx)
    }

    /// Close the shared context, if one was opened
    pub fn teardown(&self) {
        let taken = self.context.lock().take();
        if let Some(ctx) = taken {
            ctx.close();
            log::info!("Audio device torn down");
        }
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::engine::DeviceState;
    use crate::audio::output::OfflineBackend;

    fn manager(policy: ActivationPolicy) -> DeviceManager {
        DeviceManager::new(
            Box::new(OfflineBackend::new(1000)),
            AudioConfig::default(),
            16,
            policy,
        )
    }

    #[test]
    fn test_requires_gesture() {
        let devices = manager(ActivationPolicy::RequireGesture);
        assert!(matches!(devices.ensure_device(), Err(DeviceError::NotActivated)));
        assert!(!devices.is_open());
        assert!(devices.current().is_none());

        let ctx = devices.user_gesture().unwrap();
        assert!(devices.is_open());
        assert!(devices.current().is_some_and(|c| Arc::ptr_eq(&c, &ctx)));
        assert!(devices.ensure_device().is_ok());
    }

    #[test]
    fn test_ensure_device_is_cached() {
        let devices = manager(ActivationPolicy::Immediate);
        let a = devices.ensure_device().unwrap();
        let b = devices.ensure_device().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_teardown() {
        let devices = manager(ActivationPolicy::Immediate);

        // Nothing opened yet
        devices.teardown();

        let ctx = devices.ensure_device().unwrap();
        devices.teardown();
        assert_eq!(ctx.state(), DeviceState::Closed);
        assert!(!devices.is_open());
        devices.teardown();

        // A later request opens a fresh context
        let fresh = devices.ensure_device().unwrap();
        assert!(!Arc::ptr_eq(&ctx, &fresh));
        assert_eq!(fresh.state(), DeviceState::Suspended);
    }

    #[test]
    fn test_failed_open_is_not_cached() {
        let devices = DeviceManager::new(
            Box::new(OfflineBackend::failing(DeviceError::NoOutputDevice)),
            AudioConfig::default(),
            16,
            ActivationPolicy::Immediate,
        );
        assert!(matches!(devices.ensure_device(), Err(DeviceError::NoOutputDevice)));
        assert!(matches!(devices.ensure_device(), Err(DeviceError::NoOutputDevice)));
        assert!(!devices.is_open());
    }
}
