//! Playback notifications for the host UI

use std::sync::Arc;

use serde::Serialize;

/// Lifecycle changes of a playback session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackEvent {
    /// Voices are scheduled and the session is active
    Started {
        session: u64,
        voices: usize,
        /// Seconds until the session is considered finished
        total_duration: f64,
    },
    /// Cancelled by `stop()`
    Stopped { session: u64 },
    /// The completion timer ran out
    Completed { session: u64 },
}

impl PlaybackEvent {
    pub fn session(&self) -> u64 {
        match self {
            PlaybackEvent::Started { session, .. }
            | PlaybackEvent::Stopped { session }
            | PlaybackEvent::Completed { session } => *session,
        }
    }

    /// Whether the session is over after this event
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PlaybackEvent::Started { .. })
    }
}

/// Callback receiving playback events; invoked from whichever thread caused them
pub type PlaybackListener = Arc<dyn Fn(&PlaybackEvent) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = PlaybackEvent::Completed { session: 7 };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"completed","session":7}"#);
        assert!(event.is_terminal());
        assert_eq!(event.session(), 7);
    }

    #[test]
    fn test_started_is_not_terminal() {
        let event = PlaybackEvent::Started {
            session: 1,
            voices: 3,
            total_duration: 1.0,
        };
        assert!(!event.is_terminal());
    }
}
