//! End-to-end playback sessions against the offline backend

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use audiomancer::audio::synth::Waveform;
use audiomancer::{
    ActivationPolicy, DeviceManager, DeviceState, NoteEvent, OfflineBackend, Pattern,
    PatternPlayer, PatternType, PlaybackError, PlaybackEvent,
};
use audiomancer::audio::device::AudioConfig;

const RATE: u32 = 1000;

fn player(policy: ActivationPolicy) -> PatternPlayer {
    let devices = DeviceManager::new(
        Box::new(OfflineBackend::new(RATE)),
        AudioConfig::default(),
        256,
        policy,
    );
    PatternPlayer::new(Arc::new(devices))
}

fn record_events(player: &PatternPlayer) -> Arc<Mutex<Vec<PlaybackEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    player.set_listener(move |event| sink.lock().push(event.clone()));
    events
}

fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn single_note_plays_and_completes() {
    let player = player(ActivationPolicy::Immediate);
    let events = record_events(&player);

    player
        .start(&[NoteEvent::new(60, 0, 1)], 120, PatternType::Melody)
        .unwrap();
    assert!(player.is_playing());

    let voices = player.current_voices();
    assert_eq!(voices.len(), 1);
    assert_eq!(voices[0].start_time(), 0.0);
    assert!((voices[0].stop_time() - 0.225).abs() < 1e-9);
    assert_eq!(voices[0].waveform, Waveform::Sine);
    assert!((voices[0].frequency - 261.63).abs() < 0.01);

    // (0 + 4) steps of 0.25s
    assert!(wait_for(|| events.lock().len() == 2, Duration::from_secs(4)));
    assert!(!player.is_playing());

    let events = events.lock();
    match &events[0] {
        PlaybackEvent::Started { total_duration, voices, .. } => {
            assert_eq!(*voices, 1);
            assert!((total_duration - 1.0).abs() < 1e-9);
        }
        other => panic!("unexpected first event {:?}", other),
    }
    assert!(matches!(events[1], PlaybackEvent::Completed { .. }));
    assert_eq!(events[0].session(), events[1].session());
}

#[test]
fn bassline_pattern_uses_sawtooth() {
    let player = player(ActivationPolicy::Immediate);
    let pattern = Pattern::from_json(
        r#"{
            "notes": [
                {"note": 36, "step": 0, "duration": 2},
                {"note": 43, "step": 2, "duration": 2},
                {"note": 41, "step": 4, "duration": 2},
                {"note": 38, "step": 6, "duration": 2}
            ],
            "tempo": 100,
            "type": "bassline"
        }"#,
    )
    .unwrap();

    player.play_pattern(&pattern).unwrap();
    let voices = player.current_voices();
    assert_eq!(voices.len(), 4);
    assert!(voices.iter().all(|v| v.waveform == Waveform::Sawtooth));
}

#[test]
fn stop_silences_output_immediately() {
    let player = player(ActivationPolicy::Immediate);
    let events = record_events(&player);

    let notes: Vec<NoteEvent> = (0..8).map(|i| NoteEvent::new(60 + i, i as u32, 2)).collect();
    player.start(&notes, 120, PatternType::Melody).unwrap();

    let ctx = player.devices().ensure_device().unwrap();
    assert_eq!(ctx.state(), DeviceState::Running);

    let mut buffer = vec![0.0f32; (RATE / 2) as usize];
    ctx.render(&mut buffer, 1);
    assert!((ctx.current_time() - 0.5).abs() < 1e-9);
    assert!(buffer.iter().any(|s| s.abs() > 0.01));

    player.stop();
    assert!(!player.is_playing());
    assert!(player.current_voices().is_empty());

    ctx.render(&mut buffer, 1);
    assert!(buffer.iter().all(|s| *s == 0.0));
    assert_eq!(ctx.live_voices(), 0);

    let events = events.lock();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[1], PlaybackEvent::Stopped { .. }));
}

#[test]
fn rendered_output_stays_in_range() {
    let player = player(ActivationPolicy::Immediate);
    // A dense chord stacked on every step
    let notes: Vec<NoteEvent> = (0..8)
        .flat_map(|step| (0..6).map(move |i| NoteEvent::new(48 + i * 4, step, 1)))
        .collect();
    player.start(&notes, 240, PatternType::Harmony).unwrap();

    let ctx = player.devices().ensure_device().unwrap();
    let mut buffer = vec![0.0f32; RATE as usize * 2];
    ctx.render(&mut buffer, 2);
    assert!(buffer.iter().all(|s| s.is_finite() && (-1.0..=1.0).contains(s)));
}

#[test]
fn second_start_is_ignored() {
    let player = player(ActivationPolicy::Immediate);
    player
        .start(&[NoteEvent::new(60, 0, 4)], 120, PatternType::Melody)
        .unwrap();

    assert_eq!(
        player.start(&[NoteEvent::new(72, 0, 1)], 120, PatternType::Drums),
        Err(PlaybackError::AlreadyPlaying)
    );
    let voices = player.current_voices();
    assert_eq!(voices.len(), 1);
    assert_eq!(voices[0].pitch, 60);
}

#[test]
fn empty_pattern_is_rejected() {
    let player = player(ActivationPolicy::Immediate);
    assert_eq!(
        player.start(&[], 120, PatternType::Melody),
        Err(PlaybackError::EmptyPattern)
    );
    assert!(!player.is_playing());
}

#[test]
fn stop_twice_is_harmless() {
    let player = player(ActivationPolicy::Immediate);
    player
        .start(&[NoteEvent::new(60, 0, 1)], 120, PatternType::Melody)
        .unwrap();
    player.stop();
    player.stop();
    assert!(!player.is_playing());
}

#[test]
fn gesture_gates_first_playback() {
    let player = player(ActivationPolicy::RequireGesture);
    let notes = [NoteEvent::new(60, 0, 1)];

    assert!(matches!(
        player.start(&notes, 120, PatternType::Melody),
        Err(PlaybackError::DeviceUnavailable(_))
    ));

    player.devices().user_gesture().unwrap();
    player.start(&notes, 120, PatternType::Melody).unwrap();
    assert!(player.is_playing());
}

#[test]
fn shutdown_releases_device_and_allows_reopen() {
    let player = player(ActivationPolicy::Immediate);
    player
        .start(&[NoteEvent::new(60, 0, 1)], 120, PatternType::Melody)
        .unwrap();
    let first = player.devices().ensure_device().unwrap();

    player.shutdown();
    assert!(!player.is_playing());
    assert!(!player.devices().is_open());
    assert_eq!(first.state(), DeviceState::Closed);

    player
        .start(&[NoteEvent::new(62, 0, 1)], 120, PatternType::Melody)
        .unwrap();
    let second = player.devices().ensure_device().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.state(), DeviceState::Running);
}

#[test]
fn long_note_keeps_sounding_after_completion() {
    let player = player(ActivationPolicy::Immediate);
    let events = record_events(&player);

    // Tail ends at 0.5s, the note stops at 16 * 0.125 * 0.9 = 1.8s
    player
        .start(&[NoteEvent::new(48, 0, 16)], 240, PatternType::Melody)
        .unwrap();
    assert!(wait_for(|| events.lock().len() == 2, Duration::from_secs(3)));
    assert!(!player.is_playing());
    assert!(player.is_sounding());

    let ctx = player.devices().current().unwrap();
    let mut buffer = vec![0.0f32; 600];
    ctx.render(&mut buffer, 1);
    let peak = buffer.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    assert!(peak > 0.25);

    while player.is_sounding() {
        ctx.render(&mut buffer, 1);
        assert!(ctx.current_time() < 3.0);
    }
    assert_eq!(ctx.live_voices(), 0);
    assert!(ctx.current_time() >= 1.8);
}
