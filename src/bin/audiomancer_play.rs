//! Pattern player host
//!
//! Plays a pattern file through the configured output device and exits when
//! the last note has faded out.
//!
//! Usage:
//!   audiomancer-play <pattern-file> [--tempo BPM] [--type TYPE]
//!   audiomancer-play --list-devices
//!
//! The file holds either a full pattern object
//! (`{"notes": [...], "tempo": 120, "type": "melody"}`) or a bare note array
//! as produced by the generator. `--tempo` and `--type` override the file.
//! `--list-devices` prints the names accepted by the `output_device` setting.

use std::env;
use std::fs;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use audiomancer::audio::device::{list_output_devices, AudioDeviceInfo};
use audiomancer::audio::midi::parse_note_list;
use audiomancer::audio::synth::{step_duration, GATE_RATIO};
use audiomancer::logging::{init_logging, log_file_path};
use audiomancer::{
    ActivationPolicy, CpalBackend, DeviceManager, EngineConfig, Pattern, PatternPlayer,
    PatternType, PlaybackEvent,
};

const DEFAULT_TEMPO: u32 = 120;

/// Extra wait past the last note's stop time before giving up on the device clock
const DRAIN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, PartialEq)]
struct PlayArgs {
    path: String,
    tempo: Option<u32>,
    pattern_type: Option<PatternType>,
}

#[derive(Debug, PartialEq)]
enum Command {
    Play(PlayArgs),
    ListDevices,
    Help,
}

fn usage() {
    eprintln!(
        "Usage: audiomancer-play <pattern-file> [--tempo BPM] [--type melody|bassline|drums|harmony]\n       audiomancer-play --list-devices"
    );
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Command, String> {
    let mut args = args.into_iter();
    let mut path = None;
    let mut tempo = None;
    let mut pattern_type = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--tempo" => {
                let value = args.next().ok_or("--tempo needs a value")?;
                tempo = Some(
                    value
                        .parse::<u32>()
                        .map_err(|_| format!("Invalid tempo: {}", value))?,
                );
            }
            "--type" => {
                let value = args.next().ok_or("--type needs a value")?;
                pattern_type = Some(value.parse::<PatternType>().map_err(|e| e.to_string())?);
            }
            "--list-devices" => return Ok(Command::ListDevices),
            "-h" | "--help" => return Ok(Command::Help),
            other if other.starts_with("--") => {
                return Err(format!("Unknown option: {}", other));
            }
            other if path.is_none() => path = Some(other.to_string()),
            other => return Err(format!("Unexpected argument: {}", other)),
        }
    }

    let path = path.ok_or("Missing pattern file")?;
    Ok(Command::Play(PlayArgs {
        path,
        tempo,
        pattern_type,
    }))
}

fn device_line(device: &AudioDeviceInfo) -> String {
    if device.is_default {
        format!("* {} (default)", device.name)
    } else {
        format!("  {}", device.name)
    }
}

fn load_pattern(args: &PlayArgs) -> Result<Pattern, String> {
    let text = fs::read_to_string(&args.path)
        .map_err(|e| format!("Failed to read {}: {}", args.path, e))?;

    let mut pattern = if text.trim_start().starts_with('{') {
        Pattern::from_json(&text).map_err(|e| e.to_string())?
    } else {
        let notes = parse_note_list(&text).map_err(|e| e.to_string())?;
        Pattern::new(notes, DEFAULT_TEMPO, PatternType::default())
    };

    if let Some(tempo) = args.tempo {
        pattern.tempo = tempo;
    }
    if let Some(pattern_type) = args.pattern_type {
        pattern.pattern_type = pattern_type;
    }
    Ok(pattern)
}

/// Seconds from start until the last note stops sounding
fn sounding_length(pattern: &Pattern) -> f64 {
    let step = step_duration(pattern.tempo);
    pattern
        .notes
        .iter()
        .map(|n| (n.step as f64 + n.duration as f64 * GATE_RATIO) * step)
        .fold(0.0, f64::max)
}

fn list_devices() -> i32 {
    match list_output_devices() {
        Ok(devices) if devices.is_empty() => {
            println!("No output devices found");
            0
        }
        Ok(devices) => {
            for device in &devices {
                println!("{}", device_line(device));
            }
            0
        }
        Err(e) => {
            log::error!("{}", e);
            1
        }
    }
}

fn play(config: &EngineConfig, args: &PlayArgs) -> i32 {
    let pattern = match load_pattern(args) {
        Ok(pattern) => pattern,
        Err(e) => {
            log::error!("{}", e);
            return 1;
        }
    };
    log::info!(
        "Playing {} ({} notes, {} at {} BPM)",
        args.path,
        pattern.notes.len(),
        pattern.pattern_type,
        pattern.tempo
    );

    // Launching the command is the user's gesture
    let devices = DeviceManager::new(
        Box::new(CpalBackend::new(config.output_device.clone())),
        config.audio.clone(),
        config.graph_capacity,
        ActivationPolicy::Immediate,
    );
    let player = PatternPlayer::new(Arc::new(devices));
    player.set_listener(|event| match event {
        PlaybackEvent::Started { total_duration, .. } => {
            println!("playing ({:.2}s)", total_duration)
        }
        PlaybackEvent::Stopped { .. } => println!("stopped"),
        PlaybackEvent::Completed { .. } => println!("done"),
    });

    let started = Instant::now();
    if let Err(e) = player.play_pattern(&pattern) {
        log::error!("Playback failed: {}", e);
        player.shutdown();
        return 1;
    }

    // Notes longer than the completion tail keep ringing after `Completed`
    let deadline = started + Duration::from_secs_f64(sounding_length(&pattern)) + DRAIN_GRACE;
    while player.is_sounding() {
        if !player.is_playing() && Instant::now() >= deadline {
            log::warn!("Output clock stalled, closing with voices still live");
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }

    player.shutdown();
    0
}

fn main() {
    let config = match EngineConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    init_logging(&config.logging);
    if let Some(path) = log_file_path() {
        log::debug!("Logging to {}", path.display());
    }

    let code = match parse_args(env::args().skip(1)) {
        Ok(Command::Play(args)) => play(&config, &args),
        Ok(Command::ListDevices) => list_devices(),
        Ok(Command::Help) => {
            usage();
            0
        }
        Err(e) => {
            eprintln!("error: {}", e);
            usage();
            2
        }
    };

    log::info!("audiomancer-play finished");
    process::exit(code);
}
