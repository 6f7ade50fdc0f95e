//! Output backends that open a device context
//!
//! - `CpalBackend` drives the render graph from a real output device
//! - `OfflineBackend` has no device at all; the caller renders buffers by hand
//!   (tests, headless rendering)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use cpal::traits::{DeviceTrait, StreamTrait};
use parking_lot::Mutex;

use super::device::{get_output_device, get_supported_config, AudioConfig};
use super::engine::{AudioContext, AudioGraph};
use crate::error::DeviceError;

/// Start/stop control over whatever is pulling samples out of the graph
pub trait StreamControl: Send + Sync {
    fn resume(&self) -> Result<(), DeviceError>;
    fn suspend(&self) -> Result<(), DeviceError>;
    /// Release the stream; called at most once per context
    fn close(&self);
}

/// Something that can open an audio context
pub trait OutputBackend: Send + Sync {
    fn name(&self) -> &str;
    fn open(&self, config: &AudioConfig, graph_capacity: usize) -> Result<AudioContext, DeviceError>;
}

// =============================================================================
// CPAL
// =============================================================================

enum StreamCommand {
    Play(mpsc::SyncSender<Result<(), DeviceError>>),
    Pause(mpsc::SyncSender<Result<(), DeviceError>>),
    Close,
}

/// Opens the configured output device through cpal
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    device_name: Option<String>,
}

impl CpalBackend {
    /// `None` picks the system default output device
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl OutputBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open(&self, config: &AudioConfig, graph_capacity: usize) -> Result<AudioContext, DeviceError> {
        // cpal::Stream isn't Send on every platform, so it lives on its own
        // thread for its whole life and is driven through a channel.
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (command_tx, command_rx) = mpsc::channel();

        let device_name = self.device_name.clone();
        let config = config.clone();

        let thread = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                output_thread(device_name, config, graph_capacity, ready_tx, command_rx);
            })
            .map_err(|e| DeviceError::Stream(format!("Failed to spawn output thread: {}", e)))?;

        let graph = match ready_rx.recv() {
            Ok(Ok(graph)) => graph,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(DeviceError::Stream("Output thread exited during setup".to_string()));
            }
        };

        let control = CpalStreamControl {
            commands: Mutex::new(command_tx),
            thread: Mutex::new(Some(thread)),
        };

        Ok(AudioContext::new(graph, Box::new(control), self.name()))
    }
}

fn output_thread(
    device_name: Option<String>,
    config: AudioConfig,
    graph_capacity: usize,
    ready: mpsc::SyncSender<Result<Arc<AudioGraph>, DeviceError>>,
    commands: mpsc::Receiver<StreamCommand>,
) {
    let (stream, graph) = match build_stream(device_name.as_deref(), &config, graph_capacity) {
        Ok(built) => built,
        Err(e) => {
            log::error!("Failed to open output device: {}", e);
            let _ = ready.send(Err(e));
            return;
        }
    };

    if ready.send(Ok(Arc::clone(&graph))).is_err() {
        return;
    }

    for command in commands {
        match command {
            StreamCommand::Play(reply) => {
                let result = stream
                    .play()
                    .map_err(|e| DeviceError::Stream(format!("Failed to start stream: {}", e)));
                let _ = reply.send(result);
            }
            StreamCommand::Pause(reply) => {
                let result = stream
                    .pause()
                    .map_err(|e| DeviceError::Stream(format!("Failed to pause stream: {}", e)));
                let _ = reply.send(result);
            }
            StreamCommand::Close => break,
        }
    }

    drop(stream);
    log::debug!("Output stream released");
}

fn build_stream(
    device_name: Option<&str>,
    config: &AudioConfig,
    graph_capacity: usize,
) -> Result<(cpal::Stream, Arc<AudioGraph>), DeviceError> {
    let device = get_output_device(device_name)?;
    let stream_config = get_supported_config(&device, config)?;

    let sample_rate = stream_config.sample_rate.0;
    let channels = stream_config.channels as usize;

    log::info!(
        "Opening output device {:?}: {} Hz, {} channels",
        device.name().unwrap_or_else(|_| "<unknown>".to_string()),
        sample_rate,
        channels
    );

    let graph = Arc::new(AudioGraph::new(sample_rate, graph_capacity));
    let graph_clone = Arc::clone(&graph);

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                graph_clone.render(data, channels);
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None, // No timeout
        )
        .map_err(|e| DeviceError::Stream(format!("Failed to build output stream: {}", e)))?;

    // Some hosts start streams on creation; contexts begin suspended
    if let Err(e) = stream.pause() {
        log::debug!("Stream could not be paused after creation: {}", e);
    }

    Ok((stream, graph))
}

struct CpalStreamControl {
    commands: Mutex<mpsc::Sender<StreamCommand>>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CpalStreamControl {
    fn request(
        &self,
        make: fn(mpsc::SyncSender<Result<(), DeviceError>>) -> StreamCommand,
    ) -> Result<(), DeviceError> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.commands
            .lock()
            .send(make(reply_tx))
            .map_err(|_| DeviceError::Closed)?;
        reply_rx.recv().map_err(|_| DeviceError::Closed)?
    }
}

impl StreamControl for CpalStreamControl {
    fn resume(&self) -> Result<(), DeviceError> {
        self.request(StreamCommand::Play)
    }

    fn suspend(&self) -> Result<(), DeviceError> {
        self.request(StreamCommand::Pause)
    }

    fn close(&self) {
        let _ = self.commands.lock().send(StreamCommand::Close);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

// =============================================================================
// OFFLINE
// =============================================================================

/// Backend without a device; buffers are pulled with `AudioContext::render`
#[derive(Debug)]
pub struct OfflineBackend {
    sample_rate: u32,
    failure: Option<DeviceError>,
    opened: AtomicUsize,
}

impl OfflineBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            failure: None,
            opened: AtomicUsize::new(0),
        }
    }

    /// A backend whose every `open` fails with `error`
    pub fn failing(error: DeviceError) -> Self {
        Self {
            sample_rate: AudioConfig::default().sample_rate,
            failure: Some(error),
            opened: AtomicUsize::new(0),
        }
    }

    /// How many times `open` was attempted
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl OutputBackend for OfflineBackend {
    fn name(&self) -> &str {
        "offline"
    }

    fn open(&self, _config: &AudioConfig, graph_capacity: usize) -> Result<AudioContext, DeviceError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        let graph = Arc::new(AudioGraph::new(self.sample_rate, graph_capacity));
        Ok(AudioContext::new(graph, Box::new(OfflineControl), self.name()))
    }
}

struct OfflineControl;

impl StreamControl for OfflineControl {
    fn resume(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn suspend(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::engine::DeviceState;

    #[test]
    fn test_offline_open() {
        let backend = OfflineBackend::new(8000);
        let ctx = backend.open(&AudioConfig::default(), 16).unwrap();
        assert_eq!(ctx.sample_rate(), 8000);
        assert_eq!(ctx.capacity(), 16);
        assert_eq!(ctx.state(), DeviceState::Suspended);
        assert_eq!(ctx.backend(), "offline");
        assert_eq!(backend.open_count(), 1);
    }

    #[test]
    fn test_failing_backend() {
        let backend = OfflineBackend::failing(DeviceError::NoOutputDevice);
        let result = backend.open(&AudioConfig::default(), 16);
        assert!(matches!(result, Err(DeviceError::NoOutputDevice)));
        assert_eq!(backend.open_count(), 1);
    }
}
