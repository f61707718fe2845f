use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::queue::ClipSource;

#[derive(Debug, Clone, Error)]
pub enum PlaybackError {
    #[error("no output device")]
    NoOutputDevice,
    #[error("unsupported clip: {0}")]
    UnsupportedClip(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("output stream: {0}")]
    Stream(String),
}

/// Completion signals from the platform output primitive.
#[derive(Debug, Clone)]
pub enum SinkEvent {
    Ended,
    Errored(String),
}

/// The single audio-output channel. Owned exclusively by whichever queue
/// entry is currently playing; nothing else writes to it.
pub trait AudioSink: Send {
    fn play(&mut self, clip: &ClipSource, volume: f32, rate: f32) -> Result<(), PlaybackError>;
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
}

impl AudioSink for Box<dyn AudioSink> {
    fn play(&mut self, clip: &ClipSource, volume: f32, rate: f32) -> Result<(), PlaybackError> {
        (**self).play(clip, volume, rate)
    }

    fn pause(&mut self) {
        (**self).pause()
    }

    fn resume(&mut self) {
        (**self).resume()
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

enum OutCmd {
    Pause,
    Resume,
    Stop,
}

/// Speaker output through cpal. Clips are WAV; decode happens here, on the
/// playback thread, so the caller's task never touches sample data.
pub struct SpeakerSink {
    events: mpsc::UnboundedSender<SinkEvent>,
    active: Option<ActivePlayback>,
}

struct ActivePlayback {
    cmd: std::sync::mpsc::Sender<OutCmd>,
    join: Option<thread::JoinHandle<()>>,
}

impl SpeakerSink {
    pub fn new(events: mpsc::UnboundedSender<SinkEvent>) -> Self {
        Self {
            events,
            active: None,
        }
    }

    fn teardown(&mut self) {
        if let Some(mut active) = self.active.take() {
            let _ = active.cmd.send(OutCmd::Stop);
            if let Some(join) = active.join.take() {
                let _ = join.join();
            }
        }
    }
}

impl AudioSink for SpeakerSink {
    fn play(&mut self, clip: &ClipSource, volume: f32, rate: f32) -> Result<(), PlaybackError> {
        self.teardown();

        let bytes: Arc<Vec<u8>> = match clip {
            ClipSource::Buffer(buf) => Arc::clone(buf),
            ClipSource::Reference(path) => Arc::new(
                std::fs::read(path)
                    .map_err(|e| PlaybackError::UnsupportedClip(format!("{path}: {e}")))?,
            ),
        };

        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel::<OutCmd>();
        let events = self.events.clone();

        let join = thread::spawn(move || {
            match run_playback(&bytes, volume, rate, &cmd_rx) {
                // Completed naturally.
                Ok(true) => {
                    let _ = events.send(SinkEvent::Ended);
                }
                // Stopped from outside; the queue already accounted for it.
                Ok(false) => {}
                Err(e) => {
                    let _ = events.send(SinkEvent::Errored(e.to_string()));
                }
            }
        });

        self.active = Some(ActivePlayback {
            cmd: cmd_tx,
            join: Some(join),
        });
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(active) = &self.active {
            let _ = active.cmd.send(OutCmd::Pause);
        }
    }

    fn resume(&mut self) {
        if let Some(active) = &self.active {
            let _ = active.cmd.send(OutCmd::Resume);
        }
    }

    fn stop(&mut self) {
        self.teardown();
    }
}

impl Drop for SpeakerSink {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Decode, resample by step, and feed the output stream until the clip is
/// exhausted or a Stop arrives. Returns Ok(true) on natural end, Ok(false)
/// when stopped from outside.
fn run_playback(
    bytes: &[u8],
    volume: f32,
    rate: f32,
    cmd_rx: &std::sync::mpsc::Receiver<OutCmd>,
) -> Result<bool, PlaybackError> {
    let reader = hound::WavReader::new(std::io::Cursor::new(bytes))
        .map_err(|e| PlaybackError::Decode(e.to_string()))?;
    let spec = reader.spec();
    let mut samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .into_samples::<i16>()
            .filter_map(|s| s.ok())
            .map(|s| s as f32 / i16::MAX as f32)
            .collect(),
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .filter_map(|s| s.ok())
            .collect(),
    };
    if spec.channels > 1 {
        // Mix down to mono; the output callback fans back out.
        let ch = spec.channels as usize;
        samples = samples
            .chunks(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
            .collect();
    }
    for s in &mut samples {
        *s *= volume.clamp(0.0, 1.0);
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(PlaybackError::NoOutputDevice)?;
    let config = device
        .default_output_config()
        .map_err(|e| PlaybackError::Stream(e.to_string()))?;
    let out_rate = config.sample_rate().0;
    let out_channels = config.channels() as usize;

    // Playback-rate adjustment and device-rate conversion collapse into one
    // read step per output frame.
    let step = (spec.sample_rate as f64 / out_rate as f64) * rate.max(0.25) as f64;
    let total = samples.len();

    let rb = HeapRb::<f32>::new(out_rate as usize);
    let (mut producer, mut consumer) = rb.split();

    let err_fn = |err| tracing::error!("output stream error: {}", err);
    let stream = device
        .build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &_| {
                for frame in data.chunks_mut(out_channels) {
                    // Underruns render as silence; the feeder catches up.
                    let s = consumer.try_pop().unwrap_or(0.0);
                    for out in frame.iter_mut() {
                        *out = s;
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| PlaybackError::Stream(e.to_string()))?;
    stream
        .play()
        .map_err(|e| PlaybackError::Stream(e.to_string()))?;

    info!(
        "clip playing: {} samples at {}Hz -> {}Hz",
        total, spec.sample_rate, out_rate
    );

    let mut cursor = 0f64;
    let mut fed = 0usize;
    let mut paused = false;
    loop {
        match cmd_rx.recv_timeout(Duration::from_millis(20)) {
            Ok(OutCmd::Stop) | Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                debug!("playback stopped at sample {}", cursor as usize);
                return Ok(false);
            }
            Ok(OutCmd::Pause) => {
                paused = true;
                let _ = stream.pause();
            }
            Ok(OutCmd::Resume) => {
                paused = false;
                let _ = stream.play();
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
        }
        if paused {
            continue;
        }

        while cursor < total as f64 {
            let idx = cursor as usize;
            if producer.try_push(samples[idx]).is_err() {
                break;
            }
            fed += 1;
            cursor += step;
        }

        if cursor >= total as f64 && producer.occupied_len() == 0 {
            // Everything handed to the device; let the tail play out.
            thread::sleep(Duration::from_millis(50));
            debug!("clip drained after {} output samples", fed);
            return Ok(true);
        }
    }
}

/// Call log shared with whoever built the sink, since the sink itself is
/// consumed by the queue.
#[derive(Debug, Default)]
pub struct SinkProbe {
    pub played: std::sync::Mutex<Vec<(f32, f32)>>,
    pub stops: std::sync::atomic::AtomicUsize,
    pub pauses: std::sync::atomic::AtomicUsize,
    pub resumes: std::sync::atomic::AtomicUsize,
    pub fail_next: std::sync::Mutex<Option<PlaybackError>>,
}

impl SinkProbe {
    pub fn plays(&self) -> usize {
        self.played.lock().map(|p| p.len()).unwrap_or(0)
    }
}

/// A sink for hosts without an audio device and for tests: records calls
/// and, when `auto_complete` is set, reports each clip ended immediately.
pub struct ScriptedSink {
    events: mpsc::UnboundedSender<SinkEvent>,
    auto_complete: bool,
    probe: Arc<SinkProbe>,
}

impl ScriptedSink {
    pub fn new(events: mpsc::UnboundedSender<SinkEvent>) -> Self {
        Self {
            events,
            auto_complete: false,
            probe: Arc::new(SinkProbe::default()),
        }
    }

    pub fn auto_completing(events: mpsc::UnboundedSender<SinkEvent>) -> Self {
        let mut sink = Self::new(events);
        sink.auto_complete = true;
        sink
    }

    pub fn probe(&self) -> Arc<SinkProbe> {
        Arc::clone(&self.probe)
    }
}

impl AudioSink for ScriptedSink {
    fn play(&mut self, _clip: &ClipSource, volume: f32, rate: f32) -> Result<(), PlaybackError> {
        if let Ok(mut fail) = self.probe.fail_next.lock() {
            if let Some(err) = fail.take() {
                return Err(err);
            }
        }
        if let Ok(mut played) = self.probe.played.lock() {
            played.push((volume, rate));
        }
        if self.auto_complete {
            let _ = self.events.send(SinkEvent::Ended);
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.probe
            .pauses
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn resume(&mut self) {
        self.probe
            .resumes
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    fn stop(&mut self) {
        self.probe
            .stops
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}
