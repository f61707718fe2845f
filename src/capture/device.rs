use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use tracing::{debug, info};

use crate::error::{VoiceError, VoiceErrorKind, VoiceResult};
use crate::session::state::PermissionStatus;

use super::{CaptureDevice, WarmStream};
use async_trait::async_trait;

/// Rates the VAD accepts, preferred first.
const TARGET_RATES: [u32; 4] = [16000, 32000, 48000, 8000];

/// Real microphone behind cpal.
///
/// Desktop hosts have no permission prompt, so permission resolves from
/// device presence. The warm stream runs on a dedicated thread because the
/// platform stream handle must stay on the thread that built it.
pub struct MicrophoneInput;

impl MicrophoneInput {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CaptureDevice for MicrophoneInput {
    fn is_available(&self) -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    fn query_permission(&self) -> PermissionStatus {
        // No OS prompt on desktop: presence is permission.
        if self.is_available() {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }

    async fn request_permission(&mut self) -> PermissionStatus {
        self.query_permission()
    }

    async fn acquire_warmup(&mut self) -> VoiceResult<Box<dyn WarmStream>> {
        let (setup_tx, setup_rx) = tokio::sync::oneshot::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let level = Arc::new(AtomicU32::new(0));
        let level_writer = Arc::clone(&level);

        let join = thread::spawn(move || {
            let (_stream, rate, mut consumer) = match build_input_stream() {
                Ok(built) => built,
                Err(e) => {
                    let _ = setup_tx.send(Err(e));
                    return;
                }
            };
            let _ = setup_tx.send(Ok(rate));

            let mut buf = vec![0.0f32; 1024];
            loop {
                match stop_rx.recv_timeout(Duration::from_millis(50)) {
                    Ok(()) | Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                }
                let n = consumer.pop_slice(&mut buf);
                if n > 0 {
                    let sq: f32 = buf[..n].iter().map(|&x| x * x).sum();
                    let rms = (sq / n as f32).sqrt();
                    level_writer.store(rms.to_bits(), Ordering::Relaxed);
                }
            }
            debug!("warm-up stream thread exiting");
        });

        let rate = match setup_rx.await {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(VoiceError::new(
                    VoiceErrorKind::MicrophoneBusy,
                    "warm-up thread died during setup",
                ))
            }
        };

        info!("microphone warmed at {}Hz", rate);
        Ok(Box::new(CpalWarmStream {
            stop: Some(stop_tx),
            join: Some(join),
            level,
        }))
    }
}

struct CpalWarmStream {
    stop: Option<std::sync::mpsc::Sender<()>>,
    join: Option<thread::JoinHandle<()>>,
    level: Arc<AtomicU32>,
}

impl WarmStream for CpalWarmStream {
    fn level(&mut self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }
}

impl Drop for CpalWarmStream {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

type BuiltInput = (cpal::Stream, u32, HeapCons<f32>);

/// Select a VAD-compatible input config and start the stream, pushing
/// samples into a ring buffer. Mirrors the platform quirks: some backends
/// only expose i16, and rates outside the VAD set are rejected.
pub(crate) fn build_input_stream() -> VoiceResult<BuiltInput> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| VoiceError::new(VoiceErrorKind::NoMicrophone, "no input device"))?;

    info!("input device: {}", device.name().unwrap_or_default());

    let mut selected = None;
    let mut selected_rate = 0;
    for &rate in &TARGET_RATES {
        let configs = device.supported_input_configs().map_err(|e| {
            VoiceError::new(VoiceErrorKind::MicrophoneBusy, format!("config query: {e}"))
        })?;
        for range in configs {
            if range.min_sample_rate().0 <= rate && range.max_sample_rate().0 >= rate {
                selected = Some(range.with_sample_rate(cpal::SampleRate(rate)));
                selected_rate = rate;
                break;
            }
        }
        if selected.is_some() {
            break;
        }
    }
    let config = selected.ok_or_else(|| {
        VoiceError::new(
            VoiceErrorKind::PlatformUnsupported,
            "no VAD-compatible sample rate (8k/16k/32k/48k)",
        )
    })?;

    let rb = HeapRb::<f32>::new(selected_rate as usize * 2);
    let (mut producer, consumer) = rb.split();

    let err_fn = |err| tracing::error!("input stream error: {}", err);
    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device
            .build_input_stream(
                &config.into(),
                move |data: &[f32], _: &_| {
                    // Lossy on overrun: a stalled consumer must not block capture.
                    producer.push_slice(data);
                },
                err_fn,
                None,
            )
            .map_err(|e| VoiceError::new(VoiceErrorKind::MicrophoneBusy, e.to_string()))?,
        cpal::SampleFormat::I16 => device
            .build_input_stream(
                &config.into(),
                move |data: &[i16], _: &_| {
                    for &s in data {
                        let _ = producer.try_push(s as f32 / i16::MAX as f32);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| VoiceError::new(VoiceErrorKind::MicrophoneBusy, e.to_string()))?,
        other => {
            return Err(VoiceError::new(
                VoiceErrorKind::PlatformUnsupported,
                format!("unsupported sample format {other:?}"),
            ))
        }
    };

    stream
        .play()
        .map_err(|e| VoiceError::new(VoiceErrorKind::MicrophoneBusy, e.to_string()))?;

    Ok((stream, selected_rate, consumer))
}
