use std::sync::Arc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{VoiceError, VoiceErrorKind, VoiceResult};

use super::activity::{ActivityDetector, ActivitySignal};
use super::device::build_input_stream;
use super::{CaptureErrorCode, CaptureEvent, CaptureOptions, SpeechCapture};

/// Turns an utterance's samples into text. The real one calls out over HTTP;
/// failures surface as typed capture errors.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        samples: &[f32],
        sample_rate: u32,
        language: &str,
    ) -> VoiceResult<String>;
}

#[derive(Deserialize)]
struct TranscriptResponse {
    text: String,
}

/// HTTP transcription client with a hard network-level timeout.
pub struct HttpTranscriber {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTranscriber {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
        }
    }

    fn encode_wav(samples: &[f32], sample_rate: u32) -> VoiceResult<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(|e| {
                VoiceError::new(VoiceErrorKind::Recognition, format!("wav encode: {e}"))
            })?;
            for &s in samples {
                let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer.write_sample(v).map_err(|e| {
                    VoiceError::new(VoiceErrorKind::Recognition, format!("wav encode: {e}"))
                })?;
            }
            writer.finalize().map_err(|e| {
                VoiceError::new(VoiceErrorKind::Recognition, format!("wav encode: {e}"))
            })?;
        }
        Ok(cursor.into_inner())
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(
        &self,
        samples: &[f32],
        sample_rate: u32,
        language: &str,
    ) -> VoiceResult<String> {
        let wav = Self::encode_wav(samples, sample_rate)?;

        let response = self
            .client
            .post(format!("{}/transcribe", self.base_url))
            .query(&[("language", language)])
            .header(reqwest::header::CONTENT_TYPE, "audio/wav")
            .body(wav)
            .send()
            .await
            .map_err(|e| VoiceError::new(VoiceErrorKind::Network, e.to_string()))?;

        if !response.status().is_success() {
            return Err(VoiceError::new(
                VoiceErrorKind::Recognition,
                format!("transcription server: {}", response.status()),
            ));
        }

        let parsed: TranscriptResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::new(VoiceErrorKind::Recognition, e.to_string()))?;
        Ok(parsed.text)
    }
}

enum ThreadCmd {
    /// Flush the in-flight utterance, then end.
    Stop,
    /// Drop everything in flight, then end.
    Abort,
}

struct Utterance {
    samples: Vec<f32>,
    sample_rate: u32,
}

struct RunningCapture {
    cmd: std::sync::mpsc::Sender<ThreadCmd>,
    join: Option<thread::JoinHandle<()>>,
}

/// On-device recognition front-end: microphone frames through the VAD,
/// utterances shipped to the transcriber, results emitted as capture events.
///
/// Owns the capture device only while running; the warm-up stream must be
/// released before `start` so the device is never held twice.
pub struct LocalSpeechCapture {
    events: mpsc::UnboundedSender<CaptureEvent>,
    transcriber: Arc<dyn Transcriber>,
    silence_timeout: Duration,
    running: Option<RunningCapture>,
}

impl LocalSpeechCapture {
    pub fn new(
        events: mpsc::UnboundedSender<CaptureEvent>,
        transcriber: Arc<dyn Transcriber>,
        silence_timeout: Duration,
    ) -> Self {
        Self {
            events,
            transcriber,
            silence_timeout,
            running: None,
        }
    }
}

impl SpeechCapture for LocalSpeechCapture {
    fn is_supported(&self) -> bool {
        use cpal::traits::HostTrait;
        cpal::default_host().default_input_device().is_some()
    }

    fn start(&mut self, opts: &CaptureOptions) -> VoiceResult<()> {
        if self.running.is_some() {
            return Err(VoiceError::new(
                VoiceErrorKind::MicrophoneBusy,
                "recognition already running",
            ));
        }

        let (utt_tx, mut utt_rx) = mpsc::unbounded_channel::<Utterance>();
        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel::<ThreadCmd>();

        // Transcription runs beside the capture thread so the device loop
        // never blocks on the network.
        let events = self.events.clone();
        let transcriber = Arc::clone(&self.transcriber);
        let language = opts.language.clone();
        tokio::spawn(async move {
            while let Some(utt) = utt_rx.recv().await {
                match transcriber
                    .transcribe(&utt.samples, utt.sample_rate, &language)
                    .await
                {
                    Ok(text) if text.trim().is_empty() => {
                        let _ = events.send(CaptureEvent::Error(CaptureErrorCode::NoSpeech));
                    }
                    Ok(text) => {
                        let _ = events.send(CaptureEvent::Result {
                            transcript: text.trim().to_string(),
                            is_final: true,
                        });
                    }
                    Err(e) => {
                        warn!("transcription failed: {}", e);
                        let code = match e.kind {
                            VoiceErrorKind::Network => CaptureErrorCode::Network,
                            _ => CaptureErrorCode::Other(e.message),
                        };
                        let _ = events.send(CaptureEvent::Error(code));
                    }
                }
            }
        });

        let events = self.events.clone();
        let continuous = opts.continuous;
        let no_speech_ms = self.silence_timeout.as_millis() as u64;

        let join = thread::spawn(move || {
            let (_stream, rate, mut consumer) = match build_input_stream() {
                Ok(built) => built,
                Err(e) => {
                    let code = match e.kind {
                        VoiceErrorKind::NoMicrophone => CaptureErrorCode::AudioCapture,
                        _ => CaptureErrorCode::Other(e.message.clone()),
                    };
                    let _ = events.send(CaptureEvent::Error(code));
                    let _ = events.send(CaptureEvent::Ended);
                    return;
                }
            };

            let mut detector = match ActivityDetector::new(rate, no_speech_ms) {
                Some(d) => d,
                None => {
                    let _ = events.send(CaptureEvent::Error(CaptureErrorCode::Other(format!(
                        "unsupported VAD rate {rate}"
                    ))));
                    let _ = events.send(CaptureEvent::Ended);
                    return;
                }
            };

            info!("recognition started at {}Hz", rate);
            let mut chunk = vec![0.0f32; 1024];
            let mut utterance: Vec<f32> = Vec::new();
            let mut in_utterance = false;
            // An aborted run ends silently; only graceful ends announce
            // themselves, so a fresh run never inherits a stale Ended.
            let mut graceful = true;

            use ringbuf::traits::Consumer as _;
            loop {
                match cmd_rx.try_recv() {
                    Ok(ThreadCmd::Stop) => {
                        if in_utterance && !utterance.is_empty() {
                            let _ = utt_tx.send(Utterance {
                                samples: std::mem::take(&mut utterance),
                                sample_rate: rate,
                            });
                        }
                        break;
                    }
                    Ok(ThreadCmd::Abort) => {
                        graceful = false;
                        break;
                    }
                    Err(std::sync::mpsc::TryRecvError::Disconnected) => {
                        graceful = false;
                        break;
                    }
                    Err(std::sync::mpsc::TryRecvError::Empty) => {}
                }

                let n = consumer.pop_slice(&mut chunk);
                if n == 0 {
                    thread::sleep(Duration::from_millis(10));
                    continue;
                }

                if in_utterance {
                    utterance.extend_from_slice(&chunk[..n]);
                }

                match detector.process(&chunk[..n]) {
                    Some(ActivitySignal::SpeechStart) => {
                        debug!("utterance opened");
                        in_utterance = true;
                        utterance.clear();
                        utterance.extend_from_slice(&chunk[..n]);
                    }
                    Some(ActivitySignal::SpeechEnd) => {
                        debug!("utterance closed ({} samples)", utterance.len());
                        in_utterance = false;
                        let _ = utt_tx.send(Utterance {
                            samples: std::mem::take(&mut utterance),
                            sample_rate: rate,
                        });
                        if !continuous {
                            break;
                        }
                        detector.reset();
                    }
                    Some(ActivitySignal::NoSpeech) => {
                        let _ = events.send(CaptureEvent::Error(CaptureErrorCode::NoSpeech));
                        if !continuous {
                            break;
                        }
                    }
                    None => {}
                }
            }

            if graceful {
                let _ = events.send(CaptureEvent::Ended);
            }
        });

        self.running = Some(RunningCapture {
            cmd: cmd_tx,
            join: Some(join),
        });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut running) = self.running.take() {
            let _ = running.cmd.send(ThreadCmd::Stop);
            if let Some(join) = running.join.take() {
                let _ = join.join();
            }
        }
    }

    fn abort(&mut self) {
        if let Some(mut running) = self.running.take() {
            let _ = running.cmd.send(ThreadCmd::Abort);
            if let Some(join) = running.join.take() {
                let _ = join.join();
            }
        }
    }
}
