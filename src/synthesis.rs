use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{VoiceError, VoiceErrorKind, VoiceResult};
use crate::playback::ClipSource;

/// The external voice-synthesis collaborator: response text in, playable
/// clip out. Any failure surfaces as one generic synthesis error.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> VoiceResult<ClipSource>;
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    voice: &'a str,
}

/// HTTP client against the synthesis backend, WAV bytes back. The timeout
/// is enforced at the network level so a stalled backend cannot wedge the
/// speaking phase.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    base_url: String,
    voice: String,
}

impl HttpSynthesizer {
    pub fn new(base_url: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(8))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            voice: voice.into(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> VoiceResult<ClipSource> {
        let response = self
            .client
            .post(format!("{}/synthesize", self.base_url))
            .json(&SynthesisRequest {
                text,
                voice: &self.voice,
            })
            .send()
            .await
            .map_err(|e| VoiceError::new(VoiceErrorKind::Synthesis, e.to_string()))?;

        if !response.status().is_success() {
            return Err(VoiceError::new(
                VoiceErrorKind::Synthesis,
                format!("synthesis server: {}", response.status()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| VoiceError::new(VoiceErrorKind::Synthesis, e.to_string()))?;
        Ok(ClipSource::Buffer(Arc::new(bytes.to_vec())))
    }
}

/// Fixed-clip synthesizer for hosts without a backend and for tests.
pub struct CannedSynthesizer {
    clip: Arc<Vec<u8>>,
}

impl CannedSynthesizer {
    pub fn new(clip: Vec<u8>) -> Self {
        Self {
            clip: Arc::new(clip),
        }
    }

    /// A minimal valid mono 16-bit WAV at 16kHz: enough for sinks that
    /// decode, silent if actually played.
    pub fn silent() -> Self {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            // Writing zeros into a cursor cannot fail.
            let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav header");
            for _ in 0..1600 {
                writer.write_sample(0i16).expect("wav sample");
            }
            writer.finalize().expect("wav finalize");
        }
        Self::new(cursor.into_inner())
    }
}

#[async_trait]
impl SpeechSynthesizer for CannedSynthesizer {
    async fn synthesize(&self, _text: &str) -> VoiceResult<ClipSource> {
        Ok(ClipSource::Buffer(Arc::clone(&self.clip)))
    }
}
