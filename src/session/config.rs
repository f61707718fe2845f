use std::time::Duration;

/// Tunables for one voice session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// BCP-47 language tag handed to the recognition service.
    pub language: String,
    /// Keep recognition running across utterances while in wake-word mode.
    pub continuous: bool,
    /// Surface interim (non-final) transcripts.
    pub interim_results: bool,
    /// Phrases that arm the session from passive listening.
    pub wake_phrases: Vec<String>,
    /// First self-healing delay; doubles per attempt.
    pub retry_base_delay: Duration,
    /// Attempts before automatic recovery halts.
    pub max_retries: u32,
    /// Silence window after which a listening turn is treated as no-speech.
    pub silence_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            language: std::env::var("SOLACE_LANGUAGE").unwrap_or_else(|_| "en-US".into()),
            continuous: false,
            interim_results: true,
            wake_phrases: std::env::var("SOLACE_WAKE_PHRASES")
                .unwrap_or_else(|_| "hey solace,solace".into())
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            retry_base_delay: Duration::from_millis(
                std::env::var("SOLACE_RETRY_BASE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1_000),
            ),
            max_retries: 3,
            silence_timeout: Duration::from_secs(8),
        }
    }
}
