use webrtc_vad::{Vad, VadMode};

/// Speech activity transitions derived from raw frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySignal {
    SpeechStart,
    SpeechEnd,
    /// Nothing voiced for the whole no-speech window since start.
    NoSpeech,
}

/// Frame-level voice activity detector with debounce.
///
/// Wraps webrtc-vad and turns per-frame verdicts into utterance boundaries:
/// a run of voiced frames opens an utterance, a run of silence closes it,
/// and an initial silence window with no utterance at all reports `NoSpeech`.
pub struct ActivityDetector {
    vad: Vad,
    sample_rate: u32,
    frame_size: usize,

    min_speech_frames: usize,
    min_silence_frames: usize,
    no_speech_frames: usize,

    is_speaking: bool,
    had_speech: bool,
    consecutive_speech: usize,
    consecutive_silence: usize,
    frames_since_start: usize,

    frame_i16: Vec<i16>,
    pending: Vec<f32>,
}

const FRAME_MS: usize = 30;

impl ActivityDetector {
    /// `sample_rate` must be one of 8k/16k/32k/48k (webrtc-vad requirement).
    pub fn new(sample_rate: u32, no_speech_window_ms: u64) -> Option<Self> {
        match sample_rate {
            8000 | 16000 | 32000 | 48000 => {}
            _ => return None,
        }

        let mut vad = Vad::new();
        vad.set_mode(VadMode::Aggressive);

        let frame_size = (sample_rate as usize * FRAME_MS) / 1000;
        Some(Self {
            vad,
            sample_rate,
            frame_size,
            min_speech_frames: 3,   // 90ms to open
            min_silence_frames: 20, // 600ms to close
            no_speech_frames: (no_speech_window_ms as usize) / FRAME_MS,
            is_speaking: false,
            had_speech: false,
            consecutive_speech: 0,
            consecutive_silence: 0,
            frames_since_start: 0,
            frame_i16: vec![0; frame_size],
            pending: Vec::with_capacity(frame_size * 2),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn reset(&mut self) {
        self.is_speaking = false;
        self.had_speech = false;
        self.consecutive_speech = 0;
        self.consecutive_silence = 0;
        self.frames_since_start = 0;
        self.pending.clear();
    }

    /// Feed raw f32 samples; returns at most one transition per call batch.
    pub fn process(&mut self, samples: &[f32]) -> Option<ActivitySignal> {
        self.pending.extend_from_slice(samples);

        let mut signal = None;
        while self.pending.len() >= self.frame_size {
            let frame: Vec<f32> = self.pending.drain(..self.frame_size).collect();
            for (i, &s) in frame.iter().enumerate() {
                self.frame_i16[i] = (s * i16::MAX as f32) as i16;
            }

            let voiced = self.vad.is_voice_segment(&self.frame_i16).unwrap_or(false);
            if let Some(sig) = self.step(voiced) {
                signal = Some(sig);
            }
        }
        signal
    }

    fn step(&mut self, voiced: bool) -> Option<ActivitySignal> {
        self.frames_since_start += 1;

        if voiced {
            self.consecutive_silence = 0;
            self.consecutive_speech += 1;
        } else {
            self.consecutive_speech = 0;
            self.consecutive_silence += 1;
        }

        if !self.is_speaking && self.consecutive_speech >= self.min_speech_frames {
            self.is_speaking = true;
            self.had_speech = true;
            return Some(ActivitySignal::SpeechStart);
        }
        if self.is_speaking && self.consecutive_silence >= self.min_silence_frames {
            self.is_speaking = false;
            return Some(ActivitySignal::SpeechEnd);
        }
        if !self.had_speech
            && self.no_speech_frames > 0
            && self.frames_since_start == self.no_speech_frames
        {
            return Some(ActivitySignal::NoSpeech);
        }
        None
    }
}
