use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One spoken unit of a guided ritual. The clip is synthesized upstream;
/// the pacer only sequences.
#[derive(Debug, Clone)]
pub struct RitualSegment {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacerStatus {
    Idle,
    AwaitingPlayback,
    InGap,
    Complete,
    Cancelled,
}

/// Paces a ritual's segments through the playback queue: hand out a
/// segment, wait for the host to report it finished, sit out the breathing
/// gap, hand out the next. The gap timer is cancellable and dies with the
/// pacer, so nothing fires against torn-down state.
pub struct SegmentPacer {
    ritual_id: String,
    segments: Vec<RitualSegment>,
    next: usize,
    gap: Duration,
    status: PacerStatus,
    token: CancellationToken,
    gap_tx: mpsc::UnboundedSender<usize>,
    gap_rx: mpsc::UnboundedReceiver<usize>,
}

impl SegmentPacer {
    pub fn new(ritual_id: impl Into<String>, segments: Vec<RitualSegment>, gap: Duration) -> Self {
        let (gap_tx, gap_rx) = mpsc::unbounded_channel();
        Self {
            ritual_id: ritual_id.into(),
            segments,
            next: 0,
            gap,
            status: PacerStatus::Idle,
            token: CancellationToken::new(),
            gap_tx,
            gap_rx,
        }
    }

    pub fn ritual_id(&self) -> &str {
        &self.ritual_id
    }

    pub fn status(&self) -> PacerStatus {
        self.status
    }

    pub fn segments_played(&self) -> u32 {
        self.next as u32
    }

    /// First segment to enqueue, or None for an empty ritual (immediately
    /// complete).
    pub fn begin(&mut self) -> Option<&RitualSegment> {
        if self.segments.is_empty() {
            self.status = PacerStatus::Complete;
            return None;
        }
        info!(
            "ritual {} starting ({} segments)",
            self.ritual_id,
            self.segments.len()
        );
        self.status = PacerStatus::AwaitingPlayback;
        self.next = 1;
        self.segments.first()
    }

    /// The host observed the current segment finish playing. Starts the gap
    /// timer, or completes the ritual after the last segment.
    pub fn on_segment_finished(&mut self) {
        if self.status != PacerStatus::AwaitingPlayback {
            return;
        }
        if self.next >= self.segments.len() {
            info!("ritual {} complete", self.ritual_id);
            self.status = PacerStatus::Complete;
            return;
        }

        self.status = PacerStatus::InGap;
        let index = self.next;
        let delay = self.gap;
        let tx = self.gap_tx.clone();
        let guard = self.token.child_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = guard.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(index);
                }
            }
        });
    }

    /// Drain elapsed gap timers; returns the next segment to enqueue when
    /// its gap has passed.
    pub fn pump(&mut self) -> Option<&RitualSegment> {
        let mut due = None;
        while let Ok(index) = self.gap_rx.try_recv() {
            due = Some(index);
        }
        let index = due?;
        if self.status != PacerStatus::InGap || index != self.next {
            debug!("stale gap timer for segment {} ignored", index);
            return None;
        }
        self.status = PacerStatus::AwaitingPlayback;
        self.next += 1;
        self.segments.get(index)
    }

    /// Immediate, from any state. The in-flight gap timer is cancelled so
    /// it cannot fire later.
    pub fn cancel(&mut self) {
        if matches!(self.status, PacerStatus::Complete | PacerStatus::Cancelled) {
            return;
        }
        self.token.cancel();
        self.status = PacerStatus::Cancelled;
        info!(
            "ritual {} cancelled after {} segments",
            self.ritual_id, self.next
        );
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, PacerStatus::Complete | PacerStatus::Cancelled)
    }
}

impl Drop for SegmentPacer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
