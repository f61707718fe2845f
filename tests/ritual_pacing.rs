use std::time::Duration;

use solace::ritual::{PacerStatus, RitualSegment, SegmentPacer};

fn segments(n: usize) -> Vec<RitualSegment> {
    (0..n)
        .map(|i| RitualSegment {
            text: format!("segment {i}"),
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn segments_play_in_order_with_gaps_between() {
    let gap = Duration::from_secs(2);
    let mut pacer = SegmentPacer::new("evening", segments(3), gap);

    let first = pacer.begin().unwrap();
    assert_eq!(first.text, "segment 0");
    assert_eq!(pacer.status(), PacerStatus::AwaitingPlayback);

    pacer.on_segment_finished();
    assert_eq!(pacer.status(), PacerStatus::InGap);
    assert!(pacer.pump().is_none(), "gap has not elapsed yet");

    tokio::time::sleep(gap + Duration::from_millis(10)).await;
    let second = pacer.pump().unwrap();
    assert_eq!(second.text, "segment 1");
    assert_eq!(pacer.status(), PacerStatus::AwaitingPlayback);

    pacer.on_segment_finished();
    tokio::time::sleep(gap + Duration::from_millis(10)).await;
    let third = pacer.pump().unwrap();
    assert_eq!(third.text, "segment 2");

    pacer.on_segment_finished();
    assert_eq!(pacer.status(), PacerStatus::Complete);
    assert!(pacer.is_finished());
    assert_eq!(pacer.segments_played(), 3);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_gap_stops_the_timer() {
    let gap = Duration::from_secs(2);
    let mut pacer = SegmentPacer::new("evening", segments(2), gap);

    pacer.begin().unwrap();
    pacer.on_segment_finished();
    assert_eq!(pacer.status(), PacerStatus::InGap);

    pacer.cancel();
    assert_eq!(pacer.status(), PacerStatus::Cancelled);

    // Even after the gap would have elapsed, nothing more is handed out.
    tokio::time::sleep(gap * 2).await;
    assert!(pacer.pump().is_none());
    assert_eq!(pacer.segments_played(), 1);
}

#[test]
fn empty_ritual_completes_immediately() {
    let mut pacer = SegmentPacer::new("noop", Vec::new(), Duration::from_secs(1));
    assert!(pacer.begin().is_none());
    assert_eq!(pacer.status(), PacerStatus::Complete);
}

#[tokio::test(start_paused = true)]
async fn duplicate_finish_reports_are_ignored() {
    let gap = Duration::from_millis(100);
    let mut pacer = SegmentPacer::new("evening", segments(2), gap);

    pacer.begin().unwrap();
    pacer.on_segment_finished();
    pacer.on_segment_finished(); // stray repeat while in the gap
    assert_eq!(pacer.status(), PacerStatus::InGap);

    tokio::time::sleep(gap * 2).await;
    assert_eq!(pacer.pump().unwrap().text, "segment 1");
    pacer.on_segment_finished();
    assert_eq!(pacer.status(), PacerStatus::Complete);
}
