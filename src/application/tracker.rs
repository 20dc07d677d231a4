use super::events::{SessionEvent, SessionEvents};
use crate::domain::progress::{reconcile, Observation, StageProgressView};
use std::time::Duration;
use tracing::debug;

/// Holds the current progress view and plays reconciler frames to observers.
///
/// When the reconciler returns more than one frame (fill, then advance), the
/// tracker waits `advance_delay` between them so the fill is visible before
/// the highlight moves.
#[derive(Debug)]
pub struct ProgressTracker {
    view: StageProgressView,
    advance_delay: Duration,
    events: SessionEvents,
}

impl ProgressTracker {
    pub fn new(advance_delay: Duration, events: SessionEvents) -> Self {
        Self {
            view: StageProgressView::default(),
            advance_delay,
            events,
        }
    }

    pub fn view(&self) -> &StageProgressView {
        &self.view
    }

    /// Apply one observation. Returns `true` if the view changed.
    pub async fn apply(&mut self, observation: &Observation) -> bool {
        let frames = reconcile(&self.view, observation);
        if frames.is_empty() {
            return false;
        }
        for (i, frame) in frames.into_iter().enumerate() {
            if i > 0 && !self.advance_delay.is_zero() {
                tokio::time::sleep(self.advance_delay).await;
            }
            debug!(
                "progress frame: current={:?} fills={:?}",
                frame.current(),
                frame.fills()
            );
            self.view = frame.clone();
            self.events.publish(SessionEvent::Progress(frame));
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::progress::Segment;
    use crate::domain::scene::{ProcessingStage, SceneStatus};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_fill_is_shown_before_advance() {
        let events = SessionEvents::new();
        let mut rx = events.subscribe();
        let mut tracker = ProgressTracker::new(Duration::from_millis(400), events);

        let started = Instant::now();
        let changed = tracker
            .apply(&Observation::Snapshot {
                status: SceneStatus::Processing,
                stage: Some(ProcessingStage::RunningColmap),
                error: None,
            })
            .await;
        assert!(changed);
        assert!(started.elapsed() >= Duration::from_millis(400));

        let SessionEvent::Progress(first) = rx.recv().await.unwrap() else {
            panic!("expected a progress frame");
        };
        let SessionEvent::Progress(second) = rx.recv().await.unwrap() else {
            panic!("expected a progress frame");
        };
        assert_eq!(first.current(), Segment::Upload);
        assert_eq!(first.fills()[..2], [100, 100]);
        assert_eq!(second.current(), Segment::Colmap);
        assert_eq!(tracker.view(), &second);
    }

    #[tokio::test]
    async fn test_no_change_publishes_nothing() {
        let events = SessionEvents::new();
        let mut rx = events.subscribe();
        let mut tracker = ProgressTracker::new(Duration::ZERO, events);

        assert!(tracker.apply(&Observation::upload(30)).await);
        assert!(!tracker.apply(&Observation::upload(30)).await);
        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::Progress(_)));
        assert!(rx.try_recv().is_err());
    }
}
