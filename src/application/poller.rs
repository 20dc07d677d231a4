//! Background status polling for one scene.
//!
//! A poller owns a single background task that fetches the scene on a fixed
//! interval and forwards snapshots until it sees a terminal status, hits a
//! terminal error, or is cancelled. At most one request is ever in flight:
//! ticks that fire while a fetch is still outstanding are skipped.

use crate::domain::scene::{Scene, SceneStatus};
use crate::error::{Result, SceneError};
use crate::ports::scenes::SceneRepository;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum PollUpdate {
    /// A non-terminal snapshot. Status never regresses across snapshots.
    Snapshot(Scene),
    /// The first terminal snapshot. Nothing follows it.
    Terminal(Scene),
    /// Polling gave up. Nothing follows it.
    Failed(SceneError),
}

pub struct PipelineStatusPoller<R: ?Sized> {
    repo: Arc<R>,
    interval: Duration,
    max_failures: u32,
}

impl<R> PipelineStatusPoller<R>
where
    R: SceneRepository + ?Sized + 'static,
{
    pub fn new(repo: Arc<R>, interval: Duration, max_failures: u32) -> Self {
        Self {
            repo,
            interval,
            max_failures: max_failures.max(1),
        }
    }

    /// Start polling `scene_id`. The first fetch goes out immediately.
    pub fn start(&self, scene_id: &str) -> PollerHandle {
        self.start_with(scene_id, CancellationToken::new())
    }

    /// Like [`start`](Self::start), stopping as soon as `cancel` fires.
    pub fn start_with(&self, scene_id: &str, cancel: CancellationToken) -> PollerHandle {
        let (tx, updates) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(
            self.repo.clone(),
            scene_id.to_string(),
            self.interval,
            self.max_failures,
            cancel.clone(),
            tx,
        ));
        PollerHandle {
            updates,
            cancel,
            task,
        }
    }
}

/// Consumer side of a running poller. Dropping it stops the poller.
#[derive(Debug)]
pub struct PollerHandle {
    updates: mpsc::UnboundedReceiver<PollUpdate>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Next update, or `None` once the poller has stopped or been cancelled.
    ///
    /// After [`stop`](Self::stop) this never yields again, even if a response
    /// was already queued.
    pub async fn next(&mut self) -> Option<PollUpdate> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let update = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            update = self.updates.recv() => update,
        };
        if self.cancel.is_cancelled() {
            return None;
        }
        update
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

type InFlight = Option<BoxFuture<'static, Result<Scene>>>;

fn fetch<R>(repo: &Arc<R>, scene_id: &str) -> BoxFuture<'static, Result<Scene>>
where
    R: SceneRepository + ?Sized + 'static,
{
    let repo = repo.clone();
    let scene_id = scene_id.to_string();
    Box::pin(async move { repo.get(&scene_id).await })
}

async fn response(slot: &mut InFlight) -> Result<Scene> {
    match slot.as_mut() {
        Some(request) => request.await,
        None => std::future::pending().await,
    }
}

async fn run<R>(
    repo: Arc<R>,
    scene_id: String,
    period: Duration,
    max_failures: u32,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<PollUpdate>,
) where
    R: SceneRepository + ?Sized + 'static,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut in_flight: InFlight = Some(fetch(&repo, &scene_id));
    let mut last_status: Option<SceneStatus> = None;
    let mut failures = 0u32;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("[Poller] {} cancelled", scene_id);
                return;
            }
            result = response(&mut in_flight) => {
                in_flight = None;
                if cancel.is_cancelled() {
                    debug!("[Poller] {} dropping late response", scene_id);
                    return;
                }
                match result {
                    Ok(scene) => {
                        failures = 0;
                        if let Some(previous) = last_status {
                            if scene.status.regresses_from(previous) {
                                debug!(
                                    "[Poller] {} stale read {:?} after {:?}",
                                    scene_id, scene.status, previous
                                );
                                continue;
                            }
                        }
                        last_status = Some(scene.status);
                        if scene.status.is_terminal() {
                            info!("[Poller] {} reached {:?}", scene_id, scene.status);
                            let _ = tx.send(PollUpdate::Terminal(scene));
                            return;
                        }
                        if tx.send(PollUpdate::Snapshot(scene)).is_err() {
                            return;
                        }
                    }
                    Err(err) if err.is_retryable() && failures + 1 < max_failures => {
                        failures += 1;
                        warn!(
                            "[Poller] {} poll failed ({}/{}): {}",
                            scene_id, failures, max_failures, err
                        );
                    }
                    Err(err) => {
                        warn!("[Poller] {} giving up: {}", scene_id, err);
                        let _ = tx.send(PollUpdate::Failed(err));
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                if in_flight.is_some() {
                    debug!("[Poller] {} previous request still in flight, skipping tick", scene_id);
                    continue;
                }
                in_flight = Some(fetch(&repo, &scene_id));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scene::{JobHandle, JobOptions, ProcessingStage, UploadSlot};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves scripted `get` responses, each after `latency`.
    struct ScriptedRepo {
        responses: Mutex<VecDeque<Result<Scene>>>,
        latency: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedRepo {
        fn new(latency: Duration, responses: Vec<Result<Scene>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                latency,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SceneRepository for ScriptedRepo {
        async fn list(&self) -> Result<Vec<Scene>> {
            unimplemented!()
        }

        async fn get(&self, _id: &str) -> Result<Scene> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            match responses.len() {
                0 => Err(SceneError::Network("script exhausted".into())),
                1 => match responses.front().unwrap() {
                    Ok(scene) => Ok(scene.clone()),
                    Err(_) => responses.pop_front().unwrap(),
                },
                _ => responses.pop_front().unwrap(),
            }
        }

        async fn request_upload_slot(&self, _: &str, _: &str, _: &str) -> Result<UploadSlot> {
            unimplemented!()
        }

        async fn create(&self, _: &str, _: &str, _: &str, _: &str) -> Result<Scene> {
            unimplemented!()
        }

        async fn start_job(&self, _: &str, _: &str, _: &JobOptions, _: &str) -> Result<JobHandle> {
            unimplemented!()
        }

        async fn delete(&self, _: &str, _: &str) -> Result<()> {
            unimplemented!()
        }
    }

    fn scene(status: SceneStatus, stage: Option<ProcessingStage>) -> Scene {
        Scene {
            id: "s1".into(),
            name: "Garden".into(),
            description: None,
            status,
            processing_stage: stage,
            error: None,
            thumbnail_key: None,
            splat_key: None,
            created_at: 1_700_000_000,
            completed_at: None,
            gaussian_count: None,
            owner_id: "alice".into(),
            video_key: None,
            settings: None,
        }
    }

    async fn drain(handle: &mut PollerHandle) -> Vec<PollUpdate> {
        let mut updates = Vec::new();
        while let Some(update) = handle.next().await {
            updates.push(update);
        }
        updates
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_snapshot_delivered_once() {
        let repo = ScriptedRepo::new(
            Duration::from_millis(10),
            vec![
                Ok(scene(SceneStatus::Processing, Some(ProcessingStage::ExtractingFrames))),
                Ok(scene(SceneStatus::Processing, Some(ProcessingStage::Training3dgs))),
                Ok(scene(SceneStatus::Completed, Some(ProcessingStage::Completed))),
            ],
        );
        let poller = PipelineStatusPoller::new(repo.clone(), Duration::from_secs(1), 3);
        let mut handle = poller.start("s1");

        let updates = drain(&mut handle).await;
        assert_eq!(updates.len(), 3);
        assert!(matches!(updates[0], PollUpdate::Snapshot(_)));
        assert!(matches!(updates[1], PollUpdate::Snapshot(_)));
        assert!(matches!(&updates[2], PollUpdate::Terminal(s) if s.status == SceneStatus::Completed));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(repo.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_never_sees_overlapping_requests() {
        let repo = ScriptedRepo::new(
            Duration::from_millis(3500),
            vec![
                Ok(scene(SceneStatus::Processing, Some(ProcessingStage::RunningColmap))),
                Ok(scene(SceneStatus::Processing, Some(ProcessingStage::RunningColmap))),
                Ok(scene(SceneStatus::Completed, Some(ProcessingStage::Completed))),
            ],
        );
        let poller = PipelineStatusPoller::new(repo.clone(), Duration::from_secs(1), 3);
        let mut handle = poller.start("s1");

        let updates = drain(&mut handle).await;
        assert!(matches!(updates.last(), Some(PollUpdate::Terminal(_))));
        assert_eq!(repo.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(repo.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_status_is_discarded() {
        let repo = ScriptedRepo::new(
            Duration::from_millis(10),
            vec![
                Ok(scene(SceneStatus::Processing, Some(ProcessingStage::RunningColmap))),
                Ok(scene(SceneStatus::Pending, Some(ProcessingStage::Pending))),
                Ok(scene(SceneStatus::Failed, Some(ProcessingStage::Failed))),
            ],
        );
        let mut handle = PipelineStatusPoller::new(repo, Duration::from_secs(1), 3).start("s1");

        let updates = drain(&mut handle).await;
        assert_eq!(updates.len(), 2);
        assert!(matches!(&updates[0], PollUpdate::Snapshot(s) if s.status == SceneStatus::Processing));
        assert!(matches!(&updates[1], PollUpdate::Terminal(s) if s.status == SceneStatus::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_network_errors_are_tolerated() {
        let repo = ScriptedRepo::new(
            Duration::from_millis(10),
            vec![
                Err(SceneError::Network("connection reset".into())),
                Err(SceneError::Network("timed out".into())),
                Ok(scene(SceneStatus::Completed, Some(ProcessingStage::Completed))),
            ],
        );
        let mut handle = PipelineStatusPoller::new(repo, Duration::from_secs(1), 3).start("s1");

        let updates = drain(&mut handle).await;
        assert_eq!(updates.len(), 1);
        assert!(matches!(updates[0], PollUpdate::Terminal(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_consecutive_failures() {
        let repo = ScriptedRepo::new(
            Duration::from_millis(10),
            vec![
                Err(SceneError::Network("down".into())),
                Err(SceneError::Network("down".into())),
                Err(SceneError::Network("down".into())),
            ],
        );
        let mut handle = PipelineStatusPoller::new(repo.clone(), Duration::from_secs(1), 3).start("s1");

        let updates = drain(&mut handle).await;
        assert_eq!(updates.len(), 1);
        assert!(matches!(&updates[0], PollUpdate::Failed(SceneError::Network(_))));
        assert_eq!(repo.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_terminal() {
        let repo = ScriptedRepo::new(
            Duration::from_millis(10),
            vec![Err(SceneError::NotFound("s1".into()))],
        );
        let mut handle = PipelineStatusPoller::new(repo.clone(), Duration::from_secs(1), 3).start("s1");

        let updates = drain(&mut handle).await;
        assert!(matches!(&updates[..], [PollUpdate::Failed(SceneError::NotFound(_))]));
        assert_eq!(repo.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_drops_in_flight_response() {
        let repo = ScriptedRepo::new(
            Duration::from_secs(2),
            vec![Ok(scene(SceneStatus::Completed, Some(ProcessingStage::Completed)))],
        );
        let mut handle = PipelineStatusPoller::new(repo.clone(), Duration::from_secs(1), 3).start("s1");

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(repo.calls(), 1);
        handle.stop();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(handle.next().await.is_none());
        assert!(handle.is_finished());
        assert_eq!(repo.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_polling() {
        let repo = ScriptedRepo::new(
            Duration::from_millis(10),
            vec![Ok(scene(SceneStatus::Processing, Some(ProcessingStage::Converting)))],
        );
        let handle = PipelineStatusPoller::new(repo.clone(), Duration::from_secs(1), 3).start("s1");

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let seen = repo.calls();
        drop(handle);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(repo.calls(), seen);
    }
}
