//! Upload session controller.
//!
//! Drives one submission through
//! `idle -> requesting_slot -> uploading -> creating_scene -> starting_job -> processing -> complete`,
//! dropping to `error` on the first failure. Nothing is retried automatically:
//! a failed session stays in `error` until [`UploadSessionController::reset`]
//! or a fresh [`UploadSessionController::submit`].

use super::events::{SessionEvent, SessionEvents};
use super::poller::{PipelineStatusPoller, PollUpdate};
use super::tracker::ProgressTracker;
use crate::config::ClientConfig;
use crate::domain::progress::{Observation, StageProgressView};
use crate::domain::scene::{JobOptions, Scene, SceneStatus};
use crate::domain::session::{UploadPhase, UploadSession};
use crate::error::{Result, SceneError};
use crate::ports::auth::TokenProvider;
use crate::ports::scenes::SceneRepository;
use crate::ports::storage::{ObjectStore, ProgressReporter, UploadBody};
use crate::ports::viewer::SplatViewer;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A video chosen for upload plus the scene metadata to register with it.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub name: String,
    pub filename: String,
    pub content_type: String,
    pub body: UploadBody,
    pub options: JobOptions,
}

impl UploadRequest {
    pub fn new(
        name: impl Into<String>,
        filename: impl Into<String>,
        body: impl Into<UploadBody>,
    ) -> Self {
        let filename = filename.into();
        let content_type = mime_guess::from_path(&filename)
            .first_raw()
            .unwrap_or("video/mp4")
            .to_string();
        Self {
            name: name.into(),
            filename,
            content_type,
            body: body.into(),
            options: JobOptions::default(),
        }
    }

    /// Upload a video from disk. The file is streamed when the upload starts.
    /// The scene name defaults to the file stem.
    pub async fn from_path(path: &Path, name: Option<String>) -> Result<Self> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SceneError::Validation(format!("not a file: {}", path.display())))?
            .to_string();
        let body = UploadBody::from_path(path).await?;
        let name = name.unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(&filename)
                .to_string()
        });
        Ok(Self::new(name, filename, body))
    }

    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SceneError::Validation("scene name is required".into()));
        }
        if self.filename.trim().is_empty() {
            return Err(SceneError::Validation("a video file is required".into()));
        }
        self.options.validate()
    }
}

/// How a session that reached `complete` ended.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// The terminal snapshot. `status` tells success from pipeline failure.
    pub scene: Scene,
    pub view: StageProgressView,
    /// Whether the viewer accepted the asset.
    pub rendered: bool,
}

impl SessionOutcome {
    pub fn succeeded(&self) -> bool {
        self.scene.status == SceneStatus::Completed
    }
}

/// Owns one upload session at a time and the poller it starts.
pub struct UploadSessionController<R: ?Sized, S: ?Sized, T: ?Sized> {
    repo: Arc<R>,
    store: Arc<S>,
    tokens: Arc<T>,
    viewer: Option<Arc<dyn SplatViewer>>,
    poll_interval: Duration,
    max_poll_failures: u32,
    advance_delay: Duration,
    session: Mutex<UploadSession>,
    cancel: Mutex<CancellationToken>,
    /// Held by the running submission for its whole lifetime.
    running: tokio::sync::Mutex<()>,
    events: SessionEvents,
}

impl<R, S, T> UploadSessionController<R, S, T>
where
    R: SceneRepository + ?Sized + 'static,
    S: ObjectStore + ?Sized,
    T: TokenProvider + ?Sized,
{
    pub fn new(repo: Arc<R>, store: Arc<S>, tokens: Arc<T>, config: &ClientConfig) -> Self {
        Self {
            repo,
            store,
            tokens,
            viewer: None,
            poll_interval: config.poll_interval,
            max_poll_failures: config.max_poll_failures,
            advance_delay: config.advance_delay,
            session: Mutex::new(UploadSession::new()),
            cancel: Mutex::new(CancellationToken::new()),
            running: tokio::sync::Mutex::new(()),
            events: SessionEvents::new(),
        }
    }

    pub fn with_viewer(mut self, viewer: Arc<dyn SplatViewer>) -> Self {
        self.viewer = Some(viewer);
        self
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn phase(&self) -> UploadPhase {
        self.lock_session().phase()
    }

    /// Snapshot of the current session state.
    pub fn session(&self) -> UploadSession {
        self.lock_session().clone()
    }

    /// Stop the running session. The pending `submit` resolves to `Cancelled`
    /// and no further events are published for it.
    pub fn cancel(&self) {
        self.lock_cancel().cancel();
    }

    /// Cancel whatever is running, release the viewer and return to `idle`.
    ///
    /// Returns once the cancelled submission has unwound, so a `submit`
    /// issued right after starts a fresh session.
    pub async fn reset(&self) {
        self.cancel();
        let _idle = self.running.lock().await;
        if let Some(viewer) = &self.viewer {
            viewer.dispose().await;
        }
        self.lock_session().reset();
        self.events.publish(SessionEvent::Phase(UploadPhase::Idle));
    }

    /// Run one submission to completion.
    ///
    /// Resolves with the terminal scene once the pipeline finishes (either
    /// way), or with the first error. Only one submission may run at a time.
    pub async fn submit(&self, request: UploadRequest) -> Result<SessionOutcome> {
        let Ok(_running) = self.running.try_lock() else {
            return Err(SceneError::Validation(
                "a submission is already in progress".into(),
            ));
        };

        let cancel = CancellationToken::new();
        *self.lock_cancel() = cancel.clone();
        self.lock_session().reset();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SceneError::Cancelled),
            result = self.drive(&request, &cancel) => result,
        };

        match result {
            Ok(outcome) => Ok(outcome),
            // Once cancelled the session belongs to whoever cancelled it.
            Err(err) if cancel.is_cancelled() || matches!(err, SceneError::Cancelled) => {
                info!("Upload session cancelled");
                Err(SceneError::Cancelled)
            }
            Err(err) => {
                warn!("Upload session failed: {}", err);
                if self.lock_session().fail().is_ok() {
                    self.events.publish(SessionEvent::Failed(err.to_string()));
                    self.events.publish(SessionEvent::Phase(UploadPhase::Error));
                }
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        request: &UploadRequest,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome> {
        request.validate()?;
        let mut tracker = ProgressTracker::new(self.advance_delay, self.events.clone());

        // 1. Upload slot
        self.enter(UploadPhase::RequestingSlot)?;
        let token = self.token().await?;
        let slot = self
            .repo
            .request_upload_slot(&request.filename, &request.content_type, &token)
            .await?;
        info!("Got upload slot for scene {}", slot.scene_id);

        // 2. Direct upload
        self.enter(UploadPhase::Uploading)?;
        let (reporter, mut progress) = ProgressReporter::channel();
        let upload = self.store.put_object(
            &slot.upload_url,
            &request.content_type,
            request.body.clone(),
            reporter,
        );
        let forward = async {
            while let Some(percent) = progress.next().await {
                self.record_upload(&mut tracker, percent).await;
            }
        };
        let (uploaded, ()) = tokio::join!(upload, forward);
        uploaded?;
        self.record_upload(&mut tracker, 100).await;
        info!("Uploaded {} bytes to {}", request.body.len(), slot.storage_key);

        // 3. Scene record
        self.enter(UploadPhase::CreatingScene)?;
        let token = self.token().await?;
        let scene = self
            .repo
            .create(&slot.scene_id, &request.name, &slot.storage_key, &token)
            .await?;
        self.lock_session().set_scene_id(scene.id.clone());

        // 4. Processing job
        self.enter(UploadPhase::StartingJob)?;
        let token = self.token().await?;
        let job = self
            .repo
            .start_job(&scene.id, &slot.storage_key, &request.options, &token)
            .await?;
        info!("Started processing job {}", job.execution_arn);

        self.enter(UploadPhase::Processing)?;
        self.watch(&scene.id, tracker, cancel).await
    }

    async fn watch(
        &self,
        scene_id: &str,
        mut tracker: ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome> {
        let poller =
            PipelineStatusPoller::new(self.repo.clone(), self.poll_interval, self.max_poll_failures);
        let mut updates = poller.start_with(scene_id, cancel.child_token());

        while let Some(update) = updates.next().await {
            match update {
                PollUpdate::Snapshot(scene) => {
                    tracker.apply(&Observation::from(&scene)).await;
                    self.events.publish(SessionEvent::Snapshot(scene));
                }
                PollUpdate::Terminal(scene) => {
                    tracker.apply(&Observation::from(&scene)).await;
                    self.events.publish(SessionEvent::Snapshot(scene.clone()));
                    let rendered = self.show(&scene).await;
                    self.enter(UploadPhase::Complete)?;
                    return Ok(SessionOutcome {
                        scene,
                        view: tracker.view().clone(),
                        rendered,
                    });
                }
                PollUpdate::Failed(err) => return Err(err),
            }
        }
        Err(SceneError::Cancelled)
    }

    async fn show(&self, scene: &Scene) -> bool {
        let (Some(viewer), Some(key)) = (&self.viewer, scene.viewable_key()) else {
            return false;
        };
        match viewer.render(key).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Viewer could not load {}: {}", key, e);
                false
            }
        }
    }

    async fn record_upload(&self, tracker: &mut ProgressTracker, percent: u8) {
        if !self.lock_session().record_upload_progress(percent) {
            return;
        }
        self.events.publish(SessionEvent::UploadProgress(percent));
        tracker.apply(&Observation::upload(percent)).await;
    }

    /// Fresh token for every authenticated call.
    async fn token(&self) -> Result<String> {
        match self.tokens.current_token().await {
            Ok(token) if !token.is_empty() => Ok(token),
            Ok(_) => Err(SceneError::Auth("empty bearer token".into())),
            Err(SceneError::Auth(msg)) => Err(SceneError::Auth(msg)),
            Err(other) => Err(SceneError::Auth(other.to_string())),
        }
    }

    fn enter(&self, phase: UploadPhase) -> Result<()> {
        self.lock_session()
            .advance(phase)
            .map_err(|e| SceneError::Validation(e.to_string()))?;
        debug!("Upload session -> {}", phase);
        self.events.publish(SessionEvent::Phase(phase));
        Ok(())
    }

    fn lock_session(&self) -> MutexGuard<'_, UploadSession> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_cancel(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
