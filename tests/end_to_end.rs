#![cfg(feature = "local")]

use bytes::Bytes;
use splatline::adapters::auth::StaticTokenProvider;
use splatline::adapters::local::LocalBackend;
use splatline::domain::progress::{Outcome, Segment};
use splatline::domain::scene::{JobOptions, JobSettings, SceneStatus};
use splatline::domain::session::UploadPhase;
use splatline::ports::scenes::SceneRepository;
use splatline::ports::storage::{ObjectStore, ProgressReporter, UploadBody};
use splatline::{
    ClientConfig, HttpObjectStore, HttpSceneClient, SceneError, SessionEvent, UploadRequest,
    UploadSessionController,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    backend: LocalBackend,
    config: ClientConfig,
    repo: Arc<HttpSceneClient>,
    store: Arc<HttpObjectStore>,
}

async fn start(stage_interval: Option<Duration>) -> Harness {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let backend = LocalBackend::new(url.clone(), stage_interval);
    let app = backend.clone().router();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = ClientConfig {
        api_url: url,
        poll_interval: Duration::from_millis(50),
        advance_delay: Duration::ZERO,
        ..ClientConfig::default()
    };
    Harness {
        repo: Arc::new(HttpSceneClient::new(&config).unwrap()),
        store: Arc::new(HttpObjectStore::new(&config).unwrap()),
        backend,
        config,
    }
}

impl Harness {
    fn controller(
        &self,
        token: &str,
    ) -> UploadSessionController<HttpSceneClient, HttpObjectStore, StaticTokenProvider> {
        UploadSessionController::new(
            self.repo.clone(),
            self.store.clone(),
            Arc::new(StaticTokenProvider::new(token)),
            &self.config,
        )
    }

    /// Upload and register a scene without starting a job.
    async fn registered_scene(&self, owner: &str) -> String {
        let slot = self
            .repo
            .request_upload_slot("walk.mp4", "video/mp4", owner)
            .await
            .unwrap();
        let (reporter, _progress) = ProgressReporter::channel();
        self.store
            .put_object(
                &slot.upload_url,
                "video/mp4",
                Bytes::from_static(b"fake video").into(),
                reporter,
            )
            .await
            .unwrap();
        let scene = self
            .repo
            .create(&slot.scene_id, "Garden", &slot.storage_key, owner)
            .await
            .unwrap();
        scene.id
    }
}

#[tokio::test]
async fn test_full_session_reaches_viewable_scene() {
    let harness = start(Some(Duration::from_millis(20))).await;
    let controller = harness.controller("alice");
    let mut events = controller.subscribe();

    let mut video = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
    video.write_all(&vec![42u8; 600 * 1024]).unwrap();
    let request = UploadRequest::from_path(video.path(), Some("Backyard".into()))
        .await
        .unwrap();
    assert_eq!(request.content_type, "video/mp4");
    assert!(matches!(request.body, UploadBody::File { len, .. } if len == 600 * 1024));

    let outcome = controller.submit(request).await.unwrap();
    assert!(outcome.succeeded());
    assert_eq!(outcome.view.current(), Segment::Done);
    assert_eq!(outcome.view.outcome(), &Outcome::Completed);

    let scene = &outcome.scene;
    assert_eq!(scene.name, "Backyard");
    assert_eq!(scene.owner_id, "alice");
    assert_eq!(
        scene.splat_key.as_deref(),
        Some(format!("outputs/{}/scene.splat", scene.id).as_str())
    );
    assert_eq!(scene.settings, Some(JobSettings::default()));
    let video_key = scene.video_key.clone().unwrap();
    assert!(video_key.starts_with(&format!("uploads/{}/", scene.id)));
    let stored = harness.backend.store.object(&video_key).await.unwrap();
    assert_eq!(stored.data.len(), 600 * 1024);

    assert_eq!(controller.phase(), UploadPhase::Complete);
    let mut phases = Vec::new();
    let mut uploads = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::Phase(phase) => phases.push(phase),
            SessionEvent::UploadProgress(percent) => uploads.push(percent),
            _ => {}
        }
    }
    assert_eq!(
        phases,
        [
            UploadPhase::RequestingSlot,
            UploadPhase::Uploading,
            UploadPhase::CreatingScene,
            UploadPhase::StartingJob,
            UploadPhase::Processing,
            UploadPhase::Complete,
        ]
    );
    assert!(uploads.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(uploads.last(), Some(&100));

    let listed = harness.repo.list().await.unwrap();
    assert!(listed.iter().any(|s| s.id == scene.id));
}

#[tokio::test]
async fn test_empty_video_ends_in_failed_scene() {
    let harness = start(Some(Duration::from_millis(20))).await;
    let controller = harness.controller("alice");

    let outcome = controller
        .submit(UploadRequest::new("Empty", "empty.mp4", Bytes::new()))
        .await
        .unwrap();
    assert!(!outcome.succeeded());
    assert_eq!(outcome.scene.status, SceneStatus::Failed);
    assert_eq!(
        outcome.view.outcome(),
        &Outcome::Failed {
            error: "No frames extracted from video".into()
        }
    );
}

#[tokio::test]
async fn test_only_owner_can_delete() {
    let harness = start(None).await;
    let id = harness.registered_scene("alice").await;

    let err = harness.repo.delete(&id, "bob").await.unwrap_err();
    assert!(matches!(err, SceneError::Auth(_)));
    let still_there = harness.repo.get(&id).await.unwrap();
    assert_eq!(still_there.status, SceneStatus::Pending);

    harness.repo.delete(&id, "alice").await.unwrap();
    assert!(harness.repo.list().await.unwrap().iter().all(|s| s.id != id));
    let err = harness.repo.get(&id).await.unwrap_err();
    assert!(matches!(err, SceneError::NotFound(_)));
}

#[tokio::test]
async fn test_job_settings_are_echoed() {
    let harness = start(None).await;
    let id = harness.registered_scene("alice").await;
    let scene = harness.repo.get(&id).await.unwrap();

    let options = JobOptions {
        fps: Some(5),
        iterations: Some(20_000),
        densify_until_iter: Some(10_000),
        densification_interval: Some(200),
    };
    let job = harness
        .repo
        .start_job(&id, scene.video_key.as_deref().unwrap(), &options, "alice")
        .await
        .unwrap();
    assert!(job.execution_arn.ends_with(&id));

    let scene = harness.repo.get(&id).await.unwrap();
    assert_eq!(scene.status, SceneStatus::Processing);
    assert_eq!(
        scene.settings,
        Some(JobSettings {
            fps: 5,
            iterations: 20_000,
            densify_until_iter: 10_000,
            densification_interval: 200,
        })
    );
}

#[tokio::test]
async fn test_job_for_unknown_scene_is_an_api_error() {
    let harness = start(None).await;
    let err = harness
        .repo
        .start_job("missing", "uploads/missing/walk.mp4", &JobOptions::default(), "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, SceneError::Api { status: 404, .. }));
}

#[tokio::test]
async fn test_create_is_idempotent() {
    let harness = start(None).await;
    let id = harness.registered_scene("alice").await;
    let scene = harness.repo.get(&id).await.unwrap();

    let again = harness
        .repo
        .create(&id, "Garden", scene.video_key.as_deref().unwrap(), "alice")
        .await
        .unwrap();
    assert_eq!(again, scene);
    assert_eq!(
        harness
            .repo
            .list()
            .await
            .unwrap()
            .iter()
            .filter(|s| s.id == id)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_revoked_token_fails_first_step() {
    let harness = start(None).await;
    harness.backend.store.revoke_token("carol").await;
    let controller = harness.controller("carol");

    let err = controller
        .submit(UploadRequest::new("Garden", "walk.mp4", Bytes::from_static(b"video")))
        .await
        .unwrap_err();
    assert!(err.requires_reauth());
    assert_eq!(
        controller.session().history(),
        &[UploadPhase::Idle, UploadPhase::RequestingSlot, UploadPhase::Error]
    );
    assert!(harness.repo.list().await.unwrap().is_empty());
}
