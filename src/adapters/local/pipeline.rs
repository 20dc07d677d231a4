//! Simulated processing pipeline for the local backend.
//!
//! Walks an accepted job through the same stages the real job runner reports,
//! spending `stage_interval` in each one, then publishes the result.

use super::store::SceneStore;
use crate::domain::scene::ProcessingStage;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const STAGES: [ProcessingStage; 4] = [
    ProcessingStage::ExtractingFrames,
    ProcessingStage::RunningColmap,
    ProcessingStage::Training3dgs,
    ProcessingStage::Converting,
];

#[derive(Debug, Clone)]
pub struct PipelineSimulator {
    store: SceneStore,
    stage_interval: Duration,
}

impl PipelineSimulator {
    pub fn new(store: SceneStore, stage_interval: Duration) -> Self {
        Self {
            store,
            stage_interval,
        }
    }

    /// Run the job for `scene_id` in the background.
    pub fn spawn(&self, scene_id: String) -> JoinHandle<()> {
        let sim = self.clone();
        tokio::spawn(async move {
            if let Err(e) = sim.run(&scene_id).await {
                warn!("[Pipeline] scene {} stopped: {}", scene_id, e);
            }
        })
    }

    async fn run(&self, scene_id: &str) -> crate::error::Result<()> {
        let video_key = self
            .store
            .get(scene_id)
            .await?
            .video_key
            .unwrap_or_default();

        for stage in STAGES {
            self.store.set_stage(scene_id, stage).await?;
            info!("[Pipeline] scene {} -> {}", scene_id, stage);

            if stage == ProcessingStage::ExtractingFrames {
                let frames = self
                    .store
                    .object(&video_key)
                    .await
                    .map(|o| o.data.len())
                    .unwrap_or(0);
                if frames == 0 {
                    self.store
                        .fail(scene_id, "No frames extracted from video")
                        .await?;
                    info!("[Pipeline] scene {} failed: empty video", scene_id);
                    return Ok(());
                }
            }
            tokio::time::sleep(self.stage_interval).await;
        }

        let settings = self.store.get(scene_id).await?.settings.unwrap_or_default();
        // Rough stand-in for the trained model size.
        let gaussians = settings.iterations as u64 * 10;
        self.store.complete(scene_id, gaussians).await?;
        info!("[Pipeline] scene {} completed", scene_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scene::{CreateSceneRequest, SceneStatus, StartJobRequest};
    use bytes::Bytes;

    async fn started(store: &SceneStore, video: &'static [u8]) -> String {
        store
            .put_object("uploads/s1/walk.mp4", "video/mp4", Bytes::from_static(video))
            .await
            .unwrap();
        store
            .create(
                "alice",
                &CreateSceneRequest {
                    scene_id: "s1".into(),
                    name: "Garden".into(),
                    video_key: "uploads/s1/walk.mp4".into(),
                },
            )
            .await
            .unwrap();
        store
            .start_job(
                "alice",
                &StartJobRequest {
                    scene_id: "s1".into(),
                    video_key: "uploads/s1/walk.mp4".into(),
                    options: Default::default(),
                },
            )
            .await
            .unwrap();
        "s1".to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn test_pipeline_walks_every_stage() {
        let store = SceneStore::new();
        let id = started(&store, b"not really a video").await;
        let sim = PipelineSimulator::new(store.clone(), Duration::from_secs(1));
        let handle = sim.spawn(id.clone());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let scene = store.get(&id).await.unwrap();
        assert_eq!(scene.processing_stage, Some(ProcessingStage::RunningColmap));

        handle.await.unwrap();
        let scene = store.get(&id).await.unwrap();
        assert_eq!(scene.status, SceneStatus::Completed);
        assert_eq!(scene.splat_key.as_deref(), Some("outputs/s1/scene.splat"));
        assert_eq!(scene.gaussian_count, Some(300_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_video_fails_at_extraction() {
        let store = SceneStore::new();
        let id = started(&store, b"").await;
        PipelineSimulator::new(store.clone(), Duration::from_secs(1))
            .spawn(id.clone())
            .await
            .unwrap();

        let scene = store.get(&id).await.unwrap();
        assert_eq!(scene.status, SceneStatus::Failed);
        assert_eq!(scene.processing_stage, Some(ProcessingStage::Failed));
        assert_eq!(scene.error.as_deref(), Some("No frames extracted from video"));
    }
}
