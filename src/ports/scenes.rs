use crate::domain::scene::{JobHandle, JobOptions, Scene, UploadSlot};
use crate::error::Result;
use async_trait::async_trait;

/// Typed facade over the scene REST contract.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SceneRepository: Send + Sync {
    /// All scenes visible to the caller.
    async fn list(&self) -> Result<Vec<Scene>>;

    /// Fails with `NotFound` when the backend does not know the id.
    async fn get(&self, id: &str) -> Result<Scene>;

    /// Pre-allocate a scene id and a time-limited write URL.
    async fn request_upload_slot(
        &self,
        filename: &str,
        content_type: &str,
        token: &str,
    ) -> Result<UploadSlot>;

    /// Register the scene record. Safe to retry for the same `scene_id`.
    async fn create(
        &self,
        scene_id: &str,
        name: &str,
        storage_key: &str,
        token: &str,
    ) -> Result<Scene>;

    /// Trigger the processing pipeline for an uploaded video.
    async fn start_job(
        &self,
        scene_id: &str,
        storage_key: &str,
        options: &JobOptions,
        token: &str,
    ) -> Result<JobHandle>;

    /// Only the owner may delete a scene.
    async fn delete(&self, id: &str, token: &str) -> Result<()>;
}
