//! In-memory scene table and object store.

use crate::domain::scene::{
    CreateSceneRequest, JobHandle, ProcessingStage, Scene, SceneStatus, StartJobRequest,
    UploadSlot, UploadSlotRequest,
};
use crate::error::{Result, SceneError};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Storage prefixes owned by a scene; all are purged on delete.
const SCENE_PREFIXES: [&str; 4] = ["uploads", "frames", "colmap", "outputs"];

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Default)]
struct State {
    scenes: HashMap<String, Scene>,
    objects: HashMap<String, StoredObject>,
    revoked_tokens: HashSet<String>,
}

/// Shared backend state. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct SceneStore {
    state: Arc<RwLock<State>>,
}

pub fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn forbidden() -> SceneError {
    SceneError::Api {
        status: 403,
        body: "Not authorized".to_string(),
    }
}

fn sanitize_filename(filename: &str) -> Result<String> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(SceneError::Validation(format!(
            "invalid filename: {:?}",
            filename
        )));
    }
    Ok(name.to_string())
}

impl SceneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The local backend trusts the bearer token as the caller's subject.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<String> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SceneError::Auth("missing bearer token".to_string()))?;
        if self.state.read().await.revoked_tokens.contains(token) {
            return Err(SceneError::Auth("token expired".to_string()));
        }
        Ok(token.to_string())
    }

    pub async fn revoke_token(&self, token: &str) {
        self.state
            .write()
            .await
            .revoked_tokens
            .insert(token.to_string());
    }

    pub async fn list(&self) -> Vec<Scene> {
        let state = self.state.read().await;
        let mut scenes: Vec<Scene> = state.scenes.values().cloned().collect();
        scenes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        scenes
    }

    pub async fn get(&self, id: &str) -> Result<Scene> {
        self.state
            .read()
            .await
            .scenes
            .get(id)
            .cloned()
            .ok_or_else(|| SceneError::NotFound("Scene not found".to_string()))
    }

    pub fn issue_slot(&self, request: &UploadSlotRequest, public_url: &str) -> Result<UploadSlot> {
        let scene_id = Uuid::new_v4().to_string();
        let key = format!("uploads/{}/{}", scene_id, sanitize_filename(&request.filename)?);
        Ok(UploadSlot {
            upload_url: format!("{}/storage/{}", public_url.trim_end_matches('/'), key),
            scene_id,
            storage_key: key,
        })
    }

    pub async fn put_object(&self, key: &str, content_type: &str, data: Bytes) -> Result<()> {
        if key.split('/').any(|part| part == "..") {
            return Err(SceneError::Validation("Invalid key".to_string()));
        }
        self.state.write().await.objects.insert(
            key.to_string(),
            StoredObject {
                content_type: content_type.to_string(),
                data,
            },
        );
        Ok(())
    }

    pub async fn object(&self, key: &str) -> Option<StoredObject> {
        self.state.read().await.objects.get(key).cloned()
    }

    /// Register a scene. Repeating the call for an existing id returns the
    /// stored record unchanged.
    pub async fn create(&self, owner: &str, request: &CreateSceneRequest) -> Result<Scene> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(SceneError::Validation("name must not be empty".to_string()));
        }
        if !request
            .video_key
            .starts_with(&format!("uploads/{}/", request.scene_id))
        {
            return Err(SceneError::Validation(
                "videoKey does not belong to this scene".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        if let Some(existing) = state.scenes.get(&request.scene_id) {
            if existing.owner_id != owner {
                return Err(forbidden());
            }
            return Ok(existing.clone());
        }
        if !state.objects.contains_key(&request.video_key) {
            return Err(SceneError::Validation(format!(
                "no uploaded object at {}",
                request.video_key
            )));
        }

        let scene = Scene {
            id: request.scene_id.clone(),
            name: name.to_string(),
            description: None,
            status: SceneStatus::Pending,
            processing_stage: Some(ProcessingStage::Pending),
            error: None,
            thumbnail_key: None,
            splat_key: None,
            created_at: now_epoch_secs(),
            completed_at: None,
            gaussian_count: None,
            owner_id: owner.to_string(),
            video_key: Some(request.video_key.clone()),
            settings: None,
        };
        state.scenes.insert(scene.id.clone(), scene.clone());
        Ok(scene)
    }

    /// Accept a processing job: the scene moves to `processing` and keeps the
    /// effective settings.
    pub async fn start_job(&self, owner: &str, request: &StartJobRequest) -> Result<JobHandle> {
        let settings = request.options.resolve()?;

        let mut state = self.state.write().await;
        let scene = state
            .scenes
            .get_mut(&request.scene_id)
            .ok_or_else(|| SceneError::NotFound("Scene not found".to_string()))?;
        if scene.owner_id != owner {
            return Err(forbidden());
        }
        if scene.video_key.as_deref() != Some(request.video_key.as_str()) {
            return Err(SceneError::Validation(
                "videoKey does not match the scene".to_string(),
            ));
        }
        if scene.status != SceneStatus::Pending {
            return Err(SceneError::Api {
                status: 409,
                body: format!("scene is already {:?}", scene.status).to_lowercase(),
            });
        }

        scene.status = SceneStatus::Processing;
        scene.settings = Some(settings);
        Ok(JobHandle {
            execution_arn: format!("arn:local:states:execution:scene-{}", scene.id),
        })
    }

    /// Remove the record and every object under the scene's prefixes.
    pub async fn delete(&self, owner: &str, id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let scene = state
            .scenes
            .get(id)
            .ok_or_else(|| SceneError::NotFound("Scene not found".to_string()))?;
        if scene.owner_id != owner {
            return Err(forbidden());
        }

        let prefixes: Vec<String> = SCENE_PREFIXES
            .iter()
            .map(|p| format!("{}/{}/", p, id))
            .collect();
        state
            .objects
            .retain(|key, _| !prefixes.iter().any(|p| key.starts_with(p)));
        state.scenes.remove(id);
        Ok(())
    }

    /// Record a stage reported by the pipeline. Ignored once the scene is terminal.
    pub async fn set_stage(&self, id: &str, stage: ProcessingStage) -> Result<()> {
        let mut state = self.state.write().await;
        let scene = state
            .scenes
            .get_mut(id)
            .ok_or_else(|| SceneError::NotFound("Scene not found".to_string()))?;
        if !scene.status.is_terminal() {
            scene.processing_stage = Some(stage);
        }
        Ok(())
    }

    pub async fn complete(&self, id: &str, gaussian_count: u64) -> Result<Scene> {
        let splat_key = format!("outputs/{}/scene.splat", id);
        let mut state = self.state.write().await;
        let scene = state
            .scenes
            .get_mut(id)
            .ok_or_else(|| SceneError::NotFound("Scene not found".to_string()))?;
        scene.status = SceneStatus::Completed;
        scene.processing_stage = Some(ProcessingStage::Completed);
        scene.splat_key = Some(splat_key.clone());
        scene.thumbnail_key = Some(format!("outputs/{}/thumbnail.jpg", id));
        scene.completed_at = Some(now_epoch_secs());
        scene.gaussian_count = Some(gaussian_count);
        let scene = scene.clone();

        state.objects.insert(
            splat_key,
            StoredObject {
                content_type: "application/octet-stream".to_string(),
                data: Bytes::new(),
            },
        );
        Ok(scene)
    }

    pub async fn fail(&self, id: &str, error: &str) -> Result<Scene> {
        let mut state = self.state.write().await;
        let scene = state
            .scenes
            .get_mut(id)
            .ok_or_else(|| SceneError::NotFound("Scene not found".to_string()))?;
        scene.status = SceneStatus::Failed;
        scene.processing_stage = Some(ProcessingStage::Failed);
        scene.error = Some(if error.is_empty() {
            "Unknown error".to_string()
        } else {
            error.to_string()
        });
        Ok(scene.clone())
    }
}
