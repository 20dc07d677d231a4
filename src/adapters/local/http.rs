//! HTTP inbound adapter serving the scene REST contract from memory.

use super::pipeline::PipelineSimulator;
use super::store::SceneStore;
use crate::domain::scene::{
    default_content_type, CreateSceneRequest, JobHandle, Scene, StartJobRequest, UploadSlot,
    UploadSlotRequest,
};
use crate::error::SceneError;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

type ApiResult<T> = Result<T, (StatusCode, String)>;

/// Local stand-in for the scene API, storage and job runner.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    pub store: SceneStore,
    public_url: String,
    pipeline: Option<PipelineSimulator>,
}

impl LocalBackend {
    /// `stage_interval = None` leaves stage changes to the caller (see [`SceneStore::set_stage`]).
    pub fn new(public_url: impl Into<String>, stage_interval: Option<Duration>) -> Self {
        let store = SceneStore::new();
        let pipeline = stage_interval.map(|interval| PipelineSimulator::new(store.clone(), interval));
        Self {
            store,
            public_url: public_url.into(),
            pipeline,
        }
    }

    pub fn router(self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/scenes", get(list_scenes).post(create_scene))
            .route("/scenes/:id", get(get_scene).delete(delete_scene))
            .route("/upload", post(request_upload))
            .route("/jobs", post(start_job))
            .route("/storage/*key", put(put_object).get(get_object))
            .layer(DefaultBodyLimit::disable())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }
}

fn reject(err: SceneError) -> (StatusCode, String) {
    let status = match &err {
        SceneError::Validation(_) => StatusCode::BAD_REQUEST,
        SceneError::Auth(_) => StatusCode::UNAUTHORIZED,
        SceneError::NotFound(_) => StatusCode::NOT_FOUND,
        SceneError::Api { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
        SceneError::Network(_) => StatusCode::BAD_GATEWAY,
        SceneError::Cancelled => StatusCode::CONFLICT,
    };
    let body = match err {
        SceneError::Validation(m) | SceneError::Auth(m) | SceneError::NotFound(m) => m,
        SceneError::Api { body, .. } => body,
        other => other.to_string(),
    };
    (status, body)
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn caller(backend: &LocalBackend, headers: &HeaderMap) -> ApiResult<String> {
    backend.store.authenticate(bearer(headers)).await.map_err(reject)
}

async fn list_scenes(State(backend): State<LocalBackend>) -> Json<Vec<Scene>> {
    Json(backend.store.list().await)
}

async fn get_scene(
    State(backend): State<LocalBackend>,
    Path(id): Path<String>,
) -> ApiResult<Json<Scene>> {
    backend.store.get(&id).await.map(Json).map_err(reject)
}

async fn request_upload(
    State(backend): State<LocalBackend>,
    headers: HeaderMap,
    Json(request): Json<UploadSlotRequest>,
) -> ApiResult<Json<UploadSlot>> {
    caller(&backend, &headers).await?;
    let slot = backend
        .store
        .issue_slot(&request, &backend.public_url)
        .map_err(reject)?;
    info!("Issued upload slot {} for {}", slot.scene_id, request.filename);
    Ok(Json(slot))
}

async fn create_scene(
    State(backend): State<LocalBackend>,
    headers: HeaderMap,
    Json(request): Json<CreateSceneRequest>,
) -> ApiResult<(StatusCode, Json<Scene>)> {
    let owner = caller(&backend, &headers).await?;
    let scene = backend.store.create(&owner, &request).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(scene)))
}

async fn start_job(
    State(backend): State<LocalBackend>,
    headers: HeaderMap,
    Json(request): Json<StartJobRequest>,
) -> ApiResult<(StatusCode, Json<JobHandle>)> {
    let owner = caller(&backend, &headers).await?;
    let handle = backend
        .store
        .start_job(&owner, &request)
        .await
        .map_err(reject)?;
    info!("Started job {}", handle.execution_arn);
    if let Some(pipeline) = &backend.pipeline {
        pipeline.spawn(request.scene_id.clone());
    }
    Ok((StatusCode::ACCEPTED, Json(handle)))
}

async fn delete_scene(
    State(backend): State<LocalBackend>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let owner = caller(&backend, &headers).await?;
    backend.store.delete(&owner, &id).await.map_err(reject)?;
    info!("Deleted scene {}", id);
    Ok(StatusCode::NO_CONTENT)
}

async fn put_object(
    State(backend): State<LocalBackend>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(default_content_type);
    info!("Storage: saving {} bytes to {}", body.len(), key);
    backend
        .store
        .put_object(&key, &content_type, body)
        .await
        .map_err(reject)?;
    Ok(StatusCode::OK)
}

async fn get_object(State(backend): State<LocalBackend>, Path(key): Path<String>) -> Response {
    match backend.store.object(&key).await {
        Some(object) => (
            [(header::CONTENT_TYPE, object.content_type)],
            object.data,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "Key not found").into_response(),
    }
}
