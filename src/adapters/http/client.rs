use crate::config::ClientConfig;
use crate::domain::scene::{
    CreateSceneRequest, JobHandle, JobOptions, Scene, StartJobRequest, UploadSlot,
    UploadSlotRequest,
};
use crate::error::{Endpoint, Result, SceneError};
use crate::ports::scenes::SceneRepository;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

/// `SceneRepository` over the REST contract.
#[derive(Debug, Clone)]
pub struct HttpSceneClient {
    client: Client,
    base_url: String,
}

impl HttpSceneClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SceneError::Network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, &config.api_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(builder: RequestBuilder, token: &str) -> Result<RequestBuilder> {
        if token.trim().is_empty() {
            return Err(SceneError::Auth("missing bearer token".to_string()));
        }
        Ok(builder.bearer_auth(token))
    }

    async fn send(endpoint: Endpoint, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(SceneError::from_endpoint(endpoint, status.as_u16(), body))
    }

    async fn send_json<T: DeserializeOwned>(
        endpoint: Endpoint,
        request: RequestBuilder,
    ) -> Result<T> {
        let response = Self::send(endpoint, request).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl SceneRepository for HttpSceneClient {
    async fn list(&self) -> Result<Vec<Scene>> {
        Self::send_json(Endpoint::List, self.client.get(self.url("/scenes"))).await
    }

    async fn get(&self, id: &str) -> Result<Scene> {
        debug!("GET /scenes/{}", id);
        let request = self.client.get(self.url(&format!("/scenes/{}", id)));
        Self::send_json(Endpoint::Get, request).await
    }

    async fn request_upload_slot(
        &self,
        filename: &str,
        content_type: &str,
        token: &str,
    ) -> Result<UploadSlot> {
        let body = UploadSlotRequest {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
        };
        let request = Self::authorized(self.client.post(self.url("/upload")), token)?.json(&body);
        Self::send_json(Endpoint::UploadSlot, request).await
    }

    async fn create(
        &self,
        scene_id: &str,
        name: &str,
        storage_key: &str,
        token: &str,
    ) -> Result<Scene> {
        if name.trim().is_empty() {
            return Err(SceneError::Validation("scene name must not be empty".to_string()));
        }
        let body = CreateSceneRequest {
            scene_id: scene_id.to_string(),
            name: name.to_string(),
            video_key: storage_key.to_string(),
        };
        let request = Self::authorized(self.client.post(self.url("/scenes")), token)?.json(&body);
        Self::send_json(Endpoint::Create, request).await
    }

    async fn start_job(
        &self,
        scene_id: &str,
        storage_key: &str,
        options: &JobOptions,
        token: &str,
    ) -> Result<JobHandle> {
        options.validate()?;
        let body = StartJobRequest {
            scene_id: scene_id.to_string(),
            video_key: storage_key.to_string(),
            options: *options,
        };
        let request = Self::authorized(self.client.post(self.url("/jobs")), token)?.json(&body);
        Self::send_json(Endpoint::StartJob, request).await
    }

    async fn delete(&self, id: &str, token: &str) -> Result<()> {
        let request = Self::authorized(
            self.client.delete(self.url(&format!("/scenes/{}", id))),
            token,
        )?;
        Self::send(Endpoint::Delete, request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let client = HttpSceneClient::with_client(Client::new(), "http://localhost:4000/");
        assert_eq!(client.url("/scenes"), "http://localhost:4000/scenes");
        assert_eq!(client.url("scenes/abc"), "http://localhost:4000/scenes/abc");
    }

    #[tokio::test]
    async fn test_empty_name_is_rejected_before_any_request() {
        // Port 9 (discard) would fail with a network error if a request were sent.
        let client = HttpSceneClient::with_client(Client::new(), "http://127.0.0.1:9");
        let err = client
            .create("s1", "   ", "uploads/s1/video.mp4", "token")
            .await
            .unwrap_err();
        assert!(matches!(err, SceneError::Validation(_)));
    }

    #[tokio::test]
    async fn test_out_of_range_options_are_rejected_before_any_request() {
        let client = HttpSceneClient::with_client(Client::new(), "http://127.0.0.1:9");
        let options = JobOptions {
            iterations: Some(500),
            ..Default::default()
        };
        let err = client
            .start_job("s1", "uploads/s1/video.mp4", &options, "token")
            .await
            .unwrap_err();
        assert!(matches!(err, SceneError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_token_is_an_auth_error() {
        let client = HttpSceneClient::with_client(Client::new(), "http://127.0.0.1:9");
        let err = client.delete("s1", "").await.unwrap_err();
        assert!(err.requires_reauth());
    }
}
