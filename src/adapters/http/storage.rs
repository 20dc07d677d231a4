use crate::config::ClientConfig;
use crate::error::{Result, SceneError};
use crate::ports::storage::{ObjectStore, ProgressReporter, UploadBody};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

/// Size of the slices handed to the transport; one progress report per slice.
const CHUNK_SIZE: usize = 256 * 1024;

/// Direct-to-storage uploads against pre-signed PUT URLs.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
}

impl HttpObjectStore {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        // Large videos take a while; only the connect phase is bounded.
        let client = Client::builder()
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| SceneError::Network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn chunks(body: &Bytes) -> Vec<Bytes> {
    (0..body.len())
        .step_by(CHUNK_SIZE)
        .map(|start| body.slice(start..(start + CHUNK_SIZE).min(body.len())))
        .collect()
}

type ChunkStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Chunked request body. Progress is reported as the transport pulls each chunk.
async fn body_stream(body: UploadBody, progress: ProgressReporter) -> Result<ChunkStream> {
    let total = body.len();
    let chunks: ChunkStream = match body {
        UploadBody::Memory(bytes) => {
            stream::iter(chunks(&bytes).into_iter().map(Ok::<Bytes, std::io::Error>)).boxed()
        }
        UploadBody::File { path, .. } => {
            let file = File::open(&path).await.map_err(|e| {
                SceneError::Validation(format!("cannot read {}: {}", path.display(), e))
            })?;
            ReaderStream::with_capacity(file, CHUNK_SIZE).boxed()
        }
    };

    let mut sent = 0u64;
    Ok(chunks
        .inspect_ok(move |chunk| {
            sent += chunk.len() as u64;
            progress.report(sent, total);
        })
        .boxed())
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put_object(
        &self,
        upload_url: &str,
        content_type: &str,
        body: UploadBody,
        progress: ProgressReporter,
    ) -> Result<()> {
        let total = body.len();
        info!("Uploading {} bytes ({})", total, content_type);
        let stream = body_stream(body, progress.clone()).await?;

        let response = self
            .client
            .put(upload_url)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, total)
            .body(Body::wrap_stream(stream))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SceneError::from_status(status.as_u16(), body));
        }

        progress.report_percent(100);
        debug!("Upload accepted with status {}", status);
        Ok(())
    }
}
