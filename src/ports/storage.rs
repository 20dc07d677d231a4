use crate::error::{Result, SceneError};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// PUT `body` to a pre-authorized `upload_url`, reporting byte progress as it goes.
    async fn put_object(
        &self,
        upload_url: &str,
        content_type: &str,
        body: UploadBody,
        progress: ProgressReporter,
    ) -> Result<()>;
}

/// Payload of an upload: bytes already in memory, or a file that is streamed
/// from disk when the PUT is sent.
#[derive(Debug, Clone)]
pub enum UploadBody {
    Memory(Bytes),
    File { path: PathBuf, len: u64 },
}

impl UploadBody {
    /// Refer to a file on disk. Only its metadata is read here.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| SceneError::Validation(format!("cannot read {}: {}", path.display(), e)))?;
        if !metadata.is_file() {
            return Err(SceneError::Validation(format!(
                "not a file: {}",
                path.display()
            )));
        }
        Ok(UploadBody::File {
            path: path.to_path_buf(),
            len: metadata.len(),
        })
    }

    /// Byte length, sent as `Content-Length`.
    pub fn len(&self) -> u64 {
        match self {
            UploadBody::Memory(bytes) => bytes.len() as u64,
            UploadBody::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Bytes> for UploadBody {
    fn from(bytes: Bytes) -> Self {
        UploadBody::Memory(bytes)
    }
}

/// Producer side of an upload progress sequence.
///
/// Percentages are clamped to 0..=100 and never decrease. The sequence ends
/// when every clone of the reporter has been dropped.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    sender: Arc<watch::Sender<u8>>,
}

impl ProgressReporter {
    pub fn channel() -> (ProgressReporter, UploadProgress) {
        let (sender, receiver) = watch::channel(0);
        (
            ProgressReporter {
                sender: Arc::new(sender),
            },
            UploadProgress {
                receiver,
                finished: false,
            },
        )
    }

    /// Report `sent` of `total` bytes. Returns the percentage now published.
    pub fn report(&self, sent: u64, total: u64) -> u8 {
        let percent = if total == 0 {
            100
        } else {
            (sent.min(total).saturating_mul(100) / total) as u8
        };
        self.report_percent(percent)
    }

    pub fn report_percent(&self, percent: u8) -> u8 {
        let percent = percent.min(100);
        self.sender.send_if_modified(|current| {
            if percent > *current {
                *current = percent;
                true
            } else {
                false
            }
        });
        *self.sender.borrow()
    }

    pub fn current(&self) -> u8 {
        *self.sender.borrow()
    }
}

/// Consumer side: a finite, non-decreasing sequence of upload percentages.
///
/// Intermediate values may be coalesced when the consumer is slower than the
/// producer; the final value is always observed.
#[derive(Debug)]
pub struct UploadProgress {
    receiver: watch::Receiver<u8>,
    finished: bool,
}

impl UploadProgress {
    /// Next percentage, or `None` once the upload side is gone.
    pub async fn next(&mut self) -> Option<u8> {
        if self.finished {
            return None;
        }
        match self.receiver.changed().await {
            Ok(()) => Some(*self.receiver.borrow_and_update()),
            Err(_) => {
                self.finished = true;
                if self.receiver.has_changed().unwrap_or(false) {
                    Some(*self.receiver.borrow_and_update())
                } else {
                    None
                }
            }
        }
    }
}
