use crate::error::Result;
use async_trait::async_trait;

/// Source of short-lived bearer tokens. Asked again at every authenticated call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fails with `SceneError::Auth` when no valid token can be produced.
    async fn current_token(&self) -> Result<String>;
}
