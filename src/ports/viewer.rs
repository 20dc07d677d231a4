use crate::error::Result;
use async_trait::async_trait;

/// Renderer for a completed gaussian asset.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SplatViewer: Send + Sync {
    /// `key` is a storage key or an absolute URL.
    async fn render(&self, key: &str) -> Result<()>;

    async fn dispose(&self);
}
