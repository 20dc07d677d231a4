//! Terminal stand-in for the splat renderer.

use crate::error::Result;
use crate::ports::viewer::SplatViewer;
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::info;

/// "Renders" by announcing where the asset can be opened.
#[derive(Debug, Default)]
pub struct AnnounceViewer {
    cdn_url: Option<String>,
    shown: Mutex<Option<String>>,
}

impl AnnounceViewer {
    pub fn new(cdn_url: Option<String>) -> Self {
        Self {
            cdn_url,
            shown: Mutex::new(None),
        }
    }

    /// The location announced by the last `render`, until `dispose`.
    pub fn shown(&self) -> Option<String> {
        self.shown.lock().ok().and_then(|s| s.clone())
    }

    fn location(&self, key: &str) -> String {
        if key.starts_with("http://") || key.starts_with("https://") {
            return key.to_string();
        }
        match &self.cdn_url {
            Some(cdn) => format!("{}/{}", cdn.trim_end_matches('/'), key.trim_start_matches('/')),
            None => key.to_string(),
        }
    }
}

#[async_trait]
impl SplatViewer for AnnounceViewer {
    async fn render(&self, key: &str) -> Result<()> {
        let location = self.location(key);
        info!("Splat ready: {}", location);
        println!("View your scene: {}", location);
        if let Ok(mut shown) = self.shown.lock() {
            *shown = Some(location);
        }
        Ok(())
    }

    async fn dispose(&self) {
        if let Ok(mut shown) = self.shown.lock() {
            shown.take();
        }
    }
}
