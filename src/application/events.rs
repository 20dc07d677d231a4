use crate::domain::progress::StageProgressView;
use crate::domain::scene::Scene;
use crate::domain::session::UploadPhase;
use tokio::sync::broadcast;

/// Everything an observer (UI, CLI) needs to follow one session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Phase(UploadPhase),
    UploadProgress(u8),
    Progress(StageProgressView),
    Snapshot(Scene),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionEvents {
    pub fn new() -> Self {
        // Enough for a full 0..=100 upload sequence plus every phase and stage frame
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    /// Publishing with nobody subscribed is not an error.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}
