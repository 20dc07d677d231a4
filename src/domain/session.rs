use serde::Serialize;

/// Phase of one client-side upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPhase {
    Idle,
    RequestingSlot,
    Uploading,
    CreatingScene,
    StartingJob,
    Processing,
    Complete,
    Error,
}

impl UploadPhase {
    /// The only phase allowed to follow `self` on the success path.
    pub fn next(self) -> Option<UploadPhase> {
        match self {
            UploadPhase::Idle => Some(UploadPhase::RequestingSlot),
            UploadPhase::RequestingSlot => Some(UploadPhase::Uploading),
            UploadPhase::Uploading => Some(UploadPhase::CreatingScene),
            UploadPhase::CreatingScene => Some(UploadPhase::StartingJob),
            UploadPhase::StartingJob => Some(UploadPhase::Processing),
            UploadPhase::Processing => Some(UploadPhase::Complete),
            UploadPhase::Complete | UploadPhase::Error => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UploadPhase::Complete | UploadPhase::Error)
    }
}

impl std::fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            UploadPhase::Idle => "idle",
            UploadPhase::RequestingSlot => "requesting_slot",
            UploadPhase::Uploading => "uploading",
            UploadPhase::CreatingScene => "creating_scene",
            UploadPhase::StartingJob => "starting_job",
            UploadPhase::Processing => "processing",
            UploadPhase::Complete => "complete",
            UploadPhase::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: UploadPhase,
    pub to: UploadPhase,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid phase transition {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// Client-local, ephemeral state of one submission.
#[derive(Debug, Clone)]
pub struct UploadSession {
    phase: UploadPhase,
    scene_id: Option<String>,
    upload_progress: u8,
    history: Vec<UploadPhase>,
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadSession {
    pub fn new() -> Self {
        Self {
            phase: UploadPhase::Idle,
            scene_id: None,
            upload_progress: 0,
            history: vec![UploadPhase::Idle],
        }
    }

    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    pub fn scene_id(&self) -> Option<&str> {
        self.scene_id.as_deref()
    }

    pub fn upload_progress(&self) -> u8 {
        self.upload_progress
    }

    /// Every phase entered so far, in order, starting with `Idle`.
    pub fn history(&self) -> &[UploadPhase] {
        &self.history
    }

    /// Step along the success path. Skipping or repeating a phase is rejected.
    pub fn advance(&mut self, to: UploadPhase) -> Result<(), InvalidTransition> {
        if self.phase.next() != Some(to) {
            return Err(InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.enter(to);
        Ok(())
    }

    /// Any non-terminal phase may fail.
    pub fn fail(&mut self) -> Result<(), InvalidTransition> {
        if self.phase.is_terminal() {
            return Err(InvalidTransition {
                from: self.phase,
                to: UploadPhase::Error,
            });
        }
        self.enter(UploadPhase::Error);
        Ok(())
    }

    pub fn set_scene_id(&mut self, scene_id: impl Into<String>) {
        self.scene_id = Some(scene_id.into());
    }

    /// Record byte progress. Only meaningful while uploading; never decreases.
    pub fn record_upload_progress(&mut self, percent: u8) -> bool {
        let percent = percent.min(100);
        if self.phase != UploadPhase::Uploading || percent <= self.upload_progress {
            return false;
        }
        self.upload_progress = percent;
        true
    }

    /// Back to a fresh `Idle` session (form reset / retry affordance).
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn enter(&mut self, phase: UploadPhase) {
        self.phase = phase;
        self.history.push(phase);
    }
}
