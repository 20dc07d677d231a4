use crate::error::{Result, SceneError};
use serde::{Deserialize, Deserializer, Serialize};
use std::ops::RangeInclusive;

pub const FPS_RANGE: RangeInclusive<u32> = 1..=10;
pub const ITERATIONS_RANGE: RangeInclusive<u32> = 1_000..=100_000;
pub const DENSIFY_UNTIL_RANGE: RangeInclusive<u32> = 1_000..=50_000;
pub const DENSIFICATION_INTERVAL_RANGE: RangeInclusive<u32> = 50..=500;

/// Server-authoritative lifecycle of a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SceneStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SceneStatus::Completed | SceneStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            SceneStatus::Pending => 0,
            SceneStatus::Processing => 1,
            SceneStatus::Completed | SceneStatus::Failed => 2,
        }
    }

    /// True when `self` would move backwards from `previous`, i.e. the read is stale.
    pub fn regresses_from(self, previous: SceneStatus) -> bool {
        self.rank() < previous.rank() || (previous.is_terminal() && self != previous)
    }
}

/// Fine-grained pipeline phase reported by the backend. Only a hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Pending,
    ExtractingFrames,
    RunningColmap,
    #[serde(rename = "training_3dgs")]
    Training3dgs,
    Converting,
    Completed,
    Failed,
}

impl ProcessingStage {
    pub const ALL: [ProcessingStage; 7] = [
        ProcessingStage::Pending,
        ProcessingStage::ExtractingFrames,
        ProcessingStage::RunningColmap,
        ProcessingStage::Training3dgs,
        ProcessingStage::Converting,
        ProcessingStage::Completed,
        ProcessingStage::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingStage::Pending => "pending",
            ProcessingStage::ExtractingFrames => "extracting_frames",
            ProcessingStage::RunningColmap => "running_colmap",
            ProcessingStage::Training3dgs => "training_3dgs",
            ProcessingStage::Converting => "converting",
            ProcessingStage::Completed => "completed",
            ProcessingStage::Failed => "failed",
        }
    }

    /// Recognized wire values only; anything else is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.as_str() == raw)
    }
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Absent, `null` and unrecognized stage strings all decode to `None` ("hold").
fn lenient_stage<'de, D>(deserializer: D) -> std::result::Result<Option<ProcessingStage>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(|value| value.as_str())
        .and_then(ProcessingStage::parse))
}

/// Effective pipeline settings, as stored on the scene once a job starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSettings {
    pub fps: u32,
    pub iterations: u32,
    pub densify_until_iter: u32,
    pub densification_interval: u32,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            fps: 3,
            iterations: 30_000,
            densify_until_iter: 15_000,
            densification_interval: 100,
        }
    }
}

/// Caller-supplied knobs; omitted values fall back to [`JobSettings::default`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub densify_until_iter: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub densification_interval: Option<u32>,
}

impl JobOptions {
    pub fn validate(&self) -> Result<()> {
        check_range("fps", self.fps, &FPS_RANGE)?;
        check_range("iterations", self.iterations, &ITERATIONS_RANGE)?;
        check_range(
            "densifyUntilIter",
            self.densify_until_iter,
            &DENSIFY_UNTIL_RANGE,
        )?;
        check_range(
            "densificationInterval",
            self.densification_interval,
            &DENSIFICATION_INTERVAL_RANGE,
        )?;
        Ok(())
    }

    /// Validate and fill in defaults. Explicit values pass through untouched.
    pub fn resolve(&self) -> Result<JobSettings> {
        self.validate()?;
        let defaults = JobSettings::default();
        Ok(JobSettings {
            fps: self.fps.unwrap_or(defaults.fps),
            iterations: self.iterations.unwrap_or(defaults.iterations),
            densify_until_iter: self
                .densify_until_iter
                .unwrap_or(defaults.densify_until_iter),
            densification_interval: self
                .densification_interval
                .unwrap_or(defaults.densification_interval),
        })
    }
}

fn check_range(name: &str, value: Option<u32>, range: &RangeInclusive<u32>) -> Result<()> {
    match value {
        Some(v) if !range.contains(&v) => Err(SceneError::Validation(format!(
            "{} must be within {}..={}, got {}",
            name,
            range.start(),
            range.end(),
            v
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: SceneStatus,
    #[serde(
        default,
        deserialize_with = "lenient_stage",
        skip_serializing_if = "Option::is_none"
    )]
    pub processing_stage: Option<ProcessingStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splat_key: Option<String>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gaussian_count: Option<u64>,
    #[serde(alias = "userId", default)]
    pub owner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<JobSettings>,
}

impl Scene {
    /// Storage key of the renderable asset, once there is one to render.
    pub fn viewable_key(&self) -> Option<&str> {
        match self.status {
            SceneStatus::Completed => self.splat_key.as_deref().filter(|k| !k.is_empty()),
            _ => None,
        }
    }
}

/// Pre-allocated scene id plus a time-limited write URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSlot {
    pub scene_id: String,
    pub upload_url: String,
    #[serde(rename = "key")]
    pub storage_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    #[serde(rename = "executionArn")]
    pub execution_arn: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSlotRequest {
    #[serde(default = "default_filename")]
    pub filename: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

pub fn default_filename() -> String {
    "video.mp4".to_string()
}

pub fn default_content_type() -> String {
    "video/mp4".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSceneRequest {
    pub scene_id: String,
    pub name: String,
    pub video_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartJobRequest {
    pub scene_id: String,
    pub video_key: String,
    #[serde(flatten)]
    pub options: JobOptions,
}
