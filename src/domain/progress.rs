//! Stage progress reconciliation.
//!
//! The backend reports a coarse `status` plus a `processingStage` hint that can
//! be stale, skip values or arrive out of order. [`reconcile`] turns that noisy
//! signal into a sequence of views whose segment fills never decrease and whose
//! highlighted segment never moves backwards. When the stage jumps ahead, the
//! intermediate segments are filled in one frame and the new segment is
//! highlighted in the next, so the presentation layer always shows the skipped
//! segments completing before the later one lights up.

use super::scene::{ProcessingStage, Scene, SceneStatus};
use serde::Serialize;

pub const SEGMENT_COUNT: usize = 6;
pub const FULL: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    Upload,
    Extract,
    Colmap,
    Train,
    Convert,
    Done,
}

impl Segment {
    pub const ALL: [Segment; SEGMENT_COUNT] = [
        Segment::Upload,
        Segment::Extract,
        Segment::Colmap,
        Segment::Train,
        Segment::Convert,
        Segment::Done,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Segment::Upload => "Upload",
            Segment::Extract => "Extract Frames",
            Segment::Colmap => "Analyze",
            Segment::Train => "Generate",
            Segment::Convert => "Converting",
            Segment::Done => "Done",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Segment::Upload => "Uploading video...",
            Segment::Extract => "Extracting frames from video...",
            Segment::Colmap => "Analyzing camera positions...",
            Segment::Train => "Generating 3D Gaussian Splat...",
            Segment::Convert => "Converting to viewable format...",
            Segment::Done => "Your 3D Gaussian Splat is ready to view.",
        }
    }
}

/// One input to the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Raw byte progress of the direct-to-storage upload.
    Upload { percent: u8 },
    /// A scene snapshot delivered by the poller.
    Snapshot {
        status: SceneStatus,
        stage: Option<ProcessingStage>,
        error: Option<String>,
    },
}

impl Observation {
    pub fn upload(percent: u8) -> Self {
        Observation::Upload { percent }
    }
}

impl From<&Scene> for Observation {
    fn from(scene: &Scene) -> Self {
        Observation::Snapshot {
            status: scene.status,
            stage: scene.processing_stage,
            error: scene.error.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Outcome {
    InProgress,
    Completed,
    Failed { error: String },
}

/// What the presentation layer draws for one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentView {
    pub segment: Segment,
    pub fill: u8,
    pub current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageProgressView {
    fills: [u8; SEGMENT_COUNT],
    current: usize,
    outcome: Outcome,
}

impl Default for StageProgressView {
    fn default() -> Self {
        Self {
            fills: [0; SEGMENT_COUNT],
            current: Segment::Upload.index(),
            outcome: Outcome::InProgress,
        }
    }
}

impl StageProgressView {
    pub fn fills(&self) -> [u8; SEGMENT_COUNT] {
        self.fills
    }

    pub fn current(&self) -> Segment {
        Segment::ALL[self.current]
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome != Outcome::InProgress
    }

    pub fn segments(&self) -> impl Iterator<Item = SegmentView> + '_ {
        Segment::ALL.iter().map(move |&segment| SegmentView {
            segment,
            fill: self.fills[segment.index()],
            current: segment.index() == self.current,
        })
    }

    /// Mean of all segment fills, 0..=100.
    pub fn overall_percent(&self) -> u8 {
        let total: u32 = self.fills.iter().map(|&f| f as u32).sum();
        (total / SEGMENT_COUNT as u32) as u8
    }
}

enum Target {
    Index(usize),
    Hold,
    Failed(String),
}

fn stage_index(stage: ProcessingStage) -> Option<usize> {
    match stage {
        ProcessingStage::Pending => Some(Segment::Upload.index()),
        ProcessingStage::ExtractingFrames => Some(Segment::Extract.index()),
        ProcessingStage::RunningColmap => Some(Segment::Colmap.index()),
        ProcessingStage::Training3dgs => Some(Segment::Train.index()),
        ProcessingStage::Converting => Some(Segment::Convert.index()),
        ProcessingStage::Completed => Some(Segment::Done.index()),
        ProcessingStage::Failed => None,
    }
}

fn target(status: SceneStatus, stage: Option<ProcessingStage>, error: &Option<String>) -> Target {
    let failure = || {
        Target::Failed(
            error
                .clone()
                .unwrap_or_else(|| "Something went wrong during processing.".to_string()),
        )
    };
    match (status, stage) {
        (SceneStatus::Failed, _) => failure(),
        (SceneStatus::Completed, _) => Target::Index(Segment::Done.index()),
        (_, Some(ProcessingStage::Failed)) => failure(),
        (_, Some(stage)) => stage_index(stage).map_or(Target::Hold, Target::Index),
        (_, None) => Target::Hold,
    }
}

/// Compute the frames that take `previous` to the state implied by `observation`.
///
/// Returns an empty vector when nothing visible changes (duplicate, stale or
/// unrecognized input, or a view that is already terminal). When the segment
/// index advances, the first frame fills the segments being passed and the last
/// frame moves the highlight; callers must render them in order.
pub fn reconcile(previous: &StageProgressView, observation: &Observation) -> Vec<StageProgressView> {
    if previous.is_terminal() {
        return Vec::new();
    }

    match observation {
        Observation::Upload { percent } => {
            let percent = (*percent).min(FULL);
            if previous.current != Segment::Upload.index() || percent <= previous.fills[0] {
                return Vec::new();
            }
            let mut next = previous.clone();
            next.fills[0] = percent;
            vec![next]
        }
        Observation::Snapshot {
            status,
            stage,
            error,
        } => match target(*status, *stage, error) {
            Target::Hold => Vec::new(),
            Target::Failed(error) => {
                let mut next = previous.clone();
                next.outcome = Outcome::Failed { error };
                vec![next]
            }
            Target::Index(index) if index > previous.current => advance(previous, index),
            Target::Index(_) => Vec::new(),
        },
    }
}

fn advance(previous: &StageProgressView, index: usize) -> Vec<StageProgressView> {
    let mut frames = Vec::with_capacity(2);

    let mut filled = previous.clone();
    for fill in &mut filled.fills[previous.current..index] {
        *fill = FULL;
    }
    if filled != *previous {
        frames.push(filled.clone());
    }

    let mut advanced = filled;
    advanced.current = index;
    if index == Segment::Done.index() {
        advanced.fills[index] = FULL;
        advanced.outcome = Outcome::Completed;
    }
    frames.push(advanced);
    frames
}
