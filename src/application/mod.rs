//! Application layer - Session services that drive the ports.

pub mod events;
pub mod poller;
pub mod tracker;
pub mod upload;

pub use events::{SessionEvent, SessionEvents};
pub use poller::{PipelineStatusPoller, PollUpdate, PollerHandle};
pub use tracker::ProgressTracker;
pub use upload::{SessionOutcome, UploadRequest, UploadSessionController};
