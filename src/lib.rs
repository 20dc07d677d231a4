//! Splatline - Scene Processing Session
//!
//! Client side of a video-to-gaussian-splat pipeline: upload a video, register
//! the scene, start the processing job and follow it to a renderable result.
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (scene model, upload session, progress reconciliation)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations
//! - application/: Session services (upload controller, status poller, progress tracker)
//! - config: Environment configuration
//!
//! # Features
//! - `local`: In-memory backend serving the REST contract (axum)

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

// Re-exports for convenience
pub use adapters::http::{HttpObjectStore, HttpSceneClient};
pub use application::{SessionEvent, UploadRequest, UploadSessionController};
pub use config::ClientConfig;
pub use error::{Result, SceneError};

#[cfg(feature = "local")]
pub use adapters::local::LocalBackend;

#[cfg(feature = "local")]
pub use config::LocalConfig;
