//! Domain layer - Pure business logic.

pub mod progress;
pub mod scene;
pub mod session;
