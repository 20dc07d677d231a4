//! Local adapters for development and end-to-end testing.

pub mod http;
pub mod pipeline;
pub mod store;

pub use http::LocalBackend;
pub use pipeline::PipelineSimulator;
pub use store::SceneStore;
