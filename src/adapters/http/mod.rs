//! HTTP outbound adapters.
//!
//! This module talks to the scene REST API and to pre-signed storage URLs.

mod client;
mod storage;

pub use client::HttpSceneClient;
pub use storage::HttpObjectStore;
