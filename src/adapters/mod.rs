//! Adapters - Concrete implementations of ports.

pub mod auth;
pub mod http;
pub mod viewer;

#[cfg(feature = "local")]
pub mod local;
