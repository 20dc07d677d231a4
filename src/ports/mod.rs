//! Ports - Trait definitions for the collaborators a session talks to.

pub mod auth;
pub mod scenes;
pub mod storage;
pub mod viewer;
