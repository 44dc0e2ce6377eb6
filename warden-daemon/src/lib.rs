//! Warden daemon library.
//!
//! This library exposes internal modules for integration testing.
//! In production, `warden-daemon` is used as a binary (main.rs).

pub mod cli;
pub mod handlers;
pub mod logging;
pub mod metrics_server;
pub mod orchestrator;
pub mod scheduler;
