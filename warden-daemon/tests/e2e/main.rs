//! E2E integration tests for warden-daemon.
//!
//! These tests drive real log files, a real SQLite store and the profile loader
//! through the scan scheduler, the remote command handlers and the orchestrator.
//! Only the external blocker and the controller link are replaced by recorders.
//!
//! # Test Structure
//!
//! - `helpers/` -- Shared test utilities (fixture, recording blocker, recording outbox)
//! - `scenarios/` -- Test files organized by scenario
//!
//! # Running
//!
//! ```bash
//! cargo test -p warden-daemon --test e2e
//! ```

mod helpers;
mod scenarios;
