//! Shared E2E test helpers.

// Not every scenario uses every helper
#![allow(dead_code)]

pub mod config;
pub mod fixture;
pub mod mock_blocker;
pub mod outbox;
