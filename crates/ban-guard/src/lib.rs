#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`BanError`, `StoreError`)
//! - [`blocker`]: External blocker abstraction (`Blocker` trait, `CommandBlocker`)
//! - [`store`]: Single-writer SQLite store (`StoreHandle`)
//! - [`coordinator`]: Ban bookkeeping and federation reconciliation (`BanCoordinator`)

pub mod blocker;
pub mod coordinator;
pub mod error;
pub mod store;

// --- Public API Re-exports ---

// Coordinator
pub use coordinator::{BanCoordinator, ReconcileReport, parse_address, unix_now};

// Blocker
pub use blocker::{BlockAction, Blocker, CommandBlocker};

// Store
pub use store::{Row, StoreHandle, StoreOptions};

// Error
pub use error::{BanError, StoreError};
