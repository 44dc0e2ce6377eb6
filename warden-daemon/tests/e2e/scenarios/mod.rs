//! E2E test scenarios.

mod allow_list;
mod config_loading;
mod detection;
mod lifecycle;
mod remote_commands;
