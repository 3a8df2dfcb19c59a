//! Command implementations

pub mod completions;
pub mod config;
pub mod control;
pub mod domains;
pub mod hub;
pub mod order;
pub mod rooms;
pub mod setup;
pub mod watch;
