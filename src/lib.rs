//! roomdeck - a room dashboard for Home Assistant
//!
//! The library keeps a live mirror of a Home Assistant instance over its
//! WebSocket API and derives room views from it: entities grouped by area,
//! manual ordering and hiding stored as registry labels, tap and slider
//! controls with optimistic display values, and drag-to-reorder logic for
//! tile grids. The `roomdeck` binary drives all of it from the terminal.

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod connection;
pub mod controls;
pub mod debounce;
pub mod drag;
pub mod error;
pub mod local_state;
pub mod optimistic;
pub mod order;
pub mod output;
pub mod protocol;
pub mod resolve;
pub mod rooms;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
