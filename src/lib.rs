#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Nightfall Server
//!
//! Authoritative WebSocket session server for a one-night hidden-role
//! deduction game.
//!
//! Everything lives in memory: no database, no cloud services. Run the
//! binary, point clients at the WebSocket endpoint, play.

/// Server configuration and environment variables
pub mod config;

/// Game core: roles, deck, night engine, phase machine, views
pub mod game;

/// Structured logging configuration
pub mod logging;

/// WebSocket message protocol definitions
pub mod protocol;

/// Rate limiting implementation
pub mod rate_limit;

/// Reconnection grace periods and AI takeover
pub mod reconnection;

/// Rooms and the room directory
pub mod room;

/// Session gateway: registry, routing, liveness
pub mod server;

/// WebSocket connection handling
pub mod websocket;
