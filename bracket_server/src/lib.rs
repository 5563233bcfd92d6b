//! # Bracket Server
//!
//! HTTP trigger surface and periodic round scheduler for [`bracket_engine`].
//!
//! - [`api`]: axum router exposing match generation, round closure, round
//!   status and battle transitions
//! - [`scheduler`]: background sweep closing rounds whose window has elapsed
//! - [`locks`]: per-tournament serialization shared by both
//! - [`events`]: relay of engine events to logs and metrics
//! - [`config`], [`logging`], [`metrics`]: ambient server setup

pub mod api;
pub mod config;
pub mod events;
pub mod locks;
pub mod logging;
pub mod metrics;
pub mod scheduler;
