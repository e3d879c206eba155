//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the player crates:
//! - Logging and tracing infrastructure
//! - Host bridge configuration
//! - The normalized player event vocabulary and its broadcast bus
//!
//! ## Overview
//!
//! `core-playback` owns the orchestration logic; this crate holds the pieces a
//! host touches before a player exists (logging setup, bridge injection) and
//! the event types it receives afterwards.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
