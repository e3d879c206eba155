//! # Host Bridge Traits
//!
//! Platform abstraction traits that each host must implement for the player
//! core.
//!
//! ## Overview
//!
//! The core orchestrates playback but never touches a platform API directly.
//! Everything it needs from the host is expressed here:
//!
//! ### Media
//! - [`MediaElement`](media::MediaElement) - One native decoding primitive
//!   (an HTML media element in browsers)
//! - [`MediaElementFactory`](media::MediaElementFactory) - Creates elements for
//!   the per-player element pool
//! - [`CastSession`](cast::CastSession) - Remote playback receiver
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Fetches sideloaded caption files
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for load-time measurement
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to the host
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Web      | `bridge-wasm`       | ✅ In Progress |
//! | Tests    | scripted mocks      | ✅ |
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with a descriptive error when a required capability is
//! missing:
//!
//! ```ignore
//! use core_runtime::error::Error;
//!
//! let factory = config.element_factory
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "MediaElementFactory".to_string(),
//!         message: "No media element factory provided. \
//!                  Web: use bridge_wasm::DomElementFactory.".to_string(),
//!     })?;
//! ```
//!
//! ## Thread Safety
//!
//! Trait bounds go through [`PlatformSendSync`](platform::PlatformSendSync):
//! `Send + Sync` on native targets, unconstrained on `wasm32` where DOM
//! handles are single-threaded.

pub mod cast;
pub mod error;
pub mod http;
pub mod media;
pub mod platform;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use cast::{CastLoadRequest, CastSession};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use media::{
    native_event_channel, CapabilityTag, ElementSource, MediaElement, MediaElementFactory,
    NativeAudioTrack, NativeCue, NativeEvent, NativeEventQueue, NativeEventSink,
    NativeMediaError, NativeTextTrack, PlayRejection, TextTrackMode, TimeRange,
};
pub use platform::{box_future, PlatformFuture, PlatformSend, PlatformSendSync};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, SystemClock};
