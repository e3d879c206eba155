//! # Playback Orchestration
//!
//! Drives native media elements on behalf of an embeddable player and
//! exposes a normalized, backend-independent state and event API.
//!
//! ## Overview
//!
//! Leaf to root:
//! - [`provider`]: adapters around one native media element (HTML5, cast)
//! - [`media_controller`]: one provider paired with one item's playback state
//! - [`program_controller`]: active and preloaded controllers, promotion and
//!   recycling through the [`pool`]
//! - [`instream`]: ad breaks substituting the active media
//! - [`captions`]: caption list reconciliation and cue timing
//! - [`autoplay`]: memoized autoplay policy probes
//! - [`player`]: the host-facing [`Player`] facade
//!
//! Every continuation of asynchronous native work is guarded by a
//! [`generation::GenerationToken`]; superseded work settles as a no-op.
//!
//! ## Usage
//!
//! ```ignore
//! use core_playback::{Player, PlayerConfig, PlaylistItem, PlayReason};
//! use core_runtime::config::CoreConfig;
//!
//! let bridges = CoreConfig::builder()
//!     .element_factory(factory)
//!     .http_client(http)
//!     .build()?;
//! let player = Player::new(PlayerConfig::default(), bridges)?;
//! player.load(vec![PlaylistItem::new("https://cdn.example.com/intro.mp4")]).await?;
//! player.play(PlayReason::Interaction).await?;
//! ```

pub mod autoplay;
pub mod captions;
pub mod config;
pub(crate) mod effects;
pub mod error;
pub mod generation;
pub mod instream;
pub mod media_controller;
pub mod model;
pub mod player;
pub mod pool;
pub mod program_controller;
pub mod provider;
pub mod timer;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use autoplay::AutoplayDecision;
pub use config::{PlayerConfig, Preload};
pub use error::{ErrorCode, Localization, MessageKey, PlaybackError, PlayerError, Result};
pub use instream::AdBreak;
pub use model::{MediaState, PlayerModel, PlaylistItem, SideloadedTrack, Source, TrackKind};
pub use player::{Player, PlayerSnapshot};
pub use provider::{Provider, ProviderFactory, ProviderRegistry};

pub use core_runtime::events::{
    PauseReason, PlayReason, PlayerEvent, PlayerState, StreamType,
};
