//! # Providers
//!
//! A provider wraps one native media primitive and turns its raw signals
//! into [`ProviderEvent`]s. Controllers drive providers through the
//! [`Provider`] trait; the [`ProviderRegistry`] picks which
//! [`ProviderFactory`] builds one for a given item.
//!
//! Providers never publish host events and never call back into their
//! controller. Native events are queued on the element side and pulled with
//! [`Provider::poll_events`] at controller checkpoints.

pub mod cast;
pub mod html5;
pub mod registry;
pub mod stream_type;

pub use cast::CastProvider;
pub use html5::{Html5Provider, Html5ProviderFactory};
pub use registry::ProviderRegistry;
pub use stream_type::classify;

use crate::error::Result;
use crate::model::{PlaylistItem, Source};
use bridge_traits::{
    CapabilityTag, MediaElement, NativeMediaError, NativeTextTrack, PlatformFuture, PlatformSend,
    PlatformSendSync, PlayRejection,
};
use core_runtime::events::{AudioTrackInfo, QualityLevel, StreamType, VisualQuality};
use std::sync::Arc;

/// Instance capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderCapabilities {
    pub supports_playback_rate: bool,
    /// Captions are rendered by the native primitive itself.
    pub render_natively: bool,
}

/// Settings a provider is built with.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub dvr_window: f64,
    /// Quality label to prefer when picking the initial rendition.
    pub quality_label: Option<String>,
}

impl Default for ProviderContext {
    fn default() -> Self {
        Self {
            dvr_window: 120.0,
            quality_label: None,
        }
    }
}

/// Normalized provider event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// Source assigned, native load started.
    Loading,
    Meta {
        duration: f64,
        stream_type: StreamType,
        width: u32,
        height: u32,
    },
    Buffering,
    Playing,
    Paused,
    /// Position stopped advancing while playing.
    Stalled,
    Time {
        position: f64,
        duration: f64,
        current_time: f64,
    },
    BufferChange {
        buffer_percent: f64,
    },
    Seek {
        position: f64,
        offset: f64,
    },
    Seeked,
    Complete,
    Levels {
        levels: Vec<QualityLevel>,
        current: usize,
    },
    LevelsChanged {
        current: usize,
    },
    /// Rendered geometry changed.
    VisualQuality(VisualQuality),
    AudioTracks {
        tracks: Vec<AudioTrackInfo>,
        current: usize,
    },
    AudioTrackChanged {
        current: usize,
    },
    /// Native text tracks as currently reported by the element.
    SubtitleTracks(Vec<NativeTextTrack>),
    Volume {
        volume: u8,
    },
    Mute {
        muted: bool,
    },
    RateChange {
        playback_rate: f64,
    },
    MediaError(NativeMediaError),
}

/// Contract every playback backend implements.
pub trait Provider: PlatformSend {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> ProviderCapabilities;

    /// Assign the item's source and start loading; playback begins at
    /// `start` once metadata is known.
    fn load(&mut self, item: &PlaylistItem, start: f64);

    /// Load without the intent to play yet (background preload).
    fn preload(&mut self, item: &PlaylistItem) {
        self.load(item, item.starttime);
    }

    /// Request playback. The returned future owns everything it needs and can
    /// be awaited after the caller released its borrow of the provider.
    fn play(&mut self) -> PlatformFuture<'static, std::result::Result<(), PlayRejection>>;

    fn pause(&mut self);

    /// Stop and discard the loaded source.
    fn stop(&mut self);

    /// Seek to `position`. On DVR streams `position` is an offset from the
    /// live edge (0 = edge, negative = behind it).
    fn seek(&mut self, position: f64);

    /// Volume in percent.
    fn set_volume(&mut self, volume: u8);

    fn set_mute(&mut self, muted: bool);

    fn set_playback_rate(&mut self, rate: f64);

    fn quality_levels(&self) -> Vec<QualityLevel> {
        Vec::new()
    }

    fn current_quality(&self) -> usize {
        0
    }

    /// Switch rendition. Returns `false` when nothing changed.
    fn set_current_quality(&mut self, _index: usize) -> bool {
        false
    }

    fn set_current_audio_track(&mut self, _index: usize) -> bool {
        false
    }

    /// Enable cue loading on a native text track, or none.
    fn set_subtitles_track(&mut self, _native_index: Option<usize>) {}

    /// Install native listeners.
    fn attach_media(&mut self);

    /// Remove native listeners; state is kept for a later `attach_media`.
    fn detach_media(&mut self);

    /// Mount into or unmount from the visible surface.
    fn set_visibility(&mut self, visible: bool);

    fn resize(&mut self, _width: u32, _height: u32) {}

    /// Drain queued events.
    fn poll_events(&mut self, out: &mut Vec<ProviderEvent>);

    /// Polling tick (stall detection, remote position polling).
    fn tick(&mut self, _out: &mut Vec<ProviderEvent>) {}

    /// Raw element time in seconds.
    fn current_time(&self) -> f64;

    /// Duration as reported to the host (see [`classify`]).
    fn duration(&self) -> f64;

    fn stream_type(&self) -> StreamType;

    fn is_paused(&self) -> bool;

    /// Source currently loaded, reported as the item URL while the element
    /// still holds what this provider assigned.
    fn source_url(&self) -> Option<String>;

    /// Release listeners and stop playback. The element itself stays with
    /// the lease holder.
    fn destroy(&mut self);
}

/// Builds providers for the sources it supports.
pub trait ProviderFactory: PlatformSendSync {
    fn name(&self) -> &'static str;

    /// Static selection predicate.
    fn supports(&self, source: &Source) -> bool;

    /// Tag of the pooled element the provider runs on.
    fn capability(&self) -> CapabilityTag;

    fn create(
        &self,
        element: Arc<dyn MediaElement>,
        context: ProviderContext,
    ) -> PlatformFuture<'static, Result<Box<dyn Provider>>>;
}
