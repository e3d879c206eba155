//! Native media primitive bridge.
//!
//! A [`MediaElement`] is the host's media-decoding primitive (an HTML
//! `<video>`/`<audio>` element in the browser, a platform player elsewhere).
//! The core never decodes media itself: providers drive an element through
//! this trait and observe it through [`NativeEvent`]s pushed into a
//! [`NativeEventSink`].
//!
//! Events are intentionally payload-free signals, mirroring DOM media events:
//! when a provider receives `TimeUpdate` it reads `current_time()` from the
//! element instead of trusting a value captured when the event was queued.

use crate::{error::Result, platform::PlatformSendSync};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// `MediaError.code` values reported by native elements.
pub const MEDIA_ERR_ABORTED: u16 = 1;
pub const MEDIA_ERR_NETWORK: u16 = 2;
pub const MEDIA_ERR_DECODE: u16 = 3;
pub const MEDIA_ERR_SRC_NOT_SUPPORTED: u16 = 4;

/// Reason a native `play()` request was refused.
///
/// Variants correspond to the DOMException names a browser rejects the play
/// promise with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayRejection {
    /// Autoplay or user-gesture policy refused playback (`NotAllowedError`).
    NotAllowed,
    /// The source cannot be played by this element (`NotSupportedError`).
    NotSupported,
    /// Interrupted by a newer `load()`/`pause()` (`AbortError`).
    Abort,
}

impl PlayRejection {
    /// DOMException name for this rejection.
    pub fn dom_name(&self) -> &'static str {
        match self {
            PlayRejection::NotAllowed => "NotAllowedError",
            PlayRejection::NotSupported => "NotSupportedError",
            PlayRejection::Abort => "AbortError",
        }
    }

    /// Map a DOMException name back to a rejection.
    ///
    /// Unknown names are treated as `NotSupported`, the only rejection that
    /// does not trigger retry or silent supersession.
    pub fn from_dom_name(name: &str) -> Self {
        match name {
            "NotAllowedError" => PlayRejection::NotAllowed,
            "AbortError" => PlayRejection::Abort,
            _ => PlayRejection::NotSupported,
        }
    }
}

impl fmt::Display for PlayRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dom_name())
    }
}

/// Error reported by the element's `error` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeMediaError {
    /// One of the `MEDIA_ERR_*` codes.
    pub code: u16,
    /// Implementation-specific diagnostic message.
    pub message: String,
}

impl NativeMediaError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Decode failures (3) and unsupported sources (4) share a reload budget.
    pub fn is_decode_failure(&self) -> bool {
        matches!(self.code, MEDIA_ERR_DECODE | MEDIA_ERR_SRC_NOT_SUPPORTED)
    }
}

/// Half-open time range in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}

/// Source assigned to an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSource {
    pub url: String,
    pub mime_type: Option<String>,
}

impl ElementSource {
    pub fn new(url: impl Into<String>, mime_type: Option<String>) -> Self {
        Self {
            url: url.into(),
            mime_type,
        }
    }
}

/// Display mode of a native text track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextTrackMode {
    Disabled,
    Hidden,
    Showing,
}

/// Cue carried by a native text track.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeCue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Text track exposed by the element (in-band or added by the host).
#[derive(Debug, Clone, PartialEq)]
pub struct NativeTextTrack {
    /// `captions`, `subtitles`, `metadata`, ...
    pub kind: String,
    pub label: String,
    pub language: String,
    pub mode: TextTrackMode,
    /// Cues known so far; may grow as the element parses the stream.
    pub cues: Vec<NativeCue>,
    /// Whether the track was flagged default in the manifest.
    pub default: bool,
}

/// Audio track exposed by the element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeAudioTrack {
    pub id: String,
    pub label: String,
    pub language: String,
    pub enabled: bool,
}

/// Signals emitted by a native element.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeEvent {
    LoadStart,
    LoadedMetadata,
    DurationChange,
    CanPlay,
    Playing,
    Pause,
    Waiting,
    Seeking,
    Seeked,
    TimeUpdate,
    Progress,
    Ended,
    Error(NativeMediaError),
    VolumeChange,
    RateChange,
    Resize,
    TextTracksChanged,
    AudioTracksChanged,
}

/// Sending half handed to an element; cloning it is cheap.
#[derive(Debug, Clone)]
pub struct NativeEventSink {
    sender: mpsc::UnboundedSender<NativeEvent>,
}

impl NativeEventSink {
    /// Queue an event. Returns `false` when the owning provider is gone.
    pub fn dispatch(&self, event: NativeEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    /// Whether the receiving queue has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Receiving half owned by the provider listening to an element.
#[derive(Debug)]
pub struct NativeEventQueue {
    receiver: mpsc::UnboundedReceiver<NativeEvent>,
}

impl NativeEventQueue {
    /// Pop the next queued event without waiting.
    pub fn try_next(&mut self) -> Option<NativeEvent> {
        self.receiver.try_recv().ok()
    }

    /// Take every event queued so far.
    pub fn drain(&mut self) -> Vec<NativeEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_next() {
            events.push(event);
        }
        events
    }
}

/// Create a connected sink/queue pair.
pub fn native_event_channel() -> (NativeEventSink, NativeEventQueue) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (NativeEventSink { sender }, NativeEventQueue { receiver })
}

/// Key used to pool elements by the capability they were created for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CapabilityTag(Cow<'static, str>);

impl CapabilityTag {
    /// Plain HTML5 video playback.
    pub const HTML5: CapabilityTag = CapabilityTag(Cow::Borrowed("html5"));
    /// Element reserved for inserted ad breaks.
    pub const AD: CapabilityTag = CapabilityTag(Cow::Borrowed("ad"));
    /// Element reserved for autoplay probes.
    pub const PROBE: CapabilityTag = CapabilityTag(Cow::Borrowed("probe"));

    pub fn new(tag: impl Into<Cow<'static, str>>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CapabilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Native media primitive driven by a provider.
///
/// Methods take `&self`: elements are handles to host objects with their own
/// interior state, just like DOM nodes. Implementations must not call back
/// into the core synchronously; all notifications go through the installed
/// [`NativeEventSink`].
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait MediaElement: PlatformSendSync {
    /// Install or remove the listener sink. `None` strips every listener.
    fn set_event_sink(&self, sink: Option<NativeEventSink>);

    /// Assign a source, or clear it with `None`.
    fn set_src(&self, src: Option<&ElementSource>);

    /// Currently assigned source URL.
    fn src(&self) -> Option<String>;

    /// Run the element's load algorithm for the current source.
    fn load(&self);

    /// Request playback. Resolves once playback actually starts.
    async fn play(&self) -> std::result::Result<(), PlayRejection>;

    fn pause(&self);
    fn paused(&self) -> bool;
    fn ended(&self) -> bool;
    fn seeking(&self) -> bool;

    fn current_time(&self) -> f64;
    fn set_current_time(&self, seconds: f64);

    /// Duration in seconds; `f64::INFINITY` for live streams, `NaN` when unknown.
    fn duration(&self) -> f64;
    fn seekable(&self) -> Vec<TimeRange>;
    fn buffered(&self) -> Vec<TimeRange>;

    fn volume(&self) -> f64;
    fn set_volume(&self, volume: f64);
    fn muted(&self) -> bool;
    fn set_muted(&self, muted: bool);

    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&self, rate: f64);

    /// Rendered video geometry (`videoWidth`, `videoHeight`).
    fn video_size(&self) -> (u32, u32);

    fn error(&self) -> Option<NativeMediaError>;

    fn audio_tracks(&self) -> Vec<NativeAudioTrack> {
        Vec::new()
    }

    fn set_audio_track_enabled(&self, _index: usize, _enabled: bool) {}

    fn text_tracks(&self) -> Vec<NativeTextTrack> {
        Vec::new()
    }

    fn set_text_track_mode(&self, _index: usize, _mode: TextTrackMode) {}

    /// Mount into (or remove from) the visible player surface.
    fn set_mounted(&self, mounted: bool);

    /// Resize the rendering surface.
    fn resize(&self, _width: u32, _height: u32) {}
}

/// Host factory creating fresh native elements for the element pool.
pub trait MediaElementFactory: PlatformSendSync {
    /// Create a new element suitable for `tag`.
    fn create_element(&self, tag: &CapabilityTag) -> Result<Arc<dyn MediaElement>>;

    /// Called once when the player is destroyed for every pooled element.
    fn release_element(&self, _element: &Arc<dyn MediaElement>) {}
}
