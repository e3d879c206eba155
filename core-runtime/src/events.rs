//! # Event Bus System
//!
//! The normalized, backend-independent event vocabulary a player emits to its
//! host, and the `tokio::sync::broadcast` bus that carries it.
//!
//! ## Overview
//!
//! - **Event Types**: [`PlayerEvent`] is a closed, tagged enum grouped by
//!   domain (media, tracks, playlist, interface, ads, errors). Providers never
//!   emit these directly; the playback controllers translate provider events
//!   into this vocabulary variant by variant.
//! - **EventBus**: broadcast channel for publishing events
//! - **EventStream**: wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  translate  ┌─────────────────┐  emit  ┌──────────┐  subscribe  ┌──────┐
//! │   Provider   ├────────────>│ MediaController ├───────>│ EventBus ├────────────>│ Host │
//! └──────────────┘             └─────────────────┘        └──────────┘             └──────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, MediaEvent, PlayerEvent, PlayerState};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(64);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(PlayerEvent::Media(MediaEvent::Seeked)).ok();
//! assert_eq!(rx.recv().await.unwrap(), PlayerEvent::Media(MediaEvent::Seeked));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events. `time`
//!   events arrive several times per second, so hosts that only care about
//!   state changes should filter with [`EventStream`] and size the bus
//!   accordingly.
//! - **`RecvError::Closed`**: the player was dropped.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Vocabulary Types
// ============================================================================

/// Host-visible player state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    Idle,
    Buffering,
    Playing,
    Paused,
    Complete,
    Error,
}

impl PlayerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerState::Idle => "idle",
            PlayerState::Buffering => "buffering",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
            PlayerState::Complete => "complete",
            PlayerState::Error => "error",
        }
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why playback was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayReason {
    External,
    Interaction,
    Autostart,
    Playlist,
    Related,
    Viewable,
    Settings,
}

/// Why playback was paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseReason {
    External,
    Interaction,
    Viewable,
    Ad,
}

/// Live/DVR/VOD classification of the current stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamType {
    Vod,
    Live,
    Dvr,
}

/// One selectable quality level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityLevel {
    pub label: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bitrate: Option<u32>,
}

/// Why the rendered quality changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityChangeReason {
    /// Initial rendition chosen at load time.
    Initial,
    /// Host or user selected a level.
    Api,
    /// Adaptive switch performed by the native primitive.
    Auto,
}

/// Geometry actually rendered after a level switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualQuality {
    pub level: usize,
    pub width: u32,
    pub height: u32,
    pub reason: QualityChangeReason,
}

/// Audio track descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrackInfo {
    pub name: String,
    pub language: String,
}

/// Entry of the captions list. Index 0 is always "Off".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionOption {
    pub id: String,
    pub label: String,
}

/// Cue currently on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveCue {
    pub track_id: String,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Host-visible error record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Stable integer code; see `core_playback::error::ErrorCode`.
    pub code: u32,
    /// Localized message.
    pub message: String,
    /// Underlying cause, if any.
    pub source_error: Option<String>,
}

// ============================================================================
// Player Events
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum PlayerEvent {
    Media(MediaEvent),
    Tracks(TrackEvent),
    Playlist(PlaylistEvent),
    Interface(InterfaceEvent),
    Ad(AdEvent),
    Error(ErrorEvent),
}

impl PlayerEvent {
    /// Host-facing event name (`play`, `time`, `adBreakStart`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::Media(e) => e.name(),
            PlayerEvent::Tracks(e) => e.name(),
            PlayerEvent::Playlist(e) => e.name(),
            PlayerEvent::Interface(e) => e.name(),
            PlayerEvent::Ad(e) => e.name(),
            PlayerEvent::Error(e) => e.name(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            PlayerEvent::Error(ErrorEvent::Error(_)) => EventSeverity::Error,
            PlayerEvent::Error(_) | PlayerEvent::Ad(AdEvent::AdError { .. }) => {
                EventSeverity::Warning
            }
            PlayerEvent::Media(MediaEvent::Time { .. })
            | PlayerEvent::Media(MediaEvent::BufferChange { .. })
            | PlayerEvent::Ad(AdEvent::AdTime { .. })
            | PlayerEvent::Tracks(TrackEvent::ActiveCues { .. }) => EventSeverity::Debug,
            _ => EventSeverity::Info,
        }
    }

    /// Whether this is a host state transition event.
    pub fn new_state(&self) -> Option<PlayerState> {
        match self {
            PlayerEvent::Media(MediaEvent::Play { .. }) => Some(PlayerState::Playing),
            PlayerEvent::Media(MediaEvent::Pause { .. }) => Some(PlayerState::Paused),
            PlayerEvent::Media(MediaEvent::Buffer { .. }) => Some(PlayerState::Buffering),
            PlayerEvent::Media(MediaEvent::Idle { .. }) => Some(PlayerState::Idle),
            PlayerEvent::Media(MediaEvent::Complete) => Some(PlayerState::Complete),
            PlayerEvent::Error(ErrorEvent::Error(_)) => Some(PlayerState::Error),
            _ => None,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Media Events
// ============================================================================

/// Playback state and timeline events of the active content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum MediaEvent {
    /// Fired once per item before its first play attempt.
    BeforePlay { item_index: usize, reason: PlayReason },
    Play { old_state: PlayerState, reason: PlayReason },
    Pause { old_state: PlayerState, reason: Option<PauseReason> },
    Buffer { old_state: PlayerState },
    Idle { old_state: PlayerState },
    /// Content reached its natural end; `Complete` follows at the next
    /// checkpoint unless an ad break takes over the surface.
    BeforeComplete,
    Complete,
    Time { position: f64, duration: f64, current_time: f64 },
    BufferChange { buffer_percent: f64 },
    Seek { position: f64, offset: f64 },
    Seeked,
    Meta {
        duration: f64,
        stream_type: StreamType,
        width: u32,
        height: u32,
    },
    FirstFrame { load_time_ms: u64 },
    PlaybackRateChanged { playback_rate: f64 },
    Volume { volume: u8 },
    Mute { mute: bool },
    PlayAttemptFailed {
        item_index: usize,
        play_reason: PlayReason,
        code: u32,
        reason: String,
    },
    AutostartNotAllowed { code: u32 },
}

impl MediaEvent {
    fn name(&self) -> &'static str {
        match self {
            MediaEvent::BeforePlay { .. } => "beforePlay",
            MediaEvent::Play { .. } => "play",
            MediaEvent::Pause { .. } => "pause",
            MediaEvent::Buffer { .. } => "buffer",
            MediaEvent::Idle { .. } => "idle",
            MediaEvent::BeforeComplete => "beforeComplete",
            MediaEvent::Complete => "complete",
            MediaEvent::Time { .. } => "time",
            MediaEvent::BufferChange { .. } => "bufferChange",
            MediaEvent::Seek { .. } => "seek",
            MediaEvent::Seeked => "seeked",
            MediaEvent::Meta { .. } => "meta",
            MediaEvent::FirstFrame { .. } => "firstFrame",
            MediaEvent::PlaybackRateChanged { .. } => "playbackRateChanged",
            MediaEvent::Volume { .. } => "volume",
            MediaEvent::Mute { .. } => "mute",
            MediaEvent::PlayAttemptFailed { .. } => "playAttemptFailed",
            MediaEvent::AutostartNotAllowed { .. } => "autostartNotAllowed",
        }
    }
}

// ============================================================================
// Track Events
// ============================================================================

/// Quality, audio and caption track events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum TrackEvent {
    Levels { levels: Vec<QualityLevel>, current: usize },
    LevelsChanged { current: usize },
    VisualQuality(VisualQuality),
    AudioTracks { tracks: Vec<AudioTrackInfo>, current: usize },
    AudioTrackChanged { current: usize },
    SubtitlesTracks { tracks: Vec<CaptionOption>, current: usize },
    SubtitlesTrackChanged { current: usize, label: String },
    ActiveCues { cues: Vec<ActiveCue> },
}

impl TrackEvent {
    fn name(&self) -> &'static str {
        match self {
            TrackEvent::Levels { .. } => "levels",
            TrackEvent::LevelsChanged { .. } => "levelsChanged",
            TrackEvent::VisualQuality(_) => "visualQuality",
            TrackEvent::AudioTracks { .. } => "audioTracks",
            TrackEvent::AudioTrackChanged { .. } => "audioTrackChanged",
            TrackEvent::SubtitlesTracks { .. } => "subtitlesTracks",
            TrackEvent::SubtitlesTrackChanged { .. } => "subtitlesTrackChanged",
            TrackEvent::ActiveCues { .. } => "activeCues",
        }
    }
}

// ============================================================================
// Playlist Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PlaylistEvent {
    Playlist { item_count: usize },
    PlaylistItem { index: usize, file: String, title: Option<String> },
    NextUp { index: Option<usize>, title: Option<String> },
    PlaylistComplete,
    CastStarted { device_name: String },
    CastStopped,
}

impl PlaylistEvent {
    fn name(&self) -> &'static str {
        match self {
            PlaylistEvent::Playlist { .. } => "playlist",
            PlaylistEvent::PlaylistItem { .. } => "playlistItem",
            PlaylistEvent::NextUp { .. } => "nextUp",
            PlaylistEvent::PlaylistComplete => "playlistComplete",
            PlaylistEvent::CastStarted { .. } => "castStarted",
            PlaylistEvent::CastStopped => "castStopped",
        }
    }
}

// ============================================================================
// Interface Events
// ============================================================================

/// UI-visible derived state owned by the player model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum InterfaceEvent {
    FullscreenChange { fullscreen: bool },
    Viewable { viewable: bool },
    Controls { controls: bool },
    ButtonsChanged { ids: Vec<String> },
}

impl InterfaceEvent {
    fn name(&self) -> &'static str {
        match self {
            InterfaceEvent::FullscreenChange { .. } => "fullscreenchange",
            InterfaceEvent::Viewable { .. } => "viewable",
            InterfaceEvent::Controls { .. } => "controls",
            InterfaceEvent::ButtonsChanged { .. } => "buttonsChanged",
        }
    }
}

// ============================================================================
// Ad Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum AdEvent {
    AdBreakStart { ad_count: usize },
    AdPlay { ad_index: usize },
    AdPause { ad_index: usize },
    AdTime { ad_index: usize, position: f64, duration: f64 },
    AdComplete { ad_index: usize },
    AdSkipped { ad_index: usize },
    AdError { code: u32, message: String },
    AdBreakEnd,
}

impl AdEvent {
    fn name(&self) -> &'static str {
        match self {
            AdEvent::AdBreakStart { .. } => "adBreakStart",
            AdEvent::AdPlay { .. } => "adPlay",
            AdEvent::AdPause { .. } => "adPause",
            AdEvent::AdTime { .. } => "adTime",
            AdEvent::AdComplete { .. } => "adComplete",
            AdEvent::AdSkipped { .. } => "adSkipped",
            AdEvent::AdError { .. } => "adError",
            AdEvent::AdBreakEnd => "adBreakEnd",
        }
    }
}

// ============================================================================
// Error Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "error", rename_all = "camelCase")]
pub enum ErrorEvent {
    /// Native element error as reported, before retry classification.
    MediaError(ErrorPayload),
    /// Non-fatal problem (retried decode error, dropped caption track).
    Warning(ErrorPayload),
    /// Fatal error; the player is in the error state until the next load.
    Error(ErrorPayload),
}

impl ErrorEvent {
    fn name(&self) -> &'static str {
        match self {
            ErrorEvent::MediaError(_) => "mediaError",
            ErrorEvent::Warning(_) => "warning",
            ErrorEvent::Error(_) => "error",
        }
    }

    pub fn payload(&self) -> &ErrorPayload {
        match self {
            ErrorEvent::MediaError(p) | ErrorEvent::Warning(p) | ErrorEvent::Error(p) => p,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to player events.
///
/// Cloning the bus is cheap; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PlayerEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns an error when nobody is subscribed; callers normally ignore it.
    pub fn emit(&self, event: PlayerEvent) -> Result<usize, SendError<PlayerEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&PlayerEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, PlayerEvent};
///
/// let bus = EventBus::default();
/// let ads_only = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, PlayerEvent::Ad(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<PlayerEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<PlayerEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&PlayerEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn matches(&self, event: &PlayerEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<PlayerEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    ///
    /// Returns `None` if no matching events are queued.
    pub fn try_recv(&mut self) -> Option<Result<PlayerEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    /// Drain every matching event queued so far.
    pub fn drain(&mut self) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        while let Some(result) = self.try_recv() {
            match result {
                Ok(event) => events.push(event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        events
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn play_event() -> PlayerEvent {
        PlayerEvent::Media(MediaEvent::Play {
            old_state: PlayerState::Buffering,
            reason: PlayReason::Interaction,
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(play_event()).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        bus.emit(play_event()).ok();

        assert_eq!(sub1.recv().await.unwrap(), play_event());
        assert_eq!(sub2.recv().await.unwrap(), play_event());
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, PlayerEvent::Ad(_)));

        bus.emit(play_event()).ok();
        bus.emit(PlayerEvent::Ad(AdEvent::AdBreakStart { ad_count: 2 }))
            .ok();

        assert_eq!(
            stream.recv().await.unwrap(),
            PlayerEvent::Ad(AdEvent::AdBreakStart { ad_count: 2 })
        );
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(PlayerEvent::Media(MediaEvent::BufferChange {
                buffer_percent: i as f64,
            }))
            .ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[tokio::test]
    async fn test_drain_skips_lag_markers() {
        let bus = EventBus::new(2);
        let mut stream = EventStream::new(bus.subscribe());
        for _ in 0..4 {
            bus.emit(PlayerEvent::Media(MediaEvent::Seeked)).ok();
        }
        assert_eq!(stream.drain().len(), 2);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(play_event().name(), "play");
        assert_eq!(
            PlayerEvent::Interface(InterfaceEvent::FullscreenChange { fullscreen: true }).name(),
            "fullscreenchange"
        );
        assert_eq!(
            PlayerEvent::Error(ErrorEvent::MediaError(ErrorPayload {
                code: 224003,
                message: String::new(),
                source_error: None,
            }))
            .name(),
            "mediaError"
        );
    }

    #[test]
    fn test_event_severity_and_state() {
        let fatal = PlayerEvent::Error(ErrorEvent::Error(ErrorPayload {
            code: 221000,
            message: "no source".to_string(),
            source_error: None,
        }));
        assert_eq!(fatal.severity(), EventSeverity::Error);
        assert_eq!(fatal.new_state(), Some(PlayerState::Error));
        assert_eq!(play_event().new_state(), Some(PlayerState::Playing));
        assert_eq!(
            PlayerEvent::Media(MediaEvent::Time {
                position: 1.0,
                duration: 2.0,
                current_time: 1.0
            })
            .severity(),
            EventSeverity::Debug
        );
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(play_event()).unwrap();
        assert_eq!(json["type"], "Media");
        assert_eq!(json["payload"]["event"], "play");
        assert_eq!(json["payload"]["reason"], "interaction");

        let back: PlayerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, play_event());
    }
}
