//! Per-load playback state.
//!
//! A [`MediaModel`] belongs to exactly one load attempt of one item on one
//! provider. It is created with its `MediaController` and dropped with it; a
//! new activation always starts from a fresh model.

use crate::error::PlayerError;
use bridge_traits::TimeRange;
use core_runtime::events::{
    AudioTrackInfo, PauseReason, PlayReason, PlayerState, QualityLevel, StreamType, VisualQuality,
};
use serde::Serialize;

/// Fine-grained state of one load attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaState {
    Idle,
    /// `play()` issued, waiting for the element to start.
    AttemptingPlay,
    Buffering,
    Playing,
    Paused,
    /// Position stopped advancing while playing; left only on `playing`.
    Stalled,
    Complete,
    Error,
}

impl MediaState {
    /// Host-visible state this media state is reported as.
    pub fn player_state(&self) -> PlayerState {
        match self {
            MediaState::Idle => PlayerState::Idle,
            MediaState::AttemptingPlay
            | MediaState::Buffering
            | MediaState::Stalled => PlayerState::Buffering,
            MediaState::Playing => PlayerState::Playing,
            MediaState::Paused => PlayerState::Paused,
            MediaState::Complete => PlayerState::Complete,
            MediaState::Error => PlayerState::Error,
        }
    }

    /// Whether content is playing or trying to.
    pub fn is_active_playback(&self) -> bool {
        matches!(
            self,
            MediaState::AttemptingPlay
                | MediaState::Buffering
                | MediaState::Playing
                | MediaState::Stalled
        )
    }
}

#[derive(Debug, Clone)]
pub struct MediaModel {
    pub state: MediaState,
    /// Host-visible state last announced for this load.
    pub reported_state: PlayerState,
    pub play_reason: PlayReason,
    pub pause_reason: Option<PauseReason>,

    /// Timeline position; negative offset from the live edge on DVR streams.
    pub position: f64,
    pub duration: f64,
    /// Raw element time.
    pub current_time: f64,
    pub buffer_percent: f64,
    pub seek_range: Option<TimeRange>,
    pub stream_type: StreamType,

    pub levels: Vec<QualityLevel>,
    pub current_quality: usize,
    pub visual_quality: Option<VisualQuality>,
    pub audio_tracks: Vec<AudioTrackInfo>,
    pub current_audio_track: usize,

    pub volume: u8,
    pub muted: bool,
    pub playback_rate: f64,

    /// Source has been handed to the provider.
    pub setup: bool,
    /// Playback has started at least once.
    pub started: bool,
    /// Metadata arrived; the item can start without another load.
    pub preloaded: bool,
    pub error: Option<PlayerError>,
}

impl MediaModel {
    pub fn new(duration_hint: Option<f64>) -> Self {
        Self {
            state: MediaState::Idle,
            reported_state: PlayerState::Idle,
            play_reason: PlayReason::External,
            pause_reason: None,
            position: 0.0,
            duration: duration_hint.unwrap_or(0.0),
            current_time: 0.0,
            buffer_percent: 0.0,
            seek_range: None,
            stream_type: StreamType::Vod,
            levels: Vec::new(),
            current_quality: 0,
            visual_quality: None,
            audio_tracks: Vec::new(),
            current_audio_track: 0,
            volume: 100,
            muted: false,
            playback_rate: 1.0,
            setup: false,
            started: false,
            preloaded: false,
            error: None,
        }
    }
}

impl Default for MediaModel {
    fn default() -> Self {
        Self::new(None)
    }
}
