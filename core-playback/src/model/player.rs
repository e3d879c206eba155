//! Per-instance player aggregate.
//!
//! [`PlayerModel`] is the host-visible state of one player. It is updated
//! only by observing the events the player publishes, so the model and the
//! event stream can never disagree.

use crate::error::PlayerError;
use crate::model::item::PlaylistItem;
use core_runtime::events::{
    AdEvent, CaptionOption, ErrorEvent, InterfaceEvent, MediaEvent, PlayerEvent, PlayerState,
    PlaylistEvent, QualityLevel, TrackEvent,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Custom button in the control bar dock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockButton {
    pub id: String,
    pub label: String,
    pub tooltip: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerModel {
    #[serde(skip)]
    pub playlist: Vec<Arc<PlaylistItem>>,
    pub item_index: usize,
    pub state: PlayerState,

    pub volume: u8,
    pub mute: bool,
    pub playback_rate: f64,

    pub fullscreen: bool,
    pub viewable: bool,
    pub controls: bool,
    pub buttons: Vec<DockButton>,

    pub levels: Vec<QualityLevel>,
    pub current_quality: usize,
    /// Label of the last explicitly selected quality level.
    pub quality_label: Option<String>,

    pub captions_list: Vec<CaptionOption>,
    pub current_captions: usize,
    /// Label of the last explicitly selected caption track.
    pub caption_label: Option<String>,

    pub in_ad_break: bool,
    pub casting: bool,
    pub error: Option<PlayerError>,
    /// Last error payload code, kept for hosts that only read the model.
    pub error_code: Option<u32>,
}

impl PlayerModel {
    pub fn new(volume: u8, mute: bool, playback_rate: f64) -> Self {
        Self {
            playlist: Vec::new(),
            item_index: 0,
            state: PlayerState::Idle,
            volume,
            mute,
            playback_rate,
            fullscreen: false,
            viewable: true,
            controls: true,
            buttons: Vec::new(),
            levels: Vec::new(),
            current_quality: 0,
            quality_label: None,
            captions_list: Vec::new(),
            current_captions: 0,
            caption_label: None,
            in_ad_break: false,
            casting: false,
            error: None,
            error_code: None,
        }
    }

    pub fn item(&self, index: usize) -> Option<&Arc<PlaylistItem>> {
        self.playlist.get(index)
    }

    pub fn current_item(&self) -> Option<&Arc<PlaylistItem>> {
        self.playlist.get(self.item_index)
    }

    /// Fold a published event into the model.
    pub fn observe(&mut self, event: &PlayerEvent) {
        if let Some(state) = event.new_state() {
            self.state = state;
            if state != PlayerState::Error {
                self.error_code = None;
            }
        }

        match event {
            PlayerEvent::Media(MediaEvent::Volume { volume }) => self.volume = *volume,
            PlayerEvent::Media(MediaEvent::Mute { mute }) => self.mute = *mute,
            PlayerEvent::Media(MediaEvent::PlaybackRateChanged { playback_rate }) => {
                self.playback_rate = *playback_rate
            }
            PlayerEvent::Tracks(TrackEvent::Levels { levels, current }) => {
                self.levels = levels.clone();
                self.current_quality = *current;
            }
            PlayerEvent::Tracks(TrackEvent::LevelsChanged { current }) => {
                self.current_quality = *current;
            }
            PlayerEvent::Tracks(TrackEvent::SubtitlesTracks { tracks, current }) => {
                self.captions_list = tracks.clone();
                self.current_captions = *current;
            }
            PlayerEvent::Tracks(TrackEvent::SubtitlesTrackChanged { current, .. }) => {
                self.current_captions = *current;
            }
            PlayerEvent::Playlist(PlaylistEvent::PlaylistItem { index, .. }) => {
                self.item_index = *index;
            }
            PlayerEvent::Playlist(PlaylistEvent::CastStarted { .. }) => self.casting = true,
            PlayerEvent::Playlist(PlaylistEvent::CastStopped) => self.casting = false,
            PlayerEvent::Interface(InterfaceEvent::FullscreenChange { fullscreen }) => {
                self.fullscreen = *fullscreen
            }
            PlayerEvent::Interface(InterfaceEvent::Viewable { viewable }) => {
                self.viewable = *viewable
            }
            PlayerEvent::Interface(InterfaceEvent::Controls { controls }) => {
                self.controls = *controls
            }
            PlayerEvent::Ad(AdEvent::AdBreakStart { .. }) => {
                self.in_ad_break = true
            }
            PlayerEvent::Ad(AdEvent::AdBreakEnd) => {
                self.in_ad_break = false
            }
            PlayerEvent::Error(ErrorEvent::Error(payload)) => {
                self.error_code = Some(payload.code);
            }
            _ => {}
        }
    }

    /// Record an explicit caption choice as the default hint for later items.
    pub fn persist_caption_label(&mut self, label: &str) {
        self.caption_label = Some(label.to_string());
    }

    /// Record an explicit quality choice as the default hint for later items.
    pub fn persist_quality_label(&mut self, label: &str) {
        self.quality_label = Some(label.to_string());
    }

    /// Add or replace a dock button. Returns `true` when the list changed.
    pub fn add_button(&mut self, button: DockButton) -> bool {
        if let Some(existing) = self.buttons.iter_mut().find(|b| b.id == button.id) {
            if *existing == button {
                return false;
            }
            *existing = button;
            return true;
        }
        self.buttons.push(button);
        true
    }

    pub fn remove_button(&mut self, id: &str) -> bool {
        let before = self.buttons.len();
        self.buttons.retain(|b| b.id != id);
        self.buttons.len() != before
    }

    pub fn button_ids(&self) -> Vec<String> {
        self.buttons.iter().map(|b| b.id.clone()).collect()
    }
}
