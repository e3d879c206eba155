//! # Media Controller
//!
//! Pairs one provider with one [`MediaModel`]: the unit of "one load attempt
//! of one item". Translates provider events into host events, owns the play
//! request lifecycle and the decode-error retry budget.
//!
//! ## Attachment
//!
//! - *attached*: native listeners installed, events flow.
//! - *background*: not mounted on the visible surface. A background
//!   controller still processes its events, but the program controller does
//!   not forward them.
//!
//! At most one controller per player is attached and not in background.
//!
//! ## Completion
//!
//! Completion is two-phase. When the element ends, `beforeComplete` is
//! published and the controller waits for the next checkpoint before moving
//! to `complete`. Backgrounding the controller in between (an ad break
//! taking over for a postroll) converts the pending completion into a
//! deferred one that is delivered when the controller is restored.

use crate::captions::{parse_captions, CaptionSynchronizer, FetchRequest};
use crate::config::PlayerConfig;
use crate::effects::{CaptionFetch, Deferred, Effects, PlayRequest, PlayTicket};
use crate::error::{ErrorCode, PlaybackError, PlayerError, Result};
use crate::generation::Generation;
use crate::model::{MediaModel, MediaState, PlaylistItem};
use crate::pool::{ElementPool, PooledElement};
use crate::provider::{Provider, ProviderEvent};
use bridge_traits::{Clock, NativeMediaError, PlayRejection};
use chrono::{DateTime, Utc};
use core_runtime::events::{
    ErrorEvent, MediaEvent, PauseReason, PlayReason, PlayerState, StreamType, TrackEvent,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a caption fetch produced no cues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptionFetchFailure {
    Fetch(String),
    Parse(String),
}

/// Diagnostic view of one controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerSnapshot {
    pub id: u64,
    pub item_index: usize,
    pub provider: &'static str,
    pub attached: bool,
    pub background: bool,
    pub state: PlayerState,
    pub media_state: MediaState,
    pub position: f64,
    pub decode_retries: u32,
}

pub struct MediaController {
    id: u64,
    provider: Box<dyn Provider>,
    lease: Option<PooledElement>,
    item: Arc<PlaylistItem>,
    item_index: usize,
    start_position: f64,
    model: MediaModel,
    captions: CaptionSynchronizer,
    caption_hint: Option<String>,
    play_generation: Generation,
    config: Arc<PlayerConfig>,
    clock: Arc<dyn Clock>,

    attached: bool,
    background: bool,
    before_complete: bool,
    complete_pending: bool,
    play_retried: bool,
    decode_retries: u32,
    before_play_sent: bool,
    first_frame_sent: bool,
    load_started_at: Option<DateTime<Utc>>,
}

impl MediaController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        provider: Box<dyn Provider>,
        lease: Option<PooledElement>,
        item: Arc<PlaylistItem>,
        item_index: usize,
        start_position: f64,
        config: Arc<PlayerConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut captions = CaptionSynchronizer::new();
        captions.set_sideloaded(&item.tracks);
        let model = MediaModel::new(item.duration);

        Self {
            id,
            provider,
            lease,
            item,
            item_index,
            start_position,
            model,
            captions,
            caption_hint: None,
            play_generation: Generation::new(),
            config,
            clock,
            attached: false,
            background: false,
            before_complete: false,
            complete_pending: false,
            play_retried: false,
            decode_retries: 0,
            before_play_sent: false,
            first_frame_sent: false,
            load_started_at: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn item(&self) -> &Arc<PlaylistItem> {
        &self.item
    }

    pub fn item_index(&self) -> usize {
        self.item_index
    }

    /// A promoted preload may serve a different index with the same source.
    pub(crate) fn set_item_index(&mut self, index: usize) {
        self.item_index = index;
    }

    pub fn model(&self) -> &MediaModel {
        &self.model
    }

    pub fn captions(&self) -> &CaptionSynchronizer {
        &self.captions
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.provider.resize(width, height);
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn is_background(&self) -> bool {
        self.background
    }

    /// Attached to the visible surface.
    pub fn is_active(&self) -> bool {
        self.attached && !self.background
    }

    pub fn is_setup(&self) -> bool {
        self.model.setup
    }

    pub fn before_complete(&self) -> bool {
        self.before_complete
    }

    pub fn decode_retries(&self) -> u32 {
        self.decode_retries
    }

    /// Raw element time.
    pub fn current_time(&self) -> f64 {
        self.provider.current_time()
    }

    pub fn stream_type(&self) -> StreamType {
        self.provider.stream_type()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            id: self.id,
            item_index: self.item_index,
            provider: self.provider.name(),
            attached: self.attached,
            background: self.background,
            state: self.model.reported_state,
            media_state: self.model.state,
            position: self.model.position,
            decode_retries: self.decode_retries,
        }
    }

    // ========================================================================
    // Attachment
    // ========================================================================

    /// Install listeners and mount unless backgrounded.
    pub fn attach(&mut self) {
        if !self.attached {
            self.provider.attach_media();
            self.attached = true;
        }
        self.provider.set_visibility(!self.background);
    }

    /// Unmount and remove listeners; the model is kept for a later `attach`.
    pub fn detach(&mut self) {
        self.provider.set_visibility(false);
        if self.attached {
            self.provider.detach_media();
            self.attached = false;
        }
    }

    pub fn set_background(&mut self, background: bool) {
        self.background = background;
        self.provider.set_visibility(self.attached && !background);
        if background && self.complete_pending {
            self.complete_pending = false;
            self.before_complete = true;
        }
    }

    /// Bring a backgrounded controller back to the foreground. Returns `true`
    /// when content had ended in the meantime and `complete` was published.
    pub fn restore(&mut self, fx: &mut Effects) -> bool {
        self.attach();
        self.set_background(false);
        if self.before_complete {
            self.before_complete = false;
            self.set_state(MediaState::Complete, fx);
            return true;
        }
        false
    }

    /// Publish the current track and caption state after activation.
    pub fn announce(&mut self, caption_hint: Option<String>, fx: &mut Effects) {
        self.caption_hint = caption_hint;

        if !self.model.levels.is_empty() {
            fx.tracks(TrackEvent::Levels {
                levels: self.model.levels.clone(),
                current: self.model.current_quality,
            });
        }
        if !self.model.audio_tracks.is_empty() {
            fx.tracks(TrackEvent::AudioTracks {
                tracks: self.model.audio_tracks.clone(),
                current: self.model.current_audio_track,
            });
        }

        let fetch = self
            .captions
            .rebuild(self.caption_hint.as_deref())
            .and_then(|update| update.fetch);
        fx.tracks(TrackEvent::SubtitlesTracks {
            tracks: self.captions.options().to_vec(),
            current: self.captions.current(),
        });
        self.provider
            .set_subtitles_track(self.captions.current_native_index());
        self.request_fetch(fetch, fx);

        if self.model.preloaded {
            fx.media(self.meta_event());
        }
    }

    fn meta_event(&self) -> MediaEvent {
        let (width, height) = self
            .model
            .visual_quality
            .as_ref()
            .map(|q| (q.width, q.height))
            .unwrap_or((0, 0));
        MediaEvent::Meta {
            duration: self.model.duration,
            stream_type: self.model.stream_type,
            width,
            height,
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Apply player-wide volume, mute and rate.
    pub fn apply_settings(&mut self, volume: u8, muted: bool, playback_rate: f64) {
        self.model.volume = volume;
        self.model.muted = muted;
        self.provider.set_volume(volume);
        self.provider.set_mute(muted);
        if self.provider.capabilities().supports_playback_rate {
            self.model.playback_rate = playback_rate;
            self.provider.set_playback_rate(playback_rate);
        }
    }

    /// Start loading without playing (background preload).
    pub fn preload(&mut self) {
        self.provider.preload(&self.item);
        self.model.setup = true;
        self.load_started_at = Some(self.clock.now());
    }

    fn ensure_loaded(&mut self) {
        if self.model.setup {
            return;
        }
        self.provider.load(&self.item, self.start_position);
        self.model.setup = true;
        self.load_started_at = Some(self.clock.now());
    }

    pub fn play(&mut self, reason: PlayReason, fx: &mut Effects) {
        self.model.play_reason = reason;
        self.model.pause_reason = None;

        if !self.before_play_sent {
            self.before_play_sent = true;
            fx.media(MediaEvent::BeforePlay {
                item_index: self.item_index,
                reason,
            });
        }

        if self.model.state == MediaState::Complete {
            self.provider.seek(0.0);
        }
        self.ensure_loaded();
        self.set_state(MediaState::AttemptingPlay, fx);
        self.request_play(reason, fx);
    }

    fn request_play(&mut self, reason: PlayReason, fx: &mut Effects) {
        let token = self.play_generation.advance();
        debug!(
            controller_id = self.id,
            generation = token.value(),
            ?reason,
            "Requesting native play"
        );
        fx.defer(Deferred::Play(PlayRequest {
            ticket: PlayTicket {
                controller_id: self.id,
                token,
            },
            reason,
            future: self.provider.play(),
        }));
    }

    pub fn pause(&mut self, reason: Option<PauseReason>, fx: &mut Effects) {
        self.play_generation.invalidate();
        self.provider.pause();
        self.model.pause_reason = reason;
        if !matches!(
            self.model.state,
            MediaState::Idle | MediaState::Complete | MediaState::Error
        ) {
            self.set_state(MediaState::Paused, fx);
        }
    }

    pub fn stop(&mut self, fx: &mut Effects) {
        self.play_generation.invalidate();
        self.provider.stop();
        self.model.setup = false;
        self.model.started = false;
        self.model.position = 0.0;
        self.start_position = self.item.starttime;
        self.complete_pending = false;
        self.before_complete = false;
        self.first_frame_sent = false;
        self.set_state(MediaState::Idle, fx);
    }

    /// Seek, loading first when nothing is loaded yet. Returns `true` when
    /// the seek had to load the item (the caller then starts playback).
    pub fn seek(&mut self, position: f64) -> bool {
        if !self.model.setup {
            self.start_position = position.max(0.0);
            return true;
        }
        self.provider.seek(position);
        false
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.model.volume = volume;
        self.provider.set_volume(volume);
    }

    pub fn set_mute(&mut self, muted: bool) {
        self.model.muted = muted;
        self.provider.set_mute(muted);
    }

    /// Apply a playback rate; live streams are pinned to 1. Returns the rate
    /// applied, or `None` when the provider has no rate control.
    pub fn set_playback_rate(&mut self, rate: f64) -> Option<f64> {
        if !self.provider.capabilities().supports_playback_rate {
            debug!(controller_id = self.id, rate, "Provider ignores playback rate");
            return None;
        }
        let rate = if self.provider.stream_type() == StreamType::Live {
            1.0
        } else {
            rate
        };
        self.provider.set_playback_rate(rate);
        self.model.playback_rate = rate;
        Some(rate)
    }

    /// Switch quality level; resumes playback after the reload if needed.
    /// Returns the label of the selected level.
    pub fn set_quality(&mut self, index: usize, fx: &mut Effects) -> Result<Option<String>> {
        let levels = self.provider.quality_levels();
        let Some(level) = levels.get(index) else {
            return Err(PlaybackError::InvalidArgument {
                field: "quality",
                reason: format!("index {} out of range ({} levels)", index, levels.len()),
            });
        };
        let label = level.label.clone();
        let was_playing = self.model.state.is_active_playback();
        if !self.provider.set_current_quality(index) {
            return Ok(None);
        }
        self.model.current_quality = index;
        info!(controller_id = self.id, level = index, label = %label, "Quality changed");
        if was_playing {
            self.request_play(self.model.play_reason, fx);
        }
        Ok(Some(label))
    }

    pub fn set_audio_track(&mut self, index: usize) -> Result<()> {
        if index >= self.model.audio_tracks.len() {
            return Err(PlaybackError::InvalidArgument {
                field: "audio_track",
                reason: format!(
                    "index {} out of range ({} tracks)",
                    index,
                    self.model.audio_tracks.len()
                ),
            });
        }
        self.provider.set_current_audio_track(index);
        Ok(())
    }

    /// Select captions entry `index`; returns the label to persist.
    pub fn select_captions(&mut self, index: usize, fx: &mut Effects) -> Result<String> {
        let selection = self.captions.select(index)?;
        self.provider
            .set_subtitles_track(self.captions.current_native_index());
        if selection.changed {
            fx.tracks(TrackEvent::SubtitlesTrackChanged {
                current: selection.current,
                label: selection.label.clone(),
            });
            self.refresh_cues(fx);
        }
        self.request_fetch(selection.fetch, fx);
        Ok(selection.label)
    }

    fn request_fetch(&self, fetch: Option<FetchRequest>, fx: &mut Effects) {
        if let Some(request) = fetch {
            debug!(controller_id = self.id, track_id = %request.track_id, "Fetching captions");
            fx.defer(Deferred::Fetch(CaptionFetch {
                controller_id: self.id,
                request,
            }));
        }
    }

    /// Handle the outcome of a sideloaded caption fetch.
    pub fn finish_caption_fetch(
        &mut self,
        track_id: &str,
        result: std::result::Result<String, CaptionFetchFailure>,
        fx: &mut Effects,
    ) {
        let failure = match result {
            Ok(text) => match parse_captions(&text) {
                Ok(cues) => {
                    self.captions.apply_fetched(track_id, cues);
                    self.refresh_cues(fx);
                    return;
                }
                Err(e) => CaptionFetchFailure::Parse(e.to_string()),
            },
            Err(failure) => failure,
        };

        let (code, reason) = match failure {
            CaptionFetchFailure::Fetch(reason) => (ErrorCode::CAPTION_FETCH_FAILED, reason),
            CaptionFetchFailure::Parse(reason) => (ErrorCode::CAPTION_PARSE_FAILED, reason),
        };
        warn!(track_id, code = code.value(), reason = %reason, "Dropping caption track");
        fx.error(ErrorEvent::Warning(
            PlayerError::new(code)
                .with_source(reason)
                .to_payload(&self.config.localization),
        ));

        let was_current = self.captions.current();
        if self.captions.drop_track(track_id) {
            if let Some(update) = self.captions.rebuild(self.caption_hint.as_deref()) {
                fx.tracks(TrackEvent::SubtitlesTracks {
                    tracks: update.tracks,
                    current: update.current,
                });
            }
            if self.captions.current() != was_current {
                fx.tracks(TrackEvent::SubtitlesTrackChanged {
                    current: self.captions.current(),
                    label: self.captions.current_label().to_string(),
                });
            }
            self.refresh_cues(fx);
        }
    }

    fn refresh_cues(&mut self, fx: &mut Effects) {
        if let Some(cues) = self.captions.update_cues(self.provider.current_time()) {
            fx.tracks(TrackEvent::ActiveCues { cues });
        }
    }

    // ========================================================================
    // Play results
    // ========================================================================

    /// Apply the settled result of a play request whose token is current.
    pub fn finish_play(
        &mut self,
        reason: PlayReason,
        result: std::result::Result<(), PlayRejection>,
        fx: &mut Effects,
    ) {
        match result {
            Ok(()) => {
                self.play_retried = false;
                self.model.started = true;
                self.set_state(MediaState::Playing, fx);
            }
            Err(PlayRejection::Abort) => {
                debug!(controller_id = self.id, "Play aborted by a newer request");
            }
            Err(PlayRejection::NotAllowed) => {
                if !self.play_retried && self.provider.is_paused() && self.at_intended_source() {
                    self.play_retried = true;
                    debug!(controller_id = self.id, "Play refused, retrying after reload");
                    self.provider.load(&self.item, self.provider.current_time());
                    self.request_play(reason, fx);
                    return;
                }
                self.play_retried = false;
                warn!(controller_id = self.id, ?reason, "Play attempt refused");
                fx.media(MediaEvent::PlayAttemptFailed {
                    item_index: self.item_index,
                    play_reason: reason,
                    code: ErrorCode::PLAY_NOT_ALLOWED.value(),
                    reason: PlayRejection::NotAllowed.dom_name().to_string(),
                });
                if reason == PlayReason::Autostart {
                    fx.media(MediaEvent::AutostartNotAllowed {
                        code: ErrorCode::PLAY_NOT_ALLOWED.value(),
                    });
                }
                self.model.pause_reason = None;
                self.set_state(MediaState::Paused, fx);
            }
            Err(PlayRejection::NotSupported) => {
                fx.media(MediaEvent::PlayAttemptFailed {
                    item_index: self.item_index,
                    play_reason: reason,
                    code: ErrorCode::PLAY_NOT_SUPPORTED.value(),
                    reason: PlayRejection::NotSupported.dom_name().to_string(),
                });
                self.fatal(
                    PlayerError::new(ErrorCode::media_element(
                        bridge_traits::media::MEDIA_ERR_SRC_NOT_SUPPORTED,
                    ))
                    .with_source(PlayRejection::NotSupported.dom_name()),
                    fx,
                );
            }
        }
    }

    fn at_intended_source(&self) -> bool {
        let intended = self
            .item
            .sources
            .get(self.model.current_quality)
            .map(|s| s.file.as_str());
        self.provider.source_url().as_deref() == intended
    }

    // ========================================================================
    // Provider events
    // ========================================================================

    /// Pull and translate queued provider events.
    pub fn process_events(&mut self, fx: &mut Effects) {
        let mut events = Vec::new();
        self.provider.poll_events(&mut events);
        for event in events {
            self.handle_event(event, fx);
        }
    }

    /// Polling tick: stall detection and cue recomputation.
    pub fn tick(&mut self, fx: &mut Effects) {
        let mut events = Vec::new();
        self.provider.tick(&mut events);
        for event in events {
            self.handle_event(event, fx);
        }
        self.refresh_cues(fx);
    }

    /// Publish a pending `complete` if still in the foreground.
    pub fn flush_pending_complete(&mut self, fx: &mut Effects) -> bool {
        if !self.complete_pending || self.background {
            return false;
        }
        self.complete_pending = false;
        self.set_state(MediaState::Complete, fx);
        true
    }

    fn handle_event(&mut self, event: ProviderEvent, fx: &mut Effects) {
        match event {
            ProviderEvent::Loading => {}
            ProviderEvent::Meta {
                duration,
                stream_type,
                width,
                height,
            } => {
                self.model.duration = duration;
                self.model.stream_type = stream_type;
                self.model.preloaded = true;
                if stream_type == StreamType::Live && self.model.playback_rate != 1.0 {
                    self.provider.set_playback_rate(1.0);
                    self.model.playback_rate = 1.0;
                    fx.media(MediaEvent::PlaybackRateChanged { playback_rate: 1.0 });
                }
                fx.media(MediaEvent::Meta {
                    duration,
                    stream_type,
                    width,
                    height,
                });
            }
            ProviderEvent::Buffering => {
                // Only `playing` leaves a stall.
                if self.model.state.is_active_playback() && self.model.state != MediaState::Stalled
                {
                    self.set_state(MediaState::Buffering, fx);
                }
            }
            ProviderEvent::Playing => {
                if self.model.setup {
                    self.model.started = true;
                    self.set_state(MediaState::Playing, fx);
                }
            }
            ProviderEvent::Paused => {
                if self.model.state.is_active_playback() {
                    self.model.pause_reason = None;
                    self.set_state(MediaState::Paused, fx);
                }
            }
            ProviderEvent::Stalled => {
                if self.model.state == MediaState::Playing {
                    self.set_state(MediaState::Stalled, fx);
                }
            }
            ProviderEvent::Time {
                position,
                duration,
                current_time,
            } => {
                self.model.position = position;
                self.model.duration = duration;
                self.model.current_time = current_time;
                if self.model.state == MediaState::Playing && !self.first_frame_sent {
                    self.first_frame_sent = true;
                    let load_time_ms = self
                        .load_started_at
                        .map(|at| self.clock.millis_since(at))
                        .unwrap_or(0);
                    fx.media(MediaEvent::FirstFrame { load_time_ms });
                }
                fx.media(MediaEvent::Time {
                    position,
                    duration,
                    current_time,
                });
                self.refresh_cues(fx);
            }
            ProviderEvent::BufferChange { buffer_percent } => {
                self.model.buffer_percent = buffer_percent;
                fx.media(MediaEvent::BufferChange { buffer_percent });
            }
            ProviderEvent::Seek { position, offset } => {
                fx.media(MediaEvent::Seek { position, offset });
            }
            ProviderEvent::Seeked => {
                fx.media(MediaEvent::Seeked);
                self.refresh_cues(fx);
            }
            ProviderEvent::Complete => self.on_complete(fx),
            ProviderEvent::Levels { levels, current } => {
                self.model.levels = levels.clone();
                self.model.current_quality = current;
                fx.tracks(TrackEvent::Levels { levels, current });
            }
            ProviderEvent::LevelsChanged { current } => {
                self.model.current_quality = current;
                fx.tracks(TrackEvent::LevelsChanged { current });
            }
            ProviderEvent::VisualQuality(quality) => {
                self.model.visual_quality = Some(quality.clone());
                fx.tracks(TrackEvent::VisualQuality(quality));
            }
            ProviderEvent::AudioTracks { tracks, current } => {
                self.model.audio_tracks = tracks.clone();
                self.model.current_audio_track = current;
                fx.tracks(TrackEvent::AudioTracks { tracks, current });
            }
            ProviderEvent::AudioTrackChanged { current } => {
                self.model.current_audio_track = current;
                fx.tracks(TrackEvent::AudioTrackChanged { current });
            }
            ProviderEvent::SubtitleTracks(native) => {
                self.captions.update_native(&native);
                if let Some(update) = self.captions.rebuild(self.caption_hint.as_deref()) {
                    fx.tracks(TrackEvent::SubtitlesTracks {
                        tracks: update.tracks,
                        current: update.current,
                    });
                    self.request_fetch(update.fetch, fx);
                }
                self.provider
                    .set_subtitles_track(self.captions.current_native_index());
                self.refresh_cues(fx);
            }
            ProviderEvent::Volume { volume } => {
                if self.model.volume != volume {
                    self.model.volume = volume;
                    fx.media(MediaEvent::Volume { volume });
                }
            }
            ProviderEvent::Mute { muted } => {
                if self.model.muted != muted {
                    self.model.muted = muted;
                    fx.media(MediaEvent::Mute { mute: muted });
                }
            }
            ProviderEvent::RateChange { playback_rate } => {
                if self.model.playback_rate != playback_rate {
                    self.model.playback_rate = playback_rate;
                    fx.media(MediaEvent::PlaybackRateChanged { playback_rate });
                }
            }
            ProviderEvent::MediaError(error) => self.on_media_error(error, fx),
        }
    }

    fn on_complete(&mut self, fx: &mut Effects) {
        if self.model.state == MediaState::Complete || self.complete_pending || self.before_complete
        {
            return;
        }
        self.play_generation.invalidate();
        if self.background {
            self.before_complete = true;
            return;
        }
        fx.media(MediaEvent::BeforeComplete);
        self.complete_pending = true;
    }

    fn on_media_error(&mut self, error: NativeMediaError, fx: &mut Effects) {
        let code = ErrorCode::media_element(error.code);
        let record = PlayerError::new(code).with_source(error.message.clone());
        fx.error(ErrorEvent::MediaError(
            record.to_payload(&self.config.localization),
        ));

        if error.is_decode_failure() && self.decode_retries < self.config.decode_retry_limit {
            self.decode_retries += 1;
            let position = self.provider.current_time();
            warn!(
                controller_id = self.id,
                code = code.value(),
                attempt = self.decode_retries,
                position,
                "Decode error, reloading"
            );
            fx.error(ErrorEvent::Warning(
                record.to_payload(&self.config.localization),
            ));

            let was_playing = self.model.state.is_active_playback();
            self.provider.load(&self.item, position);
            if was_playing {
                self.request_play(self.model.play_reason, fx);
            }
            return;
        }

        self.fatal(record, fx);
    }

    fn fatal(&mut self, error: PlayerError, fx: &mut Effects) {
        warn!(
            controller_id = self.id,
            code = error.code.value(),
            "Fatal media error"
        );
        self.play_generation.invalidate();
        fx.error(ErrorEvent::Error(error.to_payload(&self.config.localization)));
        self.model.error = Some(error);
        self.model.state = MediaState::Error;
        self.model.reported_state = PlayerState::Error;
    }

    /// Move to `state`, publishing the host state event when the reported
    /// state changes.
    fn set_state(&mut self, state: MediaState, fx: &mut Effects) {
        let old_state = self.model.reported_state;
        self.model.state = state;
        let reported = state.player_state();
        if reported == old_state {
            return;
        }
        self.model.reported_state = reported;
        if reported != PlayerState::Error {
            self.model.error = None;
        }

        let event = match reported {
            PlayerState::Playing => MediaEvent::Play {
                old_state,
                reason: self.model.play_reason,
            },
            PlayerState::Paused => MediaEvent::Pause {
                old_state,
                reason: self.model.pause_reason,
            },
            PlayerState::Buffering => MediaEvent::Buffer { old_state },
            PlayerState::Idle => MediaEvent::Idle { old_state },
            PlayerState::Complete => MediaEvent::Complete,
            PlayerState::Error => return,
        };
        debug!(controller_id = self.id, from = %old_state, to = %reported, "State change");
        fx.media(event);
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Stop the provider and return the element to the pool.
    pub fn destroy(mut self, pool: &mut ElementPool) {
        self.play_generation.invalidate();
        self.provider.destroy();
        if let Some(lease) = self.lease.take() {
            pool.checkin(lease);
        }
        debug!(controller_id = self.id, item_index = self.item_index, "Controller destroyed");
    }
}
