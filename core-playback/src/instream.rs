//! # Instream Controller
//!
//! Runs an ad break over the active content. On entry the content controller
//! is paused, backgrounded and detached (never destroyed), and an ad provider
//! takes over the surface. Content events stop flowing until the break ends.
//! On exit the content controller is re-attached and either resumes from the
//! position it had, or publishes a `complete` it deferred while the ad was
//! on screen.

use crate::config::PlayerConfig;
use crate::effects::{Deferred, Effects, PlayRequest, PlayTicket};
use crate::error::{ErrorCode, PlaybackError, PlayerError, Result};
use crate::generation::Generation;
use crate::media_controller::MediaController;
use crate::model::PlaylistItem;
use crate::pool::{ElementPool, PooledElement};
use crate::provider::{Html5Provider, Provider, ProviderContext, ProviderEvent};
use bridge_traits::{CapabilityTag, PlayRejection};
use core_runtime::events::{AdEvent, PauseReason, PlayReason};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Content drift (seconds) tolerated before the content is seeked back.
const RESUME_DRIFT_TOLERANCE: f64 = 0.5;

/// What to play during a break.
pub enum AdBreak {
    /// Ad media played on a pooled element, one after another.
    Items(Vec<PlaylistItem>),
    /// Pseudo-provider driven by an external ad engine. It reports one
    /// `Complete` per ad.
    External {
        provider: Box<dyn Provider>,
        ad_count: usize,
    },
}

impl std::fmt::Debug for AdBreak {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdBreak::Items(items) => write!(f, "Items({})", items.len()),
            AdBreak::External { provider, ad_count } => {
                write!(f, "External({}, {})", provider.name(), ad_count)
            }
        }
    }
}

/// Whether the break continues after an ad event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstreamStep {
    Continue,
    End,
}

/// How the content was left when the break ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdBreakOutcome {
    /// Content had reached its end before or during the break.
    pub completed: bool,
    /// Reason to resume content playback with, if it should resume.
    pub resume: Option<PlayReason>,
}

pub struct InstreamController {
    id: u64,
    ads: Vec<PlaylistItem>,
    ad_index: usize,
    ad_count: usize,
    provider: Box<dyn Provider>,
    lease: Option<PooledElement>,
    generation: Generation,
    saved_position: f64,
    content_was_playing: bool,
    content_play_reason: PlayReason,
    no_resume: bool,
    skipped: bool,
    skip_offset: Option<f64>,
    ad_position: f64,
    playing: bool,
    config: Arc<PlayerConfig>,
}

impl InstreamController {
    /// Take over the surface from `content` and start the first ad.
    ///
    /// Returns `Ok(None)` when no element could be set aside for the break;
    /// `adError` has then been published and the content is untouched.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn start(
        id: u64,
        ad_break: AdBreak,
        content: &mut MediaController,
        pool: &mut ElementPool,
        settings: (u8, bool),
        config: Arc<PlayerConfig>,
        fx: &mut Effects,
    ) -> Result<Option<Self>> {
        let (ads, ad_count, mut provider, lease) = match ad_break {
            AdBreak::Items(items) => {
                if items.is_empty() {
                    return Err(PlaybackError::InvalidArgument {
                        field: "ad_break",
                        reason: "no ads".to_string(),
                    });
                }
                let lease = match pool.checkout(&CapabilityTag::AD) {
                    Ok(lease) => lease,
                    Err(e) => {
                        warn!(error = %e, "Ad break setup failed");
                        fx.ad(AdEvent::AdError {
                            code: ErrorCode::AD_BREAK_SETUP_FAILED.value(),
                            message: PlayerError::new(ErrorCode::AD_BREAK_SETUP_FAILED)
                                .localized_message(&config.localization),
                        });
                        return Ok(None);
                    }
                };
                let provider: Box<dyn Provider> = Box::new(Html5Provider::new(
                    Arc::clone(lease.element()),
                    ProviderContext {
                        dvr_window: config.dvr_window,
                        quality_label: None,
                    },
                ));
                let count = items.len();
                (items, count, provider, Some(lease))
            }
            AdBreak::External { provider, ad_count } => (Vec::new(), ad_count.max(1), provider, None),
        };

        let content_was_playing = content.model().state.is_active_playback();
        let content_play_reason = content.model().play_reason;
        let saved_position = content.current_time();

        content.set_background(true);
        if !content.before_complete() {
            content.pause(Some(PauseReason::Ad), fx);
        }
        content.detach();

        provider.attach_media();
        provider.set_visibility(true);
        provider.set_volume(settings.0);
        provider.set_mute(settings.1);

        info!(
            ad_break_id = id,
            ad_count,
            saved_position,
            content_was_playing,
            "Ad break started"
        );
        fx.ad(AdEvent::AdBreakStart { ad_count });

        let skip_offset = content.item().skip_offset;
        let mut controller = Self {
            id,
            ads,
            ad_index: 0,
            ad_count,
            provider,
            lease,
            generation: Generation::new(),
            saved_position,
            content_was_playing,
            content_play_reason,
            no_resume: false,
            skipped: false,
            skip_offset,
            ad_position: 0.0,
            playing: false,
            config,
        };
        controller.load_current();
        controller.request_play(fx);
        Ok(Some(controller))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn ad_index(&self) -> usize {
        self.ad_index
    }

    pub fn ad_count(&self) -> usize {
        self.ad_count
    }

    pub fn saved_position(&self) -> f64 {
        self.saved_position
    }

    /// Do not resume content when the break ends.
    pub fn set_no_resume(&mut self, no_resume: bool) {
        self.no_resume = no_resume;
    }

    fn load_current(&mut self) {
        if let Some(ad) = self.ads.get(self.ad_index) {
            if let Some(offset) = ad.skip_offset {
                self.skip_offset = Some(offset);
            }
            self.provider.load(ad, 0.0);
        }
    }

    fn request_play(&mut self, fx: &mut Effects) {
        let token = self.generation.advance();
        fx.defer(Deferred::Play(PlayRequest {
            ticket: PlayTicket {
                controller_id: self.id,
                token,
            },
            reason: PlayReason::Interaction,
            future: self.provider.play(),
        }));
    }

    // ========================================================================
    // Commands
    // ========================================================================

    pub fn set_volume(&mut self, volume: u8) {
        self.provider.set_volume(volume);
    }

    pub fn set_mute(&mut self, muted: bool) {
        self.provider.set_mute(muted);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.provider.resize(width, height);
    }

    pub(crate) fn pause(&mut self, fx: &mut Effects) {
        self.generation.invalidate();
        self.provider.pause();
        if self.playing {
            self.playing = false;
            fx.ad(AdEvent::AdPause {
                ad_index: self.ad_index,
            });
        }
    }

    pub(crate) fn play(&mut self, fx: &mut Effects) {
        if !self.playing {
            self.request_play(fx);
        }
    }

    /// Skip the current ad. Further calls are ignored until the next ad
    /// starts playing.
    pub(crate) fn skip(&mut self, fx: &mut Effects) -> Result<InstreamStep> {
        if self.skipped {
            return Ok(InstreamStep::Continue);
        }
        if let Some(offset) = self.skip_offset {
            if self.ad_position < offset {
                return Err(PlaybackError::InvalidArgument {
                    field: "skip_offset",
                    reason: format!(
                        "ad skippable after {:.1}s, at {:.1}s",
                        offset, self.ad_position
                    ),
                });
            }
        }
        self.skipped = true;
        debug!(ad_index = self.ad_index, "Ad skipped");
        fx.ad(AdEvent::AdSkipped {
            ad_index: self.ad_index,
        });
        Ok(self.advance(fx))
    }

    // ========================================================================
    // Ad events
    // ========================================================================

    pub(crate) fn process_events(&mut self, fx: &mut Effects) -> InstreamStep {
        let mut events = Vec::new();
        self.provider.poll_events(&mut events);
        self.handle_events(events, fx)
    }

    pub(crate) fn tick(&mut self, fx: &mut Effects) -> InstreamStep {
        let mut events = Vec::new();
        self.provider.tick(&mut events);
        self.handle_events(events, fx)
    }

    fn handle_events(&mut self, events: Vec<ProviderEvent>, fx: &mut Effects) -> InstreamStep {
        for event in events {
            if self.handle_event(event, fx) == InstreamStep::End {
                return InstreamStep::End;
            }
        }
        InstreamStep::Continue
    }

    fn handle_event(&mut self, event: ProviderEvent, fx: &mut Effects) -> InstreamStep {
        match event {
            ProviderEvent::Playing => self.mark_playing(fx),
            ProviderEvent::Paused => {
                if self.playing {
                    self.playing = false;
                    fx.ad(AdEvent::AdPause {
                        ad_index: self.ad_index,
                    });
                }
            }
            ProviderEvent::Time {
                position, duration, ..
            } => {
                self.ad_position = position;
                fx.ad(AdEvent::AdTime {
                    ad_index: self.ad_index,
                    position,
                    duration,
                });
            }
            ProviderEvent::Complete => {
                fx.ad(AdEvent::AdComplete {
                    ad_index: self.ad_index,
                });
                return self.advance(fx);
            }
            ProviderEvent::MediaError(error) => {
                return self.fail(error.message, fx);
            }
            ProviderEvent::Loading
            | ProviderEvent::Meta { .. }
            | ProviderEvent::Buffering
            | ProviderEvent::Stalled
            | ProviderEvent::BufferChange { .. }
            | ProviderEvent::Seek { .. }
            | ProviderEvent::Seeked
            | ProviderEvent::Levels { .. }
            | ProviderEvent::LevelsChanged { .. }
            | ProviderEvent::VisualQuality(_)
            | ProviderEvent::AudioTracks { .. }
            | ProviderEvent::AudioTrackChanged { .. }
            | ProviderEvent::SubtitleTracks(_)
            | ProviderEvent::Volume { .. }
            | ProviderEvent::Mute { .. }
            | ProviderEvent::RateChange { .. } => {}
        }
        InstreamStep::Continue
    }

    fn mark_playing(&mut self, fx: &mut Effects) {
        if !self.playing {
            self.playing = true;
            self.skipped = false;
            fx.ad(AdEvent::AdPlay {
                ad_index: self.ad_index,
            });
        }
    }

    /// Apply the settled result of an ad play request whose token is current.
    pub(crate) fn finish_play(
        &mut self,
        result: std::result::Result<(), PlayRejection>,
        fx: &mut Effects,
    ) -> InstreamStep {
        match result {
            Ok(()) => {
                self.mark_playing(fx);
                InstreamStep::Continue
            }
            Err(PlayRejection::Abort) => InstreamStep::Continue,
            Err(rejection) => self.fail(rejection.dom_name().to_string(), fx),
        }
    }

    fn fail(&mut self, reason: String, fx: &mut Effects) -> InstreamStep {
        warn!(ad_index = self.ad_index, reason = %reason, "Ad playback failed");
        fx.ad(AdEvent::AdError {
            code: ErrorCode::AD_PROVIDER_ERROR.value(),
            message: PlayerError::new(ErrorCode::AD_PROVIDER_ERROR)
                .with_source(reason)
                .localized_message(&self.config.localization),
        });
        InstreamStep::End
    }

    fn advance(&mut self, fx: &mut Effects) -> InstreamStep {
        if self.ad_index + 1 >= self.ad_count {
            return InstreamStep::End;
        }
        self.ad_index += 1;
        self.playing = false;
        self.ad_position = 0.0;
        if !self.ads.is_empty() {
            self.generation.invalidate();
            self.load_current();
            self.request_play(fx);
        }
        InstreamStep::Continue
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Tear the break down and hand the surface back to `content`.
    pub(crate) fn end(
        mut self,
        content: Option<&mut MediaController>,
        pool: &mut ElementPool,
        fx: &mut Effects,
    ) -> AdBreakOutcome {
        self.release(pool);
        fx.ad(AdEvent::AdBreakEnd);

        let Some(content) = content else {
            return AdBreakOutcome {
                completed: false,
                resume: None,
            };
        };

        let completed = content.restore(fx);
        if !completed && (content.current_time() - self.saved_position).abs() > RESUME_DRIFT_TOLERANCE {
            content.seek(self.saved_position);
        }

        let resume = (self.content_was_playing && !self.no_resume && !completed)
            .then_some(self.content_play_reason);
        info!(
            ad_break_id = self.id,
            completed,
            resume = resume.is_some(),
            position = self.saved_position,
            "Ad break ended"
        );
        AdBreakOutcome { completed, resume }
    }

    /// Destroy the ad provider and return its element without touching content.
    pub(crate) fn release(&mut self, pool: &mut ElementPool) {
        self.generation.invalidate();
        self.provider.destroy();
        if let Some(lease) = self.lease.take() {
            pool.checkin(lease);
        }
    }
}
