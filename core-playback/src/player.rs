//! # Player
//!
//! Host-facing facade. One `Player` is one embeddable player instance: it
//! owns the playlist, the program and instream controllers, the autoplay
//! negotiator and the element pool, and publishes every state change on an
//! [`EventBus`].
//!
//! ## Locking
//!
//! All state lives in a `parking_lot::Mutex<PlayerCore>`. Commands run under
//! the lock and never await; native work that cannot finish synchronously
//! (provider construction, `play()`, autoplay probes, caption fetches) is
//! queued as deferred work. The issuing command then drives the queue: the
//! futures are awaited concurrently with the lock released, and each result
//! is applied under the lock only if the generation token captured when it
//! was issued is still current. One future that never settles does not hold
//! back the others. Overlapping commands (for example two `set_active_item` calls
//! joined on one task) therefore settle in any order without a stale result
//! ever changing state.
//!
//! ## Checkpoints
//!
//! Native events are queued by the element and only processed when the host
//! calls [`Player::process_media_events`] or [`Player::tick`], so no state is
//! ever mutated re-entrantly from inside a native call.

use crate::autoplay::{AutoplayCheck, AutoplayDecision, AutoplayNegotiator};
use crate::config::{PlayerConfig, Preload, PLAYBACK_RATE_RANGE};
use crate::effects::{CaptionFetch, Deferred, Effects, PlayRequest};
use crate::error::{ErrorCode, PlaybackError, PlayerError, Result};
use crate::generation::Generation;
use crate::instream::{AdBreak, InstreamController, InstreamStep};
use crate::media_controller::{CaptionFetchFailure, ControllerSnapshot};
use crate::model::{prepare_playlist, DockButton, PlayerModel, PlaylistItem};
use crate::pool::{ElementPool, PoolStats};
use crate::program_controller::{BeginActivation, PendingActivation, ProgramController};
use crate::provider::{Provider, ProviderContext, ProviderRegistry};
use bridge_traits::{CapabilityTag, CastSession, HttpRequest, PlayRejection};
use futures::future::{self, Either};
use futures::stream::{FuturesUnordered, StreamExt};
use core_runtime::config::CoreConfig;
use core_runtime::events::{
    AdEvent, ErrorEvent, EventBus, EventSeverity, EventStream, InterfaceEvent, MediaEvent,
    PauseReason, PlayReason, PlayerEvent, PlayerState, PlaylistEvent, Receiver,
};
use core_runtime::logging::strip_url_query;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, trace, warn};

/// Diagnostic view of a player.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerSnapshot {
    pub state: PlayerState,
    pub item_index: usize,
    pub active: Option<ControllerSnapshot>,
    pub background: Option<ControllerSnapshot>,
    pub ad_active: bool,
    pub ad_index: Option<usize>,
    pub content_pool: PoolStats,
    pub ad_pool: PoolStats,
    pub casting: bool,
    pub destroyed: bool,
}

impl PlayerSnapshot {
    /// Providers currently attached and mounted on the visible surface.
    pub fn visible_providers(&self) -> usize {
        let visible = |snapshot: &Option<ControllerSnapshot>| {
            snapshot
                .as_ref()
                .is_some_and(|c| c.attached && !c.background)
        };
        visible(&self.active) as usize
            + visible(&self.background) as usize
            + self.ad_active as usize
    }
}

struct PlayerCore {
    config: Arc<PlayerConfig>,
    bridges: CoreConfig,
    bus: EventBus,
    model: PlayerModel,
    pool: ElementPool,
    registry: ProviderRegistry,
    program: ProgramController,
    instream: Option<InstreamController>,
    autoplay: AutoplayNegotiator,
    /// Invalidated by every command that changes what the user asked for.
    intent: Generation,
    deferred: VecDeque<Deferred>,
    /// Play requested while the item's provider was still being built.
    pending_play: Option<PlayReason>,
    setup_error: Option<ErrorCode>,
    destroyed: bool,
}

/// Embeddable player instance.
///
/// Cloning is cheap; clones drive the same instance.
#[derive(Clone)]
pub struct Player {
    core: Arc<Mutex<PlayerCore>>,
    bus: EventBus,
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player").field("bus", &self.bus).finish()
    }
}

impl Player {
    /// Create a player with the built-in HTML5 provider.
    pub fn new(config: PlayerConfig, bridges: CoreConfig) -> Result<Self> {
        let registry = ProviderRegistry::with_defaults(config.native_hls);
        Self::with_registry(config, bridges, registry)
    }

    /// Create a player with a custom provider registry.
    pub fn with_registry(
        config: PlayerConfig,
        bridges: CoreConfig,
        registry: ProviderRegistry,
    ) -> Result<Self> {
        config.validate()?;
        bridges.validate()?;

        let config = Arc::new(config);
        let bus = EventBus::new(bridges.event_buffer_size);
        let pool = ElementPool::new(
            Arc::clone(&bridges.element_factory),
            config.element_pool_capacity,
        );
        let program = ProgramController::new(Arc::clone(&config), Arc::clone(&bridges.clock));

        info!(
            providers = ?registry.names(),
            autostart = config.autostart,
            pool_capacity = config.element_pool_capacity,
            "Player created"
        );

        let core = PlayerCore {
            model: PlayerModel::new(config.volume, config.mute, config.default_playback_rate),
            autoplay: AutoplayNegotiator::new(&config),
            config,
            bridges,
            bus: bus.clone(),
            pool,
            registry,
            program,
            instream: None,
            intent: Generation::new(),
            deferred: VecDeque::new(),
            pending_play: None,
            setup_error: None,
            destroyed: false,
        };

        Ok(Self {
            core: Arc::new(Mutex::new(core)),
            bus,
        })
    }

    // ========================================================================
    // Observation
    // ========================================================================

    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        self.bus.subscribe()
    }

    pub fn events(&self) -> EventStream {
        EventStream::new(self.bus.subscribe())
    }

    /// Copy of the host-visible model.
    pub fn model(&self) -> PlayerModel {
        self.core.lock().model.clone()
    }

    pub fn state(&self) -> PlayerState {
        self.core.lock().model.state
    }

    pub fn debug_snapshot(&self) -> PlayerSnapshot {
        let core = self.core.lock();
        let (active, background) = core.program.snapshots();
        PlayerSnapshot {
            state: core.model.state,
            item_index: core.model.item_index,
            active,
            background,
            ad_active: core.instream.is_some(),
            ad_index: core.instream.as_ref().map(InstreamController::ad_index),
            content_pool: core.pool.stats(&CapabilityTag::HTML5),
            ad_pool: core.pool.stats(&CapabilityTag::AD),
            casting: core.program.is_casting(),
            destroyed: core.destroyed,
        }
    }

    // ========================================================================
    // Playlist
    // ========================================================================

    /// Replace the playlist and activate the start item.
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn load(&self, items: Vec<PlaylistItem>) -> Result<()> {
        let result = self.run(|core, fx| core.load(items, fx));
        self.drive_deferred().await;
        result
    }

    /// Make `index` the active item without starting playback.
    #[instrument(skip(self))]
    pub async fn set_active_item(&self, index: usize) -> Result<()> {
        let result = self.run(|core, fx| {
            core.ensure_usable()?;
            core.pending_play = None;
            core.activate(index, None, false, fx)
        });
        self.drive_deferred().await;
        result
    }

    /// Activate `index` and play it.
    #[instrument(skip(self))]
    pub async fn playlist_item(&self, index: usize) -> Result<()> {
        let result = self.run(|core, fx| {
            core.ensure_usable()?;
            core.pending_play = Some(PlayReason::External);
            core.activate(index, None, false, fx)
        });
        self.drive_deferred().await;
        result
    }

    /// Play the next item. Wraps around only with `repeat`.
    #[instrument(skip(self))]
    pub async fn next(&self) -> Result<()> {
        let result = self.run(|core, fx| {
            core.ensure_usable()?;
            match core.next_index() {
                Some(index) => {
                    core.pending_play = Some(PlayReason::External);
                    core.activate(index, None, false, fx)
                }
                None => {
                    fx.playlist(PlaylistEvent::PlaylistComplete);
                    Ok(())
                }
            }
        });
        self.drive_deferred().await;
        result
    }

    /// Background-load the item after the active one.
    #[instrument(skip(self))]
    pub async fn preload_next(&self) -> Result<()> {
        let result = self.run(|core, fx| {
            core.ensure_usable()?;
            match core.next_index() {
                Some(index) => core.background_load(index, fx),
                None => Ok(()),
            }
        });
        self.drive_deferred().await;
        result
    }

    /// Background-load `index` as the next item.
    #[instrument(skip(self))]
    pub async fn background_load(&self, index: usize) -> Result<()> {
        let result = self.run(|core, fx| {
            core.ensure_usable()?;
            core.background_load(index, fx)
        });
        self.drive_deferred().await;
        result
    }

    // ========================================================================
    // Playback
    // ========================================================================

    #[instrument(skip(self))]
    pub async fn play(&self, reason: PlayReason) -> Result<()> {
        let result = self.run(|core, fx| core.play(reason, fx));
        self.drive_deferred().await;
        result
    }

    pub fn pause(&self, reason: PauseReason) -> Result<()> {
        self.run(|core, fx| {
            core.ensure_usable()?;
            core.intent.invalidate();
            core.pending_play = None;
            if let Some(instream) = core.instream.as_mut() {
                instream.pause(fx);
            } else if let Some(active) = core.program.active_mut() {
                active.pause(Some(reason), fx);
            }
            Ok(())
        })
    }

    pub fn stop(&self) -> Result<()> {
        self.run(|core, fx| {
            core.ensure_usable()?;
            core.intent.invalidate();
            core.pending_play = None;
            if core.instream.is_some() {
                core.end_ad_break(false, fx);
            }
            if let Some(active) = core.program.active_mut() {
                active.stop(fx);
            }
            Ok(())
        })
    }

    #[instrument(skip(self))]
    pub async fn seek(&self, position: f64) -> Result<()> {
        let result = self.run(|core, fx| {
            core.ensure_usable()?;
            if !position.is_finite() {
                return Err(PlaybackError::InvalidArgument {
                    field: "position",
                    reason: format!("{} is not finite", position),
                });
            }
            if core.instream.is_some() {
                return Err(PlaybackError::AdBreakInProgress);
            }
            let active = core
                .program
                .active_mut()
                .ok_or(PlaybackError::NoActiveItem)?;
            if active.seek(position) {
                active.play(PlayReason::External, fx);
            }
            Ok(())
        });
        self.drive_deferred().await;
        result
    }

    // ========================================================================
    // Settings
    // ========================================================================

    pub fn set_volume(&self, volume: u8) -> Result<()> {
        self.run(|core, fx| {
            core.ensure_usable()?;
            if volume > 100 {
                return Err(PlaybackError::InvalidArgument {
                    field: "volume",
                    reason: format!("{} is outside 0-100", volume),
                });
            }
            if let Some(active) = core.program.active_mut() {
                active.set_volume(volume);
            }
            if let Some(instream) = core.instream.as_mut() {
                instream.set_volume(volume);
            }
            fx.media(MediaEvent::Volume { volume });
            Ok(())
        })
    }

    pub fn set_mute(&self, muted: bool) -> Result<()> {
        self.run(|core, fx| {
            core.ensure_usable()?;
            core.set_mute(muted, fx);
            Ok(())
        })
    }

    /// Set the playback rate (0.25-4). Live streams stay at 1.
    pub fn set_playback_rate(&self, rate: f64) -> Result<()> {
        self.run(|core, fx| {
            core.ensure_usable()?;
            if !PLAYBACK_RATE_RANGE.contains(&rate) {
                return Err(PlaybackError::InvalidArgument {
                    field: "playback_rate",
                    reason: format!("{} is outside 0.25-4", rate),
                });
            }
            let applied = match core.program.active_mut() {
                Some(active) => active.set_playback_rate(rate),
                None => Some(rate),
            };
            if let Some(applied) = applied.filter(|applied| *applied != core.model.playback_rate) {
                fx.media(MediaEvent::PlaybackRateChanged {
                    playback_rate: applied,
                });
            }
            Ok(())
        })
    }

    #[instrument(skip(self))]
    pub async fn set_current_quality(&self, index: usize) -> Result<()> {
        let result = self.run(|core, fx| {
            core.ensure_usable()?;
            let active = core
                .program
                .active_mut()
                .ok_or(PlaybackError::NoActiveItem)?;
            if let Some(label) = active.set_quality(index, fx)? {
                core.model.persist_quality_label(&label);
            }
            Ok(())
        });
        self.drive_deferred().await;
        result
    }

    pub fn set_current_audio_track(&self, index: usize) -> Result<()> {
        self.run(|core, _fx| {
            core.ensure_usable()?;
            core.program
                .active_mut()
                .ok_or(PlaybackError::NoActiveItem)?
                .set_audio_track(index)
        })
    }

    /// Select captions entry `index` (0 = off).
    #[instrument(skip(self))]
    pub async fn set_current_captions(&self, index: usize) -> Result<()> {
        let result = self.run(|core, fx| {
            core.ensure_usable()?;
            let active = core
                .program
                .active_mut()
                .ok_or(PlaybackError::NoActiveItem)?;
            let label = active.select_captions(index, fx)?;
            core.model.persist_caption_label(&label);
            Ok(())
        });
        self.drive_deferred().await;
        result
    }

    // ========================================================================
    // Interface state
    // ========================================================================

    pub fn set_fullscreen(&self, fullscreen: bool) -> Result<()> {
        self.run(|core, fx| {
            core.ensure_usable()?;
            if core.model.fullscreen != fullscreen {
                fx.interface(InterfaceEvent::FullscreenChange { fullscreen });
            }
            Ok(())
        })
    }

    pub fn set_viewable(&self, viewable: bool) -> Result<()> {
        self.run(|core, fx| {
            core.ensure_usable()?;
            if core.model.viewable != viewable {
                fx.interface(InterfaceEvent::Viewable { viewable });
            }
            Ok(())
        })
    }

    pub fn set_controls(&self, controls: bool) -> Result<()> {
        self.run(|core, fx| {
            core.ensure_usable()?;
            if core.model.controls != controls {
                fx.interface(InterfaceEvent::Controls { controls });
            }
            Ok(())
        })
    }

    pub fn add_button(
        &self,
        id: impl Into<String>,
        label: impl Into<String>,
        tooltip: Option<String>,
    ) -> Result<()> {
        let button = DockButton {
            id: id.into(),
            label: label.into(),
            tooltip,
        };
        self.run(|core, fx| {
            core.ensure_usable()?;
            if core.model.add_button(button) {
                fx.interface(InterfaceEvent::ButtonsChanged {
                    ids: core.model.button_ids(),
                });
            }
            Ok(())
        })
    }

    pub fn remove_button(&self, id: &str) -> Result<()> {
        self.run(|core, fx| {
            core.ensure_usable()?;
            if core.model.remove_button(id) {
                fx.interface(InterfaceEvent::ButtonsChanged {
                    ids: core.model.button_ids(),
                });
            }
            Ok(())
        })
    }

    pub fn resize(&self, width: u32, height: u32) -> Result<()> {
        self.run(|core, _fx| {
            core.ensure_usable()?;
            if let Some(active) = core.program.active_mut() {
                active.resize(width, height);
            }
            if let Some(instream) = core.instream.as_mut() {
                instream.resize(width, height);
            }
            Ok(())
        })
    }

    // ========================================================================
    // Casting
    // ========================================================================

    #[instrument(skip(self, session))]
    pub async fn cast_video(&self, session: Arc<dyn CastSession>) -> Result<()> {
        let result = self.run(|core, fx| {
            core.ensure_usable()?;
            if core.instream.is_some() {
                return Err(PlaybackError::AdBreakInProgress);
            }
            let (device_name, was_playing) = core.program.start_cast(session, &mut core.pool)?;
            fx.playlist(PlaylistEvent::CastStarted { device_name });
            let (volume, muted, rate) = core.settings();
            if let Some(active) = core.program.active_mut() {
                active.apply_settings(volume, muted, rate);
                if was_playing {
                    active.play(PlayReason::External, fx);
                }
            }
            Ok(())
        });
        self.drive_deferred().await;
        result
    }

    /// End casting and resume locally from the receiver's position.
    #[instrument(skip(self))]
    pub async fn stop_cast(&self) -> Result<()> {
        let result = self.run(|core, fx| {
            core.ensure_usable()?;
            let (index, position, was_playing) = core.program.stop_cast(&mut core.pool)?;
            fx.playlist(PlaylistEvent::CastStopped);
            core.pending_play = was_playing.then_some(PlayReason::External);
            core.activate(index, Some(position), false, fx)
        });
        self.drive_deferred().await;
        result
    }

    // ========================================================================
    // Ad breaks
    // ========================================================================

    #[instrument(skip(self, ad_break))]
    pub async fn start_ad_break(&self, ad_break: AdBreak) -> Result<()> {
        let result = self.run(|core, fx| core.start_ad_break(ad_break, fx));
        self.drive_deferred().await;
        result
    }

    #[instrument(skip(self))]
    pub async fn skip_ad(&self) -> Result<()> {
        let result = self.run(|core, fx| {
            core.ensure_usable()?;
            let instream = core.instream.as_mut().ok_or(PlaybackError::NoAdBreak)?;
            if instream.skip(fx)? == InstreamStep::End {
                core.end_ad_break(true, fx);
            }
            Ok(())
        });
        self.drive_deferred().await;
        result
    }

    /// End the ad break early. Content resumes unless `resume` is false.
    #[instrument(skip(self))]
    pub async fn end_ad_break(&self, resume: bool) -> Result<()> {
        let result = self.run(|core, fx| {
            core.ensure_usable()?;
            if core.instream.is_none() {
                return Err(PlaybackError::NoAdBreak);
            }
            core.end_ad_break(resume, fx);
            Ok(())
        });
        self.drive_deferred().await;
        result
    }

    // ========================================================================
    // Checkpoints
    // ========================================================================

    /// Process queued native events of every controller.
    pub async fn process_media_events(&self) -> Result<()> {
        let result = self.checkpoint(false);
        self.drive_deferred().await;
        result.map(|_| ())
    }

    /// Polling tick: stall detection, cast position polling, cue refresh.
    pub async fn tick(&self) -> Result<()> {
        let result = self.checkpoint(true);
        self.drive_deferred().await;
        result.map(|_| ())
    }

    /// Run one checkpoint without settling what it queued. Returns whether
    /// deferred work is waiting for [`Player::drive_deferred`].
    pub(crate) fn checkpoint(&self, tick: bool) -> Result<bool> {
        self.run(|core, fx| {
            core.ensure_usable()?;
            core.checkpoint(tick, fx);
            Ok(())
        })?;
        Ok(!self.core.lock().deferred.is_empty())
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Destroy the player. Every later command returns `Destroyed`.
    pub fn destroy(&self) {
        let mut core = self.core.lock();
        core.destroy();
    }

    // ========================================================================
    // Deferred work
    // ========================================================================

    fn run<T>(&self, op: impl FnOnce(&mut PlayerCore, &mut Effects) -> Result<T>) -> Result<T> {
        let mut core = self.core.lock();
        let mut fx = Effects::new();
        let result = op(&mut core, &mut fx);
        core.commit(fx);
        result
    }

    pub(crate) async fn drive_deferred(&self) {
        let mut settling = FuturesUnordered::new();
        loop {
            let queued: Vec<Deferred> = self.core.lock().deferred.drain(..).collect();
            for work in queued {
                trace!(?work, "Settling deferred work");
                settling.push(self.settle(work));
            }
            if settling.next().await.is_none() {
                break;
            }
        }
    }

    async fn settle(&self, work: Deferred) {
        match work {
            Deferred::Activate(mut pending) => {
                let result = (&mut pending.future).await;
                let _ = self.run(|core, fx| {
                    core.finish_activation(pending, result, fx);
                    Ok(())
                });
            }
            Deferred::Background(mut pending) => {
                let result = (&mut pending.future).await;
                let _ = self.run(|core, _fx| {
                    core.finish_background(pending, result);
                    Ok(())
                });
            }
            Deferred::Play(request) => {
                let PlayRequest {
                    ticket,
                    reason,
                    future,
                } = request;
                let result = future.await;
                if !ticket.token.is_current() {
                    debug!(
                        controller_id = ticket.controller_id,
                        generation = ticket.token.value(),
                        "Ignoring superseded play result"
                    );
                    return;
                }
                let _ = self.run(|core, fx| {
                    core.finish_play(ticket.controller_id, reason, result, fx);
                    Ok(())
                });
            }
            Deferred::Autoplay(check) => {
                let decision = if check.token.is_current() {
                    let probe = check.future.clone();
                    let superseded = Box::pin(check.token.superseded());
                    match future::select(probe, superseded).await {
                        Either::Left((decision, _)) => Some(decision),
                        Either::Right(_) => None,
                    }
                } else {
                    None
                };
                let _ = self.run(|core, fx| {
                    core.finish_autoplay(check, decision, fx);
                    Ok(())
                });
            }
            Deferred::Fetch(fetch) => {
                let client = self.core.lock().bridges.http_client.clone();
                let CaptionFetch {
                    controller_id,
                    request,
                } = fetch;
                let result = match client {
                    None => Err(CaptionFetchFailure::Fetch(
                        "no HTTP client configured".to_string(),
                    )),
                    Some(client) => {
                        debug!(url = %strip_url_query(&request.url), "Fetching caption file");
                        match client.execute(HttpRequest::get(request.url.clone())).await {
                            Ok(response) if response.is_success() => response
                                .text()
                                .map_err(|e| CaptionFetchFailure::Fetch(e.to_string())),
                            Ok(response) => Err(CaptionFetchFailure::Fetch(format!(
                                "HTTP {}",
                                response.status
                            ))),
                            Err(e) => Err(CaptionFetchFailure::Fetch(e.to_string())),
                        }
                    }
                };
                let _ = self.run(|core, fx| {
                    if let Some(controller) = core.program.controller_mut(controller_id) {
                        controller.finish_caption_fetch(&request.track_id, result, fx);
                    }
                    Ok(())
                });
            }
        }
    }
}

impl PlayerCore {
    fn ensure_usable(&self) -> Result<()> {
        if self.destroyed {
            return Err(PlaybackError::Destroyed);
        }
        if let Some(code) = self.setup_error {
            return Err(PlaybackError::SetupFailed(code));
        }
        Ok(())
    }

    fn settings(&self) -> (u8, bool, f64) {
        (self.model.volume, self.model.mute, self.model.playback_rate)
    }

    fn provider_context(&self) -> ProviderContext {
        ProviderContext {
            dvr_window: self.config.dvr_window,
            quality_label: self
                .model
                .quality_label
                .clone()
                .or_else(|| self.config.persisted_quality_label.clone()),
        }
    }

    fn caption_hint(&self) -> Option<String> {
        self.model
            .caption_label
            .clone()
            .or_else(|| self.config.captions.persisted_label.clone())
    }

    /// Publish events and queue deferred work.
    fn commit(&mut self, fx: Effects) {
        for event in fx.events {
            self.model.observe(&event);
            match event.severity() {
                EventSeverity::Debug => trace!(event = event.name(), "Publishing event"),
                EventSeverity::Info => debug!(event = event.name(), "Publishing event"),
                EventSeverity::Warning | EventSeverity::Error => {
                    debug!(event = event.name(), payload = ?event, "Publishing event")
                }
            }
            // No subscribers is not an error.
            let _ = self.bus.emit(event);
        }
        self.deferred.extend(fx.deferred);
    }

    fn fail_setup(&mut self, err: &PlaybackError, fx: &mut Effects) {
        let record = PlayerError::from(err);
        error!(code = record.code.value(), error = %err, "Setup failed");
        self.setup_error = Some(record.code);
        fx.error(ErrorEvent::Error(
            record.to_payload(&self.config.localization),
        ));
        self.model.error = Some(record);
    }

    fn next_index(&self) -> Option<usize> {
        let len = self.model.playlist.len();
        let next = self.model.item_index + 1;
        if next < len {
            Some(next)
        } else if self.config.repeat && len > 0 {
            Some(0)
        } else {
            None
        }
    }

    // ========================================================================
    // Playlist
    // ========================================================================

    fn load(&mut self, items: Vec<PlaylistItem>, fx: &mut Effects) -> Result<()> {
        if self.destroyed {
            return Err(PlaybackError::Destroyed);
        }
        self.intent.invalidate();
        self.pending_play = None;
        if let Some(mut instream) = self.instream.take() {
            instream.release(&mut self.pool);
            fx.ad(AdEvent::AdBreakEnd);
        }
        self.program.teardown_all(&mut self.pool);
        self.setup_error = None;
        self.model.error = None;

        let playlist = match prepare_playlist(items) {
            Ok(playlist) => playlist,
            Err(e) => {
                self.model.playlist.clear();
                self.fail_setup(&e, fx);
                return Err(e);
            }
        };

        let item_count = playlist.len();
        let start = self.config.playlist_start_index.min(item_count - 1);
        info!(item_count, start, "Playlist loaded");
        self.model.playlist = playlist;
        fx.playlist(PlaylistEvent::Playlist { item_count });
        self.activate(start, None, self.config.autostart, fx)
    }

    /// Make `index` the active item. `start_override` replaces the item's
    /// start time (resume after casting).
    fn activate(
        &mut self,
        index: usize,
        start_override: Option<f64>,
        autostart: bool,
        fx: &mut Effects,
    ) -> Result<()> {
        let item = self
            .model
            .item(index)
            .cloned()
            .ok_or(PlaybackError::IndexOutOfRange {
                index,
                len: self.model.playlist.len(),
            })?;
        self.intent.invalidate();
        if let Some(mut instream) = self.instream.take() {
            instream.release(&mut self.pool);
            fx.ad(AdEvent::AdBreakEnd);
        }

        let context = self.provider_context();
        match self.program.begin_activation(
            index,
            item,
            start_override,
            autostart,
            &self.registry,
            &mut self.pool,
            context,
        ) {
            Ok(BeginActivation::Promoted) => {
                self.on_activated(index, autostart, fx);
                Ok(())
            }
            Ok(BeginActivation::Pending(pending)) => {
                fx.defer(Deferred::Activate(pending));
                Ok(())
            }
            Err(e @ PlaybackError::NoPlayableSource(_)) => {
                self.fail_setup(&e, fx);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn finish_activation(
        &mut self,
        pending: PendingActivation,
        result: Result<Box<dyn Provider>>,
        fx: &mut Effects,
    ) {
        let index = pending.index;
        let autostart = pending.autostart;
        match self.program.finish_activation(pending, result, &mut self.pool) {
            Ok(true) => self.on_activated(index, autostart, fx),
            Ok(false) => {}
            Err(e) => self.fail_setup(&e, fx),
        }
    }

    fn on_activated(&mut self, index: usize, autostart: bool, fx: &mut Effects) {
        let settings = self.settings();
        let caption_hint = self.caption_hint();
        let next = self.next_index_after(index);
        let preload = self.config.preload;
        let pending_play = self.pending_play.take();

        let Some(item) = self.model.item(index).cloned() else {
            return;
        };
        fx.playlist(PlaylistEvent::PlaylistItem {
            index,
            file: item.primary_file().to_string(),
            title: item.title.clone(),
        });
        fx.playlist(PlaylistEvent::NextUp {
            index: next,
            title: next
                .and_then(|i| self.model.item(i))
                .and_then(|next| next.title.clone()),
        });

        let Some(active) = self.program.active_mut() else {
            return;
        };
        active.apply_settings(settings.0, settings.1, settings.2);
        active.announce(caption_hint, fx);

        if let Some(reason) = pending_play {
            active.play(reason, fx);
        } else if autostart {
            self.request_autoplay(fx);
        } else if preload != Preload::None && !active.is_setup() {
            active.preload();
        }
    }

    fn next_index_after(&self, index: usize) -> Option<usize> {
        let len = self.model.playlist.len();
        if index + 1 < len {
            Some(index + 1)
        } else if self.config.repeat && len > 1 {
            Some(0)
        } else {
            None
        }
    }

    fn background_load(&mut self, index: usize, fx: &mut Effects) -> Result<()> {
        let item = self
            .model
            .item(index)
            .cloned()
            .ok_or(PlaybackError::IndexOutOfRange {
                index,
                len: self.model.playlist.len(),
            })?;
        let context = self.provider_context();
        if let Some(pending) =
            self.program
                .begin_background(index, item, &self.registry, &mut self.pool, context)?
        {
            debug!(item_index = index, "Background load requested");
            fx.defer(Deferred::Background(pending));
        }
        Ok(())
    }

    fn finish_background(&mut self, pending: PendingActivation, result: Result<Box<dyn Provider>>) {
        let index = pending.index;
        let settings = self.settings();
        if let Err(e) = self
            .program
            .finish_background(pending, result, &mut self.pool, settings)
        {
            warn!(item_index = index, error = %e, "Background load failed");
        }
    }

    /// Advance after the active item completed naturally.
    fn advance_after_complete(&mut self, fx: &mut Effects) {
        match self.next_index() {
            Some(index) => {
                info!(item_index = index, "Advancing to next item");
                self.pending_play = Some(PlayReason::Playlist);
                if let Err(e) = self.activate(index, None, false, fx) {
                    warn!(item_index = index, error = %e, "Could not advance");
                }
            }
            None => fx.playlist(PlaylistEvent::PlaylistComplete),
        }
    }

    // ========================================================================
    // Playback
    // ========================================================================

    fn play(&mut self, reason: PlayReason, fx: &mut Effects) -> Result<()> {
        self.ensure_usable()?;
        self.intent.invalidate();
        if let Some(instream) = self.instream.as_mut() {
            instream.play(fx);
            return Ok(());
        }
        match self.program.active_mut() {
            Some(active) => active.play(reason, fx),
            None if self.model.playlist.is_empty() => return Err(PlaybackError::NoActiveItem),
            None => {
                debug!(?reason, "Provider not ready, queueing play");
                self.pending_play = Some(reason);
            }
        }
        Ok(())
    }

    fn set_mute(&mut self, muted: bool, fx: &mut Effects) {
        if let Some(active) = self.program.active_mut() {
            active.set_mute(muted);
        }
        if let Some(instream) = self.instream.as_mut() {
            instream.set_mute(muted);
        }
        fx.media(MediaEvent::Mute { mute: muted });
    }

    fn finish_play(
        &mut self,
        controller_id: u64,
        reason: PlayReason,
        result: std::result::Result<(), PlayRejection>,
        fx: &mut Effects,
    ) {
        if let Some(instream) = self.instream.as_mut() {
            if instream.id() == controller_id {
                if instream.finish_play(result, fx) == InstreamStep::End {
                    self.end_ad_break(true, fx);
                }
                return;
            }
        }
        if let Some(controller) = self.program.controller_mut(controller_id) {
            let mut local = Effects::new();
            controller.finish_play(reason, result, &mut local);
            if controller.is_active() {
                fx.merge(local);
            } else {
                fx.merge_silently(local);
            }
        }
    }

    // ========================================================================
    // Autoplay
    // ========================================================================

    fn request_autoplay(&mut self, fx: &mut Effects) {
        let token = self.intent.current();
        match self.autoplay.probe(
            &mut self.pool,
            token,
            self.model.mute,
            self.config.allow_muted_autoplay,
        ) {
            Ok(check) => fx.defer(Deferred::Autoplay(check)),
            Err(e) => {
                warn!(error = %e, "Autoplay probe unavailable");
                fx.media(MediaEvent::AutostartNotAllowed {
                    code: ErrorCode::PLAY_NOT_ALLOWED.value(),
                });
            }
        }
    }

    /// `decision` is `None` when the check was superseded before its probe
    /// settled.
    fn finish_autoplay(
        &mut self,
        check: AutoplayCheck,
        decision: Option<AutoplayDecision>,
        fx: &mut Effects,
    ) {
        // Only successes stay memoized, whoever asked for them.
        match decision.or_else(|| check.future.peek().copied()) {
            Some(AutoplayDecision::Enabled | AutoplayDecision::Muted) => {
                self.autoplay.remember(&check)
            }
            Some(AutoplayDecision::Disabled) | None => self.autoplay.forget(&check),
        }
        let Some(decision) = decision.filter(|_| check.token.is_current()) else {
            debug!(?decision, "Ignoring superseded autoplay decision");
            return;
        };
        match decision {
            AutoplayDecision::Enabled => {}
            AutoplayDecision::Muted => {
                info!("Autostarting muted");
                self.set_mute(true, fx);
            }
            AutoplayDecision::Disabled => {
                fx.media(MediaEvent::AutostartNotAllowed {
                    code: ErrorCode::PLAY_NOT_ALLOWED.value(),
                });
                return;
            }
        }
        if let Some(active) = self.program.active_mut() {
            active.play(PlayReason::Autostart, fx);
        }
    }

    // ========================================================================
    // Ad breaks
    // ========================================================================

    fn start_ad_break(&mut self, ad_break: AdBreak, fx: &mut Effects) -> Result<()> {
        self.ensure_usable()?;
        if self.instream.is_some() {
            return Err(PlaybackError::AdBreakInProgress);
        }
        self.intent.invalidate();
        self.pending_play = None;
        let id = self.program.next_controller_id();
        let (volume, muted, _) = self.settings();
        let content = self
            .program
            .active_mut()
            .ok_or(PlaybackError::NoActiveItem)?;
        self.instream = InstreamController::start(
            id,
            ad_break,
            content,
            &mut self.pool,
            (volume, muted),
            Arc::clone(&self.config),
            fx,
        )?;
        Ok(())
    }

    fn end_ad_break(&mut self, allow_resume: bool, fx: &mut Effects) {
        let Some(mut instream) = self.instream.take() else {
            return;
        };
        if !allow_resume {
            instream.set_no_resume(true);
        }
        let outcome = instream.end(self.program.active_mut(), &mut self.pool, fx);
        if let Some(reason) = outcome.resume {
            if let Some(active) = self.program.active_mut() {
                active.play(reason, fx);
            }
        }
        // A stopped postroll still completes the item but does not advance.
        if outcome.completed && allow_resume {
            self.advance_after_complete(fx);
        }
    }

    // ========================================================================
    // Checkpoints
    // ========================================================================

    fn checkpoint(&mut self, tick: bool, fx: &mut Effects) {
        let mut local = Effects::new();
        let completed = self.program.flush_complete(&mut local);
        let mut step = InstreamStep::Continue;
        if tick {
            self.program.tick(&mut local);
            if let Some(instream) = self.instream.as_mut() {
                step = instream.tick(&mut local);
            }
        } else {
            self.program.process_events(&mut local);
            if let Some(instream) = self.instream.as_mut() {
                step = instream.process_events(&mut local);
            }
        }
        fx.merge(local);

        if step == InstreamStep::End {
            self.end_ad_break(true, fx);
        } else if completed && self.instream.is_none() {
            self.advance_after_complete(fx);
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.intent.invalidate();
        self.pending_play = None;

        if let Some(mut instream) = self.instream.take() {
            instream.release(&mut self.pool);
        }
        self.program.teardown_all(&mut self.pool);
        self.autoplay.release(&mut self.pool);
        for work in self.deferred.drain(..) {
            if let Deferred::Activate(pending) | Deferred::Background(pending) = work {
                self.pool.checkin(pending.lease);
            }
        }
        self.pool.drain();
        info!("Player destroyed");
    }
}
