//! # Program Controller
//!
//! Owns the active [`MediaController`] and at most one background one (a
//! preloaded next item). Performs provider selection, background-to-active
//! promotion, casting hand-over and recycling through the element pool.
//!
//! Provider construction is asynchronous. `begin_*` methods do all the
//! synchronous work (teardown, element checkout) and return a
//! [`PendingActivation`] whose future the player awaits without holding its
//! lock; `finish_*` methods apply the result only if the activation token is
//! still current. A superseded activation destroys the provider it built and
//! returns the element to the pool.

use crate::config::PlayerConfig;
use crate::effects::Effects;
use crate::error::{PlaybackError, Result};
use crate::generation::{Generation, GenerationToken};
use crate::media_controller::{ControllerSnapshot, MediaController};
use crate::model::PlaylistItem;
use crate::pool::{ElementPool, PooledElement};
use crate::provider::{CastProvider, Provider, ProviderContext, ProviderRegistry};
use bridge_traits::{CastSession, Clock, PlatformFuture};
use std::sync::Arc;
use tracing::{debug, info};

/// Provider construction in flight.
pub(crate) struct PendingActivation {
    pub index: usize,
    pub item: Arc<PlaylistItem>,
    pub token: GenerationToken,
    pub lease: PooledElement,
    pub provider_name: &'static str,
    pub start_position: f64,
    pub autostart: bool,
    pub future: PlatformFuture<'static, Result<Box<dyn Provider>>>,
}

pub(crate) enum BeginActivation {
    /// A completed preload was promoted synchronously.
    Promoted,
    Pending(PendingActivation),
}

pub struct ProgramController {
    active: Option<MediaController>,
    background: Option<MediaController>,
    activation: Generation,
    background_generation: Generation,
    next_id: u64,
    config: Arc<PlayerConfig>,
    clock: Arc<dyn Clock>,
    cast_device: Option<String>,
}

impl ProgramController {
    pub fn new(config: Arc<PlayerConfig>, clock: Arc<dyn Clock>) -> Self {
        Self {
            active: None,
            background: None,
            activation: Generation::new(),
            background_generation: Generation::new(),
            next_id: 0,
            config,
            clock,
            cast_device: None,
        }
    }

    /// Allocate a controller id (also used for ad breaks).
    pub fn next_controller_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn active(&self) -> Option<&MediaController> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut MediaController> {
        self.active.as_mut()
    }

    pub fn background(&self) -> Option<&MediaController> {
        self.background.as_ref()
    }

    pub fn background_mut(&mut self) -> Option<&mut MediaController> {
        self.background.as_mut()
    }

    pub fn is_casting(&self) -> bool {
        self.cast_device.is_some()
    }

    /// Active or background controller with `id`.
    pub fn controller_mut(&mut self, id: u64) -> Option<&mut MediaController> {
        if self.active.as_ref().map(|c| c.id()) == Some(id) {
            return self.active.as_mut();
        }
        if self.background.as_ref().map(|c| c.id()) == Some(id) {
            return self.background.as_mut();
        }
        None
    }

    fn build_controller(
        &mut self,
        provider: Box<dyn Provider>,
        lease: Option<PooledElement>,
        item: Arc<PlaylistItem>,
        index: usize,
        start_position: f64,
    ) -> MediaController {
        let id = self.next_controller_id();
        MediaController::new(
            id,
            provider,
            lease,
            item,
            index,
            start_position,
            Arc::clone(&self.config),
            Arc::clone(&self.clock),
        )
    }

    fn teardown_active(&mut self, pool: &mut ElementPool) {
        if let Some(active) = self.active.take() {
            active.destroy(pool);
        }
        self.cast_device = None;
    }

    fn teardown_background(&mut self, pool: &mut ElementPool) {
        self.background_generation.invalidate();
        if let Some(background) = self.background.take() {
            background.destroy(pool);
        }
    }

    // ========================================================================
    // Activation
    // ========================================================================

    /// Start making `item` the active item.
    ///
    /// A completed background preload with the same source is promoted
    /// without reloading. Otherwise the stale preload and the current active
    /// controller are torn down and a new provider is requested.
    pub(crate) fn begin_activation(
        &mut self,
        index: usize,
        item: Arc<PlaylistItem>,
        start_override: Option<f64>,
        autostart: bool,
        registry: &ProviderRegistry,
        pool: &mut ElementPool,
        context: ProviderContext,
    ) -> Result<BeginActivation> {
        let token = self.activation.advance();

        let promotable = start_override.is_none()
            && self
                .background
                .as_ref()
                .is_some_and(|background| background.item().same_source(&item));
        if promotable {
            if let Some(mut background) = self.background.take() {
                self.background_generation.invalidate();
                self.teardown_active(pool);
                info!(
                    controller_id = background.id(),
                    item_index = index,
                    "Promoting preloaded controller"
                );
                background.set_item_index(index);
                background.set_background(false);
                background.attach();
                self.active = Some(background);
                return Ok(BeginActivation::Promoted);
            }
        }

        // Also supersedes a preload whose provider is still being built.
        self.teardown_background(pool);
        self.teardown_active(pool);

        let factory = registry
            .select(&item)
            .ok_or(PlaybackError::NoPlayableSource(index))?;
        let lease = pool.checkout(&factory.capability())?;
        let future = factory.create(Arc::clone(lease.element()), context);
        debug!(
            item_index = index,
            provider = factory.name(),
            generation = token.value(),
            "Creating provider"
        );

        Ok(BeginActivation::Pending(PendingActivation {
            index,
            start_position: start_override.unwrap_or(item.starttime),
            item,
            token,
            lease,
            provider_name: factory.name(),
            autostart,
            future,
        }))
    }

    /// Install the built provider. Returns `Ok(false)` when the activation
    /// was superseded while the provider was being built.
    pub(crate) fn finish_activation(
        &mut self,
        pending: PendingActivation,
        result: Result<Box<dyn Provider>>,
        pool: &mut ElementPool,
    ) -> Result<bool> {
        let PendingActivation {
            index,
            item,
            token,
            lease,
            provider_name,
            start_position,
            ..
        } = pending;

        if !token.is_current() {
            debug!(item_index = index, generation = token.value(), "Discarding stale activation");
            if let Ok(mut provider) = result {
                provider.destroy();
            }
            pool.checkin(lease);
            return Ok(false);
        }

        let provider = match result {
            Ok(provider) => provider,
            Err(e) => {
                pool.checkin(lease);
                return Err(PlaybackError::ProviderLoad {
                    provider: provider_name.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let mut controller = self.build_controller(provider, Some(lease), item, index, start_position);
        controller.attach();
        info!(
            controller_id = controller.id(),
            item_index = index,
            provider = provider_name,
            "Item activated"
        );
        self.active = Some(controller);
        Ok(true)
    }

    // ========================================================================
    // Background loading
    // ========================================================================

    /// Start preloading `item` in the background. Returns `None` when it is
    /// already preloaded or no provider can play it.
    pub(crate) fn begin_background(
        &mut self,
        index: usize,
        item: Arc<PlaylistItem>,
        registry: &ProviderRegistry,
        pool: &mut ElementPool,
        context: ProviderContext,
    ) -> Result<Option<PendingActivation>> {
        if let Some(background) = &self.background {
            if background.item().same_source(&item) {
                return Ok(None);
            }
        }
        self.teardown_background(pool);
        let token = self.background_generation.advance();

        let Some(factory) = registry.select(&item) else {
            debug!(item_index = index, "No provider for background item");
            return Ok(None);
        };
        let lease = pool.checkout(&factory.capability())?;
        let future = factory.create(Arc::clone(lease.element()), context);

        Ok(Some(PendingActivation {
            index,
            start_position: item.starttime,
            item,
            token,
            lease,
            provider_name: factory.name(),
            autostart: false,
            future,
        }))
    }

    pub(crate) fn finish_background(
        &mut self,
        pending: PendingActivation,
        result: Result<Box<dyn Provider>>,
        pool: &mut ElementPool,
        settings: (u8, bool, f64),
    ) -> Result<bool> {
        let PendingActivation {
            index,
            item,
            token,
            lease,
            provider_name,
            start_position,
            ..
        } = pending;

        if !token.is_current() {
            if let Ok(mut provider) = result {
                provider.destroy();
            }
            pool.checkin(lease);
            return Ok(false);
        }

        let provider = match result {
            Ok(provider) => provider,
            Err(e) => {
                pool.checkin(lease);
                return Err(PlaybackError::ProviderLoad {
                    provider: provider_name.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let mut controller = self.build_controller(provider, Some(lease), item, index, start_position);
        controller.set_background(true);
        controller.attach();
        controller.apply_settings(settings.0, settings.1, settings.2);
        controller.preload();
        debug!(controller_id = controller.id(), item_index = index, "Background load started");
        self.background = Some(controller);
        Ok(true)
    }

    // ========================================================================
    // Casting
    // ========================================================================

    /// Replace the active provider with a cast session, carrying over the
    /// position. Returns the device name and whether content was playing.
    pub fn start_cast(
        &mut self,
        session: Arc<dyn CastSession>,
        pool: &mut ElementPool,
    ) -> Result<(String, bool)> {
        let active = self.active.take().ok_or(PlaybackError::NoActiveItem)?;
        let position = active.current_time();
        let was_playing = active.model().state.is_active_playback();
        let item = Arc::clone(active.item());
        let index = active.item_index();

        self.activation.invalidate();
        active.destroy(pool);

        let provider = CastProvider::new(session);
        let device = provider.device_name();
        let mut controller = self.build_controller(Box::new(provider), None, item, index, position);
        controller.attach();
        info!(device = %device, position, "Casting started");

        self.active = Some(controller);
        self.cast_device = Some(device.clone());
        Ok((device, was_playing))
    }

    /// Tear down the cast controller. Returns the item index, the position to
    /// resume from locally and whether the receiver was playing.
    pub fn stop_cast(&mut self, pool: &mut ElementPool) -> Result<(usize, f64, bool)> {
        if self.cast_device.is_none() {
            return Err(PlaybackError::InvalidArgument {
                field: "cast",
                reason: "not casting".to_string(),
            });
        }
        let active = self.active.take().ok_or(PlaybackError::NoActiveItem)?;
        let position = active.current_time();
        let was_playing = active.model().state.is_active_playback();
        let index = active.item_index();
        active.destroy(pool);
        self.cast_device = None;
        info!(position, "Casting stopped");
        Ok((index, position, was_playing))
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Process queued events. Only the foreground active controller's events
    /// are forwarded.
    pub(crate) fn process_events(&mut self, fx: &mut Effects) {
        self.each_controller(fx, MediaController::process_events);
    }

    pub(crate) fn tick(&mut self, fx: &mut Effects) {
        self.each_controller(fx, MediaController::tick);
    }

    fn each_controller(&mut self, fx: &mut Effects, op: fn(&mut MediaController, &mut Effects)) {
        if let Some(active) = self.active.as_mut() {
            let mut local = Effects::new();
            op(active, &mut local);
            if active.is_active() {
                fx.merge(local);
            } else {
                fx.merge_silently(local);
            }
        }
        if let Some(background) = self.background.as_mut() {
            let mut local = Effects::new();
            op(background, &mut local);
            fx.merge_silently(local);
        }
    }

    /// Publish a pending completion of the active controller.
    pub(crate) fn flush_complete(&mut self, fx: &mut Effects) -> bool {
        self.active
            .as_mut()
            .map(|active| active.flush_pending_complete(fx))
            .unwrap_or(false)
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Supersede every in-flight activation and tear down all controllers.
    pub fn teardown_all(&mut self, pool: &mut ElementPool) {
        self.activation.invalidate();
        self.teardown_background(pool);
        self.teardown_active(pool);
    }

    pub fn snapshots(&self) -> (Option<ControllerSnapshot>, Option<ControllerSnapshot>) {
        (
            self.active.as_ref().map(MediaController::snapshot),
            self.background.as_ref().map(MediaController::snapshot),
        )
    }
}
