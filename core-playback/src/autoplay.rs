//! # Autoplay Negotiation
//!
//! Decides whether an autostart may play unmuted, only muted, or not at all.
//!
//! A probe plays a tiny test source on a dedicated pooled element, racing
//! each attempt against [`PlayerConfig::autoplay_timeout`]. Outcomes are
//! memoized per `(muted, allow_muted)` combination for the lifetime of the
//! player, so later playlist items never probe again. The memoized future is
//! shared: concurrent requests for the same combination await one probe.
//!
//! The probe itself never touches player state. Callers capture a
//! [`GenerationToken`] in the [`AutoplayCheck`] and drop the decision when a
//! newer operation superseded it.
//!
//! [`PlayerConfig::autoplay_timeout`]: crate::config::PlayerConfig::autoplay_timeout

use crate::config::PlayerConfig;
use crate::error::Result;
use crate::generation::GenerationToken;
use crate::pool::{ElementPool, PooledElement};
use crate::timer::with_timeout;
use bridge_traits::{box_future, CapabilityTag, ElementSource, MediaElement, PlatformFuture};
use futures::future::{FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Result of an autoplay probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AutoplayDecision {
    /// Playback may start with the player's current mute state.
    Enabled,
    /// Playback may start only if the player mutes first.
    Muted,
    Disabled,
}

type SharedProbe = Shared<PlatformFuture<'static, AutoplayDecision>>;

/// `(player muted, muted fallback allowed)`
type ProbeKey = (bool, bool);

/// Pending autoplay decision handed to the player.
pub(crate) struct AutoplayCheck {
    pub token: GenerationToken,
    pub key: ProbeKey,
    pub future: SharedProbe,
}

pub struct AutoplayNegotiator {
    probe: Option<PooledElement>,
    source: ElementSource,
    timeout: Duration,
    cache: HashMap<ProbeKey, SharedProbe>,
}

impl AutoplayNegotiator {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            probe: None,
            source: ElementSource::new(
                config.autoplay_probe_source.clone(),
                Some("video/mp4".to_string()),
            ),
            timeout: config.autoplay_timeout,
            cache: HashMap::new(),
        }
    }

    /// Start (or join) the probe for this mute combination.
    pub(crate) fn probe(
        &mut self,
        pool: &mut ElementPool,
        token: GenerationToken,
        muted: bool,
        allow_muted: bool,
    ) -> Result<AutoplayCheck> {
        let key = (muted, allow_muted);
        if let Some(future) = self.cache.get(&key) {
            debug!(muted, allow_muted, "Reusing autoplay probe");
            return Ok(AutoplayCheck {
                token,
                key,
                future: future.clone(),
            });
        }

        let element = match &self.probe {
            Some(lease) => Arc::clone(lease.element()),
            None => {
                let lease = pool.checkout(&CapabilityTag::PROBE)?;
                let element = Arc::clone(lease.element());
                self.probe = Some(lease);
                element
            }
        };

        debug!(muted, allow_muted, timeout_ms = self.timeout.as_millis() as u64, "Starting autoplay probe");
        let future = box_future(run_probe(
            element,
            self.source.clone(),
            self.timeout,
            muted,
            allow_muted,
        ))
        .shared();
        self.cache.insert(key, future.clone());

        Ok(AutoplayCheck { token, key, future })
    }

    /// Memoized decision, if the probe for `key` has settled.
    pub fn cached(&self, muted: bool, allow_muted: bool) -> Option<AutoplayDecision> {
        self.cache
            .get(&(muted, allow_muted))
            .and_then(|future| future.peek().copied())
    }

    /// Drop `check`'s probe from the cache unless a newer probe replaced it.
    /// An unsettled probe is abandoned: once the last clone is dropped its
    /// timers go with it.
    pub(crate) fn forget(&mut self, check: &AutoplayCheck) {
        let cached = self
            .cache
            .get(&check.key)
            .is_some_and(|future| future.ptr_eq(&check.future));
        if !cached {
            return;
        }
        self.cache.remove(&check.key);
        if check.future.peek().is_none() {
            debug!(muted = check.key.0, allow_muted = check.key.1, "Abandoning autoplay probe");
            if let Some(lease) = &self.probe {
                lease.element().pause();
            }
        }
    }

    /// Memoize a successful probe again if superseded work dropped it.
    pub(crate) fn remember(&mut self, check: &AutoplayCheck) {
        self.cache
            .entry(check.key)
            .or_insert_with(|| check.future.clone());
    }

    /// Return the probe element to the pool and forget every result.
    pub fn release(&mut self, pool: &mut ElementPool) {
        self.cache.clear();
        if let Some(lease) = self.probe.take() {
            pool.checkin(lease);
        }
    }
}

async fn run_probe(
    element: Arc<dyn MediaElement>,
    source: ElementSource,
    timeout: Duration,
    muted: bool,
    allow_muted: bool,
) -> AutoplayDecision {
    element.set_src(Some(&source));
    element.load();

    if !muted {
        element.set_muted(false);
        if attempt(element.as_ref(), timeout).await {
            info!(decision = "enabled", "Autoplay probe settled");
            return AutoplayDecision::Enabled;
        }
        if !allow_muted {
            info!(decision = "disabled", "Autoplay probe settled");
            return AutoplayDecision::Disabled;
        }
    }

    element.set_muted(true);
    let decision = match (attempt(element.as_ref(), timeout).await, muted) {
        (true, true) => AutoplayDecision::Enabled,
        (true, false) => AutoplayDecision::Muted,
        (false, _) => AutoplayDecision::Disabled,
    };
    info!(?decision, "Autoplay probe settled");
    decision
}

/// One play attempt raced against the timeout; the element is paused either way.
async fn attempt(element: &dyn MediaElement, timeout: Duration) -> bool {
    let outcome = with_timeout(timeout, element.play()).await;
    element.pause();
    matches!(outcome, Some(Ok(())))
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::generation::Generation;
    use bridge_traits::{
        MediaElementFactory, NativeEventSink, NativeMediaError, PlayRejection, TimeRange,
    };
    use parking_lot::Mutex;

    /// Unmuted plays follow `unmuted`; muted plays follow `muted`.
    /// `None` never settles.
    struct PolicyElement {
        unmuted: Option<std::result::Result<(), PlayRejection>>,
        muted: Option<std::result::Result<(), PlayRejection>>,
        is_muted: Mutex<bool>,
        plays: Mutex<usize>,
    }

    #[async_trait::async_trait]
    impl MediaElement for PolicyElement {
        fn set_event_sink(&self, _sink: Option<NativeEventSink>) {}
        fn set_src(&self, _src: Option<&ElementSource>) {}
        fn src(&self) -> Option<String> {
            None
        }
        fn load(&self) {}
        async fn play(&self) -> std::result::Result<(), PlayRejection> {
            *self.plays.lock() += 1;
            let outcome = if *self.is_muted.lock() {
                self.muted
            } else {
                self.unmuted
            };
            match outcome {
                Some(result) => result,
                None => futures::future::pending().await,
            }
        }
        fn pause(&self) {}
        fn paused(&self) -> bool {
            true
        }
        fn ended(&self) -> bool {
            false
        }
        fn seeking(&self) -> bool {
            false
        }
        fn current_time(&self) -> f64 {
            0.0
        }
        fn set_current_time(&self, _seconds: f64) {}
        fn duration(&self) -> f64 {
            1.0
        }
        fn seekable(&self) -> Vec<TimeRange> {
            Vec::new()
        }
        fn buffered(&self) -> Vec<TimeRange> {
            Vec::new()
        }
        fn volume(&self) -> f64 {
            1.0
        }
        fn set_volume(&self, _volume: f64) {}
        fn muted(&self) -> bool {
            *self.is_muted.lock()
        }
        fn set_muted(&self, muted: bool) {
            *self.is_muted.lock() = muted;
        }
        fn playback_rate(&self) -> f64 {
            1.0
        }
        fn set_playback_rate(&self, _rate: f64) {}
        fn video_size(&self) -> (u32, u32) {
            (0, 0)
        }
        fn error(&self) -> Option<NativeMediaError> {
            None
        }
        fn set_mounted(&self, _mounted: bool) {}
    }

    struct PolicyFactory {
        element: Arc<PolicyElement>,
    }

    impl MediaElementFactory for PolicyFactory {
        fn create_element(
            &self,
            _tag: &CapabilityTag,
        ) -> bridge_traits::error::Result<Arc<dyn MediaElement>> {
            Ok(self.element.clone())
        }
    }

    fn setup(
        unmuted: Option<std::result::Result<(), PlayRejection>>,
        muted: Option<std::result::Result<(), PlayRejection>>,
    ) -> (AutoplayNegotiator, ElementPool, Arc<PolicyElement>) {
        let element = Arc::new(PolicyElement {
            unmuted,
            muted,
            is_muted: Mutex::new(false),
            plays: Mutex::new(0),
        });
        let pool = ElementPool::new(
            Arc::new(PolicyFactory {
                element: element.clone(),
            }),
            1,
        );
        (
            AutoplayNegotiator::new(&PlayerConfig::default()),
            pool,
            element,
        )
    }

    #[tokio::test]
    async fn unmuted_success_is_enabled() {
        let (mut negotiator, mut pool, _) = setup(Some(Ok(())), Some(Ok(())));
        let check = negotiator
            .probe(&mut pool, Generation::new().advance(), false, true)
            .unwrap();
        assert_eq!(check.future.await, AutoplayDecision::Enabled);
    }

    #[tokio::test]
    async fn falls_back_to_muted_when_allowed() {
        let (mut negotiator, mut pool, _) =
            setup(Some(Err(PlayRejection::NotAllowed)), Some(Ok(())));
        let check = negotiator
            .probe(&mut pool, Generation::new().advance(), false, true)
            .unwrap();
        assert_eq!(check.future.await, AutoplayDecision::Muted);
        assert_eq!(negotiator.cached(false, true), Some(AutoplayDecision::Muted));
    }

    #[tokio::test]
    async fn no_muted_fallback_means_disabled() {
        let (mut negotiator, mut pool, element) =
            setup(Some(Err(PlayRejection::NotAllowed)), Some(Ok(())));
        let check = negotiator
            .probe(&mut pool, Generation::new().advance(), false, false)
            .unwrap();
        assert_eq!(check.future.await, AutoplayDecision::Disabled);
        assert_eq!(*element.plays.lock(), 1);
    }

    #[tokio::test]
    async fn results_are_memoized_per_combination() {
        let (mut negotiator, mut pool, element) = setup(Some(Ok(())), Some(Ok(())));
        let generation = Generation::new();
        let first = negotiator
            .probe(&mut pool, generation.advance(), false, true)
            .unwrap();
        first.future.await;
        let second = negotiator
            .probe(&mut pool, generation.advance(), false, true)
            .unwrap();
        second.future.await;
        assert_eq!(*element.plays.lock(), 1);

        let muted = negotiator
            .probe(&mut pool, generation.advance(), true, true)
            .unwrap();
        assert_eq!(muted.future.await, AutoplayDecision::Enabled);
        assert_eq!(*element.plays.lock(), 2);
        assert_eq!(pool.stats(&CapabilityTag::PROBE).created, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_play_times_out_as_disabled() {
        let (mut negotiator, mut pool, _) = setup(None, None);
        let check = negotiator
            .probe(&mut pool, Generation::new().advance(), false, true)
            .unwrap();
        assert_eq!(check.future.await, AutoplayDecision::Disabled);
    }

    #[tokio::test]
    async fn evicted_probes_run_again_and_release_returns_element() {
        let (mut negotiator, mut pool, element) =
            setup(Some(Err(PlayRejection::NotAllowed)), Some(Err(PlayRejection::NotAllowed)));
        let check = negotiator
            .probe(&mut pool, Generation::new().advance(), false, true)
            .unwrap();
        assert_eq!(check.future.clone().await, AutoplayDecision::Disabled);
        negotiator.forget(&check);
        assert_eq!(negotiator.cached(false, true), None);

        let again = negotiator
            .probe(&mut pool, Generation::new().advance(), false, true)
            .unwrap();
        again.future.await;
        assert_eq!(*element.plays.lock(), 4);

        negotiator.release(&mut pool);
        assert_eq!(pool.stats(&CapabilityTag::PROBE).leased, 0);
    }

    #[tokio::test]
    async fn forgetting_a_replaced_probe_keeps_the_newer_one() {
        let (mut negotiator, mut pool, _) = setup(Some(Ok(())), Some(Ok(())));
        let old = negotiator
            .probe(&mut pool, Generation::new().advance(), false, true)
            .unwrap();
        negotiator.forget(&old);
        let fresh = negotiator
            .probe(&mut pool, Generation::new().advance(), false, true)
            .unwrap();
        fresh.future.clone().await;

        negotiator.forget(&old);
        assert_eq!(negotiator.cached(false, true), Some(AutoplayDecision::Enabled));
    }

    #[tokio::test]
    async fn abandoned_probe_leaves_the_cache() {
        let (mut negotiator, mut pool, element) = setup(None, None);
        let check = negotiator
            .probe(&mut pool, Generation::new().advance(), false, true)
            .unwrap();
        let mut pending = check.future.clone();
        assert!(futures::poll!(&mut pending).is_pending());
        assert_eq!(*element.plays.lock(), 1);

        negotiator.forget(&check);
        assert_eq!(negotiator.cached(false, true), None);
        drop(pending);

        // A later probe starts over on the same element.
        let again = negotiator
            .probe(&mut pool, Generation::new().advance(), false, true)
            .unwrap();
        assert!(!again.future.ptr_eq(&check.future));
        assert_eq!(pool.stats(&CapabilityTag::PROBE).created, 1);
    }
}
