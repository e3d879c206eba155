//! # Element Pool
//!
//! Bounded set of reusable native media elements, keyed by capability tag
//! and scoped to one player instance.
//!
//! Elements move out of the pool as [`PooledElement`] leases and come back
//! through [`ElementPool::checkin`], which recycles them (paused, listeners
//! stripped, source cleared, unmounted) before they become available again.
//! Recycling happens synchronously inside `checkin`, so an element is never
//! handed out while it is still being torn down. Elements are only released
//! to the host when the pool is drained on destroy.

use crate::error::{PlaybackError, Result};
use bridge_traits::{BridgeError, CapabilityTag, MediaElement, MediaElementFactory};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Exclusive lease on a pooled element.
///
/// Not `Clone`: a lease is held by exactly one controller at a time.
pub struct PooledElement {
    id: u64,
    tag: CapabilityTag,
    element: Arc<dyn MediaElement>,
}

impl PooledElement {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn tag(&self) -> &CapabilityTag {
        &self.tag
    }

    pub fn element(&self) -> &Arc<dyn MediaElement> {
        &self.element
    }
}

impl fmt::Debug for PooledElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledElement")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .finish()
    }
}

struct Slot {
    id: u64,
    element: Arc<dyn MediaElement>,
}

#[derive(Default)]
struct TagState {
    idle: Vec<Slot>,
    leased: usize,
}

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolStats {
    pub created: usize,
    pub idle: usize,
    pub leased: usize,
}

pub struct ElementPool {
    factory: Arc<dyn MediaElementFactory>,
    capacity: usize,
    tags: HashMap<CapabilityTag, TagState>,
    next_id: u64,
    created: usize,
    drained: bool,
}

impl ElementPool {
    /// Create a pool holding at most `capacity` elements per tag.
    pub fn new(factory: Arc<dyn MediaElementFactory>, capacity: usize) -> Self {
        Self {
            factory,
            capacity,
            tags: HashMap::new(),
            next_id: 0,
            created: 0,
            drained: false,
        }
    }

    /// Take an element for `tag`, reusing a recycled one when available.
    pub fn checkout(&mut self, tag: &CapabilityTag) -> Result<PooledElement> {
        if self.drained {
            return Err(PlaybackError::Destroyed);
        }

        let state = self.tags.entry(tag.clone()).or_default();
        if let Some(slot) = state.idle.pop() {
            state.leased += 1;
            trace!(tag = %tag, element_id = slot.id, "Reusing pooled element");
            return Ok(PooledElement {
                id: slot.id,
                tag: tag.clone(),
                element: slot.element,
            });
        }

        if state.leased >= self.capacity {
            return Err(PlaybackError::Bridge(BridgeError::ElementUnavailable(
                format!("all {} '{}' elements are in use", self.capacity, tag),
            )));
        }

        let element = self.factory.create_element(tag)?;
        state.leased += 1;
        self.next_id += 1;
        self.created += 1;
        debug!(tag = %tag, element_id = self.next_id, "Created media element");

        Ok(PooledElement {
            id: self.next_id,
            tag: tag.clone(),
            element,
        })
    }

    /// Recycle a lease and make its element available again.
    pub fn checkin(&mut self, lease: PooledElement) {
        recycle(lease.element.as_ref());

        if self.drained {
            self.factory.release_element(&lease.element);
            return;
        }

        let state = self.tags.entry(lease.tag.clone()).or_default();
        state.leased = state.leased.saturating_sub(1);
        trace!(tag = %lease.tag, element_id = lease.id, "Recycled media element");
        state.idle.push(Slot {
            id: lease.id,
            element: lease.element,
        });
    }

    /// Release every idle element to the host. Leases returned afterwards are
    /// released directly.
    pub fn drain(&mut self) {
        self.drained = true;
        for (_, state) in self.tags.drain() {
            for slot in state.idle {
                self.factory.release_element(&slot.element);
            }
        }
        debug!(created = self.created, "Element pool drained");
    }

    pub fn stats(&self, tag: &CapabilityTag) -> PoolStats {
        let state = self.tags.get(tag);
        PoolStats {
            created: self.created,
            idle: state.map(|s| s.idle.len()).unwrap_or(0),
            leased: state.map(|s| s.leased).unwrap_or(0),
        }
    }

    pub fn is_drained(&self) -> bool {
        self.drained
    }
}

impl fmt::Debug for ElementPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementPool")
            .field("capacity", &self.capacity)
            .field("created", &self.created)
            .field("drained", &self.drained)
            .finish()
    }
}

fn recycle(element: &dyn MediaElement) {
    element.pause();
    element.set_event_sink(None);
    element.set_src(None);
    element.load();
    element.set_mounted(false);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{
        ElementSource, NativeEventSink, NativeMediaError, PlayRejection, TimeRange,
    };
    use parking_lot::Mutex;

    #[derive(Default)]
    struct StubElement {
        src: Mutex<Option<String>>,
        has_sink: Mutex<bool>,
        mounted: Mutex<bool>,
    }

    #[async_trait::async_trait]
    impl MediaElement for StubElement {
        fn set_event_sink(&self, sink: Option<NativeEventSink>) {
            *self.has_sink.lock() = sink.is_some();
        }
        fn set_src(&self, src: Option<&ElementSource>) {
            *self.src.lock() = src.map(|s| s.url.clone());
        }
        fn src(&self) -> Option<String> {
            self.src.lock().clone()
        }
        fn load(&self) {}
        async fn play(&self) -> std::result::Result<(), PlayRejection> {
            Ok(())
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
            f64::NAN
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
            false
        }
        fn set_muted(&self, _muted: bool) {}
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
        fn set_mounted(&self, mounted: bool) {
            *self.mounted.lock() = mounted;
        }
    }

    #[derive(Default)]
    struct StubFactory {
        released: Mutex<usize>,
    }

    impl MediaElementFactory for StubFactory {
        fn create_element(
            &self,
            _tag: &CapabilityTag,
        ) -> bridge_traits::error::Result<Arc<dyn MediaElement>> {
            Ok(Arc::new(StubElement::default()))
        }

        fn release_element(&self, _element: &Arc<dyn MediaElement>) {
            *self.released.lock() += 1;
        }
    }

    #[test]
    fn checkin_recycles_before_reuse() {
        let mut pool = ElementPool::new(Arc::new(StubFactory::default()), 2);
        let lease = pool.checkout(&CapabilityTag::HTML5).unwrap();
        let first_id = lease.id();
        lease
            .element()
            .set_src(Some(&ElementSource::new("https://e.com/a.mp4", None)));
        lease.element().set_mounted(true);

        pool.checkin(lease);
        let again = pool.checkout(&CapabilityTag::HTML5).unwrap();
        assert_eq!(again.id(), first_id);
        assert_eq!(again.element().src(), None);
        assert_eq!(pool.stats(&CapabilityTag::HTML5).created, 1);
    }

    #[test]
    fn capacity_is_per_tag() {
        let mut pool = ElementPool::new(Arc::new(StubFactory::default()), 1);
        let _content = pool.checkout(&CapabilityTag::HTML5).unwrap();
        let _ad = pool.checkout(&CapabilityTag::AD).unwrap();
        let err = pool.checkout(&CapabilityTag::HTML5).unwrap_err();
        assert!(matches!(
            err,
            PlaybackError::Bridge(BridgeError::ElementUnavailable(_))
        ));
    }

    #[test]
    fn drain_releases_idle_and_late_leases() {
        let factory = Arc::new(StubFactory::default());
        let mut pool = ElementPool::new(factory.clone(), 3);
        let idle = pool.checkout(&CapabilityTag::HTML5).unwrap();
        let late = pool.checkout(&CapabilityTag::HTML5).unwrap();
        pool.checkin(idle);

        pool.drain();
        assert_eq!(*factory.released.lock(), 1);

        pool.checkin(late);
        assert_eq!(*factory.released.lock(), 2);
        assert!(matches!(
            pool.checkout(&CapabilityTag::HTML5),
            Err(PlaybackError::Destroyed)
        ));
    }
}
