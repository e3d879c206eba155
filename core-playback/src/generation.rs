//! Generation tokens.
//!
//! Every operation that awaits native work (provider construction, `play()`,
//! autoplay probes, caption fetches) captures a [`GenerationToken`] before it
//! suspends. A competing operation advances the [`Generation`], and the
//! continuation checks [`GenerationToken::is_current`] before applying any
//! effect, turning superseded work into a silent no-op.
//!
//! Work that may never settle on its own (an autoplay probe against a
//! hanging element) races itself against [`GenerationToken::superseded`] so
//! it is dropped, timers included, as soon as it is invalidated.

use std::sync::Arc;
use tokio::sync::watch;

/// Monotonic invalidation counter shared with the tokens it hands out.
#[derive(Debug, Clone)]
pub struct Generation {
    counter: Arc<watch::Sender<u64>>,
}

impl Default for Generation {
    fn default() -> Self {
        let (counter, _) = watch::channel(0);
        Self {
            counter: Arc::new(counter),
        }
    }
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate all outstanding tokens and return a fresh one.
    pub fn advance(&self) -> GenerationToken {
        self.counter.send_modify(|value| *value += 1);
        self.current()
    }

    /// Token for the current generation without invalidating anything.
    pub fn current(&self) -> GenerationToken {
        GenerationToken {
            counter: Arc::clone(&self.counter),
            value: *self.counter.borrow(),
        }
    }

    /// Invalidate all outstanding tokens.
    pub fn invalidate(&self) {
        self.counter.send_modify(|value| *value += 1);
    }

    pub fn value(&self) -> u64 {
        *self.counter.borrow()
    }
}

/// Snapshot of a [`Generation`] taken when async work started.
#[derive(Debug, Clone)]
pub struct GenerationToken {
    counter: Arc<watch::Sender<u64>>,
    value: u64,
}

impl GenerationToken {
    /// `false` once a newer operation superseded this one.
    pub fn is_current(&self) -> bool {
        *self.counter.borrow() == self.value
    }

    /// Resolves once this token is no longer current. Resolves immediately
    /// for a token that is already stale.
    pub async fn superseded(&self) {
        let mut changes = self.counter.subscribe();
        let value = self.value;
        // The sender lives as long as `self`, so this only returns Ok.
        let _ = changes.wait_for(|current| *current != value).await;
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}

impl PartialEq for GenerationToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.counter, &other.counter) && self.value == other.value
    }
}

impl Eq for GenerationToken {}
