//! Provider selection.

use super::{Html5ProviderFactory, ProviderFactory};
use crate::model::PlaylistItem;
use std::fmt;
use std::sync::Arc;

/// Ordered list of provider factories.
///
/// Selection is first-match in registration order against the item's first
/// source.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: Vec<Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in HTML5 provider.
    pub fn with_defaults(native_hls: bool) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Html5ProviderFactory::new(native_hls)));
        registry
    }

    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories.push(factory);
    }

    /// Put `factory` ahead of every registered one.
    pub fn register_first(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories.insert(0, factory);
    }

    pub fn select(&self, item: &PlaylistItem) -> Option<Arc<dyn ProviderFactory>> {
        let source = item.sources.first()?;
        self.factories
            .iter()
            .find(|factory| factory.supports(source))
            .cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|f| f.name()).collect()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("factories", &self.names())
            .finish()
    }
}
