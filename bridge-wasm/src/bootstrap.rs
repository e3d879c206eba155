//! Convenience helpers for wiring all wasm bridge implementations together.
//!
//! Host shells can use [`build_wasm_bridges`] to construct the adapters the
//! player core needs (media elements and caption fetching) without writing
//! repetitive glue code.

use std::sync::Arc;

use bridge_traits::{
    error::Result as BridgeResult, http::HttpClient, media::MediaElementFactory,
};
use web_sys::HtmlElement;

use crate::{http::CaptionFetchClient, media_element::DomElementFactory};

/// Configuration for [`build_wasm_bridges`].
#[derive(Debug, Clone)]
pub struct WasmBridgeConfig {
    /// Element the player's media surfaces are mounted into.
    pub container: HtmlElement,
    /// CSS class prefix applied to created media elements.
    pub class_prefix: String,
}

impl WasmBridgeConfig {
    /// Create a new config mounting media elements into `container`.
    pub fn new(container: HtmlElement) -> Self {
        Self {
            container,
            class_prefix: "player-media".to_string(),
        }
    }

    /// Override the CSS class prefix.
    pub fn with_class_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.class_prefix = prefix.into();
        self
    }
}

/// Fully constructed wasm bridge objects ready for injection into the core.
pub struct WasmBridgeSet {
    /// Creates `<video>` elements inside the player container.
    pub element_factory: Arc<dyn MediaElementFactory>,
    /// Caption file client powered by browser `fetch`.
    pub http_client: Arc<dyn HttpClient>,
}

impl WasmBridgeSet {
    /// Convenience accessor to clone the element factory.
    pub fn element_factory(&self) -> Arc<dyn MediaElementFactory> {
        Arc::clone(&self.element_factory)
    }

    /// Convenience accessor to clone the HTTP client.
    pub fn http(&self) -> Arc<dyn HttpClient> {
        Arc::clone(&self.http_client)
    }
}

/// Build the default wasm bridge stack.
///
/// Hosts call this during startup and pass the returned trait objects into
/// `core_runtime::config::CoreConfig`.
pub fn build_wasm_bridges(config: WasmBridgeConfig) -> BridgeResult<WasmBridgeSet> {
    let http_client: Arc<dyn HttpClient> = Arc::new(CaptionFetchClient::new()?);
    let element_factory: Arc<dyn MediaElementFactory> = Arc::new(
        DomElementFactory::new(config.container)?.with_class_prefix(config.class_prefix),
    );

    Ok(WasmBridgeSet {
        element_factory,
        http_client,
    })
}
