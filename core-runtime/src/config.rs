//! # Core Configuration Module
//!
//! Holds the host bridges a player needs.
//!
//! ## Overview
//!
//! The configuration uses a builder to construct a `CoreConfig` and fails fast
//! when a required bridge is missing, so integration mistakes surface at
//! startup rather than on the first play attempt.
//!
//! ## Required Dependencies
//!
//! - `MediaElementFactory` - creates native media elements for the pool
//!
//! ## Optional Dependencies
//!
//! - `HttpClient` - fetches sideloaded caption files. Without it, sideloaded
//!   tracks are dropped with a warning when selected.
//! - `Clock` - time source for load-time measurement (defaults to `SystemClock`)
//! - `LoggerSink` - forwards structured logs to the host
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .element_factory(Arc::new(DomElementFactory::new(container)))
//!     .http_client(Arc::new(FetchHttpClient::new()))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, LoggerSink, MediaElementFactory, SystemClock};
use std::sync::Arc;

/// Host bridges injected into a player instance.
#[derive(Clone)]
pub struct CoreConfig {
    /// Creates native media elements (required)
    pub element_factory: Arc<dyn MediaElementFactory>,

    /// Fetches sideloaded caption files (optional)
    pub http_client: Option<Arc<dyn HttpClient>>,

    /// Time source
    pub clock: Arc<dyn Clock>,

    /// Host log pipeline (optional)
    pub logger_sink: Option<Arc<dyn LoggerSink>>,

    /// Capacity of the host event bus
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("element_factory", &"MediaElementFactory { ... }")
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field("clock", &"Clock { ... }")
            .field(
                "logger_sink",
                &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"),
            )
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size > 65_536 {
            return Err(Error::Config(
                "Event buffer size exceeds maximum of 65,536 events".to_string(),
            ));
        }

        Ok(())
    }
}

fn element_factory_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "MediaElementFactory".to_string(),
        message: "A MediaElementFactory is required to create native media elements. \
                 Web: use bridge_wasm::DomElementFactory with the player container. \
                 Tests: inject a scripted element factory."
            .to_string(),
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    element_factory: Option<Arc<dyn MediaElementFactory>>,
    http_client: Option<Arc<dyn HttpClient>>,
    clock: Option<Arc<dyn Clock>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the media element factory (required).
    pub fn element_factory(mut self, factory: Arc<dyn MediaElementFactory>) -> Self {
        self.element_factory = Some(factory);
        self
    }

    /// Sets the HTTP client used for sideloaded captions.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Overrides the time source. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the host logger sink.
    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    /// Sets the event bus capacity.
    ///
    /// Default: 256 events
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig`.
    ///
    /// # Errors
    ///
    /// - `CapabilityMissing` when no element factory was provided
    /// - `Config` when a value is out of range
    pub fn build(self) -> Result<CoreConfig> {
        let element_factory = self
            .element_factory
            .ok_or_else(element_factory_missing_error)?;

        let config = CoreConfig {
            element_factory,
            http_client: self.http_client,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            logger_sink: self.logger_sink,
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{CapabilityTag, MediaElement};
    use chrono::{DateTime, TimeZone, Utc};
    use mockall::mock;

    mock! {
        ElementFactory {}

        impl MediaElementFactory for ElementFactory {
            fn create_element(
                &self,
                tag: &CapabilityTag,
            ) -> bridge_traits::error::Result<Arc<dyn MediaElement>>;
            fn release_element(&self, element: &Arc<dyn MediaElement>);
        }
    }

    struct FrozenClock;

    impl Clock for FrozenClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.timestamp_opt(1_700_000_000, 0).unwrap()
        }
    }

    #[test]
    fn test_builder_requires_element_factory() {
        let result = CoreConfig::builder().build();

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("MediaElementFactory"));
        assert!(err_msg.contains("Capability missing"));
    }

    #[test]
    fn test_builder_defaults() {
        let config = CoreConfig::builder()
            .element_factory(Arc::new(MockElementFactory::new()))
            .build()
            .unwrap();

        assert!(config.http_client.is_none());
        assert!(config.logger_sink.is_none());
        assert_eq!(
            config.event_buffer_size,
            crate::events::DEFAULT_EVENT_BUFFER_SIZE
        );
        assert!(config.clock.unix_timestamp_millis() > 0);
    }

    #[test]
    fn test_builder_custom_clock() {
        let config = CoreConfig::builder()
            .element_factory(Arc::new(MockElementFactory::new()))
            .clock(Arc::new(FrozenClock))
            .build()
            .unwrap();

        assert_eq!(config.clock.unix_timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_validate_rejects_zero_buffer() {
        let result = CoreConfig::builder()
            .element_factory(Arc::new(MockElementFactory::new()))
            .event_buffer_size(0)
            .build();

        assert!(result.unwrap_err().to_string().contains("greater than 0"));
    }

    #[test]
    fn test_debug_hides_bridges() {
        let config = CoreConfig::builder()
            .element_factory(Arc::new(MockElementFactory::new()))
            .build()
            .unwrap();

        let rendered = format!("{:?}", config);
        assert!(rendered.contains("MediaElementFactory { ... }"));
        assert!(rendered.contains("http_client: None"));
    }
}
