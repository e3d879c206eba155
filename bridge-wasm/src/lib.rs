//! WebAssembly Bridge Implementations
//!
//! This crate provides browser implementations of the bridge traits defined
//! in `bridge-traits`, built on `web-sys` and `wasm-bindgen`.
//!
//! # Platform Support
//!
//! This crate is designed exclusively for the `wasm32-unknown-unknown` target.
//! It will not compile for native targets.
//!
//! # Implementations
//!
//! - `WebMediaElement`: `HTMLMediaElement` adapter forwarding DOM media events
//! - `DomElementFactory`: creates pooled `<video>` elements in the player container
//! - `CaptionFetchClient`: `fetch`-backed client for sideloaded caption files
//!
//! # Examples
//!
//! ```ignore
//! use bridge_wasm::{build_wasm_bridges, WasmBridgeConfig};
//!
//! let bridges = build_wasm_bridges(WasmBridgeConfig::new(container))?;
//! let core = CoreConfig::builder()
//!     .element_factory(bridges.element_factory())
//!     .http_client(bridges.http())
//!     .build()?;
//! ```

#![cfg(target_arch = "wasm32")]
#![warn(missing_docs)]

pub mod bootstrap;
pub mod error;
pub mod http;
pub mod media_element;

// Re-export commonly used types
pub use bootstrap::{build_wasm_bridges, WasmBridgeConfig, WasmBridgeSet};
pub use error::{WasmError, WasmResult};
pub use http::{CaptionFetchClient, DEFAULT_CAPTION_TIMEOUT};
pub use media_element::{DomElementFactory, WebMediaElement};
