//! Platform-specific helper abstractions used to keep trait bounds aligned with
//! the threading guarantees of each target.
//!
//! Native targets require `Send + Sync` so bridge implementations can be shared
//! freely across async tasks. WebAssembly builds run on the browser's single
//! thread and cannot satisfy those bounds because `web_sys` handles (media
//! elements, event listeners, promises) are not thread-safe. The helpers below
//! make the required bounds conditional without duplicating every trait
//! definition.

use std::future::Future;

/// Marker trait that applies `Send + Sync` on native targets while becoming a
/// no-op on `wasm32`.
#[cfg(not(target_arch = "wasm32"))]
pub trait PlatformSendSync: Send + Sync {}

#[cfg(not(target_arch = "wasm32"))]
impl<T> PlatformSendSync for T where T: Send + Sync {}

#[cfg(target_arch = "wasm32")]
pub trait PlatformSendSync {}

#[cfg(target_arch = "wasm32")]
impl<T> PlatformSendSync for T {}

/// Marker trait equivalent to `Send` on native targets.
#[cfg(not(target_arch = "wasm32"))]
pub trait PlatformSend: Send {}

#[cfg(not(target_arch = "wasm32"))]
impl<T> PlatformSend for T where T: Send {}

#[cfg(target_arch = "wasm32")]
pub trait PlatformSend {}

#[cfg(target_arch = "wasm32")]
impl<T> PlatformSend for T {}

/// Boxed future that is `Send` on native targets and local on `wasm32`.
///
/// Play requests, provider construction and autoplay probes hand these out so
/// callers can await them after releasing any lock on player state.
#[cfg(not(target_arch = "wasm32"))]
pub type PlatformFuture<'a, T> = futures::future::BoxFuture<'a, T>;

#[cfg(target_arch = "wasm32")]
pub type PlatformFuture<'a, T> = futures::future::LocalBoxFuture<'a, T>;

/// Box a future into a [`PlatformFuture`].
#[cfg(not(target_arch = "wasm32"))]
pub fn box_future<'a, F>(future: F) -> PlatformFuture<'a, F::Output>
where
    F: Future + Send + 'a,
{
    Box::pin(future)
}

/// Box a future into a [`PlatformFuture`].
#[cfg(target_arch = "wasm32")]
pub fn box_future<'a, F>(future: F) -> PlatformFuture<'a, F::Output>
where
    F: Future + 'a,
{
    Box::pin(future)
}
