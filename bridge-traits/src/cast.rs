//! Cast Session Abstraction
//!
//! A cast session is a remote playback target (Chromecast, AirPlay receiver,
//! smart TV) the host has already connected to. The core hands it a media URL
//! and a start position and then polls it like any other provider.

use serde::{Deserialize, Serialize};

use crate::{error::Result, platform::PlatformSendSync};

/// Media descriptor sent to a cast receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastLoadRequest {
    pub url: String,
    pub mime_type: Option<String>,
    pub title: Option<String>,
    /// Position (seconds) the receiver should start from.
    pub start_position: f64,
}

/// Remote playback session exposed by the host.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::cast::{CastLoadRequest, CastSession};
///
/// async fn hand_over(session: &dyn CastSession, url: &str, position: f64) {
///     let request = CastLoadRequest {
///         url: url.to_string(),
///         mime_type: None,
///         title: None,
///         start_position: position,
///     };
///     session.load(request).await.ok();
/// }
/// ```
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait CastSession: PlatformSendSync {
    /// Friendly receiver name shown to the user.
    fn device_name(&self) -> String;

    /// Load media on the receiver.
    async fn load(&self, request: CastLoadRequest) -> Result<()>;

    /// Resume or start playback on the receiver.
    async fn play(&self) -> Result<()>;

    fn pause(&self);
    fn seek(&self, position: f64);
    fn set_volume(&self, volume: f64);
    fn set_muted(&self, muted: bool);

    /// End remote playback. The session itself stays connected.
    fn stop(&self);

    /// Last position reported by the receiver.
    fn position(&self) -> f64;

    /// Duration reported by the receiver, `NaN` until known.
    fn duration(&self) -> f64;

    fn is_paused(&self) -> bool;
}
