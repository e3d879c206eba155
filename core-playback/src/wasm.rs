//! WebAssembly bindings for core-playback
//!
//! Exposes [`Player`] to JavaScript through wasm-bindgen. The binding owns the
//! checkpoint loops a browser host would otherwise have to schedule: native
//! media events are pumped every [`EVENT_PUMP_INTERVAL`] and the polling tick
//! runs at the configured `stall_poll_interval`.

use crate::config::PlayerConfig;
use crate::error::PlaybackError;
use crate::model::PlaylistItem;
use crate::player::Player;
use crate::timer;
use bridge_wasm::{build_wasm_bridges, WasmBridgeConfig};
use core_runtime::config::CoreConfig;
use core_runtime::events::{PauseReason, PlayReason};
use js_sys::{Function as JsFunction, Promise};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, trace, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};
use web_sys::HtmlElement;

/// How often queued native media events are processed.
const EVENT_PUMP_INTERVAL: Duration = Duration::from_millis(50);

fn to_js_error<E: std::fmt::Display>(err: E) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Enable Rust logging to browser console
/// Call this once at startup to see tracing logs in DevTools
#[wasm_bindgen(js_name = enableConsoleLogging)]
pub fn enable_console_logging() {
    use bridge_traits::time::LogLevel;
    use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};

    #[cfg(feature = "wasm")]
    console_error_panic_hook::set_once();

    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug);

    let _ = init_logging(config);
    web_sys::console::log_1(&"Rust console logging enabled (tracing-wasm)".into());
}

/// JavaScript-accessible player.
///
/// ```javascript
/// const player = new JsPlayer(document.getElementById('player'), { autostart: true });
/// player.onEvent((event) => console.log(event.type, event.payload));
/// await player.load([{ file: 'https://cdn.example.com/video.m3u8' }]);
/// ```
#[wasm_bindgen]
pub struct JsPlayer {
    player: Player,
}

#[wasm_bindgen]
impl JsPlayer {
    /// Create a player mounting its media elements into `container`.
    ///
    /// `config` is a (possibly partial) player configuration object.
    #[wasm_bindgen(constructor)]
    pub fn new(container: HtmlElement, config: JsValue) -> Result<JsPlayer, JsValue> {
        let config: PlayerConfig = if config.is_undefined() || config.is_null() {
            PlayerConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config).map_err(to_js_error)?
        };

        let bridges =
            build_wasm_bridges(WasmBridgeConfig::new(container)).map_err(to_js_error)?;
        let core = CoreConfig::builder()
            .element_factory(bridges.element_factory())
            .http_client(bridges.http())
            .build()
            .map_err(to_js_error)?;

        let poll_interval = config.stall_poll_interval;
        let player = Player::new(config, core).map_err(to_js_error)?;

        spawn_checkpoint_loops(player.clone(), poll_interval);
        Ok(JsPlayer { player })
    }

    /// Register a listener receiving every player event as
    /// `{ type, payload }`.
    #[wasm_bindgen(js_name = onEvent)]
    pub fn on_event(&self, callback: JsFunction) {
        let mut events = self.player.events();
        spawn_local(async move {
            loop {
                match events.recv().await {
                    Ok(event) => match serde_wasm_bindgen::to_value(&event) {
                        Ok(value) => {
                            if let Err(err) = callback.call1(&JsValue::NULL, &value) {
                                warn!(error = ?err, "Event listener threw");
                            }
                        }
                        Err(err) => warn!(error = %err, "Failed to serialize event"),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    /// Replace the playlist. `items` is an array of playlist item objects.
    pub fn load(&self, items: JsValue) -> Result<Promise, JsValue> {
        let items: Vec<PlaylistItem> =
            serde_wasm_bindgen::from_value(items).map_err(to_js_error)?;
        let player = self.player.clone();
        Ok(future_to_promise(async move {
            player.load(items).await.map_err(to_js_error)?;
            Ok(JsValue::UNDEFINED)
        }))
    }

    /// Start (or resume) playback on behalf of the host page.
    pub fn play(&self) -> Promise {
        let player = self.player.clone();
        future_to_promise(async move {
            player
                .play(PlayReason::External)
                .await
                .map_err(to_js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn pause(&self) -> Result<(), JsValue> {
        self.player
            .pause(PauseReason::External)
            .map_err(to_js_error)
    }

    pub fn stop(&self) -> Result<(), JsValue> {
        self.player.stop().map_err(to_js_error)
    }

    pub fn seek(&self, position: f64) -> Promise {
        let player = self.player.clone();
        future_to_promise(async move {
            player.seek(position).await.map_err(to_js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn next(&self) -> Promise {
        let player = self.player.clone();
        future_to_promise(async move {
            player.next().await.map_err(to_js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = playlistItem)]
    pub fn playlist_item(&self, index: usize) -> Promise {
        let player = self.player.clone();
        future_to_promise(async move {
            player.playlist_item(index).await.map_err(to_js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = setVolume)]
    pub fn set_volume(&self, volume: u8) -> Result<(), JsValue> {
        self.player.set_volume(volume).map_err(to_js_error)
    }

    #[wasm_bindgen(js_name = setMute)]
    pub fn set_mute(&self, muted: bool) -> Result<(), JsValue> {
        self.player.set_mute(muted).map_err(to_js_error)
    }

    #[wasm_bindgen(js_name = setPlaybackRate)]
    pub fn set_playback_rate(&self, rate: f64) -> Result<(), JsValue> {
        self.player.set_playback_rate(rate).map_err(to_js_error)
    }

    #[wasm_bindgen(js_name = setCurrentQuality)]
    pub fn set_current_quality(&self, index: usize) -> Promise {
        let player = self.player.clone();
        future_to_promise(async move {
            player.set_current_quality(index).await.map_err(to_js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = setCurrentCaptions)]
    pub fn set_current_captions(&self, index: usize) -> Promise {
        let player = self.player.clone();
        future_to_promise(async move {
            player
                .set_current_captions(index)
                .await
                .map_err(to_js_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = setCurrentAudioTrack)]
    pub fn set_current_audio_track(&self, index: usize) -> Result<(), JsValue> {
        self.player
            .set_current_audio_track(index)
            .map_err(to_js_error)
    }

    #[wasm_bindgen(js_name = setFullscreen)]
    pub fn set_fullscreen(&self, fullscreen: bool) -> Result<(), JsValue> {
        self.player.set_fullscreen(fullscreen).map_err(to_js_error)
    }

    #[wasm_bindgen(js_name = setViewable)]
    pub fn set_viewable(&self, viewable: bool) -> Result<(), JsValue> {
        self.player.set_viewable(viewable).map_err(to_js_error)
    }

    pub fn resize(&self, width: u32, height: u32) -> Result<(), JsValue> {
        self.player.resize(width, height).map_err(to_js_error)
    }

    /// Current host-visible model as a plain object.
    #[wasm_bindgen(js_name = getModel)]
    pub fn get_model(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.player.model()).map_err(to_js_error)
    }

    pub fn destroy(&self) {
        self.player.destroy();
    }
}

/// Run the event pump and the polling tick until the player is destroyed.
/// Work a checkpoint queues is settled on its own task so a slow play or
/// fetch never delays the next checkpoint.
fn spawn_checkpoint_loops(player: Player, poll_interval: Duration) {
    spawn_checkpoint_loop(player.clone(), EVENT_PUMP_INTERVAL, false);
    spawn_checkpoint_loop(player, poll_interval, true);
}

fn spawn_checkpoint_loop(player: Player, interval: Duration, tick: bool) {
    spawn_local(async move {
        loop {
            timer::sleep(interval).await;
            match player.checkpoint(tick) {
                Ok(true) => {
                    let driver = player.clone();
                    spawn_local(async move { driver.drive_deferred().await });
                }
                Ok(false) => {}
                Err(PlaybackError::Destroyed) => {
                    debug!(tick, "Checkpoint loop stopped");
                    break;
                }
                Err(e) => trace!(tick, error = %e, "Checkpoint skipped"),
            }
        }
    });
}
