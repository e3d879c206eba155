//! # Player Configuration
//!
//! Per-instance playback settings. Every field has a serde default so hosts
//! can pass a partial JSON object.

use crate::error::{Localization, PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tiny silent MP4 used by the autoplay probe.
pub const DEFAULT_AUTOPLAY_PROBE_SOURCE: &str = "data:video/mp4;base64,AAAAHGZ0eXBpc29tAAACAGlzb21pc28ybXA0MQAAAAhmcmVlAAAAvG1kYXQ=";

/// How eagerly items are loaded before playback is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Preload {
    /// Nothing is fetched until `play`.
    None,
    /// Metadata is fetched when the item becomes active.
    #[default]
    Metadata,
    /// The item is loaded as soon as it becomes active.
    Auto,
}

/// Caption preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionsConfig {
    /// Label selected in a previous session; used as the default hint.
    #[serde(default)]
    pub persisted_label: Option<String>,
}

/// Player configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Start playback of the first item without a user gesture.
    ///
    /// Default: false.
    #[serde(default)]
    pub autostart: bool,

    /// Start muted.
    #[serde(default)]
    pub mute: bool,

    /// Initial volume, 0-100.
    ///
    /// Default: 90.
    #[serde(default = "default_volume")]
    pub volume: u8,

    /// Fall back to muted autostart when unmuted autostart is refused.
    ///
    /// Default: true.
    #[serde(default = "default_true")]
    pub allow_muted_autoplay: bool,

    /// Upper bound for one autoplay probe.
    ///
    /// Default: 10 seconds.
    #[serde(default = "default_autoplay_timeout")]
    pub autoplay_timeout: Duration,

    /// Source played by the autoplay probe element.
    #[serde(default = "default_autoplay_probe_source")]
    pub autoplay_probe_source: String,

    /// Minimum seekable window (seconds) for a live stream to count as DVR.
    ///
    /// Default: 120 seconds.
    #[serde(default = "default_dvr_window")]
    pub dvr_window: f64,

    /// Reloads attempted for decode errors (codes 3 and 4) before the error
    /// becomes fatal.
    ///
    /// Default: 3.
    #[serde(default = "default_decode_retry_limit")]
    pub decode_retry_limit: u32,

    /// Interval at which hosts are expected to call `Player::tick`.
    ///
    /// Default: 500 ms.
    #[serde(default = "default_stall_poll_interval")]
    pub stall_poll_interval: Duration,

    /// Elements kept per capability tag.
    ///
    /// Default: 3.
    #[serde(default = "default_element_pool_capacity")]
    pub element_pool_capacity: usize,

    /// Playback rates offered to the user.
    #[serde(default = "default_playback_rates")]
    pub playback_rates: Vec<f64>,

    /// Rate applied on load.
    ///
    /// Default: 1.0.
    #[serde(default = "default_playback_rate")]
    pub default_playback_rate: f64,

    #[serde(default)]
    pub preload: Preload,

    /// Let the element play HLS manifests natively (Safari, iOS).
    #[serde(default)]
    pub native_hls: bool,

    /// Wrap `next()` around the end of the playlist.
    #[serde(default)]
    pub repeat: bool,

    /// Index activated by `load`.
    #[serde(default)]
    pub playlist_start_index: usize,

    #[serde(default)]
    pub captions: CaptionsConfig,

    /// Quality label selected in a previous session.
    #[serde(default)]
    pub persisted_quality_label: Option<String>,

    #[serde(default)]
    pub localization: Localization,
}

fn default_volume() -> u8 {
    90
}

fn default_true() -> bool {
    true
}

fn default_autoplay_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_autoplay_probe_source() -> String {
    DEFAULT_AUTOPLAY_PROBE_SOURCE.to_string()
}

fn default_dvr_window() -> f64 {
    120.0
}

fn default_decode_retry_limit() -> u32 {
    3
}

fn default_stall_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_element_pool_capacity() -> usize {
    3
}

fn default_playback_rates() -> Vec<f64> {
    vec![0.5, 1.0, 1.25, 1.5, 2.0]
}

fn default_playback_rate() -> f64 {
    1.0
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            autostart: false,
            mute: false,
            volume: default_volume(),
            allow_muted_autoplay: default_true(),
            autoplay_timeout: default_autoplay_timeout(),
            autoplay_probe_source: default_autoplay_probe_source(),
            dvr_window: default_dvr_window(),
            decode_retry_limit: default_decode_retry_limit(),
            stall_poll_interval: default_stall_poll_interval(),
            element_pool_capacity: default_element_pool_capacity(),
            playback_rates: default_playback_rates(),
            default_playback_rate: default_playback_rate(),
            preload: Preload::default(),
            native_hls: false,
            repeat: false,
            playlist_start_index: 0,
            captions: CaptionsConfig::default(),
            persisted_quality_label: None,
            localization: Localization::default(),
        }
    }
}

/// Playback rates accepted by `set_playback_rate`.
pub const PLAYBACK_RATE_RANGE: std::ops::RangeInclusive<f64> = 0.25..=4.0;

impl PlayerConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.volume > 100 {
            return Err(invalid("volume", "must be between 0 and 100"));
        }

        if !(self.dvr_window.is_finite() && self.dvr_window > 0.0) {
            return Err(invalid("dvr_window", "must be a positive number of seconds"));
        }

        if self.autoplay_timeout.is_zero() {
            return Err(invalid("autoplay_timeout", "must be > 0"));
        }

        if self.element_pool_capacity == 0 {
            return Err(invalid("element_pool_capacity", "must be > 0"));
        }

        if let Some(rate) = self
            .playback_rates
            .iter()
            .chain(std::iter::once(&self.default_playback_rate))
            .find(|rate| !PLAYBACK_RATE_RANGE.contains(*rate))
        {
            return Err(invalid(
                "playback_rates",
                &format!("{} is outside 0.25-4", rate),
            ));
        }

        Ok(())
    }

    /// Parse a JSON configuration object, then validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PlayerConfig = serde_json::from_str(json).map_err(|e| {
            PlaybackError::InvalidArgument {
                field: "config",
                reason: e.to_string(),
            }
        })?;
        config.validate()?;
        Ok(config)
    }
}

fn invalid(field: &'static str, reason: &str) -> PlaybackError {
    PlaybackError::InvalidArgument {
        field,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PlayerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dvr_window, 120.0);
        assert_eq!(config.decode_retry_limit, 3);
        assert_eq!(config.autoplay_timeout, Duration::from_secs(10));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = PlayerConfig::from_json(r#"{"autostart":true,"dvr_window":60.0}"#).unwrap();
        assert!(config.autostart);
        assert_eq!(config.dvr_window, 60.0);
        assert_eq!(config.volume, 90);
        assert!(config.allow_muted_autoplay);
        assert_eq!(config.preload, Preload::Metadata);
    }

    #[test]
    fn rejects_out_of_range_rates() {
        let config = PlayerConfig {
            playback_rates: vec![1.0, 8.0],
            ..PlayerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("playback_rates"));
    }

    #[test]
    fn rejects_bad_volume_and_pool() {
        let loud = PlayerConfig {
            volume: 150,
            ..PlayerConfig::default()
        };
        assert!(loud.validate().is_err());

        let empty_pool = PlayerConfig {
            element_pool_capacity: 0,
            ..PlayerConfig::default()
        };
        assert!(empty_pool.validate().is_err());
    }
}
