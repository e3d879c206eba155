//! # Playback Error Types
//!
//! Two layers of errors live here:
//!
//! - [`PlaybackError`]: what a host command returns (`Err` from `Player::play`,
//!   `Player::load`, ...).
//! - [`PlayerError`]: the host-visible error record carried by `error`,
//!   `warning` and `mediaError` events, identified by a stable [`ErrorCode`]
//!   and rendered through a [`Localization`] table.

use core_runtime::events::ErrorPayload;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Errors returned by player commands.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Setup Errors
    // ========================================================================
    /// The playlist contained no items.
    #[error("Playlist is empty")]
    EmptyPlaylist,

    /// A playlist item failed validation.
    #[error("Malformed playlist item {index}: {reason}")]
    MalformedItem { index: usize, reason: String },

    /// No registered provider can play any source of the item.
    #[error("No playable source for item {0}")]
    NoPlayableSource(usize),

    /// Playlist index out of range.
    #[error("Playlist index {index} out of range (playlist has {len} items)")]
    IndexOutOfRange { index: usize, len: usize },

    /// A provider could not be constructed.
    #[error("Provider '{provider}' failed to load: {reason}")]
    ProviderLoad { provider: String, reason: String },

    // ========================================================================
    // State Errors
    // ========================================================================
    /// Setup failed; only `load` and `destroy` are honored.
    #[error("Player is in error state ({0})")]
    SetupFailed(ErrorCode),

    /// No item is active yet.
    #[error("No playlist item is active")]
    NoActiveItem,

    /// The requested operation needs an active ad break.
    #[error("No ad break in progress")]
    NoAdBreak,

    /// An ad break is already running.
    #[error("Ad break already in progress")]
    AdBreakInProgress,

    /// The player was destroyed.
    #[error("Player destroyed")]
    Destroyed,

    // ========================================================================
    // Argument Errors
    // ========================================================================
    #[error("Invalid value for {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    // ========================================================================
    // Bridge Errors
    // ========================================================================
    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` if retrying the command later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlaybackError::ProviderLoad { .. } | PlaybackError::Bridge(_)
        )
    }

    /// Returns `true` if the player cannot continue without a new `load`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PlaybackError::EmptyPlaylist
                | PlaybackError::MalformedItem { .. }
                | PlaybackError::NoPlayableSource(_)
                | PlaybackError::SetupFailed(_)
                | PlaybackError::Destroyed
        )
    }

    /// Stable code for errors that surface as host `error` events.
    pub fn code(&self) -> ErrorCode {
        match self {
            PlaybackError::EmptyPlaylist => ErrorCode::PLAYLIST_EMPTY,
            PlaybackError::MalformedItem { .. } => ErrorCode::MALFORMED_PLAYLIST_ITEM,
            PlaybackError::NoPlayableSource(_) => ErrorCode::NO_PLAYABLE_SOURCE,
            PlaybackError::ProviderLoad { .. } => ErrorCode::PROVIDER_LOAD_FAILED,
            PlaybackError::SetupFailed(code) => *code,
            _ => ErrorCode::UNKNOWN,
        }
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

// ============================================================================
// Error Codes
// ============================================================================

/// Stable integer error code, grouped by phase.
///
/// | Range | Phase |
/// |-------|-------|
/// | 1xxxxx | setup |
/// | 2xxxxx | load / media element / live |
/// | 30xxxx | play attempts, caption warnings |
/// | 4xxxxx | ads |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    pub const UNKNOWN: ErrorCode = ErrorCode(100000);
    pub const PLAYLIST_LOAD_FAILED: ErrorCode = ErrorCode(102000);
    pub const PLAYLIST_EMPTY: ErrorCode = ErrorCode(102630);
    pub const MALFORMED_PLAYLIST_ITEM: ErrorCode = ErrorCode(102700);
    pub const PROVIDER_LOAD_FAILED: ErrorCode = ErrorCode(104000);

    pub const ITEM_LOAD_FAILED: ErrorCode = ErrorCode(202000);
    pub const NO_PLAYABLE_SOURCE: ErrorCode = ErrorCode(221000);
    /// Base for native `MediaError` codes; the element code is added to it.
    pub const MEDIA_ELEMENT_BASE: ErrorCode = ErrorCode(224000);
    pub const LIVE_STREAM_DOWN: ErrorCode = ErrorCode(230001);
    pub const DVR_UNAVAILABLE: ErrorCode = ErrorCode(230002);

    pub const PLAY_NOT_ALLOWED: ErrorCode = ErrorCode(303210);
    pub const PLAY_NOT_SUPPORTED: ErrorCode = ErrorCode(303220);
    pub const PLAY_ABORTED: ErrorCode = ErrorCode(303230);
    pub const CAPTION_FETCH_FAILED: ErrorCode = ErrorCode(306000);
    pub const CAPTION_PARSE_FAILED: ErrorCode = ErrorCode(306001);

    pub const AD_PROVIDER_ERROR: ErrorCode = ErrorCode(402000);
    pub const AD_BREAK_SETUP_FAILED: ErrorCode = ErrorCode(403000);

    /// Code for a native element error (`224000 + MediaError.code`).
    pub fn media_element(native_code: u16) -> ErrorCode {
        ErrorCode(Self::MEDIA_ELEMENT_BASE.0 + native_code as u32)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Message key a code resolves to.
    pub fn message_key(&self) -> MessageKey {
        match *self {
            ErrorCode::PLAYLIST_EMPTY
            | ErrorCode::MALFORMED_PLAYLIST_ITEM
            | ErrorCode::PLAYLIST_LOAD_FAILED => MessageKey::CantLoadPlaylist,
            ErrorCode::NO_PLAYABLE_SOURCE => MessageKey::CantPlayVideo,
            ErrorCode::LIVE_STREAM_DOWN => MessageKey::LiveStreamDown,
            ErrorCode::DVR_UNAVAILABLE => MessageKey::CantPlayVideo,
            ErrorCode::PLAY_NOT_ALLOWED
            | ErrorCode::PLAY_NOT_SUPPORTED
            | ErrorCode::PLAY_ABORTED => MessageKey::PlayAttemptFailed,
            ErrorCode::CAPTION_FETCH_FAILED | ErrorCode::CAPTION_PARSE_FAILED => {
                MessageKey::CaptionsUnavailable
            }
            ErrorCode::AD_PROVIDER_ERROR | ErrorCode::AD_BREAK_SETUP_FAILED => MessageKey::AdError,
            ErrorCode(code) if code == ErrorCode::media_element(2).0 => {
                MessageKey::ProtectedContent
            }
            ErrorCode(code) if (224000..225000).contains(&code) => MessageKey::CantPlayVideo,
            ErrorCode(code) if (200000..300000).contains(&code) => MessageKey::CantPlayVideo,
            _ => MessageKey::Generic,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Localization
// ============================================================================

/// Keys of the host-localizable message table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKey {
    Generic,
    CantLoadPlaylist,
    CantPlayVideo,
    LiveStreamDown,
    ProtectedContent,
    PlayAttemptFailed,
    CaptionsUnavailable,
    AdError,
    ErrorCodeLabel,
}

/// Host-supplied message table. Missing keys fall back to English.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Localization {
    #[serde(default)]
    pub messages: HashMap<MessageKey, String>,
}

impl Localization {
    pub fn with_message(mut self, key: MessageKey, text: impl Into<String>) -> Self {
        self.messages.insert(key, text.into());
        self
    }

    /// Text for `key`, host override first.
    pub fn text(&self, key: MessageKey) -> &str {
        self.messages
            .get(&key)
            .map(String::as_str)
            .unwrap_or_else(|| default_text(key))
    }
}

fn default_text(key: MessageKey) -> &'static str {
    match key {
        MessageKey::Generic => "An error occurred",
        MessageKey::CantLoadPlaylist => "This playlist can't be loaded",
        MessageKey::CantPlayVideo => "This video file cannot be played",
        MessageKey::LiveStreamDown => "The live stream is either down or has ended",
        MessageKey::ProtectedContent => "There was a problem providing access to protected content",
        MessageKey::PlayAttemptFailed => "Playback could not be started",
        MessageKey::CaptionsUnavailable => "Captions are unavailable",
        MessageKey::AdError => "The ad could not be played",
        MessageKey::ErrorCodeLabel => "Error Code",
    }
}

// ============================================================================
// Player Error Record
// ============================================================================

/// Error record published to the host and kept in the player model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerError {
    pub code: ErrorCode,
    pub key: MessageKey,
    pub source_error: Option<String>,
}

impl PlayerError {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            key: code.message_key(),
            source_error: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_error = Some(source.into());
        self
    }

    /// `"{text} ({Error Code}: {code})"`
    pub fn localized_message(&self, localization: &Localization) -> String {
        format!(
            "{} ({}: {})",
            localization.text(self.key),
            localization.text(MessageKey::ErrorCodeLabel),
            self.code
        )
    }

    pub fn to_payload(&self, localization: &Localization) -> ErrorPayload {
        ErrorPayload {
            code: self.code.value(),
            message: self.localized_message(localization),
            source_error: self.source_error.clone(),
        }
    }
}

impl From<&PlaybackError> for PlayerError {
    fn from(err: &PlaybackError) -> Self {
        PlayerError::new(err.code()).with_source(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_element_codes_are_offset() {
        assert_eq!(ErrorCode::media_element(3), ErrorCode(224003));
        assert_eq!(ErrorCode::media_element(4).message_key(), MessageKey::CantPlayVideo);
        assert_eq!(
            ErrorCode::media_element(2).message_key(),
            MessageKey::ProtectedContent
        );
    }

    #[test]
    fn localized_message_uses_overrides() {
        let localization = Localization::default()
            .with_message(MessageKey::CantPlayVideo, "Video kann nicht abgespielt werden")
            .with_message(MessageKey::ErrorCodeLabel, "Fehlercode");

        let err = PlayerError::new(ErrorCode::NO_PLAYABLE_SOURCE);
        assert_eq!(
            err.localized_message(&localization),
            "Video kann nicht abgespielt werden (Fehlercode: 221000)"
        );
    }

    #[test]
    fn localized_message_falls_back_to_english() {
        let err = PlayerError::new(ErrorCode::PLAYLIST_EMPTY).with_source("0 items");
        let payload = err.to_payload(&Localization::default());
        assert_eq!(payload.code, 102630);
        assert_eq!(
            payload.message,
            "This playlist can't be loaded (Error Code: 102630)"
        );
        assert_eq!(payload.source_error.as_deref(), Some("0 items"));
    }

    #[test]
    fn error_classification() {
        assert!(PlaybackError::EmptyPlaylist.is_fatal());
        assert!(!PlaybackError::EmptyPlaylist.is_transient());
        assert!(PlaybackError::ProviderLoad {
            provider: "html5".into(),
            reason: "chunk".into()
        }
        .is_transient());
        assert_eq!(
            PlaybackError::NoPlayableSource(0).code(),
            ErrorCode::NO_PLAYABLE_SOURCE
        );
    }

    #[test]
    fn localization_deserializes_partial_tables() {
        let json = r#"{"messages":{"adError":"Anzeige fehlgeschlagen"}}"#;
        let localization: Localization = serde_json::from_str(json).unwrap();
        assert_eq!(localization.text(MessageKey::AdError), "Anzeige fehlgeschlagen");
        assert_eq!(localization.text(MessageKey::Generic), "An error occurred");
    }
}
