//! Playlist items.
//!
//! Items are immutable once loaded: controllers hold them behind `Arc` and
//! never mutate them. Resume positions and selections live in the media and
//! player models instead.

use crate::error::{PlaybackError, Result};
use bridge_traits::ElementSource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One rendition of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub file: String,
    /// MIME type; inferred from the file extension when absent.
    #[serde(default, rename = "type")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub bitrate: Option<u32>,
    #[serde(default)]
    pub default: bool,
}

impl Source {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            mime_type: None,
            label: None,
            width: None,
            height: None,
            bitrate: None,
            default: false,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }

    /// Declared MIME type, or one guessed from the extension.
    pub fn effective_mime_type(&self) -> Option<String> {
        if let Some(mime) = &self.mime_type {
            return Some(mime.clone());
        }
        let path = core_runtime::logging::strip_url_query(&self.file);
        let extension = path.rsplit_once('.')?.1.to_ascii_lowercase();
        let mime = match extension.as_str() {
            "mp4" | "m4v" | "mov" => "video/mp4",
            "webm" => "video/webm",
            "ogv" | "ogg" => "video/ogg",
            "mp3" => "audio/mpeg",
            "m4a" | "aac" => "audio/mp4",
            "oga" => "audio/ogg",
            "m3u8" => "application/vnd.apple.mpegurl",
            "mpd" => "application/dash+xml",
            _ => return None,
        };
        Some(mime.to_string())
    }

    pub fn element_source(&self) -> ElementSource {
        ElementSource::new(self.file.clone(), self.effective_mime_type())
    }
}

/// Kind of a sideloaded text track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    #[default]
    Captions,
    Subtitles,
    Chapters,
    Thumbnails,
    Metadata,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Captions => "captions",
            TrackKind::Subtitles => "subtitles",
            TrackKind::Chapters => "chapters",
            TrackKind::Thumbnails => "thumbnails",
            TrackKind::Metadata => "metadata",
        }
    }

    pub fn from_native(kind: &str) -> Self {
        match kind {
            "subtitles" => TrackKind::Subtitles,
            "chapters" => TrackKind::Chapters,
            "metadata" => TrackKind::Metadata,
            _ => TrackKind::Captions,
        }
    }

    /// Whether tracks of this kind are offered in the captions menu.
    pub fn is_caption(&self) -> bool {
        matches!(self, TrackKind::Captions | TrackKind::Subtitles)
    }
}

/// Text track file attached to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideloadedTrack {
    pub file: String,
    #[serde(default)]
    pub kind: TrackKind,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub default: bool,
}

impl SideloadedTrack {
    pub fn captions(file: impl Into<String>, label: Option<&str>) -> Self {
        Self {
            file: file.into(),
            kind: TrackKind::Captions,
            label: label.map(str::to_string),
            language: None,
            default: false,
        }
    }
}

/// Element of the playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlaylistItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub mediaid: Option<String>,
    /// Shorthand for a single-source item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub tracks: Vec<SideloadedTrack>,
    /// Position (seconds) to start from.
    #[serde(default)]
    pub starttime: f64,
    /// Duration hint shown before metadata arrives.
    #[serde(default)]
    pub duration: Option<f64>,
    /// Seconds before an ad can be skipped (ad items only).
    #[serde(default)]
    pub skip_offset: Option<f64>,
}

impl PlaylistItem {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            sources: vec![Source::new(file)],
            ..Self::default()
        }
    }

    pub fn with_sources(sources: Vec<Source>) -> Self {
        Self {
            sources,
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_track(mut self, track: SideloadedTrack) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn with_starttime(mut self, starttime: f64) -> Self {
        self.starttime = starttime;
        self
    }

    pub fn with_skip_offset(mut self, offset: f64) -> Self {
        self.skip_offset = Some(offset);
        self
    }

    /// Fold the `file` shorthand into `sources` and drop empty sources.
    pub fn normalized(mut self) -> Self {
        if let Some(file) = self.file.take() {
            if self.sources.is_empty() && !file.trim().is_empty() {
                self.sources.push(Source::new(file));
            }
        }
        self.sources.retain(|source| !source.file.trim().is_empty());
        self
    }

    /// Reject items without a usable source.
    pub fn validate(&self, index: usize) -> Result<()> {
        if self.sources.is_empty() {
            return Err(PlaybackError::MalformedItem {
                index,
                reason: "item has no sources".to_string(),
            });
        }
        if !self.starttime.is_finite() || self.starttime < 0.0 {
            return Err(PlaybackError::MalformedItem {
                index,
                reason: format!("invalid starttime {}", self.starttime),
            });
        }
        Ok(())
    }

    /// File of the first source, used in events and logs.
    pub fn primary_file(&self) -> &str {
        self.sources
            .first()
            .map(|source| source.file.as_str())
            .unwrap_or_default()
    }

    /// Value equality of the source descriptor, which decides whether a
    /// preloaded controller can be promoted without reloading.
    pub fn same_source(&self, other: &PlaylistItem) -> bool {
        self.sources == other.sources
    }
}

/// Normalize and validate a playlist.
pub fn prepare_playlist(items: Vec<PlaylistItem>) -> Result<Vec<Arc<PlaylistItem>>> {
    if items.is_empty() {
        return Err(PlaybackError::EmptyPlaylist);
    }
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let item = item.normalized();
            item.validate(index)?;
            Ok(Arc::new(item))
        })
        .collect()
}
