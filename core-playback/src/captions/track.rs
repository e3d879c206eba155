//! Caption tracks as offered in the captions menu.

use super::parser::Cue;
use crate::model::{SideloadedTrack, TrackKind};
use bridge_traits::NativeTextTrack;

/// Where a track's cues come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptionSource {
    /// Fetched from a URL on first selection.
    Sideloaded { file: String },
    /// Read from the element's text track at `index`.
    Native { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    NotLoaded,
    Loading,
    Loaded,
}

#[derive(Debug, Clone)]
pub struct CaptionTrack {
    /// Stable id, see [`track_id`].
    pub id: String,
    /// Menu label; generated for unlabeled tracks.
    pub label: String,
    pub kind: TrackKind,
    pub raw_label: Option<String>,
    pub language: Option<String>,
    pub default: bool,
    pub source: CaptionSource,
    pub cues: Vec<Cue>,
    pub load_state: LoadState,
}

impl CaptionTrack {
    pub fn from_sideloaded(track: &SideloadedTrack) -> Self {
        Self {
            id: String::new(),
            label: String::new(),
            kind: track.kind,
            raw_label: non_empty(track.label.as_deref()),
            language: non_empty(track.language.as_deref()),
            default: track.default,
            source: CaptionSource::Sideloaded {
                file: track.file.clone(),
            },
            cues: Vec::new(),
            load_state: LoadState::NotLoaded,
        }
    }

    pub fn from_native(index: usize, track: &NativeTextTrack) -> Self {
        Self {
            id: String::new(),
            label: String::new(),
            kind: TrackKind::from_native(&track.kind),
            raw_label: non_empty(Some(&track.label)),
            language: non_empty(Some(&track.language)),
            default: track.default,
            source: CaptionSource::Native { index },
            cues: track
                .cues
                .iter()
                .map(|cue| Cue {
                    start: cue.start,
                    end: cue.end,
                    text: cue.text.clone(),
                })
                .collect(),
            load_state: LoadState::Loaded,
        }
    }

    /// Name the track is identified by: label, else language.
    pub fn name(&self) -> Option<&str> {
        self.raw_label.as_deref().or(self.language.as_deref())
    }

    /// Key used to drop native copies of sideloaded tracks.
    pub fn dedupe_key(&self) -> (TrackKind, Option<&str>, Option<&str>) {
        (self.kind, self.raw_label.as_deref(), self.language.as_deref())
    }

    pub fn file(&self) -> Option<&str> {
        match &self.source {
            CaptionSource::Sideloaded { file } => Some(file),
            CaptionSource::Native { .. } => None,
        }
    }

    pub fn native_index(&self) -> Option<usize> {
        match self.source {
            CaptionSource::Native { index } => Some(index),
            CaptionSource::Sideloaded { .. } => None,
        }
    }

    pub fn active_cues(&self, time: f64) -> impl Iterator<Item = &Cue> {
        self.cues.iter().filter(move |cue| cue.is_active(time))
    }
}

/// Stable id from kind, name and the occurrence of that name.
///
/// The same track description always yields the same id, so ids survive
/// list rebuilds with fresh track instances.
pub fn track_id(kind: TrackKind, name: Option<&str>, occurrence: usize) -> String {
    let name = name.unwrap_or("unknown").to_lowercase().replace(char::is_whitespace, "_");
    if occurrence == 0 {
        format!("{}-{}", kind.as_str(), name)
    } else {
        format!("{}-{}-{}", kind.as_str(), name, occurrence)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
