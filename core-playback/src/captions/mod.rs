//! # Caption Synchronizer
//!
//! Merges sideloaded and native text tracks into one captions list and keeps
//! the selection and the active cue set in sync with playback.
//!
//! - The list always starts with "Off" at index 0.
//! - Track ids are stable (see [`track::track_id`]). Rebuilds whose
//!   `(id, label)` sequence is unchanged keep the current selection.
//! - Default selection: a track flagged default, else the persisted label,
//!   else "Off". An explicit selection is never overridden by a default.
//! - Active cues are recomputed from the current time on every time update
//!   and tick, so seeks and discontinuities need no special handling.

pub mod parser;
pub mod track;

pub use parser::{parse_captions, CaptionParseError, Cue};
pub use track::{CaptionSource, CaptionTrack, LoadState};

use crate::error::{PlaybackError, Result};
use crate::model::SideloadedTrack;
use bridge_traits::NativeTextTrack;
use core_runtime::events::{ActiveCue, CaptionOption};
use std::collections::HashMap;

pub const OFF_ID: &str = "off";
pub const OFF_LABEL: &str = "Off";
const UNKNOWN_LABEL: &str = "Unknown CC";

/// Sideloaded track that must be fetched before its cues can show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub track_id: String,
    pub url: String,
}

/// Published list after a rebuild that changed it.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionsUpdate {
    pub tracks: Vec<CaptionOption>,
    pub current: usize,
    pub fetch: Option<FetchRequest>,
}

/// Result of a selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub changed: bool,
    pub current: usize,
    pub label: String,
    pub fetch: Option<FetchRequest>,
}

#[derive(Debug, Default)]
pub struct CaptionSynchronizer {
    sideloaded: Vec<CaptionTrack>,
    native: Vec<CaptionTrack>,
    options: Vec<CaptionOption>,
    current: usize,
    user_selected: bool,
    active: Vec<ActiveCue>,
}

impl CaptionSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the sideloaded tracks. Cues already fetched for an unchanged
    /// file are kept.
    pub fn set_sideloaded(&mut self, tracks: &[SideloadedTrack]) {
        let previous = std::mem::take(&mut self.sideloaded);
        self.sideloaded = tracks
            .iter()
            .filter(|t| t.kind.is_caption())
            .map(|t| {
                let mut track = CaptionTrack::from_sideloaded(t);
                if let Some(old) = previous
                    .iter()
                    .find(|old| old.file() == track.file() && old.kind == track.kind)
                {
                    track.cues = old.cues.clone();
                    track.load_state = old.load_state;
                }
                track
            })
            .collect();
    }

    /// Replace the native tracks with what the element reports now.
    pub fn update_native(&mut self, tracks: &[NativeTextTrack]) {
        let native: Vec<CaptionTrack> = tracks
            .iter()
            .enumerate()
            .map(|(index, t)| CaptionTrack::from_native(index, t))
            .filter(|t| t.kind.is_caption())
            .filter(|t| {
                !self
                    .sideloaded
                    .iter()
                    .any(|s| s.dedupe_key() == t.dedupe_key())
            })
            .collect();
        self.native = native;
    }

    fn tracks(&self) -> impl Iterator<Item = &CaptionTrack> {
        self.sideloaded.iter().chain(self.native.iter())
    }

    fn tracks_mut(&mut self) -> impl Iterator<Item = &mut CaptionTrack> {
        self.sideloaded.iter_mut().chain(self.native.iter_mut())
    }

    fn assign_ids(&mut self) {
        let mut occurrences: HashMap<String, usize> = HashMap::new();
        let mut unknown = 0;
        for track in self.tracks_mut() {
            let name = track.name().map(str::to_string);
            let key = format!("{}:{}", track.kind.as_str(), name.as_deref().unwrap_or(""));
            let occurrence = occurrences.entry(key).or_insert(0);
            track.id = track::track_id(track.kind, name.as_deref(), *occurrence);
            *occurrence += 1;

            track.label = match name {
                Some(name) => name,
                None => {
                    unknown += 1;
                    if unknown == 1 {
                        UNKNOWN_LABEL.to_string()
                    } else {
                        format!("{} [{}]", UNKNOWN_LABEL, unknown)
                    }
                }
            };
        }
    }

    /// Recompute the list. Returns `None` when the `(id, label)` sequence is
    /// unchanged.
    pub fn rebuild(&mut self, persisted_label: Option<&str>) -> Option<CaptionsUpdate> {
        self.assign_ids();

        let mut options = vec![CaptionOption {
            id: OFF_ID.to_string(),
            label: OFF_LABEL.to_string(),
        }];
        options.extend(self.tracks().map(|t| CaptionOption {
            id: t.id.clone(),
            label: t.label.clone(),
        }));

        if options == self.options {
            return None;
        }

        // The previous list still describes what the user selected.
        let selected_id = match self.current {
            0 => None,
            index => self.options.get(index).map(|o| o.id.clone()),
        };
        self.options = options;

        let preserved = selected_id
            .and_then(|id| self.options.iter().position(|o| o.id == id));
        self.current = match preserved {
            Some(index) => index,
            None if self.user_selected => 0,
            None => self.default_index(persisted_label),
        };
        self.active.clear();

        Some(CaptionsUpdate {
            tracks: self.options.clone(),
            current: self.current,
            fetch: self.fetch_for_current(),
        })
    }

    fn default_index(&self, persisted_label: Option<&str>) -> usize {
        if let Some(index) = self.tracks().position(|t| t.default) {
            return index + 1;
        }
        persisted_label
            .and_then(|label| self.tracks().position(|t| t.label == label))
            .map(|index| index + 1)
            .unwrap_or(0)
    }

    /// Select list entry `index` (0 = Off).
    pub fn select(&mut self, index: usize) -> Result<Selection> {
        if index >= self.options.len().max(1) {
            return Err(PlaybackError::InvalidArgument {
                field: "captions",
                reason: format!("index {} out of range ({} entries)", index, self.options.len()),
            });
        }
        self.user_selected = true;
        let changed = index != self.current;
        self.current = index;
        if changed {
            self.active.clear();
        }
        Ok(Selection {
            changed,
            current: index,
            label: self.current_label().to_string(),
            fetch: self.fetch_for_current(),
        })
    }

    fn fetch_for_current(&mut self) -> Option<FetchRequest> {
        let track = self.current_track_mut()?;
        if track.load_state != LoadState::NotLoaded {
            return None;
        }
        let url = track.file()?.to_string();
        track.load_state = LoadState::Loading;
        Some(FetchRequest {
            track_id: track.id.clone(),
            url,
        })
    }

    /// Store cues fetched for `track_id`.
    pub fn apply_fetched(&mut self, track_id: &str, cues: Vec<Cue>) -> bool {
        match self.tracks_mut().find(|t| t.id == track_id) {
            Some(track) => {
                track.cues = cues;
                track.load_state = LoadState::Loaded;
                true
            }
            None => false,
        }
    }

    /// Remove a sideloaded track that failed to load. Selection falls back to
    /// "Off" if it was selected; call [`rebuild`](Self::rebuild) to publish.
    pub fn drop_track(&mut self, track_id: &str) -> bool {
        let was_selected = self.current_track().map(|t| t.id == track_id).unwrap_or(false);
        let before = self.sideloaded.len();
        self.sideloaded.retain(|t| t.id != track_id);
        if self.sideloaded.len() == before {
            return false;
        }
        if was_selected {
            self.current = 0;
            self.active.clear();
        }
        true
    }

    pub fn options(&self) -> &[CaptionOption] {
        &self.options
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn current_label(&self) -> &str {
        self.options
            .get(self.current)
            .map(|o| o.label.as_str())
            .unwrap_or(OFF_LABEL)
    }

    pub fn current_track(&self) -> Option<&CaptionTrack> {
        if self.current == 0 {
            return None;
        }
        self.tracks().nth(self.current - 1)
    }

    fn current_track_mut(&mut self) -> Option<&mut CaptionTrack> {
        if self.current == 0 {
            return None;
        }
        let index = self.current - 1;
        self.tracks_mut().nth(index)
    }

    /// Native element index of the selected track, if it is a native one.
    pub fn current_native_index(&self) -> Option<usize> {
        self.current_track().and_then(|t| t.native_index())
    }

    /// Recompute active cues at `time`. Returns the new set when it changed.
    pub fn update_cues(&mut self, time: f64) -> Option<Vec<ActiveCue>> {
        let active: Vec<ActiveCue> = match self.current_track() {
            Some(track) => track
                .active_cues(time)
                .map(|cue| ActiveCue {
                    track_id: track.id.clone(),
                    start: cue.start,
                    end: cue.end,
                    text: cue.text.clone(),
                })
                .collect(),
            None => Vec::new(),
        };
        if active == self.active {
            return None;
        }
        self.active = active.clone();
        Some(active)
    }
}
