//! Data model: immutable playlist items, per-load media state and the
//! per-instance player aggregate.

pub mod item;
pub mod media;
pub mod player;

pub use item::{prepare_playlist, PlaylistItem, SideloadedTrack, Source, TrackKind};
pub use media::{MediaModel, MediaState};
pub use player::{DockButton, PlayerModel};
