//! Work produced by controllers for the player to publish or await.
//!
//! Controllers run under the player lock and never await. Anything they
//! cannot finish synchronously is returned as [`Deferred`] work: the player
//! awaits it after releasing the lock and hands the result back to whichever
//! controller still owns the matching generation token.

use crate::autoplay::AutoplayCheck;
use crate::captions::FetchRequest;
use crate::generation::GenerationToken;
use crate::program_controller::PendingActivation;
use bridge_traits::{PlatformFuture, PlayRejection};
use core_runtime::events::{
    AdEvent, ErrorEvent, InterfaceEvent, MediaEvent, PlayReason, PlayerEvent, PlaylistEvent,
    TrackEvent,
};
use std::fmt;

/// Identifies the controller and generation a play request belongs to.
#[derive(Debug, Clone)]
pub(crate) struct PlayTicket {
    pub controller_id: u64,
    pub token: GenerationToken,
}

pub(crate) struct PlayRequest {
    pub ticket: PlayTicket,
    pub reason: PlayReason,
    pub future: PlatformFuture<'static, Result<(), PlayRejection>>,
}

pub(crate) struct CaptionFetch {
    pub controller_id: u64,
    pub request: FetchRequest,
}

pub(crate) enum Deferred {
    /// Provider construction for `setActiveItem`.
    Activate(PendingActivation),
    /// Provider construction for a background preload.
    Background(PendingActivation),
    Play(PlayRequest),
    Autoplay(AutoplayCheck),
    Fetch(CaptionFetch),
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deferred::Activate(p) => write!(f, "Activate({})", p.index),
            Deferred::Background(p) => write!(f, "Background({})", p.index),
            Deferred::Play(r) => write!(f, "Play(controller {})", r.ticket.controller_id),
            Deferred::Autoplay(_) => f.write_str("Autoplay"),
            Deferred::Fetch(c) => write!(f, "Fetch({})", c.request.track_id),
        }
    }
}

/// Events and deferred work collected during one locked section.
#[derive(Default)]
pub(crate) struct Effects {
    pub events: Vec<PlayerEvent>,
    pub deferred: Vec<Deferred>,
}

impl Effects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn media(&mut self, event: MediaEvent) {
        self.events.push(PlayerEvent::Media(event));
    }

    pub fn tracks(&mut self, event: TrackEvent) {
        self.events.push(PlayerEvent::Tracks(event));
    }

    pub fn playlist(&mut self, event: PlaylistEvent) {
        self.events.push(PlayerEvent::Playlist(event));
    }

    pub fn interface(&mut self, event: InterfaceEvent) {
        self.events.push(PlayerEvent::Interface(event));
    }

    pub fn ad(&mut self, event: AdEvent) {
        self.events.push(PlayerEvent::Ad(event));
    }

    pub fn error(&mut self, event: ErrorEvent) {
        self.events.push(PlayerEvent::Error(event));
    }

    pub fn defer(&mut self, work: Deferred) {
        self.deferred.push(work);
    }

    /// Move everything from `other` into `self`.
    pub fn merge(&mut self, other: Effects) {
        self.events.extend(other.events);
        self.deferred.extend(other.deferred);
    }

    /// Keep deferred work but discard events (background controllers).
    pub fn merge_silently(&mut self, other: Effects) {
        self.deferred.extend(other.deferred);
    }
}
