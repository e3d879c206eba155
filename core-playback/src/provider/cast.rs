//! Remote playback through a cast session.

use super::{Provider, ProviderCapabilities, ProviderEvent};
use crate::model::PlaylistItem;
use bridge_traits::{box_future, CastLoadRequest, CastSession, PlatformFuture, PlayRejection};
use core_runtime::events::StreamType;
use std::sync::Arc;
use tracing::warn;

/// Pseudo-provider forwarding commands to a [`CastSession`].
///
/// Owns no element: the receiver renders the media, and position is polled
/// on every tick.
pub struct CastProvider {
    session: Arc<dyn CastSession>,
    request: Option<CastLoadRequest>,
    pending: Vec<ProviderEvent>,
    last_position: f64,
    was_paused: bool,
}

impl CastProvider {
    pub fn new(session: Arc<dyn CastSession>) -> Self {
        Self {
            session,
            request: None,
            pending: Vec::new(),
            last_position: 0.0,
            was_paused: true,
        }
    }

    pub fn device_name(&self) -> String {
        self.session.device_name()
    }

    /// Last position reported by the receiver.
    pub fn position(&self) -> f64 {
        self.last_position
    }
}

impl Provider for CastProvider {
    fn name(&self) -> &'static str {
        "cast"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_playback_rate: false,
            render_natively: true,
        }
    }

    fn load(&mut self, item: &PlaylistItem, start: f64) {
        let source = item.sources.first();
        self.request = Some(CastLoadRequest {
            url: item.primary_file().to_string(),
            mime_type: source.and_then(|s| s.effective_mime_type()),
            title: item.title.clone(),
            start_position: start,
        });
        self.last_position = start;
        self.pending.push(ProviderEvent::Loading);
    }

    /// The first play also hands the media over to the receiver.
    fn play(&mut self) -> PlatformFuture<'static, std::result::Result<(), PlayRejection>> {
        let session = Arc::clone(&self.session);
        let request = self.request.take();
        box_future(async move {
            if let Some(request) = request {
                if let Err(e) = session.load(request).await {
                    warn!(error = %e, "Cast load failed");
                    return Err(PlayRejection::NotSupported);
                }
            }
            session.play().await.map_err(|e| {
                warn!(error = %e, "Cast play failed");
                PlayRejection::NotSupported
            })
        })
    }

    fn pause(&mut self) {
        self.session.pause();
    }

    fn stop(&mut self) {
        self.session.stop();
    }

    fn seek(&mut self, position: f64) {
        let from = self.last_position;
        let target = position.max(0.0);
        if let Some(request) = self.request.as_mut() {
            request.start_position = target;
        } else {
            self.session.seek(target);
        }
        self.pending.push(ProviderEvent::Seek {
            position: from,
            offset: target,
        });
    }

    fn set_volume(&mut self, volume: u8) {
        self.session.set_volume(f64::from(volume.min(100)) / 100.0);
    }

    fn set_mute(&mut self, muted: bool) {
        self.session.set_muted(muted);
    }

    fn set_playback_rate(&mut self, _rate: f64) {}

    fn attach_media(&mut self) {}

    fn detach_media(&mut self) {}

    fn set_visibility(&mut self, _visible: bool) {}

    fn poll_events(&mut self, out: &mut Vec<ProviderEvent>) {
        out.append(&mut self.pending);
    }

    fn tick(&mut self, out: &mut Vec<ProviderEvent>) {
        if self.request.is_some() {
            return;
        }
        let paused = self.session.is_paused();
        if paused != self.was_paused {
            self.was_paused = paused;
            out.push(if paused {
                ProviderEvent::Paused
            } else {
                ProviderEvent::Playing
            });
        }
        let position = self.session.position();
        if position != self.last_position {
            self.last_position = position;
            out.push(ProviderEvent::Time {
                position,
                duration: self.session.duration(),
                current_time: position,
            });
        }
    }

    fn current_time(&self) -> f64 {
        self.last_position
    }

    fn duration(&self) -> f64 {
        self.session.duration()
    }

    fn stream_type(&self) -> StreamType {
        if self.session.duration().is_infinite() {
            StreamType::Live
        } else {
            StreamType::Vod
        }
    }

    fn is_paused(&self) -> bool {
        self.session.is_paused()
    }

    fn source_url(&self) -> Option<String> {
        None
    }

    fn destroy(&mut self) {
        self.session.stop();
        self.pending.clear();
    }
}
