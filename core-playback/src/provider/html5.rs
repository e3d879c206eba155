//! HTML5 media element provider.

use super::{classify, Provider, ProviderCapabilities, ProviderContext, ProviderEvent, ProviderFactory};
use crate::error::Result;
use crate::model::{PlaylistItem, Source, TrackKind};
use bridge_traits::{
    box_future, native_event_channel, CapabilityTag, MediaElement, NativeEvent, NativeEventQueue,
    PlatformFuture, PlayRejection, TextTrackMode,
};
use core_runtime::events::{
    AudioTrackInfo, QualityChangeReason, QualityLevel, StreamType, VisualQuality,
};
use std::sync::Arc;
use tracing::{debug, trace};

const HLS_MIME_TYPES: &[&str] = &[
    "application/vnd.apple.mpegurl",
    "application/x-mpegurl",
    "audio/mpegurl",
];

/// Builds [`Html5Provider`]s on `html5` elements.
#[derive(Debug, Clone, Default)]
pub struct Html5ProviderFactory {
    native_hls: bool,
}

impl Html5ProviderFactory {
    pub fn new(native_hls: bool) -> Self {
        Self { native_hls }
    }
}

impl ProviderFactory for Html5ProviderFactory {
    fn name(&self) -> &'static str {
        "html5"
    }

    fn supports(&self, source: &Source) -> bool {
        let Some(mime) = source.effective_mime_type() else {
            // Let the element sniff extension-less URLs.
            return true;
        };
        let mime = mime.to_ascii_lowercase();
        if HLS_MIME_TYPES.contains(&mime.as_str()) {
            return self.native_hls;
        }
        mime.starts_with("video/") || mime.starts_with("audio/")
    }

    fn capability(&self) -> CapabilityTag {
        CapabilityTag::HTML5
    }

    fn create(
        &self,
        element: Arc<dyn MediaElement>,
        context: ProviderContext,
    ) -> PlatformFuture<'static, Result<Box<dyn Provider>>> {
        box_future(async move { Ok(Box::new(Html5Provider::new(element, context)) as Box<dyn Provider>) })
    }
}

/// Provider driving one native media element.
pub struct Html5Provider {
    element: Arc<dyn MediaElement>,
    queue: Option<NativeEventQueue>,
    context: ProviderContext,

    sources: Vec<Source>,
    levels: Vec<QualityLevel>,
    current_level: usize,
    quality_reason: QualityChangeReason,
    last_video_size: Option<(u32, u32)>,

    /// Events produced by commands, delivered ahead of native ones.
    pending: Vec<ProviderEvent>,
    /// Position applied once metadata is known.
    pending_start: Option<f64>,
    loaded: bool,
    /// Item URL last assigned and the element's resolved form of it.
    assigned_src: Option<(String, Option<String>)>,

    duration: f64,
    stream_type: StreamType,
    buffer_percent: f64,

    last_position: Option<f64>,
    stalled: bool,
    seek_in_progress: bool,
    last_reported_position: f64,
}

impl Html5Provider {
    pub fn new(element: Arc<dyn MediaElement>, context: ProviderContext) -> Self {
        Self {
            element,
            queue: None,
            context,
            sources: Vec::new(),
            levels: Vec::new(),
            current_level: 0,
            quality_reason: QualityChangeReason::Initial,
            last_video_size: None,
            pending: Vec::new(),
            pending_start: None,
            loaded: false,
            assigned_src: None,
            duration: 0.0,
            stream_type: StreamType::Vod,
            buffer_percent: 0.0,
            last_position: None,
            stalled: false,
            seek_in_progress: false,
            last_reported_position: 0.0,
        }
    }

    pub fn element(&self) -> &Arc<dyn MediaElement> {
        &self.element
    }

    fn assign_current_source(&mut self) {
        if let Some(source) = self.sources.get(self.current_level) {
            self.element.set_src(Some(&source.element_source()));
            self.assigned_src = Some((source.file.clone(), self.element.src()));
            self.element.load();
            self.loaded = true;
        }
    }

    /// End of the seekable window, i.e. the live edge.
    fn live_edge(&self) -> Option<f64> {
        self.element.seekable().last().map(|range| range.end)
    }

    fn position(&self) -> f64 {
        let time = self.element.current_time();
        match (self.stream_type, self.live_edge()) {
            (StreamType::Dvr, Some(edge)) => (time - edge).min(0.0),
            _ => time,
        }
    }

    fn refresh_duration(&mut self) -> bool {
        let raw = self.element.duration();
        let duration = if raw.is_infinite() {
            let ranges = self.element.seekable();
            match (ranges.first(), ranges.last()) {
                (Some(first), Some(last)) if last.end > first.start => -(last.end - first.start),
                _ => f64::INFINITY,
            }
        } else if raw.is_nan() {
            0.0
        } else {
            raw
        };

        let changed = duration != self.duration;
        self.duration = duration;
        self.stream_type = classify(duration, self.context.dvr_window);
        changed
    }

    fn meta_event(&self) -> ProviderEvent {
        let (width, height) = self.element.video_size();
        ProviderEvent::Meta {
            duration: self.duration,
            stream_type: self.stream_type,
            width,
            height,
        }
    }

    fn time_event(&mut self) -> ProviderEvent {
        let position = self.position();
        self.last_reported_position = position;
        ProviderEvent::Time {
            position,
            duration: self.duration,
            current_time: self.element.current_time(),
        }
    }

    /// Quality changes are only reported once the rendered geometry changes.
    fn check_visual_quality(&mut self, out: &mut Vec<ProviderEvent>) {
        let size = self.element.video_size();
        if size == (0, 0) || self.last_video_size == Some(size) {
            return;
        }
        self.last_video_size = Some(size);
        out.push(ProviderEvent::VisualQuality(VisualQuality {
            level: self.current_level,
            width: size.0,
            height: size.1,
            reason: self.quality_reason,
        }));
        self.quality_reason = QualityChangeReason::Auto;
    }

    fn buffer_event(&mut self) -> Option<ProviderEvent> {
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return None;
        }
        let time = self.element.current_time();
        let end = self
            .element
            .buffered()
            .into_iter()
            .find(|range| range.start <= time && time <= range.end)
            .map(|range| range.end)?;
        let percent = (end / self.duration * 100.0).clamp(0.0, 100.0);
        if (percent - self.buffer_percent).abs() < f64::EPSILON {
            return None;
        }
        self.buffer_percent = percent;
        Some(ProviderEvent::BufferChange {
            buffer_percent: percent,
        })
    }

    fn audio_tracks_event(&self) -> ProviderEvent {
        let native = self.element.audio_tracks();
        let current = native.iter().position(|t| t.enabled).unwrap_or(0);
        let tracks = native
            .into_iter()
            .map(|t| AudioTrackInfo {
                name: if t.label.is_empty() { t.language.clone() } else { t.label },
                language: t.language,
            })
            .collect();
        ProviderEvent::AudioTracks { tracks, current }
    }

    fn handle_native(&mut self, event: NativeEvent, out: &mut Vec<ProviderEvent>) {
        trace!(?event, "Native media event");
        match event {
            NativeEvent::LoadStart | NativeEvent::CanPlay => {}
            NativeEvent::LoadedMetadata => {
                if let Some(start) = self.pending_start.take() {
                    self.element.set_current_time(start);
                }
                self.refresh_duration();
                out.push(self.meta_event());
                self.check_visual_quality(out);
            }
            NativeEvent::DurationChange => {
                if self.refresh_duration() {
                    out.push(self.meta_event());
                }
            }
            NativeEvent::Playing => {
                self.stalled = false;
                self.last_position = None;
                out.push(ProviderEvent::Playing);
            }
            NativeEvent::Pause => {
                if !self.element.ended() {
                    out.push(ProviderEvent::Paused);
                }
            }
            NativeEvent::Waiting => out.push(ProviderEvent::Buffering),
            NativeEvent::Seeking => {
                if !self.seek_in_progress {
                    out.push(ProviderEvent::Seek {
                        position: self.last_reported_position,
                        offset: self.position(),
                    });
                }
            }
            NativeEvent::Seeked => {
                self.seek_in_progress = false;
                self.last_position = None;
                out.push(ProviderEvent::Seeked);
            }
            NativeEvent::TimeUpdate => {
                let event = self.time_event();
                out.push(event);
            }
            NativeEvent::Progress => {
                if let Some(event) = self.buffer_event() {
                    out.push(event);
                }
            }
            NativeEvent::Ended => out.push(ProviderEvent::Complete),
            NativeEvent::Error(error) => out.push(ProviderEvent::MediaError(error)),
            NativeEvent::VolumeChange => {
                out.push(ProviderEvent::Volume {
                    volume: (self.element.volume() * 100.0).round().clamp(0.0, 100.0) as u8,
                });
                out.push(ProviderEvent::Mute {
                    muted: self.element.muted(),
                });
            }
            NativeEvent::RateChange => out.push(ProviderEvent::RateChange {
                playback_rate: self.element.playback_rate(),
            }),
            NativeEvent::Resize => self.check_visual_quality(out),
            NativeEvent::TextTracksChanged => {
                out.push(ProviderEvent::SubtitleTracks(self.element.text_tracks()))
            }
            NativeEvent::AudioTracksChanged => out.push(self.audio_tracks_event()),
        }
    }
}

impl Provider for Html5Provider {
    fn name(&self) -> &'static str {
        "html5"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_playback_rate: true,
            render_natively: false,
        }
    }

    fn load(&mut self, item: &PlaylistItem, start: f64) {
        if self.sources != item.sources {
            self.sources = item.sources.clone();
            self.levels = build_levels(&self.sources);
            self.current_level = initial_level(&self.sources, &self.levels, &self.context);
            self.quality_reason = QualityChangeReason::Initial;
            self.last_video_size = None;
            self.pending.push(ProviderEvent::Levels {
                levels: self.levels.clone(),
                current: self.current_level,
            });
        }

        self.pending_start = (start > 0.0).then_some(start);
        self.stalled = false;
        self.last_position = None;
        self.seek_in_progress = false;
        self.buffer_percent = 0.0;

        debug!(
            level = self.current_level,
            start,
            url = %core_runtime::logging::strip_url_query(item.primary_file()),
            "Loading source"
        );
        self.assign_current_source();
        self.pending.push(ProviderEvent::Loading);
    }

    fn play(&mut self) -> PlatformFuture<'static, std::result::Result<(), PlayRejection>> {
        self.last_position = None;
        let element = Arc::clone(&self.element);
        box_future(async move { element.play().await })
    }

    fn pause(&mut self) {
        self.element.pause();
    }

    fn stop(&mut self) {
        self.element.pause();
        self.element.set_src(None);
        self.assigned_src = None;
        self.element.load();
        self.loaded = false;
        self.pending_start = None;
        self.stalled = false;
    }

    fn seek(&mut self, position: f64) {
        let from = self.position();
        let target = match (self.stream_type, self.element.seekable().first().copied(), self.live_edge()) {
            (StreamType::Dvr, Some(window), Some(edge)) => (edge + position.min(0.0)).max(window.start),
            _ => position.max(0.0),
        };

        if self.element.duration().is_nan() {
            // No metadata yet; apply once it arrives.
            self.pending_start = Some(target);
        } else {
            self.element.set_current_time(target);
            self.seek_in_progress = true;
        }
        self.last_position = None;
        self.pending.push(ProviderEvent::Seek {
            position: from,
            offset: position,
        });
    }

    fn set_volume(&mut self, volume: u8) {
        self.element.set_volume(f64::from(volume.min(100)) / 100.0);
    }

    fn set_mute(&mut self, muted: bool) {
        self.element.set_muted(muted);
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.element.set_playback_rate(rate);
    }

    fn quality_levels(&self) -> Vec<QualityLevel> {
        self.levels.clone()
    }

    fn current_quality(&self) -> usize {
        self.current_level
    }

    fn set_current_quality(&mut self, index: usize) -> bool {
        if index >= self.levels.len() || index == self.current_level {
            return false;
        }
        let time = self.element.current_time();
        self.current_level = index;
        self.quality_reason = QualityChangeReason::Api;
        self.pending_start = (time > 0.0).then_some(time);
        self.assign_current_source();
        self.pending.push(ProviderEvent::LevelsChanged { current: index });
        true
    }

    fn set_current_audio_track(&mut self, index: usize) -> bool {
        let tracks = self.element.audio_tracks();
        if index >= tracks.len() || tracks[index].enabled {
            return false;
        }
        for i in 0..tracks.len() {
            self.element.set_audio_track_enabled(i, i == index);
        }
        self.pending.push(ProviderEvent::AudioTrackChanged { current: index });
        true
    }

    fn set_subtitles_track(&mut self, native_index: Option<usize>) {
        for (index, track) in self.element.text_tracks().iter().enumerate() {
            if !TrackKind::from_native(&track.kind).is_caption() {
                continue;
            }
            // Cues are rendered by the caption synchronizer, never natively.
            let mode = if Some(index) == native_index {
                TextTrackMode::Hidden
            } else {
                TextTrackMode::Disabled
            };
            if track.mode != mode {
                self.element.set_text_track_mode(index, mode);
            }
        }
    }

    fn attach_media(&mut self) {
        let (sink, queue) = native_event_channel();
        self.element.set_event_sink(Some(sink));
        self.queue = Some(queue);
        if self.loaded {
            let event = self.time_event();
            self.pending.push(event);
        }
    }

    fn detach_media(&mut self) {
        self.element.set_event_sink(None);
        self.queue = None;
    }

    fn set_visibility(&mut self, visible: bool) {
        self.element.set_mounted(visible);
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.element.resize(width, height);
    }

    fn poll_events(&mut self, out: &mut Vec<ProviderEvent>) {
        out.append(&mut self.pending);
        let native = match self.queue.as_mut() {
            Some(queue) => queue.drain(),
            None => return,
        };
        for event in native {
            self.handle_native(event, out);
        }
    }

    fn tick(&mut self, out: &mut Vec<ProviderEvent>) {
        if !self.loaded || self.element.paused() || self.element.seeking() {
            self.last_position = None;
            return;
        }
        if self.stalled {
            return;
        }
        let time = self.element.current_time();
        match self.last_position {
            Some(previous) if previous == time => {
                debug!(position = time, "Playback stalled");
                self.stalled = true;
                out.push(ProviderEvent::Stalled);
            }
            _ => self.last_position = Some(time),
        }
    }

    fn current_time(&self) -> f64 {
        self.element.current_time()
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    fn is_paused(&self) -> bool {
        self.element.paused()
    }

    fn source_url(&self) -> Option<String> {
        let current = self.element.src();
        match &self.assigned_src {
            Some((file, resolved)) if current.is_some() && current == *resolved => Some(file.clone()),
            _ => current,
        }
    }

    fn destroy(&mut self) {
        self.element.pause();
        self.detach_media();
        self.pending.clear();
        self.loaded = false;
    }
}

fn build_levels(sources: &[Source]) -> Vec<QualityLevel> {
    sources
        .iter()
        .enumerate()
        .map(|(index, source)| QualityLevel {
            label: level_label(source, index, sources.len()),
            width: source.width,
            height: source.height,
            bitrate: source.bitrate,
        })
        .collect()
}

fn level_label(source: &Source, index: usize, total: usize) -> String {
    if let Some(label) = &source.label {
        return label.clone();
    }
    if let Some(height) = source.height {
        return format!("{}p", height);
    }
    if let Some(bitrate) = source.bitrate {
        return format!("{} kbps", bitrate / 1000);
    }
    if total == 1 {
        return "Auto".to_string();
    }
    (index + 1).to_string()
}

/// Persisted label first, then the rendition flagged default, then the first.
fn initial_level(sources: &[Source], levels: &[QualityLevel], context: &ProviderContext) -> usize {
    if let Some(label) = &context.quality_label {
        if let Some(index) = levels.iter().position(|level| &level.label == label) {
            return index;
        }
    }
    sources.iter().position(|s| s.default).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_supports_progressive_and_gated_hls() {
        let factory = Html5ProviderFactory::new(false);
        assert!(factory.supports(&Source::new("https://e.com/a.mp4")));
        assert!(factory.supports(&Source::new("https://e.com/a.mp3")));
        assert!(factory.supports(&Source::new("https://e.com/stream")));
        assert!(!factory.supports(&Source::new("https://e.com/a.m3u8")));
        assert!(!factory.supports(&Source::new("https://e.com/a.mpd")));
        assert!(Html5ProviderFactory::new(true).supports(&Source::new("https://e.com/a.m3u8")));
    }

    #[test]
    fn level_labels_fall_back_to_geometry() {
        let sources = vec![
            Source::new("a.mp4").with_label("HD"),
            Source::new("b.mp4").with_size(640, 360),
            Source::new("c.mp4"),
        ];
        let labels: Vec<_> = build_levels(&sources).into_iter().map(|l| l.label).collect();
        assert_eq!(labels, vec!["HD", "360p", "3"]);
        assert_eq!(build_levels(&[Source::new("x.mp4")])[0].label, "Auto");
    }

    #[test]
    fn initial_level_prefers_persisted_label() {
        let sources = vec![
            Source::new("a.mp4").with_label("1080p"),
            Source::new("b.mp4").with_label("720p").as_default(),
        ];
        let levels = build_levels(&sources);

        let plain = ProviderContext::default();
        assert_eq!(initial_level(&sources, &levels, &plain), 1);

        let persisted = ProviderContext {
            quality_label: Some("1080p".into()),
            ..ProviderContext::default()
        };
        assert_eq!(initial_level(&sources, &levels, &persisted), 0);
    }
}
