//! WebAssembly implementation of the media element bridge.
//!
//! [`WebMediaElement`] wraps an `HTMLMediaElement` and forwards its DOM media
//! events into the provider's [`NativeEventSink`]. [`DomElementFactory`]
//! creates `<video>` elements for the player's element pool and mounts them
//! into the player container on demand.

use std::cell::RefCell;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::{
    error::Result as BridgeResult,
    media::{
        CapabilityTag, ElementSource, MediaElement, MediaElementFactory, NativeAudioTrack,
        NativeCue, NativeEvent, NativeEventSink, NativeMediaError, NativeTextTrack, PlayRejection,
        TextTrackMode, TimeRange,
    },
};
use js_sys::Reflect;
use tracing::{debug, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    Document, DomException, Event, EventTarget, HtmlElement, HtmlMediaElement, HtmlVideoElement,
    TextTrack, TextTrackKind, TimeRanges, VttCue,
};

use crate::error::{WasmError, WasmResult};

/// DOM media events forwarded to the sink.
const MEDIA_EVENTS: &[&str] = &[
    "loadstart",
    "loadedmetadata",
    "durationchange",
    "canplay",
    "playing",
    "pause",
    "waiting",
    "seeking",
    "seeked",
    "timeupdate",
    "progress",
    "ended",
    "error",
    "volumechange",
    "ratechange",
    "resize",
];

/// Events fired on `element.textTracks` and `element.audioTracks`.
const TRACK_LIST_EVENTS: &[&str] = &["addtrack", "removetrack", "change"];

struct Listener {
    target: EventTarget,
    name: &'static str,
    closure: Closure<dyn FnMut(Event)>,
}

impl Listener {
    fn install(target: EventTarget, name: &'static str, closure: Closure<dyn FnMut(Event)>) -> Self {
        if let Err(err) =
            target.add_event_listener_with_callback(name, closure.as_ref().unchecked_ref())
        {
            warn!(event = name, error = ?WasmError::from(err), "Failed to add media listener");
        }
        Self {
            target,
            name,
            closure,
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.name, self.closure.as_ref().unchecked_ref());
    }
}

/// `HTMLMediaElement` driven through the [`MediaElement`] bridge.
pub struct WebMediaElement {
    element: HtmlMediaElement,
    container: HtmlElement,
    listeners: RefCell<Vec<Listener>>,
}

impl WebMediaElement {
    /// Wrap `element`; `container` is where [`MediaElement::set_mounted`]
    /// attaches it.
    pub fn new(element: HtmlMediaElement, container: HtmlElement) -> Self {
        Self {
            element,
            container,
            listeners: RefCell::new(Vec::new()),
        }
    }

    /// Underlying DOM node.
    pub fn element(&self) -> &HtmlMediaElement {
        &self.element
    }

    fn install_listeners(&self, sink: NativeEventSink) {
        let mut listeners = self.listeners.borrow_mut();
        let target: EventTarget = self.element.clone().unchecked_into();

        for &name in MEDIA_EVENTS {
            let element = self.element.clone();
            let sink = sink.clone();
            let closure = Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
                if let Some(event) = map_media_event(name, &element) {
                    sink.dispatch(event);
                }
            });
            listeners.push(Listener::install(target.clone(), name, closure));
        }

        let track_lists = [
            (
                self.element.text_tracks().map(JsValue::from),
                NativeEvent::TextTracksChanged,
            ),
            (
                audio_track_list(&self.element),
                NativeEvent::AudioTracksChanged,
            ),
        ];
        for (list, signal) in track_lists {
            let Some(list) = list else { continue };
            let list: EventTarget = list.unchecked_into();
            for &name in TRACK_LIST_EVENTS {
                let sink = sink.clone();
                let signal = signal.clone();
                let closure = Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
                    sink.dispatch(signal.clone());
                });
                listeners.push(Listener::install(list.clone(), name, closure));
            }
        }
    }

    fn text_track_at(&self, index: usize) -> Option<TextTrack> {
        self.element.text_tracks()?.get(index as u32)
    }

    fn audio_track_at(&self, index: usize) -> Option<JsValue> {
        let list = audio_track_list(&self.element)?;
        Reflect::get_u32(&list, index as u32)
            .ok()
            .filter(JsValue::is_object)
    }
}

/// `element.audioTracks`; missing where the browser keeps it behind a flag.
fn audio_track_list(element: &HtmlMediaElement) -> Option<JsValue> {
    Reflect::get(element, &JsValue::from_str("audioTracks"))
        .ok()
        .filter(JsValue::is_object)
}

fn property(target: &JsValue, name: &str) -> Option<JsValue> {
    Reflect::get(target, &JsValue::from_str(name)).ok()
}

fn string_property(target: &JsValue, name: &str) -> String {
    property(target, name)
        .and_then(|value| value.as_string())
        .unwrap_or_default()
}

fn native_audio_track(track: &JsValue) -> NativeAudioTrack {
    NativeAudioTrack {
        id: string_property(track, "id"),
        label: string_property(track, "label"),
        language: string_property(track, "language"),
        enabled: property(track, "enabled")
            .and_then(|value| value.as_bool())
            .unwrap_or(false),
    }
}

fn map_media_event(name: &str, element: &HtmlMediaElement) -> Option<NativeEvent> {
    let event = match name {
        "loadstart" => NativeEvent::LoadStart,
        "loadedmetadata" => NativeEvent::LoadedMetadata,
        "durationchange" => NativeEvent::DurationChange,
        "canplay" => NativeEvent::CanPlay,
        "playing" => NativeEvent::Playing,
        "pause" => NativeEvent::Pause,
        "waiting" => NativeEvent::Waiting,
        "seeking" => NativeEvent::Seeking,
        "seeked" => NativeEvent::Seeked,
        "timeupdate" => NativeEvent::TimeUpdate,
        "progress" => NativeEvent::Progress,
        "ended" => NativeEvent::Ended,
        "error" => NativeEvent::Error(media_error(element)?),
        "volumechange" => NativeEvent::VolumeChange,
        "ratechange" => NativeEvent::RateChange,
        "resize" => NativeEvent::Resize,
        _ => return None,
    };
    Some(event)
}

fn media_error(element: &HtmlMediaElement) -> Option<NativeMediaError> {
    element
        .error()
        .map(|error| NativeMediaError::new(error.code(), error.message()))
}

fn time_ranges(ranges: TimeRanges) -> Vec<TimeRange> {
    (0..ranges.length())
        .filter_map(|i| match (ranges.start(i), ranges.end(i)) {
            (Ok(start), Ok(end)) => Some(TimeRange::new(start, end)),
            _ => None,
        })
        .collect()
}

fn rejection(err: JsValue) -> PlayRejection {
    err.dyn_ref::<DomException>()
        .map(|exception| PlayRejection::from_dom_name(&exception.name()))
        .unwrap_or(PlayRejection::NotSupported)
}

fn track_kind(kind: TextTrackKind) -> &'static str {
    match kind {
        TextTrackKind::Subtitles => "subtitles",
        TextTrackKind::Captions => "captions",
        TextTrackKind::Descriptions => "descriptions",
        TextTrackKind::Chapters => "chapters",
        _ => "metadata",
    }
}

fn track_mode(mode: web_sys::TextTrackMode) -> TextTrackMode {
    match mode {
        web_sys::TextTrackMode::Showing => TextTrackMode::Showing,
        web_sys::TextTrackMode::Hidden => TextTrackMode::Hidden,
        _ => TextTrackMode::Disabled,
    }
}

fn native_track(track: &TextTrack) -> NativeTextTrack {
    let cues = track
        .cues()
        .map(|list| {
            (0..list.length())
                .filter_map(|i| list.get(i))
                .map(|cue| NativeCue {
                    start: cue.start_time(),
                    end: cue.end_time(),
                    text: cue
                        .dyn_ref::<VttCue>()
                        .map(|vtt| vtt.text())
                        .unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    NativeTextTrack {
        kind: track_kind(track.kind()).to_string(),
        label: track.label(),
        language: track.language(),
        mode: track_mode(track.mode()),
        cues,
        default: false,
    }
}

#[async_trait(?Send)]
impl MediaElement for WebMediaElement {
    fn set_event_sink(&self, sink: Option<NativeEventSink>) {
        self.listeners.borrow_mut().clear();
        if let Some(sink) = sink {
            self.install_listeners(sink);
        }
    }

    fn set_src(&self, src: Option<&ElementSource>) {
        match src {
            Some(source) => self.element.set_src(&source.url),
            None => {
                let _ = self.element.remove_attribute("src");
            }
        }
    }

    fn src(&self) -> Option<String> {
        self.element.get_attribute("src")
    }

    fn load(&self) {
        self.element.load();
    }

    async fn play(&self) -> Result<(), PlayRejection> {
        let promise = self.element.play().map_err(rejection)?;
        JsFuture::from(promise).await.map(|_| ()).map_err(rejection)
    }

    fn pause(&self) {
        if let Err(err) = self.element.pause() {
            debug!(error = ?WasmError::from(err), "pause() threw");
        }
    }

    fn paused(&self) -> bool {
        self.element.paused()
    }

    fn ended(&self) -> bool {
        self.element.ended()
    }

    fn seeking(&self) -> bool {
        self.element.seeking()
    }

    fn current_time(&self) -> f64 {
        self.element.current_time()
    }

    fn set_current_time(&self, seconds: f64) {
        self.element.set_current_time(seconds);
    }

    fn duration(&self) -> f64 {
        self.element.duration()
    }

    fn seekable(&self) -> Vec<TimeRange> {
        time_ranges(self.element.seekable())
    }

    fn buffered(&self) -> Vec<TimeRange> {
        time_ranges(self.element.buffered())
    }

    fn volume(&self) -> f64 {
        self.element.volume()
    }

    fn set_volume(&self, volume: f64) {
        self.element.set_volume(volume.clamp(0.0, 1.0));
    }

    fn muted(&self) -> bool {
        self.element.muted()
    }

    fn set_muted(&self, muted: bool) {
        self.element.set_muted(muted);
    }

    fn playback_rate(&self) -> f64 {
        self.element.playback_rate()
    }

    fn set_playback_rate(&self, rate: f64) {
        self.element.set_playback_rate(rate);
    }

    fn video_size(&self) -> (u32, u32) {
        self.element
            .dyn_ref::<HtmlVideoElement>()
            .map(|video| (video.video_width(), video.video_height()))
            .unwrap_or((0, 0))
    }

    fn error(&self) -> Option<NativeMediaError> {
        media_error(&self.element)
    }

    fn audio_tracks(&self) -> Vec<NativeAudioTrack> {
        let Some(list) = audio_track_list(&self.element) else {
            return Vec::new();
        };
        let length = property(&list, "length")
            .and_then(|value| value.as_f64())
            .unwrap_or(0.0) as u32;
        (0..length)
            .filter_map(|i| Reflect::get_u32(&list, i).ok())
            .filter(JsValue::is_object)
            .map(|track| native_audio_track(&track))
            .collect()
    }

    fn set_audio_track_enabled(&self, index: usize, enabled: bool) {
        let Some(track) = self.audio_track_at(index) else {
            return;
        };
        if let Err(err) = Reflect::set(
            &track,
            &JsValue::from_str("enabled"),
            &JsValue::from_bool(enabled),
        ) {
            debug!(index, error = ?WasmError::from(err), "Failed to toggle audio track");
        }
    }

    fn text_tracks(&self) -> Vec<NativeTextTrack> {
        let Some(list) = self.element.text_tracks() else {
            return Vec::new();
        };
        (0..list.length())
            .filter_map(|i| list.get(i))
            .map(|track| native_track(&track))
            .collect()
    }

    fn set_text_track_mode(&self, index: usize, mode: TextTrackMode) {
        if let Some(track) = self.text_track_at(index) {
            track.set_mode(match mode {
                TextTrackMode::Disabled => web_sys::TextTrackMode::Disabled,
                TextTrackMode::Hidden => web_sys::TextTrackMode::Hidden,
                TextTrackMode::Showing => web_sys::TextTrackMode::Showing,
            });
        }
    }

    fn set_mounted(&self, mounted: bool) {
        let attached = self.element.parent_node().is_some();
        if mounted && !attached {
            if let Err(err) = self.container.append_child(&self.element) {
                warn!(error = ?WasmError::from(err), "Failed to mount media element");
            }
        } else if !mounted && attached {
            self.element.remove();
        }
    }

    fn resize(&self, width: u32, height: u32) {
        let style = self.element.style();
        let _ = style.set_property("width", &format!("{width}px"));
        let _ = style.set_property("height", &format!("{height}px"));
    }
}

/// Creates `<video>` elements inside a player container.
pub struct DomElementFactory {
    document: Document,
    container: HtmlElement,
    class_prefix: String,
}

impl DomElementFactory {
    /// Factory mounting elements into `container`.
    pub fn new(container: HtmlElement) -> WasmResult<Self> {
        let document = container
            .owner_document()
            .ok_or_else(|| WasmError::NotAvailable("document".to_string()))?;
        Ok(Self {
            document,
            container,
            class_prefix: "player-media".to_string(),
        })
    }

    /// CSS class prefix; elements get `<prefix> <prefix>-<tag>`.
    pub fn with_class_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.class_prefix = prefix.into();
        self
    }

    fn create_video(&self, tag: &CapabilityTag) -> WasmResult<HtmlMediaElement> {
        let element = self
            .document
            .create_element("video")?
            .dyn_into::<HtmlMediaElement>()
            .map_err(|_| WasmError::Dom("created node is not a media element".to_string()))?;

        element.set_attribute("playsinline", "")?;
        element.set_attribute("preload", "metadata")?;
        element.set_class_name(&format!("{0} {0}-{1}", self.class_prefix, tag));
        Ok(element)
    }
}

impl MediaElementFactory for DomElementFactory {
    fn create_element(&self, tag: &CapabilityTag) -> BridgeResult<Arc<dyn MediaElement>> {
        let element = self.create_video(tag)?;
        debug!(tag = %tag, "Created media element");
        Ok(Arc::new(WebMediaElement::new(element, self.container.clone())))
    }

    fn release_element(&self, element: &Arc<dyn MediaElement>) {
        element.set_event_sink(None);
        element.pause();
        element.set_src(None);
        element.load();
        element.set_mounted(false);
    }
}
