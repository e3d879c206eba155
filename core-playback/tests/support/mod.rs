//! Scripted native doubles shared by the integration tests.
//!
//! [`MockElement`] behaves like a minimal media element: `play()` resolves
//! according to a script, commands update local state, and tests push native
//! events into whatever sink the provider installed.

#![allow(dead_code)]

use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    box_future, CapabilityTag, ElementSource, MediaElement, MediaElementFactory, NativeAudioTrack,
    NativeEvent, NativeEventSink, NativeMediaError, NativeTextTrack, PlatformFuture, PlayRejection,
    TextTrackMode, TimeRange,
};
use core_playback::provider::{Html5Provider, Provider, ProviderContext, ProviderFactory};
use core_playback::{Player, PlayerConfig, PlayerEvent, PlaylistItem, ProviderRegistry, Source};
use core_runtime::config::CoreConfig;
use core_runtime::events::EventStream;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::oneshot;

/// How a `play()` call settles.
pub enum PlayScript {
    Resolve(Result<(), PlayRejection>),
    /// Settles when the sender fires; a dropped sender counts as `AbortError`.
    Gate(oneshot::Receiver<Result<(), PlayRejection>>),
    /// Never settles.
    Hang,
}

#[derive(Default)]
struct ElementState {
    src: Option<String>,
    paused: bool,
    ended: bool,
    current_time: f64,
    duration: f64,
    seekable: Vec<TimeRange>,
    volume: f64,
    muted: bool,
    playback_rate: f64,
    video_size: (u32, u32),
    error: Option<NativeMediaError>,
    mounted: bool,
    text_tracks: Vec<NativeTextTrack>,
    audio_tracks: Vec<NativeAudioTrack>,
    base_url: Option<String>,
    sink: Option<NativeEventSink>,
    loads: usize,
    plays: usize,
    script: VecDeque<PlayScript>,
    unmuted_default: Option<Result<(), PlayRejection>>,
    muted_default: Option<Result<(), PlayRejection>>,
}

pub struct MockElement {
    tag: CapabilityTag,
    state: Mutex<ElementState>,
}

impl MockElement {
    pub fn new(tag: CapabilityTag) -> Self {
        Self {
            tag,
            state: Mutex::new(ElementState {
                paused: true,
                duration: f64::NAN,
                volume: 1.0,
                playback_rate: 1.0,
                unmuted_default: Some(Ok(())),
                muted_default: Some(Ok(())),
                ..ElementState::default()
            }),
        }
    }

    pub fn tag(&self) -> &CapabilityTag {
        &self.tag
    }

    /// Queue the outcome of the next `play()`.
    pub fn script_play(&self, script: PlayScript) {
        self.state.lock().script.push_back(script);
    }

    /// Outcome of unscripted plays; `None` hangs.
    pub fn set_play_policy(
        &self,
        unmuted: Option<Result<(), PlayRejection>>,
        muted: Option<Result<(), PlayRejection>>,
    ) {
        let mut state = self.state.lock();
        state.unmuted_default = unmuted;
        state.muted_default = muted;
    }

    /// Push a native event into the installed sink. Returns `false` when no
    /// listener is attached.
    pub fn emit(&self, event: NativeEvent) -> bool {
        let sink = self.state.lock().sink.clone();
        match sink {
            Some(sink) => sink.dispatch(event),
            None => false,
        }
    }

    /// Metadata for a VOD item of `duration` seconds.
    pub fn emit_metadata(&self, duration: f64) {
        {
            let mut state = self.state.lock();
            state.duration = duration;
            state.video_size = (1280, 720);
        }
        self.emit(NativeEvent::LoadedMetadata);
    }

    /// Metadata for a live stream with the given seekable window.
    pub fn emit_live_metadata(&self, window: Option<(f64, f64)>) {
        {
            let mut state = self.state.lock();
            state.duration = f64::INFINITY;
            state.seekable = window
                .map(|(start, end)| vec![TimeRange::new(start, end)])
                .unwrap_or_default();
        }
        self.emit(NativeEvent::LoadedMetadata);
    }

    pub fn set_time(&self, seconds: f64) {
        self.state.lock().current_time = seconds;
    }

    /// Play to the end the way browsers do: `pause` then `ended`.
    pub fn finish(&self) {
        {
            let mut state = self.state.lock();
            state.ended = true;
            state.paused = true;
            if state.duration.is_finite() {
                state.current_time = state.duration;
            }
        }
        self.emit(NativeEvent::Pause);
        self.emit(NativeEvent::Ended);
    }

    pub fn fail(&self, code: u16, message: &str) {
        let error = NativeMediaError::new(code, message);
        self.state.lock().error = Some(error.clone());
        self.emit(NativeEvent::Error(error));
    }

    pub fn set_text_tracks(&self, tracks: Vec<NativeTextTrack>) {
        self.state.lock().text_tracks = tracks;
        self.emit(NativeEvent::TextTracksChanged);
    }

    pub fn set_audio_tracks(&self, tracks: Vec<NativeAudioTrack>) {
        self.state.lock().audio_tracks = tracks;
        self.emit(NativeEvent::AudioTracksChanged);
    }

    /// Report relative sources resolved against `base`, as `currentSrc` does.
    pub fn set_base_url(&self, base: &str) {
        self.state.lock().base_url = Some(base.to_string());
    }

    /// Change the rendered geometry and fire `resize`.
    pub fn resize_video(&self, width: u32, height: u32) {
        self.state.lock().video_size = (width, height);
        self.emit(NativeEvent::Resize);
    }

    pub fn loads(&self) -> usize {
        self.state.lock().loads
    }

    pub fn plays(&self) -> usize {
        self.state.lock().plays
    }

    pub fn is_mounted(&self) -> bool {
        self.state.lock().mounted
    }

    pub fn has_listener(&self) -> bool {
        self.state.lock().sink.is_some()
    }

    pub fn current_src(&self) -> Option<String> {
        self.state.lock().src.clone()
    }

    pub fn time(&self) -> f64 {
        self.state.lock().current_time
    }

    pub fn rate(&self) -> f64 {
        self.state.lock().playback_rate
    }
}

#[async_trait::async_trait]
impl MediaElement for MockElement {
    fn set_event_sink(&self, sink: Option<NativeEventSink>) {
        self.state.lock().sink = sink;
    }

    fn set_src(&self, src: Option<&ElementSource>) {
        self.state.lock().src = src.map(|s| s.url.clone());
    }

    fn src(&self) -> Option<String> {
        let state = self.state.lock();
        let src = state.src.clone()?;
        match &state.base_url {
            Some(base) if !src.contains("://") => Some(format!("{base}{src}")),
            _ => Some(src),
        }
    }

    fn load(&self) {
        let sink = {
            let mut state = self.state.lock();
            state.loads += 1;
            state.ended = false;
            state.paused = true;
            state.error = None;
            state.current_time = 0.0;
            state.duration = f64::NAN;
            state.sink.clone()
        };
        if let Some(sink) = sink {
            sink.dispatch(NativeEvent::LoadStart);
        }
    }

    async fn play(&self) -> Result<(), PlayRejection> {
        let script = {
            let mut state = self.state.lock();
            state.plays += 1;
            match state.script.pop_front() {
                Some(script) => script,
                None => {
                    let default = if state.muted {
                        state.muted_default
                    } else {
                        state.unmuted_default
                    };
                    match default {
                        Some(result) => PlayScript::Resolve(result),
                        None => PlayScript::Hang,
                    }
                }
            }
        };

        let result = match script {
            PlayScript::Resolve(result) => result,
            PlayScript::Gate(gate) => gate.await.unwrap_or(Err(PlayRejection::Abort)),
            PlayScript::Hang => futures::future::pending().await,
        };

        if result.is_ok() {
            let sink = {
                let mut state = self.state.lock();
                state.paused = false;
                state.ended = false;
                state.sink.clone()
            };
            if let Some(sink) = sink {
                sink.dispatch(NativeEvent::Playing);
            }
        }
        result
    }

    fn pause(&self) {
        let sink = {
            let mut state = self.state.lock();
            let was_playing = !state.paused;
            state.paused = true;
            was_playing.then(|| state.sink.clone()).flatten()
        };
        if let Some(sink) = sink {
            sink.dispatch(NativeEvent::Pause);
        }
    }

    fn paused(&self) -> bool {
        self.state.lock().paused
    }

    fn ended(&self) -> bool {
        self.state.lock().ended
    }

    fn seeking(&self) -> bool {
        false
    }

    fn current_time(&self) -> f64 {
        self.state.lock().current_time
    }

    fn set_current_time(&self, seconds: f64) {
        self.state.lock().current_time = seconds;
    }

    fn duration(&self) -> f64 {
        self.state.lock().duration
    }

    fn seekable(&self) -> Vec<TimeRange> {
        self.state.lock().seekable.clone()
    }

    fn buffered(&self) -> Vec<TimeRange> {
        Vec::new()
    }

    fn volume(&self) -> f64 {
        self.state.lock().volume
    }

    fn set_volume(&self, volume: f64) {
        self.state.lock().volume = volume;
    }

    fn muted(&self) -> bool {
        self.state.lock().muted
    }

    fn set_muted(&self, muted: bool) {
        self.state.lock().muted = muted;
    }

    fn playback_rate(&self) -> f64 {
        self.state.lock().playback_rate
    }

    fn set_playback_rate(&self, rate: f64) {
        self.state.lock().playback_rate = rate;
    }

    fn video_size(&self) -> (u32, u32) {
        self.state.lock().video_size
    }

    fn error(&self) -> Option<NativeMediaError> {
        self.state.lock().error.clone()
    }

    fn audio_tracks(&self) -> Vec<NativeAudioTrack> {
        self.state.lock().audio_tracks.clone()
    }

    fn set_audio_track_enabled(&self, index: usize, enabled: bool) {
        if let Some(track) = self.state.lock().audio_tracks.get_mut(index) {
            track.enabled = enabled;
        }
    }

    fn text_tracks(&self) -> Vec<NativeTextTrack> {
        self.state.lock().text_tracks.clone()
    }

    fn set_text_track_mode(&self, index: usize, mode: TextTrackMode) {
        if let Some(track) = self.state.lock().text_tracks.get_mut(index) {
            track.mode = mode;
        }
    }

    fn set_mounted(&self, mounted: bool) {
        self.state.lock().mounted = mounted;
    }
}

/// Factory recording every element it hands out.
#[derive(Default)]
pub struct MockElementFactory {
    elements: Mutex<Vec<Arc<MockElement>>>,
    policies: Mutex<HashMap<CapabilityTag, (Option<Result<(), PlayRejection>>, Option<Result<(), PlayRejection>>)>>,
    released: Mutex<usize>,
    base_url: Mutex<Option<String>>,
}

impl MockElementFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Play policy applied to elements created for `tag` from now on.
    pub fn set_play_policy(
        &self,
        tag: CapabilityTag,
        unmuted: Option<Result<(), PlayRejection>>,
        muted: Option<Result<(), PlayRejection>>,
    ) {
        self.policies.lock().insert(tag, (unmuted, muted));
    }

    /// Base URL of the page hosting elements created from now on.
    pub fn set_base_url(&self, base: &str) {
        *self.base_url.lock() = Some(base.to_string());
    }

    pub fn elements(&self) -> Vec<Arc<MockElement>> {
        self.elements.lock().clone()
    }

    pub fn elements_for(&self, tag: &CapabilityTag) -> Vec<Arc<MockElement>> {
        self.elements
            .lock()
            .iter()
            .filter(|element| element.tag() == tag)
            .cloned()
            .collect()
    }

    /// The one content element currently on the visible surface.
    pub fn visible(&self) -> Arc<MockElement> {
        let visible: Vec<_> = self
            .elements_for(&CapabilityTag::HTML5)
            .into_iter()
            .filter(|element| element.is_mounted())
            .collect();
        assert_eq!(visible.len(), 1, "expected exactly one visible content element");
        visible[0].clone()
    }

    pub fn released(&self) -> usize {
        *self.released.lock()
    }
}

impl MediaElementFactory for MockElementFactory {
    fn create_element(&self, tag: &CapabilityTag) -> BridgeResult<Arc<dyn MediaElement>> {
        let element = Arc::new(MockElement::new(tag.clone()));
        if let Some((unmuted, muted)) = self.policies.lock().get(tag) {
            element.set_play_policy(*unmuted, *muted);
        }
        if let Some(base) = self.base_url.lock().as_deref() {
            element.set_base_url(base);
        }
        self.elements.lock().push(element.clone());
        Ok(element)
    }

    fn release_element(&self, _element: &Arc<dyn MediaElement>) {
        *self.released.lock() += 1;
    }
}

/// HTML5 provider factory whose construction waits for a gate, in order.
#[derive(Default)]
pub struct GatedProviderFactory {
    gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
}

impl GatedProviderFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `create` waits until the returned sender fires.
    pub fn gate(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().push_back(rx);
        tx
    }
}

impl ProviderFactory for GatedProviderFactory {
    fn name(&self) -> &'static str {
        "gated-html5"
    }

    fn supports(&self, _source: &Source) -> bool {
        true
    }

    fn capability(&self) -> CapabilityTag {
        CapabilityTag::HTML5
    }

    fn create(
        &self,
        element: Arc<dyn MediaElement>,
        context: ProviderContext,
    ) -> PlatformFuture<'static, core_playback::Result<Box<dyn Provider>>> {
        let gate = self.gates.lock().pop_front();
        box_future(async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            Ok(Box::new(Html5Provider::new(element, context)) as Box<dyn Provider>)
        })
    }
}

pub struct Harness {
    pub player: Player,
    pub factory: Arc<MockElementFactory>,
    pub events: EventStream,
}

impl Harness {
    pub fn new(config: PlayerConfig) -> Self {
        Self::build(config, None, |builder| builder)
    }

    pub fn with_registry(config: PlayerConfig, registry: ProviderRegistry) -> Self {
        Self::build(config, Some(registry), |builder| builder)
    }

    pub fn build(
        config: PlayerConfig,
        registry: Option<ProviderRegistry>,
        customize: impl FnOnce(
            core_runtime::config::CoreConfigBuilder,
        ) -> core_runtime::config::CoreConfigBuilder,
    ) -> Self {
        let factory = MockElementFactory::new();
        let bridges = customize(CoreConfig::builder().element_factory(factory.clone()))
            .build()
            .unwrap();
        let player = match registry {
            Some(registry) => Player::with_registry(config, bridges, registry).unwrap(),
            None => Player::new(config, bridges).unwrap(),
        };
        let events = player.events();
        Self {
            player,
            factory,
            events,
        }
    }

    pub fn drain(&mut self) -> Vec<PlayerEvent> {
        self.events.drain()
    }
}

pub fn item(file: &str) -> PlaylistItem {
    PlaylistItem::new(file)
}

pub fn names(events: &[PlayerEvent]) -> Vec<&'static str> {
    events.iter().map(PlayerEvent::name).collect()
}

/// Index of the first event named `name`.
pub fn position_of(events: &[PlayerEvent], name: &str) -> Option<usize> {
    events.iter().position(|event| event.name() == name)
}
