#![cfg(target_arch = "wasm32")]
//! Integration tests for the DOM media element bridge
//!
//! These run in a real browser and exercise element creation, mounting and
//! listener wiring against live `HTMLVideoElement`s.

use bridge_traits::media::{
    native_event_channel, CapabilityTag, ElementSource, MediaElement, MediaElementFactory,
    NativeAudioTrack, NativeEvent, PlayRejection,
};
use bridge_wasm::{DomElementFactory, WebMediaElement};
use js_sys::Reflect;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_test::*;
use web_sys::{HtmlElement, HtmlMediaElement};

wasm_bindgen_test_configure!(run_in_browser);

fn container() -> HtmlElement {
    let document = web_sys::window().unwrap().document().unwrap();
    let div = document
        .create_element("div")
        .unwrap()
        .dyn_into::<HtmlElement>()
        .unwrap();
    document.body().unwrap().append_child(&div).unwrap();
    div
}

#[wasm_bindgen_test]
fn test_created_elements_are_tagged_and_unmounted() {
    let container = container();
    let factory = DomElementFactory::new(container.clone()).unwrap();

    let element = factory.create_element(&CapabilityTag::AD).unwrap();
    assert_eq!(container.child_element_count(), 0);

    element.set_mounted(true);
    assert_eq!(container.child_element_count(), 1);
    let node = container.first_element_child().unwrap();
    assert!(node.class_name().contains("player-media-ad"));

    element.set_mounted(true);
    assert_eq!(container.child_element_count(), 1);

    element.set_mounted(false);
    assert_eq!(container.child_element_count(), 0);
}

#[wasm_bindgen_test]
fn test_src_round_trip_and_clear() {
    let factory = DomElementFactory::new(container()).unwrap();
    let element = factory.create_element(&CapabilityTag::HTML5).unwrap();

    element.set_src(Some(&ElementSource::new("https://cdn.example.com/a.mp4", None)));
    assert_eq!(element.src().as_deref(), Some("https://cdn.example.com/a.mp4"));

    element.set_src(None);
    assert_eq!(element.src(), None);
}

#[wasm_bindgen_test]
fn test_volume_and_rate_setters() {
    let factory = DomElementFactory::new(container()).unwrap();
    let element = factory.create_element(&CapabilityTag::HTML5).unwrap();

    element.set_volume(0.4);
    element.set_muted(true);
    element.set_playback_rate(1.5);

    assert!((element.volume() - 0.4).abs() < 1e-6);
    assert!(element.muted());
    assert_eq!(element.playback_rate(), 1.5);
    assert!(element.paused());
}

#[wasm_bindgen_test]
fn test_listeners_forward_dom_events() {
    let document = web_sys::window().unwrap().document().unwrap();
    let video = document
        .create_element("video")
        .unwrap()
        .dyn_into::<HtmlMediaElement>()
        .unwrap();
    let element = WebMediaElement::new(video, container());
    let (sink, mut queue) = native_event_channel();

    element.set_event_sink(Some(sink));
    let event = web_sys::Event::new("volumechange").unwrap();
    assert!(element.element().dispatch_event(&event).unwrap());
    assert_eq!(queue.drain(), vec![NativeEvent::VolumeChange]);

    element.set_event_sink(None);
    let event = web_sys::Event::new("playing").unwrap();
    element.element().dispatch_event(&event).unwrap();
    assert!(queue.drain().is_empty());
}

#[wasm_bindgen_test]
async fn test_play_without_source_is_rejected() {
    let factory = DomElementFactory::new(container()).unwrap();
    let element = factory.create_element(&CapabilityTag::PROBE).unwrap();

    let result = element.play().await;
    assert_eq!(result, Err(PlayRejection::NotSupported));
}

/// Install a scripted `audioTracks` list on `video`, shaped like the DOM one.
fn scripted_audio_tracks(video: &HtmlMediaElement) -> web_sys::EventTarget {
    let list = web_sys::EventTarget::new().unwrap();
    let tracks = [("a1", "English", "en", true), ("a2", "", "fr", false)];
    for (index, (id, label, language, enabled)) in tracks.iter().enumerate() {
        let track = js_sys::Object::new();
        Reflect::set(&track, &"id".into(), &JsValue::from_str(id)).unwrap();
        Reflect::set(&track, &"label".into(), &JsValue::from_str(label)).unwrap();
        Reflect::set(&track, &"language".into(), &JsValue::from_str(language)).unwrap();
        Reflect::set(&track, &"enabled".into(), &JsValue::from_bool(*enabled)).unwrap();
        Reflect::set(&list, &JsValue::from_f64(index as f64), &track).unwrap();
    }
    Reflect::set(&list, &"length".into(), &JsValue::from_f64(tracks.len() as f64)).unwrap();

    let descriptor = js_sys::Object::new();
    Reflect::set(&descriptor, &"value".into(), &list).unwrap();
    js_sys::Object::define_property(video.unchecked_ref(), &"audioTracks".into(), &descriptor);
    list
}

#[wasm_bindgen_test]
fn test_audio_tracks_are_read_toggled_and_watched() {
    let document = web_sys::window().unwrap().document().unwrap();
    let video = document
        .create_element("video")
        .unwrap()
        .dyn_into::<HtmlMediaElement>()
        .unwrap();
    let list = scripted_audio_tracks(&video);
    let element = WebMediaElement::new(video, container());
    let (sink, mut queue) = native_event_channel();
    element.set_event_sink(Some(sink));

    let tracks = element.audio_tracks();
    assert_eq!(
        tracks,
        vec![
            NativeAudioTrack {
                id: "a1".into(),
                label: "English".into(),
                language: "en".into(),
                enabled: true,
            },
            NativeAudioTrack {
                id: "a2".into(),
                label: String::new(),
                language: "fr".into(),
                enabled: false,
            },
        ]
    );

    element.set_audio_track_enabled(0, false);
    element.set_audio_track_enabled(1, true);
    element.set_audio_track_enabled(7, true);
    let enabled: Vec<bool> = element.audio_tracks().iter().map(|t| t.enabled).collect();
    assert_eq!(enabled, vec![false, true]);

    list.dispatch_event(&web_sys::Event::new("change").unwrap())
        .unwrap();
    assert_eq!(queue.drain(), vec![NativeEvent::AudioTracksChanged]);
}

#[wasm_bindgen_test]
fn test_missing_audio_track_list_reads_as_empty() {
    let document = web_sys::window().unwrap().document().unwrap();
    let video = document
        .create_element("video")
        .unwrap()
        .dyn_into::<HtmlMediaElement>()
        .unwrap();
    let descriptor = js_sys::Object::new();
    Reflect::set(&descriptor, &"value".into(), &JsValue::UNDEFINED).unwrap();
    js_sys::Object::define_property(video.unchecked_ref(), &"audioTracks".into(), &descriptor);
    let element = WebMediaElement::new(video, container());

    assert!(element.audio_tracks().is_empty());
    element.set_audio_track_enabled(0, true);
}
