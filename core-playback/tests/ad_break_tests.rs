//! Ad breaks taking over and handing back the visible surface.

mod support;

use bridge_traits::CapabilityTag;
use core_playback::{AdBreak, PlaybackError, PlayReason, PlayerConfig, PlayerEvent, PlayerState};
use core_runtime::events::{AdEvent, MediaEvent, PauseReason, PlaylistEvent};
use std::sync::Arc;
use support::{item, names, Harness, MockElement, PlayScript};
use tokio::sync::oneshot;

async fn playing_content(duration: f64) -> (Harness, Arc<MockElement>) {
    let mut h = Harness::new(PlayerConfig::default());
    h.player
        .load(vec![item("https://cdn.example.com/feature.mp4")])
        .await
        .unwrap();
    h.player.play(PlayReason::Interaction).await.unwrap();
    let content = h.factory.visible();
    content.emit_metadata(duration);
    h.player.process_media_events().await.unwrap();
    h.drain();
    (h, content)
}

fn ad_element(h: &Harness) -> Arc<MockElement> {
    let ads = h.factory.elements_for(&CapabilityTag::AD);
    assert_eq!(ads.len(), 1);
    ads[0].clone()
}

#[tokio::test]
async fn midroll_restores_content_position_and_resumes() {
    let (mut h, content) = playing_content(120.0).await;
    content.set_time(42.0);

    h.player
        .start_ad_break(AdBreak::Items(vec![item("https://ads.example.com/spot.mp4")]))
        .await
        .unwrap();
    assert!(h.player.model().in_ad_break);
    assert!(!content.is_mounted());
    assert!(!content.has_listener());

    let ad = ad_element(&h);
    assert!(ad.is_mounted());
    assert_eq!(h.player.debug_snapshot().visible_providers(), 1);

    // The shared element was reset underneath the break.
    content.set_time(0.0);

    ad.finish();
    h.player.process_media_events().await.unwrap();

    let events = h.drain();
    let sequence: Vec<_> = names(&events)
        .into_iter()
        .filter(|name| name.starts_with("ad") && *name != "adTime")
        .collect();
    assert_eq!(sequence, ["adBreakStart", "adPlay", "adComplete", "adBreakEnd"]);
    assert!(events.contains(&PlayerEvent::Media(MediaEvent::Pause {
        old_state: PlayerState::Playing,
        reason: Some(PauseReason::Ad),
    })));

    let break_end = events
        .iter()
        .position(|e| e == &PlayerEvent::Ad(AdEvent::AdBreakEnd))
        .unwrap();
    assert!(events[break_end..].iter().any(|e| matches!(
        e,
        PlayerEvent::Media(MediaEvent::Play {
            reason: PlayReason::Interaction,
            ..
        })
    )));
    assert!(!events.contains(&PlayerEvent::Media(MediaEvent::Complete)));

    assert_eq!(content.time(), 42.0);
    assert!(content.is_mounted());
    assert!(content.has_listener());
    assert!(!ad.is_mounted());
    assert!(!h.player.model().in_ad_break);
    assert_eq!(h.player.state(), PlayerState::Playing);
}

#[tokio::test]
async fn postroll_defers_completion_until_break_ends() {
    let (mut h, content) = playing_content(30.0).await;

    content.finish();
    h.player.process_media_events().await.unwrap();
    assert!(h
        .drain()
        .contains(&PlayerEvent::Media(MediaEvent::BeforeComplete)));

    h.player
        .start_ad_break(AdBreak::Items(vec![item("https://ads.example.com/post.mp4")]))
        .await
        .unwrap();
    // A checkpoint during the break must not complete the backgrounded item.
    h.player.process_media_events().await.unwrap();
    let during = h.drain();
    assert!(!during.contains(&PlayerEvent::Media(MediaEvent::Complete)));
    assert!(!during.iter().any(|e| matches!(e, PlayerEvent::Media(MediaEvent::Pause { .. }))));

    ad_element(&h).finish();
    h.player.process_media_events().await.unwrap();
    let events = h.drain();

    let break_end = events
        .iter()
        .position(|e| e == &PlayerEvent::Ad(AdEvent::AdBreakEnd))
        .expect("adBreakEnd");
    let complete = events
        .iter()
        .position(|e| e == &PlayerEvent::Media(MediaEvent::Complete))
        .expect("complete");
    let playlist_complete = events
        .iter()
        .position(|e| e == &PlayerEvent::Playlist(PlaylistEvent::PlaylistComplete))
        .expect("playlistComplete");
    assert!(break_end < complete && complete < playlist_complete);
    assert!(!events.iter().any(|e| matches!(e, PlayerEvent::Media(MediaEvent::Play { .. }))));
    assert_eq!(h.player.state(), PlayerState::Complete);
}

#[tokio::test]
async fn multi_ad_break_plays_every_ad_in_order() {
    let (mut h, _content) = playing_content(120.0).await;

    h.player
        .start_ad_break(AdBreak::Items(vec![
            item("https://ads.example.com/one.mp4"),
            item("https://ads.example.com/two.mp4"),
        ]))
        .await
        .unwrap();
    let ad = ad_element(&h);
    assert_eq!(ad.current_src().as_deref(), Some("https://ads.example.com/one.mp4"));

    ad.finish();
    h.player.process_media_events().await.unwrap();
    assert_eq!(ad.current_src().as_deref(), Some("https://ads.example.com/two.mp4"));
    assert_eq!(h.player.debug_snapshot().ad_index, Some(1));

    ad.finish();
    h.player.process_media_events().await.unwrap();
    let events = h.drain();
    assert!(events.contains(&PlayerEvent::Ad(AdEvent::AdComplete { ad_index: 0 })));
    assert!(events.contains(&PlayerEvent::Ad(AdEvent::AdPlay { ad_index: 1 })));
    assert!(events.contains(&PlayerEvent::Ad(AdEvent::AdComplete { ad_index: 1 })));
    assert!(events.contains(&PlayerEvent::Ad(AdEvent::AdBreakEnd)));
    assert!(!h.player.debug_snapshot().ad_active);
}

#[tokio::test]
async fn skip_respects_offset_and_latches_until_next_ad() {
    let (mut h, _content) = playing_content(120.0).await;

    h.player
        .start_ad_break(AdBreak::Items(vec![
            item("https://ads.example.com/one.mp4").with_skip_offset(5.0),
            item("https://ads.example.com/two.mp4"),
        ]))
        .await
        .unwrap();
    let ad = ad_element(&h);

    let early = h.player.skip_ad().await.unwrap_err();
    assert!(matches!(early, PlaybackError::InvalidArgument { field: "skip_offset", .. }));

    ad.set_time(6.0);
    ad.emit(bridge_traits::NativeEvent::TimeUpdate);
    h.player.process_media_events().await.unwrap();
    h.drain();

    // Hold the second ad's play open so the skip latch is still set.
    let (started, gate) = oneshot::channel();
    ad.script_play(PlayScript::Gate(gate));
    let (first, second) = tokio::join!(h.player.skip_ad(), async {
        let result = h.player.skip_ad().await;
        let _ = started.send(Ok(()));
        result
    });
    first.unwrap();
    second.unwrap();

    let events = h.drain();
    let skipped: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, PlayerEvent::Ad(AdEvent::AdSkipped { .. })))
        .collect();
    assert_eq!(skipped, [&PlayerEvent::Ad(AdEvent::AdSkipped { ad_index: 0 })]);
    assert!(events.contains(&PlayerEvent::Ad(AdEvent::AdPlay { ad_index: 1 })));
    assert_eq!(h.player.debug_snapshot().ad_index, Some(1));
}

#[tokio::test]
async fn rejected_ad_play_ends_break_with_ad_error() {
    let (mut h, content) = playing_content(120.0).await;
    content.set_time(10.0);
    h.factory.set_play_policy(
        CapabilityTag::AD,
        Some(Err(bridge_traits::PlayRejection::NotSupported)),
        Some(Err(bridge_traits::PlayRejection::NotSupported)),
    );

    h.player
        .start_ad_break(AdBreak::Items(vec![item("https://ads.example.com/broken.mp4")]))
        .await
        .unwrap();

    let events = h.drain();
    assert!(events
        .iter()
        .any(|e| matches!(e, PlayerEvent::Ad(AdEvent::AdError { code: 402000, .. }))));
    assert!(events.contains(&PlayerEvent::Ad(AdEvent::AdBreakEnd)));
    assert!(!h.player.debug_snapshot().ad_active);
    assert_eq!(h.player.state(), PlayerState::Playing);
    assert_eq!(content.time(), 10.0);
}

#[tokio::test]
async fn commands_during_break_are_refused() {
    let (h, _content) = playing_content(120.0).await;
    h.player
        .start_ad_break(AdBreak::Items(vec![item("https://ads.example.com/spot.mp4")]))
        .await
        .unwrap();

    assert!(matches!(
        h.player.seek(10.0).await,
        Err(PlaybackError::AdBreakInProgress)
    ));
    assert!(matches!(
        h.player
            .start_ad_break(AdBreak::Items(vec![item("https://ads.example.com/x.mp4")]))
            .await,
        Err(PlaybackError::AdBreakInProgress)
    ));

    h.player.end_ad_break(false).await.unwrap();
    assert!(matches!(
        h.player.end_ad_break(true).await,
        Err(PlaybackError::NoAdBreak)
    ));
    assert_ne!(h.player.state(), PlayerState::Playing);
}

async fn finished_first_of_two() -> (Harness, Arc<MockElement>) {
    let mut h = Harness::new(PlayerConfig::default());
    h.player
        .load(vec![
            item("https://cdn.example.com/episode-1.mp4"),
            item("https://cdn.example.com/episode-2.mp4"),
        ])
        .await
        .unwrap();
    h.player.play(PlayReason::Interaction).await.unwrap();
    let content = h.factory.visible();
    content.emit_metadata(30.0);
    h.player.process_media_events().await.unwrap();
    content.finish();
    h.player.process_media_events().await.unwrap();
    h.player
        .start_ad_break(AdBreak::Items(vec![item("https://ads.example.com/post.mp4")]))
        .await
        .unwrap();
    h.drain();
    (h, content)
}

fn advanced(events: &[PlayerEvent]) -> bool {
    events
        .iter()
        .any(|e| matches!(e, PlayerEvent::Playlist(PlaylistEvent::PlaylistItem { .. })))
}

#[tokio::test]
async fn stop_during_postroll_completes_without_advancing() {
    let (mut h, _content) = finished_first_of_two().await;

    h.player.stop().unwrap();
    h.player.process_media_events().await.unwrap();

    let events = h.drain();
    assert!(events.contains(&PlayerEvent::Ad(AdEvent::AdBreakEnd)));
    assert!(events.contains(&PlayerEvent::Media(MediaEvent::Complete)));
    assert!(!advanced(&events));
    assert!(!events.iter().any(|e| matches!(e, PlayerEvent::Media(MediaEvent::Play { .. }))));
    assert_eq!(h.player.debug_snapshot().item_index, 0);
    assert_ne!(h.player.state(), PlayerState::Playing);
}

#[tokio::test]
async fn postroll_ended_without_resume_does_not_advance() {
    let (mut h, _content) = finished_first_of_two().await;

    h.player.end_ad_break(false).await.unwrap();

    let events = h.drain();
    assert!(events.contains(&PlayerEvent::Media(MediaEvent::Complete)));
    assert!(!advanced(&events));
    assert_eq!(h.player.debug_snapshot().item_index, 0);
    assert_eq!(h.player.state(), PlayerState::Complete);
}

#[tokio::test]
async fn finished_postroll_still_advances_the_playlist() {
    let (mut h, _content) = finished_first_of_two().await;

    ad_element(&h).finish();
    h.player.process_media_events().await.unwrap();

    assert!(advanced(&h.drain()));
    assert_eq!(h.player.debug_snapshot().item_index, 1);
}

fn mounted(h: &Harness) -> usize {
    h.factory
        .elements()
        .iter()
        .filter(|element| element.is_mounted())
        .count()
}

#[tokio::test]
async fn exactly_one_surface_is_mounted_around_an_ad_break() {
    let (mut h, content) = playing_content(120.0).await;
    assert_eq!(mounted(&h), 1);

    h.player
        .start_ad_break(AdBreak::Items(vec![item("https://ads.example.com/spot.mp4")]))
        .await
        .unwrap();
    assert_eq!(mounted(&h), 1);
    assert!(ad_element(&h).is_mounted());

    ad_element(&h).emit_metadata(15.0);
    h.player.process_media_events().await.unwrap();
    assert_eq!(mounted(&h), 1);

    ad_element(&h).finish();
    h.player.process_media_events().await.unwrap();
    h.drain();
    assert_eq!(mounted(&h), 1);
    assert!(content.is_mounted());
    assert!(!ad_element(&h).is_mounted());
}
