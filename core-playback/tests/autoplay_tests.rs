//! Autostart negotiation against scripted probe elements.

mod support;

use bridge_traits::{CapabilityTag, PlayRejection};
use core_playback::{ErrorCode, PauseReason, PlayReason, PlayerConfig, PlayerEvent, PlayerState};
use core_runtime::events::MediaEvent;
use std::time::Duration;
use tokio::time::Instant;
use support::{item, Harness};

fn autostart_config() -> PlayerConfig {
    PlayerConfig {
        autostart: true,
        ..PlayerConfig::default()
    }
}

fn harness_with_probe(
    config: PlayerConfig,
    unmuted: Option<Result<(), PlayRejection>>,
    muted: Option<Result<(), PlayRejection>>,
) -> Harness {
    let h = Harness::new(config);
    h.factory.set_play_policy(CapabilityTag::PROBE, unmuted, muted);
    h
}

fn autostart_refusals(events: &[PlayerEvent]) -> usize {
    events
        .iter()
        .filter(|e| {
            matches!(
                e,
                PlayerEvent::Media(MediaEvent::AutostartNotAllowed { code })
                    if *code == ErrorCode::PLAY_NOT_ALLOWED.value()
            )
        })
        .count()
}

#[tokio::test]
async fn unmuted_autostart_plays_with_autostart_reason() {
    let mut h = harness_with_probe(autostart_config(), Some(Ok(())), Some(Ok(())));
    h.player
        .load(vec![item("https://cdn.example.com/a.mp4")])
        .await
        .unwrap();

    let events = h.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        PlayerEvent::Media(MediaEvent::Play {
            reason: PlayReason::Autostart,
            ..
        })
    )));
    assert!(!events
        .iter()
        .any(|e| matches!(e, PlayerEvent::Media(MediaEvent::Mute { .. }))));
    assert!(!h.player.model().mute);

    // The probe ran on its own element, never on content.
    let probes = h.factory.elements_for(&CapabilityTag::PROBE);
    assert_eq!(probes.len(), 1);
    assert!(!probes[0].is_mounted());
}

#[tokio::test]
async fn refused_unmuted_autostart_falls_back_to_muted() {
    let mut h = harness_with_probe(
        autostart_config(),
        Some(Err(PlayRejection::NotAllowed)),
        Some(Ok(())),
    );
    h.player
        .load(vec![item("https://cdn.example.com/a.mp4")])
        .await
        .unwrap();

    let events = h.drain();
    let mute = events
        .iter()
        .position(|e| e == &PlayerEvent::Media(MediaEvent::Mute { mute: true }))
        .expect("mute before play");
    let play = events
        .iter()
        .position(|e| {
            matches!(
                e,
                PlayerEvent::Media(MediaEvent::Play {
                    reason: PlayReason::Autostart,
                    ..
                })
            )
        })
        .expect("autostart play");
    assert!(mute < play);
    assert!(h.player.model().mute);
    assert_eq!(h.player.state(), PlayerState::Playing);
}

#[tokio::test]
async fn muted_fallback_can_be_disabled() {
    let config = PlayerConfig {
        allow_muted_autoplay: false,
        ..autostart_config()
    };
    let mut h = harness_with_probe(config, Some(Err(PlayRejection::NotAllowed)), Some(Ok(())));
    h.player
        .load(vec![item("https://cdn.example.com/a.mp4")])
        .await
        .unwrap();

    let events = h.drain();
    assert_eq!(autostart_refusals(&events), 1);
    assert!(!h.player.model().mute);
    assert_eq!(h.player.state(), PlayerState::Idle);
    assert_eq!(h.factory.visible().plays(), 0);
}

#[tokio::test(start_paused = true)]
async fn hanging_probe_times_out_and_is_retried_later() {
    let config = PlayerConfig {
        autoplay_timeout: Duration::from_secs(2),
        ..autostart_config()
    };
    let mut h = harness_with_probe(config, None, None);
    h.player
        .load(vec![item("https://cdn.example.com/a.mp4")])
        .await
        .unwrap();

    let events = h.drain();
    assert_eq!(autostart_refusals(&events), 1);
    assert!(!events
        .iter()
        .any(|e| matches!(e, PlayerEvent::Media(MediaEvent::Play { .. }))));
    assert_eq!(h.player.state(), PlayerState::Idle);

    // A refused probe is not memoized; the next autostart probes again.
    let probe = h.factory.elements_for(&CapabilityTag::PROBE)[0].clone();
    let attempts = probe.plays();
    probe.set_play_policy(Some(Ok(())), Some(Ok(())));
    h.player
        .load(vec![item("https://cdn.example.com/b.mp4")])
        .await
        .unwrap();

    assert!(probe.plays() > attempts);
    assert!(h.drain().iter().any(|e| matches!(
        e,
        PlayerEvent::Media(MediaEvent::Play {
            reason: PlayReason::Autostart,
            ..
        })
    )));
}

#[tokio::test]
async fn successful_probe_is_memoized_across_items() {
    let mut h = harness_with_probe(autostart_config(), Some(Ok(())), Some(Ok(())));
    h.player
        .load(vec![item("https://cdn.example.com/a.mp4")])
        .await
        .unwrap();
    let probe = h.factory.elements_for(&CapabilityTag::PROBE)[0].clone();
    let attempts = probe.plays();

    h.player
        .load(vec![item("https://cdn.example.com/b.mp4")])
        .await
        .unwrap();
    assert_eq!(probe.plays(), attempts);
    assert!(h.drain().iter().any(|e| matches!(
        e,
        PlayerEvent::Media(MediaEvent::Play {
            reason: PlayReason::Autostart,
            ..
        })
    )));
}

#[tokio::test(start_paused = true)]
async fn explicit_play_supersedes_pending_autostart() {
    let config = PlayerConfig {
        autoplay_timeout: Duration::from_secs(10),
        ..autostart_config()
    };
    let mut h = harness_with_probe(config, None, None);

    // The probe would hang until its timeout; the user presses play meanwhile.
    let started = Instant::now();
    let (loaded, played) = tokio::join!(
        h.player.load(vec![item("https://cdn.example.com/a.mp4")]),
        h.player.play(PlayReason::Interaction)
    );
    loaded.unwrap();
    played.unwrap();
    // The abandoned probe took its timers with it.
    assert!(started.elapsed() < Duration::from_secs(10));

    let events = h.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        PlayerEvent::Media(MediaEvent::Play {
            reason: PlayReason::Interaction,
            ..
        })
    )));
    assert_eq!(autostart_refusals(&events), 0);
    assert!(!h.player.model().mute);
    assert_eq!(h.player.state(), PlayerState::Playing);
}

#[tokio::test(start_paused = true)]
async fn superseded_probe_is_not_memoized() {
    let config = PlayerConfig {
        autoplay_timeout: Duration::from_secs(10),
        ..autostart_config()
    };
    let mut h = harness_with_probe(config, None, None);
    let (loaded, played) = tokio::join!(
        h.player.load(vec![item("https://cdn.example.com/a.mp4")]),
        h.player.play(PlayReason::Interaction)
    );
    loaded.unwrap();
    played.unwrap();
    h.drain();

    let probe = h.factory.elements_for(&CapabilityTag::PROBE)[0].clone();
    let attempts = probe.plays();
    probe.set_play_policy(Some(Ok(())), Some(Ok(())));
    h.player
        .load(vec![item("https://cdn.example.com/b.mp4")])
        .await
        .unwrap();

    assert!(probe.plays() > attempts);
    let events = h.drain();
    assert_eq!(autostart_refusals(&events), 0);
    assert!(events.iter().any(|e| matches!(
        e,
        PlayerEvent::Media(MediaEvent::Play {
            reason: PlayReason::Autostart,
            ..
        })
    )));
}

#[tokio::test(start_paused = true)]
async fn pausing_drops_a_pending_probe_without_waiting_for_it() {
    let config = PlayerConfig {
        autoplay_timeout: Duration::from_secs(10),
        ..autostart_config()
    };
    let mut h = harness_with_probe(config, None, None);

    let started = Instant::now();
    let (loaded, paused) = tokio::join!(
        h.player.load(vec![item("https://cdn.example.com/a.mp4")]),
        async {
            tokio::task::yield_now().await;
            h.player.pause(PauseReason::Interaction)
        }
    );
    loaded.unwrap();
    paused.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    let events = h.drain();
    assert_eq!(autostart_refusals(&events), 0);
    assert!(!events
        .iter()
        .any(|e| matches!(e, PlayerEvent::Media(MediaEvent::Play { .. }))));
    assert_eq!(h.player.state(), PlayerState::Idle);
}
