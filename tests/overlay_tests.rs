use pageguard::config_file::GuardSettings;
use pageguard::host::Display;
use pageguard::overlay::{stylesheet, FadeCompletion, OverlayState, OverlayView};
use pageguard::sim::{SimEvent, SimulatedHost};
use std::time::Duration;

fn mounted(settings: &GuardSettings, host: SimulatedHost) -> (OverlayView, SimulatedHost) {
    let mut host = host;
    let mut view = OverlayView::new(settings);
    view.mount(&mut host).expect("mount");
    (view, host)
}

/// Deliver every host event due up to `until` straight to the view
fn pump(view: &mut OverlayView, host: &mut SimulatedHost, until: u64) {
    while let Some(event) = host.pop_next_event(until) {
        match event {
            SimEvent::Timer(handle) => {
                view.on_fade_timer(host, handle);
            }
            SimEvent::TransitionEnd(property) => {
                view.on_transition_end(host, &property);
            }
            SimEvent::Frame => view.on_frame(host),
        }
    }
    host.set_now(until);
}

#[test]
fn test_mount_hides_and_styles_element() {
    let (view, host) = mounted(&GuardSettings::default(), SimulatedHost::new());
    assert!(view.is_mounted());
    assert_eq!(view.state(), OverlayState::Hidden);
    assert_eq!(host.overlay_display(), Some(Display::None));
    assert!(host.overlay_has_class("hidden"));
    assert_eq!(host.style_count(), 1);
}

#[test]
fn test_custom_naming_is_used() {
    let settings = GuardSettings {
        overlay_id: "privacy-cover".to_string(),
        hidden_class: "faded".to_string(),
        ..GuardSettings::default()
    };
    let host = SimulatedHost::new().with_existing_overlay("privacy-cover");
    let (mut view, mut host) = mounted(&settings, host);

    assert_eq!(host.overlay_created_count(), 0);
    assert!(host.overlay_has_class("faded"));

    view.show_instant(&mut host);
    assert!(!host.overlay_has_class("faded"));
}

#[test]
fn test_stylesheet_carries_fade_duration() {
    let css = stylesheet("cover", "off", Duration::from_millis(150));
    assert!(css.contains("#cover {"));
    assert!(css.contains("#cover.off {"));
    assert!(css.contains("transition: opacity 150ms ease-in-out;"));
    assert!(css.contains("position: fixed;"));
    assert!(css.contains("background-color: white;"));
}

#[test]
fn test_fade_out_follows_configured_duration() {
    let settings = GuardSettings {
        fade_duration_ms: 150,
        ..GuardSettings::default()
    };
    let (mut view, mut host) = mounted(&settings, SimulatedHost::new());
    view.show_instant(&mut host);
    pump(&mut view, &mut host, 32);

    view.hide_animated(&mut host);
    pump(&mut view, &mut host, 181);
    assert_eq!(view.state(), OverlayState::Hiding);

    pump(&mut view, &mut host, 182);
    assert_eq!(view.state(), OverlayState::Hidden);
    assert_eq!(host.overlay_display(), Some(Display::None));
}

#[test]
fn test_fade_in_then_out_full_cycle() {
    let (mut view, mut host) = mounted(&GuardSettings::default(), SimulatedHost::new());

    view.show_animated(&mut host);
    assert_eq!(view.state(), OverlayState::Showing);
    pump(&mut view, &mut host, 16);
    assert_eq!(view.state(), OverlayState::Showing);
    assert!(host.transition_running());
    pump(&mut view, &mut host, 316);
    assert_eq!(view.state(), OverlayState::Visible);

    view.hide_animated(&mut host);
    pump(&mut view, &mut host, 616);
    assert_eq!(view.state(), OverlayState::Hidden);
    assert_eq!(host.overlay_display(), Some(Display::None));
}

#[test]
fn test_show_during_fade_out_reverses() {
    let (mut view, mut host) = mounted(&GuardSettings::default(), SimulatedHost::new());
    view.show_instant(&mut host);
    pump(&mut view, &mut host, 32);

    view.hide_animated(&mut host);
    pump(&mut view, &mut host, 100);
    assert_eq!(view.state(), OverlayState::Hiding);

    view.show_animated(&mut host);
    assert_eq!(view.state(), OverlayState::Showing);
    assert!(!host.frame_pending(), "Already laid out, no frame needed");

    pump(&mut view, &mut host, 1000);
    assert_eq!(view.state(), OverlayState::Visible);
    assert_eq!(host.overlay_display(), Some(Display::Flex));
}

#[test]
fn test_hide_during_fade_in_reverses() {
    let (mut view, mut host) = mounted(&GuardSettings::default(), SimulatedHost::new());
    view.show_animated(&mut host);
    pump(&mut view, &mut host, 100);
    assert_eq!(view.state(), OverlayState::Showing);

    view.hide_animated(&mut host);
    assert_eq!(view.state(), OverlayState::Hiding);
    pump(&mut view, &mut host, 1000);
    assert_eq!(view.state(), OverlayState::Hidden);
}

#[test]
fn test_hide_instant_mid_fade_swallows_transition() {
    let (mut view, mut host) = mounted(&GuardSettings::default(), SimulatedHost::new());
    view.show_instant(&mut host);
    pump(&mut view, &mut host, 32);
    view.hide_animated(&mut host);

    view.hide_instant(&mut host);
    assert_eq!(view.state(), OverlayState::Hidden);
    assert!(!host.transition_running(), "display: none cancels the transition");

    view.show_instant(&mut host);
    pump(&mut view, &mut host, 1000);
    assert!(view.is_visible(), "No late completion may hide it again");
}

#[test]
fn test_repeated_show_and_hide_are_idempotent() {
    let (mut view, mut host) = mounted(&GuardSettings::default(), SimulatedHost::new());
    view.show_instant(&mut host);
    view.show_instant(&mut host);
    view.show_animated(&mut host);
    assert!(view.is_visible());
    assert!(!host.frame_pending());

    view.hide_instant(&mut host);
    view.hide_animated(&mut host);
    view.hide_instant(&mut host);
    assert_eq!(view.state(), OverlayState::Hidden);
    assert_eq!(host.pending_timers(), 0);
}

#[test]
fn test_timeout_mode_never_waits_on_events() {
    let settings = GuardSettings {
        fade_completion: FadeCompletion::Timeout,
        ..GuardSettings::default()
    };
    let (mut view, mut host) = mounted(&settings, SimulatedHost::new().without_transition_events());

    view.show_animated(&mut host);
    pump(&mut view, &mut host, 16);
    assert_eq!(host.pending_timers(), 1);
    pump(&mut view, &mut host, 316);
    assert!(view.is_visible());

    view.hide_animated(&mut host);
    pump(&mut view, &mut host, 616);
    assert_eq!(view.state(), OverlayState::Hidden);
    assert_eq!(host.pending_timers(), 0);
}

#[test]
fn test_retried_mount_injects_style_once() {
    let mut host = SimulatedHost::new().with_flaky_overlay_creation();
    let mut view = OverlayView::new(&GuardSettings::default());

    assert!(view.mount(&mut host).is_err());
    assert!(!view.is_mounted());
    assert_eq!(host.style_count(), 0);

    view.mount(&mut host).expect("second attempt");
    view.mount(&mut host).expect("already mounted");
    assert_eq!(host.style_count(), 1);
    assert_eq!(host.overlay_created_count(), 1);
}

#[test]
fn test_fade_in_without_transition_still_completes() {
    let (mut view, mut host) = mounted(
        &GuardSettings::default(),
        SimulatedHost::new().without_transition_events(),
    );
    view.show_animated(&mut host);
    pump(&mut view, &mut host, 365);
    assert_eq!(view.state(), OverlayState::Showing);
    pump(&mut view, &mut host, 366);
    assert!(view.is_visible());
}
