//! The full-screen cover and its fade state machine
//!
//! ```text
//!            show_animated            frame               fade end
//!   Hidden ───────────────▶ Showing ───────▶ Showing ──────────────▶ Visible
//!     ▲      (await frame)             (fading in)                    │
//!     │                                                               │ hide_animated
//!     └──────────────────────────── Hiding ◀──────────────────────────┘
//!                 fade end          (fading out)
//! ```
//!
//! `show_instant` and `hide_instant` jump straight to `Visible` / `Hidden`
//! from any state. The element is only set to `display: none` once the
//! fade-out has actually completed.

use crate::config_file::GuardSettings;
use crate::constants::{FADE_EVENT_GRACE_MS, FADE_PROPERTY, OVERLAY_Z_INDEX};
use crate::host::{Display, Host, TimerHandle};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Observable overlay state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    /// Not rendered, not interactable
    Hidden,
    /// Rendered, fading towards opaque
    Showing,
    /// Rendered and opaque; the only state that accepts keyboard input
    Visible,
    /// Rendered, fading towards transparent
    Hiding,
}

/// How the end of a fade is detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FadeCompletion {
    /// Wait for the `transitionend` event of the opacity transition. A
    /// backstop timer completes the fade if no event arrives.
    #[default]
    TransitionEvent,
    /// Wait for a timer of exactly the fade duration. Only for engines
    /// without transition events.
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Hidden,
    /// Displayed at opacity 0, waiting one frame before the fade starts
    AwaitingFrame,
    FadingIn,
    Visible,
    FadingOut,
}

/// Owner of the single cover element
#[derive(Debug)]
pub struct OverlayView {
    id: String,
    hidden_class: String,
    message: Option<String>,
    fade_duration: Duration,
    completion: FadeCompletion,
    mounted: bool,
    phase: Phase,
    fade_timer: Option<TimerHandle>,
}

impl OverlayView {
    pub fn new(settings: &GuardSettings) -> Self {
        Self {
            id: settings.overlay_id.clone(),
            hidden_class: settings.hidden_class.clone(),
            message: settings.message.clone(),
            fade_duration: settings.fade_duration(),
            completion: settings.fade_completion,
            mounted: false,
            phase: Phase::Hidden,
            fade_timer: None,
        }
    }

    /// Attach to the page. Safe to call more than once.
    ///
    /// Reuses an element that already carries the overlay id, otherwise
    /// creates one. The stylesheet is injected on the first successful call
    /// only.
    ///
    /// # Errors
    ///
    /// Fails if the document has no body or the element cannot be created.
    /// Nothing is injected in that case, so a later retry starts clean.
    pub fn mount<H: Host>(&mut self, host: &mut H) -> Result<()> {
        if self.mounted {
            debug!("Overlay already mounted");
            return Ok(());
        }

        if !host.has_body() {
            anyhow::bail!("Document has no body - cannot mount overlay");
        }

        if host.overlay_exists(&self.id) {
            debug!("Reusing existing #{} element", self.id);
        } else {
            host.create_overlay(&self.id, self.message.as_deref())
                .context("Failed to create overlay element")?;
            debug!("Created #{} element", self.id);
        }

        // After the element: a failed mount must not leave a stylesheet behind
        let css = stylesheet(&self.id, &self.hidden_class, self.fade_duration);
        host.inject_style(&css)
            .context("Failed to inject overlay stylesheet")?;

        host.set_overlay_class(&self.hidden_class, true);
        host.set_overlay_display(Display::None);
        self.phase = Phase::Hidden;
        self.mounted = true;
        info!("Overlay mounted (fade {:?}, {:?})", self.fade_duration, self.completion);
        Ok(())
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn state(&self) -> OverlayState {
        match self.phase {
            Phase::Hidden => OverlayState::Hidden,
            Phase::AwaitingFrame | Phase::FadingIn => OverlayState::Showing,
            Phase::Visible => OverlayState::Visible,
            Phase::FadingOut => OverlayState::Hiding,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.phase == Phase::Visible
    }

    /// Whether the element currently occupies the screen (any state but Hidden)
    pub fn is_rendered(&self) -> bool {
        self.phase != Phase::Hidden
    }

    /// Jump to Visible without animation
    pub fn show_instant<H: Host>(&mut self, host: &mut H) {
        if !self.mounted {
            return;
        }
        self.cancel_fade_timer(host);
        host.set_overlay_class(&self.hidden_class, false);
        host.set_overlay_display(Display::Flex);
        self.set_phase(Phase::Visible);
    }

    /// Fade in from Hidden
    ///
    /// The element is displayed at opacity 0 first and the hidden class is
    /// only removed in [`on_frame`](Self::on_frame). Doing both in the same
    /// turn lets the engine fold the two style writes together and the fade
    /// never runs.
    pub fn show_animated<H: Host>(&mut self, host: &mut H) {
        if !self.mounted {
            return;
        }
        match self.phase {
            Phase::Hidden => {
                host.set_overlay_class(&self.hidden_class, true);
                host.set_overlay_display(Display::Flex);
                host.request_frame();
                self.set_phase(Phase::AwaitingFrame);
            }
            Phase::FadingOut => {
                // Already laid out, reverse the running fade
                host.set_overlay_class(&self.hidden_class, false);
                self.set_phase(Phase::FadingIn);
                self.arm_fade_timer(host);
            }
            Phase::AwaitingFrame | Phase::FadingIn | Phase::Visible => {}
        }
    }

    /// Jump to Hidden without animation
    pub fn hide_instant<H: Host>(&mut self, host: &mut H) {
        if !self.mounted {
            return;
        }
        self.cancel_fade_timer(host);
        host.set_overlay_display(Display::None);
        host.set_overlay_class(&self.hidden_class, true);
        self.set_phase(Phase::Hidden);
    }

    /// Fade out; `display: none` is applied when the fade completes
    pub fn hide_animated<H: Host>(&mut self, host: &mut H) {
        if !self.mounted {
            return;
        }
        match self.phase {
            Phase::Visible | Phase::FadingIn => {
                host.set_overlay_class(&self.hidden_class, true);
                self.set_phase(Phase::FadingOut);
                self.arm_fade_timer(host);
            }
            Phase::AwaitingFrame => {
                // Still transparent, nothing to fade
                host.set_overlay_display(Display::None);
                self.set_phase(Phase::Hidden);
            }
            Phase::Hidden | Phase::FadingOut => {}
        }
    }

    /// Rendering-frame callback requested by `show_animated`
    pub fn on_frame<H: Host>(&mut self, host: &mut H) {
        if self.phase != Phase::AwaitingFrame {
            debug!("Ignoring stale frame in {:?}", self.phase);
            return;
        }
        host.set_overlay_class(&self.hidden_class, false);
        self.set_phase(Phase::FadingIn);
        self.arm_fade_timer(host);
    }

    /// `transitionend` on the overlay element
    ///
    /// Returns true if the event completed a fade.
    pub fn on_transition_end<H: Host>(&mut self, host: &mut H, property: &str) -> bool {
        if !self.mounted || self.completion != FadeCompletion::TransitionEvent {
            return false;
        }
        if property != FADE_PROPERTY {
            return false;
        }
        self.finish_fade(host)
    }

    /// Returns true if `handle` was this view's fade timer
    pub fn on_fade_timer<H: Host>(&mut self, host: &mut H, handle: TimerHandle) -> bool {
        if self.fade_timer != Some(handle) {
            return false;
        }
        self.fade_timer = None;
        if self.completion == FadeCompletion::TransitionEvent {
            debug!("No transitionend in time - completing fade");
        }
        self.finish_fade(host);
        true
    }

    fn finish_fade<H: Host>(&mut self, host: &mut H) -> bool {
        self.cancel_fade_timer(host);
        match self.phase {
            Phase::FadingIn => {
                self.set_phase(Phase::Visible);
                true
            }
            Phase::FadingOut => {
                host.set_overlay_display(Display::None);
                self.set_phase(Phase::Hidden);
                true
            }
            _ => {
                debug!("Ignoring fade completion in {:?}", self.phase);
                false
            }
        }
    }

    /// In event mode the timer is only a backstop for a transition that
    /// never ran
    fn arm_fade_timer<H: Host>(&mut self, host: &mut H) {
        self.cancel_fade_timer(host);
        let wait = match self.completion {
            FadeCompletion::Timeout => self.fade_duration,
            FadeCompletion::TransitionEvent => {
                self.fade_duration + Duration::from_millis(FADE_EVENT_GRACE_MS)
            }
        };
        match host.set_timeout(wait) {
            Ok(handle) => self.fade_timer = Some(handle),
            Err(e) => {
                warn!("No fade timer ({:#}) - completing fade now", e);
                self.finish_fade(host);
            }
        }
    }

    fn cancel_fade_timer<H: Host>(&mut self, host: &mut H) {
        if let Some(handle) = self.fade_timer.take() {
            host.clear_timeout(handle);
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!("Overlay {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }
}

/// Stylesheet for the cover element
///
/// `fade` is the same duration the fallback timer waits for.
pub fn stylesheet(id: &str, hidden_class: &str, fade: Duration) -> String {
    format!(
        "#{id} {{
    position: fixed;
    top: 0;
    left: 0;
    width: 100%;
    height: 100%;
    background-color: white;
    z-index: {z};
    display: none;
    flex-direction: column;
    justify-content: center;
    align-items: center;
    color: black;
    font-family: sans-serif;
    opacity: 1;
    transition: {prop} {ms}ms ease-in-out;
}}
#{id}.{hidden_class} {{
    opacity: 0;
    pointer-events: none;
}}
#{id} h1 {{
    font-size: 2em;
    margin-bottom: 0.5em;
}}
",
        z = OVERLAY_Z_INDEX,
        prop = FADE_PROPERTY,
        ms = fade.as_millis(),
    )
}
