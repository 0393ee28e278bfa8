//! Deterministic page model
//!
//! [`SimulatedHost`] mirrors the parts of a browser page the guard touches:
//! the overlay element, injected styles, timers, animation frames, CSS
//! opacity transitions and navigation. Time is virtual and only moves when
//! [`SimPage::advance`] is called, so every interleaving of visibility, key
//! and timer events can be replayed exactly.
//!
//! The transition model follows the engine behaviour the overlay has to
//! cope with:
//! - frames tick every [`FRAME_INTERVAL_MS`]; an element switched to
//!   `display: flex` is only laid out after the next tick
//! - flipping a class on a laid-out, displayed element starts a transition
//!   whose duration is read from the injected `transition: opacity Nms` rule
//! - flipping a class on an element that is not laid out applies instantly
//!   and produces no `transitionend`
//! - `display: none` cancels a running transition

use crate::config::{ConfigFlags, ConfigStore, MemoryStore};
use crate::config_file::GuardSettings;
use crate::constants::FADE_PROPERTY;
use crate::host::{Display, Host, TimerHandle, VisibilityState};
use crate::navigation_guard::{NavigationGuard, UnloadIntent};
use crate::overlay::OverlayState;
use crate::presence::{KeyDisposition, PresenceController};
use crate::PageGuard;
use anyhow::Result;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::time::Duration;

/// Virtual frame interval (60 Hz, rounded)
pub const FRAME_INTERVAL_MS: u64 = 16;

#[derive(Debug, Clone)]
struct SimOverlay {
    display: Display,
    classes: BTreeSet<String>,
    message: Option<String>,
    /// Virtual time at which the element last became displayed
    displayed_since: Option<u64>,
}

/// Asynchronous completions the host delivers back to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    Timer(TimerHandle),
    TransitionEnd(String),
    Frame,
}

#[derive(Debug)]
pub struct SimulatedHost {
    now_ms: u64,
    has_body: bool,
    transition_events: bool,
    timers_fail: bool,
    /// Creation attempts left to fail
    create_failures: u32,
    overlay_id: Option<String>,
    overlay: Option<SimOverlay>,
    overlays_created: usize,
    styles: Vec<String>,
    next_timer_id: u64,
    /// handle -> due time
    timers: BTreeMap<TimerHandle, u64>,
    frame_requested_at: Option<u64>,
    /// (due time, property)
    transition: Option<(u64, String)>,
    navigations: Vec<String>,
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            has_body: true,
            transition_events: true,
            timers_fail: false,
            create_failures: 0,
            overlay_id: None,
            overlay: None,
            overlays_created: 0,
            styles: Vec::new(),
            next_timer_id: 1,
            timers: BTreeMap::new(),
            frame_requested_at: None,
            transition: None,
            navigations: Vec::new(),
        }
    }

    /// Model a document whose body is missing
    pub fn without_body(mut self) -> Self {
        self.has_body = false;
        self
    }

    /// Model an engine that never fires `transitionend`
    pub fn without_transition_events(mut self) -> Self {
        self.transition_events = false;
        self
    }

    /// Model an event loop that refuses every `setTimeout`
    pub fn with_failing_timers(mut self) -> Self {
        self.timers_fail = true;
        self
    }

    /// The first attempt to create the overlay element fails
    pub fn with_flaky_overlay_creation(mut self) -> Self {
        self.create_failures = 1;
        self
    }

    /// Model a page that already ships an element with this id
    pub fn with_existing_overlay(mut self, id: &str) -> Self {
        self.overlay_id = Some(id.to_string());
        self.overlay = Some(SimOverlay {
            display: Display::None,
            classes: BTreeSet::new(),
            message: None,
            displayed_since: None,
        });
        self
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn overlay_present(&self) -> bool {
        self.overlay.is_some()
    }

    pub fn overlay_created_count(&self) -> usize {
        self.overlays_created
    }

    pub fn overlay_display(&self) -> Option<Display> {
        self.overlay.as_ref().map(|o| o.display)
    }

    pub fn overlay_has_class(&self, class: &str) -> bool {
        self.overlay
            .as_ref()
            .is_some_and(|o| o.classes.contains(class))
    }

    pub fn overlay_message(&self) -> Option<&str> {
        self.overlay.as_ref().and_then(|o| o.message.as_deref())
    }

    pub fn style_count(&self) -> usize {
        self.styles.len()
    }

    pub fn frame_pending(&self) -> bool {
        self.frame_requested_at.is_some()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// The earliest-due pending timer
    pub fn next_timer(&self) -> Option<TimerHandle> {
        self.timers
            .iter()
            .min_by_key(|(handle, due)| (**due, **handle))
            .map(|(handle, _)| *handle)
    }

    pub fn transition_running(&self) -> bool {
        self.transition.is_some()
    }

    pub fn navigations(&self) -> &[String] {
        &self.navigations
    }

    /// Duration from the injected `transition: opacity Nms` rule
    fn transition_duration_ms(&self) -> Option<u64> {
        let needle = format!("transition: {} ", FADE_PROPERTY);
        self.styles.iter().rev().find_map(|css| {
            let start = css.find(&needle)? + needle.len();
            let rest = &css[start..];
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if !rest[digits.len()..].starts_with("ms") {
                return None;
            }
            digits.parse().ok()
        })
    }

    fn laid_out(&self, overlay: &SimOverlay) -> bool {
        match overlay.displayed_since {
            Some(since) => self.now_ms / FRAME_INTERVAL_MS > since / FRAME_INTERVAL_MS,
            None => false,
        }
    }

    fn next_frame_tick(after: u64) -> u64 {
        (after / FRAME_INTERVAL_MS + 1) * FRAME_INTERVAL_MS
    }

    /// Remove and return the next event due at or before `limit`, moving the
    /// clock to its due time
    pub fn pop_next_event(&mut self, limit: u64) -> Option<SimEvent> {
        // Ties resolve timers first, then transitions, then frames
        let timer = self
            .next_timer()
            .and_then(|h| self.timers.get(&h))
            .map(|due| (*due, 0u8));
        let transition = self
            .transition
            .as_ref()
            .filter(|_| self.transition_events)
            .map(|(due, _)| (*due, 1u8));
        let frame = self
            .frame_requested_at
            .map(|at| (Self::next_frame_tick(at), 2u8));

        let (due, kind) = [timer, transition, frame]
            .into_iter()
            .flatten()
            .min()?;
        if due > limit {
            return None;
        }
        self.now_ms = self.now_ms.max(due);

        match kind {
            0 => {
                let handle = self.next_timer()?;
                self.timers.remove(&handle);
                Some(SimEvent::Timer(handle))
            }
            1 => {
                let (_, property) = self.transition.take()?;
                Some(SimEvent::TransitionEnd(property))
            }
            _ => {
                self.frame_requested_at = None;
                Some(SimEvent::Frame)
            }
        }
    }

    /// Move the clock forward without delivering anything
    pub fn set_now(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
        // Transitions that end silently still end
        if !self.transition_events
            && self.transition.as_ref().is_some_and(|(due, _)| *due <= self.now_ms)
        {
            self.transition = None;
        }
    }
}

impl Host for SimulatedHost {
    fn has_body(&self) -> bool {
        self.has_body
    }

    fn overlay_exists(&self, id: &str) -> bool {
        self.overlay_id.as_deref() == Some(id)
    }

    fn create_overlay(&mut self, id: &str, message: Option<&str>) -> Result<()> {
        if !self.has_body {
            anyhow::bail!("No body to append overlay to");
        }
        if self.create_failures > 0 {
            self.create_failures -= 1;
            anyhow::bail!("appendChild rejected the overlay");
        }
        self.overlay_id = Some(id.to_string());
        self.overlay = Some(SimOverlay {
            display: Display::None,
            classes: BTreeSet::new(),
            message: message.map(str::to_string),
            displayed_since: None,
        });
        self.overlays_created += 1;
        Ok(())
    }

    fn inject_style(&mut self, css: &str) -> Result<()> {
        self.styles.push(css.to_string());
        Ok(())
    }

    fn set_overlay_display(&mut self, display: Display) {
        let now = self.now_ms;
        let Some(overlay) = self.overlay.as_mut() else {
            return;
        };
        if overlay.display == display {
            return;
        }
        overlay.display = display;
        match display {
            Display::Flex => overlay.displayed_since = Some(now),
            Display::None => {
                overlay.displayed_since = None;
                self.transition = None;
            }
        }
    }

    fn set_overlay_class(&mut self, class: &str, on: bool) {
        let Some(overlay) = self.overlay.as_ref() else {
            return;
        };
        if overlay.classes.contains(class) == on {
            return;
        }
        let animates = overlay.display == Display::Flex && self.laid_out(overlay);
        let duration = self.transition_duration_ms();

        if let Some(overlay) = self.overlay.as_mut() {
            if on {
                overlay.classes.insert(class.to_string());
            } else {
                overlay.classes.remove(class);
            }
        }

        match (animates, duration) {
            (true, Some(ms)) => {
                debug!("sim: {} transition starts ({}ms)", FADE_PROPERTY, ms);
                self.transition = Some((self.now_ms + ms, FADE_PROPERTY.to_string()));
            }
            _ => self.transition = None,
        }
    }

    fn request_frame(&mut self) {
        if self.frame_requested_at.is_none() {
            self.frame_requested_at = Some(self.now_ms);
        }
    }

    fn set_timeout(&mut self, delay: Duration) -> Result<TimerHandle> {
        if self.timers_fail {
            anyhow::bail!("setTimeout unavailable");
        }
        let handle = TimerHandle(self.next_timer_id);
        self.next_timer_id += 1;
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.timers
            .insert(handle, self.now_ms.saturating_add(delay_ms));
        Ok(handle)
    }

    fn clear_timeout(&mut self, handle: TimerHandle) {
        self.timers.remove(&handle);
    }

    fn navigate_replace(&mut self, url: &str) {
        self.navigations.push(url.to_string());
    }
}

/// Unload event as seen by the simulator
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimUnload {
    pub default_prevented: bool,
    pub return_value: Option<String>,
}

impl UnloadIntent for SimUnload {
    fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    fn set_return_value(&mut self, marker: &str) {
        self.return_value = Some(marker.to_string());
    }
}

/// One line of the simulation trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub at_ms: u64,
    pub what: String,
}

/// A guarded page driven on a virtual clock
pub struct SimPage {
    controller: PresenceController<SimulatedHost>,
    guard: NavigationGuard,
    store: Rc<MemoryStore>,
    trace: Vec<TraceEntry>,
}

impl SimPage {
    /// Build and mount a guarded page
    pub fn new(settings: GuardSettings, store: MemoryStore) -> Result<Self> {
        Self::with_host(settings, store, SimulatedHost::new())
    }

    pub fn with_host(
        settings: GuardSettings,
        store: MemoryStore,
        host: SimulatedHost,
    ) -> Result<Self> {
        let store = Rc::new(store);
        let shared: Rc<dyn ConfigStore> = store.clone();
        let page_guard = PageGuard::new(host, shared, &settings)?;
        page_guard.start()?;
        let (controller, guard) = page_guard.into_parts();
        Ok(Self {
            controller,
            guard,
            store,
            trace: Vec::new(),
        })
    }

    pub fn controller(&self) -> &PresenceController<SimulatedHost> {
        &self.controller
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn now_ms(&self) -> u64 {
        self.controller.with_host(|h| h.now_ms())
    }

    pub fn state(&self) -> OverlayState {
        self.controller.overlay_state()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.controller.with_host(|h| h.navigations().to_vec())
    }

    pub fn pending_timers(&self) -> usize {
        self.controller.with_host(|h| h.pending_timers())
    }

    pub fn flags(&self) -> ConfigFlags {
        ConfigFlags::read(self.store.as_ref())
    }

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    fn navigation_count(&self) -> usize {
        self.controller.with_host(|h| h.navigations().len())
    }

    fn record_navigations_since(&mut self, before: usize) {
        let navigated: Vec<String> = self
            .controller
            .with_host(|h| h.navigations().iter().skip(before).cloned().collect());
        for url in navigated {
            self.record(format!("navigate {}", url));
        }
    }

    fn record(&mut self, what: String) {
        let at_ms = self.now_ms();
        self.trace.push(TraceEntry { at_ms, what });
    }

    /// The page loses visibility
    pub fn hide(&mut self) {
        self.controller
            .on_visibility_change(VisibilityState::Hidden);
        self.record("visibility hidden".to_string());
    }

    /// The page becomes visible again
    pub fn show(&mut self) {
        self.controller
            .on_visibility_change(VisibilityState::Visible);
        self.record("visibility visible".to_string());
    }

    /// The window regains focus
    pub fn focus(&mut self) {
        self.controller.on_focus();
        self.record("focus".to_string());
    }

    /// A keydown with the given `KeyboardEvent.key` value
    pub fn key(&mut self, key: &str) -> KeyDisposition {
        let before = self.navigation_count();
        let disposition = self.controller.on_keydown(key);
        self.record(format!("key {:?} -> {:?}", key, disposition));
        self.record_navigations_since(before);
        disposition
    }

    /// The user tries to close or leave the page
    pub fn before_unload(&mut self) -> SimUnload {
        let mut event = SimUnload::default();
        let blocked = self.guard.on_before_unload(&mut event);
        self.record(format!(
            "beforeunload -> {}",
            if blocked { "blocked" } else { "allowed" }
        ));
        event
    }

    /// Run the clock forward, delivering everything that falls due
    pub fn advance(&mut self, ms: u64) {
        let target = self.now_ms().saturating_add(ms);
        self.run_until(target);
    }

    /// Run the clock to an absolute time
    pub fn run_until(&mut self, target_ms: u64) {
        loop {
            let event = self
                .controller
                .with_host(|h| h.pop_next_event(target_ms));
            let Some(event) = event else {
                break;
            };
            let before = self.navigation_count();
            match &event {
                SimEvent::Timer(handle) => self.controller.on_timer(*handle),
                SimEvent::TransitionEnd(property) => {
                    self.controller.on_transition_end(property)
                }
                SimEvent::Frame => self.controller.on_frame(),
            }
            self.record(format!("{:?} -> overlay {:?}", event, self.state()));
            self.record_navigations_since(before);
        }
        self.controller.with_host(|h| h.set_now(target_ms));
    }
}
