//! The page plumbing the guard drives
//!
//! Everything that touches the document, the event loop's timers or the
//! browser's location goes through [`Host`]. The browser build implements it
//! on top of `web-sys`; tests and the simulator use `sim::SimulatedHost`.
//!
//! Asynchronous completions (animation frames, timer expiry, CSS transition
//! end) are delivered back by the host calling the matching
//! `PresenceController::on_*` method.

use anyhow::Result;
use std::fmt;
use std::time::Duration;

/// Opaque handle to a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u64);

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// CSS `display` values the overlay moves between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    None,
    Flex,
}

impl Display {
    pub fn as_css(self) -> &'static str {
        match self {
            Display::None => "none",
            Display::Flex => "flex",
        }
    }
}

/// Document visibility as reported by the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityState {
    Visible,
    Hidden,
}

pub trait Host {
    /// Whether the document has a body to attach the overlay to
    fn has_body(&self) -> bool;

    /// Look up an existing overlay element by id
    fn overlay_exists(&self, id: &str) -> bool;

    /// Create the overlay element and append it to the body
    fn create_overlay(&mut self, id: &str, message: Option<&str>) -> Result<()>;

    /// Append a stylesheet to the document head
    fn inject_style(&mut self, css: &str) -> Result<()>;

    fn set_overlay_display(&mut self, display: Display);

    /// Add (`on = true`) or remove a class on the overlay element
    fn set_overlay_class(&mut self, class: &str, on: bool);

    /// Ask for `on_frame` once the next rendering frame is due
    fn request_frame(&mut self);

    /// Schedule `on_timer(handle)` after `delay`
    ///
    /// # Errors
    ///
    /// Fails if the event loop refused the timer; nothing will fire.
    fn set_timeout(&mut self, delay: Duration) -> Result<TimerHandle>;

    /// Cancel a timer; unknown or already-fired handles are ignored
    fn clear_timeout(&mut self, handle: TimerHandle);

    /// History-replacing navigation to `url`
    fn navigate_replace(&mut self, url: &str);
}
