pub mod keys;

pub use keys::{classify_key, GuardKey, KeyDisposition};

use crate::config::{self, ConfigStore};
use crate::config_file::GuardSettings;
use crate::host::{Host, TimerHandle, VisibilityState};
use crate::overlay::{OverlayState, OverlayView};
use anyhow::Result;
use log::{debug, info, warn};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Reconciles visibility, keyboard and fade-completion events into one
/// overlay/redirect outcome
///
/// Cloning yields another handle to the same controller, which is how the
/// page's event listeners share it. Everything runs on the page's single
/// event-loop thread.
pub struct PresenceController<H: Host> {
    inner: Rc<RefCell<ControllerInner<H>>>,
}

impl<H: Host> Clone for PresenceController<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

struct ControllerInner<H: Host> {
    host: H,
    view: OverlayView,
    /// Flags are looked up here on every decision, never cached
    store: Rc<dyn ConfigStore>,
    redirect_url: String,
    redirect_delay: Duration,
    dismiss_key: char,
    animate_show: bool,
    reveal_on_restore: bool,
    /// At most one redirect is ever pending
    redirect_timer: Option<TimerHandle>,
}

impl<H: Host> ControllerInner<H> {
    fn cancel_redirect_timer(&mut self) -> bool {
        match self.redirect_timer.take() {
            Some(handle) => {
                self.host.clear_timeout(handle);
                debug!("Redirect {} cancelled", handle);
                true
            }
            None => false,
        }
    }

    /// Without a timer there is nothing to wait on, so the redirect happens now
    fn arm_redirect_timer(&mut self) {
        self.cancel_redirect_timer();
        match self.host.set_timeout(self.redirect_delay) {
            Ok(handle) => {
                self.redirect_timer = Some(handle);
                debug!("Redirect {} armed ({:?})", handle, self.redirect_delay);
            }
            Err(e) => {
                warn!("Could not schedule redirect ({:#}) - redirecting now", e);
                self.redirect();
            }
        }
    }

    /// The pending timer is cleared before navigating so it can never fire
    /// a second navigation.
    fn redirect(&mut self) {
        self.cancel_redirect_timer();
        info!("Redirecting to {}", self.redirect_url);
        self.host.navigate_replace(&self.redirect_url);
    }
}

impl<H: Host> PresenceController<H> {
    pub fn new(host: H, store: Rc<dyn ConfigStore>, settings: &GuardSettings) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ControllerInner {
                host,
                view: OverlayView::new(settings),
                store,
                redirect_url: settings.redirect_url.clone(),
                redirect_delay: settings.redirect_delay(),
                dismiss_key: settings.dismiss_char(),
                animate_show: settings.animate_show,
                reveal_on_restore: settings.reveal_on_restore,
                redirect_timer: None,
            })),
        }
    }

    /// Mount the overlay. See [`OverlayView::mount`].
    pub fn mount(&self) -> Result<()> {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        inner.view.mount(&mut inner.host)
    }

    /// Run `f` against the host
    pub fn with_host<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.inner.borrow_mut().host)
    }

    pub fn overlay_state(&self) -> OverlayState {
        self.inner.borrow().view.state()
    }

    pub fn is_overlay_visible(&self) -> bool {
        self.inner.borrow().view.is_visible()
    }

    pub fn redirect_pending(&self) -> bool {
        self.inner.borrow().redirect_timer.is_some()
    }

    pub fn redirect_timer(&self) -> Option<TimerHandle> {
        self.inner.borrow().redirect_timer
    }

    pub fn on_visibility_change(&self, state: VisibilityState) {
        match state {
            VisibilityState::Hidden => self.on_visibility_lost(),
            VisibilityState::Visible => self.on_visibility_restored(),
        }
    }

    /// The page went to the background
    ///
    /// With redirect enabled a fresh redirect timer replaces any pending
    /// one; otherwise the overlay is raised.
    pub fn on_visibility_lost(&self) {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;

        if config::read_redirect_on_hide(inner.store.as_ref()) {
            inner.arm_redirect_timer();
        } else if inner.animate_show {
            debug!("Page hidden - fading overlay in");
            inner.view.show_animated(&mut inner.host);
        } else {
            debug!("Page hidden - showing overlay");
            inner.view.show_instant(&mut inner.host);
        }
    }

    /// The page is visible again. Cancels a pending redirect.
    pub fn on_visibility_restored(&self) {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;

        if inner.cancel_redirect_timer() {
            info!("Page visible again before redirect - staying");
        }
        if inner.reveal_on_restore && inner.view.is_rendered() {
            inner.view.hide_instant(&mut inner.host);
        }
    }

    /// The window regained focus. Cancels a pending redirect.
    pub fn on_focus(&self) {
        if self.inner.borrow_mut().cancel_redirect_timer() {
            info!("Focus regained before redirect - staying");
        }
    }

    /// Keydown on the document
    ///
    /// Only looked at while the overlay is fully visible; every other key,
    /// and every key in any other overlay state, passes through.
    pub fn on_keydown(&self, key: &str) -> KeyDisposition {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;

        if !inner.view.is_visible() {
            return KeyDisposition::PassThrough;
        }

        match classify_key(key, inner.dismiss_key) {
            Some(GuardKey::Dismiss) => {
                info!("Dismiss key pressed - fading overlay out");
                inner.view.hide_animated(&mut inner.host);
                KeyDisposition::Suppress
            }
            Some(GuardKey::Panic) => {
                info!("Panic key pressed");
                inner.redirect();
                KeyDisposition::Suppress
            }
            None => KeyDisposition::PassThrough,
        }
    }

    /// Navigate away now, cancelling any pending redirect first
    pub fn redirect(&self) {
        self.inner.borrow_mut().redirect();
    }

    /// A timer scheduled through the host expired
    pub fn on_timer(&self, handle: TimerHandle) {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;

        if inner.redirect_timer == Some(handle) {
            inner.redirect_timer = None;
            debug!("Redirect {} fired", handle);
            inner.redirect();
            return;
        }

        if !inner.view.on_fade_timer(&mut inner.host, handle) {
            debug!("Ignoring stale {}", handle);
        }
    }

    /// Rendering frame requested by the overlay
    pub fn on_frame(&self) {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        inner.view.on_frame(&mut inner.host);
    }

    /// `transitionend` fired on the overlay element
    pub fn on_transition_end(&self, property: &str) {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        inner.view.on_transition_end(&mut inner.host, property);
    }
}
