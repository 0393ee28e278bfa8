//! Browser bindings
//!
//! `install()` is the JS entry point: it waits for `DOMContentLoaded`, mounts
//! the overlay and wires the page's `visibilitychange`, `focus`, `keydown`,
//! `transitionend` and `beforeunload` events to the guard. Listeners live
//! for the lifetime of the page.

use crate::config::ConfigStore;
use crate::config_file::GuardSettings;
use crate::constants::LOG_PREFIX;
use crate::host::{Display, Host, TimerHandle, VisibilityState};
use crate::navigation_guard::{NavigationGuard, UnloadIntent};
use crate::overlay::FadeCompletion;
use crate::presence::PresenceController;
use crate::PageGuard;
use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    BeforeUnloadEvent, Document, Event, EventTarget, HtmlElement, KeyboardEvent, TransitionEvent,
    Window,
};

/// Where host callbacks find the controller once it exists
type Dispatch = Rc<OnceCell<PresenceController<BrowserHost>>>;

/// Browser timeout id and the callback it will run
type PendingTimer = (i32, Closure<dyn FnMut()>);

fn js_error(what: &str, err: JsValue) -> anyhow::Error {
    anyhow!("{}: {:?}", what, err)
}

// ============================================================================
// LOGGING
// ============================================================================

struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = JsValue::from_str(&format!("{} {}", LOG_PREFIX, record.args()));
        match record.level() {
            log::Level::Error => web_sys::console::error_1(&line),
            log::Level::Warn => web_sys::console::warn_1(&line),
            log::Level::Info => web_sys::console::info_1(&line),
            log::Level::Debug | log::Level::Trace => web_sys::console::debug_1(&line),
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

fn init_logging(level: log::LevelFilter) {
    // A second install keeps the first logger
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

// ============================================================================
// CONFIG STORE
// ============================================================================

/// Flags backed by `window.localStorage`
pub struct LocalStorageStore {
    window: Window,
}

impl LocalStorageStore {
    pub fn new(window: Window) -> Self {
        Self { window }
    }
}

impl ConfigStore for LocalStorageStore {
    fn get(&self, key: &str) -> Option<String> {
        // Storage can throw (privacy mode, sandboxed frames): treat as unset
        let storage = self.window.local_storage().ok().flatten()?;
        storage.get_item(key).ok().flatten()
    }
}

// ============================================================================
// HOST
// ============================================================================

pub struct BrowserHost {
    window: Window,
    document: Document,
    overlay_id: String,
    overlay: Option<HtmlElement>,
    dispatch: Dispatch,
    next_timer: u64,
    /// Timers that have not fired; dropping an entry frees its callback
    timers: Rc<RefCell<HashMap<TimerHandle, PendingTimer>>>,
}

impl BrowserHost {
    fn new(window: Window, document: Document, overlay_id: &str, dispatch: Dispatch) -> Self {
        Self {
            window,
            document,
            overlay_id: overlay_id.to_string(),
            overlay: None,
            dispatch,
            next_timer: 1,
            timers: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    fn element(&mut self) -> Option<HtmlElement> {
        if self.overlay.is_none() {
            self.overlay = self
                .document
                .get_element_by_id(&self.overlay_id)
                .and_then(|el| el.dyn_into::<HtmlElement>().ok());
        }
        self.overlay.clone()
    }
}

impl Host for BrowserHost {
    fn has_body(&self) -> bool {
        self.document.body().is_some()
    }

    fn overlay_exists(&self, id: &str) -> bool {
        self.document.get_element_by_id(id).is_some()
    }

    fn create_overlay(&mut self, id: &str, message: Option<&str>) -> Result<()> {
        let body = self
            .document
            .body()
            .ok_or_else(|| anyhow!("Document has no body"))?;

        let overlay = self
            .document
            .create_element("div")
            .map_err(|e| js_error("createElement(div)", e))?;
        overlay.set_id(id);

        let content = self
            .document
            .create_element("div")
            .map_err(|e| js_error("createElement(div)", e))?;
        content
            .set_attribute("style", "text-align: center;")
            .map_err(|e| js_error("setAttribute(style)", e))?;

        if let Some(message) = message {
            let heading = self
                .document
                .create_element("h1")
                .map_err(|e| js_error("createElement(h1)", e))?;
            heading.set_text_content(Some(message));
            content
                .append_child(&heading)
                .map_err(|e| js_error("appendChild(h1)", e))?;
        }

        overlay
            .append_child(&content)
            .map_err(|e| js_error("appendChild(content)", e))?;
        body.append_child(&overlay)
            .map_err(|e| js_error("appendChild(overlay)", e))?;

        self.overlay_id = id.to_string();
        self.overlay = overlay.dyn_into::<HtmlElement>().ok();
        Ok(())
    }

    fn inject_style(&mut self, css: &str) -> Result<()> {
        let head = self
            .document
            .head()
            .ok_or_else(|| anyhow!("Document has no head"))?;
        let style = self
            .document
            .create_element("style")
            .map_err(|e| js_error("createElement(style)", e))?;
        style.set_text_content(Some(css));
        head.append_child(&style)
            .map_err(|e| js_error("appendChild(style)", e))?;
        Ok(())
    }

    fn set_overlay_display(&mut self, display: Display) {
        let Some(overlay) = self.element() else {
            return;
        };
        if let Err(err) = overlay.style().set_property("display", display.as_css()) {
            warn!("Failed to set overlay display: {:?}", err);
        }
    }

    fn set_overlay_class(&mut self, class: &str, on: bool) {
        let Some(overlay) = self.element() else {
            return;
        };
        if let Err(err) = overlay.class_list().toggle_with_force(class, on) {
            warn!("Failed to toggle overlay class {}: {:?}", class, err);
        }
    }

    fn request_frame(&mut self) {
        let dispatch = Rc::clone(&self.dispatch);
        let callback = Closure::once_into_js(move || {
            if let Some(controller) = dispatch.get() {
                controller.on_frame();
            }
        });
        if let Err(err) = self.window.request_animation_frame(callback.unchecked_ref()) {
            warn!("requestAnimationFrame failed: {:?}", err);
        }
    }

    fn set_timeout(&mut self, delay: Duration) -> Result<TimerHandle> {
        let handle = TimerHandle(self.next_timer);
        self.next_timer += 1;

        let dispatch = Rc::clone(&self.dispatch);
        let timers = Rc::clone(&self.timers);
        let callback = Closure::once(move || {
            // Held until dispatch returns; the running closure is freed afterwards
            let _fired = timers.borrow_mut().remove(&handle);
            if let Some(controller) = dispatch.get() {
                controller.on_timer(handle);
            }
        });

        let millis = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
        let id = self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                callback.as_ref().unchecked_ref(),
                millis,
            )
            .map_err(|e| js_error("setTimeout", e))?;
        self.timers.borrow_mut().insert(handle, (id, callback));
        Ok(handle)
    }

    fn clear_timeout(&mut self, handle: TimerHandle) {
        let cleared = self.timers.borrow_mut().remove(&handle);
        if let Some((id, _callback)) = cleared {
            self.window.clear_timeout_with_handle(id);
        }
    }

    fn navigate_replace(&mut self, url: &str) {
        if let Err(err) = self.window.location().replace(url) {
            error!("Navigation to {} failed: {:?}", url, err);
        }
    }
}

// ============================================================================
// EVENTS
// ============================================================================

struct BrowserUnload<'a>(&'a BeforeUnloadEvent);

impl UnloadIntent for BrowserUnload<'_> {
    fn prevent_default(&mut self) {
        self.0.prevent_default();
    }

    fn set_return_value(&mut self, marker: &str) {
        self.0.set_return_value(marker);
    }
}

/// Add a listener that stays registered for the page's lifetime
fn listen(target: &EventTarget, event_type: &str, handler: impl FnMut(Event) + 'static) -> Result<()> {
    let closure = Closure::<dyn FnMut(Event)>::new(handler);
    target
        .add_event_listener_with_callback(event_type, closure.as_ref().unchecked_ref())
        .map_err(|e| js_error(event_type, e))?;
    closure.forget();
    Ok(())
}

fn attach_listeners(
    window: &Window,
    document: &Document,
    overlay_id: &str,
    controller: PresenceController<BrowserHost>,
    navigation_guard: NavigationGuard,
) -> Result<()> {
    listen(window, "beforeunload", move |event| {
        if let Some(event) = event.dyn_ref::<BeforeUnloadEvent>() {
            navigation_guard.on_before_unload(&mut BrowserUnload(event));
        }
    })?;

    let visibility_controller = controller.clone();
    let visibility_document = document.clone();
    listen(document, "visibilitychange", move |_| {
        let state = match visibility_document.visibility_state() {
            web_sys::VisibilityState::Hidden => VisibilityState::Hidden,
            _ => VisibilityState::Visible,
        };
        visibility_controller.on_visibility_change(state);
    })?;

    let focus_controller = controller.clone();
    listen(window, "focus", move |_| focus_controller.on_focus())?;

    let key_controller = controller.clone();
    listen(document, "keydown", move |event| {
        if let Some(key_event) = event.dyn_ref::<KeyboardEvent>() {
            if key_controller
                .on_keydown(&key_event.key())
                .suppresses_default()
            {
                event.prevent_default();
            }
        }
    })?;

    let overlay = document
        .get_element_by_id(overlay_id)
        .ok_or_else(|| anyhow!("Overlay #{} missing after mount", overlay_id))?;
    listen(&overlay, "transitionend", move |event| {
        // Ignore transitions bubbling up from the overlay's children
        if event.target() != event.current_target() {
            return;
        }
        if let Some(transition) = event.dyn_ref::<TransitionEvent>() {
            controller.on_transition_end(&transition.property_name());
        }
    })?;

    Ok(())
}

fn supports_transition_events(window: &Window) -> bool {
    js_sys::Reflect::has(window, &JsValue::from_str("ontransitionend")).unwrap_or(false)
}

fn start(mut settings: GuardSettings) -> Result<()> {
    let window = web_sys::window().context("No window")?;
    let document = window.document().context("No document")?;

    if settings.fade_completion == FadeCompletion::TransitionEvent
        && !supports_transition_events(&window)
    {
        info!("transitionend unsupported - falling back to fade timer");
        settings.fade_completion = FadeCompletion::Timeout;
    }

    let dispatch: Dispatch = Rc::new(OnceCell::new());
    let host = BrowserHost::new(
        window.clone(),
        document.clone(),
        &settings.overlay_id,
        Rc::clone(&dispatch),
    );
    let store: Rc<dyn ConfigStore> = Rc::new(LocalStorageStore::new(window.clone()));

    let guard = PageGuard::new(host, store, &settings)?;
    guard.start()?;
    let (controller, navigation_guard) = guard.into_parts();

    if dispatch.set(controller.clone()).is_err() {
        anyhow::bail!("Guard already dispatching");
    }

    attach_listeners(
        &window,
        &document,
        &settings.overlay_id,
        controller,
        navigation_guard,
    )
}

/// Install the guard on the current page
///
/// `settings_toml` overrides the defaults (see `GuardSettings`); `verbose`
/// enables debug logging. Starts right away if the DOM is already parsed,
/// otherwise on `DOMContentLoaded`.
#[wasm_bindgen]
pub fn install(settings_toml: Option<String>, verbose: Option<bool>) -> Result<(), JsValue> {
    init_logging(if verbose.unwrap_or(false) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });

    let settings = match settings_toml {
        Some(toml) => GuardSettings::from_toml_str(&toml)
            .map_err(|e| JsValue::from_str(&format!("{:#}", e)))?,
        None => GuardSettings::default(),
    };

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("No document"))?;

    if document.ready_state() == "loading" {
        let callback = Closure::once_into_js(move || {
            if let Err(e) = start(settings) {
                error!("Failed to start page guard: {:#}", e);
            }
        });
        document.add_event_listener_with_callback("DOMContentLoaded", callback.unchecked_ref())?;
        Ok(())
    } else {
        start(settings).map_err(|e| {
            error!("Failed to start page guard: {:#}", e);
            JsValue::from_str(&format!("{:#}", e))
        })
    }
}

#[cfg(feature = "autostart")]
#[wasm_bindgen(start)]
pub fn autostart() -> Result<(), JsValue> {
    install(None, None)
}
