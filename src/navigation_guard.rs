//! Tab close / navigate-away protection
//!
//! Independent of the overlay: the only thing it shares with the presence
//! controller is the config store.

use crate::config::{self, ConfigStore};
use crate::constants::UNLOAD_PROMPT_MARKER;
use log::info;
use std::rc::Rc;

/// The cancellable part of a `beforeunload` event
pub trait UnloadIntent {
    fn prevent_default(&mut self);

    /// Set `returnValue`; engines only prompt for a non-empty value
    fn set_return_value(&mut self, marker: &str);
}

pub struct NavigationGuard {
    store: Rc<dyn ConfigStore>,
}

impl NavigationGuard {
    pub fn new(store: Rc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Handle the page's unload intent
    ///
    /// Returns true if the unload was cancelled so the browser asks the user
    /// to confirm. With protection disabled the event is left untouched.
    pub fn on_before_unload<E: UnloadIntent + ?Sized>(&self, event: &mut E) -> bool {
        if !config::read_tab_close_protection(self.store.as_ref()) {
            return false;
        }

        event.prevent_default();
        event.set_return_value(UNLOAD_PROMPT_MARKER);
        info!("Unload intercepted - asking for confirmation");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;
    use crate::constants::KEY_TAB_CLOSE_PROTECTION;

    #[derive(Default)]
    struct RecordingUnload {
        prevented: bool,
        marker: Option<String>,
    }

    impl UnloadIntent for RecordingUnload {
        fn prevent_default(&mut self) {
            self.prevented = true;
        }

        fn set_return_value(&mut self, marker: &str) {
            self.marker = Some(marker.to_string());
        }
    }

    #[test]
    fn test_protection_enabled_cancels_unload() {
        let store: MemoryStore = [(KEY_TAB_CLOSE_PROTECTION, "true")].into_iter().collect();
        let guard = NavigationGuard::new(Rc::new(store));

        let mut event = RecordingUnload::default();
        assert!(guard.on_before_unload(&mut event));
        assert!(event.prevented);
        assert!(
            event.marker.as_deref().is_some_and(|m| !m.is_empty()),
            "Marker must be non-empty"
        );
    }

    #[test]
    fn test_protection_disabled_leaves_event_alone() {
        for value in [Some("false"), Some("True"), None] {
            let store = MemoryStore::new();
            if let Some(value) = value {
                store.set(KEY_TAB_CLOSE_PROTECTION, value);
            }
            let guard = NavigationGuard::new(Rc::new(store));

            let mut event = RecordingUnload::default();
            assert!(!guard.on_before_unload(&mut event), "value {:?}", value);
            assert!(!event.prevented);
            assert!(event.marker.is_none());
        }
    }
}
