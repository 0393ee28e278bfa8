//! Runtime flags for PageGuard
//!
//! The two feature switches live in an external key-value store (the
//! browser's `localStorage` in production) that other code on the page may
//! flip at any time. They are therefore read fresh at every decision point
//! and never cached.
//!
//! Store keys:
//! - tabCloseProtectionEnabled: `"true"` enables the unload prompt, anything else disables it
//! - redirectOnHideEnabled: absent or `"true"` enables redirect, anything else disables it

use crate::constants::{KEY_REDIRECT_ON_HIDE, KEY_TAB_CLOSE_PROTECTION};
use log::{debug, warn};
use std::cell::RefCell;
use std::collections::HashMap;

/// Read-only view of the external key-value store
pub trait ConfigStore {
    /// Returns the raw string stored under `key`, or None if unset or unreadable
    fn get(&self, key: &str) -> Option<String>;
}

/// Typed snapshot of the feature switches, taken for a single decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigFlags {
    pub tab_close_protection: bool,
    pub redirect_on_hide: bool,
}

impl Default for ConfigFlags {
    fn default() -> Self {
        Self {
            tab_close_protection: false,
            redirect_on_hide: true,
        }
    }
}

impl ConfigFlags {
    /// Read both flags from the store
    pub fn read(store: &dyn ConfigStore) -> Self {
        Self {
            tab_close_protection: read_tab_close_protection(store),
            redirect_on_hide: read_redirect_on_hide(store),
        }
    }
}

/// Read the tabCloseProtectionEnabled flag
///
/// Returns true only for the exact string `"true"`.
pub fn read_tab_close_protection(store: &dyn ConfigStore) -> bool {
    match store.get(KEY_TAB_CLOSE_PROTECTION).as_deref() {
        Some("true") => {
            debug!("Tab close protection enabled");
            true
        }
        Some("false") => {
            debug!("Tab close protection disabled");
            false
        }
        Some(other) => {
            warn!(
                "Unrecognised {} value: {:?}. Protection disabled.",
                KEY_TAB_CLOSE_PROTECTION, other
            );
            false
        }
        None => {
            debug!("{} not set. Protection disabled.", KEY_TAB_CLOSE_PROTECTION);
            false
        }
    }
}

/// Read the redirectOnHideEnabled flag
///
/// An absent key counts as enabled.
pub fn read_redirect_on_hide(store: &dyn ConfigStore) -> bool {
    match store.get(KEY_REDIRECT_ON_HIDE).as_deref() {
        Some("true") => {
            debug!("Redirect on hide enabled");
            true
        }
        Some("false") => {
            debug!("Redirect on hide disabled");
            false
        }
        Some(other) => {
            warn!(
                "Unrecognised {} value: {:?}. Redirect disabled.",
                KEY_REDIRECT_ON_HIDE, other
            );
            false
        }
        None => {
            debug!("{} not set. Redirect enabled.", KEY_REDIRECT_ON_HIDE);
            true
        }
    }
}

/// In-memory store, mutable through a shared reference
///
/// Lets a test or the simulator play the "external actor" that changes the
/// flags between events.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: &str) {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    pub fn remove(&self, key: &str) {
        self.values.borrow_mut().remove(key);
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let values = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: RefCell::new(values),
        }
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.borrow().get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_store_empty() {
        let store = MemoryStore::new();
        let flags = ConfigFlags::read(&store);
        assert!(!flags.tab_close_protection, "Protection should default off");
        assert!(flags.redirect_on_hide, "Redirect should default on");
        assert_eq!(flags, ConfigFlags::default());
    }

    #[test]
    fn test_tab_close_protection_requires_exact_true() {
        let store = MemoryStore::new();

        store.set(KEY_TAB_CLOSE_PROTECTION, "true");
        assert!(read_tab_close_protection(&store));

        store.set(KEY_TAB_CLOSE_PROTECTION, "TRUE");
        assert!(
            !read_tab_close_protection(&store),
            "Comparison is case-sensitive"
        );

        store.set(KEY_TAB_CLOSE_PROTECTION, "1");
        assert!(!read_tab_close_protection(&store));

        store.set(KEY_TAB_CLOSE_PROTECTION, "");
        assert!(!read_tab_close_protection(&store));
    }

    #[test]
    fn test_redirect_on_hide_values() {
        let store = MemoryStore::new();
        assert!(read_redirect_on_hide(&store), "Absent should mean enabled");

        store.set(KEY_REDIRECT_ON_HIDE, "true");
        assert!(read_redirect_on_hide(&store));

        store.set(KEY_REDIRECT_ON_HIDE, "false");
        assert!(!read_redirect_on_hide(&store));

        store.set(KEY_REDIRECT_ON_HIDE, "yes");
        assert!(
            !read_redirect_on_hide(&store),
            "Unrecognised values disable redirect"
        );

        store.remove(KEY_REDIRECT_ON_HIDE);
        assert!(read_redirect_on_hide(&store));
    }

    #[test]
    fn test_flags_are_read_fresh() {
        let store = MemoryStore::new();
        assert!(ConfigFlags::read(&store).redirect_on_hide);

        store.set(KEY_REDIRECT_ON_HIDE, "false");
        assert!(!ConfigFlags::read(&store).redirect_on_hide);
    }

    #[test]
    fn test_store_from_iter() {
        let store: MemoryStore = [(KEY_TAB_CLOSE_PROTECTION, "true")].into_iter().collect();
        assert_eq!(
            store.get(KEY_TAB_CLOSE_PROTECTION),
            Some("true".to_string())
        );
        assert_eq!(store.get(KEY_REDIRECT_ON_HIDE), None);
    }
}
