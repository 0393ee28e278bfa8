// Library interface for PageGuard
// The browser build and the simulator both go through PageGuard

pub mod config;
pub mod config_file;
pub mod constants;
pub mod host;
pub mod navigation_guard;
pub mod overlay;
pub mod presence;
pub mod script;
pub mod sim;

#[cfg(target_arch = "wasm32")]
pub mod web;

use anyhow::{Context, Result};
use config::{ConfigFlags, ConfigStore};
use config_file::GuardSettings;
use host::Host;
use log::info;
use navigation_guard::NavigationGuard;
use presence::PresenceController;
use std::rc::Rc;

/// The guard for one page: presence controller plus unload protection
pub struct PageGuard<H: Host> {
    controller: PresenceController<H>,
    navigation_guard: NavigationGuard,
    store: Rc<dyn ConfigStore>,
}

impl<H: Host> PageGuard<H> {
    /// Create a guard; nothing touches the page until [`start`](Self::start)
    pub fn new(host: H, store: Rc<dyn ConfigStore>, settings: &GuardSettings) -> Result<Self> {
        settings.validate().context("Invalid guard settings")?;

        Ok(Self {
            controller: PresenceController::new(host, Rc::clone(&store), settings),
            navigation_guard: NavigationGuard::new(Rc::clone(&store)),
            store,
        })
    }

    /// Mount the overlay
    ///
    /// # Errors
    ///
    /// Fails if the document has no body.
    pub fn start(&self) -> Result<()> {
        self.controller
            .mount()
            .context("Failed to mount overlay")?;

        let flags = ConfigFlags::read(self.store.as_ref());
        info!(
            "Page guard active (redirect on hide: {}, tab close protection: {})",
            flags.redirect_on_hide, flags.tab_close_protection
        );
        Ok(())
    }

    /// Handle for event listeners; clones share the same controller
    pub fn controller(&self) -> PresenceController<H> {
        self.controller.clone()
    }

    pub fn navigation_guard(&self) -> &NavigationGuard {
        &self.navigation_guard
    }

    pub fn into_parts(self) -> (PresenceController<H>, NavigationGuard) {
        (self.controller, self.navigation_guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;
    use crate::sim::SimulatedHost;

    #[test]
    fn test_start_mounts_overlay() {
        let guard = PageGuard::new(
            SimulatedHost::new(),
            Rc::new(MemoryStore::new()),
            &GuardSettings::default(),
        )
        .expect("new");
        guard.start().expect("start");
        assert!(guard.controller().with_host(|h| h.overlay_present()));
    }

    #[test]
    fn test_start_fails_without_body() {
        let guard = PageGuard::new(
            SimulatedHost::new().without_body(),
            Rc::new(MemoryStore::new()),
            &GuardSettings::default(),
        )
        .expect("new");
        let err = guard.start().expect_err("must fail");
        assert!(format!("{:#}", err).contains("no body"));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = GuardSettings {
            redirect_url: "not a url".to_string(),
            ..GuardSettings::default()
        };
        let result = PageGuard::new(SimulatedHost::new(), Rc::new(MemoryStore::new()), &settings);
        assert!(result.is_err());
    }
}
