//! Event scripts for the simulator
//!
//! A script seeds the config store, optionally overrides guard settings and
//! lists timed page events:
//!
//! ```toml
//! settle_ms = 500
//!
//! [store]
//! redirectOnHideEnabled = "false"
//!
//! [settings]
//! fade_duration_ms = 200
//!
//! [[step]]
//! at_ms = 0
//! action = "hide"
//!
//! [[step]]
//! at_ms = 400
//! action = "key"
//! key = "e"
//! ```

use crate::config::MemoryStore;
use crate::config_file::GuardSettings;
use crate::sim::{SimPage, SimulatedHost};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// How long to keep the clock running after the last step
pub const DEFAULT_SETTLE_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Hide,
    Show,
    Focus,
    Key,
    Unload,
    Set,
    Unset,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    pub at_ms: u64,
    pub action: ActionKind,
    /// Key value for `key`, store key for `set` / `unset`
    #[serde(default)]
    pub key: Option<String>,
    /// Store value for `set`
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    #[serde(default)]
    pub settings: Option<GuardSettings>,
    #[serde(default)]
    pub store: BTreeMap<String, String>,
    /// Model an engine without `transitionend`
    #[serde(default)]
    pub no_transition_events: bool,
    #[serde(default)]
    pub settle_ms: Option<u64>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

impl Script {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let script: Script = toml::from_str(contents).context("Failed to parse script")?;
        script.validate()?;
        Ok(script)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read script: {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid script: {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(settings) = &self.settings {
            settings.validate().context("Invalid [settings] table")?;
        }

        let mut last = 0;
        for (i, step) in self.steps.iter().enumerate() {
            if step.at_ms < last {
                anyhow::bail!(
                    "Step {} at {}ms is earlier than the previous step ({}ms)",
                    i + 1,
                    step.at_ms,
                    last
                );
            }
            last = step.at_ms;

            let needs_key = matches!(
                step.action,
                ActionKind::Key | ActionKind::Set | ActionKind::Unset
            );
            if needs_key && step.key.is_none() {
                anyhow::bail!("Step {} ({:?}) needs a `key`", i + 1, step.action);
            }
            if step.action == ActionKind::Set && step.value.is_none() {
                anyhow::bail!("Step {} (Set) needs a `value`", i + 1);
            }
        }
        Ok(())
    }

    /// Replay the script, with `settings` used when the script has none
    pub fn run(&self, settings: &GuardSettings) -> Result<SimPage> {
        let settings = self.settings.clone().unwrap_or_else(|| settings.clone());
        let store: MemoryStore = self.store.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

        let mut host = SimulatedHost::new();
        if self.no_transition_events {
            host = host.without_transition_events();
        }
        let mut page = SimPage::with_host(settings, store, host)
            .context("Failed to set up simulated page")?;

        for step in &self.steps {
            page.run_until(step.at_ms);
            let key = step.key.as_deref().unwrap_or_default();
            match step.action {
                ActionKind::Hide => page.hide(),
                ActionKind::Show => page.show(),
                ActionKind::Focus => page.focus(),
                ActionKind::Key => {
                    page.key(key);
                }
                ActionKind::Unload => {
                    page.before_unload();
                }
                ActionKind::Set => {
                    page.store().set(key, step.value.as_deref().unwrap_or_default());
                }
                ActionKind::Unset => page.store().remove(key),
            }
        }

        page.advance(self.settle_ms.unwrap_or(DEFAULT_SETTLE_MS));
        Ok(page)
    }
}
