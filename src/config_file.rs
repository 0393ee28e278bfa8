//! Guard settings file management
//!
//! This module handles loading and validating the static guard settings:
//! redirect target, timings, key bindings and overlay naming. Unlike the
//! runtime flags (see config module) these are read once at startup.

use crate::constants::{
    DEFAULT_DISMISS_KEY, DEFAULT_HIDDEN_CLASS, DEFAULT_OVERLAY_ID, DEFAULT_REDIRECT_URL,
    FADE_DURATION_DEFAULT_MS, FADE_DURATION_MAX_MS, FADE_DURATION_MIN_MS,
    REDIRECT_DELAY_DEFAULT_MS, REDIRECT_DELAY_MAX_MS,
};
use crate::overlay::FadeCompletion;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
#[cfg(not(target_arch = "wasm32"))]
use std::path::PathBuf;
use std::time::Duration;

/// Guard settings stored in settings.toml
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct GuardSettings {
    /// Absolute http(s) URL navigated to when the page is abandoned
    pub redirect_url: String,
    /// Delay between visibility loss and the redirect (default: 65)
    pub redirect_delay_ms: u64,
    /// Opacity transition duration for the CSS rule and the fallback timer (default: 300)
    pub fade_duration_ms: u64,
    /// Dismiss key (A-Z, case insensitive, default: E)
    pub dismiss_key: String,
    /// Id of the cover element
    pub overlay_id: String,
    /// Class that fades the cover to transparent
    pub hidden_class: String,
    /// How the end of a fade is detected
    pub fade_completion: FadeCompletion,
    /// Fade the cover in on visibility loss instead of showing it at once
    pub animate_show: bool,
    /// Drop the cover immediately when the page becomes visible again
    pub reveal_on_restore: bool,
    /// Optional headline shown on the cover
    pub message: Option<String>,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            redirect_url: DEFAULT_REDIRECT_URL.to_string(),
            redirect_delay_ms: REDIRECT_DELAY_DEFAULT_MS,
            fade_duration_ms: FADE_DURATION_DEFAULT_MS,
            dismiss_key: DEFAULT_DISMISS_KEY.to_string(),
            overlay_id: DEFAULT_OVERLAY_ID.to_string(),
            hidden_class: DEFAULT_HIDDEN_CLASS.to_string(),
            fade_completion: FadeCompletion::default(),
            animate_show: false,
            reveal_on_restore: false,
            message: None,
        }
    }
}

impl GuardSettings {
    /// Get the standard settings file path
    ///
    /// - Linux: `~/.config/pageguard/settings.toml`
    /// - macOS: `~/Library/Application Support/pageguard/settings.toml`
    /// - Windows: `%APPDATA%\pageguard\settings.toml`
    #[cfg(not(target_arch = "wasm32"))]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pageguard").join("settings.toml"))
    }

    /// Parse and validate settings from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let settings: GuardSettings =
            toml::from_str(contents).context("Failed to parse settings")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file doesn't exist
    /// - Failed to read file
    /// - TOML parsing fails
    /// - A value is out of range
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Settings file not found at: {}", path.display());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid settings file: {}", path.display()))
    }

    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<()> {
        Self::validate_redirect_url(&self.redirect_url)
            .with_context(|| format!("Invalid redirect_url: '{}'", self.redirect_url))?;

        if self.redirect_delay_ms > REDIRECT_DELAY_MAX_MS {
            anyhow::bail!(
                "Invalid redirect_delay_ms: {} (must be 0-{})",
                self.redirect_delay_ms,
                REDIRECT_DELAY_MAX_MS
            );
        }

        if !(FADE_DURATION_MIN_MS..=FADE_DURATION_MAX_MS).contains(&self.fade_duration_ms) {
            anyhow::bail!(
                "Invalid fade_duration_ms: {} (must be {}-{})",
                self.fade_duration_ms,
                FADE_DURATION_MIN_MS,
                FADE_DURATION_MAX_MS
            );
        }

        Self::validate_dismiss_key(&self.dismiss_key)
            .with_context(|| format!("Invalid dismiss_key: '{}'", self.dismiss_key))?;

        Self::validate_css_identifier(&self.overlay_id)
            .with_context(|| format!("Invalid overlay_id: '{}'", self.overlay_id))?;
        Self::validate_css_identifier(&self.hidden_class)
            .with_context(|| format!("Invalid hidden_class: '{}'", self.hidden_class))?;

        Ok(())
    }

    /// Validate that a dismiss key is a single letter A-Z (case insensitive)
    pub fn validate_dismiss_key(key: &str) -> Result<()> {
        let mut chars = key.chars();
        let ch = match (chars.next(), chars.next()) {
            (Some(ch), None) => ch,
            _ => return Err(anyhow!("Dismiss key must be a single character")),
        };
        if !ch.is_ascii_alphabetic() {
            return Err(anyhow!("Dismiss key must be a letter A-Z"));
        }
        Ok(())
    }

    /// Validate that a redirect target is an absolute http(s) URL
    pub fn validate_redirect_url(raw: &str) -> Result<()> {
        let parsed = url::Url::parse(raw).context("Redirect URL must be absolute")?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(anyhow!("Unsupported redirect scheme: {}", other)),
        }
    }

    /// Validate an element id or class name
    pub fn validate_css_identifier(name: &str) -> Result<()> {
        let first = name
            .chars()
            .next()
            .ok_or_else(|| anyhow!("Identifier cannot be empty"))?;
        if first.is_ascii_digit() {
            return Err(anyhow!("Identifier cannot start with a digit"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(anyhow!("Identifier may only contain A-Z, a-z, 0-9, '-' and '_'"));
        }
        Ok(())
    }

    /// The dismiss key, upper-cased
    pub fn dismiss_char(&self) -> char {
        self.dismiss_key
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or(DEFAULT_DISMISS_KEY)
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }

    pub fn fade_duration(&self) -> Duration {
        Duration::from_millis(self.fade_duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_settings_path() -> PathBuf {
        // Unique per call so parallel tests never share a file
        use std::thread;
        use std::time::{SystemTime, UNIX_EPOCH};

        let mut base = std::env::temp_dir();
        base.push("pageguard_tests");
        base.push("config_file");

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let tid = format!("{:?}", thread::current().id());
        base.push(format!("t_{nanos}_{tid}"));

        let _ = fs::create_dir_all(&base);

        base.join("settings.toml")
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = GuardSettings::default();
        settings.validate().expect("Defaults must validate");
        assert_eq!(settings.redirect_delay(), Duration::from_millis(65));
        assert_eq!(settings.fade_duration(), Duration::from_millis(300));
        assert_eq!(settings.dismiss_char(), 'E');
        assert_eq!(settings.fade_completion, FadeCompletion::TransitionEvent);
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let settings = GuardSettings::from_toml_str("").expect("Empty file should parse");
        assert_eq!(settings, GuardSettings::default());
    }

    #[test]
    fn test_partial_toml_overrides() {
        let settings = GuardSettings::from_toml_str(
            r#"
redirect_url = "https://example.com/away"
dismiss_key = "q"
fade_completion = "timeout"
message = "Be right back"
"#,
        )
        .expect("Should parse");

        assert_eq!(settings.redirect_url, "https://example.com/away");
        assert_eq!(settings.dismiss_char(), 'Q');
        assert_eq!(settings.fade_completion, FadeCompletion::Timeout);
        assert_eq!(settings.message.as_deref(), Some("Be right back"));
        assert_eq!(settings.redirect_delay_ms, REDIRECT_DELAY_DEFAULT_MS);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = GuardSettings::from_toml_str("redirect_delay = 10");
        assert!(result.is_err(), "Misspelled keys should not be silently ignored");
    }

    #[test]
    fn test_dismiss_key_validation() {
        assert!(GuardSettings::validate_dismiss_key("E").is_ok());
        assert!(GuardSettings::validate_dismiss_key("z").is_ok());
        assert!(GuardSettings::validate_dismiss_key("").is_err());
        assert!(GuardSettings::validate_dismiss_key("EE").is_err());
        assert!(GuardSettings::validate_dismiss_key(" ").is_err());
        assert!(GuardSettings::validate_dismiss_key("1").is_err());
        assert!(GuardSettings::validate_dismiss_key("é").is_err());
    }

    #[test]
    fn test_redirect_url_validation() {
        assert!(GuardSettings::validate_redirect_url("https://www.google.com").is_ok());
        assert!(GuardSettings::validate_redirect_url("http://localhost:8080/x").is_ok());
        assert!(GuardSettings::validate_redirect_url("/relative/path").is_err());
        assert!(GuardSettings::validate_redirect_url("javascript:alert(1)").is_err());
        assert!(GuardSettings::validate_redirect_url("").is_err());
    }

    #[test]
    fn test_range_validation() {
        let mut settings = GuardSettings {
            redirect_delay_ms: REDIRECT_DELAY_MAX_MS + 1,
            ..GuardSettings::default()
        };
        assert!(settings.validate().is_err());

        settings.redirect_delay_ms = 0;
        assert!(settings.validate().is_ok(), "Zero delay is allowed");

        settings.fade_duration_ms = 0;
        assert!(settings.validate().is_err(), "Zero fade would never end");

        settings.fade_duration_ms = FADE_DURATION_MAX_MS;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_css_identifier_validation() {
        assert!(GuardSettings::validate_css_identifier("overlay").is_ok());
        assert!(GuardSettings::validate_css_identifier("page-guard_2").is_ok());
        assert!(GuardSettings::validate_css_identifier("").is_err());
        assert!(GuardSettings::validate_css_identifier("2fast").is_err());
        assert!(GuardSettings::validate_css_identifier("a b").is_err());
        assert!(GuardSettings::validate_css_identifier("x{}").is_err());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let temp_path = temp_settings_path();
        let _ = fs::remove_file(&temp_path);

        let original = GuardSettings {
            redirect_url: "https://example.org/".to_string(),
            redirect_delay_ms: 20,
            reveal_on_restore: true,
            ..GuardSettings::default()
        };

        let contents = toml::to_string_pretty(&original).expect("Failed to serialize");
        fs::write(&temp_path, contents).expect("Failed to write temp settings");

        let loaded = GuardSettings::load_from_path(&temp_path).expect("Failed to load");
        assert_eq!(original, loaded);

        fs::remove_file(temp_path).ok();
    }

    #[test]
    fn test_missing_settings_file() {
        let missing_path = Path::new("/tmp/pageguard_missing_settings_test.toml");
        let _ = fs::remove_file(missing_path);

        let result = GuardSettings::load_from_path(missing_path);

        assert!(result.is_err());
        if let Err(e) = result {
            let error_msg = format!("{:#}", e);
            assert!(error_msg.contains("not found"));
        }
    }

    #[test]
    fn test_invalid_value_in_loaded_file() {
        let temp_path = temp_settings_path();
        let _ = fs::remove_file(&temp_path);

        fs::write(&temp_path, "dismiss_key = \"123\"\n").expect("Failed to write temp settings");

        let result = GuardSettings::load_from_path(&temp_path);
        assert!(result.is_err(), "Should reject invalid dismiss_key");
        if let Err(e) = result {
            let error_msg = format!("{:#}", e);
            assert!(
                error_msg.contains("Invalid dismiss_key"),
                "Error should mention the field: {}",
                error_msg
            );
        }

        fs::remove_file(temp_path).ok();
    }
}
