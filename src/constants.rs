//! Centralized constants for PageGuard
//!
//! This module contains all tunable values used throughout the guard.
//! Each constant includes documentation on its purpose, unit, and
//! recommended value range. Most of them are only defaults: the live value
//! comes from `GuardSettings` (see config_file module).

// ============================================================================
// REDIRECT CONFIGURATION
// ============================================================================

/// Default redirect target used when the page loses visibility.
/// Unit: absolute URL
pub const DEFAULT_REDIRECT_URL: &str = "https://www.google.com";

/// Default delay between losing visibility and navigating away.
/// Unit: milliseconds
/// Recommended range: 0-100 (intentionally near-instant, not a grace period)
pub const REDIRECT_DELAY_DEFAULT_MS: u64 = 65;

/// Maximum redirect delay accepted from a settings file.
/// Unit: milliseconds
pub const REDIRECT_DELAY_MAX_MS: u64 = 1000;

// ============================================================================
// FADE TRANSITION
// ============================================================================

/// Default opacity transition duration.
/// Unit: milliseconds
/// Range: this value feeds BOTH the CSS `transition` rule and the fallback
/// completion timer, so the two can never drift apart.
pub const FADE_DURATION_DEFAULT_MS: u64 = 300;

/// Minimum fade duration accepted from a settings file.
/// Unit: milliseconds
pub const FADE_DURATION_MIN_MS: u64 = 1;

/// Maximum fade duration accepted from a settings file.
/// Unit: milliseconds
pub const FADE_DURATION_MAX_MS: u64 = 5000;

/// CSS property whose transition completion ends a fade.
pub const FADE_PROPERTY: &str = "opacity";

/// Extra wait past the fade duration before a fade that never reported
/// `transitionend` is completed anyway (e.g. the element was not laid out
/// yet when the class flipped, so no transition ran).
/// Unit: milliseconds
pub const FADE_EVENT_GRACE_MS: u64 = 50;

// ============================================================================
// OVERLAY ELEMENT
// ============================================================================

/// Default id of the cover element (looked up before creating a new one).
pub const DEFAULT_OVERLAY_ID: &str = "overlay";

/// Default class that drives the overlay to opacity 0.
pub const DEFAULT_HIDDEN_CLASS: &str = "hidden";

/// Stacking order of the cover, above all page content.
pub const OVERLAY_Z_INDEX: u32 = 99999;

// ============================================================================
// KEYBOARD
// ============================================================================

/// Default dismiss key (matched case-insensitively).
pub const DEFAULT_DISMISS_KEY: char = 'E';

/// `KeyboardEvent.key` value of the immediate-redirect key.
pub const PANIC_KEY: &str = " ";

// ============================================================================
// CONFIG STORE KEYS
// ============================================================================

/// Store key enabling the unload confirmation prompt (`"true"` enables).
pub const KEY_TAB_CLOSE_PROTECTION: &str = "tabCloseProtectionEnabled";

/// Store key enabling redirect on visibility loss (absent means enabled).
pub const KEY_REDIRECT_ON_HIDE: &str = "redirectOnHideEnabled";

// ============================================================================
// NAVIGATION GUARD
// ============================================================================

/// Non-empty `returnValue` marker; legacy engines only prompt when it is set.
pub const UNLOAD_PROMPT_MARKER: &str = "Leave this page?";

// ============================================================================
// LOGGING
// ============================================================================

/// Prefix for console output in the browser build.
pub const LOG_PREFIX: &str = "[PAGEGUARD]";
