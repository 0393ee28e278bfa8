use crate::constants::PANIC_KEY;

/// Keys the guard reacts to while the overlay is visible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardKey {
    /// Fade the overlay out
    Dismiss,
    /// Navigate away immediately
    Panic,
}

/// What the page should do with a keydown after the guard saw it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDisposition {
    PassThrough,
    /// Call `preventDefault()` on the event
    Suppress,
}

impl KeyDisposition {
    pub fn suppresses_default(self) -> bool {
        self == KeyDisposition::Suppress
    }
}

/// Classify a `KeyboardEvent.key` value
///
/// The dismiss key matches case-insensitively; the panic key is space.
pub fn classify_key(key: &str, dismiss: char) -> Option<GuardKey> {
    if key == PANIC_KEY {
        return Some(GuardKey::Panic);
    }

    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) if ch.eq_ignore_ascii_case(&dismiss) => Some(GuardKey::Dismiss),
        _ => None,
    }
}
