//! Wall-clock helpers.
//!
//! The pool and router reason about time in milliseconds since the Unix
//! epoch so that deadlines and `scheduled_at` values can be compared,
//! serialized into audit events, and persisted across a retry without
//! depending on `std::time::Instant`'s non-serializable, non-comparable
//! opaque representation.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}
