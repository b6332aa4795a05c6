//! Sync timing utilities for cooldown and backoff
//!
//! Pure functions, tested without any scheduling machinery.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Check if enough time has elapsed since the last sync to allow a new one
///
/// Refreshes triggered while a folder is inside its cooldown window are
/// coalesced away; a manual refresh bypasses this check entirely.
pub fn cooldown_elapsed(last_sync_at: Option<DateTime<Utc>>, cooldown_secs: u64) -> bool {
    match last_sync_at {
        Some(last) => {
            let elapsed = Utc::now() - last;
            elapsed.num_seconds() >= cooldown_secs as i64
        }
        None => true,
    }
}

/// Delay before the next automatic sync attempt after repeated failures
///
/// Doubles per consecutive failure from `base_secs`, saturating at
/// `cap_secs`. Zero failures means no extra delay.
pub fn backoff_delay(consecutive_failures: u32, base_secs: u64, cap_secs: u64) -> Duration {
    if consecutive_failures == 0 {
        return Duration::ZERO;
    }
    let exponent = consecutive_failures.saturating_sub(1).min(32);
    let delay = base_secs.saturating_mul(1u64 << exponent);
    Duration::from_secs(delay.min(cap_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_cooldown_elapsed_never_synced() {
        assert!(cooldown_elapsed(None, 30));
        assert!(cooldown_elapsed(None, 3600));
    }

    #[test]
    fn test_cooldown_elapsed_recent_sync() {
        let last_sync = Utc::now() - ChronoDuration::seconds(10);
        assert!(!cooldown_elapsed(Some(last_sync), 30));
    }

    #[test]
    fn test_cooldown_elapsed_old_sync() {
        let last_sync = Utc::now() - ChronoDuration::seconds(60);
        assert!(cooldown_elapsed(Some(last_sync), 30));

        // Exactly at the boundary counts as elapsed
        let last_sync = Utc::now() - ChronoDuration::seconds(30);
        assert!(cooldown_elapsed(Some(last_sync), 30));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(0, 5, 300), Duration::ZERO);
        assert_eq!(backoff_delay(1, 5, 300), Duration::from_secs(5));
        assert_eq!(backoff_delay(2, 5, 300), Duration::from_secs(10));
        assert_eq!(backoff_delay(3, 5, 300), Duration::from_secs(20));
        assert_eq!(backoff_delay(10, 5, 300), Duration::from_secs(300));
    }

    #[test]
    fn test_backoff_no_overflow_on_many_failures() {
        assert_eq!(backoff_delay(1000, 5, 300), Duration::from_secs(300));
    }
}
