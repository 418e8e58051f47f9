//! The expiry sweeper.
//!
//! A fixed-interval poll over the facade's cached snapshot of occupied
//! issues. Polling was chosen over per-issue timers on purpose: it survives
//! process restarts with no bookkeeping, and redundant checks are harmless
//! because the expiry write is conditional in the store. A failed tick is
//! logged and abandoned; the next tick re-checks everything, so transient
//! store trouble heals by repetition rather than explicit retries.
//!
//! This is the only non-admin path that takes an issue from `occupied` back
//! to `open`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::app::Arena;
use crate::domain;

/// Run the sweep loop until the runtime shuts down.
pub fn spawn(arena: Arena, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; consume it so the first real
        // sweep fires after one interval has elapsed.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let expired = sweep_once(&arena, Utc::now());
            if expired > 0 {
                tracing::info!("Expiry sweep reclaimed {expired} issue(s)");
            }
        }
    })
}

/// One sweep pass: reclaim every occupied issue past its deadline.
///
/// Returns how many issues actually expired. Per-issue failures are logged
/// and skipped so one bad row cannot stall the rest of the sweep.
pub fn sweep_once(arena: &Arena, now: DateTime<Utc>) -> usize {
    let mut expired = 0;
    for issue in arena.occupied_issues() {
        if domain::expire(&issue, now).is_none() {
            continue;
        }
        match arena.expire_issue(issue.id, now) {
            Ok(true) => {
                tracing::info!(issue = %issue.id, "Occupied issue expired; reset to open");
                expired += 1;
            }
            Ok(false) => {
                // The cache was behind: the issue was closed, re-opened or
                // already swept between snapshot and write.
                tracing::debug!(issue = %issue.id, "Expiry no-op; state moved on");
            }
            Err(e) => {
                tracing::warn!(issue = %issue.id, "Expiry failed, will retry next tick: {e}");
            }
        }
    }
    expired
}
