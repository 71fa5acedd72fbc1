//! Daily interaction quota and reset-boundary tracking.
//!
//! A [`QuotaState`] is a two-state machine: ACCEPTING while
//! `interactions_used < cap`, EXHAUSTED once the cap is reached. The period
//! rolls over at the next UTC-midnight boundary, at which point the used
//! count resets and the caller clears its used-question tracking. All
//! methods take `now` explicitly so tests can drive simulated time.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// Compute the next UTC-midnight boundary strictly after `now`.
pub fn next_reset_after(now: DateTime<Utc>) -> DateTime<Utc> {
    match now
        .date_naive()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        Some(midnight) => midnight.and_utc(),
        // Unreachable within chrono's calendar range.
        None => now + ChronoDuration::days(1),
    }
}

/// Format a wait duration for display, floored to whole hours and minutes.
pub fn format_wait(wait: ChronoDuration) -> String {
    let total_minutes = wait.num_minutes().max(0);
    format!(
        "{} hours and {} minutes",
        total_minutes / 60,
        total_minutes % 60
    )
}

/// Per-account interaction quota for the current daily period.
#[derive(Debug, Clone)]
pub struct QuotaState {
    interactions_used: u32,
    cap: u32,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    consecutive_failures: u32,
}

impl QuotaState {
    /// Start a fresh period at `now`.
    pub fn new(cap: u32, now: DateTime<Utc>) -> Self {
        Self {
            interactions_used: 0,
            cap,
            period_start: now,
            period_end: next_reset_after(now),
            consecutive_failures: 0,
        }
    }

    /// Resume a period restored from a snapshot. Falls back to a fresh
    /// period when the saved boundary is not in the future.
    pub fn resume(
        cap: u32,
        interactions_used: u32,
        period_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        if period_end <= now {
            return Self::new(cap, now);
        }
        Self {
            interactions_used: interactions_used.min(cap),
            cap,
            period_start: now,
            period_end,
            consecutive_failures: 0,
        }
    }

    pub fn interactions_used(&self) -> u32 {
        self.interactions_used
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    /// Interactions left in the current period.
    pub fn remaining(&self) -> u32 {
        self.cap.saturating_sub(self.interactions_used)
    }

    pub fn period_start(&self) -> DateTime<Utc> {
        self.period_start
    }

    pub fn period_end(&self) -> DateTime<Utc> {
        self.period_end
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Roll the period over if `now` has crossed the reset boundary.
    ///
    /// Returns `true` when a rollover happened — the caller must then clear
    /// its used-question tracking so pools start fresh.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> bool {
        if now < self.period_end {
            return false;
        }
        self.interactions_used = 0;
        self.period_start = now;
        self.period_end = next_reset_after(now);
        true
    }

    /// EXHAUSTED state: the cap is spent and the period has not rolled over.
    pub fn is_exhausted(&self) -> bool {
        self.interactions_used >= self.cap
    }

    /// Whether another interaction may be issued at `now`. Performs the
    /// EXHAUSTED→ACCEPTING transition when the boundary has been crossed.
    pub fn can_perform_interaction(&mut self, now: DateTime<Utc>) -> bool {
        self.refresh(now);
        !self.is_exhausted()
    }

    /// Record one successful interaction; resets the failure streak.
    pub fn record_success(&mut self) {
        self.interactions_used += 1;
        self.consecutive_failures = 0;
    }

    /// Record one failed interaction; returns the new streak length.
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    pub fn reset_failures(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Time until the reset boundary. Never negative.
    pub fn wait_until_reset(&self, now: DateTime<Utc>) -> ChronoDuration {
        (self.period_end - now).max(ChronoDuration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn reset_boundary_is_next_utc_midnight() {
        let now = at(2026, 3, 14, 15, 9);
        assert_eq!(next_reset_after(now), at(2026, 3, 15, 0, 0));
    }

    #[test]
    fn reset_boundary_is_strictly_in_future_at_midnight() {
        let midnight = at(2026, 3, 14, 0, 0);
        assert_eq!(next_reset_after(midnight), at(2026, 3, 15, 0, 0));
        assert!(next_reset_after(midnight) > midnight);
    }

    #[test]
    fn cap_blocks_until_simulated_time_crosses_boundary() {
        let start = at(2026, 3, 14, 10, 0);
        let mut quota = QuotaState::new(20, start);

        for _ in 0..20 {
            assert!(quota.can_perform_interaction(start));
            quota.record_success();
        }
        assert_eq!(quota.interactions_used(), 20);
        assert!(!quota.can_perform_interaction(at(2026, 3, 14, 23, 59)));

        // Crossing the boundary resets the count and reopens the quota.
        let after_reset = at(2026, 3, 15, 0, 1);
        assert!(quota.can_perform_interaction(after_reset));
        assert_eq!(quota.interactions_used(), 0);
        assert_eq!(quota.period_end(), at(2026, 3, 16, 0, 0));
    }

    #[test]
    fn refresh_signals_rollover_exactly_once() {
        let start = at(2026, 3, 14, 10, 0);
        let mut quota = QuotaState::new(5, start);
        assert!(!quota.refresh(start));
        assert!(quota.refresh(at(2026, 3, 15, 0, 0)));
        assert!(!quota.refresh(at(2026, 3, 15, 0, 1)));
    }

    #[test]
    fn failure_streak_accumulates_and_clears() {
        let mut quota = QuotaState::new(20, at(2026, 3, 14, 10, 0));
        assert_eq!(quota.record_failure(), 1);
        assert_eq!(quota.record_failure(), 2);
        quota.record_success();
        assert_eq!(quota.consecutive_failures(), 0);
        quota.record_failure();
        quota.reset_failures();
        assert_eq!(quota.consecutive_failures(), 0);
    }

    #[test]
    fn wait_until_reset_is_never_negative() {
        let quota = QuotaState::new(20, at(2026, 3, 14, 10, 0));
        let late = at(2026, 3, 20, 0, 0);
        assert_eq!(quota.wait_until_reset(late), ChronoDuration::zero());
        assert!(quota.wait_until_reset(at(2026, 3, 14, 23, 0)) > ChronoDuration::zero());
    }

    #[test]
    fn wait_formats_as_hours_and_minutes() {
        assert_eq!(
            format_wait(ChronoDuration::minutes(185)),
            "3 hours and 5 minutes"
        );
        assert_eq!(
            format_wait(ChronoDuration::seconds(59)),
            "0 hours and 0 minutes"
        );
    }

    #[test]
    fn resume_honors_future_boundary_and_discards_stale_one() {
        let now = at(2026, 3, 14, 10, 0);
        let resumed = QuotaState::resume(20, 7, at(2026, 3, 15, 0, 0), now);
        assert_eq!(resumed.interactions_used(), 7);
        assert_eq!(resumed.period_end(), at(2026, 3, 15, 0, 0));

        let stale = QuotaState::resume(20, 7, at(2026, 3, 14, 0, 0), now);
        assert_eq!(stale.interactions_used(), 0);
        assert_eq!(stale.period_end(), at(2026, 3, 15, 0, 0));
    }
}
