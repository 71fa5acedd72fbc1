//! Human-simulation pacing delays.
//!
//! Three delays shape each cycle: a pre-query "thinking" pause, a "typing"
//! delay proportional to the question length, and a post-response
//! inter-query gap. The inter-query gap is scaled up inside the configured
//! peak-hour window. All sampling goes through the injected [`RandomSource`].

use crate::RandomSource;
use crate::config::PacingConfig;
use chrono::{DateTime, Timelike, Utc};
use std::time::Duration;

impl PacingConfig {
    /// Pre-query thinking pause.
    pub fn thinking_delay(&self, rng: &mut dyn RandomSource) -> Duration {
        Duration::from_secs_f64(rng.in_range(self.thinking_min_secs, self.thinking_max_secs))
    }

    /// Typing delay for a question: characters times a sampled per-character
    /// rate.
    pub fn typing_delay(&self, question: &str, rng: &mut dyn RandomSource) -> Duration {
        let per_char_ms = rng.in_range(self.typing_min_ms as f64, self.typing_max_ms as f64);
        let chars = question.chars().count() as f64;
        Duration::from_secs_f64(chars * per_char_ms / 1000.0)
    }

    /// Post-response gap before the next query, scaled during peak hours.
    pub fn inter_query_delay(&self, now: DateTime<Utc>, rng: &mut dyn RandomSource) -> Duration {
        let base = rng.in_range(self.inter_query_min_secs, self.inter_query_max_secs);
        let scaled = if self.is_peak_hour(now.hour()) {
            base * self.peak_multiplier
        } else {
            base
        };
        Duration::from_secs_f64(scaled)
    }

    /// Gap between accounts in the sequential loop.
    pub fn account_gap(&self, rng: &mut dyn RandomSource) -> Duration {
        Duration::from_secs_f64(rng.in_range(self.account_gap_min_secs, self.account_gap_max_secs))
    }

    /// Whether a UTC hour falls inside the peak window. The window may wrap
    /// past midnight (e.g. 22 → 4).
    pub fn is_peak_hour(&self, hour: u32) -> bool {
        match (self.peak_start_hour, self.peak_end_hour) {
            (Some(start), Some(end)) if start <= end => hour >= start && hour < end,
            (Some(start), Some(end)) => hour >= start || hour < end,
            _ => false,
        }
    }
}
