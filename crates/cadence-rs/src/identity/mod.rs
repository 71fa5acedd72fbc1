//! Per-run session identity and rotation.
//!
//! A [`Session`] is a fresh random UUID plus a device fingerprint derived
//! from the account address, host platform identifiers, and random bits. It
//! is owned by exactly one account-run and replaced — never mutated — when
//! the [`RotationConfig`] decides its time is up. The fingerprint is an
//! identity-variation signal, not a security credential.

pub mod headers;

use crate::config::RotationConfig;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Immutable identity for one connection lifetime.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: Uuid,
    /// SHA-256 hex digest; see [`device_fingerprint`].
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a fresh session identity for an account.
    pub fn generate(address: &str, now: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            fingerprint: device_fingerprint(address),
            created_at: now,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> ChronoDuration {
        (now - self.created_at).max(ChronoDuration::zero())
    }

    /// Shortened session id for display.
    pub fn short_id(&self) -> String {
        self.session_id.to_string().chars().take(8).collect()
    }

    /// Shortened fingerprint for display.
    pub fn short_fingerprint(&self) -> String {
        self.fingerprint.chars().take(8).collect()
    }
}

/// Derive a device fingerprint from the account address, host platform
/// identifiers, a fresh UUID, and random bits. Every call yields a new
/// value even for the same address.
pub fn device_fingerprint(address: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(address.as_bytes());
    hasher.update(std::env::consts::OS.as_bytes());
    hasher.update(std::env::consts::ARCH.as_bytes());
    hasher.update(Uuid::new_v4().as_bytes());
    hasher.update(rand::random::<[u8; 16]>());

    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Why a session was rotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    /// The session outlived its configured maximum age.
    ScheduleElapsed,
    /// A configured wall-clock boundary was crossed since creation.
    ClockBoundary,
    /// Consecutive failures reached the forced-reset threshold.
    FailureThreshold,
}

impl std::fmt::Display for RotationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RotationReason::ScheduleElapsed => write!(f, "session age limit"),
            RotationReason::ClockBoundary => write!(f, "clock boundary"),
            RotationReason::FailureThreshold => write!(f, "failure threshold"),
        }
    }
}

impl RotationConfig {
    /// Whether the session should be replaced now, and why. Checks the
    /// failure threshold first so forced resets win over scheduled ones.
    pub fn should_rotate(
        &self,
        session: &Session,
        now: DateTime<Utc>,
        consecutive_failures: u32,
    ) -> Option<RotationReason> {
        if self.failure_threshold > 0 && consecutive_failures >= self.failure_threshold {
            return Some(RotationReason::FailureThreshold);
        }

        if session.age(now) >= ChronoDuration::seconds(self.max_session_age_secs as i64) {
            return Some(RotationReason::ScheduleElapsed);
        }

        if let Some(hour) = self.rotate_at_utc_hour
            && let Some(boundary) = now.date_naive().and_hms_opt(hour, 0, 0)
        {
            // Most recent occurrence of the boundary at or before `now`.
            let mut boundary = boundary.and_utc();
            if boundary > now {
                boundary = boundary - ChronoDuration::days(1);
            }
            if session.created_at < boundary {
                return Some(RotationReason::ClockBoundary);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, mi, 0).unwrap()
    }

    fn policy() -> RotationConfig {
        RotationConfig {
            max_session_age_secs: 3600,
            rotate_at_utc_hour: None,
            failure_threshold: 3,
            cooldown_secs: 30,
        }
    }

    #[test]
    fn fingerprint_is_hex_and_unique_per_call() {
        let a = device_fingerprint("0xabc");
        let b = device_fingerprint("0xabc");
        assert_eq!(a.chars().count(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn sessions_get_distinct_ids() {
        let now = at(10, 0);
        let a = Session::generate("0xabc", now);
        let b = Session::generate("0xabc", now);
        assert_ne!(a.session_id, b.session_id);
        assert_eq!(a.short_id().chars().count(), 8);
    }

    #[test]
    fn no_rotation_for_young_healthy_session() {
        let session = Session::generate("0xabc", at(10, 0));
        assert_eq!(policy().should_rotate(&session, at(10, 30), 0), None);
    }

    #[test]
    fn rotation_when_session_age_elapses() {
        let session = Session::generate("0xabc", at(10, 0));
        assert_eq!(
            policy().should_rotate(&session, at(11, 0), 0),
            Some(RotationReason::ScheduleElapsed)
        );
    }

    #[test]
    fn rotation_on_failure_threshold_wins() {
        let session = Session::generate("0xabc", at(10, 0));
        assert_eq!(
            policy().should_rotate(&session, at(11, 30), 3),
            Some(RotationReason::FailureThreshold)
        );
    }

    #[test]
    fn rotation_when_clock_boundary_crossed() {
        let config = RotationConfig {
            rotate_at_utc_hour: Some(12),
            max_session_age_secs: 86_400,
            ..policy()
        };
        let session = Session::generate("0xabc", at(11, 0));
        assert_eq!(config.should_rotate(&session, at(11, 59), 0), None);
        assert_eq!(
            config.should_rotate(&session, at(12, 1), 0),
            Some(RotationReason::ClockBoundary)
        );
    }

    #[test]
    fn clock_boundary_ignores_sessions_created_after_it() {
        let config = RotationConfig {
            rotate_at_utc_hour: Some(12),
            max_session_age_secs: 86_400,
            ..policy()
        };
        let session = Session::generate("0xabc", at(13, 0));
        assert_eq!(config.should_rotate(&session, at(14, 0), 0), None);
    }
}
