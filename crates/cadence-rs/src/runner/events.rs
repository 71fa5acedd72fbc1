//! Events, handlers, and run summaries for the [`Runner`](super::Runner).
//!
//! The runner communicates with callers through [`RunnerEvent`] variants
//! covering the full lifecycle of an account run — session creation through
//! pacing, retries, quota waits, and the final summary. Callers implement
//! [`RunnerEventHandler`] to observe these events for console output,
//! logging, or metrics.

use crate::identity::{RotationReason, Session};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Events emitted by the runner during a run.
#[derive(Debug)]
pub enum RunnerEvent<'a> {
    /// An account's loop is starting with a fresh session.
    AccountStart {
        address: &'a str,
        session: &'a Session,
    },
    /// A new interaction cycle is starting.
    InteractionStart { number: u32, remaining: u32 },
    /// An endpoint and question were selected for this cycle.
    QuestionSelected {
        endpoint: &'a str,
        question: &'a str,
    },
    /// A completed response unit came off the stream.
    Unit(&'a str),
    /// A transient failure is being retried after a backoff.
    QueryRetry {
        attempt: u32,
        max_retries: u32,
        delay: Duration,
    },
    /// The query failed definitively after exhausting retries.
    QueryFailed { error: &'a str },
    /// The usage report resolved. `delivered` is false when the report was
    /// absorbed after exhausting retries — progression continues either way.
    ReportOutcome { delivered: bool },
    /// An interaction completed and was counted against the quota.
    InteractionComplete { used: u32, cap: u32 },
    /// The daily quota is exhausted; `wait` is the formatted time to reset.
    QuotaExhausted { wait: &'a str },
    /// The session (and its connection) was replaced.
    SessionRotated {
        reason: RotationReason,
        session: &'a Session,
    },
    /// A post-rotation cooldown is starting.
    CooldownStart { delay: Duration },
    /// An inter-query or inter-account pacing delay is starting.
    PacingDelay { delay: Duration },
    /// An account's loop finished; the summary is final.
    AccountFinished { summary: &'a AccountSummary },
    /// Cancellation was observed; the loop is unwinding.
    Cancelled,
}

/// Final statistics for one account's run.
#[derive(Debug, Clone, Default)]
pub struct AccountSummary {
    pub address: String,
    /// Interactions completed this run (query + report cycles).
    pub interactions: u32,
    /// Definitive query failures this run.
    pub failures: u32,
    pub duration: Duration,
    /// Quota left in the current period when the loop ended.
    pub remaining_quota: u32,
    pub exhausted: bool,
}

/// Aggregate outcome across all accounts.
#[derive(Debug, Default)]
pub struct RunReport {
    pub accounts: Vec<AccountSummary>,
    pub cancelled: bool,
}

/// Observer for [`RunnerEvent`]s.
pub trait RunnerEventHandler {
    fn on_event(&self, event: &RunnerEvent<'_>);
}

/// Handler that ignores all events.
pub struct NoopHandler;

impl RunnerEventHandler for NoopHandler {
    fn on_event(&self, _event: &RunnerEvent<'_>) {}
}

/// Handler that logs events via `tracing`.
pub struct LoggingHandler;

impl RunnerEventHandler for LoggingHandler {
    fn on_event(&self, event: &RunnerEvent<'_>) {
        match event {
            RunnerEvent::AccountStart { address, session } => {
                info!(
                    "Account {address} starting (session {}, fingerprint {})",
                    session.short_id(),
                    session.short_fingerprint(),
                );
            }
            RunnerEvent::InteractionStart { number, remaining } => {
                info!("Interaction #{number} ({remaining} remaining today)");
            }
            RunnerEvent::QuestionSelected { endpoint, question } => {
                info!("[{endpoint}] {question}");
            }
            RunnerEvent::Unit(text) => {
                debug!("Unit: {text}");
            }
            RunnerEvent::QueryRetry {
                attempt,
                max_retries,
                delay,
            } => {
                warn!("Retry {attempt}/{max_retries} in {:.1}s", delay.as_secs_f64());
            }
            RunnerEvent::QueryFailed { error } => {
                warn!("Query failed: {error}");
            }
            RunnerEvent::ReportOutcome { delivered } => {
                if *delivered {
                    debug!("Usage report delivered");
                } else {
                    warn!("Usage report absorbed after retries");
                }
            }
            RunnerEvent::InteractionComplete { used, cap } => {
                info!("Interaction recorded ({used}/{cap})");
            }
            RunnerEvent::QuotaExhausted { wait } => {
                info!("Daily quota exhausted; next reset in {wait}");
            }
            RunnerEvent::SessionRotated { reason, session } => {
                info!("Session rotated ({reason}); new session {}", session.short_id());
            }
            RunnerEvent::CooldownStart { delay } => {
                info!("Cooling down for {:.0}s", delay.as_secs_f64());
            }
            RunnerEvent::PacingDelay { delay } => {
                debug!("Pacing delay {:.1}s", delay.as_secs_f64());
            }
            RunnerEvent::AccountFinished { summary } => {
                info!(
                    "Account {} finished: {} interaction(s), {} failure(s), {:.0}s",
                    summary.address,
                    summary.interactions,
                    summary.failures,
                    summary.duration.as_secs_f64(),
                );
            }
            RunnerEvent::Cancelled => {
                info!("Cancellation observed; unwinding");
            }
        }
    }
}

/// Handler that delegates to multiple inner handlers in order.
pub struct CompositeHandler {
    handlers: Vec<Box<dyn RunnerEventHandler>>,
}

impl CompositeHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Add a handler to the chain. Handlers are called in registration order.
    pub fn with(mut self, handler: impl RunnerEventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }
}

impl Default for CompositeHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl RunnerEventHandler for CompositeHandler {
    fn on_event(&self, event: &RunnerEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}
