//! Paced interaction client for conversational agent endpoints.
//!
//! `cadence-rs` drives a fleet of accounts against a set of remote
//! conversational HTTP endpoints: each cycle selects an endpoint and a preset
//! question, streams the incrementally delivered answer back over SSE,
//! reassembles it into readable sentence/list units, reports the exchange to
//! a usage-tracking API, and paces itself against a daily interaction quota.
//!
//! The core abstraction is the [`Runner`](runner::Runner) — a sequential
//! per-account loop that wires together the stream reassembler, the retry
//! policy, the quota tracker, and the session rotator. Accounts are processed
//! one at a time; all waiting is cooperative and cancellable.
//!
//! # Getting started
//!
//! ```ignore
//! use cadence_rs::cancel::CancelToken;
//! use cadence_rs::config::AppConfig;
//! use cadence_rs::runner::Runner;
//! use cadence_rs::runner::events::LoggingHandler;
//! use cadence_rs::ThreadRandom;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let config = AppConfig::load("cadence.toml".as_ref())?;
//!     let cancel = CancelToken::new();
//!     let handler = LoggingHandler;
//!     let mut rng = ThreadRandom;
//!
//!     let report = Runner::new(&config, &handler, cancel, &mut rng)
//!         .run_all()
//!         .await;
//!
//!     for account in &report.accounts {
//!         println!("{}: {} interaction(s)", account.address, account.interactions);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Stream reassembly:** [`api::streaming`] parses raw SSE frames into
//!   [`StreamEvent`](api::streaming::StreamEvent)s; [`api::reassembly`]
//!   regroups text deltas into cleaned sentence/list units.
//! - **Retry policy:** [`api::retry`] — transient error detection with
//!   exponential backoff, plus the [`retry_api_call`](api::retry::retry_api_call)
//!   driver used by both the query and report paths.
//! - **Quota tracking:** [`quota`] — daily cap, UTC-midnight reset boundary,
//!   consecutive-failure counter. [`snapshot`] persists it between runs.
//! - **Identity:** [`identity`] — per-run sessions, device fingerprints,
//!   rotation policy, and per-request header synthesis.
//! - **Orchestration:** [`runner`] — the interaction loop, endpoint/question
//!   selection, pacing delays, and observable [`RunnerEvent`](runner::events::RunnerEvent)s.

pub mod api;
pub mod cancel;
pub mod config;
pub mod identity;
pub mod quota;
pub mod runner;
pub mod snapshot;

use crate::api::reassembly::Reassembler;
use crate::api::streaming::StreamEvent;
use crate::config::{Account, Endpoint, IdentityConfig, TimeoutConfig};
use crate::identity::Session;
use chrono::Utc;
use serde::Serialize;
use tracing::debug;

// ── Constants ──────────────────────────────────────────────────────

/// Path appended to the configured usage API base URL for interaction reports.
pub const REPORT_PATH: &str = "/report_usage";

/// Timestamp format sent in the query body's `client_info`.
pub const CLIENT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ── Randomness ─────────────────────────────────────────────────────

/// Source of randomness for endpoint/question selection, pacing jitter, and
/// header synthesis. Injectable so tests can script deterministic sequences.
pub trait RandomSource {
    /// Uniform index in `0..bound`. `bound` must be greater than zero.
    fn next_index(&mut self, bound: usize) -> usize;

    /// Uniform float in `[0, 1)`.
    fn next_f64(&mut self) -> f64;

    /// Uniform float in `[min, max)`.
    fn in_range(&mut self, min: f64, max: f64) -> f64 {
        if max <= min {
            return min;
        }
        min + self.next_f64() * (max - min)
    }
}

/// Production randomness backed by the thread-local RNG.
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_index(&mut self, bound: usize) -> usize {
        use rand::Rng;
        rand::thread_rng().gen_range(0..bound.max(1))
    }

    fn next_f64(&mut self) -> f64 {
        use rand::Rng;
        rand::thread_rng().gen_range(0.0..1.0)
    }
}

// ── Wire types ─────────────────────────────────────────────────────

/// Client identity block included in every query body.
#[derive(Serialize, Debug, Clone)]
pub struct ClientInfo {
    pub session_id: String,
    pub device_fingerprint: String,
    pub timestamp_utc: String,
}

/// Query body sent to an agent endpoint.
#[derive(Serialize, Debug)]
pub struct QueryRequest {
    pub message: String,
    pub stream: bool,
    /// Epoch seconds at send time.
    pub timestamp: i64,
    pub client_info: ClientInfo,
}

/// Report body sent to the usage-tracking API after a completed exchange.
#[derive(Serialize, Debug)]
pub struct ReportRequest {
    pub wallet_address: String,
    pub agent_id: String,
    pub request_text: String,
    pub response_text: String,
    pub request_metadata: serde_json::Value,
}

// ── Client ─────────────────────────────────────────────────────────

/// HTTP client bound to one [`Session`] and one account's proxy.
///
/// Owned exclusively by the current account's runner. Session rotation
/// replaces the whole `AgentClient` — the old connection pool is dropped,
/// never mutated in place.
pub struct AgentClient {
    http: reqwest::Client,
    session: Session,
}

impl AgentClient {
    /// Build a client for a session, honoring the account's optional proxy.
    pub fn new(
        session: Session,
        account: &Account,
        timeouts: &TimeoutConfig,
    ) -> Result<Self, String> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(timeouts.connect())
            .timeout(timeouts.read());

        if let Some(proxy_url) = &account.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| format!("invalid proxy URL for {}: {e}", account.address))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;

        Ok(Self { http, session })
    }

    /// The session identity this client is bound to.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Send a streaming query and reassemble the response.
    ///
    /// Reads the SSE body incrementally via `chunk()` so long responses don't
    /// hit a single-body timeout. `on_unit` is invoked for each completed
    /// sentence/list unit as it comes off the wire; the return value is the
    /// newline-joined canonical response text.
    ///
    /// An empty stream (or a terminator-only stream) is a query failure.
    pub async fn query(
        &self,
        endpoint: &Endpoint,
        question: &str,
        identity: &IdentityConfig,
        mut on_unit: impl FnMut(&str),
    ) -> Result<String, String> {
        let now = Utc::now();
        let body = QueryRequest {
            message: question.to_string(),
            stream: true,
            timestamp: now.timestamp(),
            client_info: ClientInfo {
                session_id: self.session.session_id.to_string(),
                device_fingerprint: self.session.fingerprint.clone(),
                timestamp_utc: now.format(CLIENT_TIMESTAMP_FORMAT).to_string(),
            },
        };

        let mut rng = ThreadRandom;
        let headers = crate::identity::headers::request_headers(&self.session, identity, &mut rng);

        debug!("Sending streaming query to {}", endpoint.name);

        let mut resp = self
            .http
            .post(&endpoint.url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("query request failed: {e}"))?;

        if !resp.status().is_success() {
            return Err(format!("agent endpoint HTTP {}", resp.status()));
        }

        let mut reassembler = Reassembler::new();
        let mut buffer = String::new();
        let mut done = false;

        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| format!("failed to read streaming chunk: {e}"))?
        {
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // Process all complete lines in the buffer.
            while let Some(newline_pos) = buffer.find('\n') {
                let line: String = buffer.drain(..=newline_pos).collect();
                match api::streaming::parse_sse_line(&line) {
                    Some(StreamEvent::Done) => {
                        done = true;
                        break;
                    }
                    Some(StreamEvent::TextDelta(delta)) => {
                        let before = reassembler.unit_count();
                        reassembler.push_fragment(&delta);
                        for unit in reassembler.units().iter().skip(before) {
                            on_unit(unit);
                        }
                    }
                    None => {}
                }
            }

            if done {
                break;
            }
        }

        // Process any remaining data in the buffer (incomplete final line).
        if !done
            && let Some(StreamEvent::TextDelta(delta)) = api::streaming::parse_sse_line(&buffer)
        {
            let before = reassembler.unit_count();
            reassembler.push_fragment(&delta);
            for unit in reassembler.units().iter().skip(before) {
                on_unit(unit);
            }
        }

        let emitted = reassembler.unit_count();
        let units = reassembler.finish();
        for unit in units.iter().skip(emitted) {
            on_unit(unit);
        }

        debug!("Stream completed with {} unit(s)", units.len());

        if units.is_empty() {
            return Err("empty stream".to_string());
        }
        Ok(units.join("\n"))
    }

    /// Report a completed exchange to the usage-tracking API.
    ///
    /// Success is HTTP 200; everything else is an `Err` for the retry driver
    /// to classify. Whether a report failure matters is the caller's policy.
    pub async fn report_usage(
        &self,
        report_url: &str,
        body: &ReportRequest,
        identity: &IdentityConfig,
    ) -> Result<(), String> {
        let mut rng = ThreadRandom;
        let headers = crate::identity::headers::request_headers(&self.session, identity, &mut rng);

        let resp = self
            .http
            .post(report_url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("report request failed: {e}"))?;

        if !resp.status().is_success() {
            return Err(format!("usage API HTTP {}", resp.status()));
        }
        Ok(())
    }
}

// ── Test support ───────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod test_support {
    use crate::RandomSource;
    use std::collections::VecDeque;

    /// Deterministic random source fed from scripted sequences. Exhausted
    /// sequences fall back to 0 / 0.0.
    pub struct ScriptedRandom {
        indices: VecDeque<usize>,
        floats: VecDeque<f64>,
    }

    impl ScriptedRandom {
        pub fn new(indices: &[usize], floats: &[f64]) -> Self {
            Self {
                indices: indices.iter().copied().collect(),
                floats: floats.iter().copied().collect(),
            }
        }
    }

    impl RandomSource for ScriptedRandom {
        fn next_index(&mut self, bound: usize) -> usize {
            self.indices.pop_front().unwrap_or(0) % bound.max(1)
        }

        fn next_f64(&mut self) -> f64 {
            self.floats.pop_front().unwrap_or(0.0)
        }
    }

    #[test]
    fn scripted_random_wraps_indices() {
        let mut rng = ScriptedRandom::new(&[5], &[]);
        assert_eq!(rng.next_index(3), 2);
        assert_eq!(rng.next_index(3), 0);
    }
}
