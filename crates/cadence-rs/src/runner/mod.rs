//! The interaction orchestrator: a sequential per-account loop.
//!
//! Each account's run is a small state machine — IDLE → RUNNING →
//! (WAITING_QUOTA | WAITING_COOLDOWN) → RUNNING → … → STOPPED — driven by
//! one cooperative task. Every cycle checks the quota, selects an endpoint
//! and question, paces itself like a human, streams the query through the
//! retry policy, reports the exchange, and updates quota bookkeeping.
//! Cancellation is observed at every suspension point.
//!
//! Accounts are processed strictly sequentially; nothing is shared between
//! them beyond the immutable configuration.

pub mod events;
pub mod pacing;
pub mod selection;

use crate::api::retry::{RetryConfig, retry_api_call};
use crate::cancel::CancelToken;
use crate::config::{Account, AppConfig, Endpoint, ExhaustionPolicy};
use crate::identity::{RotationReason, Session};
use crate::quota::{QuotaState, format_wait};
use crate::runner::events::{AccountSummary, RunReport, RunnerEvent, RunnerEventHandler};
use crate::runner::selection::QuestionPool;
use crate::snapshot::{QuotaSnapshot, SnapshotFile};
use crate::{AgentClient, REPORT_PATH, RandomSource, ReportRequest};
use chrono::Utc;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Drives the interaction loop for every enabled account in turn.
///
/// Borrows the configuration, event handler, and random source; owns nothing
/// but the per-run quota and session state it creates along the way.
pub struct Runner<'a> {
    config: &'a AppConfig,
    retry: RetryConfig,
    handler: &'a dyn RunnerEventHandler,
    cancel: CancelToken,
    rng: &'a mut dyn RandomSource,
}

impl<'a> Runner<'a> {
    pub fn new(
        config: &'a AppConfig,
        handler: &'a dyn RunnerEventHandler,
        cancel: CancelToken,
        rng: &'a mut dyn RandomSource,
    ) -> Self {
        Self {
            retry: config.retry.to_policy(),
            config,
            handler,
            cancel,
            rng,
        }
    }

    /// Process every enabled account sequentially, with a randomized gap
    /// between accounts. Returns the aggregate report.
    pub async fn run_all(&mut self) -> RunReport {
        let config = self.config;
        let mut report = RunReport::default();
        let accounts: Vec<&Account> = config.enabled_accounts().collect();

        for (i, account) in accounts.iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            match self.run_account(account).await {
                Ok(summary) => report.accounts.push(summary),
                Err(err) => {
                    warn!("Account {} aborted: {err}", account.address);
                }
            }

            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            if i + 1 < accounts.len() {
                let gap = config.pacing.account_gap(&mut *self.rng);
                self.handler.on_event(&RunnerEvent::PacingDelay { delay: gap });
                if !self.cancel.sleep(gap).await {
                    report.cancelled = true;
                    break;
                }
            }
        }

        report
    }

    /// Run one account until its quota is exhausted (under the `stop`
    /// policy), indefinitely (under `sleep-until-reset`), or cancellation.
    async fn run_account(&mut self, account: &Account) -> Result<AccountSummary, String> {
        let config = self.config;
        let handler = self.handler;
        let started = Instant::now();
        let now = Utc::now();

        let mut quota = self.restore_quota(account, now);
        let mut pools: HashMap<String, QuestionPool> = config
            .endpoints
            .iter()
            .map(|e| (e.url.clone(), QuestionPool::new(&e.questions)))
            .collect();

        let mut client = AgentClient::new(
            Session::generate(&account.address, now),
            account,
            &config.timeouts,
        )?;
        handler.on_event(&RunnerEvent::AccountStart {
            address: &account.address,
            session: client.session(),
        });

        let mut interactions = 0u32;
        let mut failures = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                handler.on_event(&RunnerEvent::Cancelled);
                break;
            }

            let now = Utc::now();
            if quota.refresh(now) {
                for pool in pools.values_mut() {
                    pool.reset();
                }
            }

            if quota.is_exhausted() {
                let wait = format_wait(quota.wait_until_reset(now));
                handler.on_event(&RunnerEvent::QuotaExhausted { wait: &wait });
                match config.quota.on_exhausted {
                    ExhaustionPolicy::Stop => break,
                    ExhaustionPolicy::SleepUntilReset => {
                        let until = quota
                            .wait_until_reset(now)
                            .to_std()
                            .unwrap_or_default()
                            + Duration::from_secs(config.quota.reset_buffer_secs);
                        if !self.cancel.sleep(until).await {
                            handler.on_event(&RunnerEvent::Cancelled);
                            break;
                        }
                        continue;
                    }
                }
            }

            // Scheduled rotation (age or clock boundary).
            if let Some(reason) =
                config
                    .rotation
                    .should_rotate(client.session(), now, quota.consecutive_failures())
            {
                client = self.fresh_client(account, reason)?;
            }

            let Some(endpoint) = selection::pick_endpoint(&config.endpoints, &mut *self.rng)
            else {
                return Err("no endpoints configured".to_string());
            };
            let question = match pools.get_mut(&endpoint.url) {
                Some(pool) => match pool.next(&mut *self.rng) {
                    Some(q) => q.to_string(),
                    None => {
                        return Err(format!("endpoint {} has an empty question pool", endpoint.name));
                    }
                },
                None => return Err(format!("no question pool for endpoint {}", endpoint.name)),
            };

            handler.on_event(&RunnerEvent::InteractionStart {
                number: quota.interactions_used() + 1,
                remaining: quota.remaining(),
            });
            handler.on_event(&RunnerEvent::QuestionSelected {
                endpoint: &endpoint.name,
                question: &question,
            });

            // Thinking + typing simulation before the request goes out.
            let warmup = config.pacing.thinking_delay(&mut *self.rng)
                + config.pacing.typing_delay(&question, &mut *self.rng);
            if !self.cancel.sleep(warmup).await {
                handler.on_event(&RunnerEvent::Cancelled);
                break;
            }

            let retry = &self.retry;
            let result = retry_api_call(
                retry,
                &self.cancel,
                || {
                    client.query(endpoint, &question, &config.identity, |unit| {
                        handler.on_event(&RunnerEvent::Unit(unit));
                    })
                },
                |attempt, delay| {
                    handler.on_event(&RunnerEvent::QueryRetry {
                        attempt,
                        max_retries: retry.max_retries,
                        delay,
                    });
                },
            )
            .await;

            match result {
                Ok(response) => {
                    let delivered = self
                        .deliver_report(&client, account, endpoint, &question, &response)
                        .await;
                    handler.on_event(&RunnerEvent::ReportOutcome { delivered });

                    quota.record_success();
                    interactions += 1;
                    handler.on_event(&RunnerEvent::InteractionComplete {
                        used: quota.interactions_used(),
                        cap: quota.cap(),
                    });
                    self.save_snapshot(account, &quota);

                    if !quota.is_exhausted() {
                        let delay = config.pacing.inter_query_delay(Utc::now(), &mut *self.rng);
                        handler.on_event(&RunnerEvent::PacingDelay { delay });
                        if !self.cancel.sleep(delay).await {
                            handler.on_event(&RunnerEvent::Cancelled);
                            break;
                        }
                    }
                }
                Err(error) => {
                    handler.on_event(&RunnerEvent::QueryFailed { error: &error });
                    failures += 1;
                    let streak = quota.record_failure();

                    if streak >= config.rotation.failure_threshold {
                        client = self.fresh_client(account, RotationReason::FailureThreshold)?;
                        quota.reset_failures();
                        let cooldown = Duration::from_secs(config.rotation.cooldown_secs);
                        handler.on_event(&RunnerEvent::CooldownStart { delay: cooldown });
                        if !self.cancel.sleep(cooldown).await {
                            handler.on_event(&RunnerEvent::Cancelled);
                            break;
                        }
                    }
                }
            }
        }

        let summary = AccountSummary {
            address: account.address.clone(),
            interactions,
            failures,
            duration: started.elapsed(),
            remaining_quota: quota.remaining(),
            exhausted: quota.is_exhausted(),
        };
        handler.on_event(&RunnerEvent::AccountFinished { summary: &summary });
        Ok(summary)
    }

    /// Send the usage report through the retry policy, absorbing failure.
    ///
    /// Reporting failure never blocks progression — after exhausting
    /// retries the interaction still counts. This is deliberate policy, not
    /// an oversight.
    async fn deliver_report(
        &self,
        client: &AgentClient,
        account: &Account,
        endpoint: &Endpoint,
        question: &str,
        response: &str,
    ) -> bool {
        let handler = self.handler;
        let retry = &self.retry;
        let url = format!(
            "{}{}",
            self.config.report.usage_api.trim_end_matches('/'),
            REPORT_PATH
        );
        let body = ReportRequest {
            wallet_address: account.address.clone(),
            agent_id: endpoint.agent_id.clone(),
            request_text: question.to_string(),
            response_text: response.to_string(),
            request_metadata: serde_json::json!({}),
        };

        let outcome = retry_api_call(
            retry,
            &self.cancel,
            || client.report_usage(&url, &body, &self.config.identity),
            |attempt, delay| {
                handler.on_event(&RunnerEvent::QueryRetry {
                    attempt,
                    max_retries: retry.max_retries,
                    delay,
                });
            },
        )
        .await;

        match outcome {
            Ok(()) => true,
            Err(err) => {
                warn!("Usage report absorbed after retries: {err}");
                false
            }
        }
    }

    /// Replace the session and its connection wholesale.
    fn fresh_client(
        &self,
        account: &Account,
        reason: RotationReason,
    ) -> Result<AgentClient, String> {
        let client = AgentClient::new(
            Session::generate(&account.address, Utc::now()),
            account,
            &self.config.timeouts,
        )?;
        info!("Rotated session for {} ({reason})", account.address);
        self.handler.on_event(&RunnerEvent::SessionRotated {
            reason,
            session: client.session(),
        });
        Ok(client)
    }

    /// Restore quota from the snapshot file when its period is still
    /// current; otherwise start fresh.
    fn restore_quota(&self, account: &Account, now: chrono::DateTime<Utc>) -> QuotaState {
        let cap = self.config.quota.daily_cap;
        if let Some(path) = &self.config.snapshot_path {
            match SnapshotFile::load(path) {
                Ok(file) => {
                    if let Some(saved) = file.find(&account.address)
                        && saved.period_end > now
                    {
                        info!(
                            "Restored quota for {}: {}/{cap} used",
                            account.address, saved.interactions_used
                        );
                        return QuotaState::resume(
                            cap,
                            saved.interactions_used,
                            saved.period_end,
                            now,
                        );
                    }
                }
                Err(err) => warn!("Ignoring unreadable snapshot: {err}"),
            }
        }
        QuotaState::new(cap, now)
    }

    /// Persist the account's quota position. Best-effort.
    fn save_snapshot(&self, account: &Account, quota: &QuotaState) {
        let Some(path) = &self.config.snapshot_path else {
            return;
        };
        let mut file = match SnapshotFile::load(path) {
            Ok(file) => file,
            Err(err) => {
                warn!("Starting a fresh snapshot file: {err}");
                SnapshotFile::default()
            }
        };
        file.upsert(QuotaSnapshot {
            address: account.address.clone(),
            interactions_used: quota.interactions_used(),
            period_end: quota.period_end(),
            updated_at: Utc::now(),
        });
        if let Err(err) = file.save(path) {
            warn!("Failed to write snapshot: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuotaConfig;

    #[test]
    fn exhaustion_policy_default_returns_control() {
        // The documented default: quota exhaustion hands control back to the
        // sequential multi-account loop instead of blocking inline.
        assert_eq!(QuotaConfig::default().on_exhausted, ExhaustionPolicy::Stop);
    }

    #[test]
    fn report_url_appends_path_once() {
        for base in [
            "https://usage.example.net/api",
            "https://usage.example.net/api/",
        ] {
            let url = format!("{}{}", base.trim_end_matches('/'), REPORT_PATH);
            assert_eq!(url, "https://usage.example.net/api/report_usage");
        }
    }
}
