//! Drive paced interactions against configured agent endpoints.
//!
//! Loads accounts, endpoints, and tuning constants from a TOML file and
//! processes each enabled account sequentially until its daily quota is
//! spent. Ctrl-C unwinds cleanly and prints final statistics.
//!
//! # Examples
//!
//! ```sh
//! # Run with the default config file
//! cadence
//!
//! # Explicit config path, one account only
//! cadence --config ops/cadence.toml --account 0xabc...
//!
//! # Validate the configuration and exit
//! cadence --config ops/cadence.toml --check
//! ```

use cadence_rs::ThreadRandom;
use cadence_rs::cancel::CancelToken;
use cadence_rs::config::AppConfig;
use cadence_rs::runner::Runner;
use cadence_rs::runner::events::{RunReport, RunnerEvent, RunnerEventHandler};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Drive paced interactions against configured agent endpoints.
#[derive(Parser)]
#[command(name = "cadence")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "cadence.toml")]
    config: PathBuf,

    /// Only run the account with this address
    #[arg(long)]
    account: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            process::exit(1);
        }
    };

    if let Some(address) = &cli.account {
        config.accounts.retain(|a| &a.address == address);
        if config.accounts.is_empty() {
            eprintln!("Error: no account {address} in {}", cli.config.display());
            process::exit(1);
        }
        if let Err(err) = config.validate() {
            eprintln!("Error: {err}");
            process::exit(1);
        }
    }

    if cli.check {
        println!(
            "Configuration OK: {} account(s), {} endpoint(s)",
            config.accounts.len(),
            config.endpoints.len()
        );
        return;
    }

    print_banner(&config);

    for account in config.enabled_accounts() {
        if !account.has_plausible_address() {
            eprintln!(
                "Warning: address {} does not look like an EVM address",
                account.address
            );
        }
    }

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\nInterrupt received, finishing up...");
                cancel.cancel();
            }
        });
    }

    let handler = ConsoleHandler;
    let mut rng = ThreadRandom;
    let report = Runner::new(&config, &handler, cancel, &mut rng)
        .run_all()
        .await;

    print_final_stats(&report);
}

fn print_banner(config: &AppConfig) {
    println!("┌──────────────────────────────────────────────┐");
    println!("│                   CADENCE                    │");
    println!("│        paced agent interaction client        │");
    println!("└──────────────────────────────────────────────┘");
    println!(
        "Current time (UTC): {}",
        Utc::now().format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "Accounts: {} enabled, endpoints: {}, daily cap: {}",
        config.enabled_accounts().count(),
        config.endpoints.len(),
        config.quota.daily_cap
    );
    println!();
}

fn print_final_stats(report: &RunReport) {
    println!("\n=== Final Statistics ===");
    for summary in &report.accounts {
        let minutes = summary.duration.as_secs() / 60;
        let seconds = summary.duration.as_secs() % 60;
        println!(
            "{}: {} interaction(s), {} failure(s), {} quota remaining, {minutes}m{seconds:02}s",
            summary.address, summary.interactions, summary.failures, summary.remaining_quota
        );
    }
    if report.accounts.is_empty() {
        println!("No accounts completed a run.");
    }
    if report.cancelled {
        println!("Run ended early by interrupt.");
    }
    println!("\nSession ended.");
}

/// Prints human-readable progress lines for each runner event.
struct ConsoleHandler;

impl RunnerEventHandler for ConsoleHandler {
    fn on_event(&self, event: &RunnerEvent<'_>) {
        match event {
            RunnerEvent::AccountStart { address, session } => {
                println!("\n{}", "=".repeat(50));
                println!("Account: {address}");
                println!(
                    "Session: {}...  Fingerprint: {}...",
                    session.short_id(),
                    session.short_fingerprint()
                );
            }
            RunnerEvent::InteractionStart { number, remaining } => {
                println!("\n{}", "-".repeat(50));
                println!("Interaction #{number} (remaining today: {remaining})");
            }
            RunnerEvent::QuestionSelected { endpoint, question } => {
                println!("Selected AI: {endpoint}");
                println!("Question: {question}\n");
            }
            RunnerEvent::Unit(text) => {
                println!("{text}");
            }
            RunnerEvent::QueryRetry {
                attempt,
                max_retries,
                delay,
            } => {
                println!(
                    "Transient failure; retrying in {:.1}s (attempt {attempt}/{max_retries})...",
                    delay.as_secs_f64()
                );
            }
            RunnerEvent::QueryFailed { error } => {
                println!("✗ Query failed: {error}");
            }
            RunnerEvent::ReportOutcome { delivered } => {
                if *delivered {
                    println!("✓ Interaction reported");
                } else {
                    println!("Report failed, but continuing anyway");
                }
            }
            RunnerEvent::InteractionComplete { used, cap } => {
                println!("Progress today: {used}/{cap}");
            }
            RunnerEvent::QuotaExhausted { wait } => {
                println!("\nDaily limit reached. Next reset in {wait}.");
            }
            RunnerEvent::SessionRotated { reason, session } => {
                println!("Session rotated ({reason}); new session {}...", session.short_id());
            }
            RunnerEvent::CooldownStart { delay } => {
                println!("Cooling down for {:.0}s...", delay.as_secs_f64());
            }
            RunnerEvent::PacingDelay { delay } => {
                println!("Next query in {:.1}s...", delay.as_secs_f64());
            }
            RunnerEvent::AccountFinished { summary } => {
                println!(
                    "\nAccount {} done: {} interaction(s), {} remaining in quota",
                    summary.address, summary.interactions, summary.remaining_quota
                );
            }
            RunnerEvent::Cancelled => {}
        }
    }
}
