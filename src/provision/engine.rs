use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use serde_json::Value;

use crate::cli::invoke::OciCli;
use crate::signals;

use super::backoff::{backoff_delay, draw_inter_ad_pause, draw_jitter};
use super::classify::{classify, Outcome};

/// Tunables for the retry loop. Production values are the defaults; tests
/// shrink the durations to keep the loop fast.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_cycles: u32,
    /// Error budget factor: the run aborts once
    /// `total_errors >= ads × max_error_cycles`.
    pub max_error_cycles: u32,
    pub max_backoff_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// One jitter unit; the drawn jitter is a whole multiple of this.
    pub jitter_step: Duration,
    pub jitter_units: u32,
    pub inter_ad_min: Duration,
    pub inter_ad_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_cycles: 5000,
            max_error_cycles: 10,
            max_backoff_attempts: 9,
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(600),
            jitter_step: Duration::from_secs(1),
            jitter_units: 1,
            inter_ad_min: Duration::from_secs(2),
            inter_ad_max: Duration::from_secs(10),
        }
    }
}

/// How a provisioning run ended short of a fatal error.
#[derive(Debug)]
pub enum ProvisionEnd {
    /// The instance launched; the payload is the CLI's instance JSON.
    Launched(Value),
    /// A signal arrived; the exit code to terminate with.
    Interrupted(i32),
}

/// The retry loop around `compute instance launch`.
///
/// Each cycle walks the availability domains in order; outcomes either end
/// the run (success, fatal, budget exhausted) or steer the next cycle
/// (throttle raises the backoff, a clean cycle lowers it).
pub struct Provisioner {
    cli: OciCli,
    ads: Vec<u32>,
    policy: RetryPolicy,
}

impl Provisioner {
    pub fn new(cli: OciCli, ads: Vec<u32>, policy: RetryPolicy) -> Self {
        Self { cli, ads, policy }
    }

    /// The argv for one AD attempt, also shown verbatim by `--dry-run`.
    pub fn launch_args(spec_path: &std::path::Path) -> Vec<String> {
        vec![
            "compute".to_string(),
            "instance".to_string(),
            "launch".to_string(),
            "--from-json".to_string(),
            format!("file://{}", spec_path.display()),
        ]
    }

    pub async fn run(&self, specs: &BTreeMap<u32, PathBuf>) -> Result<ProvisionEnd> {
        let error_budget = self.ads.len() as u32 * self.policy.max_error_cycles;
        let mut cycle: u32 = 0;
        let mut total_errors: u32 = 0;
        let mut backoff_attempts: u32 = 0;

        while cycle < self.policy.max_cycles {
            cycle += 1;
            let mut throttled = false;
            let mut cycle_errors: u32 = 0;
            tracing::debug!(cycle, total_errors, backoff_attempts, "Starting cycle");

            for (index, &ad) in self.ads.iter().enumerate() {
                if let Some(code) = signals::interrupted() {
                    return Ok(ProvisionEnd::Interrupted(code));
                }

                let Some(spec_path) = specs.get(&ad) else {
                    bail!("no rendered spec for AD-{ad}");
                };
                let args = Self::launch_args(spec_path);
                tracing::info!(cycle, ad, "Attempting launch");

                match self.cli.invoke(&args).await {
                    Ok(instance) => {
                        tracing::info!(cycle, ad, "Instance launched");
                        return Ok(ProvisionEnd::Launched(instance));
                    }
                    Err(failure) => {
                        let outcome = classify(&failure);
                        if outcome.is_fatal() {
                            bail!("AD-{ad}: {} — {failure}", outcome.describe());
                        }
                        tracing::warn!(
                            cycle,
                            ad,
                            outcome = outcome.describe(),
                            "AD-{ad}: {} — {failure}",
                            outcome.describe()
                        );
                        if outcome == Outcome::Throttle {
                            throttled = true;
                        }
                        if outcome.counts_total() {
                            total_errors += 1;
                        }
                        if outcome.counts_cycle() {
                            cycle_errors += 1;
                        }
                        if total_errors >= error_budget {
                            bail!("too many transient errors ({total_errors}), giving up");
                        }
                    }
                }

                if index + 1 < self.ads.len() {
                    if let Some(code) = self.pause(draw_inter_ad_pause(&self.policy)).await {
                        return Ok(ProvisionEnd::Interrupted(code));
                    }
                }
            }

            backoff_attempts = if throttled {
                (backoff_attempts + 1).min(self.policy.max_backoff_attempts)
            } else {
                backoff_attempts.saturating_sub(1)
            };
            if cycle_errors == 0 {
                total_errors = 0;
            }

            let delay = backoff_delay(&self.policy, backoff_attempts, draw_jitter(&self.policy));
            tracing::debug!(
                cycle,
                backoff_attempts,
                delay_ms = delay.as_millis() as u64,
                "Sleeping before next cycle"
            );
            if let Some(code) = self.pause(delay).await {
                return Ok(ProvisionEnd::Interrupted(code));
            }
        }

        bail!(
            "max cycles ({}) reached without a successful launch",
            self.policy.max_cycles
        )
    }

    /// Sleep that wakes early when a signal arrives.
    async fn pause(&self, delay: Duration) -> Option<i32> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => signals::interrupted(),
            code = signals::wait() => Some(code),
        }
    }
}
