use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::output::formatter;
use crate::signals;

use super::{certificates, dns, iam, network, storage, DiscoveryCtx, SectionReport};

type SectionFuture = Pin<Box<dyn Future<Output = Result<SectionReport>> + Send>>;

/// Completion record for one dispatched section job.
#[derive(Debug)]
pub struct JobOutcome {
    pub label: &'static str,
    pub exit_code: i32,
    pub message: String,
}

impl JobOutcome {
    fn from_result(label: &'static str, result: Result<SectionReport>) -> Self {
        match result {
            Ok(report) => Self {
                label,
                exit_code: report.exit_code(),
                message: report.message(),
            },
            Err(e) => Self {
                label,
                exit_code: 1,
                message: format!("{e:#}"),
            },
        }
    }
}

fn job(
    label: &'static str,
    future: impl Future<Output = Result<SectionReport>> + Send + 'static,
) -> (&'static str, SectionFuture) {
    (label, Box::pin(future))
}

/// Drive the full discovery walk. Phases run in order; sections inside a
/// phase run concurrently, each against its own CLI subprocess. A section
/// failure never aborts the run; the combined status is nonzero iff any
/// section reported a failure.
pub async fn run(ctx: &DiscoveryCtx) -> Result<i32> {
    ctx.store.init(
        ctx.cli.profile(),
        &ctx.tenancy_ocid,
        &ctx.ignored_namespaces,
    )?;
    tracing::info!(snapshot = %ctx.store.path().display(), "Snapshot initialised");

    let mut worst = 0;

    tracing::info!("Capturing tenancy metadata");
    let outcome = JobOutcome::from_result("tenancy", iam::capture_tenancy(ctx).await);
    worst = worst.max(report_outcomes(vec![outcome]));

    if !cancelled(&mut worst) {
        tracing::info!("Capturing IAM resources");
        let jobs = vec![
            job("tags", {
                let c = ctx.clone();
                async move { iam::capture_tag_namespaces(&c).await }
            }),
            job("policies", {
                let c = ctx.clone();
                async move { iam::capture_policies(&c).await }
            }),
            job("users", {
                let c = ctx.clone();
                async move { iam::capture_users_and_groups(&c).await }
            }),
            job("dynamic-groups", {
                let c = ctx.clone();
                async move { iam::capture_dynamic_groups(&c).await }
            }),
            job("identity-domains", {
                let c = ctx.clone();
                async move { iam::capture_identity_domains(&c).await }
            }),
            job("compartments", {
                let c = ctx.clone();
                async move { iam::capture_compartments(&c).await }
            }),
        ];
        worst = worst.max(report_outcomes(run_phase(jobs).await));
    }

    if !cancelled(&mut worst) {
        tracing::info!("Capturing network resources");
        let compartments = ctx.store.read_compartment_ids()?;
        let jobs = vec![
            job("vcns", {
                let c = ctx.clone();
                let ids = compartments.clone();
                async move { network::capture_vcns(&c, &ids).await }
            }),
            job("drgs", {
                let c = ctx.clone();
                let ids = compartments.clone();
                async move { network::capture_drgs(&c, &ids).await }
            }),
            job("nsgs", {
                let c = ctx.clone();
                let ids = compartments.clone();
                async move { network::capture_nsgs(&c, &ids).await }
            }),
            job("public-ips", {
                let c = ctx.clone();
                let ids = compartments.clone();
                async move { network::capture_public_ips(&c, &ids).await }
            }),
            job("load-balancers", {
                let c = ctx.clone();
                let ids = compartments.clone();
                async move { network::capture_load_balancers(&c, &ids).await }
            }),
        ];
        worst = worst.max(report_outcomes(run_phase(jobs).await));

        // Trailing sections run one at a time: each is a single walk and
        // the service rate limits bite hardest on these endpoints.
        if !cancelled(&mut worst) {
            tracing::info!("Capturing DNS zones");
            let outcome =
                JobOutcome::from_result("dns", dns::capture_zones(ctx, &compartments).await);
            worst = worst.max(report_outcomes(vec![outcome]));
        }
        if !cancelled(&mut worst) {
            tracing::info!("Capturing certificates");
            let outcome = JobOutcome::from_result(
                "certificates",
                certificates::capture_certificates(ctx, &compartments).await,
            );
            worst = worst.max(report_outcomes(vec![outcome]));
        }
        if !cancelled(&mut worst) {
            tracing::info!("Capturing object-storage buckets");
            let outcome = JobOutcome::from_result(
                "buckets",
                storage::capture_buckets(ctx, &compartments).await,
            );
            worst = worst.max(report_outcomes(vec![outcome]));
        }
    }

    Ok(worst)
}

/// Fan out one phase and fan completion records back in over one channel.
/// A job's failure does not cancel its siblings; arrival order is whatever
/// the tasks produce.
async fn run_phase(jobs: Vec<(&'static str, SectionFuture)>) -> Vec<JobOutcome> {
    let (tx, mut rx) = mpsc::channel(jobs.len().max(1));

    for (label, future) in jobs {
        let tx = tx.clone();
        tokio::spawn(async move {
            let outcome = JobOutcome::from_result(label, future.await);
            let _ = tx.send(outcome).await;
        });
    }
    drop(tx);

    let mut outcomes = Vec::new();
    while let Some(outcome) = rx.recv().await {
        outcomes.push(outcome);
    }
    outcomes
}

fn report_outcomes(outcomes: Vec<JobOutcome>) -> i32 {
    let mut worst = 0;
    for outcome in outcomes {
        formatter::print_section_line(outcome.label, outcome.exit_code, &outcome.message);
        worst = worst.max(outcome.exit_code);
    }
    worst
}

/// Cooperative cancellation: running sections finish, no new ones start.
fn cancelled(worst: &mut i32) -> bool {
    if signals::interrupted().is_some() {
        tracing::warn!("Discovery interrupted; skipping remaining sections");
        *worst = (*worst).max(1);
        return true;
    }
    false
}
