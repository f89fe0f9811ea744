use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::cli::query::{build_array_query, build_query};

use super::{child_list, list_per_compartment, write_fragment, DiscoveryCtx, SectionReport};

/// Capture object-storage buckets with lifecycle and replication policies.
pub async fn capture_buckets(ctx: &DiscoveryCtx, compartments: &[String]) -> Result<SectionReport> {
    let mut report = SectionReport::new();

    // Every bucket call needs the tenancy's object-storage namespace.
    let ns_args: Vec<String> = ["os", "ns", "get"]
        .iter()
        .map(|s| s.to_string())
        .chain(build_query(&[]))
        .collect();
    let namespace = ctx
        .cli
        .invoke(&ns_args)
        .await
        .map_err(|e| anyhow!("unable to fetch object-storage namespace: {e}"))?;
    let Some(namespace) = namespace.as_str().map(str::to_string) else {
        return Err(anyhow!(
            "unexpected object-storage namespace payload: {namespace}"
        ));
    };

    let mut buckets = list_per_compartment(
        &ctx.cli,
        compartments,
        &["os", "bucket", "list", "--namespace-name", &namespace],
        &["name", "namespace", "compartment-id", "time-created", "etag"],
        "buckets",
        &mut report,
    )
    .await;
    buckets.retain(Value::is_object);

    for bucket in &mut buckets {
        let name = bucket["name"].as_str().unwrap_or_default().to_string();

        bucket["lifecycle-policy"] =
            fetch_lifecycle_policy(ctx, &namespace, &name, &mut report).await;

        let replication_args: Vec<String> = [
            "os",
            "replication",
            "list",
            "--namespace-name",
            &namespace,
            "--bucket-name",
            &name,
        ]
        .iter()
        .map(|s| s.to_string())
        .chain(build_array_query(&["id", "name", "destination-bucket-name", "status"]))
        .collect();
        bucket["replication-policies"] = child_list(
            &ctx.cli,
            &replication_args,
            "replication policies",
            &format!("bucket {name}"),
            &mut report,
        )
        .await;
    }

    write_fragment(ctx, ".storage.buckets", Value::Array(buckets)).await?;
    Ok(report)
}

/// A bucket without a lifecycle policy is the common case; the CLI reports
/// it as a 404, which maps to a clean `null` rather than a diagnostic.
async fn fetch_lifecycle_policy(
    ctx: &DiscoveryCtx,
    namespace: &str,
    bucket: &str,
    report: &mut SectionReport,
) -> Value {
    let args: Vec<String> = [
        "os",
        "object-lifecycle-policy",
        "get",
        "--namespace-name",
        namespace,
        "--bucket-name",
        bucket,
    ]
    .iter()
    .map(|s| s.to_string())
    .chain(build_query(&[]))
    .collect();

    match ctx.cli.invoke(&args).await {
        Ok(policy @ Value::Object(_)) => policy,
        Ok(_) => Value::Null,
        Err(e) if e.status == 404 => Value::Null,
        Err(e) => {
            report.note(format!(
                "unable to fetch lifecycle policy for bucket {bucket}: {e}"
            ));
            Value::Null
        }
    }
}
