use anyhow::Result;
use serde_json::Value;

use super::{list_per_compartment, write_fragment, DiscoveryCtx, SectionReport};

/// Capture managed SSL certificates.
pub async fn capture_certificates(
    ctx: &DiscoveryCtx,
    compartments: &[String],
) -> Result<SectionReport> {
    let mut report = SectionReport::new();
    let certificates = list_per_compartment(
        &ctx.cli,
        compartments,
        &["certs-mgmt", "certificate", "list"],
        &[
            "id",
            "name",
            "description",
            "config-type",
            "lifecycle-state",
        ],
        "certificates",
        &mut report,
    )
    .await;
    write_fragment(
        ctx,
        ".certificates.\"ssl-certificates\"",
        Value::Array(certificates),
    )
    .await?;
    Ok(report)
}
