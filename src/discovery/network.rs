use anyhow::Result;
use serde_json::Value;

use crate::cli::query::build_array_query;

use super::{child_list, list_per_compartment, write_fragment, DiscoveryCtx, SectionReport};

/// Child resource kinds nested under each VCN: snapshot key, CLI noun, and
/// the projected fields.
const VCN_CHILDREN: &[(&str, &str, &[&str])] = &[
    (
        "subnets",
        "subnet",
        &[
            "id",
            "display-name",
            "cidr-block",
            "availability-domain",
            "route-table-id",
            "lifecycle-state",
        ],
    ),
    (
        "route-tables",
        "route-table",
        &["id", "display-name", "route-rules", "lifecycle-state"],
    ),
    (
        "security-lists",
        "security-list",
        &[
            "id",
            "display-name",
            "ingress-security-rules",
            "egress-security-rules",
            "lifecycle-state",
        ],
    ),
    (
        "internet-gateways",
        "internet-gateway",
        &["id", "display-name", "is-enabled", "lifecycle-state"],
    ),
    (
        "nat-gateways",
        "nat-gateway",
        &[
            "id",
            "display-name",
            "nat-ip",
            "block-traffic",
            "lifecycle-state",
        ],
    ),
    (
        "service-gateways",
        "service-gateway",
        &["id", "display-name", "services", "lifecycle-state"],
    ),
    (
        "drg-attachments",
        "drg-attachment",
        &["id", "display-name", "drg-id", "lifecycle-state"],
    ),
];

/// Capture VCNs with their nested routing and gateway resources.
pub async fn capture_vcns(ctx: &DiscoveryCtx, compartments: &[String]) -> Result<SectionReport> {
    let mut report = SectionReport::new();
    let mut vcns = Vec::new();

    for compartment in compartments {
        let list_args: Vec<String> = ["network", "vcn", "list", "--compartment-id", compartment]
            .iter()
            .map(|s| s.to_string())
            .chain(build_array_query(&[
                "id",
                "display-name",
                "compartment-id",
                "cidr-blocks",
                "dns-label",
                "lifecycle-state",
            ]))
            .collect();

        let found = match ctx.cli.invoke(&list_args).await {
            Ok(Value::Array(items)) => items,
            Ok(other) => {
                report.note(format!(
                    "unexpected payload listing vcns in compartment {compartment}: {other}"
                ));
                continue;
            }
            Err(e) => {
                report.note(format!(
                    "unable to list vcns in compartment {compartment}: {e}"
                ));
                continue;
            }
        };

        for mut vcn in found {
            if !vcn.is_object() {
                continue;
            }
            let vcn_id = vcn["id"].as_str().unwrap_or_default().to_string();
            for (key, noun, fields) in VCN_CHILDREN {
                let child_args: Vec<String> = [
                    "network",
                    noun,
                    "list",
                    "--compartment-id",
                    compartment,
                    "--vcn-id",
                    &vcn_id,
                ]
                .iter()
                .map(|s| s.to_string())
                .chain(build_array_query(fields))
                .collect();

                vcn[*key] = child_list(
                    &ctx.cli,
                    &child_args,
                    key,
                    &format!("vcn {vcn_id}"),
                    &mut report,
                )
                .await;
            }
            vcns.push(vcn);
        }
    }

    write_fragment(ctx, ".network.vcns", Value::Array(vcns)).await?;
    Ok(report)
}

/// Capture dynamic routing gateways.
pub async fn capture_drgs(ctx: &DiscoveryCtx, compartments: &[String]) -> Result<SectionReport> {
    let mut report = SectionReport::new();
    let drgs = list_per_compartment(
        &ctx.cli,
        compartments,
        &["network", "drg", "list"],
        &["id", "display-name", "compartment-id", "lifecycle-state"],
        "drgs",
        &mut report,
    )
    .await;
    write_fragment(ctx, ".network.drgs", Value::Array(drgs)).await?;
    Ok(report)
}

/// Capture network security groups with their rules.
pub async fn capture_nsgs(ctx: &DiscoveryCtx, compartments: &[String]) -> Result<SectionReport> {
    let mut report = SectionReport::new();
    let mut nsgs = list_per_compartment(
        &ctx.cli,
        compartments,
        &["network", "nsg", "list"],
        &["id", "display-name", "vcn-id", "lifecycle-state"],
        "nsgs",
        &mut report,
    )
    .await;
    nsgs.retain(Value::is_object);

    for nsg in &mut nsgs {
        let nsg_id = nsg["id"].as_str().unwrap_or_default().to_string();
        let rule_args: Vec<String> = ["network", "nsg", "rules", "list", "--nsg-id", &nsg_id]
            .iter()
            .map(|s| s.to_string())
            .chain(build_array_query(&[
                "id",
                "direction",
                "protocol",
                "source",
                "destination",
                "is-stateless",
            ]))
            .collect();
        nsg["rules"] = child_list(
            &ctx.cli,
            &rule_args,
            "rules",
            &format!("nsg {nsg_id}"),
            &mut report,
        )
        .await;
    }

    write_fragment(ctx, ".network.nsgs", Value::Array(nsgs)).await?;
    Ok(report)
}

/// Capture region-scoped public IPs.
pub async fn capture_public_ips(
    ctx: &DiscoveryCtx,
    compartments: &[String],
) -> Result<SectionReport> {
    let mut report = SectionReport::new();
    let ips = list_per_compartment(
        &ctx.cli,
        compartments,
        &["network", "public-ip", "list", "--scope", "REGION"],
        &[
            "id",
            "display-name",
            "ip-address",
            "lifetime",
            "assigned-entity-id",
            "lifecycle-state",
        ],
        "public ips",
        &mut report,
    )
    .await;
    write_fragment(ctx, ".network.\"public-ips\"", Value::Array(ips)).await?;
    Ok(report)
}

/// Child resource kinds nested under each load balancer.
const LB_CHILDREN: &[(&str, &str, &[&str])] = &[
    (
        "backend-sets",
        "backend-set",
        &["name", "policy", "backends", "health-checker"],
    ),
    (
        "listeners",
        "listener",
        &["name", "port", "protocol", "default-backend-set-name"],
    ),
    ("certificates", "certificate", &["certificate-name"]),
    ("hostnames", "hostname", &["name", "hostname"]),
    ("path-route-sets", "path-route-set", &["name", "path-routes"]),
    ("rule-sets", "rule-set", &["name", "items"]),
];

/// Capture load balancers with their nested routing configuration.
pub async fn capture_load_balancers(
    ctx: &DiscoveryCtx,
    compartments: &[String],
) -> Result<SectionReport> {
    let mut report = SectionReport::new();
    let mut balancers = list_per_compartment(
        &ctx.cli,
        compartments,
        &["lb", "load-balancer", "list"],
        &[
            "id",
            "display-name",
            "shape-name",
            "is-private",
            "ip-addresses",
            "lifecycle-state",
        ],
        "load balancers",
        &mut report,
    )
    .await;
    balancers.retain(Value::is_object);

    for balancer in &mut balancers {
        let lb_id = balancer["id"].as_str().unwrap_or_default().to_string();
        for (key, noun, fields) in LB_CHILDREN {
            let child_args: Vec<String> = ["lb", noun, "list", "--load-balancer-id", &lb_id]
                .iter()
                .map(|s| s.to_string())
                .chain(build_array_query(fields))
                .collect();
            balancer[*key] = child_list(
                &ctx.cli,
                &child_args,
                key,
                &format!("load balancer {lb_id}"),
                &mut report,
            )
            .await;
        }
    }

    write_fragment(ctx, ".network.\"load-balancers\"", Value::Array(balancers)).await?;
    Ok(report)
}
