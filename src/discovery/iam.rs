use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::cli::query::{build_array_query, build_query};

use super::{child_list, write_fragment, DiscoveryCtx, SectionReport};

fn args_with(base: &[&str], query: Vec<String>) -> Vec<String> {
    let mut args: Vec<String> = base.iter().map(|s| s.to_string()).collect();
    args.extend(query);
    args
}

/// Capture tenancy metadata into `.iam.tenancy`.
///
/// The skeleton seeds `tenancy.id`, so a CLI failure here degrades to a
/// diagnostic rather than losing the OCID the rest of the walk pivots on.
pub async fn capture_tenancy(ctx: &DiscoveryCtx) -> Result<SectionReport> {
    let mut report = SectionReport::new();
    let args = args_with(
        &["iam", "tenancy", "get", "--tenancy-id", &ctx.tenancy_ocid],
        build_query(&["id", "name", "description", "home-region-key"]),
    );

    match ctx.cli.invoke(&args).await {
        Ok(value @ Value::Object(_)) => {
            write_fragment(ctx, ".iam.tenancy", value).await?;
        }
        Ok(other) => report.note(format!("unexpected tenancy payload: {other}")),
        Err(e) => report.note(format!("unable to fetch tenancy metadata: {e}")),
    }
    Ok(report)
}

/// Capture the full compartment tree in one call.
pub async fn capture_compartments(ctx: &DiscoveryCtx) -> Result<SectionReport> {
    let args = args_with(
        &[
            "iam",
            "compartment",
            "list",
            "--compartment-id",
            &ctx.tenancy_ocid,
            "--compartment-id-in-subtree",
            "true",
            "--access-level",
            "ANY",
        ],
        build_array_query(&[
            "id",
            "name",
            "description",
            "compartment-id",
            "lifecycle-state",
            "defined-tags",
            "freeform-tags",
        ]),
    );

    let value = ctx
        .cli
        .invoke(&args)
        .await
        .map_err(|e| anyhow!("unable to list compartments: {e}"))?;
    write_fragment(ctx, ".iam.compartments", value).await?;
    Ok(SectionReport::new())
}

/// Capture tag namespaces with nested tag definitions and applied defaults.
pub async fn capture_tag_namespaces(ctx: &DiscoveryCtx) -> Result<SectionReport> {
    let mut report = SectionReport::new();

    let ns_args = args_with(
        &[
            "iam",
            "tag-namespace",
            "list",
            "--compartment-id",
            &ctx.tenancy_ocid,
        ],
        build_array_query(&[
            "id",
            "name",
            "description",
            "is-retired",
            "defined-tags",
            "freeform-tags",
            "lifecycle-state",
        ]),
    );
    let namespaces = ctx
        .cli
        .invoke(&ns_args)
        .await
        .map_err(|e| anyhow!("unable to list tag namespaces: {e}"))?;
    let Value::Array(mut namespaces) = namespaces else {
        return Err(anyhow!("unexpected tag-namespace payload: {namespaces}"));
    };
    namespaces.retain(Value::is_object);

    // Defaults apply tenancy-wide; one list covers every namespace below.
    let default_args = args_with(
        &[
            "iam",
            "tag-default",
            "list",
            "--compartment-id",
            &ctx.tenancy_ocid,
        ],
        build_array_query(&[
            "id",
            "value",
            "is-required",
            "lifecycle-state",
            "locks",
            "tag-namespace-id",
            "tag-definition-id",
        ]),
    );
    let tag_defaults = match ctx.cli.invoke(&default_args).await {
        Ok(Value::Array(defaults)) => defaults,
        Ok(other) => {
            report.note(format!("unexpected tag-default payload: {other}"));
            vec![]
        }
        Err(e) => {
            report.note(format!("unable to list tag defaults: {e}"));
            vec![]
        }
    };

    for namespace in &mut namespaces {
        let ns_id = namespace["id"].as_str().unwrap_or_default().to_string();
        let ns_name = namespace["name"].as_str().unwrap_or_default().to_string();
        namespace["ignored"] = Value::Bool(ctx.ignored_namespaces.contains(&ns_name));

        let list_args = args_with(
            &["iam", "tag", "list", "--tag-namespace-id", &ns_id],
            build_array_query(&["name"]),
        );
        let tag_names = match ctx.cli.invoke(&list_args).await {
            Ok(Value::Array(items)) => items,
            Ok(other) => {
                report.note(format!(
                    "unable to list tag names for namespace {ns_name}: unexpected payload {other}"
                ));
                namespace["tag-definitions"] = Value::Array(vec![]);
                continue;
            }
            Err(e) => {
                report.note(format!(
                    "unable to list tag names for namespace {ns_name}: {e}"
                ));
                namespace["tag-definitions"] = Value::Array(vec![]);
                continue;
            }
        };

        let mut definitions = Vec::new();
        for tag in &tag_names {
            let Some(tag_name) = tag["name"].as_str() else {
                continue;
            };
            let get_args = args_with(
                &[
                    "iam",
                    "tag",
                    "get",
                    "--tag-namespace-id",
                    &ns_id,
                    "--tag-name",
                    tag_name,
                ],
                build_query(&[
                    "id",
                    "name",
                    "description",
                    "is-cost-tracking",
                    "is-retired",
                    "tags",
                    "lifecycle-state",
                    "validator",
                ]),
            );
            match ctx.cli.invoke(&get_args).await {
                Ok(mut definition) if definition.is_object() => {
                    let applied =
                        matching_default(&tag_defaults, &ns_id, definition["id"].as_str());
                    definition["tag-default"] = applied;
                    definitions.push(definition);
                }
                Ok(other) => {
                    report.note(format!(
                        "unable to fetch tag definition {ns_name}.{tag_name}: unexpected payload {other}"
                    ));
                }
                Err(e) => {
                    report.note(format!(
                        "unable to fetch tag definition {ns_name}.{tag_name}: {e}"
                    ));
                }
            }
        }
        namespace["tag-definitions"] = Value::Array(definitions);
    }

    write_fragment(ctx, ".iam.\"tag-namespaces\"", Value::Array(namespaces)).await?;
    Ok(report)
}

/// First tag-default bound to this (namespace, tag) pair, projected without
/// its matcher keys; `null` when none applies.
fn matching_default(defaults: &[Value], ns_id: &str, tag_id: Option<&str>) -> Value {
    let Some(tag_id) = tag_id else {
        return Value::Null;
    };
    for default in defaults {
        if default["tag-namespace-id"].as_str() == Some(ns_id)
            && default["tag-definition-id"].as_str() == Some(tag_id)
        {
            let mut projected = default.clone();
            if let Value::Object(map) = &mut projected {
                map.remove("tag-namespace-id");
                map.remove("tag-definition-id");
            }
            return projected;
        }
    }
    Value::Null
}

/// Capture policies attached to the tenancy root.
pub async fn capture_policies(ctx: &DiscoveryCtx) -> Result<SectionReport> {
    let args = args_with(
        &[
            "iam",
            "policy",
            "list",
            "--compartment-id",
            &ctx.tenancy_ocid,
        ],
        build_array_query(&["id", "name", "description", "statements", "lifecycle-state"]),
    );
    let value = ctx
        .cli
        .invoke(&args)
        .await
        .map_err(|e| anyhow!("unable to list policies: {e}"))?;
    write_fragment(ctx, ".iam.policies", value).await?;
    Ok(SectionReport::new())
}

/// Capture users (with group memberships and API keys) and groups.
pub async fn capture_users_and_groups(ctx: &DiscoveryCtx) -> Result<SectionReport> {
    let mut report = SectionReport::new();

    let user_args = args_with(
        &["iam", "user", "list", "--compartment-id", &ctx.tenancy_ocid],
        build_array_query(&[
            "id",
            "name",
            "description",
            "email",
            "is-mfa-activated",
            "lifecycle-state",
        ]),
    );
    let users = ctx
        .cli
        .invoke(&user_args)
        .await
        .map_err(|e| anyhow!("unable to list users: {e}"))?;
    let Value::Array(mut users) = users else {
        return Err(anyhow!("unexpected user payload: {users}"));
    };
    users.retain(Value::is_object);

    for user in &mut users {
        let user_id = user["id"].as_str().unwrap_or_default().to_string();
        let user_name = user["name"].as_str().unwrap_or_default().to_string();

        let membership_args = args_with(
            &[
                "iam",
                "user",
                "list-groups",
                "--user-id",
                &user_id,
                "--compartment-id",
                &ctx.tenancy_ocid,
            ],
            build_array_query(&["id", "name", "lifecycle-state"]),
        );
        user["group-memberships"] = child_list(
            &ctx.cli,
            &membership_args,
            "group memberships",
            &format!("user {user_name}"),
            &mut report,
        )
        .await;

        let key_args = args_with(
            &["iam", "user", "api-key", "list", "--user-id", &user_id],
            build_array_query(&["key-id", "fingerprint", "lifecycle-state"]),
        );
        user["api-keys"] = child_list(
            &ctx.cli,
            &key_args,
            "api keys",
            &format!("user {user_name}"),
            &mut report,
        )
        .await;
    }
    write_fragment(ctx, ".iam.users", Value::Array(users)).await?;

    let group_args = args_with(
        &["iam", "group", "list", "--compartment-id", &ctx.tenancy_ocid],
        build_array_query(&["id", "name", "description", "lifecycle-state"]),
    );
    match ctx.cli.invoke(&group_args).await {
        Ok(groups) => write_fragment(ctx, ".iam.groups", groups).await?,
        Err(e) => report.note(format!("unable to list groups: {e}")),
    }

    Ok(report)
}

/// Capture dynamic groups.
pub async fn capture_dynamic_groups(ctx: &DiscoveryCtx) -> Result<SectionReport> {
    let args = args_with(
        &[
            "iam",
            "dynamic-group",
            "list",
            "--compartment-id",
            &ctx.tenancy_ocid,
        ],
        build_array_query(&[
            "id",
            "name",
            "description",
            "matching-rule",
            "lifecycle-state",
        ]),
    );
    let value = ctx
        .cli
        .invoke(&args)
        .await
        .map_err(|e| anyhow!("unable to list dynamic groups: {e}"))?;
    write_fragment(ctx, ".iam.\"dynamic-groups\"", value).await?;
    Ok(SectionReport::new())
}

/// Capture identity domains.
pub async fn capture_identity_domains(ctx: &DiscoveryCtx) -> Result<SectionReport> {
    let args = args_with(
        &[
            "iam",
            "domain",
            "list",
            "--compartment-id",
            &ctx.tenancy_ocid,
        ],
        build_array_query(&[
            "id",
            "display-name",
            "description",
            "url",
            "home-region",
            "lifecycle-state",
        ]),
    );
    let value = ctx
        .cli
        .invoke(&args)
        .await
        .map_err(|e| anyhow!("unable to list identity domains: {e}"))?;
    write_fragment(ctx, ".iam.\"identity-domains\"", value).await?;
    Ok(SectionReport::new())
}
