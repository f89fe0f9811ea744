use anyhow::Result;
use serde_json::Value;

use crate::cli::query::build_query;

use super::{list_per_compartment, write_fragment, DiscoveryCtx, SectionReport};

/// Capture DNS zones with their record sets.
pub async fn capture_zones(ctx: &DiscoveryCtx, compartments: &[String]) -> Result<SectionReport> {
    let mut report = SectionReport::new();
    let mut zones = list_per_compartment(
        &ctx.cli,
        compartments,
        &["dns", "zone", "list"],
        &["id", "name", "zone-type", "lifecycle-state"],
        "dns zones",
        &mut report,
    )
    .await;
    zones.retain(Value::is_object);

    for zone in &mut zones {
        let zone_name = zone["name"].as_str().unwrap_or_default().to_string();
        let record_args: Vec<String> = [
            "dns",
            "record",
            "zone",
            "get",
            "--zone-name-or-id",
            &zone_name,
        ]
        .iter()
        .map(|s| s.to_string())
        .chain(build_query(&[]))
        .collect();

        zone["records"] = match ctx.cli.invoke(&record_args).await {
            Ok(value) => flatten_items(value),
            Err(e) => {
                report.note(format!("unable to fetch records for zone {zone_name}: {e}"));
                Value::Array(vec![])
            }
        };
    }

    write_fragment(ctx, ".dns.zones", Value::Array(zones)).await?;
    Ok(report)
}

/// Record payloads arrive nested under an `items` key; flatten to the bare
/// record array.
fn flatten_items(value: Value) -> Value {
    match value {
        Value::Object(mut map) => match map.remove("items") {
            Some(items @ Value::Array(_)) => items,
            _ => Value::Array(vec![]),
        },
        items @ Value::Array(_) => items,
        _ => Value::Array(vec![]),
    }
}

#[cfg(test)]
mod tests {
    use super::flatten_items;
    use serde_json::json;

    #[test]
    fn flattens_nested_items() {
        let nested = json!({"items": [{"domain": "a.example.", "rtype": "A"}]});
        assert_eq!(
            flatten_items(nested),
            json!([{"domain": "a.example.", "rtype": "A"}])
        );
    }

    #[test]
    fn passes_bare_arrays_through() {
        let bare = json!([{"domain": "b.example."}]);
        assert_eq!(flatten_items(bare.clone()), bare);
    }

    #[test]
    fn anything_else_becomes_empty() {
        assert_eq!(flatten_items(json!({"no-items": true})), json!([]));
        assert_eq!(flatten_items(json!("scalar")), json!([]));
    }
}
