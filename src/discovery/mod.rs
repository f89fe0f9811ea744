pub mod certificates;
pub mod dns;
pub mod iam;
pub mod network;
pub mod orchestrator;
pub mod storage;

use serde_json::Value;

use crate::cli::invoke::OciCli;
use crate::cli::query::build_array_query;
use crate::snapshot::pointer::SectionPointer;
use crate::snapshot::store::SnapshotStore;

/// Shared context handed to every section extractor.
#[derive(Debug, Clone)]
pub struct DiscoveryCtx {
    pub cli: OciCli,
    pub store: SnapshotStore,
    pub tenancy_ocid: String,
    pub ignored_namespaces: Vec<String>,
}

/// Per-section error aggregation.
///
/// Failures inside a loop over parents are appended here and the loop goes
/// on; the produced fragment always reflects what was captured. The section
/// reports exit 1 if anything was missed, exit 0 otherwise.
#[derive(Debug, Default)]
pub struct SectionReport {
    diagnostics: Vec<String>,
}

impl SectionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note(&mut self, diagnostic: impl Into<String>) {
        let diagnostic = diagnostic.into();
        tracing::warn!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    pub fn exit_code(&self) -> i32 {
        i32::from(!self.diagnostics.is_empty())
    }

    pub fn message(&self) -> String {
        self.diagnostics.join("\n")
    }
}

/// List one resource kind across the compartment set, concatenating results
/// in compartment order. A failing compartment contributes nothing but a
/// diagnostic; the walk continues.
pub(crate) async fn list_per_compartment(
    cli: &OciCli,
    compartments: &[String],
    base_args: &[&str],
    fields: &[&str],
    what: &str,
    report: &mut SectionReport,
) -> Vec<Value> {
    let mut collected = Vec::new();
    for compartment in compartments {
        let mut args: Vec<String> = base_args.iter().map(|s| s.to_string()).collect();
        args.push("--compartment-id".to_string());
        args.push(compartment.clone());
        args.extend(build_array_query(fields));

        match cli.invoke(&args).await {
            Ok(Value::Array(items)) => collected.extend(items),
            Ok(other) => {
                report.note(format!(
                    "unexpected payload listing {what} in compartment {compartment}: {other}"
                ));
            }
            Err(e) => {
                report.note(format!(
                    "unable to list {what} in compartment {compartment}: {e}"
                ));
            }
        }
    }
    collected
}

/// Fetch a child list for a parent resource; a failure yields `[]` plus a
/// diagnostic, never an absent key.
pub(crate) async fn child_list(
    cli: &OciCli,
    args: &[String],
    what: &str,
    parent: &str,
    report: &mut SectionReport,
) -> Value {
    match cli.invoke(args).await {
        Ok(value @ Value::Array(_)) => value,
        Ok(other) => {
            report.note(format!(
                "unexpected payload listing {what} for {parent}: {other}"
            ));
            Value::Array(vec![])
        }
        Err(e) => {
            report.note(format!("unable to list {what} for {parent}: {e}"));
            Value::Array(vec![])
        }
    }
}

/// Write a finished fragment at its section pointer.
pub(crate) async fn write_fragment(
    ctx: &DiscoveryCtx,
    pointer: &str,
    fragment: Value,
) -> anyhow::Result<()> {
    let pointer = SectionPointer::parse(pointer)?;
    ctx.store.write_section(&pointer, fragment).await
}
