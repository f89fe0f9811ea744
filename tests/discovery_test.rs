use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use ociscope::cli::invoke::OciCli;
use ociscope::discovery::{iam, orchestrator, DiscoveryCtx};
use ociscope::snapshot::store::SnapshotStore;
use serde_json::json;
use tempfile::TempDir;

const TENANCY: &str = "ocid1.tenancy.oc1..testtenancy";

fn write_stub(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("oci-stub.sh");
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn ctx_for(dir: &TempDir, stub: &Path) -> DiscoveryCtx {
    DiscoveryCtx {
        cli: OciCli::new(&stub.to_string_lossy(), "DEFAULT", 0),
        store: SnapshotStore::new(dir.path().join("snapshot.json")),
        tenancy_ocid: TENANCY.to_string(),
        ignored_namespaces: vec!["Oracle-Tags".to_string()],
    }
}

/// A tenancy with nothing in it beyond the root compartment. Most list
/// commands emit empty stdout, exercising the []/{} normalisation.
const EMPTY_TENANCY_STUB: &str = r#"#!/bin/sh
case "$*" in
  *"iam tenancy get"*)
    printf '%s\n' '{"id": "ocid1.tenancy.oc1..testtenancy", "name": "acme", "description": null, "home-region-key": "IAD"}' ;;
  *"os ns get"*)
    printf '%s\n' '"acme-ns"' ;;
  *) : ;;
esac
"#;

#[tokio::test]
async fn test_empty_tenancy_snapshot() {
    let dir = TempDir::new().unwrap();
    let stub = write_stub(dir.path(), EMPTY_TENANCY_STUB);
    let ctx = ctx_for(&dir, &stub);

    let status = orchestrator::run(&ctx).await.unwrap();
    assert_eq!(status, 0);

    let doc = ctx.store.read().unwrap();
    assert_eq!(doc["meta"]["schema"], "oci.tenancy.discovery.v1");
    assert_eq!(doc["iam"]["tenancy"]["id"], TENANCY);
    assert_eq!(doc["iam"]["tenancy"]["name"], "acme");

    for key in [
        "tag-namespaces",
        "policies",
        "users",
        "groups",
        "dynamic-groups",
        "identity-domains",
        "compartments",
    ] {
        assert_eq!(doc["iam"][key], json!([]), "iam.{key}");
    }
    for key in ["vcns", "drgs", "nsgs", "public-ips", "load-balancers"] {
        assert_eq!(doc["network"][key], json!([]), "network.{key}");
    }
    assert_eq!(doc["storage"]["buckets"], json!([]));
    assert_eq!(doc["certificates"]["ssl-certificates"], json!([]));
    assert_eq!(doc["dns"]["zones"], json!([]));
}

/// A populated tenancy where listing tag names for one namespace fails.
/// The failing namespace keeps an empty definition list; everything else
/// completes normally.
const PARTIAL_FAILURE_STUB: &str = r#"#!/bin/sh
case "$*" in
  *"iam tenancy get"*)
    printf '%s\n' '{"id": "ocid1.tenancy.oc1..testtenancy", "name": "acme", "description": null, "home-region-key": "IAD"}' ;;
  *"iam tag-namespace list"*)
    printf '%s\n' '[{"id": "ocid1.tagnamespace.oc1..ns1", "name": "Operations", "lifecycle-state": "ACTIVE"}, {"id": "ocid1.tagnamespace.oc1..ns2", "name": "UserNs", "lifecycle-state": "ACTIVE"}, {"id": "ocid1.tagnamespace.oc1..ns3", "name": "Oracle-Tags", "lifecycle-state": "ACTIVE"}]' ;;
  *"iam tag list"*"--tag-namespace-id ocid1.tagnamespace.oc1..ns2"*)
    printf '%s\n' 'ServiceError: {"code": "InternalError", "message": "backend failure", "status": 500}' >&2
    exit 1 ;;
  *"iam tag list"*"--tag-namespace-id ocid1.tagnamespace.oc1..ns1"*)
    printf '%s\n' '[{"name": "cost-center"}]' ;;
  *"iam tag list"*) : ;;
  *"iam tag get"*)
    printf '%s\n' '{"id": "ocid1.tagdefinition.oc1..t1", "name": "cost-center", "is-retired": false, "lifecycle-state": "ACTIVE"}' ;;
  *"iam tag-default list"*)
    printf '%s\n' '[{"id": "ocid1.tagdefault.oc1..d1", "value": "42", "is-required": false, "lifecycle-state": "ACTIVE", "locks": null, "tag-namespace-id": "ocid1.tagnamespace.oc1..ns1", "tag-definition-id": "ocid1.tagdefinition.oc1..t1"}]' ;;
  *"iam compartment list"*)
    printf '%s\n' '[{"id": "ocid1.compartment.oc1..dev", "name": "dev", "lifecycle-state": "ACTIVE"}]' ;;
  *"iam user list-groups"*)
    printf '%s\n' '[{"id": "ocid1.group.oc1..admins", "name": "Administrators", "lifecycle-state": "ACTIVE"}]' ;;
  *"iam user list"*)
    printf '%s\n' '[{"id": "ocid1.user.oc1..alice", "name": "alice", "lifecycle-state": "ACTIVE"}]' ;;
  *"network vcn list"*"--compartment-id ocid1.compartment.oc1..dev"*)
    printf '%s\n' '[{"id": "ocid1.vcn.oc1..v1", "display-name": "main", "lifecycle-state": "AVAILABLE"}]' ;;
  *"network subnet list"*)
    printf '%s\n' '[{"id": "ocid1.subnet.oc1..s1", "display-name": "app", "cidr-block": "10.0.1.0/24"}]' ;;
  *"dns zone list"*"--compartment-id ocid1.compartment.oc1..dev"*)
    printf '%s\n' '[{"id": "ocid1.dns-zone.oc1..z1", "name": "example.com", "zone-type": "PRIMARY"}]' ;;
  *"dns record zone get"*)
    printf '%s\n' '{"items": [{"domain": "example.com.", "rtype": "NS", "ttl": 86400}]}' ;;
  *"os ns get"*)
    printf '%s\n' '"acme-ns"' ;;
  *) : ;;
esac
"#;

#[tokio::test]
async fn test_tag_namespace_partial_failure() {
    let dir = TempDir::new().unwrap();
    let stub = write_stub(dir.path(), PARTIAL_FAILURE_STUB);
    let ctx = ctx_for(&dir, &stub);
    ctx.store
        .init("DEFAULT", TENANCY, &ctx.ignored_namespaces)
        .unwrap();

    let report = iam::capture_tag_namespaces(&ctx).await.unwrap();
    assert_eq!(report.exit_code(), 1);
    assert!(report
        .message()
        .contains("unable to list tag names for namespace UserNs"));

    let doc = ctx.store.read().unwrap();
    let namespaces = doc["iam"]["tag-namespaces"].as_array().unwrap();
    assert_eq!(namespaces.len(), 3);

    let by_name = |name: &str| {
        namespaces
            .iter()
            .find(|ns| ns["name"] == name)
            .unwrap_or_else(|| panic!("namespace {name} missing"))
    };

    // The failed namespace has an empty definition list, not a missing key.
    assert_eq!(by_name("UserNs")["tag-definitions"], json!([]));

    // The healthy namespace carries its definition with the matched default,
    // projected without the matcher keys.
    let ops_defs = by_name("Operations")["tag-definitions"].as_array().unwrap();
    assert_eq!(ops_defs.len(), 1);
    assert_eq!(ops_defs[0]["name"], "cost-center");
    assert_eq!(ops_defs[0]["tag-default"]["value"], "42");
    assert!(ops_defs[0]["tag-default"].get("tag-namespace-id").is_none());

    // Ignore-list membership is flagged per namespace.
    assert_eq!(by_name("Oracle-Tags")["ignored"], json!(true));
    assert_eq!(by_name("Operations")["ignored"], json!(false));
}

#[tokio::test]
async fn test_full_run_with_partial_failure_reports_nonzero() {
    let dir = TempDir::new().unwrap();
    let stub = write_stub(dir.path(), PARTIAL_FAILURE_STUB);
    let ctx = ctx_for(&dir, &stub);

    let status = orchestrator::run(&ctx).await.unwrap();
    assert_eq!(status, 1);

    let doc = ctx.store.read().unwrap();

    // Network walks both the tenancy root and the discovered compartment.
    let vcns = doc["network"]["vcns"].as_array().unwrap();
    assert_eq!(vcns.len(), 1);
    assert_eq!(vcns[0]["subnets"].as_array().unwrap().len(), 1);
    assert_eq!(vcns[0]["route-tables"], json!([]));

    // Users get their nested lists.
    let users = doc["iam"]["users"].as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(
        users[0]["group-memberships"][0]["name"],
        "Administrators"
    );
    assert_eq!(users[0]["api-keys"], json!([]));

    // DNS records are flattened out of the nested items wrapper.
    let zones = doc["dns"]["zones"].as_array().unwrap();
    assert_eq!(zones.len(), 1);
    assert_eq!(zones[0]["records"][0]["rtype"], "NS");
}
