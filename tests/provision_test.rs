use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ociscope::cli::invoke::OciCli;
use ociscope::provision::engine::{ProvisionEnd, Provisioner, RetryPolicy};
use ociscope::provision::spec::render_ad_specs;
use tempfile::TempDir;

const TEMPLATE: &str = r#"{"availabilityDomain": "AD-{{AD_NUMBER}}", "shape": "VM.Standard.E4.Flex"}"#;

fn write_stub(dir: &Path, body: String) -> PathBuf {
    let path = dir.join("oci-stub.sh");
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// A stub that consults a call counter and replays `failures` before finally
/// succeeding. The error payload goes to stderr with a nonzero exit, the
/// way the real CLI reports service errors.
fn counting_stub(dir: &Path, failures: u32, error_line: &str) -> (PathBuf, PathBuf) {
    let count_file = dir.join("count");
    let body = format!(
        r#"#!/bin/sh
count_file="{count}"
n=$(cat "$count_file" 2>/dev/null || echo 0)
n=$((n+1))
echo "$n" > "$count_file"
if [ "$n" -le {failures} ]; then
  echo '{error_line}' >&2
  exit 1
fi
echo '{{"id": "ocid1.instance.oc1..inst1", "lifecycle-state": "PROVISIONING"}}'
"#,
        count = count_file.display(),
    );
    (write_stub(dir, body), count_file)
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_cycles: 50,
        max_error_cycles: 10,
        max_backoff_attempts: 9,
        base_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(20),
        jitter_step: Duration::from_millis(1),
        jitter_units: 1,
        inter_ad_min: Duration::from_millis(1),
        inter_ad_max: Duration::from_millis(2),
    }
}

fn calls_made(count_file: &Path) -> u32 {
    std::fs::read_to_string(count_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap()
}

#[tokio::test]
async fn test_success_on_second_ad_first_cycle() {
    let dir = TempDir::new().unwrap();
    let (stub, count_file) = counting_stub(
        dir.path(),
        1,
        r#"ServiceError: {"code": "InternalError", "message": "Out of host capacity.", "status": 500}"#,
    );
    let specs = render_ad_specs(TEMPLATE, &[1, 2], dir.path()).unwrap();

    let cli = OciCli::new(&stub.to_string_lossy(), "DEFAULT", 0);
    let provisioner = Provisioner::new(cli, vec![1, 2], fast_policy());

    match provisioner.run(&specs).await.unwrap() {
        ProvisionEnd::Launched(instance) => {
            assert_eq!(instance["id"], "ocid1.instance.oc1..inst1");
        }
        other => panic!("expected launch, got {other:?}"),
    }
    // AD-1 hit the capacity error, AD-2 succeeded, all within one cycle.
    assert_eq!(calls_made(&count_file), 2);
}

#[tokio::test]
async fn test_throttled_cycles_then_success() {
    let dir = TempDir::new().unwrap();
    let (stub, count_file) = counting_stub(
        dir.path(),
        3,
        r#"ServiceError: {"code": "TooManyRequests", "message": "Too many requests for the user", "status": 429}"#,
    );
    let specs = render_ad_specs(TEMPLATE, &[1], dir.path()).unwrap();

    let cli = OciCli::new(&stub.to_string_lossy(), "DEFAULT", 0);
    let provisioner = Provisioner::new(cli, vec![1], fast_policy());

    let end = provisioner.run(&specs).await.unwrap();
    assert!(matches!(end, ProvisionEnd::Launched(_)));
    // Three throttled cycles, success on the fourth.
    assert_eq!(calls_made(&count_file), 4);
}

#[tokio::test]
async fn test_fatal_auth_stops_immediately() {
    let dir = TempDir::new().unwrap();
    let (stub, count_file) = counting_stub(
        dir.path(),
        1000,
        r#"ServiceError: {"code": "NotAuthenticated", "message": "The required information to complete authentication was not provided.", "status": 401}"#,
    );
    let specs = render_ad_specs(TEMPLATE, &[1, 2, 3], dir.path()).unwrap();

    let cli = OciCli::new(&stub.to_string_lossy(), "DEFAULT", 0);
    let provisioner = Provisioner::new(cli, vec![1, 2, 3], fast_policy());

    let err = provisioner.run(&specs).await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("AD-1: authentication error"), "got: {msg}");
    // No further AD was attempted.
    assert_eq!(calls_made(&count_file), 1);
}

#[tokio::test]
async fn test_max_cycles_exhausted() {
    let dir = TempDir::new().unwrap();
    let (stub, count_file) = counting_stub(
        dir.path(),
        1000,
        r#"ServiceError: {"code": "InternalError", "message": "Out of host capacity.", "status": 500}"#,
    );
    let specs = render_ad_specs(TEMPLATE, &[1], dir.path()).unwrap();

    let mut policy = fast_policy();
    policy.max_cycles = 3;
    let cli = OciCli::new(&stub.to_string_lossy(), "DEFAULT", 0);
    let provisioner = Provisioner::new(cli, vec![1], policy);

    let err = provisioner.run(&specs).await.unwrap_err();
    assert!(err.to_string().contains("max cycles (3) reached"));
    assert_eq!(calls_made(&count_file), 3);
}

#[tokio::test]
async fn test_error_budget_exhausted() {
    let dir = TempDir::new().unwrap();
    let (stub, count_file) = counting_stub(
        dir.path(),
        1000,
        r#"ServiceError: {"code": "SomethingWeird", "message": "inexplicable", "status": 503}"#,
    );
    let specs = render_ad_specs(TEMPLATE, &[1], dir.path()).unwrap();

    let mut policy = fast_policy();
    policy.max_error_cycles = 2;
    let cli = OciCli::new(&stub.to_string_lossy(), "DEFAULT", 0);
    let provisioner = Provisioner::new(cli, vec![1], policy);

    let err = provisioner.run(&specs).await.unwrap_err();
    assert!(err.to_string().contains("too many transient errors"));
    // Budget is ads × max_error_cycles = 2.
    assert_eq!(calls_made(&count_file), 2);
}

#[tokio::test]
async fn test_missing_rendered_spec_is_an_error() {
    let dir = TempDir::new().unwrap();
    let (stub, _count_file) = counting_stub(dir.path(), 0, "unused");
    let specs = render_ad_specs(TEMPLATE, &[1], dir.path()).unwrap();

    let cli = OciCli::new(&stub.to_string_lossy(), "DEFAULT", 0);
    // AD 2 was never rendered.
    let provisioner = Provisioner::new(cli, vec![2], fast_policy());
    let err = provisioner.run(&specs).await.unwrap_err();
    assert!(err.to_string().contains("no rendered spec for AD-2"));
}
