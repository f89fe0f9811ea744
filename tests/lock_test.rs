use ociscope::provision::lock::ProcessLock;
use tempfile::TempDir;

#[test]
fn test_second_acquire_reports_running_pid() {
    let base = TempDir::new().unwrap();

    let held = ProcessLock::acquire_in(base.path(), "launch").unwrap();
    let err = ProcessLock::acquire_in(base.path(), "launch").unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("another instance is already running (PID"),
        "unexpected message: {msg}"
    );
    assert!(msg.contains(&std::process::id().to_string()));
    drop(held);
}

#[test]
fn test_release_allows_reacquire() {
    let base = TempDir::new().unwrap();

    let first = ProcessLock::acquire_in(base.path(), "launch").unwrap();
    drop(first);
    let second = ProcessLock::acquire_in(base.path(), "launch").unwrap();
    drop(second);
}

#[test]
fn test_stale_lock_is_reclaimed() {
    let base = TempDir::new().unwrap();
    let lock_dir = base.path().join("oci-provision").join("launch.lock");
    std::fs::create_dir_all(&lock_dir).unwrap();
    // A PID far above any live process on the test host.
    std::fs::write(lock_dir.join("pid"), "999999999").unwrap();

    let lock = ProcessLock::acquire_in(base.path(), "launch").unwrap();
    drop(lock);
    assert!(!lock_dir.exists());
}

#[test]
fn test_lock_without_pid_file_is_stale() {
    let base = TempDir::new().unwrap();
    let lock_dir = base.path().join("oci-provision").join("launch.lock");
    std::fs::create_dir_all(&lock_dir).unwrap();

    let lock = ProcessLock::acquire_in(base.path(), "launch").unwrap();
    drop(lock);
}

#[test]
fn test_distinct_names_do_not_contend() {
    let base = TempDir::new().unwrap();
    let a = ProcessLock::acquire_in(base.path(), "alpha").unwrap();
    let b = ProcessLock::acquire_in(base.path(), "beta").unwrap();
    drop(a);
    drop(b);
}
