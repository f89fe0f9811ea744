use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Process-wide exclusive lock: at most one provisioning run per user.
///
/// A lock directory (atomic `mkdir`) holding a `pid` file. A leftover lock
/// from a dead process is detected by PID liveness and reclaimed once.
/// Released on drop.
#[derive(Debug)]
pub struct ProcessLock {
    dir: PathBuf,
}

impl ProcessLock {
    pub fn acquire(name: &str) -> Result<Self> {
        Self::acquire_in(&runtime_base_dir(), name)
    }

    pub fn acquire_in(base: &Path, name: &str) -> Result<Self> {
        let dir = base.join("oci-provision").join(format!("{name}.lock"));
        if let Some(parent) = dir.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create lock parent {}", parent.display()))?;
        }

        for _ in 0..2 {
            match std::fs::create_dir(&dir) {
                Ok(()) => {
                    std::fs::write(dir.join("pid"), std::process::id().to_string())
                        .with_context(|| format!("cannot write pid file in {}", dir.display()))?;
                    tracing::debug!(lock = %dir.display(), "Acquired provisioning lock");
                    return Ok(Self { dir });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    match read_owner_pid(&dir) {
                        Some(pid) if process_alive(pid) => {
                            bail!("another instance is already running (PID {pid})");
                        }
                        _ => {
                            tracing::warn!(lock = %dir.display(), "Removing stale provisioning lock");
                            std::fs::remove_dir_all(&dir).with_context(|| {
                                format!("cannot remove stale lock {}", dir.display())
                            })?;
                        }
                    }
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("cannot create lock dir {}", dir.display()));
                }
            }
        }

        bail!("could not acquire provisioning lock at {}", dir.display())
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn read_owner_pid(dir: &Path) -> Option<i32> {
    let text = std::fs::read_to_string(dir.join("pid")).ok()?;
    text.trim().parse().ok()
}

#[cfg(unix)]
fn process_alive(pid: i32) -> bool {
    // Signal 0 probes for existence; EPERM still means the process exists.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: i32) -> bool {
    // Without a portable liveness probe, assume the owner is alive.
    true
}

/// The first writable runtime directory, in preference order.
fn runtime_base_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        for sub in [".local/state", ".cache"] {
            let candidate = Path::new(&home).join(sub);
            if candidate.is_dir() || std::fs::create_dir_all(&candidate).is_ok() {
                return candidate;
            }
        }
    }
    PathBuf::from("/tmp")
}
