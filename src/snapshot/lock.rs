use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Poll interval while another writer holds the lock.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Attempts before acquisition times out (200 × 50 ms = 10 s).
pub const MAX_ATTEMPTS: u32 = 200;

/// Advisory mutex over the snapshot file, held by holding a sibling
/// `<path>.lock` directory. `mkdir` is atomic on every platform we care
/// about, so creation doubles as acquisition. Released on drop.
#[derive(Debug)]
pub struct FileMutex {
    dir: PathBuf,
}

impl FileMutex {
    /// Acquire the lock for `snapshot_path`, polling on contention.
    /// Timing out is recoverable: callers may retry the whole section write.
    pub async fn acquire(snapshot_path: &Path) -> Result<Self> {
        let dir = lock_dir_for(snapshot_path);

        for attempt in 0..MAX_ATTEMPTS {
            match std::fs::create_dir(&dir) {
                Ok(()) => {
                    if attempt > 0 {
                        tracing::debug!(lock = %dir.display(), attempt, "Acquired snapshot lock");
                    }
                    return Ok(Self { dir });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("cannot create lock dir {}", dir.display()));
                }
            }
        }

        bail!("timed out waiting for snapshot lock {}", dir.display())
    }
}

impl Drop for FileMutex {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir(&self.dir);
    }
}

/// Sibling lock directory: `snapshot.json` → `snapshot.json.lock`.
pub fn lock_dir_for(snapshot_path: &Path) -> PathBuf {
    let mut name = snapshot_path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}
