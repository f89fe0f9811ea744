use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

use super::lock::FileMutex;
use super::pointer::SectionPointer;

/// Schema identifier stamped into every snapshot.
pub const SCHEMA: &str = "oci.tenancy.discovery.v1";

/// Owner of the snapshot file. All mutations go through read-modify-write
/// with a sibling tempfile and atomic rename, serialised by [`FileMutex`].
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the skeleton document. Every section key exists from the start,
    /// so a reader never has to distinguish "not captured" from "absent".
    /// The tenancy OCID is seeded immediately; the metadata capture phase
    /// overwrites it with the full projection.
    pub fn init(&self, profile: &str, tenancy_ocid: &str, ignored_namespaces: &[String]) -> Result<()> {
        let skeleton = json!({
            "meta": {
                "schema": SCHEMA,
                "profile": profile,
                "captured-at": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                "ignored": { "tag-namespaces": ignored_namespaces },
            },
            "iam": {
                "tenancy": { "id": tenancy_ocid },
                "tag-namespaces": [],
                "policies": [],
                "users": [],
                "groups": [],
                "dynamic-groups": [],
                "identity-domains": [],
                "compartments": [],
            },
            "network": {
                "vcns": [],
                "drgs": [],
                "nsgs": [],
                "public-ips": [],
                "load-balancers": [],
            },
            "storage": { "buckets": [] },
            "certificates": { "ssl-certificates": [] },
            "dns": { "zones": [] },
        });
        self.write_atomic(&skeleton)
            .context("failed to initialise snapshot")
    }

    /// Splice `value` at `pointer` under the file mutex.
    pub async fn write_section(&self, pointer: &SectionPointer, value: Value) -> Result<()> {
        let _guard = FileMutex::acquire(&self.path).await?;
        let mut doc = self.read()?;
        splice(&mut doc, pointer, value)?;
        self.write_atomic(&doc)
            .with_context(|| format!("failed to write section {pointer}"))
    }

    pub fn read(&self) -> Result<Value> {
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("cannot read snapshot {}", self.path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("snapshot {} is not valid JSON", self.path.display()))
    }

    /// The canonical compartment set: the tenancy root followed by every
    /// discovered compartment, in capture order.
    pub fn read_compartment_ids(&self) -> Result<Vec<String>> {
        let doc = self.read()?;
        let Some(tenancy_id) = doc["iam"]["tenancy"]["id"].as_str() else {
            bail!("snapshot has no tenancy id");
        };

        let mut ids = vec![tenancy_id.to_string()];
        if let Some(compartments) = doc["iam"]["compartments"].as_array() {
            ids.extend(
                compartments
                    .iter()
                    .filter_map(|c| c["id"].as_str())
                    .map(str::to_string),
            );
        }
        Ok(ids)
    }

    fn write_atomic(&self, doc: &Value) -> Result<()> {
        let parent = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        let parent = parent.unwrap_or(Path::new("."));
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());

        let mut tmp = tempfile::Builder::new()
            .prefix(&format!("{file_name}.tmp."))
            .tempfile_in(parent)
            .context("tempfile creation failed")?;
        tmp.write_all(serde_json::to_string_pretty(doc)?.as_bytes())?;
        tmp.write_all(b"\n")?;
        // Dropped (and deleted) on any error path above; renamed on success.
        tmp.persist(&self.path)
            .map_err(|e| anyhow::anyhow!("atomic rename failed: {e}"))?;
        Ok(())
    }
}

/// Follow the pointer through the document and replace the final key.
/// Intermediate segments must exist as objects (the skeleton guarantees
/// this for every declared section).
fn splice(doc: &mut Value, pointer: &SectionPointer, value: Value) -> Result<()> {
    let segments = pointer.segments();
    let mut cursor = doc;

    for segment in &segments[..segments.len() - 1] {
        cursor = match cursor.get_mut(segment.as_str()) {
            Some(next) if next.is_object() => next,
            Some(_) => bail!("pointer {pointer}: segment '{segment}' is not an object"),
            None => bail!("pointer {pointer}: segment '{segment}' missing"),
        };
    }

    let Value::Object(map) = cursor else {
        bail!("pointer {pointer}: parent is not an object");
    };
    let last = &segments[segments.len() - 1];
    map.insert(last.clone(), value);
    Ok(())
}

/// Delete stray `*.tmp.*` files and `*.lock` directories left in `dir` by an
/// interrupted run.
pub fn cleanup_strays(dir: &Path) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        if name.contains(".tmp.") {
            tracing::debug!(path = %path.display(), "Removing stray tempfile");
            let _ = std::fs::remove_file(&path);
        } else if name.ends_with(".lock") && path.is_dir() {
            tracing::debug!(path = %path.display(), "Removing stray lock");
            let _ = std::fs::remove_dir_all(&path);
        }
    }
    Ok(())
}
