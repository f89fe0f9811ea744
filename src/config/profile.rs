use std::path::Path;

use anyhow::{bail, Context, Result};

/// Read the tenancy OCID for `profile` out of an OCI config file.
///
/// The config file is INI-shaped: `[PROFILE]` section headers followed by
/// `key = value` lines. Only the `tenancy` key is of interest here; full
/// parsing of the credential material stays with the CLI itself.
pub fn read_tenancy_ocid(path: &Path, profile: &str) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("config file not found: {}", path.display()))?;

    let tenancy_re = regex::Regex::new(r"^\s*tenancy\s*=(.*)$").unwrap();
    let mut in_section = false;
    let mut section_seen = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            in_section = &trimmed[1..trimmed.len() - 1] == profile;
            section_seen |= in_section;
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some(cap) = tenancy_re.captures(line) {
            let ocid = cap[1].trim().to_string();
            if ocid.is_empty() {
                bail!(
                    "profile [{profile}] in {} has an empty tenancy OCID",
                    path.display()
                );
            }
            return Ok(ocid);
        }
    }

    if !section_seen {
        bail!("profile [{profile}] not found in {}", path.display());
    }
    bail!(
        "profile [{profile}] in {} has no tenancy line",
        path.display()
    )
}
