use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Placeholder substituted with the availability-domain number.
pub const AD_PLACEHOLDER: &str = "{{AD_NUMBER}}";

/// Render the launch spec once per availability domain.
///
/// Pure string substitution: the template must be valid JSON before and
/// after every substitution, so a placeholder buried in a string value
/// cannot silently corrupt the payload.
pub fn render_ad_specs(
    template: &str,
    ads: &[u32],
    dir: &Path,
) -> Result<BTreeMap<u32, PathBuf>> {
    serde_json::from_str::<serde_json::Value>(template)
        .context("launch spec is not valid JSON")?;

    let mut rendered = BTreeMap::new();
    for &ad in ads {
        let body = template.replace(AD_PLACEHOLDER, &ad.to_string());
        serde_json::from_str::<serde_json::Value>(&body)
            .with_context(|| format!("launch spec for AD-{ad} is not valid JSON after substitution"))?;

        let path = dir.join(format!("launch-ad{ad}.json"));
        std::fs::write(&path, &body)
            .with_context(|| format!("cannot write rendered spec {}", path.display()))?;
        tracing::debug!(ad, path = %path.display(), "Rendered launch spec");
        rendered.insert(ad, path);
    }
    Ok(rendered)
}
