use std::fmt;

use anyhow::{bail, Result};

/// A parsed splice point inside the snapshot document.
///
/// Written as a dotted path with optional quoting for hyphenated keys, the
/// same way the sections are spelled in the schema docs:
/// `.iam.policies`, `.network."public-ips"`. Parsed once, walked many times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionPointer {
    raw: String,
    segments: Vec<String>,
}

impl SectionPointer {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut chars = raw.chars().peekable();
        if chars.next() != Some('.') {
            bail!("section pointer must start with '.': {raw}");
        }

        let mut segments = Vec::new();
        let mut current = String::new();
        let mut quoted = false;

        while let Some(c) = chars.next() {
            match c {
                '"' if current.is_empty() && !quoted => quoted = true,
                '"' if quoted => {
                    quoted = false;
                    // A quoted segment must end here or at a separator.
                    if let Some(next) = chars.peek() {
                        if *next != '.' {
                            bail!("malformed quoted segment in pointer: {raw}");
                        }
                    }
                }
                '.' if !quoted => {
                    if current.is_empty() {
                        bail!("empty segment in pointer: {raw}");
                    }
                    segments.push(std::mem::take(&mut current));
                }
                _ => current.push(c),
            }
        }

        if quoted {
            bail!("unterminated quote in pointer: {raw}");
        }
        if current.is_empty() {
            bail!("empty segment in pointer: {raw}");
        }
        segments.push(current);

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for SectionPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
