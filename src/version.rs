//! Version triples and the minimum-version ordering rule.
//!
//! Everything here operates on plain `major.minor.patch` triples. There
//! is deliberately no range syntax beyond `>=` and no support for
//! pre-release or build-metadata tags.

use anyhow::{Result, anyhow, bail};
use std::fmt;
use std::str::FromStr;

/// The tool whose pins this checker understands.
pub const TOOL_NAME: &str = "yarn";

/// A parsed `major.minor.patch` version.
///
/// The derived ordering compares major first, then minor, then patch,
/// which is exactly the ordering the minimum-constraint check needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// True iff `self >= required`, tier by tier.
    pub fn satisfies_minimum(&self, required: &Version) -> bool {
        self >= required
    }

    /// Parse the manifest's `packageManager` value, e.g. `yarn@4.6.0`.
    pub fn from_package_manager(value: &str) -> Result<Version> {
        let rest = value
            .strip_prefix(TOOL_NAME)
            .and_then(|rest| rest.strip_prefix('@'))
            .ok_or_else(|| anyhow!("expected `{}@<version>`, got {:?}", TOOL_NAME, value))?;
        rest.parse()
    }

    /// Parse the version embedded in a release file path, e.g.
    /// `.yarn/releases/yarn-4.6.0.cjs`.
    pub fn from_release_path(value: &str) -> Result<Version> {
        let file_name = value.rsplit(['/', '\\']).next().unwrap_or(value);
        let triple = file_name
            .strip_prefix(TOOL_NAME)
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|rest| rest.strip_suffix(".cjs"))
            .ok_or_else(|| {
                anyhow!("expected `{}-<version>.cjs` file name, got {:?}", TOOL_NAME, value)
            })?;
        triple.parse()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let segments: Vec<&str> = s.split('.').collect();
        if segments.len() != 3 {
            bail!("expected 3 dotted segments in version {:?}", s);
        }
        // u32::parse would also accept a leading `+`; only bare digits count
        let parse = |segment: &str| {
            if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                bail!("non-numeric segment {:?} in version {:?}", segment, s);
            }
            segment
                .parse::<u32>()
                .map_err(|_| anyhow!("segment {:?} out of range in version {:?}", segment, s))
        };
        Ok(Version::new(
            parse(segments[0])?,
            parse(segments[1])?,
            parse(segments[2])?,
        ))
    }
}

/// A `>=major.minor.patch` lower bound on the pinned version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinimumConstraint(pub Version);

impl fmt::Display for MinimumConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ">={}", self.0)
    }
}

impl FromStr for MinimumConstraint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let triple = s
            .strip_prefix(">=")
            .ok_or_else(|| anyhow!("expected `>=<version>` constraint, got {:?}", s))?;
        Ok(MinimumConstraint(triple.trim().parse()?))
    }
}
