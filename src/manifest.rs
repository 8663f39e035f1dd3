//! The `package.json` fields the checker cares about.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Subset of `package.json` relevant to version-pin checking.
///
/// Every field is optional: a missing field is reported by the
/// consistency checks, not by the deserializer. Unknown fields are
/// ignored.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// The `packageManager` pin, e.g. `"yarn@4.6.0"`.
    pub package_manager: Option<String>,
    pub volta: Option<VoltaPins>,
    pub engines: Option<Engines>,
}

/// The `volta` tool-pin block.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct VoltaPins {
    /// Bare version triple, e.g. `"4.6.0"`.
    pub yarn: Option<String>,
}

/// The `engines` constraint block.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Engines {
    /// Minimum-version constraint, e.g. `">=4.0.2"`.
    pub yarn: Option<String>,
}

impl Manifest {
    pub fn parse(contents: &str) -> Result<Manifest> {
        serde_json::from_str(contents).context("Failed to parse package.json")
    }

    /// The secondary pin declared under `volta.yarn`, if any.
    pub fn volta_pin(&self) -> Option<&str> {
        self.volta.as_ref()?.yarn.as_deref()
    }

    /// The minimum-constraint string declared under `engines.yarn`, if any.
    pub fn engines_constraint(&self) -> Option<&str> {
        self.engines.as_ref()?.yarn.as_deref()
    }
}
