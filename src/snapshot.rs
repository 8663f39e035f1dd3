//! Loading the configuration sources into one immutable snapshot.

use anyhow::{Context, Result};
use log::debug;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::manifest::Manifest;
use crate::rcfile;
use crate::runtime::Runtime;
use crate::version::Version;

/// File name of the manifest, relative to the project root.
pub const MANIFEST_FILE: &str = "package.json";

/// File name of the rc file, relative to the project root.
pub const RC_FILE: &str = ".yarnrc.yml";

/// Directory holding vendored release files, relative to the project root.
pub const RELEASES_DIR: &str = ".yarn/releases";

/// A required input file does not exist. Fatal: the run cannot proceed
/// without it, unlike every other condition which becomes a diagnostic.
#[derive(Debug)]
pub struct MissingFile(pub PathBuf);

impl fmt::Display for MissingFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "required file not found: {}", self.0.display())
    }
}

impl std::error::Error for MissingFile {}

/// Everything the consistency checks need, read once per run.
///
/// The raw strings are kept as found on disk; parsing and comparison
/// happen in the checks so that each malformed value produces its own
/// diagnostic instead of aborting the load.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// `packageManager` value from the manifest, e.g. `yarn@4.6.0`.
    pub package_manager: Option<String>,
    /// `volta.yarn` value from the manifest, e.g. `4.6.0`.
    pub volta_pin: Option<String>,
    /// `yarnPath` value from the rc file, e.g. `.yarn/releases/yarn-4.6.0.cjs`.
    pub yarn_path: Option<String>,
    /// `engines.yarn` value from the manifest, e.g. `>=4.0.2`.
    pub engines_constraint: Option<String>,
    /// Release file path synthesized from the primary pin, when that
    /// pin parses. Absolute (rooted at the project root).
    pub artifact_path: Option<PathBuf>,
}

impl Snapshot {
    /// Read `package.json` and `.yarnrc.yml` under `root` and capture the
    /// raw pin values. Either file being absent is a [`MissingFile`]
    /// error; invalid JSON in the manifest is also fatal.
    pub fn load<R: Runtime>(runtime: &R, root: &Path) -> Result<Snapshot> {
        let manifest_path = root.join(MANIFEST_FILE);
        if !runtime.exists(&manifest_path) {
            return Err(MissingFile(manifest_path).into());
        }
        let manifest_contents = runtime
            .read_to_string(&manifest_path)
            .with_context(|| format!("Failed to read {}", manifest_path.display()))?;
        let manifest = Manifest::parse(&manifest_contents)?;

        let rc_path = root.join(RC_FILE);
        if !runtime.exists(&rc_path) {
            return Err(MissingFile(rc_path).into());
        }
        let rc_contents = runtime
            .read_to_string(&rc_path)
            .with_context(|| format!("Failed to read {}", rc_path.display()))?;
        let yarn_path = rcfile::find_value(&rc_contents, rcfile::YARN_PATH_KEY);

        let artifact_path = manifest
            .package_manager
            .as_deref()
            .and_then(|value| Version::from_package_manager(value).ok())
            .map(|version| artifact_path(root, &version));
        debug!("resolved release file path: {:?}", artifact_path);

        Ok(Snapshot {
            package_manager: manifest.package_manager.clone(),
            volta_pin: manifest.volta_pin().map(String::from),
            yarn_path: yarn_path.map(String::from),
            engines_constraint: manifest.engines_constraint().map(String::from),
            artifact_path,
        })
    }
}

/// Path of the vendored release file for a given version.
///
/// Returns: `<root>/.yarn/releases/yarn-<version>.cjs`
pub fn artifact_path(root: &Path, version: &Version) -> PathBuf {
    root.join(RELEASES_DIR)
        .join(format!("{}-{}.cjs", crate::version::TOOL_NAME, version))
}
