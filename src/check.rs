//! The consistency checks.
//!
//! Every rule failure is collected as a [`Diagnostic`] and checking
//! continues, so one run reports every problem it finds. Only a missing
//! required file aborts the run (see [`crate::snapshot::MissingFile`]).

use anyhow::Result;
use log::debug;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::rcfile;
use crate::runtime::Runtime;
use crate::snapshot::Snapshot;
use crate::version::{MinimumConstraint, Version};

/// Expected first bytes of the vendored release file.
pub const ARTIFACT_SHEBANG: &str = "#!/usr/bin/env node";

/// A real release file is comfortably larger than this.
pub const ARTIFACT_MIN_BYTES: usize = 100_000;

/// A truncated or mangled release file tends to carry this marker from a
/// failed bundling run.
const CORRUPTION_MARKER: &str = "SyntaxError";

/// Where a version pin was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinSource {
    /// `packageManager` in package.json
    PackageManager,
    /// `volta.yarn` in package.json
    Volta,
    /// `yarnPath` in .yarnrc.yml
    YarnPath,
}

impl fmt::Display for PinSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinSource::PackageManager => write!(f, "package.json packageManager"),
            PinSource::Volta => write!(f, "package.json volta.yarn"),
            PinSource::YarnPath => write!(f, ".yarnrc.yml yarnPath"),
        }
    }
}

/// One failed consistency check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A pin source declares no version at all.
    UndefinedVersion { source: PinSource },
    /// The rc file has no line for the expected key.
    KeyNotFound { key: &'static str },
    /// A declared version does not parse as a dotted triple.
    MalformedVersion { source: PinSource, value: String },
    /// Two pin sources disagree.
    VersionMismatch {
        left: PinSource,
        left_version: Version,
        right: PinSource,
        right_version: Version,
    },
    /// No release file at the path the primary pin points to.
    ArtifactMissing { path: PathBuf },
    /// Release file does not start with the expected shebang.
    InvalidArtifactHeader { path: PathBuf },
    /// Release file carries a bundling-failure marker.
    ArtifactCorrupt { path: PathBuf },
    /// Release file is implausibly small.
    ArtifactTooSmall { path: PathBuf, size: usize },
    /// No `>=` minimum constraint declared in the manifest.
    ConstraintMissing,
    /// The primary pin is below the declared minimum.
    ConstraintNotSatisfied {
        actual: Version,
        required: MinimumConstraint,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UndefinedVersion { source } => {
                write!(f, "no version declared in {}", source)
            }
            Diagnostic::KeyNotFound { key } => {
                write!(f, "no `{}:` entry found in .yarnrc.yml", key)
            }
            Diagnostic::MalformedVersion { source, value } => {
                write!(f, "cannot parse version {:?} declared in {}", value, source)
            }
            Diagnostic::VersionMismatch {
                left,
                left_version,
                right,
                right_version,
            } => {
                write!(
                    f,
                    "{} declares {} but {} declares {}",
                    left, left_version, right, right_version
                )
            }
            Diagnostic::ArtifactMissing { path } => {
                write!(f, "release file {} does not exist", path.display())
            }
            Diagnostic::InvalidArtifactHeader { path } => {
                write!(
                    f,
                    "release file {} does not start with `{}`",
                    path.display(),
                    ARTIFACT_SHEBANG
                )
            }
            Diagnostic::ArtifactCorrupt { path } => {
                write!(
                    f,
                    "release file {} contains `{}`",
                    path.display(),
                    CORRUPTION_MARKER
                )
            }
            Diagnostic::ArtifactTooSmall { path, size } => {
                write!(
                    f,
                    "release file {} is {} bytes, expected more than {}",
                    path.display(),
                    size,
                    ARTIFACT_MIN_BYTES
                )
            }
            Diagnostic::ConstraintMissing => {
                write!(
                    f,
                    "package.json engines.yarn declares no `>=` minimum constraint"
                )
            }
            Diagnostic::ConstraintNotSatisfied { actual, required } => {
                write!(
                    f,
                    "pinned version {} does not satisfy minimum {}",
                    actual, required
                )
            }
        }
    }
}

/// Outcome of one checker run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    diagnostics: Vec<Diagnostic>,
}

impl Report {
    pub fn success(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// Run every consistency check against the project at `root`.
///
/// Returns `Err` only for fatal conditions (a required file missing or
/// unreadable); every rule failure lands in the returned [`Report`].
#[tracing::instrument(skip(runtime))]
pub fn validate<R: Runtime>(runtime: &R, root: &Path) -> Result<Report> {
    let snapshot = Snapshot::load(runtime, root)?;
    run_checks(runtime, &snapshot)
}

fn run_checks<R: Runtime>(runtime: &R, snapshot: &Snapshot) -> Result<Report> {
    let mut diagnostics = Vec::new();

    let primary = extract(
        &mut diagnostics,
        PinSource::PackageManager,
        snapshot.package_manager.as_deref(),
        Version::from_package_manager,
    );
    let secondary = extract(
        &mut diagnostics,
        PinSource::Volta,
        snapshot.volta_pin.as_deref(),
        str::parse::<Version>,
    );
    // A missing rc entry is the key being absent, not an undefined field
    let rc = match snapshot.yarn_path.as_deref() {
        None => {
            diagnostics.push(Diagnostic::KeyNotFound {
                key: rcfile::YARN_PATH_KEY,
            });
            None
        }
        Some(value) => match Version::from_release_path(value) {
            Ok(version) => Some(version),
            Err(_) => {
                diagnostics.push(Diagnostic::MalformedVersion {
                    source: PinSource::YarnPath,
                    value: value.to_string(),
                });
                None
            }
        },
    };

    let pins = [
        (PinSource::PackageManager, primary),
        (PinSource::Volta, secondary),
        (PinSource::YarnPath, rc),
    ];
    for i in 0..pins.len() {
        for j in i + 1..pins.len() {
            let ((left, a), (right, b)) = (pins[i], pins[j]);
            if let (Some(a), Some(b)) = (a, b)
                && a != b
            {
                diagnostics.push(Diagnostic::VersionMismatch {
                    left,
                    left_version: a,
                    right,
                    right_version: b,
                });
            }
        }
    }

    if let Some(path) = &snapshot.artifact_path {
        check_artifact(runtime, path, &mut diagnostics)?;
    }

    match snapshot
        .engines_constraint
        .as_deref()
        .and_then(|value| value.parse::<MinimumConstraint>().ok())
    {
        None => diagnostics.push(Diagnostic::ConstraintMissing),
        Some(required) => {
            if let Some(actual) = primary
                && !actual.satisfies_minimum(&required.0)
            {
                diagnostics.push(Diagnostic::ConstraintNotSatisfied { actual, required });
            }
        }
    }

    debug!("checks produced {} diagnostic(s)", diagnostics.len());
    Ok(Report { diagnostics })
}

fn extract(
    diagnostics: &mut Vec<Diagnostic>,
    source: PinSource,
    value: Option<&str>,
    parse: impl Fn(&str) -> Result<Version>,
) -> Option<Version> {
    match value {
        None => {
            diagnostics.push(Diagnostic::UndefinedVersion { source });
            None
        }
        Some(raw) => match parse(raw) {
            Ok(version) => Some(version),
            Err(_) => {
                diagnostics.push(Diagnostic::MalformedVersion {
                    source,
                    value: raw.to_string(),
                });
                None
            }
        },
    }
}

/// Shape checks on the release file. The three content checks are
/// independent: a file can fail all of them in one run.
fn check_artifact<R: Runtime>(
    runtime: &R,
    path: &Path,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<()> {
    if !runtime.exists(path) {
        diagnostics.push(Diagnostic::ArtifactMissing {
            path: path.to_path_buf(),
        });
        return Ok(());
    }

    let bytes = runtime.read(path)?;
    if !bytes.starts_with(ARTIFACT_SHEBANG.as_bytes()) {
        diagnostics.push(Diagnostic::InvalidArtifactHeader {
            path: path.to_path_buf(),
        });
    }
    let marker = CORRUPTION_MARKER.as_bytes();
    if bytes.windows(marker.len()).any(|window| window == marker) {
        diagnostics.push(Diagnostic::ArtifactCorrupt {
            path: path.to_path_buf(),
        });
    }
    if bytes.len() <= ARTIFACT_MIN_BYTES {
        diagnostics.push(Diagnostic::ArtifactTooSmall {
            path: path.to_path_buf(),
            size: bytes.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use std::path::PathBuf;

    fn artifact_path() -> PathBuf {
        PathBuf::from("/project/.yarn/releases/yarn-4.6.0.cjs")
    }

    fn good_snapshot() -> Snapshot {
        Snapshot {
            package_manager: Some("yarn@4.6.0".to_string()),
            volta_pin: Some("4.6.0".to_string()),
            yarn_path: Some(".yarn/releases/yarn-4.6.0.cjs".to_string()),
            engines_constraint: Some(">=4.0.2".to_string()),
            artifact_path: Some(artifact_path()),
        }
    }

    fn good_artifact() -> Vec<u8> {
        let mut bytes = format!("{}\n", ARTIFACT_SHEBANG).into_bytes();
        bytes.resize(ARTIFACT_MIN_BYTES + 1, b'x');
        bytes
    }

    fn runtime_with_artifact(bytes: Vec<u8>) -> MockRuntime {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_exists()
            .with(eq(artifact_path()))
            .returning(|_| true);
        runtime
            .expect_read()
            .with(eq(artifact_path()))
            .returning(move |_| Ok(bytes.clone()));
        runtime
    }

    #[test]
    fn test_all_sources_agree_is_success() {
        let runtime = runtime_with_artifact(good_artifact());
        let report = run_checks(&runtime, &good_snapshot()).unwrap();

        assert!(report.success(), "unexpected: {:?}", report.diagnostics());
        assert!(report.diagnostics().is_empty());
    }

    #[test]
    fn test_secondary_pin_disagrees() {
        let runtime = runtime_with_artifact(good_artifact());
        let snapshot = Snapshot {
            volta_pin: Some("4.0.2".to_string()),
            ..good_snapshot()
        };

        let report = run_checks(&runtime, &snapshot).unwrap();
        assert!(!report.success());

        // 4.0.2 disagrees with both other sources
        let mismatches: Vec<_> = report
            .diagnostics()
            .iter()
            .filter(|d| matches!(d, Diagnostic::VersionMismatch { .. }))
            .collect();
        assert_eq!(mismatches.len(), 2);
        assert_eq!(
            *mismatches[0],
            Diagnostic::VersionMismatch {
                left: PinSource::PackageManager,
                left_version: Version::new(4, 6, 0),
                right: PinSource::Volta,
                right_version: Version::new(4, 0, 2),
            }
        );
        let rendered = mismatches[0].to_string();
        assert!(rendered.contains("4.6.0"), "{rendered}");
        assert!(rendered.contains("4.0.2"), "{rendered}");
    }

    #[test]
    fn test_rc_pin_disagrees_with_manifest_pins() {
        let snapshot = Snapshot {
            yarn_path: Some(".yarn/releases/yarn-4.5.3.cjs".to_string()),
            ..good_snapshot()
        };
        let runtime = runtime_with_artifact(good_artifact());

        let report = run_checks(&runtime, &snapshot).unwrap();
        let mismatches: Vec<_> = report
            .diagnostics()
            .iter()
            .filter(|d| matches!(d, Diagnostic::VersionMismatch { .. }))
            .collect();
        assert_eq!(mismatches.len(), 2);
    }

    #[test]
    fn test_undefined_primary_pin() {
        let snapshot = Snapshot {
            package_manager: None,
            artifact_path: None,
            ..good_snapshot()
        };
        let runtime = MockRuntime::new();

        let report = run_checks(&runtime, &snapshot).unwrap();
        assert!(report.diagnostics().contains(&Diagnostic::UndefinedVersion {
            source: PinSource::PackageManager
        }));
        // Remaining pair still compares
        assert!(
            !report
                .diagnostics()
                .iter()
                .any(|d| matches!(d, Diagnostic::VersionMismatch { .. }))
        );
    }

    #[test]
    fn test_missing_rc_entry_is_key_not_found() {
        let snapshot = Snapshot {
            yarn_path: None,
            ..good_snapshot()
        };
        let runtime = runtime_with_artifact(good_artifact());

        let report = run_checks(&runtime, &snapshot).unwrap();
        assert!(
            report
                .diagnostics()
                .contains(&Diagnostic::KeyNotFound { key: "yarnPath" })
        );
    }

    #[test]
    fn test_malformed_pins_do_not_abort_the_run() {
        let snapshot = Snapshot {
            package_manager: Some("yarn@latest".to_string()),
            volta_pin: Some("four.six.zero".to_string()),
            artifact_path: None,
            ..good_snapshot()
        };
        let runtime = MockRuntime::new();

        let report = run_checks(&runtime, &snapshot).unwrap();
        let malformed: Vec<_> = report
            .diagnostics()
            .iter()
            .filter(|d| matches!(d, Diagnostic::MalformedVersion { .. }))
            .collect();
        assert_eq!(malformed.len(), 2);
        // Constraint check still ran (primary unparsed, so only presence applies)
        assert!(
            !report
                .diagnostics()
                .contains(&Diagnostic::ConstraintMissing)
        );
    }

    #[test]
    fn test_artifact_missing() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_exists()
            .with(eq(artifact_path()))
            .returning(|_| false);

        let report = run_checks(&runtime, &good_snapshot()).unwrap();
        assert!(report.diagnostics().contains(&Diagnostic::ArtifactMissing {
            path: artifact_path()
        }));
    }

    #[test]
    fn test_artifact_too_small() {
        let mut bytes = format!("{}\n", ARTIFACT_SHEBANG).into_bytes();
        bytes.resize(50_000, b'x');
        let runtime = runtime_with_artifact(bytes);

        let report = run_checks(&runtime, &good_snapshot()).unwrap();
        assert!(report.diagnostics().contains(&Diagnostic::ArtifactTooSmall {
            path: artifact_path(),
            size: 50_000
        }));
    }

    #[test]
    fn test_artifact_corrupt() {
        let mut bytes = good_artifact();
        let insert_at = bytes.len() / 2;
        bytes.splice(insert_at..insert_at, b"SyntaxError: oops".iter().copied());
        let runtime = runtime_with_artifact(bytes);

        let report = run_checks(&runtime, &good_snapshot()).unwrap();
        assert!(report.diagnostics().contains(&Diagnostic::ArtifactCorrupt {
            path: artifact_path()
        }));
    }

    #[test]
    fn test_artifact_bad_header() {
        let mut bytes = b"console.log('hi')\n".to_vec();
        bytes.resize(ARTIFACT_MIN_BYTES + 1, b'x');
        let runtime = runtime_with_artifact(bytes);

        let report = run_checks(&runtime, &good_snapshot()).unwrap();
        assert!(
            report
                .diagnostics()
                .contains(&Diagnostic::InvalidArtifactHeader {
                    path: artifact_path()
                })
        );
    }

    #[test]
    fn test_artifact_content_checks_are_independent() {
        // Wrong header AND corrupt AND too small, all in one run
        let runtime = runtime_with_artifact(b"SyntaxError".to_vec());

        let report = run_checks(&runtime, &good_snapshot()).unwrap();
        assert!(
            report
                .diagnostics()
                .iter()
                .any(|d| matches!(d, Diagnostic::InvalidArtifactHeader { .. }))
        );
        assert!(
            report
                .diagnostics()
                .iter()
                .any(|d| matches!(d, Diagnostic::ArtifactCorrupt { .. }))
        );
        assert!(
            report
                .diagnostics()
                .iter()
                .any(|d| matches!(d, Diagnostic::ArtifactTooSmall { .. }))
        );
    }

    #[test]
    fn test_constraint_missing() {
        let snapshot = Snapshot {
            engines_constraint: None,
            ..good_snapshot()
        };
        let runtime = runtime_with_artifact(good_artifact());

        let report = run_checks(&runtime, &snapshot).unwrap();
        assert!(report.diagnostics().contains(&Diagnostic::ConstraintMissing));
    }

    #[test]
    fn test_constraint_without_ge_operator_counts_as_missing() {
        let snapshot = Snapshot {
            engines_constraint: Some("^4.0.2".to_string()),
            ..good_snapshot()
        };
        let runtime = runtime_with_artifact(good_artifact());

        let report = run_checks(&runtime, &snapshot).unwrap();
        assert!(report.diagnostics().contains(&Diagnostic::ConstraintMissing));
    }

    #[test]
    fn test_constraint_not_satisfied() {
        let snapshot = Snapshot {
            engines_constraint: Some(">=4.7.0".to_string()),
            ..good_snapshot()
        };
        let runtime = runtime_with_artifact(good_artifact());

        let report = run_checks(&runtime, &snapshot).unwrap();
        assert!(
            report
                .diagnostics()
                .contains(&Diagnostic::ConstraintNotSatisfied {
                    actual: Version::new(4, 6, 0),
                    required: MinimumConstraint(Version::new(4, 7, 0)),
                })
        );
        // A single diagnostic for the constraint failure
        assert_eq!(report.diagnostics().len(), 1);
    }

    #[test]
    fn test_diagnostics_support_full_equality() {
        fn assert_eq_impl<T: Eq>() {}
        assert_eq_impl::<Diagnostic>();
        assert_eq_impl::<Report>();
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let snapshot = Snapshot {
            volta_pin: Some("4.0.2".to_string()),
            engines_constraint: Some(">=4.7.0".to_string()),
            ..good_snapshot()
        };
        let first = run_checks(&runtime_with_artifact(good_artifact()), &snapshot).unwrap();
        let second = run_checks(&runtime_with_artifact(good_artifact()), &snapshot).unwrap();

        assert_eq!(first, second);
        let rendered: Vec<String> = first.diagnostics().iter().map(|d| d.to_string()).collect();
        let rendered_again: Vec<String> =
            second.diagnostics().iter().map(|d| d.to_string()).collect();
        assert_eq!(rendered, rendered_again);
    }

    #[test]
    fn test_validate_end_to_end_with_mock_runtime() {
        let root = PathBuf::from("/project");
        let mut runtime = MockRuntime::new();
        runtime
            .expect_exists()
            .with(eq(root.join("package.json")))
            .returning(|_| true);
        runtime
            .expect_read_to_string()
            .with(eq(root.join("package.json")))
            .returning(|_| {
                Ok(r#"{
                    "packageManager": "yarn@4.6.0",
                    "volta": { "yarn": "4.6.0" },
                    "engines": { "yarn": ">=4.0.2" }
                }"#
                .to_string())
            });
        runtime
            .expect_exists()
            .with(eq(root.join(".yarnrc.yml")))
            .returning(|_| true);
        runtime
            .expect_read_to_string()
            .with(eq(root.join(".yarnrc.yml")))
            .returning(|_| Ok("yarnPath: .yarn/releases/yarn-4.6.0.cjs\n".to_string()));
        runtime
            .expect_exists()
            .with(eq(artifact_path()))
            .returning(|_| true);
        runtime
            .expect_read()
            .with(eq(artifact_path()))
            .returning(|_| Ok(good_artifact()));

        let report = validate(&runtime, &root).unwrap();
        assert!(report.success(), "unexpected: {:?}", report.diagnostics());
    }
}
