use anyhow::Result;
use clap::Parser;
use pincheck::check::validate;
use pincheck::runtime::RealRuntime;
use std::path::PathBuf;
use std::process::ExitCode;

/// pincheck - package-manager pin checker
///
/// Verifies that the yarn version pinned in package.json (packageManager
/// and volta.yarn), the yarnPath entry in .yarnrc.yml, and the vendored
/// release file under .yarn/releases all agree, and that the pin
/// satisfies the engines.yarn minimum.
///
/// Exits 0 when every check passes, 1 when any check fails.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Project root containing package.json (also via PINCHECK_ROOT)
    #[arg(value_name = "PATH", env = "PINCHECK_ROOT", default_value = ".")]
    project_root: PathBuf,
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = RealRuntime;

    let report = validate(&runtime, &cli.project_root)?;
    if report.success() {
        println!("all version pins agree");
        return Ok(ExitCode::SUCCESS);
    }
    for diagnostic in report.diagnostics() {
        eprintln!("pincheck: {diagnostic}");
    }
    Ok(ExitCode::FAILURE)
}
