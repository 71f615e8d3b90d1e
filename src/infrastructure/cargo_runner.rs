/// Cargo Runner.
///
/// Drives the external build of the scratch crate:
/// - `cargo init`: package manifest around the generated `src/main.rs`
/// - `cargo fetch`: dependency resolution
/// - `cargo build --release`: the binary

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use tracing::info;

use super::manifest::{self, DependencySpec};
use crate::ports::{BuildStep, Toolchain};

// ═══════════════════════════════════════════════════════════════════════════
// Public API
// ═══════════════════════════════════════════════════════════════════════════

/// Toolchain backed by the `cargo` executable.
pub struct CargoToolchain {
    program: String,
}

impl CargoToolchain {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Honour `$CARGO` the way cargo subcommands and build scripts do.
    pub fn from_env() -> Self {
        Self::new(std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for CargoToolchain {
    fn default() -> Self {
        Self::from_env()
    }
}

impl Toolchain for CargoToolchain {
    fn run(&self, step: &BuildStep, dir: &Path) -> Result<()> {
        let spec = build_command_spec(step, &self.program);
        info!(step = %step, dir = %dir.display(), "running {} {}", spec.program, spec.args.join(" "));

        let output = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(dir)
            .output()
            .with_context(|| format!("Failed to execute '{}'. Is cargo installed?", spec.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} {} failed with exit code {:?}:\n{}",
                spec.program,
                spec.args.join(" "),
                output.status.code(),
                stderr
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            print!("{}", stdout);
        }
        Ok(())
    }

    fn package_dependencies(&self, source_dir: &Path) -> Result<Vec<DependencySpec>> {
        manifest::load_package_dependencies(source_dir)
    }

    fn artifact_path(&self, dir: &Path, package: &str) -> PathBuf {
        dir.join("target")
            .join("release")
            .join(format!("{}{}", package, std::env::consts::EXE_SUFFIX))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Testable Command Builder
// ═══════════════════════════════════════════════════════════════════════════

/// The command a build step runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

pub fn build_command_spec(step: &BuildStep, program: &str) -> CommandSpec {
    let args: Vec<&str> = match step {
        BuildStep::Init { package } => vec!["init", "--bin", "--vcs", "none", "--name", package.as_str()],
        BuildStep::Fetch => vec!["fetch"],
        BuildStep::Build => vec!["build", "--release"],
    };
    CommandSpec {
        program: program.to_string(),
        args: args.into_iter().map(String::from).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_command_spec_init() {
        let spec = build_command_spec(
            &BuildStep::Init {
                package: "benchlift-abc".to_string(),
            },
            "cargo",
        );
        assert_eq!(spec.program, "cargo");
        assert_eq!(spec.args[0], "init");
        assert!(spec.args.contains(&"--bin".to_string()));
        assert_eq!(spec.args.last().map(String::as_str), Some("benchlift-abc"));
    }

    #[test]
    fn test_build_command_spec_fetch_and_build() {
        assert_eq!(build_command_spec(&BuildStep::Fetch, "cargo").args, vec!["fetch"]);
        assert_eq!(
            build_command_spec(&BuildStep::Build, "/opt/cargo").args,
            vec!["build", "--release"]
        );
        assert_eq!(build_command_spec(&BuildStep::Build, "/opt/cargo").program, "/opt/cargo");
    }

    #[test]
    fn test_artifact_path_is_in_release_dir() {
        let toolchain = CargoToolchain::new("cargo");
        let path = toolchain.artifact_path(Path::new("/tmp/scratch"), "benchlift-abc");
        assert!(path.starts_with("/tmp/scratch/target/release"));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("benchlift-abc"));
    }

    #[test]
    #[ignore] // Requires cargo in PATH and network access
    fn test_init_creates_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        let toolchain = CargoToolchain::from_env();
        toolchain
            .run(&BuildStep::Init { package: "scratch".to_string() }, dir.path())
            .unwrap();
        assert!(dir.path().join("Cargo.toml").exists());
    }
}
