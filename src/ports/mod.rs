use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::infrastructure::manifest::DependencySpec;

/// One step of building the scratch crate, run in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStep {
    /// Create the package manifest around the generated sources.
    Init { package: String },
    /// Resolve and download dependencies.
    Fetch,
    /// Compile the binary.
    Build,
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStep::Init { package } => write!(f, "init {}", package),
            BuildStep::Fetch => write!(f, "fetch"),
            BuildStep::Build => write!(f, "build"),
        }
    }
}

/// The external build toolchain.
pub trait Toolchain {
    /// Run `step` inside the scratch crate at `dir`.
    fn run(&self, step: &BuildStep, dir: &Path) -> Result<()>;

    /// Dependencies of the package owning `source_dir`, if there is one.
    fn package_dependencies(&self, source_dir: &Path) -> Result<Vec<DependencySpec>>;

    /// Where `Build` leaves the binary of `package`.
    fn artifact_path(&self, dir: &Path, package: &str) -> PathBuf;
}
