//! Run configuration and the naming conventions benchlift relies on.

use std::path::{Path, PathBuf};

use regex::Regex;

/// Name prefix of candidate functions.
pub const BENCH_PREFIX: &str = "bench_";
/// Suffix of test-only source files.
pub const TEST_SUFFIX: &str = "_test.rs";
/// Suffix test-only files are renamed to in the scratch crate.
pub const LIFTED_SUFFIX: &str = "_lifted.rs";
/// Prefix of the scratch directory (and of the generated package name).
pub const SCRATCH_PREFIX: &str = "benchlift-";
/// Output binary name used when none is given.
pub const DEFAULT_BINARY: &str = "benchmark.binary";

#[derive(Debug, Clone)]
pub struct LiftConfig {
    /// Directory searched (non-recursively) for the candidate.
    pub source_dir: PathBuf,
    /// Unanchored pattern the candidate's name must match.
    pub pattern: Regex,
    /// Where the built binary is copied to. Always absolute.
    pub output: PathBuf,
    pub prefix: String,
    pub test_suffix: String,
    pub lifted_suffix: String,
    pub scratch_prefix: String,
    /// Keep the scratch directory after the run.
    pub keep_scratch: bool,
    /// Stop after rewriting; no workspace, no build.
    pub dry_run: bool,
}

impl LiftConfig {
    pub fn new(source_dir: impl Into<PathBuf>, pattern: Regex, cwd: &Path) -> Self {
        Self {
            source_dir: source_dir.into(),
            pattern,
            output: default_output(cwd),
            prefix: BENCH_PREFIX.to_string(),
            test_suffix: TEST_SUFFIX.to_string(),
            lifted_suffix: LIFTED_SUFFIX.to_string(),
            scratch_prefix: SCRATCH_PREFIX.to_string(),
            keep_scratch: false,
            dry_run: false,
        }
    }

    /// Set the output path; relative paths are taken from `cwd`.
    pub fn with_output(mut self, output: &Path, cwd: &Path) -> Self {
        self.output = resolve_output(output, cwd);
        self
    }
}

pub fn default_output(cwd: &Path) -> PathBuf {
    cwd.join(DEFAULT_BINARY)
}

pub fn resolve_output(output: &Path, cwd: &Path) -> PathBuf {
    if output.is_absolute() {
        output.to_path_buf()
    } else {
        cwd.join(output)
    }
}
