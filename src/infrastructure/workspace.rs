//! Scratch Workspace
//!
//! A disposable cargo package that holds copies of the benchmark sources in
//! `src/`, next to a generated `src/main.rs`. The original source tree is
//! never written to.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::source_loader::SourceLoader;
use crate::domain::entry_point::{module_name, EntryPoint};

/// Files that are crate roots in their own package; their `mod` declarations
/// only make sense there.
pub const CRATE_ROOTS: &[&str] = &["lib.rs", "main.rs", "build.rs"];

/// Stem suffix a copied crate root gets, so it cannot clash with the generated `main.rs`.
const ROOT_COPY_SUFFIX: &str = "_root";

pub struct ScratchWorkspace {
    root: PathBuf,
    /// Removes the directory on drop; `None` when the directory is kept.
    guard: Option<TempDir>,
}

impl ScratchWorkspace {
    /// Create a fresh directory under the system temp dir.
    pub fn create(prefix: &str, keep: bool) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .context("Could not create temporary source directory")?;

        let workspace = if keep {
            #[allow(deprecated)]
            let root = dir.into_path();
            Self { root, guard: None }
        } else {
            Self {
                root: dir.path().to_path_buf(),
                guard: Some(dir),
            }
        };
        fs::create_dir_all(workspace.src_dir()).with_context(|| {
            format!("Could not create {}", workspace.src_dir().display())
        })?;
        info!("Temporary source directory: {}", workspace.root.display());
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_kept(&self) -> bool {
        self.guard.is_none()
    }

    /// Where the copied sources and the entry point live.
    pub fn src_dir(&self) -> PathBuf {
        self.root.join("src")
    }

    /// Module files of the copied sources, without the entry point.
    pub fn module_files(&self) -> Result<Vec<PathBuf>> {
        let entry = self.entry_point_path();
        Ok(SourceLoader::list_rs_files(&self.src_dir())?
            .into_iter()
            .filter(|path| *path != entry)
            .collect())
    }

    pub fn entry_point_path(&self) -> PathBuf {
        self.src_dir().join("main.rs")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("Cargo.toml")
    }

    /// Package (and binary) name of the scratch crate, taken from the directory name.
    pub fn package_name(&self) -> String {
        self.root
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "benchlift".to_string())
    }

    /// Copy the `.rs` files of `from` into `src/`.
    ///
    /// Files that cannot be declared as a module are skipped, and so are crate
    /// roots unless `keep` names one of them; a kept crate root is copied under
    /// [`copied_name`]. Returns the names of the copies.
    pub fn copy_sources(&self, from: &Path, keep: &Path) -> Result<Vec<PathBuf>> {
        let mut copied = Vec::new();
        for source in SourceLoader::list_rs_files(from)? {
            let Some(file_name) = source.file_name().map(PathBuf::from) else {
                continue;
            };
            let name = file_name.to_string_lossy().into_owned();

            if module_name(&name).is_none() {
                warn!("{}: not copied, its name is not a valid module name", source.display());
                continue;
            }
            if CRATE_ROOTS.contains(&name.as_str()) && file_name != keep {
                debug!("{}: not copied, crate root", source.display());
                continue;
            }

            let copy = PathBuf::from(copied_name(&name));
            let target = self.src_dir().join(&copy);
            fs::copy(&source, &target).with_context(|| {
                format!("error copying {} to {}", source.display(), target.display())
            })?;
            debug!("Copied {} -> {}", source.display(), target.display());
            copied.push(copy);
        }
        info!("Copied {} source file(s) from {}", copied.len(), from.display());
        Ok(copied)
    }

    /// Rename copied `*<from_suffix>` files to `*<to_suffix>`. Returns (old, new) names.
    pub fn rename_test_files(&self, from_suffix: &str, to_suffix: &str) -> Result<Vec<(PathBuf, PathBuf)>> {
        let mut renamed = Vec::new();
        for path in self.module_files()? {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let Some(new_name) = renamed_file(&name, from_suffix, to_suffix) else {
                continue;
            };
            let to = self.src_dir().join(&new_name);
            if to.exists() {
                bail!("renaming {} to {}: target already exists", path.display(), to.display());
            }
            fs::rename(&path, &to)
                .with_context(|| format!("renaming {} to {}", path.display(), to.display()))?;
            renamed.push((PathBuf::from(name), PathBuf::from(new_name)));
        }
        Ok(renamed)
    }

    /// Write `src/main.rs`.
    pub fn write_entry_point(&self, entry: &EntryPoint) -> Result<PathBuf> {
        let path = self.entry_point_path();
        fs::write(&path, entry.render())
            .with_context(|| format!("Could not write entry point {}", path.display()))?;
        Ok(path)
    }
}

/// Name of the copy of `name` in the scratch crate: `lib.rs` -> `lib_root.rs`,
/// anything else unchanged.
pub fn copied_name(name: &str) -> String {
    match name.strip_suffix(".rs") {
        Some(stem) if CRATE_ROOTS.contains(&name) => format!("{}{}.rs", stem, ROOT_COPY_SUFFIX),
        _ => name.to_string(),
    }
}

/// `sum_test.rs` -> `sum_lifted.rs` for suffixes `_test.rs` / `_lifted.rs`.
pub fn renamed_file(name: &str, from_suffix: &str, to_suffix: &str) -> Option<String> {
    name.strip_suffix(from_suffix)
        .filter(|stem| !stem.is_empty())
        .map(|stem| format!("{}{}", stem, to_suffix))
}
