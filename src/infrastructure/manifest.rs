//! Scratch crate manifest.
//!
//! `cargo init` writes a bare `Cargo.toml`. The copied sources usually need the
//! dependencies (and dev-dependencies, since bench code lives in test code) of
//! the package they came from, so those are carried over here, plus the package
//! itself when it has a library target.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cargo_metadata::{DependencyKind, MetadataCommand};
use toml::{Table, Value};
use tracing::{debug, info};

/// One `[dependencies]` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    /// Name the dependency is used under (the rename, if any).
    pub key: String,
    /// Real package name when it differs from `key`.
    pub package: Option<String>,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub git: Option<String>,
    pub rev: Option<String>,
    pub features: Vec<String>,
    pub default_features: bool,
    /// `cfg(..)` expression or target triple of a platform-specific dependency.
    pub target: Option<String>,
}

impl DependencySpec {
    pub fn registry(key: &str, version: &str) -> Self {
        Self {
            key: key.to_string(),
            package: None,
            version: Some(version.to_string()),
            path: None,
            git: None,
            rev: None,
            features: Vec::new(),
            default_features: true,
            target: None,
        }
    }

    pub fn path_dependency(key: &str, path: &Path) -> Self {
        Self {
            version: None,
            path: Some(path.to_path_buf()),
            ..Self::registry(key, "*")
        }
    }

    /// Convert a resolved dependency from `cargo metadata`. Build dependencies
    /// are not needed by the copied sources and yield `None`.
    pub fn from_metadata(dep: &cargo_metadata::Dependency) -> Option<Self> {
        if matches!(dep.kind, DependencyKind::Build) {
            return None;
        }
        let (git, rev) = match dep.source.as_deref() {
            Some(source) if source.starts_with("git+") => {
                let (url, rev) = parse_git_source(source);
                (Some(url), rev)
            }
            _ => (None, None),
        };
        let version = dep.req.to_string();
        Some(Self {
            key: dep.rename.clone().unwrap_or_else(|| dep.name.clone()),
            package: dep.rename.as_ref().map(|_| dep.name.clone()),
            version: (version != "*").then_some(version),
            path: dep.path.as_ref().map(|p| p.clone().into_std_path_buf()),
            git,
            rev,
            features: dep.features.clone(),
            default_features: dep.uses_default_features,
            target: dep.target.as_ref().map(|t| t.to_string()),
        })
    }

    pub fn to_toml(&self) -> Value {
        let plain = self.package.is_none()
            && self.path.is_none()
            && self.git.is_none()
            && self.features.is_empty()
            && self.default_features;
        if let (true, Some(version)) = (plain, &self.version) {
            return Value::String(version.clone());
        }

        let mut table = Table::new();
        if let Some(package) = &self.package {
            table.insert("package".into(), Value::String(package.clone()));
        }
        if let Some(version) = &self.version {
            table.insert("version".into(), Value::String(version.clone()));
        }
        if let Some(path) = &self.path {
            table.insert("path".into(), Value::String(path.display().to_string()));
        }
        if let Some(git) = &self.git {
            table.insert("git".into(), Value::String(git.clone()));
        }
        if let Some(rev) = &self.rev {
            table.insert("rev".into(), Value::String(rev.clone()));
        }
        if !self.features.is_empty() {
            let features = self.features.iter().cloned().map(Value::String).collect();
            table.insert("features".into(), Value::Array(features));
        }
        if !self.default_features {
            table.insert("default-features".into(), Value::Boolean(false));
        }
        Value::Table(table)
    }
}

/// `git+https://host/repo?branch=main#sha` -> (`https://host/repo`, `sha`)
pub fn parse_git_source(source: &str) -> (String, Option<String>) {
    let source = source.strip_prefix("git+").unwrap_or(source);
    let (location, rev) = match source.split_once('#') {
        Some((location, rev)) => (location, Some(rev.to_string())),
        None => (source, None),
    };
    let url = location.split('?').next().unwrap_or(location);
    (url.to_string(), rev)
}

/// Add `deps` that are not already present. Returns how many were added.
pub fn merge_dependencies(manifest: &mut Table, deps: &[DependencySpec]) -> usize {
    let mut added = 0;
    for dep in deps {
        let section = match &dep.target {
            None => section_mut(manifest, &["dependencies"]),
            Some(target) => section_mut(manifest, &["target", target, "dependencies"]),
        };
        if !section.contains_key(&dep.key) {
            section.insert(dep.key.clone(), dep.to_toml());
            added += 1;
        }
    }
    added
}

/// Keep symbols in the release build so profilers can attribute samples.
pub fn enable_release_debuginfo(manifest: &mut Table) {
    section_mut(manifest, &["profile", "release"]).insert("debug".into(), Value::Boolean(true));
}

/// Rewrite the manifest at `path` with `deps` and release debuginfo.
pub fn patch_manifest(path: &Path, deps: &[DependencySpec]) -> Result<()> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    let mut manifest: Table = text
        .parse()
        .with_context(|| format!("Invalid manifest {}", path.display()))?;

    let added = merge_dependencies(&mut manifest, deps);
    enable_release_debuginfo(&mut manifest);

    let rendered = toml::to_string(&manifest).context("Failed to serialize manifest")?;
    fs::write(path, rendered)
        .with_context(|| format!("Failed to write manifest {}", path.display()))?;
    info!(added, manifest = %path.display(), "carried over dependencies");
    Ok(())
}

/// Dependencies of the package that owns `source_dir`, resolved through
/// `cargo metadata` (so workspace-inherited entries come out concrete).
pub fn load_package_dependencies(source_dir: &Path) -> Result<Vec<DependencySpec>> {
    let source_dir = source_dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", source_dir.display()))?;
    let Some(manifest) = find_manifest(&source_dir) else {
        debug!(dir = %source_dir.display(), "no Cargo.toml above source directory");
        return Ok(Vec::new());
    };

    let metadata = MetadataCommand::new()
        .manifest_path(&manifest)
        .no_deps()
        .exec()
        .context("Failed to execute cargo metadata")?;

    let owner = metadata
        .packages
        .iter()
        .filter(|p| {
            p.manifest_path
                .parent()
                .is_some_and(|dir| source_dir.starts_with(dir.as_std_path()))
        })
        .max_by_key(|p| p.manifest_path.as_str().len());
    let Some(package) = owner else {
        debug!(manifest = %manifest.display(), "source directory is not inside a package");
        return Ok(Vec::new());
    };

    let mut deps: Vec<DependencySpec> = package
        .dependencies
        .iter()
        .filter_map(DependencySpec::from_metadata)
        .collect();

    let has_lib = package
        .targets
        .iter()
        .any(|t| t.kind.iter().any(|k| k == "lib" || k == "rlib"));
    if let (true, Some(dir)) = (has_lib, package.manifest_path.parent()) {
        deps.push(DependencySpec::path_dependency(&package.name, dir.as_std_path()));
    }

    info!(package = %package.name, count = deps.len(), "found package dependencies");
    Ok(deps)
}

/// Nearest `Cargo.toml` at or above `dir`.
pub fn find_manifest(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .map(|ancestor| ancestor.join("Cargo.toml"))
        .find(|candidate| candidate.is_file())
}

fn section_mut<'a>(table: &'a mut Table, path: &[&str]) -> &'a mut Table {
    let Some((head, rest)) = path.split_first() else {
        return table;
    };
    let entry = table
        .entry(head.to_string())
        .or_insert_with(|| Value::Table(Table::new()));
    if !entry.is_table() {
        *entry = Value::Table(Table::new());
    }
    match entry {
        Value::Table(inner) => section_mut(inner, rest),
        _ => unreachable!("entry was just made a table"),
    }
}
