// Application layer: the lift usecase, wired through the toolchain port.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::config::LiftConfig;
use crate::domain::declaration::detach_file_modules;
use crate::domain::entry_point::{module_name, EntryPoint};
use crate::domain::lift::lift_in_file;
use crate::domain::rewrite::RewriteReport;
use crate::domain::selection::{find_function_mut, select_single, FnLocation};
use crate::infrastructure::manifest::patch_manifest;
use crate::infrastructure::serializer;
use crate::infrastructure::source_loader::SourceLoader;
use crate::infrastructure::workspace::{copied_name, ScratchWorkspace, CRATE_ROOTS};
use crate::ports::{BuildStep, Toolchain};

/// What a run produced.
#[derive(Debug)]
pub struct LiftOutcome {
    pub location: FnLocation,
    pub report: RewriteReport,
    /// Rendered source of the lifted function.
    pub lifted_source: String,
    /// Where the binary was copied to; `None` on a dry run.
    pub binary: Option<PathBuf>,
    /// Scratch directory left on disk, if it was kept.
    pub scratch_dir: Option<PathBuf>,
}

pub struct LiftUsecase<'a> {
    pub toolchain: &'a dyn Toolchain,
    pub config: &'a LiftConfig,
}

impl<'a> LiftUsecase<'a> {
    pub fn run(&self) -> Result<LiftOutcome> {
        let config = self.config;

        // 1. selection
        let discovery =
            SourceLoader::discover(&config.source_dir, &config.prefix, &config.pattern)?;
        let location = select_single(
            discovery.candidates,
            &config.pattern,
            &config.source_dir,
            discovery.unparsed,
        )?;

        // 2. shape check and rewrite in memory, before anything is written
        let (report, lifted_source) = self.preflight(&location)?;
        if config.dry_run {
            return Ok(LiftOutcome {
                location,
                report,
                lifted_source,
                binary: None,
                scratch_dir: None,
            });
        }

        // 3. scratch crate
        let workspace = ScratchWorkspace::create(&config.scratch_prefix, config.keep_scratch)?;
        workspace.copy_sources(&config.source_dir, &location.file)?;
        let copy = PathBuf::from(copied_name(&location.file.to_string_lossy()));
        self.rewrite_copy(&workspace, &location, &copy)?;

        let renamed = workspace.rename_test_files(&config.test_suffix, &config.lifted_suffix)?;
        let lifted_file = renamed
            .iter()
            .find(|(old, _)| *old == copy)
            .map(|(_, new)| new.clone())
            .unwrap_or(copy);

        let entry = self.entry_point(&workspace, &lifted_file, &location)?;
        let main_rs = workspace.write_entry_point(&entry)?;
        info!("Generated entry point {} calling {}", main_rs.display(), entry.call_path());

        // 4. build
        let binary = self.build(&workspace)?;
        info!("Benchmark binary ready at {}", binary.display());

        let scratch_dir = workspace.is_kept().then(|| workspace.root().to_path_buf());
        Ok(LiftOutcome {
            location,
            report,
            lifted_source,
            binary: Some(binary),
            scratch_dir,
        })
    }

    /// Lift the candidate from the original file without touching the disk.
    fn preflight(&self, location: &FnLocation) -> Result<(RewriteReport, String)> {
        let path = self.config.source_dir.join(&location.file);
        if module_name(&location.file.to_string_lossy()).is_none() {
            return Err(anyhow!(
                "{} cannot be declared as a module of the generated crate",
                path.display()
            ));
        }

        let mut file = SourceLoader::parse(&path)?;
        let report = lift_in_file(&mut file, location, &path)?;
        let func = find_function_mut(&mut file.items, &location.module_path, &location.name)
            .ok_or_else(|| anyhow!("{} disappeared after rewriting", location))?;
        Ok((report, serializer::render_function(func)))
    }

    /// Re-parse the copied file, lift the candidate and write it back.
    fn rewrite_copy(
        &self,
        workspace: &ScratchWorkspace,
        location: &FnLocation,
        copy: &Path,
    ) -> Result<()> {
        let path = workspace.src_dir().join(copy);
        let mut file = SourceLoader::parse(&path)?;
        lift_in_file(&mut file, location, &path)?;

        if is_crate_root(&location.file) {
            let detached = detach_file_modules(&mut file);
            info!("Detached {} module declaration(s) from {}", detached, path.display());
        }
        serializer::write_file(&path, &file)
    }

    fn entry_point(
        &self,
        workspace: &ScratchWorkspace,
        lifted_file: &Path,
        location: &FnLocation,
    ) -> Result<EntryPoint> {
        let modules = workspace
            .module_files()?
            .iter()
            .filter_map(|path| path.file_name())
            .filter_map(|name| module_name(&name.to_string_lossy()))
            .collect();
        let file_module = module_name(&lifted_file.to_string_lossy())
            .with_context(|| format!("{} is not a valid module name", lifted_file.display()))?;

        Ok(EntryPoint {
            modules,
            file_module,
            module_path: location.module_path.clone(),
            function: location.name.clone(),
        })
    }

    /// init, manifest, fetch, build, then copy the artifact out.
    fn build(&self, workspace: &ScratchWorkspace) -> Result<PathBuf> {
        let dir = workspace.root();
        let package = workspace.package_name();

        self.toolchain.run(&BuildStep::Init { package: package.clone() }, dir)?;
        let deps = self.toolchain.package_dependencies(&self.config.source_dir)?;
        patch_manifest(&workspace.manifest_path(), &deps)?;
        self.toolchain.run(&BuildStep::Fetch, dir)?;
        self.toolchain.run(&BuildStep::Build, dir)?;

        let artifact = self.toolchain.artifact_path(dir, &package);
        let output = &self.config.output;
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
        fs::copy(&artifact, output).with_context(|| {
            format!("error copying {} to {}", artifact.display(), output.display())
        })?;
        Ok(output.clone())
    }
}

fn is_crate_root(file: &Path) -> bool {
    file.file_name()
        .is_some_and(|name| CRATE_ROOTS.iter().any(|root| name == *root))
}
