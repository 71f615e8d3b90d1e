use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{info, warn};

use crate::domain::selection::{collect_candidates, FnLocation};

/// Candidates found in a directory, plus the files that could not be parsed.
#[derive(Debug, Default)]
pub struct Discovery {
    pub candidates: Vec<FnLocation>,
    pub unparsed: Vec<PathBuf>,
}

pub struct SourceLoader;

impl SourceLoader {
    /// The `.rs` files directly inside `dir`, sorted by name.
    pub fn list_rs_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Could not read source directory {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "rs") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Find every `<prefix>*` function matching `pattern` in the files of `dir`.
    ///
    /// A file that fails to parse is skipped and recorded, not fatal.
    pub fn discover(dir: &Path, prefix: &str, pattern: &Regex) -> Result<Discovery> {
        let mut discovery = Discovery::default();

        for path in Self::list_rs_files(dir)? {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read file {}", path.display()))?;
            let ast = match syn::parse_file(&content) {
                Ok(ast) => ast,
                Err(e) => {
                    warn!("{}: ignored file because it could not be parsed: {}", path.display(), e);
                    discovery.unparsed.push(path);
                    continue;
                }
            };

            let relative = path.file_name().map(PathBuf::from).unwrap_or_else(|| path.clone());
            let before = discovery.candidates.len();
            collect_candidates(&relative, &ast.items, prefix, pattern, &mut Vec::new(), &mut discovery.candidates);
            for found in &discovery.candidates[before..] {
                info!("Found matching function: {}", found);
            }
        }

        Ok(discovery)
    }

    /// Read and parse one source file.
    pub fn parse(path: &Path) -> Result<syn::File> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file {}", path.display()))?;
        syn::parse_file(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }
}
