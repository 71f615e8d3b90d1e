//! Candidate selection over parsed source files.

use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use syn::{Item, ItemFn};

use crate::domain::error::LiftError;

/// Where a candidate bench function lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FnLocation {
    /// File name relative to the searched directory.
    pub file: PathBuf,
    /// Inline modules enclosing the function, outermost first.
    pub module_path: Vec<String>,
    pub name: String,
}

impl FnLocation {
    /// `outer::inner::bench_name`, relative to the file.
    pub fn qualified_name(&self) -> String {
        let mut parts = self.module_path.clone();
        parts.push(self.name.clone());
        parts.join("::")
    }
}

impl fmt::Display for FnLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.qualified_name(), self.file.display())
    }
}

/// Collect every function named `<prefix>*` that matches `pattern`, recursing
/// into inline modules.
pub fn collect_candidates(
    file: &Path,
    items: &[Item],
    prefix: &str,
    pattern: &Regex,
    module_path: &mut Vec<String>,
    out: &mut Vec<FnLocation>,
) {
    for item in items {
        match item {
            Item::Fn(func) => {
                let name = func.sig.ident.to_string();
                if name.starts_with(prefix) && pattern.is_match(&name) {
                    out.push(FnLocation {
                        file: file.to_path_buf(),
                        module_path: module_path.clone(),
                        name,
                    });
                }
            }
            Item::Mod(module) => {
                if let Some((_, content)) = &module.content {
                    module_path.push(module.ident.to_string());
                    collect_candidates(file, content, prefix, pattern, module_path, out);
                    module_path.pop();
                }
            }
            _ => {}
        }
    }
}

/// Exactly one candidate, or a selection error.
pub fn select_single(
    mut candidates: Vec<FnLocation>,
    pattern: &Regex,
    dir: &Path,
    unparsed: Vec<PathBuf>,
) -> Result<FnLocation, LiftError> {
    match candidates.len() {
        0 => Err(LiftError::NoMatch {
            pattern: pattern.as_str().to_string(),
            dir: dir.to_path_buf(),
            unparsed,
        }),
        1 => Ok(candidates.remove(0)),
        _ => Err(LiftError::AmbiguousMatch {
            pattern: pattern.as_str().to_string(),
            dir: dir.to_path_buf(),
            matches: candidates.iter().map(|c| c.to_string()).collect(),
        }),
    }
}

/// Find the function at `module_path::name` among `items`.
pub fn find_function_mut<'a>(
    items: &'a mut [Item],
    module_path: &[String],
    name: &str,
) -> Option<&'a mut ItemFn> {
    match module_path.split_first() {
        None => items.iter_mut().find_map(|item| match item {
            Item::Fn(func) if func.sig.ident == name => Some(func),
            _ => None,
        }),
        Some((head, rest)) => items.iter_mut().find_map(|item| match item {
            Item::Mod(module) if module.ident == head.as_str() => module
                .content
                .as_mut()
                .and_then(|(_, content)| find_function_mut(content, rest, name)),
            _ => None,
        }),
    }
}
