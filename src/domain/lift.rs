//! The lift pipeline for one function: resolve, rewrite, finish.

use std::path::Path;

use syn::{File, ItemFn};
use tracing::info;

use crate::domain::declaration::{expose_module_path, finish_declaration};
use crate::domain::error::LiftError;
use crate::domain::rewrite::{remove_harness_references, RewriteReport};
use crate::domain::selection::{find_function_mut, FnLocation};
use crate::domain::symbols::resolve_function;

/// Turn `func` into a zero-argument, non-inlined routine.
pub fn lift_function(func: &mut ItemFn) -> Result<RewriteReport, LiftError> {
    let resolution = resolve_function(func)?;
    let report =
        remove_harness_references(&mut func.block, &resolution.table, resolution.harness);
    finish_declaration(func)?;

    info!(
        function = %func.sig.ident,
        removed = report.removed(),
        hoisted = report.hoisted(),
        "lifted benchmark function"
    );
    Ok(report)
}

/// Lift the function at `location` inside a parsed file and open up the
/// modules around it.
pub fn lift_in_file(
    file: &mut File,
    location: &FnLocation,
    path: &Path,
) -> Result<RewriteReport, LiftError> {
    let func = find_function_mut(&mut file.items, &location.module_path, &location.name)
        .ok_or_else(|| LiftError::DeclarationVanished {
            name: location.qualified_name(),
            file: path.to_path_buf(),
        })?;
    let report = lift_function(func)?;
    expose_module_path(file, &location.module_path);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_lift_in_file_reports_missing_declaration() {
        let mut file = syn::parse_file("fn bench_other(h: &mut Harness) {}").unwrap();
        let location = FnLocation {
            file: PathBuf::from("a_test.rs"),
            module_path: vec![],
            name: "bench_gone".to_string(),
        };
        let err = lift_in_file(&mut file, &location, Path::new("/tmp/a_test.rs")).unwrap_err();
        assert!(matches!(err, LiftError::DeclarationVanished { .. }));
    }

    #[test]
    fn test_shape_error_leaves_function_untouched() {
        let mut func: ItemFn = syn::parse_str("fn bench_x(a: u8, b: u8) { a.count_ones(); }").unwrap();
        let err = lift_function(&mut func).unwrap_err();
        assert!(matches!(err, LiftError::ParameterCount { found: 2, .. }));
        assert_eq!(func.sig.inputs.len(), 2);
        assert_eq!(func.block.stmts.len(), 1);
    }
}
