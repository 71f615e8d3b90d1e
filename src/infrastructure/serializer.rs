//! Renders rewritten syntax trees back to Rust source.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use syn::{File, Item, ItemFn};

pub fn render_file(file: &File) -> String {
    prettyplease::unparse(file)
}

/// Source of a single function, as it would appear at file level.
pub fn render_function(func: &ItemFn) -> String {
    render_file(&File {
        shebang: None,
        attrs: Vec::new(),
        items: vec![Item::Fn(func.clone())],
    })
}

/// Overwrite `path` with the rendered `file`.
pub fn write_file(path: &Path, file: &File) -> Result<()> {
    fs::write(path, render_file(file))
        .with_context(|| format!("Could not write rewritten source to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_function_is_reparsable() {
        let func: ItemFn = syn::parse_str("#[inline(never)] pub fn bench_x() { { total += x } }").unwrap();
        let text = render_function(&func);
        assert!(text.starts_with("#[inline(never)]"));
        assert!(syn::parse_file(&text).is_ok());
    }

    #[test]
    fn test_write_file_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.rs");
        fs::write(&path, "old contents").unwrap();
        let file = syn::parse_file("fn f() {}").unwrap();
        write_file(&path, &file).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "fn f() {}");
    }
}
