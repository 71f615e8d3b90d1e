//! Entry Point Generation
//!
//! Renders the `main.rs` of the scratch crate. Every copied source file is
//! declared as a top-level module, so `crate::sibling` paths in the copied code
//! resolve as they did in the original package, and `main` calls the lifted
//! function once with no arguments.

/// The generated program's entry point.
#[derive(Debug, Clone)]
pub struct EntryPoint {
    /// Module names of all copied files, in declaration order.
    pub modules: Vec<String>,
    /// Module of the file holding the lifted function.
    pub file_module: String,
    /// Inline modules between that file and the function.
    pub module_path: Vec<String>,
    /// Name of the lifted function.
    pub function: String,
}

impl EntryPoint {
    /// `<file>::<modules>::<function>`
    pub fn call_path(&self) -> String {
        let mut parts = vec![self.file_module.clone()];
        parts.extend(self.module_path.iter().cloned());
        parts.push(self.function.clone());
        parts.join("::")
    }

    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        lines.push("// Generated by benchlift. Runs the lifted benchmark once.".to_string());
        lines.push("#![allow(unused)]".to_string());
        lines.push(String::new());
        for module in &self.modules {
            lines.push(format!("mod {};", module));
        }
        lines.push(String::new());
        lines.push("fn main() {".to_string());
        lines.push(format!("    {}();", self.call_path()));
        lines.push("}".to_string());
        lines.push(String::new());
        lines.join("\n")
    }
}

/// Module name for a source file, if it can be declared with `mod`.
///
/// `mod.rs`, `my-file.rs` and other stems that are not plain identifiers
/// cannot.
pub fn module_name(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(".rs")?;
    syn::parse_str::<syn::Ident>(stem)
        .ok()
        .map(|ident| ident.to_string())
        .filter(|name| !name.starts_with("r#"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EntryPoint {
        EntryPoint {
            modules: vec!["helpers".to_string(), "sum_lifted".to_string()],
            file_module: "sum_lifted".to_string(),
            module_path: vec!["benches".to_string()],
            function: "bench_sum".to_string(),
        }
    }

    #[test]
    fn test_call_path() {
        assert_eq!(sample().call_path(), "sum_lifted::benches::bench_sum");
    }

    #[test]
    fn test_render_parses_as_rust() {
        let source = sample().render();
        assert!(source.contains("\nmod helpers;\n"));
        assert!(source.contains("\nmod sum_lifted;\n"));
        assert!(source.contains("    sum_lifted::benches::bench_sum();"));

        let file = syn::parse_file(&source).expect("generated main.rs should parse");
        assert_eq!(file.items.len(), 3);
    }

    #[test]
    fn test_module_name() {
        assert_eq!(module_name("sum_test.rs").as_deref(), Some("sum_test"));
        assert_eq!(module_name("main.rs").as_deref(), Some("main"));
        assert_eq!(module_name("mod.rs"), None);
        assert_eq!(module_name("my-file.rs"), None);
        assert_eq!(module_name("2d.rs"), None);
        assert_eq!(module_name("notes.txt"), None);
    }
}
