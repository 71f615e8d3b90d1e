//! Domain errors raised while selecting and lifting a benchmark function.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LiftError {
    #[error(
        "could not find any bench function in {} matching {pattern}{}",
        .dir.display(),
        skipped_note(.unparsed)
    )]
    NoMatch {
        pattern: String,
        dir: PathBuf,
        /// Files that were skipped because they failed to parse.
        unparsed: Vec<PathBuf>,
    },

    #[error(
        "there should be only one matching function in {} for {pattern}, but found {}: {}",
        .dir.display(),
        .matches.len(),
        .matches.join(", ")
    )]
    AmbiguousMatch {
        pattern: String,
        dir: PathBuf,
        matches: Vec<String>,
    },

    #[error("function {name} is expected to have exactly one parameter, but got {found}")]
    ParameterCount { name: String, found: usize },

    #[error("the parameter of {name} must be a plain identifier such as `b: &mut Bencher`")]
    UnsupportedParameter { name: String },

    #[error("{name} still references its harness parameter after rewriting (lines {})", join_lines(.lines))]
    ResidualReferences { name: String, lines: Vec<usize> },

    #[error("could not find {name} in {} after the files have been copied", .file.display())]
    DeclarationVanished { name: String, file: PathBuf },
}

fn skipped_note(unparsed: &[PathBuf]) -> String {
    if unparsed.is_empty() {
        return String::new();
    }
    let names: Vec<String> = unparsed.iter().map(|p| p.display().to_string()).collect();
    format!(" ({} file(s) could not be parsed: {})", names.len(), names.join(", "))
}

fn join_lines(lines: &[usize]) -> String {
    lines
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
