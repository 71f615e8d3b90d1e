//! Syntax-level core: symbol resolution, the harness rewrite, declaration
//! editing, candidate selection and entry-point generation.

pub mod declaration;
pub mod entry_point;
pub mod error;
pub mod lift;
pub mod rewrite;
pub mod selection;
pub mod symbols;
