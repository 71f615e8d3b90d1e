//! Declaration editing.
//!
//! Once the body no longer mentions the harness, the signature drops the
//! parameter and the function is marked `#[inline(never)]` so the optimizer
//! keeps it as a distinct routine in the built binary.

use syn::punctuated::Punctuated;
use syn::{parse_quote, Attribute, File, Item, ItemFn, ItemMod, Visibility};

use crate::domain::error::LiftError;
use crate::domain::symbols::resolve_function;

/// Attributes that tie a function to a test or bench harness.
const HARNESS_MARKERS: &[&str] = &["bench", "test"];

/// Drop the harness parameter and mark the function `#[inline(never)]`.
///
/// Fails with [`LiftError::ResidualReferences`] if the body still refers to the
/// parameter, so no source that cannot compile is ever written.
pub fn finish_declaration(func: &mut ItemFn) -> Result<(), LiftError> {
    let resolution = resolve_function(func)?;
    let mut lines: Vec<usize> = resolution
        .table
        .occurrences_of(resolution.harness)
        .iter()
        .map(|occ| occ.line)
        .collect();
    if !lines.is_empty() {
        lines.dedup();
        return Err(LiftError::ResidualReferences {
            name: func.sig.ident.to_string(),
            lines,
        });
    }

    func.sig.inputs = Punctuated::new();

    func.attrs
        .retain(|attr| !is_harness_marker(attr) && !attr.path().is_ident("inline"));
    func.attrs.insert(0, parse_quote!(#[inline(never)]));
    func.vis = parse_quote!(pub);
    Ok(())
}

/// Make the inline modules on `module_path` reachable from an ordinary build:
/// `pub`, and without `#[cfg(test)]`. A file-level `#![cfg(test)]` goes too.
pub fn expose_module_path(file: &mut File, module_path: &[String]) {
    file.attrs.retain(|attr| !is_cfg_test(attr));
    open_path(&mut file.items, module_path);
}

/// Remove out-of-line `mod name;` declarations. A crate root copied next to its
/// own modules would otherwise declare them a second time.
pub fn detach_file_modules(file: &mut File) -> usize {
    let before = file.items.len();
    file.items
        .retain(|item| !matches!(item, Item::Mod(module) if module.content.is_none()));
    before - file.items.len()
}

fn open_path(items: &mut [Item], module_path: &[String]) {
    let Some((head, rest)) = module_path.split_first() else {
        return;
    };
    for item in items.iter_mut() {
        if let Item::Mod(module) = item {
            if module.ident == head.as_str() {
                open_module(module);
                if let Some((_, content)) = &mut module.content {
                    open_path(content, rest);
                }
                return;
            }
        }
    }
}

fn open_module(module: &mut ItemMod) {
    module.attrs.retain(|attr| !is_cfg_test(attr));
    module.vis = Visibility::Public(Default::default());
}

fn is_harness_marker(attr: &Attribute) -> bool {
    HARNESS_MARKERS.iter().any(|marker| attr.path().is_ident(marker))
}

fn is_cfg_test(attr: &Attribute) -> bool {
    attr.path().is_ident("cfg")
        && attr
            .parse_args::<syn::Ident>()
            .map(|ident| ident == "test")
            .unwrap_or(false)
}
