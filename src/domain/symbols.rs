//! Symbol Resolution
//!
//! Gives every binding introduced inside one function (its parameter, `let`
//! patterns, closure inputs, `for`/`match`/`if let` patterns) a [`SymbolId`]
//! and records, for every identifier occurrence in the body, which binding it
//! names. Occurrences are keyed by source position, so two identifiers with the
//! same text in different scopes resolve to different symbols.

use std::collections::HashMap;

use proc_macro2::{Delimiter, Literal, Spacing, TokenStream, TokenTree};
use syn::visit::{self, Visit};
use syn::{
    Arm, Block, ExprClosure, ExprForLoop, ExprIf, ExprLet, ExprPath, ExprWhile, FnArg, Ident,
    Item, ItemFn, LitStr, Local, Macro, MacroDelimiter, Pat,
};

use crate::domain::error::LiftError;

/// Stable identity of a declared binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Parameter,
    Local,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    pub declared_at: Occurrence,
}

/// Source position of an identifier (1-based line, 0-based column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Occurrence {
    pub line: usize,
    pub column: usize,
}

impl Occurrence {
    pub fn of(ident: &Ident) -> Self {
        let start = ident.span().start();
        Self {
            line: start.line,
            column: start.column,
        }
    }
}

/// Occurrence -> symbol map for one function body.
#[derive(Debug, Default)]
pub struct BindingTable {
    symbols: Vec<Symbol>,
    bindings: HashMap<Occurrence, SymbolId>,
}

impl BindingTable {
    /// Symbol named by this identifier occurrence, if it names a binding of the function.
    pub fn resolve(&self, ident: &Ident) -> Option<SymbolId> {
        self.bindings.get(&Occurrence::of(ident)).copied()
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// All occurrences bound to `id`, in source order.
    pub fn occurrences_of(&self, id: SymbolId) -> Vec<Occurrence> {
        let mut found: Vec<Occurrence> = self
            .bindings
            .iter()
            .filter(|(_, sym)| **sym == id)
            .map(|(occ, _)| *occ)
            .collect();
        found.sort();
        found
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Result of resolving a candidate function.
#[derive(Debug)]
pub struct Resolution {
    pub table: BindingTable,
    /// Symbol of the single (harness) parameter.
    pub harness: SymbolId,
}

/// The identifier bound by the function's single parameter.
///
/// Rejects functions that do not take exactly one parameter, and parameters
/// that are a receiver or a destructuring/wildcard pattern.
pub fn harness_ident(func: &ItemFn) -> Result<&Ident, LiftError> {
    let name = func.sig.ident.to_string();
    let inputs = &func.sig.inputs;
    if inputs.len() != 1 {
        return Err(LiftError::ParameterCount {
            name,
            found: inputs.len(),
        });
    }
    match inputs.first() {
        Some(FnArg::Typed(typed)) => match &*typed.pat {
            Pat::Ident(pat) if pat.subpat.is_none() => Ok(&pat.ident),
            _ => Err(LiftError::UnsupportedParameter { name }),
        },
        _ => Err(LiftError::UnsupportedParameter { name }),
    }
}

/// Resolve every identifier occurrence in `func`'s body.
pub fn resolve_function(func: &ItemFn) -> Result<Resolution, LiftError> {
    let param = harness_ident(func)?;

    let mut resolver = Resolver::default();
    resolver.push_scope();
    let harness = resolver.declare(param, SymbolKind::Parameter);
    resolver.visit_block(&func.block);
    resolver.pop_scope();

    Ok(Resolution {
        table: resolver.table,
        harness,
    })
}

/// The identifier of a bare single-segment path expression (`h`, not `a::h` or `h::<T>`).
pub fn path_ident(path: &ExprPath) -> Option<&Ident> {
    if path.qself.is_some() {
        return None;
    }
    path.path.get_ident()
}

#[derive(Default)]
struct Resolver {
    table: BindingTable,
    scopes: Vec<HashMap<String, SymbolId>>,
}

impl Resolver {
    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, ident: &Ident, kind: SymbolKind) -> SymbolId {
        let id = SymbolId(self.table.symbols.len() as u32);
        let name = ident.to_string();
        self.table.symbols.push(Symbol {
            id,
            name: name.clone(),
            kind,
            declared_at: Occurrence::of(ident),
        });
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, id);
        }
        id
    }

    fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    fn record(&mut self, ident: &Ident) {
        if let Some(id) = self.lookup(&ident.to_string()) {
            self.table.bindings.insert(Occurrence::of(ident), id);
        }
    }

    /// Declare every identifier a pattern binds in the current scope.
    fn bind_pat(&mut self, pat: &Pat) {
        match pat {
            Pat::Ident(p) => {
                self.declare(&p.ident, SymbolKind::Local);
                if let Some((_, sub)) = &p.subpat {
                    self.bind_pat(sub);
                }
            }
            // Every alternative binds the same names.
            Pat::Or(p) => {
                if let Some(first) = p.cases.first() {
                    self.bind_pat(first);
                }
            }
            Pat::Paren(p) => self.bind_pat(&p.pat),
            Pat::Reference(p) => self.bind_pat(&p.pat),
            Pat::Type(p) => self.bind_pat(&p.pat),
            Pat::Slice(p) => p.elems.iter().for_each(|e| self.bind_pat(e)),
            Pat::Tuple(p) => p.elems.iter().for_each(|e| self.bind_pat(e)),
            Pat::TupleStruct(p) => p.elems.iter().for_each(|e| self.bind_pat(e)),
            Pat::Struct(p) => p.fields.iter().for_each(|f| self.bind_pat(&f.pat)),
            _ => {}
        }
    }

    /// Macro bodies are plain tokens; resolve identifiers by name at the call site.
    ///
    /// Field and method names (`x.h`), path segments (`Kind::h`) and field
    /// labels of struct literals (`Config { h: 1 }`) are not references.
    /// Identifiers captured by format strings (`"{h:?}"`) are.
    fn scan_tokens(&mut self, tokens: TokenStream, in_braces: bool) {
        let trees: Vec<TokenTree> = tokens.into_iter().collect();
        for (i, tree) in trees.iter().enumerate() {
            match tree {
                TokenTree::Group(group) => {
                    self.scan_tokens(group.stream(), group.delimiter() == Delimiter::Brace)
                }
                TokenTree::Ident(ident) => {
                    let qualified = follows_member_or_path(&trees[..i]);
                    let label = in_braces && precedes_single_colon(&trees[i + 1..]);
                    if !qualified && !label {
                        self.record(ident);
                    }
                }
                TokenTree::Literal(literal) => self.record_format_captures(literal),
                TokenTree::Punct(_) => {}
            }
        }
    }

    fn record_format_captures(&mut self, literal: &Literal) {
        let raw = literal.to_string();
        if syn::parse_str::<LitStr>(&raw).is_err() {
            return;
        }
        let start = literal.span().start();
        for (offset, name) in format_captures(&raw) {
            let Some(id) = self.lookup(name) else {
                continue;
            };
            let before = &raw[..offset];
            let occurrence = match before.rfind('\n') {
                Some(newline) => Occurrence {
                    line: start.line + before.matches('\n').count(),
                    column: before[newline + 1..].chars().count(),
                },
                None => Occurrence {
                    line: start.line,
                    column: start.column + before.chars().count(),
                },
            };
            self.table.bindings.insert(occurrence, id);
        }
    }
}

/// `x.h` or `a::h`; a range `0..h` does not count.
fn follows_member_or_path(before: &[TokenTree]) -> bool {
    match before {
        [.., TokenTree::Punct(a), TokenTree::Punct(b)] if b.as_char() == '.' => {
            a.as_char() != '.' || a.spacing() != Spacing::Joint
        }
        [.., TokenTree::Punct(a), TokenTree::Punct(b)] if b.as_char() == ':' => {
            a.as_char() == ':' && a.spacing() == Spacing::Joint
        }
        [.., TokenTree::Punct(p)] => p.as_char() == '.',
        _ => false,
    }
}

/// Next token is a lone `:` (a label), not the start of `::`.
fn precedes_single_colon(after: &[TokenTree]) -> bool {
    matches!(after.first(), Some(TokenTree::Punct(p)) if p.as_char() == ':' && p.spacing() == Spacing::Alone)
}

/// Named arguments in a format string: `{h}`, `{h:?}`, and `width$` / `prec$`
/// inside a format spec. Returns byte offsets into `text`.
fn format_captures(text: &str) -> Vec<(usize, &str)> {
    let bytes = text.as_bytes();
    let mut captures = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => i += 2,
            b'{' => {
                let Some(len) = text[i..].find('}') else {
                    break;
                };
                let body = &text[i + 1..i + len];
                let (arg, spec) = body.split_once(':').unwrap_or((body, ""));
                let arg_start = i + 1 + (arg.len() - arg.trim_start().len());
                if is_identifier(arg.trim()) {
                    captures.push((arg_start, arg.trim()));
                }
                let spec_start = i + 1 + arg.len() + 1;
                for (pos, _) in spec.match_indices('$') {
                    let head = &spec[..pos];
                    let name_start = head
                        .char_indices()
                        .rev()
                        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
                        .map_or(0, |(p, c)| p + c.len_utf8());
                    if is_identifier(&head[name_start..]) {
                        captures.push((spec_start + name_start, &head[name_start..]));
                    }
                }
                i += len + 1;
            }
            _ => i += 1,
        }
    }
    captures
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
        && s != "_"
}

impl<'ast> Visit<'ast> for Resolver {
    fn visit_block(&mut self, block: &'ast Block) {
        self.push_scope();
        visit::visit_block(self, block);
        self.pop_scope();
    }

    fn visit_local(&mut self, local: &'ast Local) {
        if let Some(init) = &local.init {
            self.visit_expr(&init.expr);
            if let Some((_, diverge)) = &init.diverge {
                self.visit_expr(diverge);
            }
        }
        self.bind_pat(&local.pat);
    }

    fn visit_expr_closure(&mut self, closure: &'ast ExprClosure) {
        self.push_scope();
        for input in &closure.inputs {
            self.bind_pat(input);
        }
        self.visit_expr(&closure.body);
        self.pop_scope();
    }

    fn visit_expr_for_loop(&mut self, for_loop: &'ast ExprForLoop) {
        self.visit_expr(&for_loop.expr);
        self.push_scope();
        self.bind_pat(&for_loop.pat);
        self.visit_block(&for_loop.body);
        self.pop_scope();
    }

    fn visit_expr_if(&mut self, expr: &'ast ExprIf) {
        // `if let` bindings live for the condition rest and the then-branch only.
        self.push_scope();
        self.visit_expr(&expr.cond);
        self.visit_block(&expr.then_branch);
        self.pop_scope();
        if let Some((_, else_branch)) = &expr.else_branch {
            self.visit_expr(else_branch);
        }
    }

    fn visit_expr_while(&mut self, expr: &'ast ExprWhile) {
        self.push_scope();
        self.visit_expr(&expr.cond);
        self.visit_block(&expr.body);
        self.pop_scope();
    }

    fn visit_expr_let(&mut self, expr: &'ast ExprLet) {
        self.visit_expr(&expr.expr);
        self.bind_pat(&expr.pat);
    }

    fn visit_arm(&mut self, arm: &'ast Arm) {
        self.push_scope();
        self.bind_pat(&arm.pat);
        if let Some((_, guard)) = &arm.guard {
            self.visit_expr(guard);
        }
        self.visit_expr(&arm.body);
        self.pop_scope();
    }

    // Nested items cannot capture locals.
    fn visit_item(&mut self, _item: &'ast Item) {}

    fn visit_expr_path(&mut self, expr: &'ast ExprPath) {
        if let Some(ident) = path_ident(expr) {
            self.record(ident);
        }
    }

    fn visit_macro(&mut self, mac: &'ast Macro) {
        let braced = matches!(mac.delimiter, MacroDelimiter::Brace(_));
        self.scan_tokens(mac.tokens.clone(), braced);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> ItemFn {
        syn::parse_str(src).expect("test source should parse")
    }

    fn harness_lines(src: &str) -> Vec<usize> {
        let func = parse(src);
        let res = resolve_function(&func).unwrap();
        res.table
            .occurrences_of(res.harness)
            .iter()
            .map(|o| o.line)
            .collect()
    }

    #[test]
    fn test_parameter_is_resolved_in_body() {
        let lines = harness_lines(
            "fn bench_a(h: &mut Harness) {\n    h.start_timer();\n    let n = h.n;\n}",
        );
        assert_eq!(lines, vec![2, 3]);
    }

    #[test]
    fn test_let_shadows_parameter_from_that_point() {
        let lines = harness_lines(
            "fn bench_a(h: &mut Harness) {\n    h.reset_timer();\n    let h = 3;\n    h.pow(2);\n}",
        );
        assert_eq!(lines, vec![2]);
    }

    #[test]
    fn test_let_initializer_sees_outer_binding() {
        let lines = harness_lines("fn bench_a(h: &mut Harness) {\n    let h = h.n;\n    h;\n}");
        assert_eq!(lines, vec![2]);
    }

    #[test]
    fn test_shadowing_ends_with_block() {
        let lines = harness_lines(
            "fn bench_a(h: &mut Harness) {\n    {\n        let h = 1;\n        h;\n    }\n    h.stop_timer();\n}",
        );
        assert_eq!(lines, vec![6]);
    }

    #[test]
    fn test_closure_and_match_bindings_shadow() {
        let lines = harness_lines(
            "fn bench_a(h: &mut Harness) {\n    let f = |h: u32| h + 1;\n    match x {\n        Some(h) => h,\n        None => h.n,\n    };\n}",
        );
        assert_eq!(lines, vec![5]);
    }

    #[test]
    fn test_if_let_binding_does_not_reach_else() {
        let lines = harness_lines(
            "fn bench_a(h: &mut Harness) {\n    if let Some(h) = opt {\n        h;\n    } else {\n        h.stop_timer();\n    }\n}",
        );
        assert_eq!(lines, vec![5]);
    }

    #[test]
    fn test_nested_items_are_not_entered() {
        let lines = harness_lines(
            "fn bench_a(h: &mut Harness) {\n    fn helper(h: u32) -> u32 { h }\n    helper(1);\n}",
        );
        assert!(lines.is_empty());
    }

    #[test]
    fn test_macro_tokens_are_scanned() {
        let lines = harness_lines(
            "fn bench_a(h: &mut Harness) {\n    println!(\"{}\", h.n);\n    assert!(x.h > 0);\n}",
        );
        assert_eq!(lines, vec![2]);
    }

    #[test]
    fn test_format_string_captures_are_references() {
        let lines = harness_lines(
            "fn bench_a(h: &mut Harness) {\n    work();\n    println!(\"{h:?}\");\n    println!(\"{{h}} {0:>w$}\", 1);\n    eprintln!(\"{:>h$}\", 1);\n}",
        );
        assert_eq!(lines, vec![3, 5]);
    }

    #[test]
    fn test_format_capture_position() {
        let func = parse("fn bench_a(h: &mut Harness) {\n    println!(\"n = {h}\");\n}");
        let res = resolve_function(&func).unwrap();
        let occurrences = res.table.occurrences_of(res.harness);
        // opening quote at column 13, `h` six characters later
        assert_eq!(occurrences, vec![Occurrence { line: 2, column: 19 }]);
    }

    #[test]
    fn test_macro_paths_and_field_labels_are_not_references() {
        let lines = harness_lines(
            "fn bench_a(h: &mut Harness) {\n    assert_eq!(cfg, Config { h: 1 });\n    let v = vec![Kind::h, <T>::h];\n    m!(0..h);\n}",
        );
        assert_eq!(lines, vec![4]);
    }

    #[test]
    fn test_rejects_wrong_parameter_count() {
        let err = resolve_function(&parse("fn bench_a() {}")).unwrap_err();
        assert!(matches!(err, LiftError::ParameterCount { found: 0, .. }));

        let err = resolve_function(&parse("fn bench_a(a: u32, b: u32) {}")).unwrap_err();
        assert!(matches!(err, LiftError::ParameterCount { found: 2, .. }));
    }

    #[test]
    fn test_rejects_pattern_parameter() {
        let err = resolve_function(&parse("fn bench_a(_: &mut Harness) {}")).unwrap_err();
        assert!(matches!(err, LiftError::UnsupportedParameter { .. }));
    }

    #[test]
    fn test_symbols_are_distinct_per_declaration() {
        let func = parse("fn bench_a(h: &mut Harness) { let h = 1; let h = h + 1; }");
        let res = resolve_function(&func).unwrap();
        let names: Vec<&str> = res.table.symbols().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["h", "h", "h"]);
        assert_eq!(res.table.symbol(res.harness).kind, SymbolKind::Parameter);
    }
}
