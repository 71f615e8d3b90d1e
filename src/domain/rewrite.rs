//! Reference Rewriting
//!
//! Strips a function body of its dependency on the harness parameter with two
//! rules, decided pre-order and applied post-order:
//!
//! - a call whose callee is a member access on the harness (`h.start_timer()`,
//!   `(h.hook)()`) marks its subtree for deletion; the mark travels up to the
//!   nearest enclosing statement, which is removed from its block;
//! - a `for` loop over `start..h.field` is replaced by its own body block.
//!
//! Each visit returns its [`Pending`] deletion state instead of mutating a
//! shared flag. Blocks consume the state of their statements, so nothing
//! escapes the function body.

use proc_macro2::TokenStream;
use syn::spanned::Spanned;
use syn::{Block, Expr, ExprBlock, RangeLimits, Stmt};
use tracing::debug;

use crate::domain::symbols::{path_ident, BindingTable, SymbolId};

/// Deletion state of a visited subtree.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Clear,
    Delete,
}

impl Pending {
    fn or(self, other: Pending) -> Pending {
        if self == Pending::Delete || other == Pending::Delete {
            Pending::Delete
        } else {
            Pending::Clear
        }
    }
}

/// One structural change made to the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// A statement containing a harness call was removed.
    RemovedStatement { line: usize },
    /// A harness-bounded `for` loop was replaced by its body.
    HoistedLoop { line: usize },
}

#[derive(Debug, Default, Clone)]
pub struct RewriteReport {
    pub edits: Vec<Edit>,
}

impl RewriteReport {
    pub fn removed(&self) -> usize {
        self.edits
            .iter()
            .filter(|e| matches!(e, Edit::RemovedStatement { .. }))
            .count()
    }

    pub fn hoisted(&self) -> usize {
        self.edits
            .iter()
            .filter(|e| matches!(e, Edit::HoistedLoop { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

/// Remove every harness call statement and hoist every harness-bounded loop in `body`.
pub fn remove_harness_references(
    body: &mut Block,
    table: &BindingTable,
    harness: SymbolId,
) -> RewriteReport {
    let mut rewriter = ReferenceRewriter {
        table,
        harness,
        report: RewriteReport::default(),
    };
    rewriter.rewrite_block(body);
    rewriter.report
}

struct ReferenceRewriter<'t> {
    table: &'t BindingTable,
    harness: SymbolId,
    report: RewriteReport,
}

impl ReferenceRewriter<'_> {
    /// Statement lists are where pending deletions land.
    fn rewrite_block(&mut self, block: &mut Block) {
        let stmts = std::mem::take(&mut block.stmts);
        for mut stmt in stmts {
            match self.rewrite_stmt(&mut stmt) {
                Pending::Delete => {
                    let line = stmt.span().start().line;
                    debug!(line, "removed harness statement");
                    self.report.edits.push(Edit::RemovedStatement { line });
                }
                Pending::Clear => block.stmts.push(stmt),
            }
        }
    }

    fn rewrite_stmt(&mut self, stmt: &mut Stmt) -> Pending {
        match stmt {
            Stmt::Local(local) => match &mut local.init {
                Some(init) => {
                    let pending = self.rewrite_expr(&mut init.expr);
                    match &mut init.diverge {
                        Some((_, diverge)) => pending.or(self.rewrite_expr(diverge)),
                        None => pending,
                    }
                }
                None => Pending::Clear,
            },
            Stmt::Expr(expr, _) => self.rewrite_expr(expr),
            Stmt::Item(_) | Stmt::Macro(_) => Pending::Clear,
        }
    }

    fn rewrite_expr(&mut self, expr: &mut Expr) -> Pending {
        if self.is_harness_call(expr) {
            return Pending::Delete;
        }
        // A hoisted loop is now a block; its statements still get visited.
        self.hoist_loop(expr);
        self.rewrite_children(expr)
    }

    fn rewrite_children(&mut self, expr: &mut Expr) -> Pending {
        match expr {
            Expr::Array(e) => self.rewrite_all(e.elems.iter_mut()),
            Expr::Assign(e) => self.rewrite_expr(&mut e.left).or(self.rewrite_expr(&mut e.right)),
            Expr::Async(e) => self.enter_block(&mut e.block),
            Expr::Await(e) => self.rewrite_expr(&mut e.base),
            Expr::Binary(e) => self.rewrite_expr(&mut e.left).or(self.rewrite_expr(&mut e.right)),
            Expr::Block(e) => self.enter_block(&mut e.block),
            Expr::Break(e) => self.rewrite_opt(&mut e.expr),
            Expr::Call(e) => self
                .rewrite_expr(&mut e.func)
                .or(self.rewrite_all(e.args.iter_mut())),
            Expr::Cast(e) => self.rewrite_expr(&mut e.expr),
            Expr::Closure(e) => self.rewrite_expr(&mut e.body),
            Expr::Const(e) => self.enter_block(&mut e.block),
            Expr::Field(e) => self.rewrite_expr(&mut e.base),
            Expr::ForLoop(e) => self.rewrite_expr(&mut e.expr).or(self.enter_block(&mut e.body)),
            Expr::Group(e) => self.rewrite_expr(&mut e.expr),
            Expr::If(e) => {
                let pending = self.rewrite_expr(&mut e.cond).or(self.enter_block(&mut e.then_branch));
                match &mut e.else_branch {
                    Some((_, else_branch)) => pending.or(self.rewrite_expr(else_branch)),
                    None => pending,
                }
            }
            Expr::Index(e) => self.rewrite_expr(&mut e.expr).or(self.rewrite_expr(&mut e.index)),
            Expr::Let(e) => self.rewrite_expr(&mut e.expr),
            Expr::Loop(e) => self.enter_block(&mut e.body),
            Expr::Match(e) => {
                let mut pending = self.rewrite_expr(&mut e.expr);
                for arm in &mut e.arms {
                    if let Some((_, guard)) = &mut arm.guard {
                        pending = pending.or(self.rewrite_expr(guard));
                    }
                    pending = pending.or(self.rewrite_expr(&mut arm.body));
                }
                pending
            }
            Expr::MethodCall(e) => self
                .rewrite_expr(&mut e.receiver)
                .or(self.rewrite_all(e.args.iter_mut())),
            Expr::Paren(e) => self.rewrite_expr(&mut e.expr),
            Expr::Range(e) => self.rewrite_opt(&mut e.start).or(self.rewrite_opt(&mut e.end)),
            Expr::RawAddr(e) => self.rewrite_expr(&mut e.expr),
            Expr::Reference(e) => self.rewrite_expr(&mut e.expr),
            Expr::Repeat(e) => self.rewrite_expr(&mut e.expr).or(self.rewrite_expr(&mut e.len)),
            Expr::Return(e) => self.rewrite_opt(&mut e.expr),
            Expr::Struct(e) => self
                .rewrite_all(e.fields.iter_mut().map(|f| &mut f.expr))
                .or(self.rewrite_opt(&mut e.rest)),
            Expr::Try(e) => self.rewrite_expr(&mut e.expr),
            Expr::TryBlock(e) => self.enter_block(&mut e.block),
            Expr::Tuple(e) => self.rewrite_all(e.elems.iter_mut()),
            Expr::Unary(e) => self.rewrite_expr(&mut e.expr),
            Expr::Unsafe(e) => self.enter_block(&mut e.block),
            Expr::While(e) => self.rewrite_expr(&mut e.cond).or(self.enter_block(&mut e.body)),
            Expr::Yield(e) => self.rewrite_opt(&mut e.expr),
            // Macro bodies are tokens; the resolver still sees into them.
            Expr::Continue(_)
            | Expr::Infer(_)
            | Expr::Lit(_)
            | Expr::Macro(_)
            | Expr::Path(_)
            | Expr::Verbatim(_) => Pending::Clear,
            // `Expr` is non-exhaustive; a variant added later is taken as a leaf and
            // anything it hides from the rewrite fails the residual check.
            _ => Pending::Clear,
        }
    }

    fn enter_block(&mut self, block: &mut Block) -> Pending {
        self.rewrite_block(block);
        Pending::Clear
    }

    fn rewrite_opt(&mut self, expr: &mut Option<Box<Expr>>) -> Pending {
        match expr {
            Some(expr) => self.rewrite_expr(expr),
            None => Pending::Clear,
        }
    }

    fn rewrite_all<'e>(&mut self, exprs: impl Iterator<Item = &'e mut Expr>) -> Pending {
        exprs.fold(Pending::Clear, |pending, expr| pending.or(self.rewrite_expr(expr)))
    }

    /// Replace `for _ in start..h.field { body }` with `{ body }` (keeping any label).
    fn hoist_loop(&mut self, expr: &mut Expr) {
        let line = match expr {
            Expr::ForLoop(for_loop) if self.is_harness_bounded(&for_loop.expr) => {
                for_loop.for_token.span.start().line
            }
            _ => return,
        };
        if let Expr::ForLoop(for_loop) = std::mem::replace(expr, Expr::Verbatim(TokenStream::new())) {
            *expr = Expr::Block(ExprBlock {
                attrs: for_loop.attrs,
                label: for_loop.label,
                block: for_loop.body,
            });
            debug!(line, "hoisted harness-bounded loop");
            self.report.edits.push(Edit::HoistedLoop { line });
        }
    }

    fn is_harness_call(&self, expr: &Expr) -> bool {
        match expr {
            Expr::MethodCall(call) => self.is_harness(&call.receiver),
            Expr::Call(call) => self.is_harness_member(&call.func),
            _ => false,
        }
    }

    /// `start..h.field`, the half-open (strictly less than) bound.
    fn is_harness_bounded(&self, iterated: &Expr) -> bool {
        match peel(iterated) {
            Expr::Range(range) if matches!(range.limits, RangeLimits::HalfOpen(_)) => range
                .end
                .as_deref()
                .is_some_and(|end| self.is_harness_member(end)),
            _ => false,
        }
    }

    fn is_harness_member(&self, expr: &Expr) -> bool {
        matches!(peel(expr), Expr::Field(field) if self.is_harness(&field.base))
    }

    fn is_harness(&self, expr: &Expr) -> bool {
        match peel(expr) {
            Expr::Path(path) => path_ident(path)
                .and_then(|ident| self.table.resolve(ident))
                .is_some_and(|id| id == self.harness),
            _ => false,
        }
    }
}

fn peel(mut expr: &Expr) -> &Expr {
    loop {
        match expr {
            Expr::Paren(inner) => expr = &inner.expr,
            Expr::Group(inner) => expr = &inner.expr,
            _ => return expr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::symbols::resolve_function;
    use syn::{Item, ItemFn};

    fn render(func: &ItemFn) -> String {
        prettyplease::unparse(&syn::File {
            shebang: None,
            attrs: vec![],
            items: vec![Item::Fn(func.clone())],
        })
    }

    fn expected(src: &str) -> String {
        render(&syn::parse_str(src).expect("expected source should parse"))
    }

    fn rewrite(func: &mut ItemFn) -> RewriteReport {
        let res = resolve_function(func).unwrap();
        remove_harness_references(&mut func.block, &res.table, res.harness)
    }

    fn residual(func: &ItemFn) -> usize {
        let res = resolve_function(func).unwrap();
        res.table.occurrences_of(res.harness).len()
    }

    fn lift(src: &str) -> (ItemFn, RewriteReport) {
        let mut func: ItemFn = syn::parse_str(src).expect("test source should parse");
        let report = rewrite(&mut func);
        (func, report)
    }

    #[test]
    fn test_hoists_loop_bounded_by_harness_field() {
        let (func, report) = lift(
            "fn bench_x(h: &mut Harness) {
                for i in 0..h.n { total += x }
            }",
        );
        assert_eq!(render(&func), expected("fn bench_x(h: &mut Harness) { { total += x } }"));
        assert_eq!(report.edits, vec![Edit::HoistedLoop { line: 2 }]);
        assert_eq!(residual(&func), 0);
    }

    #[test]
    fn test_removes_timer_calls_and_keeps_order() {
        let (func, report) = lift(
            "fn bench_x(h: &mut Harness) {
                h.start_timer();
                compute();
                h.stop_timer();
            }",
        );
        assert_eq!(render(&func), expected("fn bench_x(h: &mut Harness) { compute(); }"));
        assert_eq!(
            report.edits,
            vec![
                Edit::RemovedStatement { line: 2 },
                Edit::RemovedStatement { line: 4 },
            ]
        );
    }

    #[test]
    fn test_hoisting_preserves_body_and_sibling_order() {
        let (func, _) = lift(
            "fn bench_x(h: &mut Harness) {
                prepare();
                for _ in 0..h.n {
                    first();
                    second();
                    third();
                }
                finish();
            }",
        );
        assert_eq!(
            render(&func),
            expected(
                "fn bench_x(h: &mut Harness) {
                    prepare();
                    { first(); second(); third(); }
                    finish();
                }"
            )
        );
    }

    #[test]
    fn test_nested_harness_calls_are_removed() {
        let (func, report) = lift(
            "fn bench_x(h: &mut Harness) {
                for _ in 0..h.n {
                    if reset_needed() {
                        h.stop_timer();
                        reset();
                        h.start_timer();
                    }
                    work();
                }
            }",
        );
        assert_eq!(
            render(&func),
            expected(
                "fn bench_x(h: &mut Harness) {
                    { if reset_needed() { reset(); } work(); }
                }"
            )
        );
        assert_eq!(report.hoisted(), 1);
        assert_eq!(report.removed(), 2);
        assert_eq!(residual(&func), 0);
    }

    #[test]
    fn test_deletion_propagates_to_enclosing_statement() {
        let (func, _) = lift(
            "fn bench_x(h: &mut Harness) {
                let data = vec![1u64, 2, 3];
                let bytes = size_of_val(&h.set_bytes(24));
                consume(data);
            }",
        );
        assert_eq!(
            render(&func),
            expected(
                "fn bench_x(h: &mut Harness) {
                    let data = vec![1u64, 2, 3];
                    consume(data);
                }"
            )
        );
    }

    #[test]
    fn test_harness_call_in_subexpression_deletes_whole_statement() {
        let (func, _) = lift(
            "fn bench_x(h: &mut Harness) {
                total += h.elapsed() * 2;
                other();
            }",
        );
        assert_eq!(render(&func), expected("fn bench_x(h: &mut Harness) { other(); }"));
    }

    #[test]
    fn test_field_callee_is_removed() {
        let (func, _) = lift(
            "fn bench_x(h: &mut Harness) {
                (h.on_start)();
                work();
            }",
        );
        assert_eq!(render(&func), expected("fn bench_x(h: &mut Harness) { work(); }"));
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let (mut func, first) = lift(
            "fn bench_x(h: &mut Harness) {
                h.reset_timer();
                for _ in 0..h.n { h.pause(); step(); }
            }",
        );
        assert!(!first.is_empty());
        let once = render(&func);

        let second = rewrite(&mut func);
        assert!(second.is_empty());
        assert_eq!(render(&func), once);
    }

    #[test]
    fn test_shadowed_name_is_not_touched() {
        let (func, report) = lift(
            "fn bench_x(h: &mut Harness) {
                h.reset_timer();
                let h = Counter::new();
                h.bump();
            }",
        );
        assert_eq!(
            render(&func),
            expected(
                "fn bench_x(h: &mut Harness) {
                    let h = Counter::new();
                    h.bump();
                }"
            )
        );
        assert_eq!(report.removed(), 1);
    }

    #[test]
    fn test_labeled_loop_becomes_labeled_block() {
        let (func, _) = lift(
            "fn bench_x(h: &mut Harness) {
                'run: for _ in 0..h.n { if done() { break 'run; } }
            }",
        );
        assert_eq!(
            render(&func),
            expected("fn bench_x(h: &mut Harness) { 'run: { if done() { break 'run; } } }")
        );
    }

    #[test]
    fn test_other_loop_shapes_are_left_alone() {
        let (func, report) = lift(
            "fn bench_x(h: &mut Harness) {
                for _ in 0..=h.n { work(); }
                for _ in 0..limit { work(); }
            }",
        );
        assert_eq!(report.hoisted(), 0);
        assert_eq!(residual(&func), 1);
    }

    #[test]
    fn test_raw_address_operand_is_visited() {
        let (func, report) = lift(
            "fn bench_x(h: &mut Harness) {
                let p = &raw const (h.next)();
                work();
            }",
        );
        assert_eq!(report.removed(), 1);
        assert_eq!(render(&func), expected("fn bench_x(h: &mut Harness) { work(); }"));
    }

    #[test]
    fn test_closure_bodies_are_rewritten() {
        let (func, _) = lift(
            "fn bench_x(h: &mut Harness) {
                let run = || {
                    h.start_timer();
                    work();
                };
                run();
            }",
        );
        assert_eq!(
            render(&func),
            expected("fn bench_x(h: &mut Harness) { let run = || { work(); }; run(); }")
        );
    }
}
