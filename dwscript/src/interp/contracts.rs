//! Design by contract: `require`/`ensure` lists and `Old(x)` snapshots

use super::error::{InterpResult, RuntimeError};
use super::eval::Evaluator;
use super::state::ExecutionState;
use super::value::Value;
use crate::ast::{Condition, Expr, FunctionDecl, Position, Spanned};
use crate::util::normalize;
use std::collections::HashMap;
use std::fmt;

/// Class of the exception raised by a failed condition
const CONTRACT_EXCEPTION: &str = "EAssertionFailed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    Pre,
    Post,
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractKind::Pre => write!(f, "Pre"),
            ContractKind::Post => write!(f, "Post"),
        }
    }
}

/// `"<Pre|Post>-condition failed in <Function> [line: L, column: C], <text>"`
pub fn contract_message(kind: ContractKind, function: &str, pos: Position, text: &str) -> String {
    format!("{kind}-condition failed in {function} [{pos}], {text}")
}

/// Distinct `Old(x)` names referenced by `conditions`, in first-use order.
///
/// Lambda bodies are not scanned.
pub fn collect_old_references(conditions: &[Condition]) -> Vec<String> {
    let mut names = Vec::new();
    for cond in conditions {
        collect_in(&cond.test, &mut names);
        if let Some(message) = &cond.message {
            collect_in(message, &mut names);
        }
    }
    names
}

fn collect_in(expr: &Spanned<Expr>, names: &mut Vec<String>) {
    match &expr.node {
        Expr::Old(name) => {
            let key = normalize(name);
            if !names.iter().any(|n| normalize(n) == key) {
                names.push(name.clone());
            }
        }
        Expr::Binary { left, right, .. } | Expr::Range { low: left, high: right } => {
            collect_in(left, names);
            collect_in(right, names);
        }
        Expr::Unary { expr, .. }
        | Expr::Grouped(expr)
        | Expr::AddressOf(expr)
        | Expr::Is { expr, .. }
        | Expr::As { expr, .. }
        | Expr::Implements { expr, .. }
        | Expr::Member { object: expr, .. } => collect_in(expr, names),
        Expr::Call { func, args } => {
            collect_in(func, names);
            args.iter().for_each(|a| collect_in(a, names));
        }
        Expr::MethodCall { receiver, args, .. } => {
            collect_in(receiver, names);
            args.iter().for_each(|a| collect_in(a, names));
        }
        Expr::Index { base, index } => {
            collect_in(base, names);
            collect_in(index, names);
        }
        Expr::ArrayLit(items) | Expr::SetLit(items) => {
            items.iter().for_each(|a| collect_in(a, names));
        }
        Expr::RecordLit { fields, .. } => {
            fields.iter().for_each(|f| collect_in(&f.value, names));
        }
        Expr::IfExpr {
            cond,
            then_branch,
            else_branch,
        } => {
            collect_in(cond, names);
            collect_in(then_branch, names);
            collect_in(else_branch, names);
        }
        Expr::Inherited { args, .. } | Expr::New { args, .. } => {
            args.iter().for_each(|a| collect_in(a, names));
        }
        Expr::Lambda(_)
        | Expr::IntLit(_)
        | Expr::FloatLit(_)
        | Expr::StrLit(_)
        | Expr::CharLit(_)
        | Expr::BoolLit(_)
        | Expr::Nil
        | Expr::Ident(_)
        | Expr::SelfRef => {}
    }
}

impl Evaluator {
    /// Snapshot of every name `Old(..)` refers to in `post`, keyed by
    /// normalized name. Unreadable names capture Nil.
    pub(crate) fn capture_old_values(
        &self,
        post: &[Condition],
        state: &ExecutionState,
    ) -> HashMap<String, Value> {
        collect_old_references(post)
            .into_iter()
            .map(|name| {
                let value = state
                    .env()
                    .borrow()
                    .get(&name)
                    .and_then(|v| v.deref().ok())
                    .map(|v| v.copy_on_assign())
                    .unwrap_or(Value::Nil);
                (normalize(&name), value)
            })
            .collect()
    }

    /// Evaluate `conditions` in order; the first false one raises
    /// `EAssertionFailed` and stops the check.
    pub(crate) fn check_conditions(
        &mut self,
        kind: ContractKind,
        decl: &FunctionDecl,
        conditions: &[Condition],
        state: &mut ExecutionState,
    ) -> InterpResult<()> {
        for cond in conditions {
            let result = self.eval_expr(&cond.test, state)?;
            propagate!(state, ());
            let passed = match result.deref()?.unvariant() {
                Value::Bool(b) => b,
                other => {
                    return Err(
                        RuntimeError::type_mismatch("Boolean condition", &other.type_name())
                            .at(cond.test.pos),
                    );
                }
            };
            if passed {
                continue;
            }

            let text = match &cond.message {
                Some(message) => {
                    let value = self.eval_expr(message, state)?;
                    propagate!(state, ());
                    value.deref()?.to_string()
                }
                None => cond.test.node.to_string(),
            };
            let message = contract_message(kind, &decl.qualified_name(), cond.test.pos, &text);
            tracing::debug!(function = %decl.qualified_name(), %kind, "contract failed");
            self.raise_exception(state, CONTRACT_EXCEPTION, &message, cond.test.pos);
            return Ok(());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::{BinOp, Program};
    use crate::interp::Interpreter;
    use pretty_assertions::assert_eq;

    fn cond(test: Spanned<Expr>) -> Condition {
        Condition { test, message: None }
    }

    // --- Old() scan ---

    #[test]
    fn test_old_references_deduplicated() {
        let conds = vec![
            cond(binary(ident("Result"), BinOp::Eq, binary(old("X"), BinOp::Add, old("x")))),
            cond(binary(old("Y"), BinOp::Lt, call("F", vec![old("X")]))),
        ];
        assert_eq!(collect_old_references(&conds), vec!["X", "Y"]);
    }

    #[test]
    fn test_old_scan_skips_lambdas() {
        let body = function("", vec![], Some("Integer"))
            .body(vec![assign(ident("Result"), old("Hidden"))])
            .build();
        let conds = vec![cond(binary(
            call_expr(lambda(body), vec![]),
            BinOp::Eq,
            old("Seen"),
        ))];
        assert_eq!(collect_old_references(&conds), vec!["Seen"]);
    }

    #[test]
    fn test_old_scan_covers_message() {
        let conds = vec![Condition {
            test: boolean(true),
            message: Some(call("IntToStr", vec![old("N")])),
        }];
        assert_eq!(collect_old_references(&conds), vec!["N"]);
    }

    // --- messages ---

    #[test]
    fn test_contract_message_format() {
        let message = contract_message(ContractKind::Post, "TAccount.Deposit", Position::new(12, 5), "Balance > 0");
        insta::assert_snapshot!(message, @"Post-condition failed in TAccount.Deposit [line: 12, column: 5], Balance > 0");
    }

    // --- checking ---

    fn guarded(cond_test: Spanned<Expr>) -> Vec<crate::ast::Spanned<crate::ast::Stmt>> {
        vec![
            var_decl("ran", None, Some(boolean(false))),
            function("MyFunc", vec![param("x", "Integer")], None)
                .requires(cond_test)
                .body(vec![assign(ident("ran"), boolean(true))])
                .stmt(),
        ]
    }

    #[test]
    fn test_failed_precondition_skips_body() {
        let mut interp = Interpreter::with_captured_output();
        let mut program = guarded(binary(ident("x"), BinOp::Gt, int(0)).at(3, 12));
        program.push(expr_stmt(call("MyFunc", vec![int(-1)])));
        let err = interp.run(&Program::new(program)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Exception EAssertionFailed: Pre-condition failed in MyFunc [line: 3, column: 12], x > 0"
        );
        assert_eq!(interp.global("ran"), Some(Value::Bool(false)));
    }

    #[test]
    fn test_custom_message_replaces_source_text() {
        let mut interp = Interpreter::with_captured_output();
        let program = vec![
            function("Half", vec![param("n", "Integer")], Some("Integer"))
                .requires_msg(
                    binary(binary(ident("n"), BinOp::Mod, int(2)), BinOp::Eq, int(0)),
                    string("n must be even"),
                )
                .body(vec![assign(ident("Result"), binary(ident("n"), BinOp::IntDiv, int(2)))])
                .stmt(),
            expr_stmt(call("Half", vec![int(3)])),
        ];
        let err = interp.run(&Program::new(program)).unwrap_err();
        assert!(err.to_string().ends_with("], n must be even"), "{err}");
    }

    #[test]
    fn test_non_boolean_condition_is_error() {
        let mut interp = Interpreter::with_captured_output();
        let mut program = guarded(ident("x"));
        program.push(expr_stmt(call("MyFunc", vec![int(1)])));
        let err = interp.run(&Program::new(program)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Runtime error: type mismatch: expected Boolean condition, got Integer"
        );
    }

    #[test]
    fn test_passing_precondition_runs_body() {
        let mut interp = Interpreter::with_captured_output();
        let mut program = guarded(binary(ident("x"), BinOp::Gt, int(0)));
        program.push(expr_stmt(call("MyFunc", vec![int(5)])));
        interp.run(&Program::new(program)).unwrap();
        assert_eq!(interp.global("ran"), Some(Value::Bool(true)));
    }

    #[test]
    fn test_postcondition_sees_old_value() {
        let mut interp = Interpreter::with_captured_output();
        let program = vec![
            var_decl("count", None, Some(int(5))),
            function("Bump", vec![], None)
                .ensures(binary(ident("count"), BinOp::Eq, binary(old("count"), BinOp::Add, int(1))))
                .body(vec![assign(ident("count"), binary(ident("count"), BinOp::Add, int(2)))])
                .stmt(),
            expr_stmt(call("Bump", vec![])),
        ];
        let err = interp.run(&Program::new(program)).unwrap_err();
        assert!(
            err.to_string()
                .starts_with("Exception EAssertionFailed: Post-condition failed in Bump"),
            "{err}"
        );
        // the body ran; only the check failed
        assert_eq!(interp.global("count"), Some(Value::Int(7)));
        assert_eq!(interp.parts().1.old_values_depth(), 0);
    }
}
