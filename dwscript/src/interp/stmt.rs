//! Statement execution

use super::env::find_owner;
use super::error::{InterpResult, RuntimeError};
use super::eval::Evaluator;
use super::state::ExecutionState;
use super::value::{Reference, Value};
use crate::ast::{
    AssignOp, BinOp, CaseBranch, Expr, ForDirection, Node, Position, Spanned, Stmt,
};
use crate::types::{convert_implicit, default_value, resolve_type, PropertyInfo, Type};
use std::rc::Rc;

/// What a loop does after its body ran once
enum LoopStep {
    Next,
    Stop,
}

impl Evaluator {
    /// Execute a statement with automatic stack growth
    pub fn exec_stmt(&mut self, stmt: &Spanned<Stmt>, state: &mut ExecutionState) -> InterpResult<()> {
        let (red_zone, grow) = (self.config.stack_red_zone, self.config.stack_grow_size);
        stacker::maybe_grow(red_zone, grow, || self.exec_stmt_inner(stmt, state))
            .map_err(|e| e.at(stmt.pos))
    }

    /// Run statements in order, stopping at the first pending exception or
    /// control-flow signal
    pub fn exec_stmts(&mut self, stmts: &[Spanned<Stmt>], state: &mut ExecutionState) -> InterpResult<()> {
        for stmt in stmts {
            self.exec_stmt(stmt, state)?;
            if state.is_interrupted() {
                break;
            }
        }
        Ok(())
    }

    fn exec_stmt_inner(&mut self, stmt: &Spanned<Stmt>, state: &mut ExecutionState) -> InterpResult<()> {
        if !stmt.pos.is_unknown() {
            self.current_pos = stmt.pos;
        }
        match &stmt.node {
            Stmt::Expr(expr) => {
                self.eval_expr(expr, state)?;
                Ok(())
            }
            Stmt::Var { names, ty, init } => self.exec_var(names, ty.as_deref(), init.as_ref(), state),
            Stmt::Const { name, ty, value } => {
                self.exec_var(std::slice::from_ref(name), ty.as_deref(), Some(value), state)
            }
            Stmt::Assign { target, op, value } => self.exec_assign(target, *op, value, state),
            Stmt::Block(stmts) => self.exec_stmts(stmts, state),

            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.eval_expr(cond, state)?;
                propagate!(state, ());
                if cond.deref()?.expect_bool("if condition")? {
                    self.exec_stmt(then_branch, state)
                } else if let Some(else_branch) = else_branch {
                    self.exec_stmt(else_branch, state)
                } else {
                    Ok(())
                }
            }
            Stmt::Case {
                expr,
                branches,
                else_branch,
            } => self.exec_case(expr, branches, else_branch.as_deref(), stmt.pos, state),

            Stmt::While { cond, body } => loop {
                let test = self.eval_expr(cond, state)?;
                propagate!(state, ());
                if !test.deref()?.expect_bool("while condition")? {
                    return Ok(());
                }
                self.exec_stmt(body, state)?;
                if let LoopStep::Stop = Self::after_iteration(state) {
                    return Ok(());
                }
            },
            Stmt::Repeat { body, until } => loop {
                self.exec_stmts(body, state)?;
                if let LoopStep::Stop = Self::after_iteration(state) {
                    return Ok(());
                }
                let test = self.eval_expr(until, state)?;
                propagate!(state, ());
                if test.deref()?.expect_bool("until condition")? {
                    return Ok(());
                }
            },
            Stmt::For {
                var,
                inline_var,
                start,
                end,
                direction,
                step,
                body,
            } => self.exec_for(var, *inline_var, start, end, *direction, step.as_ref(), body, state),
            Stmt::ForIn {
                var,
                inline_var,
                collection,
                body,
            } => self.exec_for_in(var, *inline_var, collection, body, state),

            Stmt::Try {
                block,
                except,
                finally,
            } => self.exec_try(block, except.as_ref(), finally.as_deref(), state),
            Stmt::Raise(expr) => self.exec_raise(expr.as_ref(), stmt.pos, state),

            Stmt::Break => {
                state.set_break();
                Ok(())
            }
            Stmt::Continue => {
                state.set_continue();
                Ok(())
            }
            Stmt::Exit(value) => {
                if let Some(value) = value {
                    self.store_result(value, state)?;
                    propagate!(state, ());
                }
                state.set_exit();
                Ok(())
            }
            Stmt::Return(value) => {
                if let Some(value) = value {
                    self.store_result(value, state)?;
                    propagate!(state, ());
                }
                state.set_return();
                Ok(())
            }

            Stmt::Function(decl) if decl.class_name.is_none() => {
                tracing::trace!(function = %decl.name, "function declared");
                self.register_function(Rc::new(decl.clone()), Rc::clone(state.env()));
                Ok(())
            }
            Stmt::Function(_)
            | Stmt::Class(_)
            | Stmt::Record(_)
            | Stmt::Enum(_)
            | Stmt::Interface(_)
            | Stmt::Helper(_)
            | Stmt::Operator(_) => {
                self.delegate(Node::Stmt(stmt), state)?;
                Ok(())
            }
        }
    }

    /// Break and continue are consumed by the innermost loop; exit,
    /// return and exceptions end it
    fn after_iteration(state: &ExecutionState) -> LoopStep {
        if state.is_break() {
            state.clear_control_flow();
            return LoopStep::Stop;
        }
        if state.is_continue() {
            state.clear_control_flow();
            return LoopStep::Next;
        }
        if state.is_interrupted() {
            LoopStep::Stop
        } else {
            LoopStep::Next
        }
    }

    // --- declarations ---

    fn exec_var(
        &mut self,
        names: &[String],
        ty: Option<&str>,
        init: Option<&Spanned<Expr>>,
        state: &mut ExecutionState,
    ) -> InterpResult<()> {
        let declared = ty
            .map(|name| resolve_type(self.types.as_ref(), name))
            .transpose()?;

        let initial = match init {
            Some(init) => {
                let value = self.eval_expr(init, state)?;
                propagate!(state, ());
                let value = value.deref()?;
                Some(match &declared {
                    Some(ty) => convert_implicit(&value, ty).unwrap_or(value),
                    None => value,
                })
            }
            None => None,
        };

        for name in names {
            let value = match (&initial, &declared) {
                (Some(value), _) => value.copy_on_assign(),
                (None, Some(ty)) => default_value(ty),
                (None, None) => Value::Nil,
            };
            state.env().borrow_mut().define(name, value);
        }
        Ok(())
    }

    // --- assignment ---

    fn exec_assign(
        &mut self,
        target: &Spanned<Expr>,
        op: AssignOp,
        value: &Spanned<Expr>,
        state: &mut ExecutionState,
    ) -> InterpResult<()> {
        let slot = match &target.node {
            Expr::Member { object, member } => {
                let receiver = self.eval_expr(object, state)?;
                propagate!(state, ());
                let receiver = receiver.deref()?;
                if let Value::Object(obj) = &receiver {
                    if let Some(prop) = obj.class.find_property(member) {
                        return self.assign_property(&receiver, &prop, op, value, target.pos, state);
                    }
                }
                self.member_slot(receiver, member)?
            }
            Expr::Ident(name) if !state.env().borrow().contains(name) => {
                let receiver = state.env().borrow().get("Self");
                if let Some(Value::Object(obj)) = &receiver {
                    if let Some(prop) = obj.class.find_property(name) {
                        let receiver = Value::Object(Rc::clone(obj));
                        return self.assign_property(&receiver, &prop, op, value, target.pos, state);
                    }
                }
                let Some(slot) = self.resolve_slot(target, state)? else {
                    return Ok(());
                };
                slot
            }
            _ => {
                let Some(slot) = self.resolve_slot(target, state)? else {
                    return Ok(());
                };
                slot
            }
        };

        let rhs = self.eval_expr(value, state)?;
        propagate!(state, ());
        let rhs = rhs.deref()?;

        let current = slot.deref().ok();
        let new_value = match op.binary_op() {
            Some(bin) => {
                let current = current.clone().ok_or_else(|| {
                    RuntimeError::invalid_operation(format!(
                        "compound assignment to unset {}",
                        target.node
                    ))
                })?;
                let result = self.binary_values(bin, current, rhs, target.pos, state)?;
                propagate!(state, ());
                result
            }
            None => rhs,
        };

        slot.assign(coerce_to_slot(current.as_ref(), new_value).copy_on_assign())
    }

    /// Assignment through a property's write accessor
    fn assign_property(
        &mut self,
        receiver: &Value,
        prop: &PropertyInfo,
        op: AssignOp,
        value: &Spanned<Expr>,
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<()> {
        let rhs = self.eval_expr(value, state)?;
        propagate!(state, ());
        let rhs = rhs.deref()?;
        let new_value = match op.binary_op() {
            Some(bin) => {
                let current = self.read_property(receiver, prop, pos, state)?;
                propagate!(state, ());
                self.binary_values(bin, current, rhs, pos, state)?
            }
            None => rhs,
        };
        self.write_property(receiver, prop, new_value.copy_on_assign(), pos, state)
    }

    /// `exit value` / `return value` store into the function result
    fn store_result(&mut self, value: &Spanned<Expr>, state: &mut ExecutionState) -> InterpResult<()> {
        let result = self.eval_expr(value, state)?;
        propagate!(state, ());
        let result = result.deref()?;
        match find_owner(state.env(), "Result") {
            Some(env) => Reference::Variable {
                env,
                name: "Result".to_string(),
            }
            .assign(result),
            None => Err(RuntimeError::invalid_operation(
                "exit with a value outside a function",
            )),
        }
    }

    // --- case ---

    fn exec_case(
        &mut self,
        subject: &Spanned<Expr>,
        branches: &[CaseBranch],
        else_branch: Option<&[Spanned<Stmt>]>,
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<()> {
        let value = self.eval_expr(subject, state)?;
        propagate!(state, ());
        let value = value.deref()?.unvariant();

        for branch in branches {
            for label in &branch.values {
                let matched = match &label.node {
                    Expr::Range { low, high } => {
                        let low = self.eval_expr(low, state)?;
                        propagate!(state, ());
                        let high = self.eval_expr(high, state)?;
                        propagate!(state, ());
                        let above = self.binary_values(BinOp::Ge, value.clone(), low, pos, state)?;
                        let below = self.binary_values(BinOp::Le, value.clone(), high, pos, state)?;
                        above.as_bool() == Some(true) && below.as_bool() == Some(true)
                    }
                    _ => {
                        let label = self.eval_expr(label, state)?;
                        propagate!(state, ());
                        let eq = self.binary_values(BinOp::Eq, value.clone(), label, pos, state)?;
                        eq.as_bool() == Some(true)
                    }
                };
                if matched {
                    return self.exec_stmt(&branch.body, state);
                }
            }
        }

        match else_branch {
            Some(stmts) => self.exec_stmts(stmts, state),
            None => Ok(()),
        }
    }

    // --- for loops ---

    /// Slot the loop variable is written to
    fn loop_slot(&self, var: &str, inline_var: bool, state: &mut ExecutionState) -> InterpResult<Reference> {
        if inline_var {
            state.push_scope();
            state.env().borrow_mut().define(var, Value::Nil);
            return Ok(Reference::Variable {
                env: Rc::clone(state.env()),
                name: var.to_string(),
            });
        }
        match find_owner(state.env(), var) {
            Some(env) => Ok(Reference::Variable {
                env,
                name: var.to_string(),
            }),
            None => Err(RuntimeError::undefined_variable(var)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn exec_for(
        &mut self,
        var: &str,
        inline_var: bool,
        start: &Spanned<Expr>,
        end: &Spanned<Expr>,
        direction: ForDirection,
        step: Option<&Spanned<Expr>>,
        body: &Spanned<Stmt>,
        state: &mut ExecutionState,
    ) -> InterpResult<()> {
        let start = self.eval_expr(start, state)?;
        propagate!(state, ());
        let end = self.eval_expr(end, state)?;
        propagate!(state, ());
        let step = match step {
            Some(step) => {
                let step = self.eval_expr(step, state)?;
                propagate!(state, ());
                let step = step.deref()?.expect_int("for loop step")?;
                if step <= 0 {
                    return Err(RuntimeError::invalid_operation(format!(
                        "for loop step must be positive, got {step}"
                    )));
                }
                step
            }
            None => 1,
        };

        let start = start.deref()?.unvariant();
        let end = end.deref()?.unvariant();
        let enum_ty = match &start {
            Value::Enum(e) => Some(Rc::clone(&e.ty)),
            _ => None,
        };
        let make = |ordinal: i64| match &enum_ty {
            Some(ty) => Value::enum_value(Rc::clone(ty), ordinal),
            None => Value::Int(ordinal),
        };
        let (Some(first), Some(last)) = (start.ordinal(), end.ordinal()) else {
            return Err(RuntimeError::type_mismatch(
                "ordinal loop bounds",
                &format!("{} and {}", start.type_name(), end.type_name()),
            ));
        };

        let slot = self.loop_slot(var, inline_var, state)?;
        let mut current = first;
        let result = loop {
            let in_range = match direction {
                ForDirection::To => current <= last,
                ForDirection::Downto => current >= last,
            };
            if !in_range {
                break Ok(());
            }
            if let Err(e) = slot.assign(make(current)) {
                break Err(e);
            }
            if let Err(e) = self.exec_stmt(body, state) {
                break Err(e);
            }
            if let LoopStep::Stop = Self::after_iteration(state) {
                break Ok(());
            }
            let next = match direction {
                ForDirection::To => current.checked_add(step),
                ForDirection::Downto => current.checked_sub(step),
            };
            match next {
                Some(next) => current = next,
                None => break Ok(()),
            }
        };
        if inline_var {
            state.pop_scope();
        }
        result
    }

    fn exec_for_in(
        &mut self,
        var: &str,
        inline_var: bool,
        collection: &Spanned<Expr>,
        body: &Spanned<Stmt>,
        state: &mut ExecutionState,
    ) -> InterpResult<()> {
        let collection = self.eval_expr(collection, state)?;
        propagate!(state, ());
        let items: Vec<Value> = match collection.deref()?.unvariant() {
            Value::Array(arr) => arr.borrow().elements.clone(),
            Value::Str(s) => s.chars().map(|c| Value::string(c.to_string())).collect(),
            Value::Set(set) => set.borrow().members(),
            Value::TypeMeta(Type::Enum(ty)) => ty
                .members()
                .iter()
                .map(|(_, ord)| Value::enum_value(Rc::clone(&ty), *ord))
                .collect(),
            other => {
                return Err(RuntimeError::type_mismatch(
                    "array, string, set or enumeration",
                    &other.type_name(),
                ));
            }
        };

        let slot = self.loop_slot(var, inline_var, state)?;
        let mut result = Ok(());
        for item in items {
            if let Err(e) = slot.assign(item) {
                result = Err(e);
                break;
            }
            if let Err(e) = self.exec_stmt(body, state) {
                result = Err(e);
                break;
            }
            if let LoopStep::Stop = Self::after_iteration(state) {
                break;
            }
        }
        if inline_var {
            state.pop_scope();
        }
        result
    }
}

/// Keep the slot's numeric kind: an Integer stored into a Float variable
/// widens, anything stored into a Variant stays boxed
fn coerce_to_slot(current: Option<&Value>, value: Value) -> Value {
    match (current, value) {
        (Some(Value::Float(_)), Value::Int(n)) => Value::Float(n as f64),
        (Some(Value::Variant(_)), value) => {
            convert_implicit(&value, &Type::Variant).unwrap_or(value)
        }
        (_, value) => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::Program;
    use crate::interp::Interpreter;
    use pretty_assertions::assert_eq;

    fn run(stmts: Vec<Spanned<Stmt>>) -> Interpreter {
        let mut interp = Interpreter::with_captured_output();
        interp.run(&Program::new(stmts)).unwrap();
        interp
    }

    // --- variables ---

    #[test]
    fn test_var_defaults_by_type() {
        let interp = run(vec![
            var_decl("i", Some("Integer"), None),
            var_decl("s", Some("String"), None),
            var_decl("f", Some("Float"), Some(int(2))),
        ]);
        assert_eq!(interp.global("i"), Some(Value::Int(0)));
        assert_eq!(interp.global("s"), Some(Value::string("")));
        assert_eq!(interp.global("f"), Some(Value::Float(2.0)));
    }

    #[test]
    fn test_float_variable_widens_integer_assignment() {
        let interp = run(vec![
            var_decl("f", Some("Float"), None),
            assign(ident("f"), int(3)),
        ]);
        assert_eq!(interp.global("f"), Some(Value::Float(3.0)));
    }

    #[test]
    fn test_compound_assignment() {
        let interp = run(vec![
            var_decl("n", Some("Integer"), Some(int(10))),
            compound_assign(ident("n"), AssignOp::AddAssign, int(5)),
            compound_assign(ident("n"), AssignOp::MulAssign, int(2)),
        ]);
        assert_eq!(interp.global("n"), Some(Value::Int(30)));
    }

    #[test]
    fn test_record_assignment_copies() {
        let interp = run(vec![
            var_decl("a", None, Some(record_lit(None, vec![("X", int(1))]))),
            var_decl("b", None, Some(ident("a"))),
            assign(member(ident("b"), "X"), int(99)),
        ]);
        assert_eq!(interp.global("a").unwrap().field("X"), Some(Value::Int(1)));
        assert_eq!(interp.global("b").unwrap().field("X"), Some(Value::Int(99)));
    }

    #[test]
    fn test_string_character_assignment() {
        let interp = run(vec![
            var_decl("s", None, Some(string("cat"))),
            assign(index(ident("s"), int(1)), string("b")),
        ]);
        assert_eq!(interp.global("s"), Some(Value::string("bat")));
    }

    // --- loops ---

    #[test]
    fn test_for_loop_sums() {
        let interp = run(vec![
            var_decl("sum", None, Some(int(0))),
            for_to(
                "i",
                int(1),
                int(10),
                compound_assign(ident("sum"), AssignOp::AddAssign, ident("i")),
            ),
        ]);
        assert_eq!(interp.global("sum"), Some(Value::Int(55)));
        // inline loop variable does not leak
        assert_eq!(interp.global("i"), None);
    }

    #[test]
    fn test_for_downto_with_step() {
        let mut interp = Interpreter::with_captured_output();
        interp
            .run(&Program::new(vec![stmt(Stmt::For {
                var: "i".into(),
                inline_var: true,
                start: int(10),
                end: int(1),
                direction: ForDirection::Downto,
                step: Some(int(3)),
                body: Box::new(println(vec![ident("i")])),
            })]))
            .unwrap();
        assert_eq!(interp.output(), "10\n7\n4\n1\n");
    }

    #[test]
    fn test_for_step_must_be_positive() {
        let mut interp = Interpreter::with_captured_output();
        let err = interp
            .run(&Program::new(vec![stmt(Stmt::For {
                var: "i".into(),
                inline_var: true,
                start: int(1),
                end: int(3),
                direction: ForDirection::To,
                step: Some(int(0)),
                body: Box::new(block(vec![])),
            })]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Runtime error: for loop step must be positive, got 0"
        );
    }

    #[test]
    fn test_while_with_break_and_continue() {
        let interp = run(vec![
            var_decl("i", None, Some(int(0))),
            var_decl("odd", None, Some(int(0))),
            while_stmt(
                boolean(true),
                block(vec![
                    compound_assign(ident("i"), AssignOp::AddAssign, int(1)),
                    if_stmt(binary(ident("i"), BinOp::Gt, int(9)), stmt(Stmt::Break), None),
                    if_stmt(
                        binary(binary(ident("i"), BinOp::Mod, int(2)), BinOp::Eq, int(0)),
                        stmt(Stmt::Continue),
                        None,
                    ),
                    compound_assign(ident("odd"), AssignOp::AddAssign, int(1)),
                ]),
            ),
        ]);
        assert_eq!(interp.global("odd"), Some(Value::Int(5)));
    }

    #[test]
    fn test_repeat_runs_at_least_once() {
        let interp = run(vec![
            var_decl("n", None, Some(int(0))),
            repeat_stmt(
                vec![compound_assign(ident("n"), AssignOp::AddAssign, int(1))],
                boolean(true),
            ),
        ]);
        assert_eq!(interp.global("n"), Some(Value::Int(1)));
    }

    #[test]
    fn test_for_in_over_string_and_enum() {
        let mut interp = Interpreter::with_captured_output();
        interp
            .run(&Program::new(vec![
                enum_decl("TColor", &["Red", "Green"]),
                for_in("c", string("ab"), println(vec![ident("c")])),
                for_in("e", ident("TColor"), println(vec![ident("e")])),
            ]))
            .unwrap();
        assert_eq!(interp.output(), "a\nb\nRed\nGreen\n");
    }

    // --- case ---

    #[test]
    fn test_case_with_ranges_and_else() {
        let classify = |n: i64| {
            let mut interp = Interpreter::with_captured_output();
            interp
                .run(&Program::new(vec![case_stmt(
                    int(n),
                    vec![
                        (vec![int(0)], println(vec![string("zero")])),
                        (vec![range(int(1), int(9))], println(vec![string("digit")])),
                    ],
                    Some(vec![println(vec![string("big")])]),
                )]))
                .unwrap();
            interp.output()
        };
        assert_eq!(classify(0), "zero\n");
        assert_eq!(classify(5), "digit\n");
        assert_eq!(classify(42), "big\n");
    }

    #[test]
    fn test_top_level_exit_stops_program() {
        let interp = run(vec![
            var_decl("n", None, Some(int(1))),
            exit(None),
            assign(ident("n"), int(2)),
        ]);
        assert_eq!(interp.global("n"), Some(Value::Int(1)));
    }
}
