//! Calls: name resolution, argument preparation and the user-function
//! invocation protocol

use super::contracts::ContractKind;
use super::env::child_env;
use super::error::{ErrorKind, InterpResult, RuntimeError};
use super::eval::{Evaluator, UserFunction};
use super::inplace::InPlaceOp;
use super::state::ExecutionState;
use super::value::{Callable, LazyThunk, Reference, Value};
use crate::ast::{Expr, FunctionDecl, ParamMode, Position, Spanned};
use crate::types::{convert_implicit, default_value, resolve_type, Type};
use crate::util::{find_similar_name, format_suggestion_hint, same_name};
use std::rc::Rc;

impl Evaluator {
    /// `func(args)`
    pub(crate) fn eval_call(
        &mut self,
        func: &Spanned<Expr>,
        args: &[Spanned<Expr>],
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        match &func.node {
            Expr::Ident(name) => self.call_named(name, args, pos, state),
            Expr::Member { object, member } => self.eval_method_call(object, member, args, pos, state),
            _ => {
                let callee = self.eval_expr(func, state)?;
                propagate!(state);
                match callee.deref()? {
                    Value::Function(callable) => self.call_callable_exprs(&callable, args, pos, state),
                    other => Err(RuntimeError::type_mismatch("function", &other.type_name())),
                }
            }
        }
    }

    /// Resolve and call a function by name.
    ///
    /// Order: in-place builtins, `Assert`, function pointers in scope,
    /// methods of `Self`, user functions, registry builtins.
    pub(crate) fn call_named(
        &mut self,
        name: &str,
        args: &[Spanned<Expr>],
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        if let Some(op) = InPlaceOp::from_name(name) {
            return self.eval_in_place(op, args, state);
        }

        if same_name(name, "Assert") {
            let values = self.eval_args(args, state)?;
            propagate!(state);
            return self.call_assert(&values, pos, state);
        }

        let bound = state.env().borrow().get(name);
        if let Some(bound) = bound {
            if let Value::Function(callable) = bound.deref()? {
                return self.call_callable_exprs(&callable, args, pos, state);
            }
        }

        if let Some(receiver) = self.self_method_receiver(name, state) {
            let values = match self.method_decl_for(&receiver, name, args.len()) {
                Some(decl) => self.prepare_args(&decl, args, state)?,
                None => self.eval_args(args, state)?,
            };
            propagate!(state);
            return self.call_method(&receiver, name, values, pos, state);
        }

        if let Some(function) = self.find_function(name, args.len()) {
            let values = self.prepare_args(&function.decl, args, state)?;
            propagate!(state);
            return self.execute_user_function(&function, values, None, pos, state);
        }

        if let Some(builtin) = self.builtins.get(name) {
            let values = self.eval_args(args, state)?;
            propagate!(state);
            let result = builtin(self.output.as_mut(), &values);
            return self.native_result(result, pos, state);
        }

        let mut candidates: Vec<String> = self.functions.values().flatten().map(|f| f.decl.name.clone()).collect();
        candidates.extend(self.builtins.names().map(str::to_string));
        let candidates: Vec<&str> = candidates.iter().map(String::as_str).collect();
        let mut err = RuntimeError::undefined_function(name);
        err.message
            .push_str(&format_suggestion_hint(find_similar_name(name, &candidates, 2)));
        Err(err)
    }

    /// Call a named user function or builtin with evaluated arguments
    pub(crate) fn call_function_values(
        &mut self,
        name: &str,
        args: Vec<Value>,
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        if let Some(function) = self.find_function(name, args.len()) {
            return self.execute_user_function(&function, args, None, pos, state);
        }
        if let Some(builtin) = self.builtins.get(name) {
            let result = builtin(self.output.as_mut(), &args);
            return self.native_result(result, pos, state);
        }
        Err(RuntimeError::undefined_function(name))
    }

    /// Conversion failures of native code surface to scripts as
    /// `EConvertError`
    pub(crate) fn native_result(
        &self,
        result: InterpResult<Value>,
        pos: Position,
        state: &ExecutionState,
    ) -> InterpResult<Value> {
        match result {
            Err(e) if e.kind == ErrorKind::Conversion => {
                self.raise_exception(state, "EConvertError", &e.message, pos);
                Ok(Value::Nil)
            }
            other => other,
        }
    }

    /// `Self` when an unqualified call names one of its methods
    fn self_method_receiver(&self, name: &str, state: &ExecutionState) -> Option<Value> {
        let receiver = state.env().borrow().get("Self")?;
        let has_method = match &receiver {
            Value::Object(obj) => obj.class.has_method(name),
            Value::ClassRef(class) => class.has_method(name),
            Value::Record(rec) => rec.borrow().ty.find_method(name, 0).is_some(),
            _ => false,
        };
        has_method.then_some(receiver)
    }

    // --- arguments ---

    /// Arguments for a declared callee: var/out parameters become
    /// references to the caller's slots, lazy parameters become thunks,
    /// everything else is evaluated. Stops at the first pending exception.
    pub(crate) fn prepare_args(
        &mut self,
        decl: &FunctionDecl,
        args: &[Spanned<Expr>],
        state: &mut ExecutionState,
    ) -> InterpResult<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let mode = decl.params.get(i).map(|p| p.mode).unwrap_or_default();
            let value = match mode {
                ParamMode::Var | ParamMode::Out => match self.resolve_slot(arg, state)? {
                    Some(slot) => Value::Reference(slot),
                    None => break,
                },
                ParamMode::Lazy => Value::Lazy(Rc::new(LazyThunk {
                    expr: arg.clone(),
                    env: Rc::clone(state.env()),
                })),
                ParamMode::Value | ParamMode::Const => {
                    let value = self.eval_expr(arg, state)?;
                    if state.has_exception() {
                        break;
                    }
                    value.deref()?
                }
            };
            values.push(value);
        }
        Ok(values)
    }

    /// Validate the argument count and append defaults for missing
    /// trailing parameters, evaluated in the caller's scope
    pub fn fill_default_arguments(
        &mut self,
        decl: &FunctionDecl,
        mut args: Vec<Value>,
        state: &mut ExecutionState,
    ) -> InterpResult<Vec<Value>> {
        let required = decl.required_params();
        let total = decl.params.len();
        if args.len() < required {
            return Err(RuntimeError::too_few_arguments(required, args.len()));
        }
        if args.len() > total {
            return Err(RuntimeError::too_many_arguments(total, args.len()));
        }

        for param in &decl.params[args.len()..] {
            let Some(default) = &param.default else {
                return Err(RuntimeError::too_few_arguments(required, args.len()));
            };
            let value = self.eval_expr(default, state)?;
            if state.has_exception() {
                break;
            }
            args.push(value.deref()?);
        }
        Ok(args)
    }

    // --- callables ---

    /// Call a function pointer with unevaluated arguments
    pub(crate) fn call_callable_exprs(
        &mut self,
        callable: &Callable,
        args: &[Spanned<Expr>],
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        let values = match callable {
            Callable::Function { decl, .. } | Callable::Method { decl, .. } => {
                let decl = Rc::clone(decl);
                self.prepare_args(&decl, args, state)?
            }
            Callable::Builtin(_) => self.eval_args(args, state)?,
        };
        propagate!(state);
        self.call_callable(callable, values, pos, state)
    }

    /// Call a function pointer with evaluated arguments
    pub fn call_callable(
        &mut self,
        callable: &Callable,
        args: Vec<Value>,
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        match callable {
            Callable::Function { decl, scope } => {
                let function = UserFunction {
                    decl: Rc::clone(decl),
                    scope: Rc::clone(scope),
                };
                self.execute_user_function(&function, args, None, pos, state)
            }
            Callable::Method {
                decl,
                receiver,
                scope,
            } => {
                let function = UserFunction {
                    decl: Rc::clone(decl),
                    scope: Rc::clone(scope),
                };
                self.execute_user_function(&function, args, Some((**receiver).clone()), pos, state)
            }
            Callable::Builtin(name) => {
                let builtin = self
                    .builtins
                    .get(name)
                    .ok_or_else(|| RuntimeError::undefined_function(name))?;
                let result = builtin(self.output.as_mut(), &args);
                self.native_result(result, pos, state)
            }
        }
    }

    // ========================================================================
    // User-function invocation
    // ========================================================================

    /// Run a user function, method or lambda.
    ///
    /// `receiver` is bound as `Self` in the callee scope.
    #[tracing::instrument(level = "debug", skip_all, fields(function = %function.decl.qualified_name()))]
    pub fn execute_user_function(
        &mut self,
        function: &UserFunction,
        args: Vec<Value>,
        receiver: Option<Value>,
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        let decl = Rc::clone(&function.decl);
        let args = self.fill_default_arguments(&decl, args, state)?;
        propagate!(state);

        let env = child_env(&function.scope);
        if let Some(receiver) = receiver {
            env.borrow_mut().define("Self", receiver);
        }
        let mut callee = state.with_env(env);

        callee.check_recursion()?;
        callee.push_call_frame(&decl.qualified_name(), &self.config.source_file, pos)?;
        let result = self.run_user_function(&decl, &args, &mut callee);
        callee.pop_call_frame();

        if let Some(cleanup) = self.cleanup.clone() {
            cleanup(callee.env());
        }
        result
    }

    fn param_type(&self, name: Option<&str>) -> Option<Type> {
        name.and_then(|n| resolve_type(self.types.as_ref(), n).ok())
    }

    fn run_user_function(
        &mut self,
        decl: &FunctionDecl,
        args: &[Value],
        callee: &mut ExecutionState,
    ) -> InterpResult<Value> {
        let env = Rc::clone(callee.env());

        for (param, arg) in decl.params.iter().zip(args) {
            let bound = match param.mode {
                ParamMode::Var | ParamMode::Out | ParamMode::Lazy => arg.clone(),
                ParamMode::Value | ParamMode::Const => {
                    let value = arg.deref()?;
                    let value = match self.param_type(param.ty.as_deref()) {
                        Some(ty) => convert_implicit(&value, &ty).unwrap_or(value),
                        None => value,
                    };
                    value.copy_on_assign()
                }
            };
            env.borrow_mut().define(&param.name, bound);
        }

        let return_type = self.param_type(decl.return_type.as_deref());
        if decl.return_type.is_some() {
            let initial = return_type.as_ref().map(default_value).unwrap_or(Value::Nil);
            let mut scope = env.borrow_mut();
            scope.define("Result", initial);
            if !same_name(&decl.name, "Result") {
                scope.define(
                    &decl.name,
                    Value::Reference(Reference::Variable {
                        env: Rc::clone(&env),
                        name: "Result".to_string(),
                    }),
                );
            }
        }

        self.check_conditions(ContractKind::Pre, decl, &decl.pre, callee)?;
        propagate!(callee);

        let old_values = self.capture_old_values(&decl.post, callee);
        callee.push_old_values(old_values);
        let result = self.run_body(decl, args, return_type.as_ref(), callee);
        callee.pop_old_values();
        result
    }

    fn run_body(
        &mut self,
        decl: &FunctionDecl,
        args: &[Value],
        return_type: Option<&Type>,
        callee: &mut ExecutionState,
    ) -> InterpResult<Value> {
        let body = decl.body.as_ref().ok_or_else(|| {
            RuntimeError::invalid_operation(format!(
                "{} has no implementation",
                decl.qualified_name()
            ))
        })?;
        self.exec_stmts(body, callee)?;
        if callee.is_exit() || callee.is_return() {
            callee.clear_control_flow();
        }
        propagate!(callee);

        let env = Rc::clone(callee.env());
        for (param, arg) in decl.params.iter().zip(args) {
            let Value::Reference(target) = arg else {
                continue;
            };
            if !param.mode.is_by_ref() {
                continue;
            }
            let local = env.borrow().get_local(&param.name);
            if let Some(local) = local {
                target.assign(local.deref()?)?;
            }
        }

        let result = if decl.return_type.is_some() {
            let value = env.borrow().get_local("Result").unwrap_or(Value::Nil);
            let value = value.deref()?;
            match return_type {
                Some(ty) => convert_implicit(&value, ty).unwrap_or(value),
                None => value,
            }
        } else {
            Value::Nil
        };

        self.check_conditions(ContractKind::Post, decl, &decl.post, callee)?;
        propagate!(callee);
        Ok(result)
    }
}
