//! Node dispatcher
//!
//! `Evaluator::eval` is the single recursive entry point. Expressions and
//! statements the core understands are handled here and in the sibling
//! modules (`ops`, `stmt`, `call`, `dispatch`, ...); declaration nodes and
//! class-aware expressions go to the general-evaluation collaborator.

use super::builtins::{BuiltinRegistry, Output, StdoutOutput};
use super::collab::{MethodDispatcher, NodeEvaluator};
use super::env::{EnvRef, Environment};
use super::error::{InterpResult, RuntimeError};
use super::state::ExecutionState;
use super::value::{Callable, RecordValue, SetValue, Value};
use crate::ast::{Expr, FieldInit, FunctionDecl, Node, Position, Program, Spanned};
use crate::config::EvalConfig;
use crate::types::{ArrayType, FieldInfo, RecordType, Type, TypeRegistry};
use crate::util::{find_similar_name, format_suggestion_hint, normalize};
use std::collections::HashMap;
use std::rc::Rc;

/// Called with the callee scope when a user function returns
pub type CleanupHook = Rc<dyn Fn(&EnvRef)>;

/// A user function together with the scope it was declared in
#[derive(Clone)]
pub struct UserFunction {
    pub decl: Rc<FunctionDecl>,
    pub scope: EnvRef,
}

/// The tree-walking evaluator
pub struct Evaluator {
    pub(crate) config: EvalConfig,
    pub(crate) types: Rc<dyn TypeRegistry>,
    pub(crate) builtins: BuiltinRegistry,
    /// Free functions by normalized name; overloads differ by arity
    pub(crate) functions: HashMap<String, Vec<UserFunction>>,
    pub(crate) dispatcher: Option<Rc<dyn MethodDispatcher>>,
    pub(crate) fallback: Option<Rc<dyn NodeEvaluator>>,
    pub(crate) globals: EnvRef,
    /// Innermost node position seen, for diagnostics
    pub(crate) current_pos: Position,
    pub(crate) output: Box<dyn Output>,
    pub(crate) cleanup: Option<CleanupHook>,
}

impl Evaluator {
    /// Evaluator with the standard builtins and no collaborators
    pub fn new(config: EvalConfig, types: Rc<dyn TypeRegistry>) -> Self {
        Self {
            config,
            types,
            builtins: BuiltinRegistry::standard(),
            functions: HashMap::new(),
            dispatcher: None,
            fallback: None,
            globals: Environment::new().into_ref(),
            current_pos: Position::default(),
            output: Box::new(StdoutOutput),
            cleanup: None,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Rc<dyn MethodDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_fallback(mut self, fallback: Rc<dyn NodeEvaluator>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_output(mut self, output: Box<dyn Output>) -> Self {
        self.output = output;
        self
    }

    pub fn with_cleanup(mut self, hook: CleanupHook) -> Self {
        self.cleanup = Some(hook);
        self
    }

    /// Fresh execution state rooted at the global scope
    pub fn new_state(&self) -> ExecutionState {
        ExecutionState::new(Rc::clone(&self.globals), self.config.max_recursion_depth)
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn types(&self) -> &Rc<dyn TypeRegistry> {
        &self.types
    }

    pub fn globals(&self) -> &EnvRef {
        &self.globals
    }

    pub fn builtins_mut(&mut self) -> &mut BuiltinRegistry {
        &mut self.builtins
    }

    pub fn current_position(&self) -> Position {
        self.current_pos
    }

    // --- user functions ---

    /// Register a free function; a declaration with the same arity replaces
    /// the previous one (forward declarations, redefinitions)
    pub fn register_function(&mut self, decl: Rc<FunctionDecl>, scope: EnvRef) {
        let overloads = self.functions.entry(normalize(&decl.name)).or_default();
        let function = UserFunction { decl, scope };
        match overloads
            .iter_mut()
            .find(|f| f.decl.params.len() == function.decl.params.len())
        {
            Some(slot) => *slot = function,
            None => overloads.push(function),
        }
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(&normalize(name))
    }

    /// Overload accepting `argc` arguments, else the first declared
    pub fn find_function(&self, name: &str, argc: usize) -> Option<UserFunction> {
        let candidates = self.functions.get(&normalize(name))?;
        candidates
            .iter()
            .find(|f| f.decl.accepts(argc))
            .or_else(|| candidates.first())
            .cloned()
    }

    // ========================================================================
    // Entry point
    // ========================================================================

    /// Evaluate any node
    pub fn eval(&mut self, node: Node<'_>, state: &mut ExecutionState) -> InterpResult<Value> {
        let pos = node.pos();
        if !pos.is_unknown() {
            self.current_pos = pos;
        }
        match node {
            Node::Program(program) => self.run_program(program, state),
            Node::Stmt(stmt) => {
                self.exec_stmt(stmt, state)?;
                Ok(Value::Nil)
            }
            Node::Expr(expr) => self.eval_expr(expr, state),
        }
    }

    fn run_program(&mut self, program: &Program, state: &mut ExecutionState) -> InterpResult<Value> {
        tracing::debug!(statements = program.statements.len(), "running program");
        self.exec_stmts(&program.statements, state)?;
        // exit at top level ends the program
        if state.is_exit() || state.is_return() {
            state.clear_control_flow();
        }
        Ok(Value::Nil)
    }

    /// Hand a node to the general-evaluation collaborator
    pub(crate) fn delegate(&mut self, node: Node<'_>, state: &mut ExecutionState) -> InterpResult<Value> {
        let Some(fallback) = self.fallback.clone() else {
            return Err(RuntimeError::missing_collaborator("general evaluator").at(node.pos()));
        };
        tracing::trace!(pos = %node.pos(), "delegating node");
        fallback.eval_node(self, node, state)
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Evaluate an expression with automatic stack growth for deep recursion
    pub fn eval_expr(&mut self, expr: &Spanned<Expr>, state: &mut ExecutionState) -> InterpResult<Value> {
        let (red_zone, grow) = (self.config.stack_red_zone, self.config.stack_grow_size);
        stacker::maybe_grow(red_zone, grow, || self.eval_expr_inner(expr, state))
            .map_err(|e| e.at(expr.pos))
    }

    fn eval_expr_inner(&mut self, expr: &Spanned<Expr>, state: &mut ExecutionState) -> InterpResult<Value> {
        if !expr.pos.is_unknown() {
            self.current_pos = expr.pos;
        }
        let pos = expr.pos;
        match &expr.node {
            Expr::IntLit(n) => Ok(Value::Int(*n)),
            Expr::FloatLit(x) => Ok(Value::Float(*x)),
            Expr::StrLit(s) => Ok(Value::string(s.as_str())),
            Expr::CharLit(c) => Ok(Value::string(c.to_string())),
            Expr::BoolLit(b) => Ok(Value::Bool(*b)),
            Expr::Nil => Ok(Value::Nil),

            Expr::Ident(name) => self.resolve_identifier(name, pos, state),
            Expr::SelfRef => state
                .env()
                .borrow()
                .get("Self")
                .ok_or_else(|| RuntimeError::invalid_operation("Self used outside a method")),

            Expr::Binary { left, op, right } => self.eval_binary(left, *op, right, pos, state),
            Expr::Unary { op, expr: operand } => self.eval_unary(*op, operand, state),
            Expr::Grouped(inner) => self.eval_expr(inner, state),

            Expr::Call { func, args } => self.eval_call(func, args, pos, state),
            Expr::MethodCall {
                receiver,
                method,
                args,
            } => self.eval_method_call(receiver, method, args, pos, state),
            Expr::Member { object, member } => self.eval_member(object, member, pos, state),
            Expr::Index { base, index } => self.eval_index(base, index, state),

            Expr::ArrayLit(items) => self.eval_array_literal(items, state),
            Expr::SetLit(items) => self.eval_set_literal(items, state),
            Expr::RecordLit { type_name, fields } => {
                self.eval_record_literal(type_name.as_deref(), fields, state)
            }
            Expr::Range { .. } => Err(RuntimeError::invalid_operation(
                "range is only valid in set literals and case labels",
            )),

            Expr::Lambda(decl) => Ok(Value::Function(Callable::Function {
                decl: Rc::new((**decl).clone()),
                scope: Rc::clone(state.env()),
            })),
            Expr::Old(name) => state
                .lookup_old_value(name)
                .ok_or_else(|| RuntimeError::old_value_not_captured(name)),
            Expr::AddressOf(target) => self.eval_address_of(target, state),
            Expr::IfExpr {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.eval_expr(cond, state)?;
                propagate!(state);
                if cond.expect_bool("if expression")? {
                    self.eval_expr(then_branch, state)
                } else {
                    self.eval_expr(else_branch, state)
                }
            }

            Expr::Is { .. }
            | Expr::As { .. }
            | Expr::Implements { .. }
            | Expr::Inherited { .. }
            | Expr::New { .. } => self.delegate(Node::Expr(expr), state),
        }
    }

    /// Evaluate arguments left to right, dereferencing each; stops at the
    /// first pending exception
    pub(crate) fn eval_args(&mut self, args: &[Spanned<Expr>], state: &mut ExecutionState) -> InterpResult<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let value = self.eval_expr(arg, state)?;
            if state.has_exception() {
                break;
            }
            values.push(value.deref()?);
        }
        Ok(values)
    }

    // --- identifiers ---

    /// Resolve a bare identifier.
    ///
    /// Order: scope chain, members of `Self`, parameterless functions and
    /// builtins, class names, enum type names, unscoped enum members.
    pub(crate) fn resolve_identifier(&mut self, name: &str, pos: Position, state: &mut ExecutionState) -> InterpResult<Value> {
        let bound = state.env().borrow().get(name);
        if let Some(value) = bound {
            return self.read_binding(value, state);
        }

        if let Some(value) = self.resolve_self_member(name, pos, state)? {
            return Ok(value);
        }

        if self.has_function(name) || self.builtins.contains(name) {
            return self.call_named(name, &[], pos, state);
        }

        if let Some(class) = self.types.lookup_class(name) {
            return Ok(Value::ClassRef(class));
        }
        if let Some(ty) = self.types.lookup_enum(name) {
            return Ok(Value::TypeMeta(Type::Enum(ty)));
        }
        if let Some(ty) = self.types.lookup_record(name) {
            return Ok(Value::TypeMeta(Type::Record(ty)));
        }
        if let Some((ty, ordinal)) = self.types.lookup_enum_value(name) {
            return Ok(Value::enum_value(ty, ordinal));
        }

        let names = state.env().borrow().visible_names();
        let candidates: Vec<&str> = names.iter().map(String::as_str).collect();
        let hint = format_suggestion_hint(find_similar_name(name, &candidates, 2));
        let mut err = RuntimeError::undefined_variable(name);
        err.message.push_str(&hint);
        Err(err)
    }

    /// Plain value of a scope binding: references are followed, lazy
    /// arguments evaluated in their own scope
    pub(crate) fn read_binding(&mut self, value: Value, state: &mut ExecutionState) -> InterpResult<Value> {
        match value {
            Value::Reference(r) => match r.deref()? {
                Value::Lazy(thunk) => self.force_lazy(&thunk, state),
                other => Ok(other),
            },
            Value::Lazy(thunk) => self.force_lazy(&thunk, state),
            other => Ok(other),
        }
    }

    fn force_lazy(&mut self, thunk: &super::value::LazyThunk, state: &ExecutionState) -> InterpResult<Value> {
        let mut lazy_state = state.with_env(Rc::clone(&thunk.env));
        let value = self.eval_expr(&thunk.expr, &mut lazy_state)?;
        value.deref()
    }

    /// Fields, properties, class variables and parameterless methods of
    /// the implicit receiver
    fn resolve_self_member(&mut self, name: &str, pos: Position, state: &mut ExecutionState) -> InterpResult<Option<Value>> {
        let receiver = state.env().borrow().get("Self");
        let Some(receiver) = receiver else {
            return Ok(None);
        };
        match &receiver {
            Value::Object(obj) => {
                if let Some(value) = obj.field(name) {
                    return Ok(Some(value));
                }
                if let Some(prop) = obj.class.find_property(name) {
                    return self.read_property(&receiver, &prop, pos, state).map(Some);
                }
                if let Some(value) = obj.class.class_var(name) {
                    return Ok(Some(value));
                }
                if obj.class.has_method(name) {
                    return self.call_method(&receiver, name, Vec::new(), pos, state).map(Some);
                }
            }
            Value::Record(rec) => {
                let field = rec.borrow().field(name);
                if field.is_some() {
                    return Ok(field);
                }
                let has_method = rec.borrow().ty.find_method(name, 0).is_some();
                if has_method {
                    return self.call_method(&receiver, name, Vec::new(), pos, state).map(Some);
                }
            }
            Value::ClassRef(class) => {
                if let Some(value) = class.class_var(name) {
                    return Ok(Some(value));
                }
                if class.has_method(name) {
                    return self.call_method(&receiver, name, Vec::new(), pos, state).map(Some);
                }
            }
            _ => {}
        }
        Ok(None)
    }

    // --- indexing ---

    fn eval_index(&mut self, base: &Spanned<Expr>, index: &Spanned<Expr>, state: &mut ExecutionState) -> InterpResult<Value> {
        let container = self.eval_expr(base, state)?;
        propagate!(state);
        let index = self.eval_expr(index, state)?;
        propagate!(state);
        let index = index.deref()?;

        match container.deref()?.unvariant() {
            Value::Array(arr) => {
                let logical = index.expect_int("array index")?;
                arr.borrow().get(logical)
            }
            Value::Str(s) => {
                let logical = index.expect_int("string index")?;
                let len = s.chars().count() as i64;
                if logical < 1 || logical > len {
                    return Err(RuntimeError::index_out_of_bounds(logical, 1, len));
                }
                let c = s.chars().nth((logical - 1) as usize).unwrap_or(' ');
                Ok(Value::string(c.to_string()))
            }
            Value::Nil => Err(RuntimeError::nil_receiver()),
            other => Err(RuntimeError::type_mismatch("array or string", &other.type_name())),
        }
    }

    // --- literals ---

    fn eval_array_literal(&mut self, items: &[Spanned<Expr>], state: &mut ExecutionState) -> InterpResult<Value> {
        let values = self.eval_args(items, state)?;
        propagate!(state);
        let element = values.first().map(Type::of_value).unwrap_or(Type::Variant);
        let values = values.iter().map(Value::copy_on_assign).collect();
        Ok(Value::array(Rc::new(ArrayType::dynamic(element)), values))
    }

    fn eval_set_literal(&mut self, items: &[Spanned<Expr>], state: &mut ExecutionState) -> InterpResult<Value> {
        let mut set = SetValue::empty(Type::Variant);
        for item in items {
            if let Expr::Range { low, high } = &item.node {
                let low = self.eval_expr(low, state)?;
                propagate!(state);
                let high = self.eval_expr(high, state)?;
                propagate!(state);
                let (lo, hi) = match (low.ordinal(), high.ordinal()) {
                    (Some(lo), Some(hi)) => (lo, hi),
                    _ => {
                        return Err(RuntimeError::type_mismatch(
                            "ordinal range",
                            &format!("{}..{}", low.type_name(), high.type_name()),
                        ));
                    }
                };
                set.include(&low)?;
                set.items.extend(lo..=hi);
            } else {
                let value = self.eval_expr(item, state)?;
                propagate!(state);
                set.include(&value.deref()?)?;
            }
        }
        Ok(Value::Set(set.into_ref()))
    }

    fn eval_record_literal(&mut self, type_name: Option<&str>, fields: &[FieldInit], state: &mut ExecutionState) -> InterpResult<Value> {
        let mut values = Vec::with_capacity(fields.len());
        for field in fields {
            let value = self.eval_expr(&field.value, state)?;
            propagate!(state);
            values.push((field.name.as_str(), value.deref()?.copy_on_assign()));
        }

        let record = match type_name {
            Some(name) => {
                let ty = self
                    .types
                    .lookup_record(name)
                    .ok_or_else(|| RuntimeError::unknown_type(name))?;
                let mut record = RecordValue::with_defaults(ty);
                for (name, value) in values {
                    if !record.set_field(name, value) {
                        return Err(RuntimeError::field_not_found(&record.ty.name, name));
                    }
                }
                record
            }
            None => {
                let ty = RecordType::new(
                    "record",
                    values
                        .iter()
                        .map(|(name, value)| FieldInfo::new(*name, Type::of_value(value)))
                        .collect(),
                );
                let fields = values
                    .into_iter()
                    .map(|(name, value)| (normalize(name), value))
                    .collect();
                RecordValue::new(Rc::new(ty), fields)
            }
        };
        Ok(Value::Record(record.into_ref()))
    }

    // --- function pointers ---

    fn eval_address_of(&mut self, target: &Spanned<Expr>, state: &mut ExecutionState) -> InterpResult<Value> {
        match &target.node {
            Expr::Ident(name) => {
                let bound = state.env().borrow().get(name);
                if let Some(Value::Function(callable)) = bound.map(|v| v.deref()).transpose()? {
                    return Ok(Value::Function(callable));
                }
                if let Some(func) = self.find_function(name, usize::MAX) {
                    return Ok(Value::Function(Callable::Function {
                        decl: func.decl,
                        scope: func.scope,
                    }));
                }
                if self.builtins.contains(name) {
                    return Ok(Value::Function(Callable::Builtin(name.clone())));
                }
                Err(RuntimeError::undefined_function(name))
            }
            Expr::Member { object, member } => {
                let receiver = self.eval_expr(object, state)?;
                propagate!(state);
                let receiver = receiver.deref()?;
                let decl = match &receiver {
                    Value::Object(obj) => obj.class.find_method(member, 0),
                    Value::Record(rec) => rec.borrow().ty.find_method(member, 0),
                    Value::ClassRef(class) => class.find_method(member, 0),
                    Value::Nil => return Err(RuntimeError::nil_receiver()),
                    _ => None,
                };
                match decl {
                    Some(decl) => Ok(Value::Function(Callable::Method {
                        decl,
                        receiver: Box::new(receiver),
                        scope: Rc::clone(&self.globals),
                    })),
                    None => Err(RuntimeError::undefined_method(&receiver.type_name(), member)),
                }
            }
            _ => match self.eval_expr(target, state)?.deref()? {
                Value::Function(callable) => Ok(Value::Function(callable)),
                other => Err(RuntimeError::type_mismatch("function", &other.type_name())),
            },
        }
    }
}
