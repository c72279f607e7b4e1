//! Script exceptions: raising, `try/except/finally`, `Assert`

use super::error::{InterpResult, RuntimeError};
use super::eval::Evaluator;
use super::state::{ExecutionState, StackFrame};
use super::value::{ObjectInstance, ObjectRef, Value};
use crate::ast::{ExceptClause, Position, Spanned, Stmt};
use crate::types::{ClassInfo, FieldInfo, Type};
use std::fmt;
use std::rc::Rc;

/// Class raised when no better match is registered
pub const BASE_EXCEPTION: &str = "Exception";

/// A raised script exception
#[derive(Debug, Clone)]
pub struct ExceptionValue {
    pub class: Rc<ClassInfo>,
    /// The exception object (`E` in `on E: Exception do`)
    pub instance: ObjectRef,
    pub message: String,
    pub position: Position,
    /// Calls active when the exception was raised, innermost last
    pub call_stack: Vec<StackFrame>,
}

impl ExceptionValue {
    pub fn class_name(&self) -> &str {
        &self.class.name
    }

    /// Whether `on E: <class_name>` catches this exception
    pub fn is_instance_of(&self, class_name: &str) -> bool {
        self.class.is_descendant_of(class_name)
    }
}

impl fmt::Display for ExceptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class.name, self.message)
    }
}

impl Evaluator {
    /// Class registered under `name`, else `Exception`, else a bare stand-in
    fn exception_class(&self, name: &str) -> Rc<ClassInfo> {
        self.types
            .lookup_class(name)
            .or_else(|| self.types.lookup_class(BASE_EXCEPTION))
            .unwrap_or_else(|| {
                Rc::new(
                    ClassInfo::new(BASE_EXCEPTION, None)
                        .with_field(FieldInfo::new("Message", Type::String)),
                )
            })
    }

    /// Record a new exception of class `class_name` in the state
    pub fn raise_exception(
        &self,
        state: &ExecutionState,
        class_name: &str,
        message: &str,
        pos: Position,
    ) {
        let class = self.exception_class(class_name);
        let instance = Rc::new(ObjectInstance::new(class));
        instance.set_field("Message", Value::string(message));
        self.raise_object(state, instance, pos);
    }

    /// Raise an existing exception object; the message comes from its
    /// `Message` field
    pub fn raise_object(&self, state: &ExecutionState, instance: ObjectRef, pos: Position) {
        let message = instance
            .field("Message")
            .map(|m| m.to_string())
            .unwrap_or_default();
        tracing::debug!(
            class = %instance.class.name,
            message = %message,
            position = %pos,
            "exception raised"
        );
        state.set_exception(ExceptionValue {
            class: Rc::clone(&instance.class),
            instance,
            message,
            position: pos,
            call_stack: state.stack_trace(),
        });
    }

    /// `raise [expr]`
    pub(crate) fn exec_raise(
        &mut self,
        expr: Option<&Spanned<crate::ast::Expr>>,
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<()> {
        let Some(expr) = expr else {
            return match state.handler_exception() {
                Some(current) => {
                    tracing::debug!(class = %current.class.name, "exception re-raised");
                    state.set_exception(current);
                    Ok(())
                }
                None => Err(RuntimeError::invalid_operation(
                    "re-raise outside an exception handler",
                )),
            };
        };

        let value = self.eval_expr(expr, state)?;
        propagate!(state, ());
        match value.deref()?.unvariant() {
            Value::Object(obj) => {
                self.raise_object(state, obj, pos);
                Ok(())
            }
            Value::Str(message) => {
                self.raise_exception(state, BASE_EXCEPTION, &message, pos);
                Ok(())
            }
            Value::Nil => Err(RuntimeError::nil_receiver()),
            other => Err(RuntimeError::type_mismatch("exception object", &other.type_name())),
        }
    }

    /// `try .. except .. finally .. end`
    pub(crate) fn exec_try(
        &mut self,
        block: &[Spanned<Stmt>],
        except: Option<&ExceptClause>,
        finally: Option<&[Spanned<Stmt>]>,
        state: &mut ExecutionState,
    ) -> InterpResult<()> {
        let result = self.exec_try_except(block, except, state);

        let Some(finally) = finally else {
            return result;
        };

        // finally runs with the pending exception and signal parked
        let pending = state.take_exception();
        let flow = state.control_flow();
        state.clear_control_flow();

        let finally_result = self.exec_stmts(finally, state);

        if !state.has_exception() {
            if let Some(pending) = pending {
                state.set_exception(pending);
            }
        }
        if !state.is_control_flow_active() {
            state.restore_control_flow(flow);
        }

        result?;
        finally_result
    }

    fn exec_try_except(
        &mut self,
        block: &[Spanned<Stmt>],
        except: Option<&ExceptClause>,
        state: &mut ExecutionState,
    ) -> InterpResult<()> {
        self.exec_stmts(block, state)?;

        let Some(clause) = except else {
            return Ok(());
        };
        let Some(exception) = state.take_exception() else {
            return Ok(());
        };

        if let Some(handler) = clause
            .handlers
            .iter()
            .find(|h| exception.is_instance_of(&h.class_name))
        {
            return self.run_handler(
                handler.var.as_deref(),
                std::slice::from_ref(handler.body.as_ref()),
                exception,
                state,
            );
        }

        match &clause.default {
            Some(default) => self.run_handler(None, default, exception, state),
            None => {
                state.set_exception(exception);
                Ok(())
            }
        }
    }

    fn run_handler(
        &mut self,
        var: Option<&str>,
        body: &[Spanned<Stmt>],
        exception: ExceptionValue,
        state: &mut ExecutionState,
    ) -> InterpResult<()> {
        tracing::debug!(class = %exception.class.name, "exception handled");
        let instance = Rc::clone(&exception.instance);
        let previous = state.replace_handler_exception(Some(exception));
        state.push_scope();
        if let Some(var) = var {
            state
                .env()
                .borrow_mut()
                .define(var, Value::Object(instance));
        }
        let result = self.exec_stmts(body, state);
        state.pop_scope();
        state.replace_handler_exception(previous);
        result
    }

    /// `Assert(cond[, message])`
    pub(crate) fn call_assert(
        &mut self,
        args: &[Value],
        pos: Position,
        state: &ExecutionState,
    ) -> InterpResult<Value> {
        if args.is_empty() || args.len() > 2 {
            return Err(RuntimeError::arity_mismatch("Assert", "1 or 2", args.len()));
        }
        if !args[0].expect_bool("Assert")? {
            let message = match args.get(1) {
                Some(msg) => msg.to_string(),
                None => "Assertion failed".to_string(),
            };
            self.raise_exception(state, "EAssertionFailed", &message, pos);
        }
        Ok(Value::Nil)
    }
}
