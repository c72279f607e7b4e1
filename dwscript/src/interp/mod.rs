//! Tree-walking evaluator
//!
//! [`Evaluator`] walks the syntax tree; [`ExecutionState`] carries the
//! per-run context (scope chain, call stack, control flow, the pending
//! exception). [`Interpreter`] wires both together with the standard type
//! table and the declaration collaborators for hosts that just want to run
//! a program.

/// Return early from an evaluation routine while a script exception is
/// pending. The one-argument form yields `Ok(Value::Nil)`.
macro_rules! propagate {
    ($state:expr) => {
        if $state.has_exception() {
            return Ok($crate::interp::Value::Nil);
        }
    };
    ($state:expr, $ret:expr) => {
        if $state.has_exception() {
            return Ok($ret);
        }
    };
}

mod builtins;
mod call;
mod collab;
mod contracts;
mod datetime;
mod dispatch;
mod env;
mod error;
mod eval;
mod exceptions;
pub mod helpers;
mod inplace;
mod lvalue;
mod oop;
mod ops;
mod state;
mod stmt;
mod value;

pub use builtins::{BuiltinFn, BuiltinRegistry, CapturedOutput, Output, StdoutOutput};
pub use collab::{MethodDispatcher, NodeEvaluator};
pub use contracts::{collect_old_references, contract_message, ContractKind};
pub use env::{EnvRef, Environment};
pub use error::{ErrorKind, InterpResult, RuntimeError};
pub use eval::{CleanupHook, Evaluator, UserFunction};
pub use exceptions::{ExceptionValue, BASE_EXCEPTION};
pub use inplace::InPlaceOp;
pub use lvalue::AssignFunc;
pub use oop::{DeclarationDispatcher, DeclarationEvaluator};
pub use state::{ControlFlowKind, ExecutionState, StackFrame};
pub use value::{
    ArrayValue, Callable, FieldOwner, LazyThunk, ObjectInstance, RecordValue, Reference, SetValue, Value,
};

use crate::ast::{Expr, Node, Program, Spanned};
use crate::config::EvalConfig;
use crate::error::Error;
use crate::types::{TypeRegistry, TypeTable};
use std::rc::Rc;

/// Evaluator, state and type table bundled for running whole programs
pub struct Interpreter {
    evaluator: Evaluator,
    state: ExecutionState,
    types: Rc<TypeTable>,
    captured: Option<CapturedOutput>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(EvalConfig::default())
    }

    /// Interpreter writing to stdout with the given limits
    pub fn with_config(config: EvalConfig) -> Self {
        Self::build(config, None)
    }

    /// Interpreter whose `Print` output is kept for [`Interpreter::output`]
    pub fn with_captured_output() -> Self {
        Self::build(EvalConfig::default(), Some(CapturedOutput::new()))
    }

    fn build(config: EvalConfig, captured: Option<CapturedOutput>) -> Self {
        let types = Rc::new(TypeTable::standard());
        let registry: Rc<dyn TypeRegistry> = types.clone();
        let mut evaluator = Evaluator::new(config, registry)
            .with_dispatcher(Rc::new(DeclarationDispatcher))
            .with_fallback(Rc::new(DeclarationEvaluator::new(Rc::clone(&types))));
        if let Some(captured) = &captured {
            evaluator = evaluator.with_output(Box::new(captured.clone()));
        }
        let state = evaluator.new_state();
        Self {
            evaluator,
            state,
            types,
            captured,
        }
    }

    /// Run a whole program. An exception that escapes every handler is
    /// reported as [`Error::Uncaught`].
    pub fn run(&mut self, program: &Program) -> crate::Result<Value> {
        self.state.reset();
        let value = self.evaluator.eval(Node::Program(program), &mut self.state)?;
        if let Some(exc) = self.state.take_exception() {
            tracing::debug!(class = %exc.class_name(), "uncaught exception");
            return Err(Error::Uncaught {
                class: exc.class_name().to_string(),
                message: exc.message,
                position: Some(exc.position),
            });
        }
        Ok(value)
    }

    /// Evaluate a single expression against the current globals
    pub fn eval_expr(&mut self, expr: &Spanned<Expr>) -> InterpResult<Value> {
        self.evaluator.eval_expr(expr, &mut self.state)
    }

    /// Captured output so far; empty when writing to stdout
    pub fn output(&self) -> String {
        self.captured.as_ref().map(CapturedOutput::contents).unwrap_or_default()
    }

    /// Current value of a global variable
    pub fn global(&self, name: &str) -> Option<Value> {
        let value = self.evaluator.globals().borrow().get_local(name)?;
        value.deref().ok()
    }

    pub fn parts(&mut self) -> (&mut Evaluator, &mut ExecutionState) {
        (&mut self.evaluator, &mut self.state)
    }

    pub fn types(&self) -> &Rc<TypeTable> {
        &self.types
    }

    pub fn evaluator_mut(&mut self) -> &mut Evaluator {
        &mut self.evaluator
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
