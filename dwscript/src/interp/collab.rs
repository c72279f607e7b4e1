//! Collaborator seams
//!
//! The evaluator natively handles expressions, statements, calls and
//! primitive method dispatch. Anything that needs class/record metadata
//! goes through these two traits.

use super::error::InterpResult;
use super::eval::Evaluator;
use super::state::ExecutionState;
use super::value::Value;
use crate::ast::{Node, Position};

/// Declaration-aware method dispatch for objects, interfaces, class
/// references and records
pub trait MethodDispatcher {
    fn call_method(
        &self,
        eval: &mut Evaluator,
        receiver: &Value,
        method: &str,
        args: Vec<Value>,
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<Value>;
}

/// General evaluation of node kinds outside the native set
pub trait NodeEvaluator {
    fn eval_node(
        &self,
        eval: &mut Evaluator,
        node: Node<'_>,
        state: &mut ExecutionState,
    ) -> InterpResult<Value>;
}
