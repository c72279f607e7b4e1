//! Per-call execution state
//!
//! Cloning a state shares the call stack, control-flow signal, exception
//! cells, old-value stack and property guard; only the environment (and the
//! scopes pushed on top of it) belongs to the clone.

use super::env::{child_env, EnvRef};
use super::error::{InterpResult, RuntimeError};
use super::exceptions::ExceptionValue;
use super::value::Value;
use crate::ast::Position;
use crate::util::normalize;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Non-local control-flow signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlFlowKind {
    #[default]
    None,
    Break,
    Continue,
    Exit,
    Return,
}

/// One active call
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame {
    pub function: String,
    pub file: String,
    pub position: Position,
}

impl std::fmt::Display for StackFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}] in {}", self.function, self.position, self.file)
    }
}

/// Bounded stack of active calls
#[derive(Debug)]
pub struct CallStack {
    frames: Vec<StackFrame>,
    max_depth: usize,
}

impl CallStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            frames: Vec::new(),
            max_depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether one more frame would exceed the limit
    pub fn would_overflow(&self) -> bool {
        self.frames.len() >= self.max_depth
    }

    pub fn push(&mut self, frame: StackFrame) -> InterpResult<()> {
        if self.would_overflow() {
            return Err(RuntimeError::stack_overflow());
        }
        self.frames.push(frame);
        Ok(())
    }

    /// No-op on an empty stack
    pub fn pop(&mut self) -> Option<StackFrame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&StackFrame> {
        self.frames.last()
    }

    /// Copy of the frames, innermost last
    pub fn snapshot(&self) -> Vec<StackFrame> {
        self.frames.clone()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// Tracks property accessors currently running so an accessor that
/// re-enters itself fails instead of recursing forever. A setter may
/// still read its own property through the getter.
#[derive(Debug, Default)]
pub struct PropertyGuard {
    /// Normalized property key and whether the setter is running
    chain: Vec<(String, bool)>,
}

impl PropertyGuard {
    pub fn enter(&mut self, key: &str, setter: bool) -> InterpResult<()> {
        let key = normalize(key);
        if self.chain.iter().any(|(k, s)| *k == key && *s == setter) {
            return Err(RuntimeError::invalid_operation(format!(
                "recursive access to property {key}"
            )));
        }
        self.chain.push((key, setter));
        Ok(())
    }

    pub fn leave(&mut self) {
        self.chain.pop();
    }

    pub fn is_active(&self, key: &str) -> bool {
        let key = normalize(key);
        self.chain.iter().any(|(k, _)| *k == key)
    }

    pub fn clear(&mut self) {
        self.chain.clear();
    }
}

/// Ambient evaluation state threaded through every `eval` call
#[derive(Debug, Clone)]
pub struct ExecutionState {
    env: EnvRef,
    /// Environments to restore on `pop_scope`
    scopes: Vec<EnvRef>,
    call_stack: Rc<RefCell<CallStack>>,
    control_flow: Rc<Cell<ControlFlowKind>>,
    exception: Rc<RefCell<Option<ExceptionValue>>>,
    handler_exception: Rc<RefCell<Option<ExceptionValue>>>,
    old_values: Rc<RefCell<Vec<HashMap<String, Value>>>>,
    property_guard: Rc<RefCell<PropertyGuard>>,
}

impl ExecutionState {
    pub fn new(env: EnvRef, max_depth: usize) -> Self {
        Self {
            env,
            scopes: Vec::new(),
            call_stack: Rc::new(RefCell::new(CallStack::new(max_depth))),
            control_flow: Rc::new(Cell::new(ControlFlowKind::None)),
            exception: Rc::new(RefCell::new(None)),
            handler_exception: Rc::new(RefCell::new(None)),
            old_values: Rc::new(RefCell::new(Vec::new())),
            property_guard: Rc::new(RefCell::new(PropertyGuard::default())),
        }
    }

    /// A handle sharing every cell with `self` but evaluating in `env`
    pub fn with_env(&self, env: EnvRef) -> Self {
        Self {
            env,
            scopes: Vec::new(),
            ..self.clone()
        }
    }

    pub fn env(&self) -> &EnvRef {
        &self.env
    }

    pub fn set_env(&mut self, env: EnvRef) {
        self.env = env;
    }

    // --- scopes ---

    pub fn push_scope(&mut self) {
        let child = child_env(&self.env);
        let parent = std::mem::replace(&mut self.env, child);
        self.scopes.push(parent);
    }

    /// Restores the environment active before the matching `push_scope`;
    /// a no-op when nothing was pushed
    pub fn pop_scope(&mut self) {
        if let Some(parent) = self.scopes.pop() {
            self.env = parent;
        }
    }

    // --- call stack ---

    pub fn call_depth(&self) -> usize {
        self.call_stack.borrow().depth()
    }

    pub fn check_recursion(&self) -> InterpResult<()> {
        if self.call_stack.borrow().would_overflow() {
            return Err(RuntimeError::stack_overflow());
        }
        Ok(())
    }

    pub fn push_call_frame(&self, function: &str, file: &str, position: Position) -> InterpResult<()> {
        self.call_stack.borrow_mut().push(StackFrame {
            function: function.to_string(),
            file: file.to_string(),
            position,
        })
    }

    pub fn pop_call_frame(&self) {
        self.call_stack.borrow_mut().pop();
    }

    pub fn current_frame(&self) -> Option<StackFrame> {
        self.call_stack.borrow().top().cloned()
    }

    pub fn stack_trace(&self) -> Vec<StackFrame> {
        self.call_stack.borrow().snapshot()
    }

    // --- control flow ---

    pub fn set_break(&self) {
        self.control_flow.set(ControlFlowKind::Break);
    }

    pub fn set_continue(&self) {
        self.control_flow.set(ControlFlowKind::Continue);
    }

    pub fn set_exit(&self) {
        self.control_flow.set(ControlFlowKind::Exit);
    }

    pub fn set_return(&self) {
        self.control_flow.set(ControlFlowKind::Return);
    }

    /// Reinstate a signal saved earlier (after a `finally` block)
    pub fn restore_control_flow(&self, kind: ControlFlowKind) {
        self.control_flow.set(kind);
    }

    pub fn clear_control_flow(&self) {
        self.control_flow.set(ControlFlowKind::None);
    }

    pub fn control_flow(&self) -> ControlFlowKind {
        self.control_flow.get()
    }

    pub fn is_control_flow_active(&self) -> bool {
        self.control_flow.get() != ControlFlowKind::None
    }

    pub fn is_break(&self) -> bool {
        self.control_flow.get() == ControlFlowKind::Break
    }

    pub fn is_continue(&self) -> bool {
        self.control_flow.get() == ControlFlowKind::Continue
    }

    pub fn is_exit(&self) -> bool {
        self.control_flow.get() == ControlFlowKind::Exit
    }

    pub fn is_return(&self) -> bool {
        self.control_flow.get() == ControlFlowKind::Return
    }

    // --- exceptions ---

    pub fn has_exception(&self) -> bool {
        self.exception.borrow().is_some()
    }

    pub fn exception(&self) -> Option<ExceptionValue> {
        self.exception.borrow().clone()
    }

    pub fn set_exception(&self, exception: ExceptionValue) {
        *self.exception.borrow_mut() = Some(exception);
    }

    pub fn take_exception(&self) -> Option<ExceptionValue> {
        self.exception.borrow_mut().take()
    }

    pub fn handler_exception(&self) -> Option<ExceptionValue> {
        self.handler_exception.borrow().clone()
    }

    /// Returns the previous handler exception so nested handlers can restore it
    pub fn replace_handler_exception(&self, exception: Option<ExceptionValue>) -> Option<ExceptionValue> {
        std::mem::replace(&mut *self.handler_exception.borrow_mut(), exception)
    }

    /// Pending exception or control-flow signal; statement sequences stop here
    pub fn is_interrupted(&self) -> bool {
        self.has_exception() || self.is_control_flow_active()
    }

    // --- contract old values ---

    pub fn push_old_values(&self, values: HashMap<String, Value>) {
        self.old_values.borrow_mut().push(values);
    }

    /// LIFO; None when nothing is pushed
    pub fn pop_old_values(&self) -> Option<HashMap<String, Value>> {
        self.old_values.borrow_mut().pop()
    }

    pub fn old_values_depth(&self) -> usize {
        self.old_values.borrow().len()
    }

    /// Captured value in the innermost snapshot
    pub fn lookup_old_value(&self, name: &str) -> Option<Value> {
        self.old_values
            .borrow()
            .last()
            .and_then(|frame| frame.get(&normalize(name)).cloned())
    }

    // --- property guard ---

    pub fn enter_property(&self, key: &str, setter: bool) -> InterpResult<()> {
        self.property_guard.borrow_mut().enter(key, setter)
    }

    pub fn leave_property(&self) {
        self.property_guard.borrow_mut().leave();
    }

    pub fn in_property(&self, key: &str) -> bool {
        self.property_guard.borrow().is_active(key)
    }

    /// Clear everything except the environment
    pub fn reset(&mut self) {
        self.scopes.clear();
        self.call_stack.borrow_mut().clear();
        self.control_flow.set(ControlFlowKind::None);
        *self.exception.borrow_mut() = None;
        *self.handler_exception.borrow_mut() = None;
        self.old_values.borrow_mut().clear();
        self.property_guard.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::env::Environment;

    fn state() -> ExecutionState {
        ExecutionState::new(Environment::new().into_ref(), 3)
    }

    // --- control flow ---

    #[test]
    fn test_control_flow_signals_are_exclusive() {
        let s = state();
        assert!(!s.is_control_flow_active());

        s.set_break();
        assert!(s.is_control_flow_active());
        assert_eq!(s.control_flow(), ControlFlowKind::Break);

        s.set_continue();
        assert!(!s.is_break());
        assert!(s.is_continue());
        assert_eq!(s.control_flow(), ControlFlowKind::Continue);

        s.set_exit();
        assert!(!s.is_continue());
        assert!(s.is_exit());

        s.set_return();
        assert!(!s.is_exit());
        assert!(s.is_return());

        s.clear_control_flow();
        assert!(!s.is_control_flow_active());
        assert_eq!(s.control_flow(), ControlFlowKind::None);
    }

    // --- scopes ---

    #[test]
    fn test_pop_scope_without_push_is_noop() {
        let mut s = state();
        s.env().borrow_mut().define("x", Value::Int(1));
        let before = Rc::clone(s.env());
        s.pop_scope();
        assert!(Rc::ptr_eq(&before, s.env()));
    }

    #[test]
    fn test_push_pop_scope() {
        let mut s = state();
        s.env().borrow_mut().define("x", Value::Int(1));
        s.push_scope();
        s.env().borrow_mut().define("y", Value::Int(2));
        assert_eq!(s.env().borrow().get("x"), Some(Value::Int(1)));
        s.pop_scope();
        assert_eq!(s.env().borrow().get("y"), None);
    }

    // --- call stack ---

    #[test]
    fn test_call_stack_depth_limit() {
        let s = state();
        for i in 0..3 {
            s.push_call_frame(&format!("f{i}"), "<test>", Position::new(1, 1))
                .unwrap();
        }
        let err = s.push_call_frame("f3", "<test>", Position::default()).unwrap_err();
        assert_eq!(err.kind, crate::interp::ErrorKind::StackOverflow);
        assert_eq!(s.call_depth(), 3);
        assert!(s.check_recursion().is_err());
    }

    #[test]
    fn test_pop_call_frame_on_empty_stack() {
        let s = state();
        s.pop_call_frame();
        assert_eq!(s.call_depth(), 0);
    }

    // --- old values ---

    #[test]
    fn test_pop_old_values_empty() {
        let s = state();
        assert!(s.pop_old_values().is_none());
    }

    #[test]
    fn test_old_values_lifo() {
        let s = state();
        s.push_old_values(HashMap::from([("a".to_string(), Value::Int(1))]));
        s.push_old_values(HashMap::from([("b".to_string(), Value::Int(2))]));

        assert_eq!(s.lookup_old_value("B"), Some(Value::Int(2)));
        assert_eq!(s.lookup_old_value("a"), None);

        let top = s.pop_old_values().unwrap();
        assert!(top.contains_key("b"));
        let next = s.pop_old_values().unwrap();
        assert!(next.contains_key("a"));
        assert!(s.pop_old_values().is_none());
    }

    // --- sharing ---

    #[test]
    fn test_with_env_shares_cells() {
        let s = state();
        let callee = s.with_env(Environment::new().into_ref());
        callee.set_break();
        callee.push_call_frame("inner", "<test>", Position::default()).unwrap();
        assert!(s.is_break());
        assert_eq!(s.call_depth(), 1);
        assert!(!Rc::ptr_eq(s.env(), callee.env()));
    }

    #[test]
    fn test_reset_keeps_environment() {
        let mut s = state();
        s.env().borrow_mut().define("keep", Value::Int(1));
        s.set_exit();
        s.push_call_frame("f", "<test>", Position::default()).unwrap();
        s.push_old_values(HashMap::new());
        s.reset();
        assert!(!s.is_control_flow_active());
        assert_eq!(s.call_depth(), 0);
        assert!(s.pop_old_values().is_none());
        assert_eq!(s.env().borrow().get("keep"), Some(Value::Int(1)));
    }

    #[test]
    fn test_property_guard_rejects_reentry() {
        let s = state();
        s.enter_property("TFoo.Size", false).unwrap();
        assert!(s.in_property("tfoo.size"));
        assert!(s.enter_property("TFoo.Size", false).is_err());
        s.leave_property();
        assert!(!s.in_property("TFoo.Size"));
    }

    #[test]
    fn test_property_setter_may_read_getter() {
        let s = state();
        s.enter_property("TFoo.Size", true).unwrap();
        s.enter_property("TFoo.Size", false).unwrap();
        assert!(s.enter_property("TFoo.Size", true).is_err());
        s.leave_property();
        s.leave_property();
        assert!(!s.in_property("TFoo.Size"));
    }
}
