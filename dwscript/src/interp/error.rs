//! Evaluation errors
//!
//! These are the non-catchable failure channel: malformed constructs, wrong
//! argument counts, unknown names. Script exceptions live in the execution
//! state instead (see `exceptions`).

use crate::ast::Position;
use std::fmt;

/// Runtime error during evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    /// Innermost node being evaluated when the error surfaced
    pub position: Option<Position>,
}

/// Kinds of runtime errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Undefined variable (or uncaptured old value)
    UndefinedVariable,
    /// Undefined function
    UndefinedFunction,
    /// No method of that name on the receiver
    UndefinedMethod,
    /// Type name could not be resolved
    UnknownType,
    /// Field not present on object or record
    FieldNotFound,
    /// Operand or argument of the wrong type
    TypeMismatch,
    /// Argument count outside the accepted range
    ArgumentCount,
    /// Index outside array or string bounds
    IndexOutOfBounds,
    /// Integer division by zero
    DivisionByZero,
    /// Malformed text passed to a conversion builtin; surfaces to scripts
    /// as `EConvertError`
    Conversion,
    /// Method call or member access on nil
    NilReceiver,
    /// Recursion depth limit reached
    StackOverflow,
    /// Construct not valid in this context
    InvalidOperation,
    /// A node or receiver needs a collaborator that is not wired in
    MissingCollaborator,
    /// Internal consistency failure
    Internal,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        RuntimeError {
            kind,
            message: message.into(),
            position: None,
        }
    }

    /// Attach a position unless a more precise one is already recorded
    pub fn at(mut self, pos: Position) -> Self {
        if self.position.is_none() && !pos.is_unknown() {
            self.position = Some(pos);
        }
        self
    }

    pub fn undefined_variable(name: &str) -> Self {
        Self::new(ErrorKind::UndefinedVariable, format!("undefined variable: {name}"))
    }

    pub fn old_value_not_captured(name: &str) -> Self {
        Self::new(
            ErrorKind::UndefinedVariable,
            format!("old value for '{name}' not captured"),
        )
    }

    pub fn undefined_function(name: &str) -> Self {
        Self::new(ErrorKind::UndefinedFunction, format!("undefined function: {name}"))
    }

    pub fn undefined_method(type_name: &str, method: &str) -> Self {
        Self::new(
            ErrorKind::UndefinedMethod,
            format!("method '{method}' not found for type {type_name}"),
        )
    }

    pub fn unknown_type(name: &str) -> Self {
        Self::new(ErrorKind::UnknownType, format!("unknown type: {name}"))
    }

    pub fn field_not_found(type_name: &str, field: &str) -> Self {
        Self::new(
            ErrorKind::FieldNotFound,
            format!("field '{field}' not found in {type_name}"),
        )
    }

    pub fn type_mismatch(expected: &str, got: &str) -> Self {
        Self::new(
            ErrorKind::TypeMismatch,
            format!("type mismatch: expected {expected}, got {got}"),
        )
    }

    pub fn too_few_arguments(required: usize, got: usize) -> Self {
        Self::new(
            ErrorKind::ArgumentCount,
            format!("wrong number of arguments: expected at least {required}, got {got}"),
        )
    }

    pub fn too_many_arguments(total: usize, got: usize) -> Self {
        Self::new(
            ErrorKind::ArgumentCount,
            format!("wrong number of arguments: expected at most {total}, got {got}"),
        )
    }

    /// `expected` is free text so ranges like "2 or 3" read naturally
    pub fn arity_mismatch(name: &str, expected: impl fmt::Display, got: usize) -> Self {
        Self::new(
            ErrorKind::ArgumentCount,
            format!("{name} expects {expected} argument(s), got {got}"),
        )
    }

    pub fn index_out_of_bounds(index: i64, low: i64, high: i64) -> Self {
        Self::new(
            ErrorKind::IndexOutOfBounds,
            format!("index {index} out of bounds [{low}..{high}]"),
        )
    }

    pub fn division_by_zero() -> Self {
        Self::new(ErrorKind::DivisionByZero, "division by zero")
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conversion, message)
    }

    pub fn nil_receiver() -> Self {
        Self::new(ErrorKind::NilReceiver, "Object not instantiated")
    }

    pub fn stack_overflow() -> Self {
        Self::new(ErrorKind::StackOverflow, "maximum recursion depth exceeded")
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidOperation, message)
    }

    pub fn missing_collaborator(what: &str) -> Self {
        Self::new(
            ErrorKind::MissingCollaborator,
            format!("internal error: no {what} configured"),
        )
    }

    pub fn internal(message: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Internal, format!("internal error: {message}"))
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Runtime error: {}", self.message)?;
        if let Some(pos) = self.position {
            write!(f, " [{pos}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

/// Result type for interpreter operations
pub type InterpResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    // --- constructors ---

    #[test]
    fn test_undefined_variable() {
        let err = RuntimeError::undefined_variable("foo");
        assert_eq!(err.kind, ErrorKind::UndefinedVariable);
        assert_eq!(err.message, "undefined variable: foo");
    }

    #[test]
    fn test_argument_count_messages() {
        let few = RuntimeError::too_few_arguments(1, 0);
        assert_eq!(few.kind, ErrorKind::ArgumentCount);
        assert_eq!(few.message, "wrong number of arguments: expected at least 1, got 0");
        let many = RuntimeError::too_many_arguments(3, 4);
        assert_eq!(many.message, "wrong number of arguments: expected at most 3, got 4");
    }

    #[test]
    fn test_arity_mismatch_free_text() {
        let err = RuntimeError::arity_mismatch("TryStrToInt", "2 or 3", 1);
        assert_eq!(err.message, "TryStrToInt expects 2 or 3 argument(s), got 1");
    }

    #[test]
    fn test_index_out_of_bounds() {
        let err = RuntimeError::index_out_of_bounds(10, 0, 9);
        assert_eq!(err.kind, ErrorKind::IndexOutOfBounds);
        assert_eq!(err.message, "index 10 out of bounds [0..9]");
    }

    #[test]
    fn test_nil_receiver() {
        assert_eq!(RuntimeError::nil_receiver().message, "Object not instantiated");
    }

    #[test]
    fn test_stack_overflow() {
        let err = RuntimeError::stack_overflow();
        assert_eq!(err.kind, ErrorKind::StackOverflow);
        assert!(err.message.contains("maximum recursion depth"));
    }

    // --- positions ---

    #[test]
    fn test_at_keeps_innermost_position() {
        let err = RuntimeError::division_by_zero()
            .at(Position::new(3, 4))
            .at(Position::new(1, 1));
        assert_eq!(err.position, Some(Position::new(3, 4)));
    }

    #[test]
    fn test_at_ignores_unknown_position() {
        let err = RuntimeError::division_by_zero().at(Position::default());
        assert_eq!(err.position, None);
    }

    #[test]
    fn test_display() {
        let err = RuntimeError::division_by_zero();
        assert_eq!(err.to_string(), "Runtime error: division by zero");
        let located = err.at(Position::new(2, 8));
        assert_eq!(located.to_string(), "Runtime error: division by zero [line: 2, column: 8]");
    }
}
