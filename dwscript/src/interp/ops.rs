//! Operators

use super::error::{InterpResult, RuntimeError};
use super::eval::Evaluator;
use super::state::ExecutionState;
use super::value::{SetValue, Value};
use crate::ast::{AssignOp, BinOp, Expr, Position, Spanned, UnOp};
use std::cmp::Ordering;

impl AssignOp {
    /// Binary operator behind a compound assignment
    pub fn binary_op(self) -> Option<BinOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinOp::Add),
            AssignOp::SubAssign => Some(BinOp::Sub),
            AssignOp::MulAssign => Some(BinOp::Mul),
            AssignOp::DivAssign => Some(BinOp::Div),
        }
    }
}

fn mismatch(op: BinOp, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::type_mismatch(
        &format!("operands for '{op}'"),
        &format!("{} {op} {}", left.type_name(), right.type_name()),
    )
}

fn compare_result(op: BinOp, ord: Ordering) -> bool {
    match op {
        BinOp::Eq => ord == Ordering::Equal,
        BinOp::Ne => ord != Ordering::Equal,
        BinOp::Lt => ord == Ordering::Less,
        BinOp::Gt => ord == Ordering::Greater,
        BinOp::Le => ord != Ordering::Greater,
        BinOp::Ge => ord != Ordering::Less,
        _ => false,
    }
}

fn is_comparison(op: BinOp) -> bool {
    matches!(
        op,
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge
    )
}

impl Evaluator {
    pub(crate) fn eval_binary(
        &mut self,
        left: &Spanned<Expr>,
        op: BinOp,
        right: &Spanned<Expr>,
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        let lval = self.eval_expr(left, state)?;
        propagate!(state);
        let lval = lval.deref()?.unvariant();

        // boolean and/or/implies short-circuit; on integers they are bitwise
        if let Value::Bool(l) = lval {
            let decided = match op {
                BinOp::And if !l => Some(false),
                BinOp::Or if l => Some(true),
                BinOp::Implies if !l => Some(true),
                _ => None,
            };
            if let Some(result) = decided {
                return Ok(Value::Bool(result));
            }
        }

        let rval = self.eval_expr(right, state)?;
        propagate!(state);
        let rval = rval.deref()?;
        self.binary_values(op, lval, rval, pos, state)
    }

    /// Apply `op` to two evaluated operands
    pub(crate) fn binary_values(
        &mut self,
        op: BinOp,
        left: Value,
        right: Value,
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        if matches!(left, Value::Reference(_)) || matches!(right, Value::Reference(_)) {
            return Err(RuntimeError::type_mismatch("value", "reference"));
        }
        let left = left.unvariant();
        let right = right.unvariant();

        if matches!(left, Value::Object(_) | Value::Record(_))
            || matches!(right, Value::Object(_) | Value::Record(_))
        {
            if let Some(function) =
                self.types
                    .lookup_operator(op, &left.type_name(), &right.type_name())
            {
                tracing::trace!(%op, function = %function, "operator overload");
                return self.call_function_values(&function, vec![left, right], pos, state);
            }
        }

        apply_binary(op, &left, &right)
    }

    pub(crate) fn eval_unary(
        &mut self,
        op: UnOp,
        operand: &Spanned<Expr>,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        let val = self.eval_expr(operand, state)?;
        propagate!(state);
        apply_unary(op, val.deref()?.unvariant())
    }
}

/// Operators on plain values
pub fn apply_binary(op: BinOp, left: &Value, right: &Value) -> InterpResult<Value> {
    match op {
        // Arithmetic
        BinOp::Add => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
            (Value::Str(a), Value::Str(b)) => {
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(a);
                s.push_str(b);
                Ok(Value::string(s))
            }
            (Value::Set(a), Value::Set(b)) => {
                let mut result = a.borrow().clone();
                result.items.extend(b.borrow().items.iter().copied());
                Ok(Value::Set(result.into_ref()))
            }
            _ => float_op(op, left, right, |a, b| a + b),
        },
        BinOp::Sub => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_sub(*b))),
            (Value::Set(a), Value::Set(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                let items = a.items.difference(&b.items).copied().collect();
                Ok(Value::Set(SetValue { element: a.element.clone(), items }.into_ref()))
            }
            _ => float_op(op, left, right, |a, b| a - b),
        },
        BinOp::Mul => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_mul(*b))),
            (Value::Set(a), Value::Set(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                let items = a.items.intersection(&b.items).copied().collect();
                Ok(Value::Set(SetValue { element: a.element.clone(), items }.into_ref()))
            }
            _ => float_op(op, left, right, |a, b| a * b),
        },
        BinOp::Div => match (left, right) {
            (Value::Int(_) | Value::Float(_), Value::Int(0)) => Err(RuntimeError::division_by_zero()),
            _ => float_op(op, left, right, |a, b| a / b),
        },
        BinOp::IntDiv => match (left, right) {
            (Value::Int(_), Value::Int(0)) => Err(RuntimeError::division_by_zero()),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_div(*b))),
            _ => Err(mismatch(op, left, right)),
        },
        BinOp::Mod => match (left, right) {
            (Value::Int(_), Value::Int(0)) => Err(RuntimeError::division_by_zero()),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_rem(*b))),
            _ => Err(mismatch(op, left, right)),
        },
        BinOp::Shl => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_shl(*b as u32))),
            _ => Err(mismatch(op, left, right)),
        },
        BinOp::Shr => match (left, right) {
            (Value::Int(a), Value::Int(b)) => {
                Ok(Value::Int(((*a as u64).wrapping_shr(*b as u32)) as i64))
            }
            _ => Err(mismatch(op, left, right)),
        },

        // Logical / bitwise
        BinOp::And | BinOp::Or | BinOp::Xor | BinOp::Implies => match (left, right) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(match op {
                BinOp::And => *a && *b,
                BinOp::Or => *a || *b,
                BinOp::Xor => a != b,
                _ => !*a || *b,
            })),
            (Value::Int(a), Value::Int(b)) => match op {
                BinOp::And => Ok(Value::Int(a & b)),
                BinOp::Or => Ok(Value::Int(a | b)),
                BinOp::Xor => Ok(Value::Int(a ^ b)),
                _ => Err(mismatch(op, left, right)),
            },
            _ => Err(mismatch(op, left, right)),
        },

        BinOp::In => match right {
            Value::Set(set) => Ok(Value::Bool(set.borrow().contains(left))),
            Value::Array(arr) => Ok(Value::Bool(arr.borrow().elements.contains(left))),
            Value::Str(s) => match left {
                Value::Str(needle) => Ok(Value::Bool(s.contains(needle.as_str()))),
                _ => Err(mismatch(op, left, right)),
            },
            _ => Err(mismatch(op, left, right)),
        },

        // Comparison
        _ => compare(op, left, right),
    }
}

fn float_op(op: BinOp, left: &Value, right: &Value, f: impl Fn(f64, f64) -> f64) -> InterpResult<Value> {
    match (left, right) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let a = left.as_float().unwrap_or_default();
            let b = right.as_float().unwrap_or_default();
            Ok(Value::Float(f(a, b)))
        }
        _ => Err(mismatch(op, left, right)),
    }
}

fn compare(op: BinOp, left: &Value, right: &Value) -> InterpResult<Value> {
    debug_assert!(is_comparison(op));
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let a = left.as_float().unwrap_or_default();
            let b = right.as_float().unwrap_or_default();
            a.partial_cmp(&b)
        }
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Enum(a), Value::Enum(b)) => Some(a.ordinal.cmp(&b.ordinal)),
        (Value::Set(a), Value::Set(b)) => {
            let a = &a.borrow().items;
            let b = &b.borrow().items;
            return match op {
                BinOp::Eq => Ok(Value::Bool(a == b)),
                BinOp::Ne => Ok(Value::Bool(a != b)),
                BinOp::Le => Ok(Value::Bool(a.is_subset(b))),
                BinOp::Ge => Ok(Value::Bool(a.is_superset(b))),
                _ => Err(mismatch(op, left, right)),
            };
        }
        _ => None,
    };

    match ordering {
        Some(ord) => Ok(Value::Bool(compare_result(op, ord))),
        // identity comparison for objects, class references and nil
        None => match op {
            BinOp::Eq => Ok(Value::Bool(left == right)),
            BinOp::Ne => Ok(Value::Bool(left != right)),
            _ => Err(mismatch(op, left, right)),
        },
    }
}

pub fn apply_unary(op: UnOp, val: Value) -> InterpResult<Value> {
    match op {
        UnOp::Neg => match val {
            Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
            Value::Float(x) => Ok(Value::Float(-x)),
            _ => Err(RuntimeError::type_mismatch("numeric", &val.type_name())),
        },
        UnOp::Plus => match val {
            Value::Int(_) | Value::Float(_) => Ok(val),
            _ => Err(RuntimeError::type_mismatch("numeric", &val.type_name())),
        },
        UnOp::Not => match val {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            Value::Int(n) => Ok(Value::Int(!n)),
            _ => Err(RuntimeError::type_mismatch("Boolean or Integer", &val.type_name())),
        },
    }
}
