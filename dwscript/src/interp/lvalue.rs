//! Assignable slots
//!
//! Every operation that writes through an argument (`Inc`, `Swap`, var
//! parameters, assignment) resolves its target here exactly once: index
//! and receiver sub-expressions are evaluated a single time and the result
//! is a [`Reference`] to the slot.

use super::env::find_owner;
use super::error::{InterpResult, RuntimeError};
use super::eval::Evaluator;
use super::state::ExecutionState;
use super::value::{FieldOwner, Reference, Value};
use crate::ast::{Expr, Spanned};
use std::rc::Rc;

/// Writes a new value into a resolved slot
pub type AssignFunc = Box<dyn FnOnce(Value) -> InterpResult<()>>;

impl Evaluator {
    /// Resolve an lvalue expression to its slot.
    ///
    /// Returns `Ok(None)` when evaluating a sub-expression raised a script
    /// exception.
    pub fn resolve_slot(&mut self, expr: &Spanned<Expr>, state: &mut ExecutionState) -> InterpResult<Option<Reference>> {
        match &expr.node {
            Expr::Ident(name) => self.identifier_slot(name, state).map(Some),
            Expr::Grouped(inner) => self.resolve_slot(inner, state),

            Expr::Index { base, index } => {
                // the base is resolved as a slot when possible so string
                // characters can be written back
                let (base_slot, container) = if is_slot_shaped(&base.node) {
                    let Some(slot) = self.resolve_slot(base, state)? else {
                        return Ok(None);
                    };
                    let value = slot.deref()?;
                    (Some(slot), value)
                } else {
                    let value = self.eval_expr(base, state)?;
                    if state.has_exception() {
                        return Ok(None);
                    }
                    (None, value.deref()?)
                };

                let index = self.eval_expr(index, state)?;
                if state.has_exception() {
                    return Ok(None);
                }
                let logical = index.deref()?.expect_int("index")?;

                match container.unvariant() {
                    Value::Array(array) => {
                        let index = array.borrow().physical_index(logical)?;
                        Ok(Some(Reference::Element { array, index }))
                    }
                    Value::Str(s) => {
                        let len = s.chars().count() as i64;
                        if logical < 1 || logical > len {
                            return Err(RuntimeError::index_out_of_bounds(logical, 1, len));
                        }
                        let target = base_slot.ok_or_else(|| {
                            RuntimeError::invalid_operation("cannot assign to a character of a temporary string")
                        })?;
                        Ok(Some(Reference::Char {
                            target: Box::new(target),
                            index: (logical - 1) as usize,
                        }))
                    }
                    Value::Nil => Err(RuntimeError::nil_receiver()),
                    other => Err(RuntimeError::type_mismatch("array or string", &other.type_name())),
                }
            }

            Expr::Member { object, member } => {
                let receiver = self.eval_expr(object, state)?;
                if state.has_exception() {
                    return Ok(None);
                }
                self.member_slot(receiver.deref()?, member).map(Some)
            }

            _ => Err(RuntimeError::invalid_operation(format!(
                "{} is not assignable",
                expr.node
            ))),
        }
    }

    /// Slot of a bare name: the binding scope, else a field or class
    /// variable of `Self`
    fn identifier_slot(&self, name: &str, state: &ExecutionState) -> InterpResult<Reference> {
        if let Some(env) = find_owner(state.env(), name) {
            return Ok(Reference::Variable {
                env,
                name: name.to_string(),
            });
        }
        let receiver = state.env().borrow().get("Self");
        match receiver {
            Some(Value::Object(obj)) if obj.has_field(name) => Ok(Reference::Field {
                owner: FieldOwner::Object(obj),
                name: name.to_string(),
            }),
            Some(Value::Object(obj)) if obj.class.class_var(name).is_some() => Ok(Reference::ClassVar {
                class: Rc::clone(&obj.class),
                name: name.to_string(),
            }),
            Some(Value::Record(rec)) if rec.borrow().field(name).is_some() => Ok(Reference::Field {
                owner: FieldOwner::Record(rec),
                name: name.to_string(),
            }),
            Some(Value::ClassRef(class)) if class.class_var(name).is_some() => Ok(Reference::ClassVar {
                class,
                name: name.to_string(),
            }),
            _ => Err(RuntimeError::undefined_variable(name)),
        }
    }

    /// Slot of `receiver.member` for an already evaluated receiver
    pub(crate) fn member_slot(&self, receiver: Value, member: &str) -> InterpResult<Reference> {
        match receiver.unvariant() {
            Value::Object(obj) => {
                if obj.has_field(member) {
                    Ok(Reference::Field {
                        owner: FieldOwner::Object(obj),
                        name: member.to_string(),
                    })
                } else if obj.class.class_var(member).is_some() {
                    Ok(Reference::ClassVar {
                        class: Rc::clone(&obj.class),
                        name: member.to_string(),
                    })
                } else {
                    Err(RuntimeError::field_not_found(&obj.class.name, member))
                }
            }
            Value::Interface(iface) => match &iface.object {
                Some(obj) => self.member_slot(Value::Object(Rc::clone(obj)), member),
                None => Err(RuntimeError::nil_receiver()),
            },
            Value::Record(rec) => {
                if rec.borrow().field(member).is_some() {
                    Ok(Reference::Field {
                        owner: FieldOwner::Record(rec),
                        name: member.to_string(),
                    })
                } else {
                    let type_name = rec.borrow().ty.name.clone();
                    Err(RuntimeError::field_not_found(&type_name, member))
                }
            }
            Value::ClassRef(class) => {
                if class.class_var(member).is_some() {
                    Ok(Reference::ClassVar {
                        class,
                        name: member.to_string(),
                    })
                } else {
                    Err(RuntimeError::field_not_found(&class.name, member))
                }
            }
            Value::Nil => Err(RuntimeError::nil_receiver()),
            other => Err(RuntimeError::field_not_found(&other.type_name(), member)),
        }
    }

    /// Current value of an lvalue plus a closure writing a new one.
    ///
    /// Returns `Ok(None)` when a script exception is pending.
    pub fn evaluate_lvalue(&mut self, expr: &Spanned<Expr>, state: &mut ExecutionState) -> InterpResult<Option<(Value, AssignFunc)>> {
        let Some(slot) = self.resolve_slot(expr, state)? else {
            return Ok(None);
        };
        let current = slot.deref()?;
        let assign: AssignFunc = Box::new(move |value| slot.assign(value));
        Ok(Some((current, assign)))
    }
}

fn is_slot_shaped(expr: &Expr) -> bool {
    match expr {
        Expr::Ident(_) | Expr::Index { .. } | Expr::Member { .. } => true,
        Expr::Grouped(inner) => is_slot_shaped(&inner.node),
        _ => false,
    }
}
