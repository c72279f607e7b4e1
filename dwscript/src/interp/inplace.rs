//! Builtins that modify their arguments in place
//!
//! These take the raw argument expressions: target arguments are resolved
//! as lvalues once, read, and written back through the resolved slot.

use super::builtins::{parse_float, parse_int};
use super::datetime;
use super::error::{InterpResult, RuntimeError};
use super::eval::Evaluator;
use super::lvalue::AssignFunc;
use super::state::ExecutionState;
use super::value::Value;
use crate::ast::{Expr, Spanned};
use crate::util::same_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InPlaceOp {
    Inc,
    Dec,
    Swap,
    SetLength,
    Insert,
    Delete,
    DivMod,
    TryStrToInt,
    TryStrToFloat,
    DecodeDate,
    DecodeTime,
    Include,
    Exclude,
}

const IN_PLACE_OPS: &[(&str, InPlaceOp)] = &[
    ("Inc", InPlaceOp::Inc),
    ("Dec", InPlaceOp::Dec),
    ("Swap", InPlaceOp::Swap),
    ("SetLength", InPlaceOp::SetLength),
    ("Insert", InPlaceOp::Insert),
    ("Delete", InPlaceOp::Delete),
    ("DivMod", InPlaceOp::DivMod),
    ("TryStrToInt", InPlaceOp::TryStrToInt),
    ("TryStrToFloat", InPlaceOp::TryStrToFloat),
    ("DecodeDate", InPlaceOp::DecodeDate),
    ("DecodeTime", InPlaceOp::DecodeTime),
    ("Include", InPlaceOp::Include),
    ("Exclude", InPlaceOp::Exclude),
];

impl InPlaceOp {
    pub fn from_name(name: &str) -> Option<Self> {
        IN_PLACE_OPS
            .iter()
            .find(|(n, _)| same_name(n, name))
            .map(|(_, op)| *op)
    }

    pub fn name(self) -> &'static str {
        IN_PLACE_OPS
            .iter()
            .find(|(_, op)| *op == self)
            .map(|(n, _)| *n)
            .unwrap_or("?")
    }
}

fn check_arity(op: InPlaceOp, args: &[Spanned<Expr>], min: usize, max: usize) -> InterpResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{min} or {max}")
        };
        return Err(RuntimeError::arity_mismatch(op.name(), expected, args.len()));
    }
    Ok(())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl Evaluator {
    /// Run an in-place builtin on unevaluated arguments
    pub(crate) fn eval_in_place(
        &mut self,
        op: InPlaceOp,
        args: &[Spanned<Expr>],
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        tracing::trace!(builtin = op.name(), "in-place builtin");
        match op {
            InPlaceOp::Inc | InPlaceOp::Dec => self.inc_dec(op, args, state),
            InPlaceOp::Swap => self.swap(args, state),
            InPlaceOp::SetLength => self.set_length(args, state),
            InPlaceOp::Insert => self.insert(args, state),
            InPlaceOp::Delete => self.delete(args, state),
            InPlaceOp::DivMod => self.div_mod(args, state),
            InPlaceOp::TryStrToInt => self.try_str_to_int(args, state),
            InPlaceOp::TryStrToFloat => self.try_str_to_float(args, state),
            InPlaceOp::DecodeDate => self.decode_date(args, state),
            InPlaceOp::DecodeTime => self.decode_time(args, state),
            InPlaceOp::Include | InPlaceOp::Exclude => self.include_exclude(op, args, state),
        }
    }

    /// Evaluate a plain (non-lvalue) argument
    fn value_arg(&mut self, arg: &Spanned<Expr>, state: &mut ExecutionState) -> InterpResult<Option<Value>> {
        let value = self.eval_expr(arg, state)?;
        if state.has_exception() {
            return Ok(None);
        }
        Ok(Some(value.deref()?.unvariant()))
    }

    fn inc_dec(&mut self, op: InPlaceOp, args: &[Spanned<Expr>], state: &mut ExecutionState) -> InterpResult<Value> {
        check_arity(op, args, 1, 2)?;
        let Some((current, assign)) = self.evaluate_lvalue(&args[0], state)? else {
            return Ok(Value::Nil);
        };
        let step = match args.get(1) {
            Some(arg) => {
                let Some(step) = self.value_arg(arg, state)? else {
                    return Ok(Value::Nil);
                };
                Some(step.expect_int(op.name())?)
            }
            None => None,
        };
        let forward = op == InPlaceOp::Inc;

        let updated = match current.unvariant() {
            value @ Value::Enum(_) => {
                if step.is_some_and(|s| s != 1) {
                    return Err(RuntimeError::invalid_operation(format!(
                        "{} of an enumeration only supports a step of 1",
                        op.name()
                    )));
                }
                let next = if forward { value.enum_succ() } else { value.enum_pred() };
                next.ok_or_else(|| {
                    let bound = if forward { "maximum" } else { "minimum" };
                    RuntimeError::invalid_operation(format!(
                        "{}: {} is already at its {bound}",
                        op.name(),
                        value.type_name()
                    ))
                })?
            }
            other => {
                let step = step.unwrap_or(1);
                let delta = if forward { step } else { step.wrapping_neg() };
                match other {
                    Value::Int(n) => Value::Int(n.wrapping_add(delta)),
                    Value::Nil => Value::Int(delta),
                    Value::Str(s) if char_len(&s) == 1 => {
                        let code = s.chars().next().map(u32::from).unwrap_or(0) as i64;
                        let next = code
                            .checked_add(delta)
                            .and_then(|c| u32::try_from(c).ok())
                            .and_then(char::from_u32)
                            .ok_or_else(|| {
                                RuntimeError::invalid_operation(format!("{}: character out of range", op.name()))
                            })?;
                        Value::string(next.to_string())
                    }
                    other => return Err(RuntimeError::type_mismatch("ordinal", &other.type_name())),
                }
            }
        };
        assign(updated)?;
        Ok(Value::Nil)
    }

    fn swap(&mut self, args: &[Spanned<Expr>], state: &mut ExecutionState) -> InterpResult<Value> {
        check_arity(InPlaceOp::Swap, args, 2, 2)?;
        let Some((a, assign_a)) = self.evaluate_lvalue(&args[0], state)? else {
            return Ok(Value::Nil);
        };
        let Some((b, assign_b)) = self.evaluate_lvalue(&args[1], state)? else {
            return Ok(Value::Nil);
        };
        assign_a(b)?;
        assign_b(a)?;
        Ok(Value::Nil)
    }

    fn set_length(&mut self, args: &[Spanned<Expr>], state: &mut ExecutionState) -> InterpResult<Value> {
        check_arity(InPlaceOp::SetLength, args, 2, 2)?;
        let Some((current, assign)) = self.evaluate_lvalue(&args[0], state)? else {
            return Ok(Value::Nil);
        };
        let Some(length) = self.value_arg(&args[1], state)? else {
            return Ok(Value::Nil);
        };
        let length = usize::try_from(length.expect_int("SetLength")?).unwrap_or(0);

        match current.unvariant() {
            Value::Array(array) => {
                {
                    let mut arr = array.borrow_mut();
                    if arr.ty.is_static() {
                        return Err(RuntimeError::invalid_operation(
                            "SetLength requires a dynamic array",
                        ));
                    }
                    arr.elements.resize(length, Value::Nil);
                }
                assign(Value::Array(array))?;
            }
            Value::Str(s) => {
                let mut chars: Vec<char> = s.chars().collect();
                chars.resize(length, ' ');
                assign(Value::string(chars.into_iter().collect::<String>()))?;
            }
            other => {
                return Err(RuntimeError::type_mismatch(
                    "dynamic array or string",
                    &other.type_name(),
                ));
            }
        }
        Ok(Value::Nil)
    }

    /// Target string argument: current text plus its writer
    fn string_lvalue(&mut self, arg: &Spanned<Expr>, what: &str, state: &mut ExecutionState) -> InterpResult<Option<(String, AssignFunc)>> {
        let Some((current, assign)) = self.evaluate_lvalue(arg, state)? else {
            return Ok(None);
        };
        let text = current.unvariant().expect_str(what)?.to_string();
        Ok(Some((text, assign)))
    }

    /// `Insert(source, var target, position)`
    fn insert(&mut self, args: &[Spanned<Expr>], state: &mut ExecutionState) -> InterpResult<Value> {
        check_arity(InPlaceOp::Insert, args, 3, 3)?;
        let Some(source) = self.value_arg(&args[0], state)? else {
            return Ok(Value::Nil);
        };
        let source = source.expect_str("Insert")?.to_string();
        let Some((target, assign)) = self.string_lvalue(&args[1], "Insert", state)? else {
            return Ok(Value::Nil);
        };
        let Some(position) = self.value_arg(&args[2], state)? else {
            return Ok(Value::Nil);
        };
        let position = position.expect_int("Insert")?;

        let mut chars: Vec<char> = target.chars().collect();
        let at = position.clamp(1, chars.len() as i64 + 1) as usize - 1;
        chars.splice(at..at, source.chars());
        assign(Value::string(chars.into_iter().collect::<String>()))?;
        Ok(Value::Nil)
    }

    /// `Delete(var target, position, count)`
    fn delete(&mut self, args: &[Spanned<Expr>], state: &mut ExecutionState) -> InterpResult<Value> {
        check_arity(InPlaceOp::Delete, args, 3, 3)?;
        let Some((target, assign)) = self.string_lvalue(&args[0], "Delete", state)? else {
            return Ok(Value::Nil);
        };
        let Some(position) = self.value_arg(&args[1], state)? else {
            return Ok(Value::Nil);
        };
        let Some(count) = self.value_arg(&args[2], state)? else {
            return Ok(Value::Nil);
        };
        let position = position.expect_int("Delete")?;
        let count = count.expect_int("Delete")?;

        let mut chars: Vec<char> = target.chars().collect();
        let len = chars.len() as i64;
        if position < 1 || position > len || count <= 0 {
            return Ok(Value::Nil);
        }
        let start = (position - 1) as usize;
        let end = (position - 1).saturating_add(count).min(len) as usize;
        chars.drain(start..end);
        assign(Value::string(chars.into_iter().collect::<String>()))?;
        Ok(Value::Nil)
    }

    /// `DivMod(dividend, divisor, var quotient, var remainder)`
    fn div_mod(&mut self, args: &[Spanned<Expr>], state: &mut ExecutionState) -> InterpResult<Value> {
        check_arity(InPlaceOp::DivMod, args, 4, 4)?;
        let Some(dividend) = self.value_arg(&args[0], state)? else {
            return Ok(Value::Nil);
        };
        let Some(divisor) = self.value_arg(&args[1], state)? else {
            return Ok(Value::Nil);
        };
        let dividend = dividend.expect_int("DivMod")?;
        let divisor = divisor.expect_int("DivMod")?;
        if divisor == 0 {
            return Err(RuntimeError::division_by_zero());
        }
        let Some((_, assign_q)) = self.evaluate_lvalue(&args[2], state)? else {
            return Ok(Value::Nil);
        };
        let Some((_, assign_r)) = self.evaluate_lvalue(&args[3], state)? else {
            return Ok(Value::Nil);
        };
        assign_q(Value::Int(dividend.wrapping_div(divisor)))?;
        assign_r(Value::Int(dividend.wrapping_rem(divisor)))?;
        Ok(Value::Nil)
    }

    /// `TryStrToInt(text, [base,] var out): Boolean`
    fn try_str_to_int(&mut self, args: &[Spanned<Expr>], state: &mut ExecutionState) -> InterpResult<Value> {
        check_arity(InPlaceOp::TryStrToInt, args, 2, 3)?;
        let Some(text) = self.value_arg(&args[0], state)? else {
            return Ok(Value::Nil);
        };
        let text = text.expect_str("TryStrToInt")?.to_string();
        let base = if args.len() == 3 {
            let Some(base) = self.value_arg(&args[1], state)? else {
                return Ok(Value::Nil);
            };
            base.expect_int("TryStrToInt")?
        } else {
            10
        };
        let Some((_, assign)) = self.evaluate_lvalue(&args[args.len() - 1], state)? else {
            return Ok(Value::Nil);
        };

        match u32::try_from(base).ok().and_then(|b| parse_int(&text, b)) {
            Some(n) => {
                assign(Value::Int(n))?;
                Ok(Value::Bool(true))
            }
            None => Ok(Value::Bool(false)),
        }
    }

    /// `TryStrToFloat(text, var out): Boolean`
    fn try_str_to_float(&mut self, args: &[Spanned<Expr>], state: &mut ExecutionState) -> InterpResult<Value> {
        check_arity(InPlaceOp::TryStrToFloat, args, 2, 2)?;
        let Some(text) = self.value_arg(&args[0], state)? else {
            return Ok(Value::Nil);
        };
        let text = text.expect_str("TryStrToFloat")?.to_string();
        let Some((_, assign)) = self.evaluate_lvalue(&args[1], state)? else {
            return Ok(Value::Nil);
        };
        match parse_float(&text) {
            Some(x) => {
                assign(Value::Float(x))?;
                Ok(Value::Bool(true))
            }
            None => Ok(Value::Bool(false)),
        }
    }

    /// Write each component into its target slot, in argument order
    fn assign_components(&mut self, targets: &[Spanned<Expr>], values: &[i64], state: &mut ExecutionState) -> InterpResult<Value> {
        for (target, value) in targets.iter().zip(values) {
            let Some((_, assign)) = self.evaluate_lvalue(target, state)? else {
                return Ok(Value::Nil);
            };
            assign(Value::Int(*value))?;
        }
        Ok(Value::Nil)
    }

    /// `DecodeDate(dt, var year, var month, var day)`
    fn decode_date(&mut self, args: &[Spanned<Expr>], state: &mut ExecutionState) -> InterpResult<Value> {
        check_arity(InPlaceOp::DecodeDate, args, 4, 4)?;
        let Some(dt) = self.value_arg(&args[0], state)? else {
            return Ok(Value::Nil);
        };
        let (y, m, d) = datetime::decode_date(dt.expect_float("DecodeDate")?)?;
        self.assign_components(&args[1..], &[y, m, d], state)
    }

    /// `DecodeTime(dt, var hour, var min, var sec, var msec)`
    fn decode_time(&mut self, args: &[Spanned<Expr>], state: &mut ExecutionState) -> InterpResult<Value> {
        check_arity(InPlaceOp::DecodeTime, args, 5, 5)?;
        let Some(dt) = self.value_arg(&args[0], state)? else {
            return Ok(Value::Nil);
        };
        let (h, m, s, ms) = datetime::decode_time(dt.expect_float("DecodeTime")?)?;
        self.assign_components(&args[1..], &[h, m, s, ms], state)
    }

    /// `Include(var set, element)` / `Exclude(var set, element)`
    fn include_exclude(&mut self, op: InPlaceOp, args: &[Spanned<Expr>], state: &mut ExecutionState) -> InterpResult<Value> {
        check_arity(op, args, 2, 2)?;
        let Some((set, assign)) = self.evaluate_lvalue(&args[0], state)? else {
            return Ok(Value::Nil);
        };
        let Some(element) = self.value_arg(&args[1], state)? else {
            return Ok(Value::Nil);
        };
        let set = set.unvariant();
        if op == InPlaceOp::Include {
            set.set_include(&element)?;
        } else {
            set.set_exclude(&element)?;
        }
        assign(set)?;
        Ok(Value::Nil)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::{AssignOp, Program, Stmt};
    use crate::interp::{ErrorKind, Interpreter};
    use pretty_assertions::assert_eq;

    fn run(stmts: Vec<Spanned<Stmt>>) -> Interpreter {
        let mut interp = Interpreter::with_captured_output();
        interp.run(&Program::new(stmts)).unwrap();
        interp
    }

    fn run_err(stmts: Vec<Spanned<Stmt>>) -> crate::Error {
        let mut interp = Interpreter::with_captured_output();
        interp.run(&Program::new(stmts)).unwrap_err()
    }

    // --- Inc / Dec ---

    #[test]
    fn test_inc_dec_integers() {
        let interp = run(vec![
            var_decl("n", None, Some(int(5))),
            expr_stmt(call("Inc", vec![ident("n")])),
            expr_stmt(call("Inc", vec![ident("n"), int(10)])),
            expr_stmt(call("Dec", vec![ident("n"), int(3)])),
        ]);
        assert_eq!(interp.global("n"), Some(Value::Int(13)));
    }

    #[test]
    fn test_inc_enum_moves_to_next_member() {
        let interp = run(vec![
            enum_decl("TColor", &["Red", "Green", "Blue"]),
            var_decl("c", Some("TColor"), None),
            expr_stmt(call("Inc", vec![ident("c")])),
        ]);
        assert_eq!(interp.global("c").unwrap().to_string(), "Green");
    }

    #[test]
    fn test_inc_enum_at_maximum_fails() {
        let err = run_err(vec![
            enum_decl("TColor", &["Red", "Blue"]),
            var_decl("c", None, Some(ident("Blue"))),
            expr_stmt(call("Inc", vec![ident("c")])),
        ]);
        assert_eq!(err.to_string(), "Runtime error: Inc: TColor is already at its maximum");
    }

    #[test]
    fn test_inc_enum_rejects_step() {
        let err = run_err(vec![
            enum_decl("TColor", &["Red", "Green", "Blue"]),
            var_decl("c", None, Some(ident("Red"))),
            expr_stmt(call("Inc", vec![ident("c"), int(2)])),
        ]);
        assert!(matches!(err, crate::Error::Runtime(e) if e.kind == ErrorKind::InvalidOperation));
    }

    #[test]
    fn test_enum_step_must_be_exactly_one() {
        for (op, step) in [("Inc", -1), ("Dec", -1), ("Dec", 2)] {
            let err = run_err(vec![
                enum_decl("TColor", &["Red", "Green", "Blue"]),
                var_decl("c", None, Some(ident("Green"))),
                expr_stmt(call(op, vec![ident("c"), int(step)])),
            ]);
            assert_eq!(
                err.to_string(),
                format!("Runtime error: {op} of an enumeration only supports a step of 1"),
            );
        }
    }

    #[test]
    fn test_enum_explicit_step_of_one() {
        let interp = run(vec![
            enum_decl("TColor", &["Red", "Green", "Blue"]),
            var_decl("up", None, Some(ident("Red"))),
            var_decl("down", None, Some(ident("Blue"))),
            expr_stmt(call("Inc", vec![ident("up"), int(1)])),
            expr_stmt(call("Dec", vec![ident("down"), int(1)])),
        ]);
        assert_eq!(interp.global("up").unwrap().to_string(), "Green");
        assert_eq!(interp.global("down").unwrap().to_string(), "Green");
    }

    #[test]
    fn test_inc_char_out_of_range() {
        let err = run_err(vec![
            var_decl("ch", None, Some(string("a"))),
            expr_stmt(call("Inc", vec![ident("ch"), int(i64::MAX)])),
        ]);
        assert_eq!(err.to_string(), "Runtime error: Inc: character out of range");
    }

    #[test]
    fn test_inc_char() {
        let interp = run(vec![
            var_decl("ch", None, Some(string("a"))),
            expr_stmt(call("Inc", vec![ident("ch"), int(2)])),
        ]);
        assert_eq!(interp.global("ch"), Some(Value::string("c")));
    }

    #[test]
    fn test_inc_evaluates_index_once() {
        let interp = run(vec![
            var_decl("arr", None, Some(array_lit(vec![int(5), int(10)]))),
            var_decl("calls", None, Some(int(0))),
            function("Next", vec![], Some("Integer"))
                .body(vec![
                    compound_assign(ident("calls"), AssignOp::AddAssign, int(1)),
                    assign(ident("Result"), int(0)),
                ])
                .stmt(),
            expr_stmt(call("Inc", vec![index(ident("arr"), call("Next", vec![])), int(2)])),
            compound_assign(index(ident("arr"), call("Next", vec![])), AssignOp::AddAssign, int(1)),
        ]);
        assert_eq!(interp.global("calls"), Some(Value::Int(2)));
        assert_eq!(interp.global("arr").unwrap().to_string(), "[8, 10]");
    }

    // --- Swap ---

    #[test]
    fn test_swap_array_elements() {
        let interp = run(vec![
            var_decl("arr", None, Some(array_lit(vec![int(1), int(2)]))),
            expr_stmt(call("Swap", vec![index(ident("arr"), int(0)), index(ident("arr"), int(1))])),
        ]);
        assert_eq!(interp.global("arr").unwrap().to_string(), "[2, 1]");
    }

    #[test]
    fn test_swap_object_fields() {
        let interp = run(vec![
            stmt(Stmt::Class(class_decl(
                "TPair",
                None,
                vec![field("Left", "Integer"), field("Right", "Integer")],
                vec![],
            ))),
            var_decl("p", None, Some(new_object("TPair", vec![]))),
            assign(member(ident("p"), "Left"), int(3)),
            assign(member(ident("p"), "Right"), int(4)),
            var_decl("arr", None, Some(array_lit(vec![int(9)]))),
            expr_stmt(call("Swap", vec![member(ident("p"), "Left"), member(ident("p"), "Right")])),
            expr_stmt(call("Swap", vec![member(ident("p"), "Left"), index(ident("arr"), int(0))])),
        ]);
        let pair = interp.global("p").unwrap();
        assert_eq!(pair.field("Left"), Some(Value::Int(9)));
        assert_eq!(pair.field("Right"), Some(Value::Int(3)));
        assert_eq!(interp.global("arr").unwrap().to_string(), "[4]");
    }

    #[test]
    fn test_inc_wrong_arity() {
        let err = run_err(vec![
            var_decl("n", None, Some(int(1))),
            expr_stmt(call("Inc", vec![ident("n"), int(1), int(2)])),
        ]);
        assert_eq!(err.to_string(), "Runtime error: Inc expects 1 or 2 argument(s), got 3");
    }

    // --- strings ---

    #[test]
    fn test_insert_and_delete() {
        let interp = run(vec![
            var_decl("s", None, Some(string("Hello World"))),
            expr_stmt(call("Delete", vec![ident("s"), int(6), int(6)])),
            expr_stmt(call("Insert", vec![string(", there"), ident("s"), int(99)])),
        ]);
        assert_eq!(interp.global("s"), Some(Value::string("Hello, there")));
    }

    #[test]
    fn test_delete_out_of_range_is_noop() {
        let interp = run(vec![
            var_decl("s", None, Some(string("abc"))),
            expr_stmt(call("Delete", vec![ident("s"), int(0), int(2)])),
            expr_stmt(call("Delete", vec![ident("s"), int(4), int(1)])),
            expr_stmt(call("Delete", vec![ident("s"), int(2), int(100)])),
        ]);
        assert_eq!(interp.global("s"), Some(Value::string("a")));
    }

    #[test]
    fn test_set_length_on_string_and_array() {
        let interp = run(vec![
            var_decl("s", None, Some(string("abcdef"))),
            expr_stmt(call("SetLength", vec![ident("s"), int(3)])),
            var_decl("a", Some("array of Integer"), None),
            expr_stmt(call("SetLength", vec![ident("a"), int(3)])),
            var_decl("grown", None, Some(call("Length", vec![ident("a")]))),
            expr_stmt(call("Inc", vec![index(ident("a"), int(1))])),
        ]);
        assert_eq!(interp.global("s"), Some(Value::string("abc")));
        assert_eq!(interp.global("grown"), Some(Value::Int(3)));
        // new slots start as nil; Inc counts nil as 0
        assert_eq!(interp.global("a").unwrap().to_string(), "[nil, 1, nil]");
    }

    #[test]
    fn test_set_length_pads_and_truncates() {
        let interp = run(vec![
            var_decl("s", None, Some(string("ab"))),
            expr_stmt(call("SetLength", vec![ident("s"), int(4)])),
            var_decl("a", Some("array of Integer"), Some(array_lit(vec![int(1), int(2), int(3)]))),
            expr_stmt(call("SetLength", vec![ident("a"), int(1)])),
        ]);
        assert_eq!(interp.global("s"), Some(Value::string("ab  ")));
        assert_eq!(interp.global("a").unwrap().to_string(), "[1]");
    }

    #[test]
    fn test_set_length_rejects_static_array() {
        let err = run_err(vec![
            var_decl("a", Some("array[1..3] of Integer"), None),
            expr_stmt(call("SetLength", vec![ident("a"), int(5)])),
        ]);
        assert_eq!(err.to_string(), "Runtime error: SetLength requires a dynamic array");
    }

    // --- conversions ---

    #[test]
    fn test_try_str_to_int() {
        let interp = run(vec![
            var_decl("n", Some("Integer"), Some(int(-1))),
            var_decl("ok", None, Some(call("TryStrToInt", vec![string("42"), ident("n")]))),
            var_decl("bad", None, Some(call("TryStrToInt", vec![string("4x"), ident("n")]))),
        ]);
        assert_eq!(interp.global("ok"), Some(Value::Bool(true)));
        assert_eq!(interp.global("bad"), Some(Value::Bool(false)));
        // a failed parse leaves the target untouched
        assert_eq!(interp.global("n"), Some(Value::Int(42)));
    }

    #[test]
    fn test_try_str_to_int_with_base() {
        let interp = run(vec![
            var_decl("n", Some("Integer"), None),
            var_decl("ok", None, Some(call("TryStrToInt", vec![string("ff"), int(16), ident("n")]))),
        ]);
        assert_eq!(interp.global("ok"), Some(Value::Bool(true)));
        assert_eq!(interp.global("n"), Some(Value::Int(255)));
    }

    #[test]
    fn test_try_str_to_float() {
        let interp = run(vec![
            var_decl("x", Some("Float"), None),
            var_decl("ok", None, Some(call("TryStrToFloat", vec![string("2.5"), ident("x")]))),
        ]);
        assert_eq!(interp.global("ok"), Some(Value::Bool(true)));
        assert_eq!(interp.global("x"), Some(Value::Float(2.5)));
    }

    // --- misc ---

    #[test]
    fn test_div_mod() {
        let interp = run(vec![
            var_decl("q", None, Some(int(0))),
            var_decl("r", None, Some(int(0))),
            expr_stmt(call("DivMod", vec![int(17), int(5), ident("q"), ident("r")])),
        ]);
        assert_eq!(interp.global("q"), Some(Value::Int(3)));
        assert_eq!(interp.global("r"), Some(Value::Int(2)));
    }

    #[test]
    fn test_div_mod_by_zero() {
        let err = run_err(vec![
            var_decl("q", None, Some(int(0))),
            var_decl("r", None, Some(int(0))),
            expr_stmt(call("DivMod", vec![int(1), int(0), ident("q"), ident("r")])),
        ]);
        assert!(matches!(err, crate::Error::Runtime(e) if e.kind == ErrorKind::DivisionByZero));
    }

    #[test]
    fn test_decode_date() {
        let interp = run(vec![
            var_decl("y", None, Some(int(0))),
            var_decl("m", None, Some(int(0))),
            var_decl("d", None, Some(int(0))),
            expr_stmt(call(
                "DecodeDate",
                vec![call("EncodeDate", vec![int(2024), int(3), int(15)]), ident("y"), ident("m"), ident("d")],
            )),
        ]);
        assert_eq!(interp.global("y"), Some(Value::Int(2024)));
        assert_eq!(interp.global("m"), Some(Value::Int(3)));
        assert_eq!(interp.global("d"), Some(Value::Int(15)));
    }

    #[test]
    fn test_include_exclude() {
        let interp = run(vec![
            var_decl("s", None, Some(set_lit(vec![int(1)]))),
            expr_stmt(call("Include", vec![ident("s"), int(4)])),
            expr_stmt(call("Exclude", vec![ident("s"), int(1)])),
        ]);
        assert_eq!(interp.global("s").unwrap().to_string(), "[4]");
    }
}
