//! Standard-library builtins
//!
//! Plain name -> function registry. Builtins see fully evaluated,
//! dereferenced arguments and cannot touch the caller's variables; the
//! ones that must write back live in `inplace`.

use super::datetime;
use super::error::{InterpResult, RuntimeError};
use super::value::Value;
use crate::types::{ArrayType, Type};
use crate::util::normalize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

/// Builtin function type
pub type BuiltinFn = fn(&mut dyn Output, &[Value]) -> InterpResult<Value>;

/// Destination of `Print`/`PrintLn`
pub trait Output {
    fn write_str(&mut self, text: &str);
}

/// Writes to the process stdout
#[derive(Debug, Default)]
pub struct StdoutOutput;

impl Output for StdoutOutput {
    fn write_str(&mut self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}

/// Collects output in a shared buffer
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput(Rc<RefCell<String>>);

impl CapturedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.0.borrow().clone()
    }
}

impl Output for CapturedOutput {
    fn write_str(&mut self, text: &str) {
        self.0.borrow_mut().push_str(text);
    }
}

/// Name -> builtin lookup, case-insensitive
#[derive(Clone, Default)]
pub struct BuiltinRegistry {
    functions: HashMap<String, BuiltinFn>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every standard builtin
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("Print", builtin_print);
        registry.register("PrintLn", builtin_println);

        // conversions
        registry.register("IntToStr", builtin_int_to_str);
        registry.register("StrToInt", builtin_str_to_int);
        registry.register("FloatToStr", builtin_float_to_str);
        registry.register("StrToFloat", builtin_str_to_float);
        registry.register("Ord", builtin_ord);
        registry.register("Chr", builtin_chr);

        // strings and arrays
        registry.register("Length", builtin_length);
        registry.register("High", builtin_high);
        registry.register("Low", builtin_low);
        registry.register("UpperCase", builtin_upper_case);
        registry.register("LowerCase", builtin_lower_case);
        registry.register("Copy", builtin_copy);
        registry.register("Pos", builtin_pos);
        registry.register("Trim", builtin_trim);
        registry.register("Format", builtin_format);

        // math
        registry.register("Abs", builtin_abs);
        registry.register("Sqr", builtin_sqr);
        registry.register("Sqrt", builtin_sqrt);
        registry.register("Round", builtin_round);
        registry.register("Trunc", builtin_trunc);

        // dates
        registry.register("EncodeDate", builtin_encode_date);
        registry.register("EncodeTime", builtin_encode_time);
        registry.register("Now", builtin_now);
        registry
    }

    pub fn register(&mut self, name: &str, func: BuiltinFn) {
        self.functions.insert(normalize(name), func);
    }

    pub fn get(&self, name: &str) -> Option<BuiltinFn> {
        self.functions.get(&normalize(name)).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(&normalize(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

fn expect_args(name: &str, args: &[Value], min: usize, max: usize) -> InterpResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{min} to {max}")
        };
        return Err(RuntimeError::arity_mismatch(name, expected, args.len()));
    }
    Ok(())
}

fn char_count(s: &str) -> i64 {
    s.chars().count() as i64
}

// ============================================================================
// Output
// ============================================================================

fn builtin_print(out: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    for arg in args {
        out.write_str(&arg.to_string());
    }
    Ok(Value::Nil)
}

fn builtin_println(out: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    builtin_print(out, args)?;
    out.write_str("\n");
    Ok(Value::Nil)
}

// ============================================================================
// Conversions
// ============================================================================

fn builtin_int_to_str(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("IntToStr", args, 1, 1)?;
    Ok(Value::string(args[0].expect_int("IntToStr")?.to_string()))
}

/// Parse an integer in `base`; None for malformed input or an invalid base
pub fn parse_int(text: &str, base: u32) -> Option<i64> {
    if !(2..=36).contains(&base) {
        return None;
    }
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if base == 10 {
        if let Some(hex) = text.strip_prefix('$') {
            return i64::from_str_radix(hex, 16).ok();
        }
    }
    i64::from_str_radix(text, base).ok()
}

pub fn parse_float(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|x| !x.is_nan())
}

fn builtin_str_to_int(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("StrToInt", args, 1, 1)?;
    let text = args[0].expect_str("StrToInt")?;
    parse_int(text, 10)
        .map(Value::Int)
        .ok_or_else(|| RuntimeError::conversion(format!("'{text}' is not a valid integer value")))
}

fn builtin_float_to_str(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("FloatToStr", args, 1, 1)?;
    Ok(Value::string(args[0].expect_float("FloatToStr")?.to_string()))
}

fn builtin_str_to_float(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("StrToFloat", args, 1, 1)?;
    let text = args[0].expect_str("StrToFloat")?;
    parse_float(text)
        .map(Value::Float)
        .ok_or_else(|| RuntimeError::conversion(format!("'{text}' is not a valid floating point value")))
}

fn builtin_ord(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("Ord", args, 1, 1)?;
    args[0]
        .ordinal()
        .map(Value::Int)
        .ok_or_else(|| RuntimeError::type_mismatch("ordinal value", &args[0].type_name()))
}

fn builtin_chr(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("Chr", args, 1, 1)?;
    let code = args[0].expect_int("Chr")?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::string(c.to_string()))
        .ok_or_else(|| RuntimeError::invalid_operation(format!("invalid character code {code}")))
}

// ============================================================================
// Strings and arrays
// ============================================================================

fn builtin_length(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("Length", args, 1, 1)?;
    match &args[0] {
        Value::Str(s) => Ok(Value::Int(char_count(s))),
        Value::Array(a) => Ok(Value::Int(a.borrow().elements.len() as i64)),
        Value::Set(s) => Ok(Value::Int(s.borrow().items.len() as i64)),
        Value::Variant(inner) => builtin_length(&mut NullOutput, std::slice::from_ref(inner)),
        other => Err(RuntimeError::type_mismatch("string or array", &other.type_name())),
    }
}

fn bound(name: &str, args: &[Value], high: bool) -> InterpResult<Value> {
    expect_args(name, args, 1, 1)?;
    match &args[0] {
        Value::Array(a) => {
            let a = a.borrow();
            Ok(Value::Int(if high { a.high() } else { a.low() }))
        }
        Value::Str(s) => Ok(Value::Int(if high { char_count(s) } else { 1 })),
        Value::TypeMeta(Type::Enum(e)) | Value::Enum(super::value::EnumValue { ty: e, .. }) => {
            let ord = if high { e.high() } else { e.low() };
            Ok(Value::enum_value(Rc::clone(e), ord))
        }
        Value::TypeMeta(Type::Integer) | Value::Int(_) => {
            Ok(Value::Int(if high { i64::MAX } else { i64::MIN }))
        }
        Value::TypeMeta(Type::Boolean) | Value::Bool(_) => Ok(Value::Bool(high)),
        Value::TypeMeta(Type::Array(a)) => match a.bounds {
            Some((low, hi)) => Ok(Value::Int(if high { hi } else { low })),
            None => Err(RuntimeError::invalid_operation(format!(
                "{name} of a dynamic array type needs an array value"
            ))),
        },
        other => Err(RuntimeError::type_mismatch("array, string or ordinal type", &other.type_name())),
    }
}

fn builtin_high(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    bound("High", args, true)
}

fn builtin_low(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    bound("Low", args, false)
}

fn builtin_upper_case(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("UpperCase", args, 1, 1)?;
    Ok(Value::string(args[0].expect_str("UpperCase")?.to_uppercase()))
}

fn builtin_lower_case(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("LowerCase", args, 1, 1)?;
    Ok(Value::string(args[0].expect_str("LowerCase")?.to_lowercase()))
}

/// `Copy(s, index[, count])`, 1-based and clamped
fn builtin_copy(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("Copy", args, 2, 3)?;
    let s = args[0].expect_str("Copy")?;
    let index = args[1].expect_int("Copy")?.max(1);
    let count = match args.get(2) {
        Some(c) => c.expect_int("Copy")?,
        None => i64::MAX,
    };
    if count <= 0 {
        return Ok(Value::string(""));
    }
    let result: String = s
        .chars()
        .skip((index - 1) as usize)
        .take(usize::try_from(count).unwrap_or(usize::MAX))
        .collect();
    Ok(Value::string(result))
}

/// `Pos(sub, s)`: 1-based character index of the first match, 0 if absent
fn builtin_pos(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("Pos", args, 2, 2)?;
    let needle = args[0].expect_str("Pos")?;
    let haystack = args[1].expect_str("Pos")?;
    if needle.is_empty() {
        return Ok(Value::Int(0));
    }
    let pos = haystack
        .find(needle)
        .map(|byte| char_count(&haystack[..byte]) + 1)
        .unwrap_or(0);
    Ok(Value::Int(pos))
}

fn builtin_trim(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("Trim", args, 1, 1)?;
    Ok(Value::string(args[0].expect_str("Trim")?.trim()))
}

/// `Format(fmt, [args])` supporting `%d %s %f %.Nf %x %%`
fn builtin_format(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("Format", args, 1, 2)?;
    let pattern = args[0].expect_str("Format")?;
    let values: Vec<Value> = match args.get(1) {
        Some(Value::Array(a)) => a.borrow().elements.iter().map(|v| v.clone().unvariant()).collect(),
        Some(other) => vec![other.clone()],
        None => Vec::new(),
    };
    let mut values = values.into_iter();
    let mut out = String::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut precision: Option<usize> = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                digits.push(*d);
                chars.next();
            }
            precision = digits.parse().ok();
        }
        let Some(spec) = chars.next() else {
            return Err(RuntimeError::conversion("format string ends after '%'"));
        };
        if spec == '%' {
            out.push('%');
            continue;
        }
        let value = values
            .next()
            .ok_or_else(|| RuntimeError::conversion(format!("missing argument for %{spec}")))?;
        match spec.to_ascii_lowercase() {
            'd' => out.push_str(&value.expect_int("Format %d")?.to_string()),
            's' => out.push_str(&value.to_string()),
            'f' => {
                let x = value.expect_float("Format %f")?;
                out.push_str(&format!("{x:.*}", precision.unwrap_or(2)));
            }
            'x' => out.push_str(&format!("{:X}", value.expect_int("Format %x")?)),
            other => {
                return Err(RuntimeError::conversion(format!(
                    "unsupported format specifier %{other}"
                )));
            }
        }
    }
    Ok(Value::string(out))
}

// ============================================================================
// Math
// ============================================================================

fn builtin_abs(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("Abs", args, 1, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(n.wrapping_abs())),
        other => Ok(Value::Float(other.expect_float("Abs")?.abs())),
    }
}

fn builtin_sqr(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("Sqr", args, 1, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(n.wrapping_mul(*n))),
        other => {
            let x = other.expect_float("Sqr")?;
            Ok(Value::Float(x * x))
        }
    }
}

fn builtin_sqrt(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("Sqrt", args, 1, 1)?;
    Ok(Value::Float(args[0].expect_float("Sqrt")?.sqrt()))
}

/// Banker's rounding, like the runtime it mirrors
fn builtin_round(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("Round", args, 1, 1)?;
    Ok(Value::Int(args[0].expect_float("Round")?.round_ties_even() as i64))
}

fn builtin_trunc(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("Trunc", args, 1, 1)?;
    Ok(Value::Int(args[0].expect_float("Trunc")?.trunc() as i64))
}

// ============================================================================
// Dates
// ============================================================================

fn builtin_encode_date(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("EncodeDate", args, 3, 3)?;
    let dt = datetime::encode_date(
        args[0].expect_int("EncodeDate")?,
        args[1].expect_int("EncodeDate")?,
        args[2].expect_int("EncodeDate")?,
    )?;
    Ok(Value::Float(dt))
}

fn builtin_encode_time(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("EncodeTime", args, 4, 4)?;
    let dt = datetime::encode_time(
        args[0].expect_int("EncodeTime")?,
        args[1].expect_int("EncodeTime")?,
        args[2].expect_int("EncodeTime")?,
        args[3].expect_int("EncodeTime")?,
    )?;
    Ok(Value::Float(dt))
}

fn builtin_now(_: &mut dyn Output, args: &[Value]) -> InterpResult<Value> {
    expect_args("Now", args, 0, 0)?;
    Ok(Value::Float(datetime::now()))
}

/// Sink for builtins that recurse on a Variant payload
struct NullOutput;

impl Output for NullOutput {
    fn write_str(&mut self, _: &str) {}
}

/// Dynamic array of strings, used by helpers such as `Split`
pub fn string_array(items: impl IntoIterator<Item = String>) -> Value {
    Value::array(
        Rc::new(ArrayType::dynamic(Type::String)),
        items.into_iter().map(Value::string).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn call(name: &str, args: &[Value]) -> InterpResult<Value> {
        let registry = BuiltinRegistry::standard();
        let func = registry.get(name).unwrap();
        func(&mut NullOutput, args)
    }

    fn s(text: &str) -> Value {
        Value::string(text)
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = BuiltinRegistry::standard();
        assert!(registry.contains("println"));
        assert!(registry.contains("INTTOSTR"));
        assert!(!registry.contains("Inc"));
    }

    #[test]
    fn test_println_writes_to_output() {
        let registry = BuiltinRegistry::standard();
        let mut out = CapturedOutput::new();
        let println = registry.get("PrintLn").unwrap();
        println(&mut out, &[s("a"), Value::Int(1)]).unwrap();
        assert_eq!(out.contents(), "a1\n");
    }

    // --- conversions ---

    #[test]
    fn test_str_to_int() {
        assert_eq!(call("StrToInt", &[s("42")]).unwrap(), Value::Int(42));
        assert_eq!(call("StrToInt", &[s(" -7 ")]).unwrap(), Value::Int(-7));
        assert_eq!(call("StrToInt", &[s("$ff")]).unwrap(), Value::Int(255));
        let err = call("StrToInt", &[s("abc")]).unwrap_err();
        assert_eq!(err.kind, crate::interp::ErrorKind::Conversion);
    }

    #[test]
    fn test_parse_int_bases() {
        assert_eq!(parse_int("ff", 16), Some(255));
        assert_eq!(parse_int("101", 2), Some(5));
        assert_eq!(parse_int("z", 36), Some(35));
        assert_eq!(parse_int("1", 37), None);
        assert_eq!(parse_int("1", 1), None);
        assert_eq!(parse_int("", 10), None);
    }

    #[test]
    fn test_float_to_str() {
        assert_eq!(call("FloatToStr", &[Value::Float(2.5)]).unwrap(), s("2.5"));
        assert_eq!(call("FloatToStr", &[Value::Int(3)]).unwrap(), s("3"));
    }

    #[test]
    fn test_chr_ord() {
        assert_eq!(call("Chr", &[Value::Int(65)]).unwrap(), s("A"));
        assert_eq!(call("Ord", &[s("A")]).unwrap(), Value::Int(65));
    }

    // --- strings ---

    #[test]
    fn test_copy_and_pos() {
        assert_eq!(call("Copy", &[s("Hello"), Value::Int(2), Value::Int(3)]).unwrap(), s("ell"));
        assert_eq!(call("Copy", &[s("Hello"), Value::Int(4)]).unwrap(), s("lo"));
        assert_eq!(call("Copy", &[s("Hello"), Value::Int(9), Value::Int(3)]).unwrap(), s(""));
        assert_eq!(call("Pos", &[s("lo"), s("Hello")]).unwrap(), Value::Int(4));
        assert_eq!(call("Pos", &[s("x"), s("Hello")]).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_length_counts_characters() {
        assert_eq!(call("Length", &[s("héllo")]).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_format() {
        let args = Value::array(
            Rc::new(ArrayType::dynamic(Type::Variant)),
            vec![Value::Int(3), s("abc"), Value::Float(1.5)],
        );
        let result = call("Format", &[s("%d-%s-%f-%.1f%%"), args]).unwrap_err();
        assert_eq!(result.kind, crate::interp::ErrorKind::Conversion);

        let args = Value::array(
            Rc::new(ArrayType::dynamic(Type::Variant)),
            vec![Value::Int(3), s("abc"), Value::Float(1.5), Value::Float(2.0)],
        );
        let result = call("Format", &[s("%d-%s-%f-%.1f%%"), args]).unwrap();
        assert_eq!(result, s("3-abc-1.50-2.0%"));
    }

    // --- math ---

    #[test]
    fn test_round_is_bankers() {
        assert_eq!(call("Round", &[Value::Float(2.5)]).unwrap(), Value::Int(2));
        assert_eq!(call("Round", &[Value::Float(3.5)]).unwrap(), Value::Int(4));
        assert_eq!(call("Trunc", &[Value::Float(-2.7)]).unwrap(), Value::Int(-2));
    }

    #[test]
    fn test_abs_sqr_keep_integer_type() {
        assert_eq!(call("Abs", &[Value::Int(-3)]).unwrap(), Value::Int(3));
        assert_eq!(call("Sqr", &[Value::Int(4)]).unwrap(), Value::Int(16));
        assert_eq!(call("Sqr", &[Value::Float(1.5)]).unwrap(), Value::Float(2.25));
    }

    #[test]
    fn test_wrong_arity() {
        let err = call("IntToStr", &[]).unwrap_err();
        assert_eq!(err.message, "IntToStr expects 1 argument(s), got 0");
    }
}
