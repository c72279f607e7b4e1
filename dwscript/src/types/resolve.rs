//! Type-name resolution, zero values and implicit conversions

use super::*;
use crate::interp::{ArrayValue, RecordValue, RuntimeError, SetValue};
use crate::util::strip_parent_suffix;

/// Resolve a type name as written in a declaration.
///
/// Handles built-in names, inline `array of X`, `array[lo..hi] of X`,
/// `set of X`, `function(..): X` / `procedure(..)` pointer types and
/// registered named types.
pub fn resolve_type(registry: &dyn TypeRegistry, name: &str) -> InterpResult<Type> {
    let trimmed = name.trim();
    let lower = trimmed.to_ascii_lowercase();

    if let Some(rest) = keyword_rest(&lower, trimmed, "function") {
        return resolve_function_pointer(registry, rest, true, trimmed);
    }
    if let Some(rest) = keyword_rest(&lower, trimmed, "procedure") {
        return resolve_function_pointer(registry, rest, false, trimmed);
    }
    if let Some(rest) = keyword_rest(&lower, trimmed, "array") {
        return resolve_array(registry, rest, trimmed);
    }
    if let Some(rest) = keyword_rest(&lower, trimmed, "set") {
        let element = strip_of(rest).ok_or_else(|| RuntimeError::unknown_type(trimmed))?;
        return Ok(Type::Set(Box::new(resolve_type(registry, element)?)));
    }

    let base = strip_parent_suffix(trimmed);
    match base.to_ascii_lowercase().as_str() {
        "integer" | "int64" | "cardinal" | "longint" | "smallint" | "shortint" | "byte"
        | "word" => return Ok(Type::Integer),
        "float" | "double" | "real" | "single" | "extended" | "currency" | "tdatetime" => {
            return Ok(Type::Float);
        }
        "string" | "char" | "widechar" | "unicodestring" | "ansistring" | "widestring" => {
            return Ok(Type::String);
        }
        "boolean" => return Ok(Type::Boolean),
        "variant" | "const" => return Ok(Type::Variant),
        _ => {}
    }

    if let Some(ty) = registry.lookup_enum(base) {
        return Ok(Type::Enum(ty));
    }
    if let Some(ty) = registry.lookup_record(base) {
        return Ok(Type::Record(ty));
    }
    if let Some(ty) = registry.lookup_class(base) {
        return Ok(Type::Class(ty));
    }
    if let Some(ty) = registry.lookup_interface(base) {
        return Ok(Type::Interface(ty));
    }
    if let Some(ty) = registry.lookup_array(base) {
        return Ok(Type::Array(ty));
    }
    if let Some(ty) = registry.lookup_subrange(base) {
        return Ok(Type::Subrange(ty));
    }
    if let Some(ty) = registry.lookup_function_pointer(base) {
        return Ok(Type::FunctionPointer(ty));
    }
    Err(RuntimeError::unknown_type(base))
}

/// Text after a leading keyword, provided the keyword ends at a word boundary
fn keyword_rest<'a>(lower: &str, original: &'a str, keyword: &str) -> Option<&'a str> {
    if !lower.starts_with(keyword) {
        return None;
    }
    let rest = &original[keyword.len()..];
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() || c == '(' || c == '[' || c == ':' => Some(rest.trim_start()),
        Some(_) => None,
    }
}

/// `of X` -> `X`
fn strip_of(text: &str) -> Option<&str> {
    let text = text.trim_start();
    let lower = text.to_ascii_lowercase();
    if lower.starts_with("of") && text[2..].starts_with(char::is_whitespace) {
        Some(text[2..].trim())
    } else {
        None
    }
}

fn resolve_array(registry: &dyn TypeRegistry, rest: &str, full: &str) -> InterpResult<Type> {
    if let Some(inner) = rest.strip_prefix('[') {
        let close = inner
            .find(']')
            .ok_or_else(|| RuntimeError::unknown_type(full))?;
        let (low, high) = parse_bounds(registry, &inner[..close], full)?;
        let element_text =
            strip_of(&inner[close + 1..]).ok_or_else(|| RuntimeError::unknown_type(full))?;
        let element = resolve_type(registry, element_text)?;
        return Ok(Type::Array(Rc::new(ArrayType::fixed(element, low, high))));
    }
    let element_text = strip_of(rest).ok_or_else(|| RuntimeError::unknown_type(full))?;
    let element = resolve_type(registry, element_text)?;
    Ok(Type::Array(Rc::new(ArrayType::dynamic(element))))
}

/// `lo..hi` with integer bounds, or an enum type name spanning all members
fn parse_bounds(registry: &dyn TypeRegistry, text: &str, full: &str) -> InterpResult<(i64, i64)> {
    if let Some((lo, hi)) = text.split_once("..") {
        let low: i64 = lo
            .trim()
            .parse()
            .map_err(|_| RuntimeError::unknown_type(full))?;
        let high: i64 = hi
            .trim()
            .parse()
            .map_err(|_| RuntimeError::unknown_type(full))?;
        if low > high {
            return Err(RuntimeError::invalid_operation(format!(
                "array lower bound {low} exceeds upper bound {high}"
            )));
        }
        return Ok((low, high));
    }
    match registry.lookup_enum(text.trim()) {
        Some(ty) => Ok((ty.low(), ty.high())),
        None => Err(RuntimeError::unknown_type(full)),
    }
}

fn resolve_function_pointer(
    registry: &dyn TypeRegistry,
    rest: &str,
    is_function: bool,
    full: &str,
) -> InterpResult<Type> {
    let mut rest = rest.trim();
    let lower = rest.to_ascii_lowercase();
    if lower.ends_with("of object") {
        rest = rest[..rest.len() - "of object".len()].trim_end();
    }

    let mut params = Vec::new();
    if rest.starts_with('(') {
        let close = matching_paren(rest).ok_or_else(|| RuntimeError::unknown_type(full))?;
        for ty in split_param_types(&rest[1..close]) {
            params.push(resolve_type(registry, &ty)?);
        }
        rest = rest[close + 1..].trim();
    }

    let return_type = if is_function {
        let ret = rest
            .strip_prefix(':')
            .ok_or_else(|| RuntimeError::unknown_type(full))?;
        Some(resolve_type(registry, ret)?)
    } else {
        None
    };

    Ok(Type::FunctionPointer(Rc::new(FunctionPointerType {
        params,
        return_type,
    })))
}

/// Index of the `)` closing the `(` at position 0
fn matching_paren(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split `text` on `sep` outside any brackets
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Parameter type names from a pointer-type parameter list.
///
/// Accepts both `a, b: Integer; const s: String` and bare `Integer, String`.
pub fn split_param_types(list: &str) -> Vec<String> {
    let mut types = Vec::new();
    for group in split_top_level(list, ';') {
        let group = group.trim();
        if group.is_empty() {
            continue;
        }
        let group = strip_param_modifier(group);
        match split_top_level(group, ':').as_slice() {
            [names, ty] => {
                let count = split_top_level(names, ',').len();
                types.extend(std::iter::repeat_n(ty.trim().to_string(), count));
            }
            _ => {
                types.extend(
                    split_top_level(group, ',')
                        .into_iter()
                        .map(|t| t.trim().to_string()),
                );
            }
        }
    }
    types
}

fn strip_param_modifier(group: &str) -> &str {
    for modifier in ["const ", "var ", "out ", "lazy "] {
        if group.len() > modifier.len()
            && group[..modifier.len()].eq_ignore_ascii_case(modifier)
        {
            return group[modifier.len()..].trim_start();
        }
    }
    group
}

/// Zero value of a type
pub fn default_value(ty: &Type) -> Value {
    match ty {
        Type::Integer => Value::Int(0),
        Type::Float => Value::Float(0.0),
        Type::String => Value::string(""),
        Type::Boolean => Value::Bool(false),
        Type::Enum(e) => Value::enum_value(Rc::clone(e), e.low()),
        Type::Subrange(s) => Value::Int(s.low),
        Type::Record(r) => Value::Record(RecordValue::with_defaults(Rc::clone(r)).into_ref()),
        Type::Array(a) => {
            let elements = match a.static_len() {
                Some(len) => (0..len).map(|_| default_value(&a.element)).collect(),
                None => Vec::new(),
            };
            Value::Array(ArrayValue::new(Rc::clone(a), elements).into_ref())
        }
        Type::Set(elem) => Value::Set(SetValue::empty((**elem).clone()).into_ref()),
        Type::Variant
        | Type::Class(_)
        | Type::Interface(_)
        | Type::FunctionPointer(_) => Value::Nil,
    }
}

/// Implicit conversion of `value` to `target`, if one applies.
///
/// Returns None when the value already fits or no conversion exists.
pub fn convert_implicit(value: &Value, target: &Type) -> Option<Value> {
    match (value, target) {
        (Value::Int(n), Type::Float) => Some(Value::Float(*n as f64)),
        (Value::Variant(inner), t) if !matches!(t, Type::Variant) => {
            let inner = (**inner).clone();
            convert_implicit(&inner, t).or(Some(inner))
        }
        (Value::Nil | Value::Variant(_) | Value::Reference(_), Type::Variant) => None,
        (v, Type::Variant) => Some(Value::Variant(Box::new(v.clone()))),
        (Value::Object(obj), Type::Interface(iface)) if obj.class.implements(&iface.name) => {
            Some(Value::interface(Rc::clone(iface), Some(Rc::clone(obj))))
        }
        _ => None,
    }
}
