//! Standard helper methods on primitive receivers (`s.ToUpper`,
//! `arr.Push(x)`, `color.Name`)

use super::builtins::string_array;
use super::error::{InterpResult, RuntimeError};
use super::value::Value;
use crate::types::{convert_implicit, HelperMethod, NativeHelper, TypeTable};

fn expect_args(name: &str, args: &[Value], count: usize) -> InterpResult<()> {
    if args.len() != count {
        return Err(RuntimeError::arity_mismatch(name, count, args.len()));
    }
    Ok(())
}

/// Register the default helpers under the receiver keys `String`,
/// `Integer`, `Float`, `Boolean`, `array` and `enum`
pub fn register_standard_helpers(table: &TypeTable) {
    let add = |target: &str, name: &str, func: NativeHelper| {
        table.register_helper(target, name, HelperMethod::Native(func));
    };

    add("String", "ToUpper", string_to_upper);
    add("String", "ToLower", string_to_lower);
    add("String", "Length", string_length);
    add("String", "Trim", string_trim);
    add("String", "Contains", string_contains);
    add("String", "Split", string_split);

    add("Integer", "ToString", value_to_string);
    add("Float", "ToString", value_to_string);
    add("Boolean", "ToString", value_to_string);

    add("array", "Length", array_length);
    add("array", "High", array_high);
    add("array", "Low", array_low);
    add("array", "Add", array_push);
    add("array", "Push", array_push);
    add("array", "Pop", array_pop);
    add("array", "IndexOf", array_index_of);

    add("enum", "Name", value_to_string);
    add("enum", "ToString", value_to_string);
    add("enum", "Ordinal", enum_ordinal);
    add("enum", "Value", enum_ordinal);
}

// --- strings ---

fn string_to_upper(recv: &Value, args: &[Value]) -> InterpResult<Value> {
    expect_args("ToUpper", args, 0)?;
    Ok(Value::string(recv.expect_str("ToUpper")?.to_uppercase()))
}

fn string_to_lower(recv: &Value, args: &[Value]) -> InterpResult<Value> {
    expect_args("ToLower", args, 0)?;
    Ok(Value::string(recv.expect_str("ToLower")?.to_lowercase()))
}

fn string_length(recv: &Value, args: &[Value]) -> InterpResult<Value> {
    expect_args("Length", args, 0)?;
    Ok(Value::Int(recv.expect_str("Length")?.chars().count() as i64))
}

fn string_trim(recv: &Value, args: &[Value]) -> InterpResult<Value> {
    expect_args("Trim", args, 0)?;
    Ok(Value::string(recv.expect_str("Trim")?.trim()))
}

fn string_contains(recv: &Value, args: &[Value]) -> InterpResult<Value> {
    expect_args("Contains", args, 1)?;
    let needle = args[0].expect_str("Contains")?;
    Ok(Value::Bool(recv.expect_str("Contains")?.contains(needle)))
}

fn string_split(recv: &Value, args: &[Value]) -> InterpResult<Value> {
    expect_args("Split", args, 1)?;
    let text = recv.expect_str("Split")?;
    let sep = args[0].expect_str("Split")?;
    if sep.is_empty() {
        return Ok(string_array(std::iter::once(text.to_string())));
    }
    Ok(string_array(text.split(sep).map(str::to_string)))
}

fn value_to_string(recv: &Value, args: &[Value]) -> InterpResult<Value> {
    expect_args("ToString", args, 0)?;
    Ok(Value::string(recv.to_string()))
}

// --- arrays ---

fn expect_array(recv: &Value) -> InterpResult<&super::value::ArrayRef> {
    match recv {
        Value::Array(arr) => Ok(arr),
        other => Err(RuntimeError::type_mismatch("array", &other.type_name())),
    }
}

fn array_length(recv: &Value, args: &[Value]) -> InterpResult<Value> {
    expect_args("Length", args, 0)?;
    Ok(Value::Int(expect_array(recv)?.borrow().elements.len() as i64))
}

fn array_high(recv: &Value, args: &[Value]) -> InterpResult<Value> {
    expect_args("High", args, 0)?;
    Ok(Value::Int(expect_array(recv)?.borrow().high()))
}

fn array_low(recv: &Value, args: &[Value]) -> InterpResult<Value> {
    expect_args("Low", args, 0)?;
    Ok(Value::Int(expect_array(recv)?.borrow().low()))
}

fn array_push(recv: &Value, args: &[Value]) -> InterpResult<Value> {
    let arr = expect_array(recv)?;
    let mut arr = arr.borrow_mut();
    if arr.ty.is_static() {
        return Err(RuntimeError::invalid_operation("cannot add elements to a static array"));
    }
    for arg in args {
        let value = convert_implicit(arg, &arr.ty.element).unwrap_or_else(|| arg.clone());
        arr.elements.push(value.copy_on_assign());
    }
    Ok(Value::Nil)
}

fn array_pop(recv: &Value, args: &[Value]) -> InterpResult<Value> {
    expect_args("Pop", args, 0)?;
    let arr = expect_array(recv)?;
    let mut arr = arr.borrow_mut();
    if arr.ty.is_static() {
        return Err(RuntimeError::invalid_operation("cannot remove elements from a static array"));
    }
    arr.elements
        .pop()
        .ok_or_else(|| RuntimeError::invalid_operation("Pop on an empty array"))
}

fn array_index_of(recv: &Value, args: &[Value]) -> InterpResult<Value> {
    expect_args("IndexOf", args, 1)?;
    let arr = expect_array(recv)?.borrow();
    let found = arr
        .elements
        .iter()
        .position(|e| e == &args[0])
        .map_or(-1, |i| arr.low() + i as i64);
    Ok(Value::Int(found))
}

// --- enums ---

fn enum_ordinal(recv: &Value, args: &[Value]) -> InterpResult<Value> {
    expect_args("Ordinal", args, 0)?;
    recv.ordinal()
        .map(Value::Int)
        .ok_or_else(|| RuntimeError::type_mismatch("enum", &recv.type_name()))
}
