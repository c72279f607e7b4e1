//! Method-call dispatch
//!
//! A receiver is routed by kind, in a fixed order:
//!
//! 1. direct capabilities (set `Include`/`Exclude`/`Contains`, enum type
//!    `Low`/`High`/`ByName`)
//! 2. Nil fails with "Object not instantiated"
//! 3. primitives (strings, numbers, booleans, arrays, enums, variants) use
//!    helper methods only
//! 4. objects, interfaces, class references and records try helpers, then
//!    the declaration-aware [`MethodDispatcher`](super::MethodDispatcher)

use super::error::{InterpResult, RuntimeError};
use super::eval::{Evaluator, UserFunction};
use super::state::ExecutionState;
use super::value::Value;
use crate::ast::{Expr, FunctionDecl, Position, Spanned};
use crate::types::{HelperMethod, PropertyInfo, Type};
use crate::util::same_name;
use std::rc::Rc;

/// Methods every object answers without a declaration
const OBJECT_BUILTIN_METHODS: &[&str] = &["ClassName", "ClassType", "Free", "Destroy"];

impl Evaluator {
    /// `receiver.method(args)`
    pub(crate) fn eval_method_call(
        &mut self,
        receiver: &Spanned<Expr>,
        method: &str,
        args: &[Spanned<Expr>],
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        let target = self.eval_expr(receiver, state)?;
        propagate!(state);
        let target = target.deref()?;

        let values = match self.method_decl_for(&target, method, args.len()) {
            Some(decl) => self.prepare_args(&decl, args, state)?,
            None => self.eval_args(args, state)?,
        };
        propagate!(state);
        self.call_method(&target, method, values, pos, state)
    }

    /// Declaration a call would bind to, used to prepare var and lazy
    /// arguments before dispatch
    pub(crate) fn method_decl_for(&self, receiver: &Value, method: &str, argc: usize) -> Option<Rc<FunctionDecl>> {
        let declared = match receiver {
            Value::Object(obj) => obj.class.find_method(method, argc),
            Value::Interface(iface) => iface
                .object
                .as_ref()
                .and_then(|obj| obj.class.find_method(method, argc)),
            Value::ClassRef(class) => class.find_method(method, argc),
            Value::Record(rec) => rec.borrow().ty.find_method(method, argc),
            _ => None,
        };
        declared.or_else(|| match self.find_helper(receiver, method) {
            Some(HelperMethod::User(decl)) => Some(decl),
            _ => None,
        })
    }

    /// Invoke `method` on an evaluated receiver
    pub fn call_method(
        &mut self,
        receiver: &Value,
        method: &str,
        args: Vec<Value>,
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        tracing::debug!(receiver = %receiver.type_name(), method, "method call");
        match receiver {
            Value::Reference(r) => {
                let target = r.deref()?;
                self.call_method(&target, method, args, pos, state)
            }

            Value::Set(_) => self.call_set_method(receiver, method, &args),
            Value::TypeMeta(Type::Enum(ty)) => {
                if same_name(method, "Low") {
                    Ok(Value::Int(ty.low()))
                } else if same_name(method, "High") {
                    Ok(Value::Int(ty.high()))
                } else if same_name(method, "ByName") {
                    if args.len() != 1 {
                        return Err(RuntimeError::arity_mismatch("ByName", 1, args.len()));
                    }
                    let name = args[0].expect_str("ByName")?;
                    Ok(Value::Int(ty.ordinal_of(name).unwrap_or(-1)))
                } else {
                    Err(RuntimeError::undefined_method(&ty.name, method))
                }
            }

            Value::Nil => Err(RuntimeError::nil_receiver()),

            Value::Variant(inner) => match self.find_helper(receiver, method) {
                Some(helper) => self.call_helper(helper, receiver, args, pos, state),
                None => self.call_method(inner, method, args, pos, state),
            },

            Value::Object(_) | Value::Interface(_) | Value::ClassRef(_) | Value::Record(_) => {
                if let Some(helper) = self.find_helper(receiver, method) {
                    return self.call_helper(helper, receiver, args, pos, state);
                }
                let dispatcher = self
                    .dispatcher
                    .clone()
                    .ok_or_else(|| RuntimeError::missing_collaborator("method dispatcher"))?;
                dispatcher.call_method(self, receiver, method, args, pos, state)
            }

            _ => match self.find_helper(receiver, method) {
                Some(helper) => self.call_helper(helper, receiver, args, pos, state),
                None => Err(RuntimeError::undefined_method(&receiver.type_name(), method)),
            },
        }
    }

    fn call_set_method(&self, receiver: &Value, method: &str, args: &[Value]) -> InterpResult<Value> {
        let expect_one = |name: &str| {
            if args.len() == 1 {
                Ok(())
            } else {
                Err(RuntimeError::arity_mismatch(name, 1, args.len()))
            }
        };
        if same_name(method, "Include") {
            expect_one("Include")?;
            receiver.set_include(&args[0])?;
            Ok(Value::Nil)
        } else if same_name(method, "Exclude") {
            expect_one("Exclude")?;
            receiver.set_exclude(&args[0])?;
            Ok(Value::Nil)
        } else if same_name(method, "Contains") {
            expect_one("Contains")?;
            match receiver {
                Value::Set(set) => Ok(Value::Bool(set.borrow().contains(&args[0]))),
                _ => Err(RuntimeError::internal("set method on a non-set receiver")),
            }
        } else {
            Err(RuntimeError::undefined_method(&receiver.type_name(), method))
        }
    }

    // --- helpers ---

    /// Helper lookup keys for a receiver, most specific first
    fn helper_type_names(value: &Value) -> Vec<String> {
        match value {
            Value::Int(_) => vec!["Integer".into()],
            Value::Float(_) => vec!["Float".into()],
            Value::Str(_) => vec!["String".into()],
            Value::Bool(_) => vec!["Boolean".into()],
            Value::Array(a) => vec![a.borrow().ty.to_string(), "array".into()],
            Value::Enum(e) => vec![e.ty.name.clone(), "enum".into()],
            Value::Object(obj) => obj.class.ancestry().map(|c| c.name.clone()).collect(),
            Value::ClassRef(class) => class.ancestry().map(|c| c.name.clone()).collect(),
            Value::Interface(iface) => vec![iface.interface.name.clone()],
            Value::Record(rec) => vec![rec.borrow().ty.name.clone(), "record".into()],
            Value::Set(_) => vec!["set".into()],
            Value::Variant(inner) => {
                let mut names = vec!["Variant".to_string()];
                names.extend(Self::helper_type_names(inner));
                names
            }
            _ => Vec::new(),
        }
    }

    fn find_helper(&self, receiver: &Value, method: &str) -> Option<HelperMethod> {
        Self::helper_type_names(receiver)
            .iter()
            .find_map(|name| self.types.lookup_helper(name, method))
    }

    fn call_helper(
        &mut self,
        helper: HelperMethod,
        receiver: &Value,
        args: Vec<Value>,
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        match helper {
            HelperMethod::Native(func) => {
                let result = func(receiver, &args);
                self.native_result(result, pos, state)
            }
            HelperMethod::User(decl) => {
                let function = UserFunction {
                    decl,
                    scope: Rc::clone(&self.globals),
                };
                self.execute_user_function(&function, args, Some(receiver.clone()), pos, state)
            }
        }
    }

    // --- member access ---

    /// `object.member` without call syntax
    pub(crate) fn eval_member(
        &mut self,
        object: &Spanned<Expr>,
        member: &str,
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        let receiver = self.eval_expr(object, state)?;
        propagate!(state);
        let receiver = receiver.deref()?;
        self.read_member(&receiver, member, pos, state)
    }

    pub(crate) fn read_member(
        &mut self,
        receiver: &Value,
        member: &str,
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        match receiver {
            Value::Object(obj) => {
                if let Some(value) = obj.field(member) {
                    return Ok(value);
                }
                if let Some(prop) = obj.class.find_property(member) {
                    return self.read_property(receiver, &prop, pos, state);
                }
                if let Some(value) = obj.class.class_var(member) {
                    return Ok(value);
                }
                let answers = obj.class.has_method(member)
                    || OBJECT_BUILTIN_METHODS.iter().any(|m| same_name(m, member))
                    || self.find_helper(receiver, member).is_some();
                if answers {
                    return self.call_method(receiver, member, Vec::new(), pos, state);
                }
                Err(RuntimeError::field_not_found(&obj.class.name, member))
            }
            Value::Interface(iface) => match &iface.object {
                Some(obj) => self.read_member(&Value::Object(Rc::clone(obj)), member, pos, state),
                None => Err(RuntimeError::nil_receiver()),
            },
            Value::Record(rec) => {
                let field = rec.borrow().field(member);
                match field {
                    Some(value) => Ok(value),
                    None => self.call_method(receiver, member, Vec::new(), pos, state),
                }
            }
            Value::ClassRef(class) => match class.class_var(member) {
                Some(value) => Ok(value),
                None => self.call_method(receiver, member, Vec::new(), pos, state),
            },
            Value::TypeMeta(Type::Enum(ty)) => match ty.ordinal_of(member) {
                Some(ordinal) => Ok(Value::enum_value(Rc::clone(ty), ordinal)),
                None => self.call_method(receiver, member, Vec::new(), pos, state),
            },
            Value::Nil => Err(RuntimeError::nil_receiver()),
            _ => self.call_method(receiver, member, Vec::new(), pos, state),
        }
    }

    // --- properties ---

    fn property_key(receiver: &Value, prop: &PropertyInfo) -> String {
        let owner = match receiver {
            Value::Object(obj) => obj.class.name.clone(),
            other => other.type_name(),
        };
        format!("{owner}.{}", prop.name)
    }

    /// Read through the property's field or getter.
    ///
    /// A getter that reads its own property fails rather than recursing.
    pub(crate) fn read_property(
        &mut self,
        receiver: &Value,
        prop: &PropertyInfo,
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        let accessor = prop.read.as_deref().ok_or_else(|| {
            RuntimeError::invalid_operation(format!("property {} is write-only", prop.name))
        })?;
        if let Value::Object(obj) = receiver {
            if let Some(value) = obj.field(accessor) {
                return Ok(value);
            }
        }

        let key = Self::property_key(receiver, prop);
        state.enter_property(&key, false)?;
        let result = self.call_method(receiver, accessor, Vec::new(), pos, state);
        state.leave_property();
        result
    }

    pub(crate) fn write_property(
        &mut self,
        receiver: &Value,
        prop: &PropertyInfo,
        value: Value,
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<()> {
        let accessor = prop.write.as_deref().ok_or_else(|| {
            RuntimeError::invalid_operation(format!("property {} is read-only", prop.name))
        })?;
        if let Value::Object(obj) = receiver {
            if obj.has_field(accessor) {
                obj.set_field(accessor, value);
                return Ok(());
            }
        }

        let key = Self::property_key(receiver, prop);
        state.enter_property(&key, true)?;
        let result = self.call_method(receiver, accessor, vec![value], pos, state);
        state.leave_property();
        result.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::{BinOp, Program};
    use crate::config::EvalConfig;
    use crate::interp::{ErrorKind, Interpreter};
    use crate::types::{ClassInfo, EnumType, FieldInfo, TypeRegistry, TypeTable};
    use pretty_assertions::assert_eq;

    fn define(interp: &mut Interpreter, name: &str, value: Value) {
        let (_, state) = interp.parts();
        state.env().borrow_mut().define(name, value);
    }

    // --- direct capabilities ---

    #[test]
    fn test_set_include_exclude() {
        let mut interp = Interpreter::with_captured_output();
        interp
            .run(&Program::new(vec![
                var_decl("s", None, Some(set_lit(vec![int(1), int(2)]))),
                expr_stmt(method_call(ident("s"), "Include", vec![int(5)])),
                expr_stmt(method_call(ident("s"), "exclude", vec![int(1)])),
            ]))
            .unwrap();
        assert_eq!(interp.global("s").unwrap().to_string(), "[2, 5]");
        let has = interp
            .eval_expr(&method_call(ident("s"), "Contains", vec![int(5)]))
            .unwrap();
        assert_eq!(has, Value::Bool(true));
        let err = interp
            .eval_expr(&method_call(ident("s"), "Clear", vec![]))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UndefinedMethod);
    }

    #[test]
    fn test_enum_type_meta_methods() {
        let mut interp = Interpreter::with_captured_output();
        let ty = Rc::new(EnumType::sequential("TColor", &["Red", "Green", "Blue"]));
        define(&mut interp, "C", Value::TypeMeta(Type::Enum(ty)));
        let high = interp.eval_expr(&method_call(ident("C"), "High", vec![])).unwrap();
        assert_eq!(high, Value::Int(2));
        let found = interp
            .eval_expr(&method_call(ident("C"), "ByName", vec![string("green")]))
            .unwrap();
        assert_eq!(found, Value::Int(1));
        let missing = interp
            .eval_expr(&method_call(ident("C"), "ByName", vec![string("Mauve")]))
            .unwrap();
        assert_eq!(missing, Value::Int(-1));
        let member_value = interp.eval_expr(&member(ident("C"), "Blue")).unwrap();
        assert_eq!(member_value.to_string(), "Blue");
    }

    #[test]
    fn test_nil_receiver() {
        let mut interp = Interpreter::with_captured_output();
        define(&mut interp, "o", Value::Nil);
        let err = interp.eval_expr(&method_call(ident("o"), "Anything", vec![])).unwrap_err();
        assert_eq!(err.message, "Object not instantiated");
    }

    // --- helpers ---

    #[test]
    fn test_string_helper() {
        let mut interp = Interpreter::with_captured_output();
        let upper = interp
            .eval_expr(&method_call(string("abc"), "toupper", vec![]))
            .unwrap();
        assert_eq!(upper, Value::string("ABC"));
        let err = interp
            .eval_expr(&method_call(string("abc"), "Explode", vec![]))
            .unwrap_err();
        assert_eq!(err.message, "method 'Explode' not found for type String");
    }

    #[test]
    fn test_user_helper_binds_self() {
        let mut interp = Interpreter::with_captured_output();
        let decl = function("Twice", vec![], Some("Integer"))
            .body(vec![assign(ident("Result"), binary(self_ref(), BinOp::Mul, int(2)))])
            .build();
        interp
            .types()
            .register_helper("Integer", "Twice", HelperMethod::User(Rc::new(decl)));
        let value = interp.eval_expr(&method_call(int(21), "Twice", vec![])).unwrap();
        assert_eq!(value, Value::Int(42));
    }

    #[test]
    fn test_variant_falls_through_to_inner_helpers() {
        let mut interp = Interpreter::with_captured_output();
        define(&mut interp, "v", Value::Variant(Box::new(Value::string("hi"))));
        let value = interp.eval_expr(&method_call(ident("v"), "ToUpper", vec![])).unwrap();
        assert_eq!(value, Value::string("HI"));
    }

    // --- composite receivers ---

    #[test]
    fn test_object_without_dispatcher() {
        let types = Rc::new(TypeTable::standard());
        let class = types.lookup_class("TObject").unwrap();
        let mut eval = Evaluator::new(EvalConfig::default(), types);
        let mut state = eval.new_state();
        let err = eval
            .call_method(&Value::object(class), "Foo", vec![], Position::default(), &mut state)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingCollaborator);
        assert_eq!(err.message, "internal error: no method dispatcher configured");
    }

    fn box_class(interp: &Interpreter) -> Rc<ClassInfo> {
        let table = interp.types();
        let class = table.register_class(
            ClassInfo::new("TBox", table.lookup_class("TObject"))
                .with_field(FieldInfo::new("FValue", Type::Integer))
                .with_property(PropertyInfo {
                    name: "Value".into(),
                    read: Some("GetValue".into()),
                    write: Some("FValue".into()),
                })
                .with_property(PropertyInfo {
                    name: "Loop".into(),
                    read: Some("GetLoop".into()),
                    write: None,
                }),
        );
        class.add_method(Rc::new(
            function("GetValue", vec![], Some("Integer"))
                .body(vec![assign(ident("Result"), binary(ident("FValue"), BinOp::Mul, int(2)))])
                .method_of("TBox")
                .build(),
        ));
        class.add_method(Rc::new(
            function("GetLoop", vec![], Some("Integer"))
                .body(vec![assign(ident("Result"), ident("Loop"))])
                .method_of("TBox")
                .build(),
        ));
        class
    }

    #[test]
    fn test_property_getter_and_field_setter() {
        let mut interp = Interpreter::with_captured_output();
        let class = box_class(&interp);
        define(&mut interp, "b", Value::object(class));
        interp
            .run(&Program::new(vec![assign(member(ident("b"), "Value"), int(21))]))
            .unwrap();
        let value = interp.eval_expr(&member(ident("b"), "Value")).unwrap();
        assert_eq!(value, Value::Int(42));
    }

    #[test]
    fn test_recursive_property_read_fails() {
        let mut interp = Interpreter::with_captured_output();
        let class = box_class(&interp);
        define(&mut interp, "b", Value::object(class));
        let err = interp.eval_expr(&member(ident("b"), "Loop")).unwrap_err();
        assert_eq!(err.message, "recursive access to property tbox.loop");
        // the guard is released after the failure
        assert!(!interp.parts().1.in_property("TBox.Loop"));
    }

    #[test]
    fn test_read_only_property_rejects_writes() {
        let mut interp = Interpreter::with_captured_output();
        let class = box_class(&interp);
        define(&mut interp, "b", Value::object(class));
        let err = interp
            .run(&Program::new(vec![assign(member(ident("b"), "Loop"), int(1))]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Runtime error: property Loop is read-only");
    }

    #[test]
    fn test_unknown_member_on_object() {
        let mut interp = Interpreter::with_captured_output();
        let class = box_class(&interp);
        define(&mut interp, "b", Value::object(class));
        let err = interp.eval_expr(&member(ident("b"), "Nope")).unwrap_err();
        assert_eq!(err.message, "field 'Nope' not found in TBox");
    }
}
