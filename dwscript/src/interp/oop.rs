//! Default collaborators for classes, records and the other declared types
//!
//! [`DeclarationDispatcher`] performs method calls that need declaration
//! metadata: constructors, virtual dispatch, class methods, record methods
//! and interface forwarding. [`DeclarationEvaluator`] registers
//! declarations into a [`TypeTable`] and evaluates the class-aware
//! expressions (`is`, `as`, `implements`, `inherited`, `new`).

use super::collab::{MethodDispatcher, NodeEvaluator};
use super::error::{InterpResult, RuntimeError};
use super::eval::{Evaluator, UserFunction};
use super::state::ExecutionState;
use super::value::{ObjectInstance, Value};
use crate::ast::{
    ClassDecl, EnumDecl, Expr, FieldDecl, FunctionDecl, HelperDecl, InterfaceDecl, Node, OperatorDecl, Position,
    RecordDecl, Spanned, Stmt,
};
use crate::types::{
    resolve_type, ClassInfo, EnumType, FieldInfo, HelperMethod, InterfaceInfo, OperatorOverload, PropertyInfo,
    RecordType, Type, TypeRegistry, TypeTable,
};
use crate::util::same_name;
use std::rc::Rc;

/// Root of every class without an explicit parent
const ROOT_CLASS: &str = "TObject";

fn run_method(
    eval: &mut Evaluator,
    decl: Rc<FunctionDecl>,
    receiver: Value,
    args: Vec<Value>,
    pos: Position,
    state: &mut ExecutionState,
) -> InterpResult<Value> {
    let function = UserFunction {
        decl,
        scope: Rc::clone(eval.globals()),
    };
    eval.execute_user_function(&function, args, Some(receiver), pos, state)
}

// ============================================================================
// Method dispatch
// ============================================================================

/// Declaration-aware method dispatch
#[derive(Debug, Default)]
pub struct DeclarationDispatcher;

impl DeclarationDispatcher {
    /// Fresh instance with field initializers applied
    fn instantiate(
        eval: &mut Evaluator,
        class: &Rc<ClassInfo>,
        state: &mut ExecutionState,
    ) -> InterpResult<Rc<ObjectInstance>> {
        let obj = Rc::new(ObjectInstance::new(Rc::clone(class)));
        let mut init_state = state.with_env(Rc::clone(eval.globals()));
        for field in class.all_fields() {
            let Some(init) = &field.init else {
                continue;
            };
            let value = eval.eval_expr(init, &mut init_state)?;
            if init_state.has_exception() {
                break;
            }
            obj.set_field(&field.name, value.deref()?.copy_on_assign());
        }
        Ok(obj)
    }

    fn construct(
        &self,
        eval: &mut Evaluator,
        class: &Rc<ClassInfo>,
        ctor: Option<Rc<FunctionDecl>>,
        args: Vec<Value>,
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        tracing::debug!(class = %class.name, "constructing object");
        let obj = Self::instantiate(eval, class, state)?;
        propagate!(state);
        let receiver = Value::Object(Rc::clone(&obj));

        match ctor {
            Some(decl) => {
                run_method(eval, decl, receiver.clone(), args, pos, state)?;
                propagate!(state);
            }
            None if class.is_descendant_of("Exception") => {
                if args.len() > 1 {
                    return Err(RuntimeError::too_many_arguments(1, args.len()));
                }
                if let Some(message) = args.first() {
                    obj.set_field("Message", Value::string(message.to_string()));
                }
            }
            None if !args.is_empty() => {
                return Err(RuntimeError::too_many_arguments(0, args.len()));
            }
            None => {}
        }
        Ok(receiver)
    }
}

impl MethodDispatcher for DeclarationDispatcher {
    fn call_method(
        &self,
        eval: &mut Evaluator,
        receiver: &Value,
        method: &str,
        args: Vec<Value>,
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        match receiver {
            Value::Object(obj) => {
                if let Some(decl) = obj.class.find_method(method, args.len()) {
                    let is_constructor = decl.flags.constructor;
                    let result = run_method(eval, decl, receiver.clone(), args, pos, state)?;
                    return Ok(if is_constructor { receiver.clone() } else { result });
                }
                if same_name(method, "ClassName") {
                    Ok(Value::string(obj.class.name.clone()))
                } else if same_name(method, "ClassType") {
                    Ok(Value::ClassRef(Rc::clone(&obj.class)))
                } else if same_name(method, "Free") || same_name(method, "Destroy") {
                    Ok(Value::Nil)
                } else {
                    Err(RuntimeError::undefined_method(&obj.class.name, method))
                }
            }

            Value::Interface(iface) => match &iface.object {
                Some(obj) => self.call_method(eval, &Value::Object(Rc::clone(obj)), method, args, pos, state),
                None => Err(RuntimeError::nil_receiver()),
            },

            Value::ClassRef(class) => {
                let decl = class.find_method(method, args.len());
                let is_constructor = decl.as_ref().map_or(same_name(method, "Create"), |d| {
                    d.flags.constructor || (same_name(method, "Create") && !d.flags.class_method)
                });
                if is_constructor {
                    return self.construct(eval, class, decl, args, pos, state);
                }
                match decl {
                    Some(decl) => run_method(eval, decl, receiver.clone(), args, pos, state),
                    None if same_name(method, "ClassName") => Ok(Value::string(class.name.clone())),
                    None => Err(RuntimeError::undefined_method(&class.name, method)),
                }
            }

            Value::Record(rec) => {
                let decl = rec.borrow().ty.find_method(method, args.len());
                match decl {
                    Some(decl) => run_method(eval, decl, receiver.clone(), args, pos, state),
                    None => {
                        let name = rec.borrow().ty.name.clone();
                        Err(RuntimeError::undefined_method(&name, method))
                    }
                }
            }

            other => Err(RuntimeError::undefined_method(&other.type_name(), method)),
        }
    }
}

// ============================================================================
// Declarations and class-aware expressions
// ============================================================================

/// Registers declarations into a shared [`TypeTable`]
pub struct DeclarationEvaluator {
    types: Rc<TypeTable>,
}

impl DeclarationEvaluator {
    pub fn new(types: Rc<TypeTable>) -> Self {
        Self { types }
    }

    /// Field type, with references to the class being declared typed as
    /// Variant until the class exists
    fn field_type(&self, owner: &str, ty: &str) -> InterpResult<Type> {
        match resolve_type(self.types.as_ref(), ty) {
            Ok(resolved) => Ok(resolved),
            Err(_) if same_name(owner, ty) => Ok(Type::Variant),
            Err(e) => Err(e),
        }
    }

    fn field_infos<'d>(
        &self,
        owner: &str,
        fields: impl Iterator<Item = &'d FieldDecl>,
    ) -> InterpResult<Vec<FieldInfo>> {
        fields
            .map(|f| {
                Ok(FieldInfo {
                    name: f.name.clone(),
                    ty: self.field_type(owner, &f.ty)?,
                    init: f.init.clone(),
                })
            })
            .collect()
    }

    fn declare_class(
        &self,
        eval: &mut Evaluator,
        decl: &ClassDecl,
        state: &mut ExecutionState,
    ) -> InterpResult<()> {
        let parent_name = decl.parent.as_deref().unwrap_or(ROOT_CLASS);
        let parent = if same_name(&decl.name, ROOT_CLASS) {
            None
        } else {
            Some(
                self.types
                    .lookup_class(parent_name)
                    .ok_or_else(|| RuntimeError::unknown_type(parent_name))?,
            )
        };

        let mut class = ClassInfo::new(decl.name.clone(), parent);
        for field in self.field_infos(&decl.name, decl.fields.iter().filter(|f| !f.class_var))? {
            class = class.with_field(field);
        }
        for iface in &decl.interfaces {
            if !self.types.has_interface(iface) {
                return Err(RuntimeError::unknown_type(iface));
            }
            class = class.with_interface(iface.clone());
        }
        for prop in &decl.properties {
            class = class.with_property(PropertyInfo {
                name: prop.name.clone(),
                read: prop.read.clone(),
                write: prop.write.clone(),
            });
        }
        let class = self.types.register_class(class);

        let mut init_state = state.with_env(Rc::clone(eval.globals()));
        for var in decl.fields.iter().filter(|f| f.class_var) {
            let value = match &var.init {
                Some(init) => {
                    let value = eval.eval_expr(init, &mut init_state)?;
                    propagate!(init_state, ());
                    value.deref()?
                }
                None => crate::types::default_value(&self.field_type(&decl.name, &var.ty)?),
            };
            class.define_class_var(&var.name, value);
        }

        for method in &decl.methods {
            let mut method = method.clone();
            method.class_name = Some(decl.name.clone());
            class.add_method(Rc::new(method));
        }
        tracing::debug!(class = %decl.name, parent = parent_name, "class declared");
        Ok(())
    }

    fn declare_record(&self, decl: &RecordDecl) -> InterpResult<()> {
        let fields = self.field_infos(&decl.name, decl.fields.iter())?;
        let record = self.types.register_record(RecordType::new(decl.name.clone(), fields));
        for method in &decl.methods {
            let mut method = method.clone();
            method.class_name = Some(decl.name.clone());
            record.add_method(Rc::new(method));
        }
        tracing::debug!(record = %decl.name, "record declared");
        Ok(())
    }

    fn declare_enum(&self, decl: &EnumDecl) {
        let mut next = 0;
        let members = decl
            .members
            .iter()
            .map(|m| {
                let ordinal = m.value.unwrap_or(next);
                next = ordinal + 1;
                (m.name.clone(), ordinal)
            })
            .collect();
        self.types
            .register_enum(EnumType::new(decl.name.clone(), members, decl.scoped));
    }

    fn declare_interface(&self, decl: &InterfaceDecl) -> InterpResult<()> {
        let parent = match &decl.parent {
            Some(name) => Some(
                self.types
                    .lookup_interface(name)
                    .ok_or_else(|| RuntimeError::unknown_type(name))?,
            ),
            None => None,
        };
        let mut iface = InterfaceInfo::new(decl.name.clone(), parent);
        iface.methods = decl.methods.clone();
        self.types.register_interface(iface);
        Ok(())
    }

    fn declare_helper(&self, decl: &HelperDecl) {
        let target = resolve_type(self.types.as_ref(), &decl.target)
            .map(|t| t.to_string())
            .unwrap_or_else(|_| decl.target.clone());
        for method in &decl.methods {
            self.types
                .register_helper(&target, &method.name, HelperMethod::User(Rc::new(method.clone())));
        }
        tracing::debug!(helper = %decl.name, target = %target, "helper declared");
    }

    fn declare_operator(&self, decl: &OperatorDecl) -> InterpResult<()> {
        let [left, right] = decl.operands.as_slice() else {
            return Err(RuntimeError::invalid_operation(format!(
                "operator {} needs two operand types, got {}",
                decl.op,
                decl.operands.len()
            )));
        };
        let type_name = |name: &str| {
            resolve_type(self.types.as_ref(), name)
                .map(|t| t.to_string())
                .unwrap_or_else(|_| name.to_string())
        };
        self.types.register_operator(OperatorOverload {
            op: decl.op,
            left: type_name(left),
            right: type_name(right),
            function: decl.uses.clone(),
        });
        Ok(())
    }

    /// Out-of-line method body `TFoo.Bar`
    fn declare_method_body(&self, decl: &FunctionDecl) -> InterpResult<()> {
        let owner = decl.class_name.as_deref().unwrap_or_default();
        if let Some(class) = self.types.lookup_class(owner) {
            class.add_method(Rc::new(decl.clone()));
        } else if let Some(record) = self.types.lookup_record(owner) {
            record.add_method(Rc::new(decl.clone()));
        } else {
            return Err(RuntimeError::unknown_type(owner));
        }
        Ok(())
    }

    fn exec_declaration(
        &self,
        eval: &mut Evaluator,
        stmt: &Spanned<Stmt>,
        state: &mut ExecutionState,
    ) -> InterpResult<()> {
        match &stmt.node {
            Stmt::Class(decl) => self.declare_class(eval, decl, state),
            Stmt::Record(decl) => self.declare_record(decl),
            Stmt::Enum(decl) => {
                self.declare_enum(decl);
                Ok(())
            }
            Stmt::Interface(decl) => self.declare_interface(decl),
            Stmt::Helper(decl) => {
                self.declare_helper(decl);
                Ok(())
            }
            Stmt::Operator(decl) => self.declare_operator(decl),
            Stmt::Function(decl) if decl.class_name.is_some() => self.declare_method_body(decl),
            Stmt::Function(decl) => {
                eval.register_function(Rc::new(decl.clone()), Rc::clone(state.env()));
                Ok(())
            }
            _ => Err(RuntimeError::internal("statement is not a declaration")),
        }
    }

    // --- class-aware expressions ---

    /// The object behind an object or interface value
    fn object_of(value: &Value) -> Option<Rc<ObjectInstance>> {
        match value {
            Value::Object(obj) => Some(Rc::clone(obj)),
            Value::Interface(iface) => iface.object.clone(),
            _ => None,
        }
    }

    fn eval_operand(
        eval: &mut Evaluator,
        expr: &Spanned<Expr>,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        let value = eval.eval_expr(expr, state)?;
        Ok(value.deref()?.unvariant())
    }

    fn eval_is(
        &self,
        eval: &mut Evaluator,
        expr: &Spanned<Expr>,
        type_name: &str,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        let value = Self::eval_operand(eval, expr, state)?;
        propagate!(state);
        if !self.types.has_class(type_name) && !self.types.has_interface(type_name) {
            return Err(RuntimeError::unknown_type(type_name));
        }
        let matches = match (&value, Self::object_of(&value)) {
            (_, Some(obj)) => obj.class.is_descendant_of(type_name) || obj.class.implements(type_name),
            (Value::ClassRef(class), None) => class.is_descendant_of(type_name),
            _ => false,
        };
        Ok(Value::Bool(matches))
    }

    fn eval_as(
        &self,
        eval: &mut Evaluator,
        expr: &Spanned<Expr>,
        type_name: &str,
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        let value = Self::eval_operand(eval, expr, state)?;
        propagate!(state);
        if value.is_nil() {
            return Ok(Value::Nil);
        }
        let Some(obj) = Self::object_of(&value) else {
            return Err(RuntimeError::type_mismatch("object", &value.type_name()));
        };

        if let Some(iface) = self.types.lookup_interface(type_name) {
            if obj.class.implements(&iface.name) {
                return Ok(Value::interface(iface, Some(obj)));
            }
        } else if self.types.has_class(type_name) {
            if obj.class.is_descendant_of(type_name) {
                return Ok(Value::Object(obj));
            }
        } else {
            return Err(RuntimeError::unknown_type(type_name));
        }

        let message = format!(
            "Cannot cast instance of type \"{}\" to \"{type_name}\"",
            obj.class.name
        );
        eval.raise_exception(state, "EInvalidCast", &message, pos);
        Ok(Value::Nil)
    }

    fn eval_implements(
        &self,
        eval: &mut Evaluator,
        expr: &Spanned<Expr>,
        interface: &str,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        let value = Self::eval_operand(eval, expr, state)?;
        propagate!(state);
        if !self.types.has_interface(interface) {
            return Err(RuntimeError::unknown_type(interface));
        }
        let implements = match (&value, Self::object_of(&value)) {
            (_, Some(obj)) => obj.class.implements(interface),
            (Value::ClassRef(class), None) => class.implements(interface),
            _ => false,
        };
        Ok(Value::Bool(implements))
    }

    /// `inherited [Method(args)]` inside a method body
    fn eval_inherited(
        &self,
        eval: &mut Evaluator,
        method: Option<&str>,
        args: &[Spanned<Expr>],
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        let frame = state
            .current_frame()
            .ok_or_else(|| RuntimeError::invalid_operation("inherited used outside a method"))?;
        let Some((class_name, current)) = frame.function.split_once('.') else {
            return Err(RuntimeError::invalid_operation("inherited used outside a method"));
        };
        let class = self
            .types
            .lookup_class(class_name)
            .ok_or_else(|| RuntimeError::unknown_type(class_name))?;
        let receiver = state
            .env()
            .borrow()
            .get("Self")
            .ok_or_else(|| RuntimeError::invalid_operation("inherited used outside a method"))?;
        let name = method.unwrap_or(current);

        // a bare `inherited` forwards the current method's parameters
        let values = match method {
            Some(_) => {
                let values = eval.eval_args(args, state)?;
                propagate!(state);
                values
            }
            None => {
                let current_decl = class.find_method(current, 0);
                let env = state.env().borrow();
                current_decl
                    .map(|d| {
                        d.params
                            .iter()
                            .filter_map(|p| env.get(&p.name))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default()
            }
        };

        let parent_method = class
            .parent
            .as_ref()
            .and_then(|parent| parent.find_method(name, values.len()));
        match parent_method {
            Some(decl) => {
                let values = values
                    .into_iter()
                    .map(|v| v.deref())
                    .collect::<InterpResult<Vec<_>>>()?;
                run_method(eval, decl, receiver, values, pos, state)
            }
            // TObject.Create and friends have no body
            None if same_name(name, "Create") || same_name(name, "Destroy") => Ok(receiver),
            None => {
                let parent = class.parent.as_ref().map_or(ROOT_CLASS, |p| p.name.as_str());
                Err(RuntimeError::undefined_method(parent, name))
            }
        }
    }

    fn eval_new(
        &self,
        eval: &mut Evaluator,
        class_name: &str,
        args: &[Spanned<Expr>],
        pos: Position,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        let class = self
            .types
            .lookup_class(class_name)
            .ok_or_else(|| RuntimeError::unknown_type(class_name))?;
        let values = eval.eval_args(args, state)?;
        propagate!(state);
        eval.call_method(&Value::ClassRef(class), "Create", values, pos, state)
    }
}

impl NodeEvaluator for DeclarationEvaluator {
    fn eval_node(
        &self,
        eval: &mut Evaluator,
        node: Node<'_>,
        state: &mut ExecutionState,
    ) -> InterpResult<Value> {
        match node {
            Node::Stmt(stmt) => {
                self.exec_declaration(eval, stmt, state)?;
                Ok(Value::Nil)
            }
            Node::Expr(expr) => match &expr.node {
                Expr::Is { expr: inner, type_name } => self.eval_is(eval, inner, type_name, state),
                Expr::As { expr: inner, type_name } => self.eval_as(eval, inner, type_name, expr.pos, state),
                Expr::Implements { expr: inner, interface } => {
                    self.eval_implements(eval, inner, interface, state)
                }
                Expr::Inherited { method, args } => {
                    self.eval_inherited(eval, method.as_deref(), args, expr.pos, state)
                }
                Expr::New { class_name, args } => self.eval_new(eval, class_name, args, expr.pos, state),
                other => Err(RuntimeError::internal(format!("no general evaluation for {other}"))),
            },
            Node::Program(_) => Err(RuntimeError::internal("programs are evaluated natively")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::{BinOp, EnumMember, Program, PropertyDecl};
    use crate::interp::Interpreter;
    use pretty_assertions::assert_eq;

    fn run(stmts: Vec<Spanned<Stmt>>) -> Interpreter {
        let mut interp = Interpreter::with_captured_output();
        interp.run(&Program::new(stmts)).unwrap();
        interp
    }

    fn class(decl: ClassDecl) -> Spanned<Stmt> {
        stmt(Stmt::Class(decl))
    }

    fn animals() -> Vec<Spanned<Stmt>> {
        vec![
            class(class_decl(
                "TAnimal",
                None,
                vec![field("Name", "String")],
                vec![
                    function("Create", vec![param("n", "String")], None)
                        .constructor()
                        .body(vec![assign(ident("Name"), ident("n"))])
                        .build(),
                    function("Speak", vec![], Some("String"))
                        .virtual_method()
                        .body(vec![assign(ident("Result"), string("..."))])
                        .build(),
                ],
            )),
            class(class_decl(
                "TDog",
                Some("TAnimal"),
                vec![],
                vec![function("Speak", vec![], Some("String"))
                    .body(vec![assign(
                        ident("Result"),
                        binary(
                            binary(ident("Name"), BinOp::Add, string(": woof after ")),
                            BinOp::Add,
                            inherited(Some("Speak"), vec![]),
                        ),
                    )])
                    .build()],
            )),
        ]
    }

    // --- dispatch ---

    #[test]
    fn test_constructor_and_virtual_dispatch() {
        let mut program = animals();
        program.push(var_decl(
            "a",
            Some("TAnimal"),
            Some(method_call(ident("TDog"), "Create", vec![string("Rex")])),
        ));
        program.push(println(vec![method_call(ident("a"), "Speak", vec![])]));
        program.push(println(vec![method_call(ident("a"), "ClassName", vec![])]));
        let interp = run(program);
        assert_eq!(interp.output(), "Rex: woof after ...\nTDog\n");
    }

    #[test]
    fn test_new_expression() {
        let mut program = animals();
        program.push(var_decl("d", None, Some(new_object("TDog", vec![string("Fido")]))));
        let interp = run(program);
        let Some(Value::Object(obj)) = interp.global("d") else {
            panic!("expected an object");
        };
        assert_eq!(obj.field("Name"), Some(Value::string("Fido")));
    }

    #[test]
    fn test_default_constructor_rejects_arguments() {
        let mut interp = Interpreter::with_captured_output();
        let err = interp
            .run(&Program::new(vec![
                class(class_decl("TPlain", None, vec![], vec![])),
                var_decl("p", None, Some(method_call(ident("TPlain"), "Create", vec![int(1)]))),
            ]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Runtime error: wrong number of arguments: expected at most 0, got 1"
        );
    }

    #[test]
    fn test_field_initializers_and_class_vars() {
        let mut counter = field("Count", "Integer");
        counter.class_var = true;
        counter.init = Some(int(10));
        let mut size = field("Size", "Integer");
        size.init = Some(binary(int(2), BinOp::Mul, int(3)));
        let interp = run(vec![
            class(class_decl("TThing", None, vec![size, counter], vec![])),
            var_decl("t", None, Some(method_call(ident("TThing"), "Create", vec![]))),
            var_decl("s", None, Some(member(ident("t"), "Size"))),
            assign(member(ident("TThing"), "Count"), int(11)),
            var_decl("c", None, Some(member(ident("t"), "Count"))),
        ]);
        assert_eq!(interp.global("s"), Some(Value::Int(6)));
        assert_eq!(interp.global("c"), Some(Value::Int(11)));
    }

    #[test]
    fn test_class_method_on_class_reference() {
        let interp = run(vec![
            class(class_decl(
                "TMath",
                None,
                vec![],
                vec![function("Twice", vec![param("x", "Integer")], Some("Integer"))
                    .class_method()
                    .body(vec![assign(ident("Result"), binary(ident("x"), BinOp::Mul, int(2)))])
                    .build()],
            )),
            var_decl("r", None, Some(method_call(ident("TMath"), "Twice", vec![int(8)]))),
        ]);
        assert_eq!(interp.global("r"), Some(Value::Int(16)));
    }

    #[test]
    fn test_record_methods_and_self_fields() {
        let record = RecordDecl {
            name: "TPoint".into(),
            fields: vec![field("X", "Integer"), field("Y", "Integer")],
            methods: vec![function("Sum", vec![], Some("Integer"))
                .body(vec![assign(ident("Result"), binary(ident("X"), BinOp::Add, ident("Y")))])
                .build()],
        };
        let interp = run(vec![
            stmt(Stmt::Record(record)),
            var_decl("p", Some("TPoint"), None),
            assign(member(ident("p"), "X"), int(3)),
            assign(member(ident("p"), "Y"), int(4)),
            var_decl("q", None, Some(ident("p"))),
            assign(member(ident("q"), "X"), int(100)),
            var_decl("r", None, Some(method_call(ident("p"), "Sum", vec![]))),
        ]);
        // records copy on assignment
        assert_eq!(interp.global("r"), Some(Value::Int(7)));
    }

    #[test]
    fn test_out_of_line_method_body() {
        let forward = function("Hello", vec![], Some("String")).build();
        let body = function("Hello", vec![], Some("String"))
            .method_of("TGreeter")
            .body(vec![assign(ident("Result"), string("hi"))])
            .stmt();
        let interp = run(vec![
            class(class_decl("TGreeter", None, vec![], vec![forward])),
            body,
            var_decl("g", None, Some(method_call(ident("TGreeter"), "Create", vec![]))),
            var_decl("r", None, Some(method_call(ident("g"), "Hello", vec![]))),
        ]);
        assert_eq!(interp.global("r"), Some(Value::string("hi")));
    }

    #[test]
    fn test_property_declared_on_class() {
        let mut decl = class_decl(
            "TCounter",
            None,
            vec![field("FCount", "Integer")],
            vec![function("SetCount", vec![param("v", "Integer")], None)
                .body(vec![assign(ident("FCount"), binary(ident("v"), BinOp::Mul, int(10)))])
                .build()],
        );
        decl.properties.push(PropertyDecl {
            name: "Count".into(),
            ty: "Integer".into(),
            read: Some("FCount".into()),
            write: Some("SetCount".into()),
        });
        let interp = run(vec![
            class(decl),
            var_decl("c", None, Some(method_call(ident("TCounter"), "Create", vec![]))),
            assign(member(ident("c"), "Count"), int(4)),
            compound_assign(member(ident("c"), "Count"), crate::ast::AssignOp::AddAssign, int(1)),
            var_decl("n", None, Some(member(ident("c"), "Count"))),
        ]);
        assert_eq!(interp.global("n"), Some(Value::Int(410)));
    }

    // --- type tests ---

    #[test]
    fn test_is_and_as() {
        let mut program = animals();
        program.push(var_decl("d", None, Some(new_object("TDog", vec![string("Rex")]))));
        program.push(var_decl("isAnimal", None, Some(is_expr(ident("d"), "TAnimal"))));
        program.push(var_decl("isExc", None, Some(is_expr(ident("d"), "Exception"))));
        program.push(var_decl("a", None, Some(as_expr(ident("d"), "TAnimal"))));
        let interp = run(program);
        assert_eq!(interp.global("isAnimal"), Some(Value::Bool(true)));
        assert_eq!(interp.global("isExc"), Some(Value::Bool(false)));
        assert_eq!(interp.global("a"), interp.global("d"));
    }

    #[test]
    fn test_failed_cast_raises_invalid_cast() {
        let mut program = animals();
        program.push(var_decl("x", None, Some(new_object("TAnimal", vec![string("Cat")]))));
        program.push(try_except(
            vec![expr_stmt(as_expr(ident("x"), "TDog"))],
            vec![on(Some("E"), "EInvalidCast", println(vec![member(ident("E"), "Message")]))],
            None,
        ));
        let interp = run(program);
        assert_eq!(interp.output(), "Cannot cast instance of type \"TAnimal\" to \"TDog\"\n");
    }

    #[test]
    fn test_interfaces() {
        let iface = InterfaceDecl {
            name: "IShape".into(),
            parent: None,
            methods: vec!["Area".into()],
        };
        let mut square = class_decl(
            "TSquare",
            None,
            vec![],
            vec![function("Area", vec![], Some("Integer"))
                .body(vec![assign(ident("Result"), int(16))])
                .build()],
        );
        square.interfaces.push("IShape".into());
        let interp = run(vec![
            stmt(Stmt::Interface(iface)),
            class(square),
            var_decl("s", None, Some(new_object("TSquare", vec![]))),
            var_decl("yes", None, Some(expr(Expr::Implements {
                expr: Box::new(ident("s")),
                interface: "IShape".into(),
            }))),
            var_decl("i", Some("IShape"), Some(ident("s"))),
            var_decl("area", None, Some(method_call(ident("i"), "Area", vec![]))),
        ]);
        assert_eq!(interp.global("yes"), Some(Value::Bool(true)));
        assert_eq!(interp.global("area"), Some(Value::Int(16)));
    }

    // --- other declarations ---

    #[test]
    fn test_enum_explicit_ordinals() {
        let decl = EnumDecl {
            name: "TLevel".into(),
            members: vec![
                EnumMember { name: "Calm".into(), value: Some(1) },
                EnumMember { name: "Mid".into(), value: None },
                EnumMember { name: "Top".into(), value: Some(10) },
            ],
            scoped: false,
        };
        let interp = run(vec![
            stmt(Stmt::Enum(decl)),
            var_decl("m", None, Some(call("Ord", vec![ident("Mid")]))),
            var_decl("t", None, Some(call("Ord", vec![ident("Top")]))),
        ]);
        assert_eq!(interp.global("m"), Some(Value::Int(2)));
        assert_eq!(interp.global("t"), Some(Value::Int(10)));
    }

    #[test]
    fn test_helper_declaration() {
        let helper = HelperDecl {
            name: "TIntHelper".into(),
            target: "Integer".into(),
            methods: vec![function("Squared", vec![], Some("Integer"))
                .body(vec![assign(ident("Result"), binary(self_ref(), BinOp::Mul, self_ref()))])
                .build()],
        };
        let interp = run(vec![
            stmt(Stmt::Helper(helper)),
            var_decl("n", None, Some(int(7))),
            var_decl("r", None, Some(method_call(ident("n"), "Squared", vec![]))),
        ]);
        assert_eq!(interp.global("r"), Some(Value::Int(49)));
    }

    #[test]
    fn test_operator_overload() {
        let record = RecordDecl {
            name: "TVec".into(),
            fields: vec![field("X", "Integer")],
            methods: vec![],
        };
        let add = function("AddVecs", vec![param("a", "TVec"), param("b", "TVec")], Some("TVec"))
            .body(vec![assign(
                member(ident("Result"), "X"),
                binary(member(ident("a"), "X"), BinOp::Add, member(ident("b"), "X")),
            )])
            .stmt();
        let interp = run(vec![
            stmt(Stmt::Record(record)),
            add,
            stmt(Stmt::Operator(OperatorDecl {
                op: BinOp::Add,
                operands: vec!["TVec".into(), "TVec".into()],
                return_type: Some("TVec".into()),
                uses: "AddVecs".into(),
            })),
            var_decl("u", None, Some(record_lit(Some("TVec"), vec![("X", int(2))]))),
            var_decl("v", None, Some(record_lit(Some("TVec"), vec![("X", int(5))]))),
            var_decl("w", None, Some(binary(ident("u"), BinOp::Add, ident("v")))),
        ]);
        let w = interp.global("w").unwrap();
        assert_eq!(w.to_string(), "(X: 7)");
    }

    #[test]
    fn test_unknown_parent_class() {
        let mut interp = Interpreter::with_captured_output();
        let err = interp
            .run(&Program::new(vec![class(class_decl("TOrphan", Some("TMissing"), vec![], vec![]))]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Runtime error: unknown type: TMissing");
    }
}
