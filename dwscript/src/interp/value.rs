//! Runtime values for the interpreter

use super::env::EnvRef;
use super::error::{InterpResult, RuntimeError};
use crate::ast::{Expr, FunctionDecl, Spanned};
use crate::types::{
    default_value, ArrayType, ClassInfo, EnumType, FieldInfo, InterfaceInfo, RecordType, Type,
};
use crate::util::normalize;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

pub type ArrayRef = Rc<RefCell<ArrayValue>>;
pub type RecordRef = Rc<RefCell<RecordValue>>;
pub type ObjectRef = Rc<ObjectInstance>;
pub type SetRef = Rc<RefCell<SetValue>>;

/// Runtime value
#[derive(Debug, Clone)]
pub enum Value {
    /// 64-bit integer
    Int(i64),
    /// 64-bit floating point
    Float(f64),
    /// Immutable string (characters, not bytes)
    Str(Rc<String>),
    Bool(bool),
    Enum(EnumValue),
    Array(ArrayRef),
    Record(RecordRef),
    Object(ObjectRef),
    Interface(Rc<InterfaceInstance>),
    /// Class reference (`TFoo` used as a value, metaclass)
    ClassRef(Rc<ClassInfo>),
    Set(SetRef),
    /// Function pointer, method pointer or lambda
    Function(Callable),
    /// Alias of a caller's slot (var parameter)
    Reference(Reference),
    /// Boxed value of a Variant-typed slot
    Variant(Box<Value>),
    /// A type used as a value (`TColor.Low`)
    TypeMeta(Type),
    /// Deferred argument of a lazy parameter
    Lazy(Rc<LazyThunk>),
    Nil,
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::Str(Rc::new(s.into()))
    }

    pub fn enum_value(ty: Rc<EnumType>, ordinal: i64) -> Value {
        Value::Enum(EnumValue { ty, ordinal })
    }

    pub fn array(ty: Rc<ArrayType>, elements: Vec<Value>) -> Value {
        Value::Array(ArrayValue::new(ty, elements).into_ref())
    }

    pub fn object(class: Rc<ClassInfo>) -> Value {
        Value::Object(Rc::new(ObjectInstance::new(class)))
    }

    pub fn interface(interface: Rc<InterfaceInfo>, object: Option<ObjectRef>) -> Value {
        Value::Interface(Rc::new(InterfaceInstance { interface, object }))
    }

    /// Get type name for error messages
    pub fn type_name(&self) -> String {
        match self {
            Value::Int(_) => "Integer".to_string(),
            Value::Float(_) => "Float".to_string(),
            Value::Str(_) => "String".to_string(),
            Value::Bool(_) => "Boolean".to_string(),
            Value::Enum(e) => e.ty.name.clone(),
            Value::Array(a) => a.borrow().ty.to_string(),
            Value::Record(r) => r.borrow().ty.name.clone(),
            Value::Object(o) => o.class.name.clone(),
            Value::Interface(i) => i.interface.name.clone(),
            Value::ClassRef(c) => format!("class of {}", c.name),
            Value::Set(s) => format!("set of {}", s.borrow().element),
            Value::Function(_) => "function pointer".to_string(),
            Value::Reference(_) => "reference".to_string(),
            Value::Variant(_) => "Variant".to_string(),
            Value::TypeMeta(t) => format!("type {t}"),
            Value::Lazy(_) => "lazy expression".to_string(),
            Value::Nil => "nil".to_string(),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Variant(inner) => inner.as_int(),
            _ => None,
        }
    }

    /// Integers widen to float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Int(n) => Some(*n as f64),
            Value::Variant(inner) => inner.as_float(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Variant(inner) => inner.as_bool(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            Value::Variant(inner) => inner.as_str(),
            _ => None,
        }
    }

    pub fn expect_int(&self, what: &str) -> InterpResult<i64> {
        self.as_int()
            .ok_or_else(|| RuntimeError::type_mismatch(&format!("Integer for {what}"), &self.type_name()))
    }

    pub fn expect_float(&self, what: &str) -> InterpResult<f64> {
        self.as_float()
            .ok_or_else(|| RuntimeError::type_mismatch(&format!("Float for {what}"), &self.type_name()))
    }

    pub fn expect_bool(&self, what: &str) -> InterpResult<bool> {
        self.as_bool()
            .ok_or_else(|| RuntimeError::type_mismatch(&format!("Boolean for {what}"), &self.type_name()))
    }

    pub fn expect_str(&self, what: &str) -> InterpResult<&str> {
        self.as_str()
            .ok_or_else(|| RuntimeError::type_mismatch(&format!("String for {what}"), &self.type_name()))
    }

    /// Strip a Variant box
    pub fn unvariant(self) -> Value {
        match self {
            Value::Variant(inner) => inner.unvariant(),
            other => other,
        }
    }

    /// Follow a Reference to the value in its slot; other values are returned as is
    pub fn deref(&self) -> InterpResult<Value> {
        match self {
            Value::Reference(r) => r.deref(),
            other => Ok(other.clone()),
        }
    }

    /// Ordinal of an ordinal-kind value
    pub fn ordinal(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Enum(e) => Some(e.ordinal),
            Value::Str(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(i64::from(u32::from(c))),
                    _ => None,
                }
            }
            Value::Variant(inner) => inner.ordinal(),
            _ => None,
        }
    }

    /// Next declared member of an enum value
    pub fn enum_succ(&self) -> Option<Value> {
        match self {
            Value::Enum(e) => e
                .ty
                .succ(e.ordinal)
                .map(|ord| Value::enum_value(Rc::clone(&e.ty), ord)),
            _ => None,
        }
    }

    /// Previous declared member of an enum value
    pub fn enum_pred(&self) -> Option<Value> {
        match self {
            Value::Enum(e) => e
                .ty
                .pred(e.ordinal)
                .map(|ord| Value::enum_value(Rc::clone(&e.ty), ord)),
            _ => None,
        }
    }

    /// Field-read capability of objects, records and interface-wrapped objects
    pub fn field(&self, name: &str) -> Option<Value> {
        match self {
            Value::Object(obj) => obj.field(name),
            Value::Record(rec) => rec.borrow().field(name),
            Value::Interface(i) => i.object.as_ref().and_then(|o| o.field(name)),
            _ => None,
        }
    }

    /// Field-write capability; None when the value has no such field
    pub fn set_field(&self, name: &str, value: Value) -> Option<()> {
        match self {
            Value::Object(obj) => obj.set_field(name, value).then_some(()),
            Value::Record(rec) => rec.borrow_mut().set_field(name, value).then_some(()),
            Value::Interface(i) => i
                .object
                .as_ref()
                .and_then(|o| o.set_field(name, value).then_some(())),
            _ => None,
        }
    }

    /// Class-variable read on objects and class references
    pub fn class_var(&self, name: &str) -> Option<Value> {
        match self {
            Value::Object(obj) => obj.class.class_var(name),
            Value::ClassRef(class) => class.class_var(name),
            _ => None,
        }
    }

    /// Add an element to a set value
    pub fn set_include(&self, element: &Value) -> InterpResult<()> {
        match self {
            Value::Set(set) => set.borrow_mut().include(element),
            other => Err(RuntimeError::type_mismatch("set", &other.type_name())),
        }
    }

    /// Remove an element from a set value
    pub fn set_exclude(&self, element: &Value) -> InterpResult<()> {
        match self {
            Value::Set(set) => set.borrow_mut().exclude(element),
            other => Err(RuntimeError::type_mismatch("set", &other.type_name())),
        }
    }

    /// Copy value-semantics storage so the new slot does not alias the old one.
    ///
    /// Records, static arrays and sets are values in the language; dynamic
    /// arrays, objects and strings keep reference semantics.
    pub fn copy_on_assign(&self) -> Value {
        match self {
            Value::Record(rec) => Value::Record(rec.borrow().deep_copy().into_ref()),
            Value::Array(arr) if arr.borrow().ty.is_static() => {
                Value::Array(arr.borrow().deep_copy().into_ref())
            }
            Value::Set(set) => Value::Set(Rc::new(RefCell::new(set.borrow().clone()))),
            Value::Variant(inner) => Value::Variant(Box::new(inner.copy_on_assign())),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Enum(e) => write!(f, "{e}"),
            Value::Array(a) => {
                let arr = a.borrow();
                write!(f, "[")?;
                for (i, v) in arr.elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Record(r) => write!(f, "{}", r.borrow()),
            Value::Object(o) => write!(f, "{}", o.class.name),
            Value::Interface(i) => write!(f, "{}", i.interface.name),
            Value::ClassRef(c) => write!(f, "{}", c.name),
            Value::Set(s) => write!(f, "{}", s.borrow()),
            Value::Function(c) => write!(f, "{c:?}"),
            Value::Reference(r) => match r.deref() {
                Ok(v) => write!(f, "{v}"),
                Err(_) => write!(f, "<reference>"),
            },
            Value::Variant(inner) => write!(f, "{inner}"),
            Value::TypeMeta(t) => write!(f, "{t}"),
            Value::Lazy(_) => write!(f, "<lazy>"),
            Value::Nil => write!(f, "nil"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                Rc::ptr_eq(a, b) || a.borrow().elements == b.borrow().elements
            }
            (Value::Record(a), Value::Record(b)) => {
                Rc::ptr_eq(a, b) || a.borrow().fields == b.borrow().fields
            }
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Interface(a), Value::Interface(b)) => match (&a.object, &b.object) {
                (Some(x), Some(y)) => Rc::ptr_eq(x, y),
                (None, None) => true,
                _ => false,
            },
            (Value::ClassRef(a), Value::ClassRef(b)) => Rc::ptr_eq(a, b),
            (Value::Set(a), Value::Set(b)) => a.borrow().items == b.borrow().items,
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::Variant(a), Value::Variant(b)) => a == b,
            (Value::TypeMeta(a), Value::TypeMeta(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            _ => false,
        }
    }
}

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone)]
pub struct EnumValue {
    pub ty: Rc<EnumType>,
    pub ordinal: i64,
}

impl EnumValue {
    /// Declared member name, or `TEnum(n)` for an undeclared ordinal
    pub fn name(&self) -> String {
        match self.ty.name_of(self.ordinal) {
            Some(name) => name.to_string(),
            None => format!("{}({})", self.ty.name, self.ordinal),
        }
    }
}

impl PartialEq for EnumValue {
    fn eq(&self, other: &Self) -> bool {
        self.ordinal == other.ordinal && crate::util::same_name(&self.ty.name, &other.ty.name)
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

// ============================================================================
// Arrays
// ============================================================================

#[derive(Debug, Clone)]
pub struct ArrayValue {
    pub ty: Rc<ArrayType>,
    pub elements: Vec<Value>,
}

impl ArrayValue {
    pub fn new(ty: Rc<ArrayType>, elements: Vec<Value>) -> Self {
        Self { ty, elements }
    }

    pub fn into_ref(self) -> ArrayRef {
        Rc::new(RefCell::new(self))
    }

    /// Logical index of the first element
    pub fn low(&self) -> i64 {
        self.ty.low()
    }

    /// Logical index of the last element (`low - 1` when empty)
    pub fn high(&self) -> i64 {
        match self.ty.bounds {
            Some((_, high)) => high,
            None => self.elements.len() as i64 - 1,
        }
    }

    /// Map a logical index to a slot in `elements`.
    ///
    /// Static arrays subtract their declared low bound; dynamic arrays are
    /// zero-based.
    pub fn physical_index(&self, logical: i64) -> InterpResult<usize> {
        let low = self.low();
        let high = self.high();
        if logical < low || logical > high {
            return Err(RuntimeError::index_out_of_bounds(logical, low, high));
        }
        let physical = usize::try_from(logical - low)
            .map_err(|_| RuntimeError::index_out_of_bounds(logical, low, high))?;
        if physical >= self.elements.len() {
            return Err(RuntimeError::index_out_of_bounds(logical, low, high));
        }
        Ok(physical)
    }

    pub fn get(&self, logical: i64) -> InterpResult<Value> {
        let idx = self.physical_index(logical)?;
        Ok(self.elements[idx].clone())
    }

    pub fn deep_copy(&self) -> ArrayValue {
        ArrayValue {
            ty: Rc::clone(&self.ty),
            elements: self.elements.iter().map(Value::copy_on_assign).collect(),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordValue {
    pub ty: Rc<RecordType>,
    /// Keyed by normalized field name
    pub fields: HashMap<String, Value>,
}

impl RecordValue {
    pub fn new(ty: Rc<RecordType>, fields: HashMap<String, Value>) -> Self {
        Self { ty, fields }
    }

    /// Every declared field at its type's zero value
    pub fn with_defaults(ty: Rc<RecordType>) -> Self {
        let fields = ty
            .fields
            .iter()
            .map(|f| (normalize(&f.name), default_value(&f.ty)))
            .collect();
        Self { ty, fields }
    }

    pub fn into_ref(self) -> RecordRef {
        Rc::new(RefCell::new(self))
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields.get(&normalize(name)).cloned()
    }

    pub fn set_field(&mut self, name: &str, value: Value) -> bool {
        match self.fields.get_mut(&normalize(name)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn deep_copy(&self) -> RecordValue {
        RecordValue {
            ty: Rc::clone(&self.ty),
            fields: self
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.copy_on_assign()))
                .collect(),
        }
    }
}

impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, field) in self.ty.fields.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            let value = self.field(&field.name).unwrap_or(Value::Nil);
            write!(f, "{}: {value}", field.name)?;
        }
        write!(f, ")")
    }
}

// ============================================================================
// Objects and interfaces
// ============================================================================

/// Heap object; identity is the `Rc` pointer
pub struct ObjectInstance {
    pub class: Rc<ClassInfo>,
    fields: RefCell<HashMap<String, Value>>,
}

impl ObjectInstance {
    /// Instance with every field (inherited ones included) at its zero value
    pub fn new(class: Rc<ClassInfo>) -> Self {
        let fields = class
            .all_fields()
            .iter()
            .map(|f: &FieldInfo| (normalize(&f.name), default_value(&f.ty)))
            .collect();
        Self {
            class,
            fields: RefCell::new(fields),
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.borrow().contains_key(&normalize(name))
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(&normalize(name)).cloned()
    }

    pub fn set_field(&self, name: &str, value: Value) -> bool {
        match self.fields.borrow_mut().get_mut(&normalize(name)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

// Objects may point back at themselves through fields.
impl fmt::Debug for ObjectInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.fields.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("ObjectInstance")
            .field("class", &self.class.name)
            .field("fields", &names)
            .finish()
    }
}

#[derive(Debug)]
pub struct InterfaceInstance {
    pub interface: Rc<InterfaceInfo>,
    /// Implementing object; None for a nil interface reference
    pub object: Option<ObjectRef>,
}

// ============================================================================
// Sets
// ============================================================================

#[derive(Debug, Clone)]
pub struct SetValue {
    pub element: Type,
    pub items: BTreeSet<i64>,
}

impl SetValue {
    pub fn empty(element: Type) -> Self {
        Self {
            element,
            items: BTreeSet::new(),
        }
    }

    pub fn into_ref(self) -> SetRef {
        Rc::new(RefCell::new(self))
    }

    fn ordinal_of(value: &Value) -> InterpResult<i64> {
        value
            .ordinal()
            .ok_or_else(|| RuntimeError::type_mismatch("ordinal set element", &value.type_name()))
    }

    pub fn include(&mut self, value: &Value) -> InterpResult<()> {
        let ord = Self::ordinal_of(value)?;
        if matches!(self.element, Type::Variant) {
            self.element = Type::of_value(value);
        }
        self.items.insert(ord);
        Ok(())
    }

    pub fn exclude(&mut self, value: &Value) -> InterpResult<()> {
        let ord = Self::ordinal_of(value)?;
        self.items.remove(&ord);
        Ok(())
    }

    pub fn contains(&self, value: &Value) -> bool {
        value.ordinal().is_some_and(|ord| self.items.contains(&ord))
    }

    /// Members as values of the element type
    pub fn members(&self) -> Vec<Value> {
        self.items
            .iter()
            .map(|&ord| match &self.element {
                Type::Enum(ty) => Value::enum_value(Rc::clone(ty), ord),
                Type::Boolean => Value::Bool(ord != 0),
                Type::String => char::from_u32(ord as u32)
                    .map(|c| Value::string(c.to_string()))
                    .unwrap_or(Value::Int(ord)),
                _ => Value::Int(ord),
            })
            .collect()
    }
}

impl fmt::Display for SetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.members().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, "]")
    }
}

// ============================================================================
// Callables and lazy arguments
// ============================================================================

#[derive(Clone)]
pub enum Callable {
    /// Named function or lambda with the scope it closes over
    Function { decl: Rc<FunctionDecl>, scope: EnvRef },
    /// Method bound to its receiver (`@obj.Method`)
    Method {
        decl: Rc<FunctionDecl>,
        receiver: Box<Value>,
        scope: EnvRef,
    },
    /// Address of a registry builtin
    Builtin(String),
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::Function { decl, .. } | Callable::Method { decl, .. } => &decl.name,
            Callable::Builtin(name) => name,
        }
    }
}

// Scopes can contain this very callable; never print them.
impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Function { decl, .. } => write!(f, "function {}", decl.name),
            Callable::Method { decl, receiver, .. } => {
                write!(f, "method {}.{}", receiver.type_name(), decl.name)
            }
            Callable::Builtin(name) => write!(f, "builtin {name}"),
        }
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Callable::Function { decl: a, .. }, Callable::Function { decl: b, .. }) => {
                Rc::ptr_eq(a, b)
            }
            (
                Callable::Method {
                    decl: a,
                    receiver: ra,
                    ..
                },
                Callable::Method {
                    decl: b,
                    receiver: rb,
                    ..
                },
            ) => Rc::ptr_eq(a, b) && ra == rb,
            (Callable::Builtin(a), Callable::Builtin(b)) => crate::util::same_name(a, b),
            _ => false,
        }
    }
}

/// Unevaluated argument bound to a `lazy` parameter; evaluated in the
/// caller's scope on every read
pub struct LazyThunk {
    pub expr: Spanned<Expr>,
    pub env: EnvRef,
}

impl fmt::Debug for LazyThunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LazyThunk({})", self.expr.node)
    }
}

// ============================================================================
// References
// ============================================================================

#[derive(Debug, Clone)]
pub enum FieldOwner {
    Object(ObjectRef),
    Record(RecordRef),
}

/// Handle to an assignable slot
#[derive(Debug, Clone)]
pub enum Reference {
    /// Variable bound in a specific scope
    Variable { env: EnvRef, name: String },
    /// Element of an array, by physical index
    Element { array: ArrayRef, index: usize },
    Field { owner: FieldOwner, name: String },
    ClassVar { class: Rc<ClassInfo>, name: String },
    /// One character of a string held in another slot, by zero-based index
    Char { target: Box<Reference>, index: usize },
}

impl Reference {
    /// Raw slot content, which may itself be a Reference
    fn read_slot(&self) -> InterpResult<Value> {
        match self {
            Reference::Variable { env, name } => env
                .borrow()
                .get_local(name)
                .ok_or_else(|| RuntimeError::undefined_variable(name)),
            Reference::Element { array, index } => {
                let arr = array.borrow();
                arr.elements.get(*index).cloned().ok_or_else(|| {
                    RuntimeError::index_out_of_bounds(*index as i64, 0, arr.elements.len() as i64 - 1)
                })
            }
            Reference::Field { owner, name } => match owner {
                FieldOwner::Object(obj) => obj
                    .field(name)
                    .ok_or_else(|| RuntimeError::field_not_found(&obj.class.name, name)),
                FieldOwner::Record(rec) => {
                    let rec = rec.borrow();
                    rec.field(name)
                        .ok_or_else(|| RuntimeError::field_not_found(&rec.ty.name, name))
                }
            },
            Reference::ClassVar { class, name } => class
                .class_var(name)
                .ok_or_else(|| RuntimeError::field_not_found(&class.name, name)),
            Reference::Char { target, index } => {
                let current = target.deref()?;
                let s = current.expect_str("character access")?;
                s.chars()
                    .nth(*index)
                    .map(|c| Value::string(c.to_string()))
                    .ok_or_else(|| {
                        RuntimeError::index_out_of_bounds(
                            *index as i64 + 1,
                            1,
                            s.chars().count() as i64,
                        )
                    })
            }
        }
    }

    /// Current value, following chains of references
    pub fn deref(&self) -> InterpResult<Value> {
        match self.read_slot()? {
            Value::Reference(inner) => inner.deref(),
            value => Ok(value),
        }
    }

    /// Store `value`, writing through a nested Reference held in the slot
    pub fn assign(&self, value: Value) -> InterpResult<()> {
        if let Reference::Char { target, index } = self {
            let current = target.deref()?;
            let s = current.expect_str("character assignment")?;
            let replacement = value.expect_str("character assignment")?;
            let mut chars: Vec<char> = s.chars().collect();
            let len = chars.len();
            let slot = chars.get_mut(*index).ok_or_else(|| {
                RuntimeError::index_out_of_bounds(*index as i64 + 1, 1, len as i64)
            })?;
            *slot = replacement.chars().next().unwrap_or(' ');
            return target.assign(Value::string(chars.into_iter().collect::<String>()));
        }

        if let Ok(Value::Reference(inner)) = self.read_slot() {
            return inner.assign(value);
        }
        self.write_slot(value)
    }

    fn write_slot(&self, value: Value) -> InterpResult<()> {
        match self {
            Reference::Variable { env, name } => {
                env.borrow_mut().define(name, value);
                Ok(())
            }
            Reference::Element { array, index } => {
                let mut arr = array.borrow_mut();
                let len = arr.elements.len();
                match arr.elements.get_mut(*index) {
                    Some(slot) => {
                        *slot = value;
                        Ok(())
                    }
                    None => Err(RuntimeError::index_out_of_bounds(*index as i64, 0, len as i64 - 1)),
                }
            }
            Reference::Field { owner, name } => {
                let written = match owner {
                    FieldOwner::Object(obj) => obj.set_field(name, value),
                    FieldOwner::Record(rec) => rec.borrow_mut().set_field(name, value),
                };
                if written {
                    Ok(())
                } else {
                    let type_name = match owner {
                        FieldOwner::Object(obj) => obj.class.name.clone(),
                        FieldOwner::Record(rec) => rec.borrow().ty.name.clone(),
                    };
                    Err(RuntimeError::field_not_found(&type_name, name))
                }
            }
            Reference::ClassVar { class, name } => {
                if class.set_class_var(name, value) {
                    Ok(())
                } else {
                    Err(RuntimeError::field_not_found(&class.name, name))
                }
            }
            Reference::Char { .. } => Err(RuntimeError::internal("character slot written directly")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::env::Environment;
    use pretty_assertions::assert_eq;

    fn int_array(bounds: Option<(i64, i64)>, items: &[i64]) -> ArrayRef {
        let ty = ArrayType {
            element: Type::Integer,
            bounds,
        };
        ArrayValue::new(Rc::new(ty), items.iter().map(|&n| Value::Int(n)).collect()).into_ref()
    }

    // --- display ---

    #[test]
    fn test_display_scalars() {
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Float(3.0).to_string(), "3");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::string("hi").to_string(), "hi");
        assert_eq!(Value::Nil.to_string(), "nil");
    }

    #[test]
    fn test_display_enum_and_set() {
        let ty = Rc::new(EnumType::sequential("TColor", &["Red", "Green", "Blue"]));
        assert_eq!(Value::enum_value(Rc::clone(&ty), 2).to_string(), "Blue");
        assert_eq!(Value::enum_value(Rc::clone(&ty), 9).to_string(), "TColor(9)");

        let mut set = SetValue::empty(Type::Enum(Rc::clone(&ty)));
        set.include(&Value::enum_value(Rc::clone(&ty), 2)).unwrap();
        set.include(&Value::enum_value(Rc::clone(&ty), 0)).unwrap();
        assert_eq!(set.to_string(), "[Red, Blue]");
    }

    // --- arrays ---

    #[test]
    fn test_static_array_physical_index() {
        let arr = int_array(Some((0, 9)), &[0; 10]);
        let arr = arr.borrow();
        assert_eq!(arr.physical_index(0).unwrap(), 0);
        assert_eq!(arr.physical_index(9).unwrap(), 9);
        let err = arr.physical_index(10).unwrap_err();
        assert_eq!(err.kind, crate::interp::ErrorKind::IndexOutOfBounds);
    }

    #[test]
    fn test_static_array_with_offset_bounds() {
        let arr = int_array(Some((1, 3)), &[10, 20, 30]);
        let arr = arr.borrow();
        assert_eq!(arr.get(1).unwrap(), Value::Int(10));
        assert_eq!(arr.get(3).unwrap(), Value::Int(30));
        assert!(arr.get(0).is_err());
    }

    #[test]
    fn test_dynamic_array_bounds() {
        let arr = int_array(None, &[1, 2, 3, 4, 5]);
        let arr = arr.borrow();
        assert_eq!(arr.physical_index(4).unwrap(), 4);
        assert!(arr.physical_index(5).is_err());
        assert!(arr.physical_index(-1).is_err());
        assert_eq!(arr.high(), 4);
    }

    #[test]
    fn test_copy_on_assign_static_array_only() {
        let fixed = Value::Array(int_array(Some((0, 1)), &[1, 2]));
        let copy = fixed.copy_on_assign();
        if let (Value::Array(a), Value::Array(b)) = (&fixed, &copy) {
            assert!(!Rc::ptr_eq(a, b));
        }
        let dynamic = Value::Array(int_array(None, &[1]));
        let shared = dynamic.copy_on_assign();
        if let (Value::Array(a), Value::Array(b)) = (&dynamic, &shared) {
            assert!(Rc::ptr_eq(a, b));
        }
    }

    // --- references ---

    #[test]
    fn test_variable_reference_roundtrip() {
        let env = Environment::new().into_ref();
        env.borrow_mut().define("x", Value::Int(1));
        let r = Reference::Variable {
            env: Rc::clone(&env),
            name: "x".to_string(),
        };
        r.assign(Value::Int(5)).unwrap();
        assert_eq!(r.deref().unwrap(), Value::Int(5));
        assert_eq!(env.borrow().get("X"), Some(Value::Int(5)));
    }

    #[test]
    fn test_assign_writes_through_nested_reference() {
        let caller = Environment::new().into_ref();
        caller.borrow_mut().define("a", Value::Int(1));
        let callee = Environment::new().into_ref();
        callee.borrow_mut().define(
            "p",
            Value::Reference(Reference::Variable {
                env: Rc::clone(&caller),
                name: "a".to_string(),
            }),
        );
        let slot = Reference::Variable {
            env: Rc::clone(&callee),
            name: "p".to_string(),
        };
        slot.assign(Value::Int(7)).unwrap();

        assert_eq!(caller.borrow().get("a"), Some(Value::Int(7)));
        assert!(matches!(callee.borrow().get("p"), Some(Value::Reference(_))));
        assert_eq!(slot.deref().unwrap(), Value::Int(7));
    }

    #[test]
    fn test_element_reference() {
        let arr = int_array(None, &[1, 2, 3]);
        let r = Reference::Element {
            array: Rc::clone(&arr),
            index: 1,
        };
        r.assign(Value::Int(20)).unwrap();
        assert_eq!(arr.borrow().elements[1], Value::Int(20));
    }

    #[test]
    fn test_char_reference() {
        let env = Environment::new().into_ref();
        env.borrow_mut().define("s", Value::string("cat"));
        let r = Reference::Char {
            target: Box::new(Reference::Variable {
                env: Rc::clone(&env),
                name: "s".to_string(),
            }),
            index: 0,
        };
        assert_eq!(r.deref().unwrap(), Value::string("c"));
        r.assign(Value::string("b")).unwrap();
        assert_eq!(env.borrow().get("s"), Some(Value::string("bat")));
    }

    // --- capabilities ---

    #[test]
    fn test_object_fields() {
        let class = Rc::new(
            ClassInfo::new("TPoint", None)
                .with_field(FieldInfo::new("X", Type::Integer))
                .with_field(FieldInfo::new("Name", Type::String)),
        );
        let obj = Value::object(class);
        assert_eq!(obj.field("x"), Some(Value::Int(0)));
        assert_eq!(obj.field("name"), Some(Value::string("")));
        assert!(obj.set_field("X", Value::Int(3)).is_some());
        assert_eq!(obj.field("X"), Some(Value::Int(3)));
        assert!(obj.set_field("Missing", Value::Int(1)).is_none());
        assert!(Value::Int(1).field("X").is_none());
    }

    #[test]
    fn test_ordinals() {
        assert_eq!(Value::Bool(true).ordinal(), Some(1));
        assert_eq!(Value::string("A").ordinal(), Some(65));
        assert_eq!(Value::string("AB").ordinal(), None);
        assert_eq!(Value::Float(1.0).ordinal(), None);
    }

    #[test]
    fn test_enum_succ_pred() {
        let ty = Rc::new(EnumType::sequential("TDay", &["Mon", "Tue"]));
        let mon = Value::enum_value(Rc::clone(&ty), 0);
        assert_eq!(mon.enum_succ().unwrap().to_string(), "Tue");
        assert!(mon.enum_pred().is_none());
    }

    #[test]
    fn test_set_include_exclude() {
        let set = Value::Set(SetValue::empty(Type::Integer).into_ref());
        set.set_include(&Value::Int(3)).unwrap();
        set.set_include(&Value::Int(1)).unwrap();
        set.set_exclude(&Value::Int(3)).unwrap();
        assert_eq!(set.to_string(), "[1]");
        assert!(Value::Int(1).set_include(&Value::Int(1)).is_err());
    }
}
