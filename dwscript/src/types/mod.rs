//! Runtime type metadata
//!
//! Class, record, enum and array descriptions the evaluator queries while
//! running. Declaration processing fills a [`TypeTable`]; the evaluator only
//! reads it through [`TypeRegistry`].

mod resolve;
mod table;

pub use resolve::{convert_implicit, default_value, resolve_type, split_param_types};
pub use table::TypeTable;

use crate::ast::{BinOp, Expr, FunctionDecl, Spanned};
use crate::interp::{InterpResult, Value};
use crate::util::{normalize, same_name};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// A resolved runtime type
#[derive(Debug, Clone)]
pub enum Type {
    Integer,
    Float,
    String,
    Boolean,
    Variant,
    Enum(Rc<EnumType>),
    Record(Rc<RecordType>),
    Class(Rc<ClassInfo>),
    Interface(Rc<InterfaceInfo>),
    Array(Rc<ArrayType>),
    Set(Box<Type>),
    Subrange(Rc<SubrangeType>),
    FunctionPointer(Rc<FunctionPointerType>),
}

impl Type {
    /// The runtime type a value carries
    pub fn of_value(value: &Value) -> Type {
        match value {
            Value::Int(_) => Type::Integer,
            Value::Float(_) => Type::Float,
            Value::Str(_) => Type::String,
            Value::Bool(_) => Type::Boolean,
            Value::Enum(e) => Type::Enum(Rc::clone(&e.ty)),
            Value::Array(a) => Type::Array(Rc::clone(&a.borrow().ty)),
            Value::Record(r) => Type::Record(Rc::clone(&r.borrow().ty)),
            Value::Object(o) => Type::Class(Rc::clone(&o.class)),
            Value::Interface(i) => Type::Interface(Rc::clone(&i.interface)),
            Value::Set(s) => Type::Set(Box::new(s.borrow().element.clone())),
            _ => Type::Variant,
        }
    }

    pub fn name(&self) -> String {
        self.to_string()
    }

    pub fn is_ordinal(&self) -> bool {
        matches!(
            self,
            Type::Integer | Type::Boolean | Type::Enum(_) | Type::Subrange(_)
        )
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Integer, Type::Integer)
            | (Type::Float, Type::Float)
            | (Type::String, Type::String)
            | (Type::Boolean, Type::Boolean)
            | (Type::Variant, Type::Variant) => true,
            (Type::Enum(a), Type::Enum(b)) => same_name(&a.name, &b.name),
            (Type::Record(a), Type::Record(b)) => same_name(&a.name, &b.name),
            (Type::Class(a), Type::Class(b)) => same_name(&a.name, &b.name),
            (Type::Interface(a), Type::Interface(b)) => same_name(&a.name, &b.name),
            (Type::Array(a), Type::Array(b)) => a.element == b.element && a.bounds == b.bounds,
            (Type::Set(a), Type::Set(b)) => a == b,
            (Type::Subrange(a), Type::Subrange(b)) => a.low == b.low && a.high == b.high,
            (Type::FunctionPointer(a), Type::FunctionPointer(b)) => {
                a.params == b.params && a.return_type == b.return_type
            }
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Integer => write!(f, "Integer"),
            Type::Float => write!(f, "Float"),
            Type::String => write!(f, "String"),
            Type::Boolean => write!(f, "Boolean"),
            Type::Variant => write!(f, "Variant"),
            Type::Enum(e) => write!(f, "{}", e.name),
            Type::Record(r) => write!(f, "{}", r.name),
            Type::Class(c) => write!(f, "{}", c.name),
            Type::Interface(i) => write!(f, "{}", i.name),
            Type::Array(a) => write!(f, "{a}"),
            Type::Set(elem) => write!(f, "set of {elem}"),
            Type::Subrange(s) => write!(f, "{}", s.name),
            Type::FunctionPointer(p) => write!(f, "{p}"),
        }
    }
}

// ============================================================================
// Arrays, sets, subranges, function pointers
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayType {
    pub element: Type,
    /// Declared `[low..high]` bounds; None for dynamic arrays
    pub bounds: Option<(i64, i64)>,
}

impl ArrayType {
    pub fn dynamic(element: Type) -> Self {
        Self {
            element,
            bounds: None,
        }
    }

    pub fn fixed(element: Type, low: i64, high: i64) -> Self {
        Self {
            element,
            bounds: Some((low, high)),
        }
    }

    pub fn is_static(&self) -> bool {
        self.bounds.is_some()
    }

    /// Logical index of the first element
    pub fn low(&self) -> i64 {
        self.bounds.map(|(low, _)| low).unwrap_or(0)
    }

    /// Element count of a static array
    pub fn static_len(&self) -> Option<usize> {
        self.bounds
            .map(|(low, high)| usize::try_from(high - low + 1).unwrap_or(0))
    }
}

impl fmt::Display for ArrayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bounds {
            Some((low, high)) => write!(f, "array[{low}..{high}] of {}", self.element),
            None => write!(f, "array of {}", self.element),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubrangeType {
    pub name: String,
    pub low: i64,
    pub high: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionPointerType {
    pub params: Vec<Type>,
    /// None for procedure pointers
    pub return_type: Option<Type>,
}

impl fmt::Display for FunctionPointerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = if self.return_type.is_some() {
            "function"
        } else {
            "procedure"
        };
        write!(f, "{keyword}(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{p}")?;
        }
        f.write_str(")")?;
        if let Some(ret) = &self.return_type {
            write!(f, ": {ret}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    pub name: String,
    /// (member name, ordinal), sorted by ordinal
    members: Vec<(String, i64)>,
    pub scoped: bool,
}

impl EnumType {
    pub fn new(name: impl Into<String>, mut members: Vec<(String, i64)>, scoped: bool) -> Self {
        members.sort_by_key(|(_, ord)| *ord);
        Self {
            name: name.into(),
            members,
            scoped,
        }
    }

    /// Members numbered from zero in declaration order
    pub fn sequential(name: impl Into<String>, names: &[&str]) -> Self {
        let members = names
            .iter()
            .zip(0..)
            .map(|(n, ord)| (n.to_string(), ord))
            .collect();
        Self::new(name, members, false)
    }

    pub fn members(&self) -> &[(String, i64)] {
        &self.members
    }

    pub fn ordinal_of(&self, member: &str) -> Option<i64> {
        self.members
            .iter()
            .find(|(n, _)| same_name(n, member))
            .map(|(_, ord)| *ord)
    }

    pub fn name_of(&self, ordinal: i64) -> Option<&str> {
        self.members
            .iter()
            .find(|(_, ord)| *ord == ordinal)
            .map(|(n, _)| n.as_str())
    }

    pub fn low(&self) -> i64 {
        self.members.first().map(|(_, ord)| *ord).unwrap_or(0)
    }

    pub fn high(&self) -> i64 {
        self.members.last().map(|(_, ord)| *ord).unwrap_or(0)
    }

    /// Next declared ordinal; None at the maximum
    pub fn succ(&self, ordinal: i64) -> Option<i64> {
        let pos = self.members.iter().position(|(_, ord)| *ord == ordinal)?;
        self.members.get(pos + 1).map(|(_, ord)| *ord)
    }

    /// Previous declared ordinal; None at the minimum
    pub fn pred(&self, ordinal: i64) -> Option<i64> {
        let pos = self.members.iter().position(|(_, ord)| *ord == ordinal)?;
        pos.checked_sub(1)
            .and_then(|p| self.members.get(p))
            .map(|(_, ord)| *ord)
    }
}

// ============================================================================
// Records, classes, interfaces
// ============================================================================

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub ty: Type,
    /// Initializer evaluated when an instance is created
    pub init: Option<Spanned<Expr>>,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            init: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyInfo {
    pub name: String,
    /// Backing field or getter method
    pub read: Option<String>,
    /// Backing field or setter method
    pub write: Option<String>,
}

type MethodTable = RefCell<HashMap<String, Vec<Rc<FunctionDecl>>>>;

fn add_to_table(table: &MethodTable, decl: Rc<FunctionDecl>) {
    let mut methods = table.borrow_mut();
    let overloads = methods.entry(normalize(&decl.name)).or_default();
    // an implementation replaces its forward declaration
    if let Some(slot) = overloads
        .iter_mut()
        .find(|m| m.body.is_none() && m.params.len() == decl.params.len())
    {
        *slot = decl;
    } else {
        overloads.push(decl);
    }
}

fn pick_overload(candidates: &[Rc<FunctionDecl>], argc: usize) -> Option<Rc<FunctionDecl>> {
    candidates
        .iter()
        .find(|m| m.accepts(argc))
        .or_else(|| candidates.first())
        .cloned()
}

pub struct RecordType {
    pub name: String,
    pub fields: Vec<FieldInfo>,
    methods: MethodTable,
}

impl RecordType {
    pub fn new(name: impl Into<String>, fields: Vec<FieldInfo>) -> Self {
        Self {
            name: name.into(),
            fields,
            methods: RefCell::new(HashMap::new()),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| same_name(&f.name, name))
    }

    pub fn add_method(&self, decl: Rc<FunctionDecl>) {
        add_to_table(&self.methods, decl);
    }

    pub fn find_method(&self, name: &str, argc: usize) -> Option<Rc<FunctionDecl>> {
        let methods = self.methods.borrow();
        methods
            .get(&normalize(name))
            .and_then(|c| pick_overload(c, argc))
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordType")
            .field("name", &self.name)
            .field("fields", &self.fields.iter().map(|x| &x.name).collect::<Vec<_>>())
            .finish()
    }
}

pub struct ClassInfo {
    pub name: String,
    pub parent: Option<Rc<ClassInfo>>,
    pub interfaces: Vec<String>,
    /// Fields declared by this class (parents hold their own)
    pub fields: Vec<FieldInfo>,
    pub properties: Vec<PropertyInfo>,
    methods: MethodTable,
    class_vars: RefCell<HashMap<String, Value>>,
}

impl ClassInfo {
    pub fn new(name: impl Into<String>, parent: Option<Rc<ClassInfo>>) -> Self {
        Self {
            name: name.into(),
            parent,
            interfaces: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            methods: RefCell::new(HashMap::new()),
            class_vars: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_field(mut self, field: FieldInfo) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_interface(mut self, name: impl Into<String>) -> Self {
        self.interfaces.push(name.into());
        self
    }

    pub fn with_property(mut self, property: PropertyInfo) -> Self {
        self.properties.push(property);
        self
    }

    /// Self first, then each parent up to the root
    pub fn ancestry(&self) -> impl Iterator<Item = &ClassInfo> {
        std::iter::successors(Some(self), |c| c.parent.as_deref())
    }

    pub fn is_descendant_of(&self, name: &str) -> bool {
        self.ancestry().any(|c| same_name(&c.name, name))
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.ancestry()
            .any(|c| c.interfaces.iter().any(|i| same_name(i, interface)))
    }

    /// Every field including inherited ones, root class first
    pub fn all_fields(&self) -> Vec<FieldInfo> {
        let mut chain: Vec<&ClassInfo> = self.ancestry().collect();
        chain.reverse();
        chain
            .into_iter()
            .flat_map(|c| c.fields.iter().cloned())
            .collect()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.ancestry()
            .any(|c| c.fields.iter().any(|f| same_name(&f.name, name)))
    }

    pub fn find_property(&self, name: &str) -> Option<PropertyInfo> {
        self.ancestry()
            .find_map(|c| c.properties.iter().find(|p| same_name(&p.name, name)))
            .cloned()
    }

    pub fn add_method(&self, decl: Rc<FunctionDecl>) {
        add_to_table(&self.methods, decl);
    }

    /// Virtual lookup: the most derived class defining `name` wins, and
    /// among its overloads the one accepting `argc` arguments.
    pub fn find_method(&self, name: &str, argc: usize) -> Option<Rc<FunctionDecl>> {
        let key = normalize(name);
        self.ancestry().find_map(|c| {
            let methods = c.methods.borrow();
            methods.get(&key).and_then(|cands| pick_overload(cands, argc))
        })
    }

    pub fn has_method(&self, name: &str) -> bool {
        let key = normalize(name);
        self.ancestry()
            .any(|c| c.methods.borrow().contains_key(&key))
    }

    pub fn define_class_var(&self, name: &str, value: Value) {
        self.class_vars.borrow_mut().insert(normalize(name), value);
    }

    pub fn class_var(&self, name: &str) -> Option<Value> {
        let key = normalize(name);
        self.ancestry()
            .find_map(|c| c.class_vars.borrow().get(&key).cloned())
    }

    pub fn set_class_var(&self, name: &str, value: Value) -> bool {
        let key = normalize(name);
        for class in self.ancestry() {
            let mut vars = class.class_vars.borrow_mut();
            if let Some(slot) = vars.get_mut(&key) {
                *slot = value;
                return true;
            }
        }
        false
    }
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| &p.name))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub name: String,
    pub parent: Option<Rc<InterfaceInfo>>,
    pub methods: Vec<String>,
}

impl InterfaceInfo {
    pub fn new(name: impl Into<String>, parent: Option<Rc<InterfaceInfo>>) -> Self {
        Self {
            name: name.into(),
            parent,
            methods: Vec::new(),
        }
    }
}

// ============================================================================
// Helpers and operators
// ============================================================================

/// Native helper body: receiver plus evaluated arguments
pub type NativeHelper = fn(&Value, &[Value]) -> InterpResult<Value>;

/// Method attached to an existing type from outside its declaration
#[derive(Debug, Clone)]
pub enum HelperMethod {
    Native(NativeHelper),
    User(Rc<FunctionDecl>),
}

/// `operator op (Left, Right) uses Func`
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorOverload {
    pub op: BinOp,
    pub left: String,
    pub right: String,
    pub function: String,
}

// ============================================================================
// Registry contract
// ============================================================================

/// Read-only type queries. Names are case-insensitive and may carry a
/// `(Parent)` suffix, which is ignored.
pub trait TypeRegistry {
    fn lookup_class(&self, name: &str) -> Option<Rc<ClassInfo>>;
    fn lookup_interface(&self, name: &str) -> Option<Rc<InterfaceInfo>>;
    fn lookup_record(&self, name: &str) -> Option<Rc<RecordType>>;
    fn lookup_enum(&self, name: &str) -> Option<Rc<EnumType>>;
    /// Unscoped enum member used as a bare identifier
    fn lookup_enum_value(&self, member: &str) -> Option<(Rc<EnumType>, i64)>;
    fn lookup_array(&self, name: &str) -> Option<Rc<ArrayType>>;
    fn lookup_subrange(&self, name: &str) -> Option<Rc<SubrangeType>>;
    fn lookup_function_pointer(&self, name: &str) -> Option<Rc<FunctionPointerType>>;
    fn lookup_helper(&self, type_name: &str, method: &str) -> Option<HelperMethod>;
    /// Function implementing `op` for the given operand type names
    fn lookup_operator(&self, op: BinOp, left: &str, right: &str) -> Option<String>;

    fn has_class(&self, name: &str) -> bool {
        self.lookup_class(name).is_some()
    }

    fn has_interface(&self, name: &str) -> bool {
        self.lookup_interface(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color() -> EnumType {
        EnumType::new(
            "TColor",
            vec![
                ("Red".to_string(), 0),
                ("Blue".to_string(), 5),
                ("Green".to_string(), 2),
            ],
            false,
        )
    }

    #[test]
    fn test_enum_members_sorted_by_ordinal() {
        let e = color();
        assert_eq!(e.low(), 0);
        assert_eq!(e.high(), 5);
        assert_eq!(e.name_of(2), Some("Green"));
        assert_eq!(e.ordinal_of("BLUE"), Some(5));
    }

    #[test]
    fn test_enum_succ_pred_follow_declared_ordinals() {
        let e = color();
        assert_eq!(e.succ(0), Some(2));
        assert_eq!(e.succ(2), Some(5));
        assert_eq!(e.succ(5), None);
        assert_eq!(e.pred(0), None);
        assert_eq!(e.pred(5), Some(2));
    }

    #[test]
    fn test_array_type_display_and_bounds() {
        let a = ArrayType::fixed(Type::Integer, 1, 10);
        assert_eq!(a.to_string(), "array[1..10] of Integer");
        assert_eq!(a.static_len(), Some(10));
        assert_eq!(a.low(), 1);
        let d = ArrayType::dynamic(Type::String);
        assert_eq!(d.to_string(), "array of String");
        assert!(!d.is_static());
    }

    #[test]
    fn test_class_ancestry_and_fields() {
        let base = Rc::new(
            ClassInfo::new("TBase", None).with_field(FieldInfo::new("Id", Type::Integer)),
        );
        let sub = ClassInfo::new("TSub", Some(Rc::clone(&base)))
            .with_field(FieldInfo::new("Name", Type::String))
            .with_interface("IPrintable");

        assert!(sub.is_descendant_of("tbase"));
        assert!(sub.is_descendant_of("TSub"));
        assert!(!base.is_descendant_of("TSub"));
        assert!(sub.implements("IPRINTABLE"));
        let names: Vec<String> = sub.all_fields().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["Id", "Name"]);
        assert!(sub.has_field("id"));
    }

    #[test]
    fn test_class_vars_live_on_declaring_class() {
        let base = Rc::new(ClassInfo::new("TBase", None));
        base.define_class_var("Count", Value::Int(0));
        let sub = ClassInfo::new("TSub", Some(Rc::clone(&base)));

        assert!(sub.set_class_var("count", Value::Int(3)));
        assert_eq!(base.class_var("Count"), Some(Value::Int(3)));
        assert!(!sub.set_class_var("missing", Value::Int(1)));
    }

    #[test]
    fn test_function_pointer_display() {
        let p = FunctionPointerType {
            params: vec![Type::Integer, Type::String],
            return_type: Some(Type::Boolean),
        };
        assert_eq!(p.to_string(), "function(Integer; String): Boolean");
    }
}
