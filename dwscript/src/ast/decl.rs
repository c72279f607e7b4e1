//! Declaration AST nodes

use super::{BinOp, Expr, Spanned, Stmt};
use serde::{Deserialize, Serialize};

/// Function, procedure, method or lambda declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Param>,
    pub return_type: Option<String>,
    /// None for forward and abstract declarations
    pub body: Option<Vec<Spanned<Stmt>>>,
    /// require section
    #[serde(default)]
    pub pre: Vec<Condition>,
    /// ensure section
    #[serde(default)]
    pub post: Vec<Condition>,
    /// Owning class/record for methods and out-of-line method bodies
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub flags: MethodFlags,
}

impl FunctionDecl {
    /// Number of parameters without a default value
    pub fn required_params(&self) -> usize {
        self.params.iter().filter(|p| p.default.is_none()).count()
    }

    /// Whether `argc` supplied arguments fit this declaration
    pub fn accepts(&self, argc: usize) -> bool {
        argc >= self.required_params() && argc <= self.params.len()
    }

    /// `TClass.Method` for methods, the bare name otherwise
    pub fn qualified_name(&self) -> String {
        match &self.class_name {
            Some(class) => format!("{class}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodFlags {
    #[serde(default)]
    pub constructor: bool,
    #[serde(default)]
    pub destructor: bool,
    #[serde(default)]
    pub class_method: bool,
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub is_override: bool,
}

/// Parameter passing mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamMode {
    #[default]
    Value,
    Const,
    Var,
    Out,
    Lazy,
}

impl ParamMode {
    /// var and out parameters alias the caller's slot
    pub fn is_by_ref(self) -> bool {
        matches!(self, ParamMode::Var | ParamMode::Out)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Option<String>,
    #[serde(default)]
    pub mode: ParamMode,
    pub default: Option<Spanned<Expr>>,
}

/// A contract clause: test expression with an optional custom message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub test: Spanned<Expr>,
    pub message: Option<Spanned<Expr>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: String,
    pub init: Option<Spanned<Expr>>,
    /// class var
    #[serde(default)]
    pub class_var: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDecl {
    pub name: String,
    pub ty: String,
    /// Field or getter method name
    pub read: Option<String>,
    /// Field or setter method name
    pub write: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    pub parent: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    #[serde(default)]
    pub methods: Vec<FunctionDecl>,
    #[serde(default)]
    pub properties: Vec<PropertyDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDecl {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    #[serde(default)]
    pub methods: Vec<FunctionDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    pub members: Vec<EnumMember>,
    /// Scoped enums are only reachable as TEnum.Member
    #[serde(default)]
    pub scoped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumMember {
    pub name: String,
    /// Explicit ordinal, otherwise previous + 1
    pub value: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceDecl {
    pub name: String,
    pub parent: Option<String>,
    #[serde(default)]
    pub methods: Vec<String>,
}

/// helper THelper for TTarget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelperDecl {
    pub name: String,
    pub target: String,
    #[serde(default)]
    pub methods: Vec<FunctionDecl>,
}

/// operator + (TVec, TVec): TVec uses AddVecs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorDecl {
    pub op: BinOp,
    pub operands: Vec<String>,
    pub return_type: Option<String>,
    pub uses: String,
}
