//! Statement AST nodes

use super::{
    ClassDecl, EnumDecl, Expr, FunctionDecl, HelperDecl, InterfaceDecl, OperatorDecl, RecordDecl,
    Spanned,
};
use serde::{Deserialize, Serialize};

/// Statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// Expression evaluated for its side effects
    Expr(Spanned<Expr>),

    /// var a, b: T := init
    Var {
        names: Vec<String>,
        ty: Option<String>,
        init: Option<Spanned<Expr>>,
    },

    /// const name: T = value
    Const {
        name: String,
        ty: Option<String>,
        value: Spanned<Expr>,
    },

    /// target := value, target += value, ...
    Assign {
        target: Spanned<Expr>,
        op: AssignOp,
        value: Spanned<Expr>,
    },

    /// begin ... end
    Block(Vec<Spanned<Stmt>>),

    If {
        cond: Spanned<Expr>,
        then_branch: Box<Spanned<Stmt>>,
        else_branch: Option<Box<Spanned<Stmt>>>,
    },

    Case {
        expr: Spanned<Expr>,
        branches: Vec<CaseBranch>,
        else_branch: Option<Vec<Spanned<Stmt>>>,
    },

    While {
        cond: Spanned<Expr>,
        body: Box<Spanned<Stmt>>,
    },

    /// repeat ... until cond
    Repeat {
        body: Vec<Spanned<Stmt>>,
        until: Spanned<Expr>,
    },

    /// for [var] i := start to|downto end [step n] do body
    For {
        var: String,
        #[serde(default)]
        inline_var: bool,
        start: Spanned<Expr>,
        end: Spanned<Expr>,
        direction: ForDirection,
        step: Option<Spanned<Expr>>,
        body: Box<Spanned<Stmt>>,
    },

    /// for [var] x in collection do body
    ForIn {
        var: String,
        #[serde(default)]
        inline_var: bool,
        collection: Spanned<Expr>,
        body: Box<Spanned<Stmt>>,
    },

    Try {
        block: Vec<Spanned<Stmt>>,
        except: Option<ExceptClause>,
        finally: Option<Vec<Spanned<Stmt>>>,
    },

    /// raise [expr]; a bare raise re-raises the handled exception
    Raise(Option<Spanned<Expr>>),

    Break,
    Continue,
    /// exit [value]
    Exit(Option<Spanned<Expr>>),
    /// return [value]
    Return(Option<Spanned<Expr>>),

    Function(FunctionDecl),
    Class(ClassDecl),
    Record(RecordDecl),
    Enum(EnumDecl),
    Interface(InterfaceDecl),
    Helper(HelperDecl),
    Operator(OperatorDecl),
}

/// Assignment operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AssignOp {
    #[default]
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForDirection {
    To,
    Downto,
}

/// One `values: statement` arm of a case statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseBranch {
    /// Plain values or `low..high` ranges
    pub values: Vec<Spanned<Expr>>,
    pub body: Box<Spanned<Stmt>>,
}

/// The `except` part of a try statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptClause {
    #[serde(default)]
    pub handlers: Vec<ExceptHandler>,
    /// `else` part, or the whole body of an except block without `on` handlers
    pub default: Option<Vec<Spanned<Stmt>>>,
}

/// on E: EClass do body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptHandler {
    pub var: Option<String>,
    pub class_name: String,
    pub body: Box<Spanned<Stmt>>,
}
