//! Expression AST nodes

use super::{FunctionDecl, Spanned};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Integer literal
    IntLit(i64),
    /// Float literal
    FloatLit(f64),
    /// String literal
    StrLit(String),
    /// Character literal (#65 or 'A' in a char context)
    CharLit(char),
    /// Boolean literal
    BoolLit(bool),
    /// nil
    Nil,

    /// Variable, constant, parameterless function or type name
    Ident(String),
    /// Implicit method receiver
    SelfRef,

    /// Binary operation
    Binary {
        left: Box<Spanned<Expr>>,
        op: BinOp,
        right: Box<Spanned<Expr>>,
    },

    /// Unary operation
    Unary {
        op: UnOp,
        expr: Box<Spanned<Expr>>,
    },

    /// Parenthesized expression
    Grouped(Box<Spanned<Expr>>),

    /// Function call: callee(args)
    Call {
        func: Box<Spanned<Expr>>,
        args: Vec<Spanned<Expr>>,
    },

    /// Method call: receiver.method(args)
    MethodCall {
        receiver: Box<Spanned<Expr>>,
        method: String,
        args: Vec<Spanned<Expr>>,
    },

    /// Member access: object.member
    Member {
        object: Box<Spanned<Expr>>,
        member: String,
    },

    /// Indexing: base[index]
    Index {
        base: Box<Spanned<Expr>>,
        index: Box<Spanned<Expr>>,
    },

    /// Array literal: [a, b, c]
    ArrayLit(Vec<Spanned<Expr>>),

    /// Set literal: [a, b..c]
    SetLit(Vec<Spanned<Expr>>),

    /// Record literal: TPoint(x: 1; y: 2) or anonymous (x: 1; y: 2)
    RecordLit {
        type_name: Option<String>,
        fields: Vec<FieldInit>,
    },

    /// Range: low..high (inside set literals and case labels)
    Range {
        low: Box<Spanned<Expr>>,
        high: Box<Spanned<Expr>>,
    },

    /// Anonymous function capturing its defining scope
    Lambda(Box<FunctionDecl>),

    /// Postcondition snapshot reference: old x
    Old(String),

    /// Function/method pointer: @Func or @obj.Method
    AddressOf(Box<Spanned<Expr>>),

    /// Conditional expression: if cond then a else b
    IfExpr {
        cond: Box<Spanned<Expr>>,
        then_branch: Box<Spanned<Expr>>,
        else_branch: Box<Spanned<Expr>>,
    },

    /// Runtime class test: expr is TClass
    Is {
        expr: Box<Spanned<Expr>>,
        type_name: String,
    },

    /// Checked cast: expr as TClass
    As {
        expr: Box<Spanned<Expr>>,
        type_name: String,
    },

    /// Interface support test: expr implements IFoo
    Implements {
        expr: Box<Spanned<Expr>>,
        interface: String,
    },

    /// Parent-class call: inherited [Method(args)]
    Inherited {
        method: Option<String>,
        args: Vec<Spanned<Expr>>,
    },

    /// Construction: new TClass(args)
    New {
        class_name: String,
        args: Vec<Spanned<Expr>>,
    },
}

/// Named field initializer inside a record literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInit {
    pub name: String,
    pub value: Spanned<Expr>,
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    /// Real division (/), always yields Float
    Div,
    /// Integer division (div)
    IntDiv,
    Mod,
    Shl,
    Shr,

    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    // Logical / bitwise
    And,
    Or,
    Xor,
    Implies,

    /// Membership (in)
    In,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::IntDiv => "div",
            BinOp::Mod => "mod",
            BinOp::Shl => "shl",
            BinOp::Shr => "shr",
            BinOp::Eq => "=",
            BinOp::Ne => "<>",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Implies => "implies",
            BinOp::In => "in",
        };
        f.write_str(text)
    }
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    /// Negation (-)
    Neg,
    /// Unary plus (+)
    Plus,
    /// Logical or bitwise not
    Not,
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnOp::Neg => write!(f, "-"),
            UnOp::Plus => write!(f, "+"),
            UnOp::Not => write!(f, "not"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Spanned<Expr>]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item.node)?;
    }
    Ok(())
}

/// Renders an expression back to script source text.
///
/// Contract failure messages quote the failing condition through this.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::IntLit(n) => write!(f, "{n}"),
            Expr::FloatLit(x) => write!(f, "{x:?}"),
            Expr::StrLit(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Expr::CharLit(c) => write!(f, "#{}", *c as u32),
            Expr::BoolLit(true) => write!(f, "True"),
            Expr::BoolLit(false) => write!(f, "False"),
            Expr::Nil => write!(f, "nil"),
            Expr::Ident(name) => write!(f, "{name}"),
            Expr::SelfRef => write!(f, "Self"),
            Expr::Binary { left, op, right } => write!(f, "{} {op} {}", left.node, right.node),
            Expr::Unary { op: UnOp::Not, expr } => write!(f, "not {}", expr.node),
            Expr::Unary { op, expr } => write!(f, "{op}{}", expr.node),
            Expr::Grouped(inner) => write!(f, "({})", inner.node),
            Expr::Call { func, args } => {
                write!(f, "{}(", func.node)?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Expr::MethodCall {
                receiver,
                method,
                args,
            } => {
                write!(f, "{}.{method}(", receiver.node)?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Expr::Member { object, member } => write!(f, "{}.{member}", object.node),
            Expr::Index { base, index } => write!(f, "{}[{}]", base.node, index.node),
            Expr::ArrayLit(items) | Expr::SetLit(items) => {
                f.write_str("[")?;
                write_list(f, items)?;
                f.write_str("]")
            }
            Expr::RecordLit { type_name, fields } => {
                if let Some(name) = type_name {
                    f.write_str(name)?;
                }
                f.write_str("(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{}: {}", field.name, field.value.node)?;
                }
                f.write_str(")")
            }
            Expr::Range { low, high } => write!(f, "{}..{}", low.node, high.node),
            Expr::Lambda(decl) => {
                let keyword = if decl.return_type.is_some() {
                    "function"
                } else {
                    "procedure"
                };
                write!(f, "lambda {keyword}")
            }
            Expr::Old(name) => write!(f, "old {name}"),
            Expr::AddressOf(target) => write!(f, "@{}", target.node),
            Expr::IfExpr {
                cond,
                then_branch,
                else_branch,
            } => write!(
                f,
                "if {} then {} else {}",
                cond.node, then_branch.node, else_branch.node
            ),
            Expr::Is { expr, type_name } => write!(f, "{} is {type_name}", expr.node),
            Expr::As { expr, type_name } => write!(f, "{} as {type_name}", expr.node),
            Expr::Implements { expr, interface } => {
                write!(f, "{} implements {interface}", expr.node)
            }
            Expr::Inherited { method, args } => {
                f.write_str("inherited")?;
                if let Some(name) = method {
                    write!(f, " {name}(")?;
                    write_list(f, args)?;
                    f.write_str(")")?;
                }
                Ok(())
            }
            Expr::New { class_name, args } => {
                write!(f, "new {class_name}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
        }
    }
}
