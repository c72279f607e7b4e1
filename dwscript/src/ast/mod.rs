//! Abstract Syntax Tree definitions
//!
//! The evaluator consumes a tree produced by an external parser. Every node
//! is serde-serializable so hosts can hand programs over as JSON.

pub mod build;
mod decl;
mod expr;
mod span;
mod stmt;

pub use decl::*;
pub use expr::*;
pub use span::*;
pub use stmt::*;

use serde::{Deserialize, Serialize};

/// A program is a sequence of top-level statements
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Spanned<Stmt>>,
}

impl Program {
    pub fn new(statements: Vec<Spanned<Stmt>>) -> Self {
        Self { statements }
    }
}

/// Borrowed view of any evaluable node
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Program(&'a Program),
    Stmt(&'a Spanned<Stmt>),
    Expr(&'a Spanned<Expr>),
}

impl Node<'_> {
    pub fn pos(&self) -> Position {
        match self {
            Node::Program(p) => p.statements.first().map(|s| s.pos).unwrap_or_default(),
            Node::Stmt(s) => s.pos,
            Node::Expr(e) => e.pos,
        }
    }
}

impl<'a> From<&'a Spanned<Expr>> for Node<'a> {
    fn from(expr: &'a Spanned<Expr>) -> Self {
        Node::Expr(expr)
    }
}

impl<'a> From<&'a Spanned<Stmt>> for Node<'a> {
    fn from(stmt: &'a Spanned<Stmt>) -> Self {
        Node::Stmt(stmt)
    }
}

impl<'a> From<&'a Program> for Node<'a> {
    fn from(program: &'a Program) -> Self {
        Node::Program(program)
    }
}
