//! Tree builders for hosts and tests that assemble programs in code.

use super::*;

fn boxed(e: Spanned<Expr>) -> Box<Spanned<Expr>> {
    Box::new(e)
}

pub fn expr(node: Expr) -> Spanned<Expr> {
    Spanned::synthetic(node)
}

pub fn stmt(node: Stmt) -> Spanned<Stmt> {
    Spanned::synthetic(node)
}

pub fn int(n: i64) -> Spanned<Expr> {
    expr(Expr::IntLit(n))
}

pub fn float(x: f64) -> Spanned<Expr> {
    expr(Expr::FloatLit(x))
}

pub fn string(s: &str) -> Spanned<Expr> {
    expr(Expr::StrLit(s.to_string()))
}

pub fn boolean(b: bool) -> Spanned<Expr> {
    expr(Expr::BoolLit(b))
}

pub fn nil() -> Spanned<Expr> {
    expr(Expr::Nil)
}

pub fn ident(name: &str) -> Spanned<Expr> {
    expr(Expr::Ident(name.to_string()))
}

pub fn self_ref() -> Spanned<Expr> {
    expr(Expr::SelfRef)
}

pub fn binary(left: Spanned<Expr>, op: BinOp, right: Spanned<Expr>) -> Spanned<Expr> {
    expr(Expr::Binary {
        left: boxed(left),
        op,
        right: boxed(right),
    })
}

pub fn unary(op: UnOp, operand: Spanned<Expr>) -> Spanned<Expr> {
    expr(Expr::Unary {
        op,
        expr: boxed(operand),
    })
}

pub fn grouped(inner: Spanned<Expr>) -> Spanned<Expr> {
    expr(Expr::Grouped(boxed(inner)))
}

pub fn call(name: &str, args: Vec<Spanned<Expr>>) -> Spanned<Expr> {
    call_expr(ident(name), args)
}

pub fn call_expr(func: Spanned<Expr>, args: Vec<Spanned<Expr>>) -> Spanned<Expr> {
    expr(Expr::Call {
        func: boxed(func),
        args,
    })
}

pub fn method_call(receiver: Spanned<Expr>, method: &str, args: Vec<Spanned<Expr>>) -> Spanned<Expr> {
    expr(Expr::MethodCall {
        receiver: boxed(receiver),
        method: method.to_string(),
        args,
    })
}

pub fn member(object: Spanned<Expr>, name: &str) -> Spanned<Expr> {
    expr(Expr::Member {
        object: boxed(object),
        member: name.to_string(),
    })
}

pub fn index(base: Spanned<Expr>, idx: Spanned<Expr>) -> Spanned<Expr> {
    expr(Expr::Index {
        base: boxed(base),
        index: boxed(idx),
    })
}

pub fn array_lit(items: Vec<Spanned<Expr>>) -> Spanned<Expr> {
    expr(Expr::ArrayLit(items))
}

pub fn set_lit(items: Vec<Spanned<Expr>>) -> Spanned<Expr> {
    expr(Expr::SetLit(items))
}

pub fn record_lit(type_name: Option<&str>, fields: Vec<(&str, Spanned<Expr>)>) -> Spanned<Expr> {
    expr(Expr::RecordLit {
        type_name: type_name.map(str::to_string),
        fields: fields
            .into_iter()
            .map(|(name, value)| FieldInit {
                name: name.to_string(),
                value,
            })
            .collect(),
    })
}

pub fn range(low: Spanned<Expr>, high: Spanned<Expr>) -> Spanned<Expr> {
    expr(Expr::Range {
        low: boxed(low),
        high: boxed(high),
    })
}

pub fn lambda(decl: FunctionDecl) -> Spanned<Expr> {
    expr(Expr::Lambda(Box::new(decl)))
}

pub fn old(name: &str) -> Spanned<Expr> {
    expr(Expr::Old(name.to_string()))
}

pub fn address_of(target: Spanned<Expr>) -> Spanned<Expr> {
    expr(Expr::AddressOf(boxed(target)))
}

pub fn if_expr(cond: Spanned<Expr>, a: Spanned<Expr>, b: Spanned<Expr>) -> Spanned<Expr> {
    expr(Expr::IfExpr {
        cond: boxed(cond),
        then_branch: boxed(a),
        else_branch: boxed(b),
    })
}

pub fn is_expr(e: Spanned<Expr>, type_name: &str) -> Spanned<Expr> {
    expr(Expr::Is {
        expr: boxed(e),
        type_name: type_name.to_string(),
    })
}

pub fn as_expr(e: Spanned<Expr>, type_name: &str) -> Spanned<Expr> {
    expr(Expr::As {
        expr: boxed(e),
        type_name: type_name.to_string(),
    })
}

pub fn inherited(method: Option<&str>, args: Vec<Spanned<Expr>>) -> Spanned<Expr> {
    expr(Expr::Inherited {
        method: method.map(str::to_string),
        args,
    })
}

pub fn new_object(class_name: &str, args: Vec<Spanned<Expr>>) -> Spanned<Expr> {
    expr(Expr::New {
        class_name: class_name.to_string(),
        args,
    })
}

// ============================================================================
// Statements
// ============================================================================

pub fn expr_stmt(e: Spanned<Expr>) -> Spanned<Stmt> {
    let pos = e.pos;
    Spanned::new(Stmt::Expr(e), pos)
}

pub fn var_decl(name: &str, ty: Option<&str>, init: Option<Spanned<Expr>>) -> Spanned<Stmt> {
    stmt(Stmt::Var {
        names: vec![name.to_string()],
        ty: ty.map(str::to_string),
        init,
    })
}

pub fn const_decl(name: &str, value: Spanned<Expr>) -> Spanned<Stmt> {
    stmt(Stmt::Const {
        name: name.to_string(),
        ty: None,
        value,
    })
}

pub fn assign(target: Spanned<Expr>, value: Spanned<Expr>) -> Spanned<Stmt> {
    compound_assign(target, AssignOp::Assign, value)
}

pub fn compound_assign(target: Spanned<Expr>, op: AssignOp, value: Spanned<Expr>) -> Spanned<Stmt> {
    stmt(Stmt::Assign { target, op, value })
}

pub fn block(stmts: Vec<Spanned<Stmt>>) -> Spanned<Stmt> {
    stmt(Stmt::Block(stmts))
}

pub fn if_stmt(cond: Spanned<Expr>, then_branch: Spanned<Stmt>, else_branch: Option<Spanned<Stmt>>) -> Spanned<Stmt> {
    stmt(Stmt::If {
        cond,
        then_branch: Box::new(then_branch),
        else_branch: else_branch.map(Box::new),
    })
}

pub fn while_stmt(cond: Spanned<Expr>, body: Spanned<Stmt>) -> Spanned<Stmt> {
    stmt(Stmt::While {
        cond,
        body: Box::new(body),
    })
}

pub fn repeat_stmt(body: Vec<Spanned<Stmt>>, until: Spanned<Expr>) -> Spanned<Stmt> {
    stmt(Stmt::Repeat { body, until })
}

pub fn for_to(var: &str, start: Spanned<Expr>, end: Spanned<Expr>, body: Spanned<Stmt>) -> Spanned<Stmt> {
    stmt(Stmt::For {
        var: var.to_string(),
        inline_var: true,
        start,
        end,
        direction: ForDirection::To,
        step: None,
        body: Box::new(body),
    })
}

pub fn for_in(var: &str, collection: Spanned<Expr>, body: Spanned<Stmt>) -> Spanned<Stmt> {
    stmt(Stmt::ForIn {
        var: var.to_string(),
        inline_var: true,
        collection,
        body: Box::new(body),
    })
}

pub fn case_stmt(
    subject: Spanned<Expr>,
    branches: Vec<(Vec<Spanned<Expr>>, Spanned<Stmt>)>,
    else_branch: Option<Vec<Spanned<Stmt>>>,
) -> Spanned<Stmt> {
    stmt(Stmt::Case {
        expr: subject,
        branches: branches
            .into_iter()
            .map(|(values, body)| CaseBranch {
                values,
                body: Box::new(body),
            })
            .collect(),
        else_branch,
    })
}

pub fn try_except(
    block: Vec<Spanned<Stmt>>,
    handlers: Vec<ExceptHandler>,
    default: Option<Vec<Spanned<Stmt>>>,
) -> Spanned<Stmt> {
    stmt(Stmt::Try {
        block,
        except: Some(ExceptClause { handlers, default }),
        finally: None,
    })
}

pub fn try_finally(block: Vec<Spanned<Stmt>>, finally: Vec<Spanned<Stmt>>) -> Spanned<Stmt> {
    stmt(Stmt::Try {
        block,
        except: None,
        finally: Some(finally),
    })
}

pub fn on(var: Option<&str>, class_name: &str, body: Spanned<Stmt>) -> ExceptHandler {
    ExceptHandler {
        var: var.map(str::to_string),
        class_name: class_name.to_string(),
        body: Box::new(body),
    }
}

pub fn raise(e: Option<Spanned<Expr>>) -> Spanned<Stmt> {
    stmt(Stmt::Raise(e))
}

pub fn exit(value: Option<Spanned<Expr>>) -> Spanned<Stmt> {
    stmt(Stmt::Exit(value))
}

pub fn println(args: Vec<Spanned<Expr>>) -> Spanned<Stmt> {
    expr_stmt(call("PrintLn", args))
}

// ============================================================================
// Declarations
// ============================================================================

pub fn param(name: &str, ty: &str) -> Param {
    Param {
        name: name.to_string(),
        ty: Some(ty.to_string()),
        mode: ParamMode::Value,
        default: None,
    }
}

pub fn var_param(name: &str, ty: &str) -> Param {
    Param {
        mode: ParamMode::Var,
        ..param(name, ty)
    }
}

pub fn lazy_param(name: &str, ty: &str) -> Param {
    Param {
        mode: ParamMode::Lazy,
        ..param(name, ty)
    }
}

pub fn default_param(name: &str, ty: &str, default: Spanned<Expr>) -> Param {
    Param {
        default: Some(default),
        ..param(name, ty)
    }
}

/// Fluent builder for function declarations
pub struct FunctionBuilder {
    decl: FunctionDecl,
}

pub fn function(name: &str, params: Vec<Param>, return_type: Option<&str>) -> FunctionBuilder {
    FunctionBuilder {
        decl: FunctionDecl {
            name: name.to_string(),
            params,
            return_type: return_type.map(str::to_string),
            body: None,
            pre: Vec::new(),
            post: Vec::new(),
            class_name: None,
            flags: MethodFlags::default(),
        },
    }
}

impl FunctionBuilder {
    pub fn body(mut self, body: Vec<Spanned<Stmt>>) -> Self {
        self.decl.body = Some(body);
        self
    }

    pub fn requires(mut self, test: Spanned<Expr>) -> Self {
        self.decl.pre.push(Condition { test, message: None });
        self
    }

    pub fn requires_msg(mut self, test: Spanned<Expr>, message: Spanned<Expr>) -> Self {
        self.decl.pre.push(Condition {
            test,
            message: Some(message),
        });
        self
    }

    pub fn ensures(mut self, test: Spanned<Expr>) -> Self {
        self.decl.post.push(Condition { test, message: None });
        self
    }

    pub fn method_of(mut self, class_name: &str) -> Self {
        self.decl.class_name = Some(class_name.to_string());
        self
    }

    pub fn constructor(mut self) -> Self {
        self.decl.flags.constructor = true;
        self
    }

    pub fn class_method(mut self) -> Self {
        self.decl.flags.class_method = true;
        self
    }

    pub fn virtual_method(mut self) -> Self {
        self.decl.flags.is_virtual = true;
        self
    }

    pub fn build(self) -> FunctionDecl {
        self.decl
    }

    pub fn stmt(self) -> Spanned<Stmt> {
        stmt(Stmt::Function(self.decl))
    }
}

pub fn field(name: &str, ty: &str) -> FieldDecl {
    FieldDecl {
        name: name.to_string(),
        ty: ty.to_string(),
        init: None,
        class_var: false,
    }
}

pub fn class_decl(name: &str, parent: Option<&str>, fields: Vec<FieldDecl>, methods: Vec<FunctionDecl>) -> ClassDecl {
    ClassDecl {
        name: name.to_string(),
        parent: parent.map(str::to_string),
        interfaces: Vec::new(),
        fields,
        methods: methods
            .into_iter()
            .map(|mut m| {
                m.class_name = Some(name.to_string());
                m
            })
            .collect(),
        properties: Vec::new(),
    }
}

pub fn enum_decl(name: &str, members: &[&str]) -> Spanned<Stmt> {
    stmt(Stmt::Enum(EnumDecl {
        name: name.to_string(),
        members: members
            .iter()
            .map(|m| EnumMember {
                name: m.to_string(),
                value: None,
            })
            .collect(),
        scoped: false,
    }))
}
