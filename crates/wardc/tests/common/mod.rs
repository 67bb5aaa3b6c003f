#![allow(dead_code)]

use wardc::ast::{
    Arg, AssignOp, BinaryOp, Effect, Expr, ExprKind, IfStmt, Literal, LoopId, Name, RetKeyword,
    StatusRef, Stmt, StmtKind, WhileStmt,
};
use wardc::compile::{CompileOptions, CompilerError};
use wardc::facts::FactStore;
use wardc::program::{FieldDecl, FuncDef, Package, Param, StatusDecl, StructDecl};
use wardc::types::{NumType, TypeExpr};

pub fn u8t() -> TypeExpr {
    TypeExpr::Num(NumType::U8)
}

pub fn u32t() -> TypeExpr {
    TypeExpr::Num(NumType::U32)
}

pub fn u64t() -> TypeExpr {
    TypeExpr::Num(NumType::U64)
}

pub fn local(name: &str, ty: TypeExpr) -> Expr {
    Expr::local(name, ty)
}

pub fn num(v: i128) -> Expr {
    Expr::number(v, TypeExpr::Ideal)
}

pub fn this(recv: &str) -> Expr {
    Expr::new(
        ExprKind::Ident(Name::This),
        TypeExpr::Ptr(Box::new(TypeExpr::named(recv))),
    )
}

pub fn this_field(recv: &str, field: &str, ty: TypeExpr) -> Expr {
    Expr::new(
        ExprKind::Member {
            lhs: Box::new(this(recv)),
            field: field.to_string(),
        },
        ty,
    )
}

pub fn args_field(name: &str, ty: TypeExpr) -> Expr {
    Expr::new(
        ExprKind::Member {
            lhs: Box::new(Expr::new(ExprKind::Ident(Name::Args), TypeExpr::EmptyStruct)),
            field: name.to_string(),
        },
        ty,
    )
}

pub fn src() -> Expr {
    args_field("src", TypeExpr::IoReader)
}

pub fn dst() -> Expr {
    args_field("dst", TypeExpr::IoWriter)
}

pub fn call(recv: Expr, method: &str, args: Vec<(&str, Expr)>, ty: TypeExpr, effect: Effect) -> Expr {
    Expr::new(
        ExprKind::Call {
            recv: Box::new(recv),
            method: method.to_string(),
            args: args
                .into_iter()
                .map(|(name, value)| Arg {
                    name: name.to_string(),
                    value,
                })
                .collect(),
        },
        ty,
    )
    .with_effect(effect)
}

/// `recv.method?()` on an I/O buffer.
pub fn io_q(recv: Expr, method: &str, ty: TypeExpr) -> Expr {
    call(recv, method, Vec::new(), ty, Effect::Coroutine)
}

pub fn length(recv: Expr) -> Expr {
    call(recv, "length", Vec::new(), u64t(), Effect::Pure)
}

pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, ty: TypeExpr) -> Expr {
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        ty,
    )
}

pub fn cmp(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    binary(op, lhs, rhs, TypeExpr::Bool)
}

/// `recv.length() >= k`
pub fn len_ge(recv: Expr, k: i128) -> Expr {
    cmp(BinaryOp::GreaterEq, length(recv), Expr::number(k, u64t()))
}

pub fn const_true() -> Expr {
    Expr::new(ExprKind::Literal(Literal::Bool(true)), TypeExpr::Bool).with_const(1)
}

pub fn status(msg: &str) -> Expr {
    Expr::new(
        ExprKind::Literal(Literal::Status(StatusRef {
            pkg: None,
            msg: msg.to_string(),
        })),
        TypeExpr::Status,
    )
}

pub fn base_status(msg: &str) -> Expr {
    Expr::new(
        ExprKind::Literal(Literal::Status(StatusRef {
            pkg: Some("base".to_string()),
            msg: msg.to_string(),
        })),
        TypeExpr::Status,
    )
}

pub fn stmt(kind: StmtKind) -> Stmt {
    Stmt::new(kind)
}

pub fn var(name: &str, ty: TypeExpr) -> Stmt {
    stmt(StmtKind::Var {
        name: name.to_string(),
        ty,
    })
}

pub fn assign(op: AssignOp, lhs: Expr, rhs: Expr) -> Stmt {
    stmt(StmtKind::Assign {
        op,
        lhs: Some(lhs),
        rhs,
    })
}

pub fn set(lhs: Expr, rhs: Expr) -> Stmt {
    assign(AssignOp::Eq, lhs, rhs)
}

/// An expression statement such as `this.take?(n: 4)`.
pub fn eval(rhs: Expr) -> Stmt {
    stmt(StmtKind::Assign {
        op: AssignOp::Eq,
        lhs: None,
        rhs,
    })
}

pub fn ret(keyword: RetKeyword, value: Option<Expr>) -> Stmt {
    stmt(StmtKind::Ret {
        keyword,
        value,
        rets_error: false,
    })
}

pub fn if_(condition: Expr, body_if_true: Vec<Stmt>) -> IfStmt {
    IfStmt {
        condition,
        likelihood: None,
        body_if_true,
        body_if_false: Vec::new(),
        else_if: None,
    }
}

pub fn while_(id: LoopId, condition: Expr, body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::While(WhileStmt {
        id,
        condition,
        body,
    }))
}

pub fn jump(keyword: wardc::ast::JumpKeyword, target: LoopId) -> Stmt {
    stmt(StmtKind::Jump { keyword, target })
}

pub fn param(name: &str, ty: TypeExpr) -> Param {
    Param {
        name: name.to_string(),
        ty,
    }
}

pub fn func(receiver: &str, name: &str, effect: Effect, args: Vec<Param>, body: Vec<Stmt>) -> FuncDef {
    FuncDef {
        receiver: receiver.to_string(),
        name: name.to_string(),
        effect,
        public: false,
        choosy: false,
        args,
        out: None,
        preconditions: Vec::new(),
        body,
    }
}

/// `decoder.decode?(src: base.io_reader)` with the given body.
pub fn decode(body: Vec<Stmt>) -> FuncDef {
    func(
        "decoder",
        "decode",
        Effect::Coroutine,
        vec![param("src", TypeExpr::IoReader)],
        body,
    )
}

/// Package `demo` with a `decoder` struct and one public error status.
pub fn package(funcs: Vec<FuncDef>) -> Package {
    Package {
        name: "demo".to_string(),
        statuses: vec![StatusDecl {
            msg: "#bad header".to_string(),
            public: true,
        }],
        consts: Vec::new(),
        structs: vec![StructDecl {
            name: "decoder".to_string(),
            fields: vec![
                FieldDecl {
                    name: "x".to_string(),
                    ty: u32t(),
                    private_data: false,
                },
                FieldDecl {
                    name: "table".to_string(),
                    ty: TypeExpr::Array {
                        len: 4,
                        elem: Box::new(u8t()),
                        read_only: false,
                    },
                    private_data: false,
                },
                FieldDecl {
                    name: "history".to_string(),
                    ty: TypeExpr::Array {
                        len: 32,
                        elem: Box::new(u8t()),
                        read_only: false,
                    },
                    private_data: true,
                },
            ],
        }],
        funcs,
    }
}

/// Lowers the body of `f` (which must be in `pkg`) with `facts` known on entry.
pub fn lower_with(
    pkg: &Package,
    f: &FuncDef,
    facts: FactStore,
    options: &CompileOptions,
) -> Result<String, CompilerError> {
    wardc::c_emit::emit_function_body(pkg, f, facts, options)
}

pub fn lower(f: FuncDef, facts: Vec<Expr>) -> Result<String, CompilerError> {
    let pkg = package(vec![f.clone()]);
    lower_with(&pkg, &f, facts.into_iter().collect(), &CompileOptions::default())
}

/// Lines with their indentation stripped, blank lines dropped.
pub fn normalize(c: &str) -> Vec<String> {
    c.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Asserts that `expected` appears as a run of consecutive lines of `c`.
#[track_caller]
pub fn assert_lines(c: &str, expected: &[&str]) {
    let got = normalize(c);
    let found = got
        .windows(expected.len())
        .any(|w| w.iter().zip(expected).all(|(a, b)| a == b));
    assert!(found, "expected lines:\n{}\n\nin:\n{c}", expected.join("\n"));
}
