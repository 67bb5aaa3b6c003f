//! Checked AST consumed by the lowering engine.
//!
//! Every expression carries its resolved type and, when the checker could
//! fold it, its constant value. Equality between expressions is structural
//! except that two constant-valued nodes compare by value alone, so `2 + 2`
//! and `4` are the same expression as far as facts are concerned.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::TypeExpr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    #[default]
    Pure,
    Impure,
    Coroutine,
}

impl Effect {
    pub fn is_pure(&self) -> bool {
        *self == Effect::Pure
    }

    pub fn is_coroutine(&self) -> bool {
        *self == Effect::Coroutine
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: TypeExpr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub const_value: Option<i128>,
    #[serde(default, skip_serializing_if = "Effect::is_pure")]
    pub effect: Effect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKind {
    Literal(Literal),
    Ident(Name),
    Unary {
        op: UnaryOp,
        rhs: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Associative {
        op: AssocOp,
        args: Vec<Expr>,
    },
    Call {
        recv: Box<Expr>,
        method: String,
        #[serde(default)]
        args: Vec<Arg>,
    },
    Index {
        lhs: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        lhs: Box<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lo: Option<Box<Expr>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hi: Option<Box<Expr>>,
    },
    Member {
        lhs: Box<Expr>,
        field: String,
    },
    Cast {
        lhs: Box<Expr>,
        target: TypeExpr,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Number(i128),
    Bool(bool),
    Nullptr,
    Ok,
    Status(StatusRef),
}

/// A status literal such as `"#short read"` or `base."$short read"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatusRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkg: Option<String>,
    pub msg: String,
}

impl StatusRef {
    pub fn class(&self) -> Option<StatusClass> {
        StatusClass::of(&self.msg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Error,
    Suspension,
    Note,
}

impl StatusClass {
    pub fn of(msg: &str) -> Option<Self> {
        match msg.as_bytes().first()? {
            b'#' => Some(StatusClass::Error),
            b'$' => Some(StatusClass::Suspension),
            b'@' => Some(StatusClass::Note),
            _ => None,
        }
    }

    pub fn c_infix(self) -> &'static str {
        match self {
            StatusClass::Error => "error",
            StatusClass::Suspension => "suspension",
            StatusClass::Note => "note",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Name {
    This,
    Args,
    CoroutineResumed,
    Local(String),
    Global(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Plus,
    Minus,
    Star,
    Slash,
    ShiftL,
    ShiftR,
    Amp,
    Pipe,
    Hat,
    Percent,
    ModPlus,
    ModMinus,
    ModStar,
    ModShiftL,
    SatPlus,
    SatMinus,
    NotEq,
    Less,
    LessEq,
    EqEq,
    GreaterEq,
    Greater,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Star => "*",
            BinaryOp::Slash => "/",
            BinaryOp::ShiftL => "<<",
            BinaryOp::ShiftR => ">>",
            BinaryOp::Amp => "&",
            BinaryOp::Pipe => "|",
            BinaryOp::Hat => "^",
            BinaryOp::Percent => "%",
            BinaryOp::ModPlus => "~mod+",
            BinaryOp::ModMinus => "~mod-",
            BinaryOp::ModStar => "~mod*",
            BinaryOp::ModShiftL => "~mod<<",
            BinaryOp::SatPlus => "~sat+",
            BinaryOp::SatMinus => "~sat-",
            BinaryOp::NotEq => "<>",
            BinaryOp::Less => "<",
            BinaryOp::LessEq => "<=",
            BinaryOp::EqEq => "==",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::Greater => ">",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssocOp {
    Plus,
    Star,
    Amp,
    Pipe,
    Hat,
    And,
    Or,
}

impl AssocOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AssocOp::Plus => "+",
            AssocOp::Star => "*",
            AssocOp::Amp => "&",
            AssocOp::Pipe => "|",
            AssocOp::Hat => "^",
            AssocOp::And => "and",
            AssocOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    pub name: String,
    pub value: Expr,
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (self.const_value, other.const_value) {
            return a == b;
        }
        self.kind == other.kind
    }
}

impl Expr {
    pub fn new(kind: ExprKind, ty: TypeExpr) -> Self {
        Self {
            kind,
            ty,
            const_value: None,
            effect: Effect::Pure,
        }
    }

    pub fn number(value: i128, ty: TypeExpr) -> Self {
        Self {
            kind: ExprKind::Literal(Literal::Number(value)),
            ty,
            const_value: Some(value),
            effect: Effect::Pure,
        }
    }

    pub fn local(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self::new(ExprKind::Ident(Name::Local(name.into())), ty)
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effect = effect;
        self
    }

    pub fn with_const(mut self, value: i128) -> Self {
        self.const_value = Some(value);
        self
    }

    pub fn is_const_true(&self) -> bool {
        self.ty == TypeExpr::Bool && self.const_value == Some(1)
    }

    /// `recv.method(args)` parts when this is a call.
    pub fn as_call(&self) -> Option<(&Expr, &str, &[Arg])> {
        match &self.kind {
            ExprKind::Call { recv, method, args } => Some((recv, method.as_str(), args)),
            _ => None,
        }
    }

    /// Field name when this is `args.name`.
    pub fn as_args_field(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Member { lhs, field } if matches!(lhs.kind, ExprKind::Ident(Name::Args)) => {
                Some(field.as_str())
            }
            _ => None,
        }
    }

    pub fn is_this_dot_foo(&self) -> bool {
        matches!(&self.kind, ExprKind::Member { lhs, .. } if matches!(lhs.kind, ExprKind::Ident(Name::This)))
    }

    pub fn status_literal(&self) -> Option<&StatusRef> {
        match &self.kind {
            ExprKind::Literal(Literal::Status(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_ok_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Literal(Literal::Ok))
    }

    pub fn for_each_child<'e>(&'e self, mut f: impl FnMut(&'e Expr)) {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Ident(_) => {}
            ExprKind::Unary { rhs, .. } => f(rhs),
            ExprKind::Binary { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            ExprKind::Associative { args, .. } => args.iter().for_each(f),
            ExprKind::Call { recv, args, .. } => {
                f(recv);
                for a in args {
                    f(&a.value);
                }
            }
            ExprKind::Index { lhs, index } => {
                f(lhs);
                f(index);
            }
            ExprKind::Slice { lhs, lo, hi } => {
                f(lhs);
                if let Some(lo) = lo {
                    f(lo);
                }
                if let Some(hi) = hi {
                    f(hi);
                }
            }
            ExprKind::Member { lhs, .. } | ExprKind::Cast { lhs, .. } => f(lhs),
        }
    }

    /// Whether `other` occurs anywhere in this tree, this node included.
    pub fn mentions(&self, other: &Expr) -> bool {
        if self == other {
            return true;
        }
        let mut found = false;
        self.for_each_child(|c| {
            if !found && c.mentions(other) {
                found = true;
            }
        });
        found
    }

    pub fn any_node(&self, pred: &mut impl FnMut(&Expr) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        let mut found = false;
        self.for_each_child(|c| {
            if !found && c.any_node(pred) {
                found = true;
            }
        });
        found
    }

    /// Whether the tree reads an I/O buffer, whose contents can change
    /// across a suspension.
    pub fn touches_io(&self) -> bool {
        self.any_node(&mut |e| e.ty.is_io())
    }

    pub fn depth(&self) -> usize {
        let mut max = 0;
        self.for_each_child(|c| max = max.max(c.depth()));
        1 + max
    }

    /// Slice bounds when this is `lhs[lo .. hi]`.
    pub fn as_slice(&self) -> Option<(&Expr, Option<&Expr>, Option<&Expr>)> {
        match &self.kind {
            ExprKind::Slice { lhs, lo, hi } => Some((lhs, lo.as_deref(), hi.as_deref())),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(Literal::Number(v)) => write!(f, "{v}"),
            ExprKind::Literal(Literal::Bool(v)) => write!(f, "{v}"),
            ExprKind::Literal(Literal::Nullptr) => f.write_str("nullptr"),
            ExprKind::Literal(Literal::Ok) => f.write_str("ok"),
            ExprKind::Literal(Literal::Status(s)) => match &s.pkg {
                Some(pkg) => write!(f, "{pkg}.{:?}", s.msg),
                None => write!(f, "{:?}", s.msg),
            },
            ExprKind::Ident(Name::This) => f.write_str("this"),
            ExprKind::Ident(Name::Args) => f.write_str("args"),
            ExprKind::Ident(Name::CoroutineResumed) => f.write_str("coroutine_resumed"),
            ExprKind::Ident(Name::Local(n)) | ExprKind::Ident(Name::Global(n)) => f.write_str(n),
            ExprKind::Unary { op, rhs } => {
                let s = match op {
                    UnaryOp::Plus => "+",
                    UnaryOp::Minus => "-",
                    UnaryOp::Not => "not ",
                };
                write!(f, "{s}{rhs}")
            }
            ExprKind::Binary { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
            ExprKind::Associative { op, args } => {
                f.write_str("(")?;
                for (i, a) in args.iter().enumerate() {
                    if i != 0 {
                        write!(f, " {} ", op.symbol())?;
                    }
                    write!(f, "{a}")?;
                }
                f.write_str(")")
            }
            ExprKind::Call { recv, method, args } => {
                let mark = match self.effect {
                    Effect::Pure => "",
                    Effect::Impure => "!",
                    Effect::Coroutine => "?",
                };
                write!(f, "{recv}.{method}{mark}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", a.name, a.value)?;
                }
                f.write_str(")")
            }
            ExprKind::Index { lhs, index } => write!(f, "{lhs}[{index}]"),
            ExprKind::Slice { lhs, lo, hi } => {
                write!(f, "{lhs}[")?;
                if let Some(lo) = lo {
                    write!(f, "{lo} ")?;
                }
                f.write_str("..")?;
                if let Some(hi) = hi {
                    write!(f, " {hi}")?;
                }
                f.write_str("]")
            }
            ExprKind::Member { lhs, field } => write!(f, "{lhs}.{field}"),
            ExprKind::Cast { lhs, target } => write!(f, "({lhs} as {target})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePos {
    pub file: String,
    pub line: u32,
}

impl SourcePos {
    /// File name without any directory components.
    pub fn basename(&self) -> &str {
        let s = self.file.as_str();
        let s = s.rsplit('/').next().unwrap_or(s);
        s.rsplit('\\').next().unwrap_or(s)
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Checker-assigned identity of a `while` or `iterate` loop, unique within a function.
pub type LoopId = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<SourcePos>,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self { kind, pos: None }
    }

    pub fn at(mut self, file: &str, line: u32) -> Self {
        self.pos = Some(SourcePos {
            file: file.to_string(),
            line,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StmtKind {
    Assert {
        condition: Expr,
    },
    Assign {
        op: AssignOp,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lhs: Option<Expr>,
        rhs: Expr,
    },
    Choose {
        name: String,
        args: Vec<String>,
    },
    IoManip(IoManipStmt),
    If(IfStmt),
    Iterate(IterateStmt),
    Jump {
        keyword: JumpKeyword,
        target: LoopId,
    },
    Ret {
        keyword: RetKeyword,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Expr>,
        #[serde(default)]
        rets_error: bool,
    },
    Var {
        name: String,
        ty: TypeExpr,
    },
    While(WhileStmt),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignOp {
    Eq,
    EqQuestion,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    ShiftLEq,
    ShiftREq,
    AmpEq,
    PipeEq,
    HatEq,
    PercentEq,
    ModPlusEq,
    ModMinusEq,
    ModStarEq,
    ModShiftLEq,
    SatPlusEq,
    SatMinusEq,
}

impl AssignOp {
    /// The C spelling, `None` for the saturating forms which need a helper.
    pub fn c_op(self) -> Option<&'static str> {
        Some(match self {
            AssignOp::Eq | AssignOp::EqQuestion => " = ",
            AssignOp::PlusEq | AssignOp::ModPlusEq => " += ",
            AssignOp::MinusEq | AssignOp::ModMinusEq => " -= ",
            AssignOp::StarEq | AssignOp::ModStarEq => " *= ",
            AssignOp::SlashEq => " /= ",
            AssignOp::ShiftLEq | AssignOp::ModShiftLEq => " <<= ",
            AssignOp::ShiftREq => " >>= ",
            AssignOp::AmpEq => " &= ",
            AssignOp::PipeEq => " |= ",
            AssignOp::HatEq => " ^= ",
            AssignOp::PercentEq => " %= ",
            AssignOp::SatPlusEq | AssignOp::SatMinusEq => return None,
        })
    }

    /// Compound forms that C evaluates in `int` and then narrows.
    pub fn widens(self) -> bool {
        !matches!(
            self,
            AssignOp::Eq | AssignOp::EqQuestion | AssignOp::AmpEq | AssignOp::PipeEq | AssignOp::HatEq
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoManipKeyword {
    Bind,
    Limit,
    ForgetHistory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoManipStmt {
    pub keyword: IoManipKeyword,
    pub io: Expr,
    /// Bound slice for `io_bind`, limit for `io_limit`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg1: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_position: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Likelihood {
    Likely,
    Unlikely,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStmt {
    pub condition: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likelihood: Option<Likelihood>,
    pub body_if_true: Vec<Stmt>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub body_if_false: Vec<Stmt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub else_if: Option<Box<IfStmt>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterateAssign {
    pub name: String,
    pub rhs: Expr,
}

/// One `length:`/`advance:`/`unroll:` round of an `iterate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterateRound {
    pub length: u32,
    pub advance: u32,
    pub unroll: u32,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterateStmt {
    pub id: LoopId,
    pub assigns: Vec<IterateAssign>,
    /// First round plus its `else iterate` chain, in order.
    pub rounds: Vec<IterateRound>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhileStmt {
    pub id: LoopId,
    pub condition: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JumpKeyword {
    Break,
    Continue,
}

impl JumpKeyword {
    pub fn as_str(self) -> &'static str {
        match self {
            JumpKeyword::Break => "break",
            JumpKeyword::Continue => "continue",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetKeyword {
    Return,
    Yield,
}
