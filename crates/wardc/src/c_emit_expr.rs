use crate::ast::{Arg, BinaryOp, Expr, ExprKind, Literal, Name, UnaryOp};
use crate::compile::CompilerError;
use crate::types::{NumType, TypeExpr};

use super::{budget, unsupported, Emitter};

fn binary_c_op(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::ModPlus => "+",
        BinaryOp::ModMinus => "-",
        BinaryOp::ModStar => "*",
        BinaryOp::ModShiftL => "<<",
        BinaryOp::NotEq => "!=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
        other => other.symbol(),
    }
}

/// Operand of a `x & MASK` cast that the target width makes redundant.
fn strip_redundant_mask<'e>(e: &'e Expr, target: NumType) -> &'e Expr {
    let mask = match target {
        NumType::U8 => 0xFF,
        NumType::U16 => 0xFFFF,
        NumType::U32 => 0xFFFF_FFFF,
        _ => return e,
    };
    if let ExprKind::Binary {
        op: BinaryOp::Amp,
        lhs,
        rhs,
    } = &e.kind
    {
        if rhs.const_value == Some(mask) {
            return lhs;
        }
        if lhs.const_value == Some(mask) {
            return rhs;
        }
    }
    e
}

impl<'a> Emitter<'a> {
    pub(super) fn expr(&self, e: &Expr, depth: u32) -> Result<String, CompilerError> {
        if depth > self.options.limits.max_expr_depth {
            return Err(budget("expression recursion depth too large".to_string()));
        }
        let depth = depth + 1;

        if let Some(cv) = e.const_value {
            if !matches!(e.kind, ExprKind::Literal(Literal::Status(_))) {
                return self.const_expr(e, cv);
            }
        }

        match &e.kind {
            ExprKind::Literal(lit) => match lit {
                Literal::Number(v) => self.const_expr(e, *v),
                Literal::Bool(b) => Ok(b.to_string()),
                Literal::Nullptr => Ok("NULL".to_string()),
                Literal::Ok => Ok("ward_base__make_status(NULL)".to_string()),
                Literal::Status(s) => Ok(format!("ward_base__make_status({})", self.status_cname(s)?)),
            },
            ExprKind::Ident(name) => self.ident_expr(name),
            ExprKind::Unary { op, rhs } => {
                let op = match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Minus => "-",
                    UnaryOp::Plus => "+",
                };
                Ok(format!("({op}{})", self.expr(rhs, depth)?))
            }
            ExprKind::Binary { op, lhs, rhs } => self.binary_expr(e, *op, lhs, rhs, depth),
            ExprKind::Associative { op, args } => {
                let c_op = match op.symbol() {
                    "and" => "&&",
                    "or" => "||",
                    s => s,
                };
                let mut parts = Vec::with_capacity(args.len());
                for a in args {
                    parts.push(self.expr(a, depth)?);
                }
                Ok(format!("({})", parts.join(&format!(" {c_op} "))))
            }
            ExprKind::Call { recv, method, args } => self.call_expr(e, recv, method, args, depth),
            ExprKind::Index { lhs, index } => {
                let l = self.expr(lhs, depth)?;
                let i = self.expr(index, depth)?;
                if lhs.ty.is_slice() {
                    Ok(format!("{l}.ptr[{i}]"))
                } else {
                    Ok(format!("{l}[{i}]"))
                }
            }
            ExprKind::Slice { lhs, lo, hi } => {
                self.slice_expr(lhs, lo.as_deref(), hi.as_deref(), depth)
            }
            ExprKind::Member { lhs, field } => self.member_expr(lhs, field, depth),
            ExprKind::Cast { lhs, target } => self.cast_expr(lhs, target, depth),
        }
    }

    fn const_expr(&self, e: &Expr, cv: i128) -> Result<String, CompilerError> {
        match &e.ty {
            TypeExpr::Num(_) | TypeExpr::Ideal => {
                if cv >= 0 {
                    Ok(format!("{cv}u"))
                } else {
                    Ok(cv.to_string())
                }
            }
            TypeExpr::Nullptr => Ok("NULL".to_string()),
            TypeExpr::Status => Ok("ward_base__make_status(NULL)".to_string()),
            TypeExpr::Bool => match cv {
                0 => Ok("false".to_string()),
                1 => Ok("true".to_string()),
                _ => Err(unsupported(format!("invalid bool constant value {cv} for {e}"))),
            },
            ty => Err(unsupported(format!(
                "cannot generate C expression for {e} constant of type {ty}"
            ))),
        }
    }

    fn ident_expr(&self, name: &Name) -> Result<String, CompilerError> {
        match name {
            Name::This => Ok("self".to_string()),
            Name::CoroutineResumed => match &self.func {
                Some(f) if f.is_coroutine() => {
                    Ok(format!("(self->private_impl.p_{} != 0)", f.def.name))
                }
                _ => Ok("false".to_string()),
            },
            Name::Local(n) => Ok(format!("v_{n}")),
            Name::Global(n) => Ok(format!("{}{}", self.pkg_macro_prefix(), n.to_ascii_uppercase())),
            Name::Args => Err(unsupported("cannot generate C expression for bare args".to_string())),
        }
    }

    /// Status operands of `==`/`<>` compare their message pointers.
    fn operand(&self, e: &Expr, op: BinaryOp, depth: u32) -> Result<String, CompilerError> {
        if e.ty == TypeExpr::Status && matches!(op, BinaryOp::EqEq | BinaryOp::NotEq) {
            if let Some(s) = e.status_literal() {
                return self.status_cname(s);
            }
            if e.is_ok_literal() {
                return Ok("NULL".to_string());
            }
            return Ok(format!("{}.repr", self.expr(e, depth)?));
        }
        self.expr(e, depth)
    }

    fn binary_expr(
        &self,
        e: &Expr,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        depth: u32,
    ) -> Result<String, CompilerError> {
        if matches!(op, BinaryOp::SatPlus | BinaryOp::SatMinus) {
            let bits = super::ctypes::uint_suffix(&e.ty)?;
            let f = if op == BinaryOp::SatPlus { "add" } else { "sub" };
            return Ok(format!(
                "ward_base__u{bits}__sat_{f}({}, {})",
                self.expr(lhs, depth)?,
                self.expr(rhs, depth)?
            ));
        }

        let overall_cast = e.ty.is_small_integer()
            || matches!(
                op,
                BinaryOp::ModPlus | BinaryOp::ModMinus | BinaryOp::ModStar | BinaryOp::ModShiftL
            );

        let mut l = self.operand(lhs, op, depth)?;
        if lhs.const_value.is_some()
            && matches!(op, BinaryOp::ShiftL | BinaryOp::ShiftR | BinaryOp::ModShiftL)
        {
            let ty = if lhs.ty == TypeExpr::Ideal { &e.ty } else { &lhs.ty };
            l = format!("(({})({l}))", self.c_type_name(ty)?);
        }
        let r = self.operand(rhs, op, depth)?;
        let body = format!("({l} {} {r})", binary_c_op(op));

        if overall_cast {
            Ok(format!("(({})({body}))", self.c_type_name(&e.ty)?))
        } else {
            Ok(body)
        }
    }

    fn slice_expr(
        &self,
        lhs: &Expr,
        lo: Option<&Expr>,
        hi: Option<&Expr>,
        depth: u32,
    ) -> Result<String, CompilerError> {
        let bound = |b: &Expr| -> Result<String, CompilerError> {
            match b.const_value {
                Some(v) => Ok(v.to_string()),
                None => self.expr(b, depth),
            }
        };

        match &lhs.ty {
            TypeExpr::Array { len, read_only, .. } => {
                let mut arr = self.expr(lhs, depth)?;
                if *read_only {
                    arr = format!("ward_base__strip_const_from_u8_ptr({arr})");
                }
                let hi = match hi {
                    Some(h) => bound(h)?,
                    None => len.to_string(),
                };
                match lo {
                    None => Ok(format!("ward_base__make_slice_u8({arr}, {hi})")),
                    Some(lo) => Ok(format!("ward_base__make_slice_u8_ij({arr}, {}, {hi})", bound(lo)?)),
                }
            }
            TypeExpr::Slice { .. } => {
                let s = self.expr(lhs, depth)?;
                match (lo, hi) {
                    (None, None) => Ok(s),
                    (Some(lo), None) => Ok(format!(
                        "ward_base__slice_u8__subslice_i({s}, {})",
                        self.expr(lo, depth)?
                    )),
                    (None, Some(hi)) => Ok(format!(
                        "ward_base__slice_u8__subslice_j({s}, {})",
                        self.expr(hi, depth)?
                    )),
                    (Some(lo), Some(hi)) => Ok(format!(
                        "ward_base__slice_u8__subslice_ij({s}, {}, {})",
                        self.expr(lo, depth)?,
                        self.expr(hi, depth)?
                    )),
                }
            }
            ty => Err(unsupported(format!("cannot slice a value of type {ty}"))),
        }
    }

    fn member_expr(&self, lhs: &Expr, field: &str, depth: u32) -> Result<String, CompilerError> {
        if matches!(lhs.kind, ExprKind::Ident(Name::Args)) {
            return Ok(format!("a_{field}"));
        }
        let l = self.expr(lhs, depth)?;
        let sep = if lhs.ty.is_pointer() { "->" } else { "." };
        let area = match lhs.ty.pointee() {
            TypeExpr::Named { pkg: None, name } if self.pkg.is_private_data_field(name, field) => {
                "private_data"
            }
            _ => "private_impl",
        };
        Ok(format!("{l}{sep}{area}.f_{field}"))
    }

    fn cast_expr(&self, lhs: &Expr, target: &TypeExpr, depth: u32) -> Result<String, CompilerError> {
        if target.is_pointer() {
            if !lhs.ty.is_slice() {
                return Err(unsupported(format!("cannot convert {lhs} to {target}")));
            }
            if let Some((base, None, None)) = lhs.as_slice() {
                if base.ty.is_array() {
                    return Ok(format!("&{}[0u]", self.expr(base, depth)?));
                }
            }
            return Ok(format!("{}.ptr", self.expr(lhs, depth)?));
        }

        let inner = match target.num() {
            Some(n) => strip_redundant_mask(lhs, n),
            None => lhs,
        };
        Ok(format!(
            "(({})({}))",
            self.c_type_name(target)?,
            self.expr(inner, depth)?
        ))
    }

    fn call_expr(
        &self,
        e: &Expr,
        recv: &Expr,
        method: &str,
        args: &[Arg],
        depth: u32,
    ) -> Result<String, CompilerError> {
        if let Some(s) = self.builtin_call_expr(e, recv, method, args, depth)? {
            return Ok(s);
        }

        let TypeExpr::Named { pkg, name } = recv.ty.pointee() else {
            return Err(unsupported(format!("cannot generate user-defined method call {e}")));
        };
        let pfx = match pkg {
            Some(p) => format!("ward_{p}__"),
            None => self.pkg_prefix(),
        };
        let by_ptr = recv.ty.is_pointer();

        if method == "reset"
            && (pkg.is_some() || self.pkg.find_func(name, "reset").is_none())
        {
            let r = self.expr(recv, depth)?;
            let addr = if by_ptr { r } else { format!("&{r}") };
            let flags = if recv.is_this_dot_foo() {
                "WARD_INITIALIZE__LEAVE_INTERNAL_BUFFERS_UNINITIALIZED"
            } else {
                "0"
            };
            return Ok(format!(
                "ward_private_impl__ignore_status({pfx}{name}__initialize({addr}, sizeof ({pfx}{name}), WARD_VERSION, {flags}))"
            ));
        }

        let mut parts = Vec::with_capacity(args.len() + 1);
        if !recv.ty.is_utility() {
            let r = self.expr(recv, depth)?;
            parts.push(if by_ptr { r } else { format!("&{r}") });
        }
        for a in args {
            parts.push(self.expr(&a.value, depth)?);
        }
        Ok(format!("{pfx}{name}__{method}({})", parts.join(", ")))
    }
}
