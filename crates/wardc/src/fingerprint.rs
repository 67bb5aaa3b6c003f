use crate::ast::{Expr, ExprKind, Literal, Name};

/// Structural hash that agrees with `Expr`'s equality: constant-valued nodes
/// hash by value only.
pub(crate) fn stable_fingerprint(expr: &Expr) -> u128 {
    const FNV_OFFSET_BASIS: u128 = 0x6c62272e07bb014262b821756295c58d;
    const FNV_PRIME: u128 = 0x0000000001000000000000000000013b;

    fn write_bytes(mut h: u128, bytes: &[u8]) -> u128 {
        for b in bytes {
            h ^= *b as u128;
            h = h.wrapping_mul(FNV_PRIME);
        }
        h
    }

    fn write_str(h: u128, s: &str) -> u128 {
        let len: u32 = s.len() as u32;
        let h = write_bytes(h, &len.to_le_bytes());
        write_bytes(h, s.as_bytes())
    }

    fn go(mut h: u128, e: &Expr) -> u128 {
        if let Some(v) = e.const_value {
            h = write_bytes(h, &[0x01]);
            return write_bytes(h, &v.to_le_bytes());
        }
        match &e.kind {
            ExprKind::Literal(lit) => {
                h = write_bytes(h, &[0x02]);
                match lit {
                    Literal::Number(v) => write_bytes(h, &v.to_le_bytes()),
                    Literal::Bool(v) => write_bytes(h, &[*v as u8]),
                    Literal::Nullptr => write_bytes(h, b"nullptr"),
                    Literal::Ok => write_bytes(h, b"ok"),
                    Literal::Status(s) => {
                        h = write_str(h, s.pkg.as_deref().unwrap_or(""));
                        write_str(h, &s.msg)
                    }
                }
            }
            ExprKind::Ident(name) => {
                h = write_bytes(h, &[0x03]);
                match name {
                    Name::This => write_bytes(h, &[0]),
                    Name::Args => write_bytes(h, &[1]),
                    Name::CoroutineResumed => write_bytes(h, &[2]),
                    Name::Local(s) => write_str(write_bytes(h, &[3]), s),
                    Name::Global(s) => write_str(write_bytes(h, &[4]), s),
                }
            }
            ExprKind::Unary { op, rhs } => {
                h = write_bytes(h, &[0x04, *op as u8]);
                go(h, rhs)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                h = write_bytes(h, &[0x05, *op as u8]);
                h = go(h, lhs);
                go(h, rhs)
            }
            ExprKind::Associative { op, args } => {
                h = write_bytes(h, &[0x06, *op as u8]);
                let len: u32 = args.len() as u32;
                h = write_bytes(h, &len.to_le_bytes());
                for a in args {
                    h = go(h, a);
                }
                h
            }
            ExprKind::Call { recv, method, args } => {
                h = write_bytes(h, &[0x07]);
                h = go(h, recv);
                h = write_str(h, method);
                let len: u32 = args.len() as u32;
                h = write_bytes(h, &len.to_le_bytes());
                for a in args {
                    h = write_str(h, &a.name);
                    h = go(h, &a.value);
                }
                h
            }
            ExprKind::Index { lhs, index } => {
                h = write_bytes(h, &[0x08]);
                h = go(h, lhs);
                go(h, index)
            }
            ExprKind::Slice { lhs, lo, hi } => {
                h = write_bytes(h, &[0x09]);
                h = go(h, lhs);
                for bound in [lo, hi] {
                    h = match bound {
                        Some(b) => go(write_bytes(h, &[1]), b),
                        None => write_bytes(h, &[0]),
                    };
                }
                h
            }
            ExprKind::Member { lhs, field } => {
                h = write_bytes(h, &[0x0a]);
                h = go(h, lhs);
                write_str(h, field)
            }
            ExprKind::Cast { lhs, target } => {
                h = write_bytes(h, &[0x0b]);
                h = go(h, lhs);
                write_str(h, &target.to_string())
            }
        }
    }

    let mut h = FNV_OFFSET_BASIS;
    h = h.wrapping_mul(FNV_PRIME);
    go(h, expr)
}

#[cfg(test)]
mod tests {
    use super::stable_fingerprint;
    use crate::ast::{BinaryOp, Expr, ExprKind};
    use crate::types::TypeExpr;

    #[test]
    fn folded_and_literal_constants_share_a_fingerprint() {
        let two = Expr::number(2, TypeExpr::Ideal);
        let folded = Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Plus,
                lhs: Box::new(two.clone()),
                rhs: Box::new(two),
            },
            TypeExpr::Ideal,
        )
        .with_const(4);
        assert_eq!(
            stable_fingerprint(&folded),
            stable_fingerprint(&Expr::number(4, TypeExpr::Ideal))
        );
    }

    #[test]
    fn distinct_locals_hash_differently() {
        let a = Expr::local("a", TypeExpr::u64());
        let b = Expr::local("b", TypeExpr::u64());
        assert_ne!(stable_fingerprint(&a), stable_fingerprint(&b));
    }
}
