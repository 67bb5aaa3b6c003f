//! Bounds reasoning over the fact store.
//!
//! An "advance" moves an I/O or slice cursor forward. It is proven safe when
//! the receiver is a slice with statically known bounds that cover it, or
//! when some fact `receiver.length() >= K` (or `>`/`==`) with constant `K`
//! covers it. A committed advance rewrites those facts so later queries see
//! the smaller remaining length.

use tracing::trace;

use crate::ast::{BinaryOp, Expr, ExprKind};
use crate::compile::{CompileErrorKind, CompilerError};
use crate::facts::{FactStore, FactUpdate};
use crate::types::{NumType, TypeExpr};

#[derive(Debug, Clone, Copy)]
pub enum Advance<'a> {
    Const(i128),
    /// A run-time amount such as `n` in `skip?(n: n)`.
    Expr(&'a Expr),
}

impl<'a> Advance<'a> {
    /// Constant advance when `e` folded to a value, otherwise symbolic.
    pub fn of(e: &'a Expr) -> Self {
        match e.const_value {
            Some(v) => Advance::Const(v),
            None => Advance::Expr(e),
        }
    }
}

/// Whether advancing `receiver` by `advance` is provably in bounds. Never
/// touches the store. Fails exactly when [`commit_advance`] would on the
/// same store.
pub fn provable(
    facts: &FactStore,
    receiver: &Expr,
    advance: Advance<'_>,
) -> Result<bool, CompilerError> {
    let mut ok = slice_shortcut(receiver, advance);
    for fact in facts.iter() {
        decide(fact, receiver, advance, false, &mut ok)?;
    }
    Ok(ok)
}

/// Commits an advance: matching facts are shrunk by a constant amount,
/// dropped when they no longer cover it, and dropped outright for a
/// symbolic amount. Returns whether the advance was proven.
pub fn commit_advance(
    facts: &mut FactStore,
    receiver: &Expr,
    advance: Advance<'_>,
) -> Result<bool, CompilerError> {
    optimize_io_method_advance(facts, receiver, advance, true)
}

pub fn optimize_io_method_advance(
    facts: &mut FactStore,
    receiver: &Expr,
    advance: Advance<'_>,
    update: bool,
) -> Result<bool, CompilerError> {
    if !update {
        return provable(facts, receiver, advance);
    }
    let mut ok = slice_shortcut(receiver, advance);
    facts.update(|fact| decide(fact, receiver, advance, true, &mut ok))?;
    trace!(receiver = %receiver, proven = ok, "io method advance");
    Ok(ok)
}

/// `a[i .. j]` with `i` and `j` constant, or `j == i + c`.
fn slice_shortcut(receiver: &Expr, advance: Advance<'_>) -> bool {
    let Advance::Const(advance) = advance else {
        return false;
    };
    let Some((_, i, j)) = receiver.as_slice() else {
        return false;
    };
    let icv = match i {
        None => Some(0),
        Some(i) => i.const_value,
    };
    let jcv = j.and_then(|j| j.const_value);

    if let (Some(icv), Some(jcv)) = (icv, jcv) {
        return jcv.checked_sub(icv).is_some_and(|n| n >= advance);
    }

    if let (Some(i), Some(j)) = (i, j) {
        if let ExprKind::Binary {
            op: BinaryOp::Plus,
            lhs,
            rhs,
        } = &j.kind
        {
            let n = if **lhs == *i {
                rhs.const_value
            } else if **rhs == *i {
                lhs.const_value
            } else {
                None
            };
            return n.is_some_and(|n| n >= advance);
        }
    }
    false
}

/// `recv` when `e` is `recv.length()`.
pub fn length_receiver(e: &Expr) -> Option<&Expr> {
    match e.as_call()? {
        (recv, "length", []) => Some(recv),
        _ => None,
    }
}

/// Whether `fact` has the shape `receiver.length() OP rhs` for one of the
/// comparison operators the propagator understands.
pub fn is_length_fact_of(fact: &Expr, receiver: &Expr) -> bool {
    match &fact.kind {
        ExprKind::Binary {
            op: BinaryOp::GreaterEq | BinaryOp::Greater | BinaryOp::EqEq,
            lhs,
            ..
        } => length_receiver(lhs).is_some_and(|r| r == receiver),
        _ => false,
    }
}

fn decide(
    fact: &Expr,
    receiver: &Expr,
    advance: Advance<'_>,
    update: bool,
    ok: &mut bool,
) -> Result<FactUpdate, CompilerError> {
    let ExprKind::Binary { op, lhs, rhs } = &fact.kind else {
        return Ok(FactUpdate::Keep);
    };
    if !length_receiver(lhs).is_some_and(|r| r == receiver) {
        return Ok(FactUpdate::Keep);
    }

    // Any length fact about the receiver that is not rewritten below is
    // stale once the cursor moves.
    let stale = if update {
        FactUpdate::Discard
    } else {
        FactUpdate::Keep
    };

    match advance {
        Advance::Const(advance) => {
            if !matches!(
                op,
                BinaryOp::GreaterEq | BinaryOp::Greater | BinaryOp::EqEq
            ) {
                return Ok(stale);
            }
            let Some(mut k) = rhs.const_value else {
                return Ok(stale);
            };
            if *op == BinaryOp::Greater {
                k = k.checked_add(1).ok_or_else(|| constant_error(fact))?;
            }
            if k < advance {
                return Ok(stale);
            }

            *ok = true;
            if !update {
                return Ok(FactUpdate::Keep);
            }

            let remaining = k.checked_sub(advance).ok_or_else(|| constant_error(fact))?;
            let ty = match &rhs.ty {
                TypeExpr::Num(n) => TypeExpr::Num(*n),
                _ => TypeExpr::Num(NumType::U64),
            };
            let mut out = Expr::new(
                ExprKind::Binary {
                    op: BinaryOp::GreaterEq,
                    lhs: lhs.clone(),
                    rhs: Box::new(Expr::number(remaining, ty)),
                },
                fact.ty.clone(),
            );
            out.effect = fact.effect;
            Ok(FactUpdate::Replace(out))
        }
        Advance::Expr(advance) => {
            if matches!(op, BinaryOp::GreaterEq | BinaryOp::Greater) {
                if let ExprKind::Cast { lhs: n, target } = &rhs.kind {
                    if **n == *advance && *target == TypeExpr::Num(NumType::U64) {
                        *ok = true;
                    }
                }
            }
            Ok(stale)
        }
    }
}

fn constant_error(fact: &Expr) -> CompilerError {
    CompilerError::new(
        CompileErrorKind::Internal,
        format!("cannot represent the adjusted constant of fact {fact}"),
    )
}

/// After an advance of `receiver`, drops every other fact that mentions it;
/// only the length facts the propagator just maintained stay valid.
pub fn forget_after_advance(facts: &mut FactStore, receiver: &Expr) {
    facts.retain(|f| is_length_fact_of(f, receiver) || !f.mentions(receiver));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Arg, Effect, Name};

    fn src() -> Expr {
        Expr::new(
            ExprKind::Member {
                lhs: Box::new(Expr::new(ExprKind::Ident(Name::Args), TypeExpr::EmptyStruct)),
                field: "src".to_string(),
            },
            TypeExpr::IoReader,
        )
    }

    fn length_of(recv: Expr) -> Expr {
        Expr::new(
            ExprKind::Call {
                recv: Box::new(recv),
                method: "length".to_string(),
                args: Vec::<Arg>::new(),
            },
            TypeExpr::u64(),
        )
    }

    fn cmp(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            TypeExpr::Bool,
        )
    }

    fn len_fact(op: BinaryOp, k: i128) -> Expr {
        cmp(op, length_of(src()), Expr::number(k, TypeExpr::u64()))
    }

    #[test]
    fn constant_fact_proves_and_commit_shrinks_it() {
        let mut facts: FactStore = [len_fact(BinaryOp::GreaterEq, 4)].into_iter().collect();
        assert!(provable(&facts, &src(), Advance::Const(4)).unwrap());
        assert!(!provable(&facts, &src(), Advance::Const(5)).unwrap());

        assert!(commit_advance(&mut facts, &src(), Advance::Const(3)).unwrap());
        let got: Vec<_> = facts.iter().cloned().collect();
        assert_eq!(got, vec![len_fact(BinaryOp::GreaterEq, 1)]);
    }

    #[test]
    fn greater_than_is_normalized_to_greater_eq() {
        let mut facts: FactStore = [len_fact(BinaryOp::Greater, 3)].into_iter().collect();
        assert!(provable(&facts, &src(), Advance::Const(4)).unwrap());
        commit_advance(&mut facts, &src(), Advance::Const(4)).unwrap();
        let got: Vec<_> = facts.iter().cloned().collect();
        assert_eq!(got, vec![len_fact(BinaryOp::GreaterEq, 0)]);
    }

    #[test]
    fn failed_commit_discards_insufficient_facts() {
        let mut facts: FactStore = [len_fact(BinaryOp::GreaterEq, 2)].into_iter().collect();
        assert!(!commit_advance(&mut facts, &src(), Advance::Const(4)).unwrap());
        assert!(facts.is_empty());
    }

    #[test]
    fn overflowing_constant_fails_queries_and_commits_alike() {
        let mut facts: FactStore = [len_fact(BinaryOp::Greater, i128::MAX)].into_iter().collect();
        let err = provable(&facts, &src(), Advance::Const(1)).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::Internal);
        let err = commit_advance(&mut facts, &src(), Advance::Const(1)).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::Internal);
        assert_eq!(facts.len(), 1);
    }

    #[test]
    fn unrelated_receivers_are_left_alone() {
        let other = Expr::local("r", TypeExpr::IoReader);
        let fact = cmp(
            BinaryOp::GreaterEq,
            length_of(other.clone()),
            Expr::number(8, TypeExpr::u64()),
        );
        let mut facts: FactStore = [fact.clone()].into_iter().collect();
        assert!(!commit_advance(&mut facts, &src(), Advance::Const(1)).unwrap());
        assert!(facts.contains(&fact));
        assert!(provable(&facts, &other, Advance::Const(8)).unwrap());
    }

    #[test]
    fn symbolic_advance_matches_cast_fact_and_discards_it() {
        let n = Expr::local("n", TypeExpr::Num(NumType::U32));
        let cast = Expr::new(
            ExprKind::Cast {
                lhs: Box::new(n.clone()),
                target: TypeExpr::u64(),
            },
            TypeExpr::u64(),
        );
        let mut facts: FactStore = [cmp(BinaryOp::GreaterEq, length_of(src()), cast)]
            .into_iter()
            .collect();
        assert!(provable(&facts, &src(), Advance::Expr(&n)).unwrap());
        assert!(commit_advance(&mut facts, &src(), Advance::Expr(&n)).unwrap());
        assert!(facts.is_empty());
        assert!(!provable(&facts, &src(), Advance::Expr(&n)).unwrap());
    }

    #[test]
    fn slice_with_constant_bounds_needs_no_facts() {
        let base = Expr::local("buf", TypeExpr::slice_u8());
        let slice = |lo: Option<Expr>, hi: Option<Expr>| {
            Expr::new(
                ExprKind::Slice {
                    lhs: Box::new(base.clone()),
                    lo: lo.map(Box::new),
                    hi: hi.map(Box::new),
                },
                TypeExpr::slice_u8(),
            )
        };
        let facts = FactStore::new();
        let s = slice(Some(Expr::number(2, TypeExpr::u64())), Some(Expr::number(6, TypeExpr::u64())));
        assert!(provable(&facts, &s, Advance::Const(4)).unwrap());
        assert!(!provable(&facts, &s, Advance::Const(5)).unwrap());

        let i = Expr::local("i", TypeExpr::u64());
        let j = Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Plus,
                lhs: Box::new(i.clone()),
                rhs: Box::new(Expr::number(8, TypeExpr::u64())),
            },
            TypeExpr::u64(),
        );
        let s = slice(Some(i), Some(j));
        assert!(provable(&facts, &s, Advance::Const(8)).unwrap());
        assert!(!provable(&facts, &s, Advance::Const(9)).unwrap());
    }

    #[test]
    fn forget_after_advance_keeps_length_facts_only() {
        let pos = cmp(
            BinaryOp::EqEq,
            Expr::new(
                ExprKind::Call {
                    recv: Box::new(src()),
                    method: "position".to_string(),
                    args: Vec::new(),
                },
                TypeExpr::u64(),
            )
            .with_effect(Effect::Pure),
            Expr::number(0, TypeExpr::u64()),
        );
        let mut facts: FactStore = [len_fact(BinaryOp::GreaterEq, 2), pos].into_iter().collect();
        forget_after_advance(&mut facts, &src());
        assert_eq!(facts.len(), 1);
        assert!(facts.contains(&len_fact(BinaryOp::GreaterEq, 2)));
    }
}
