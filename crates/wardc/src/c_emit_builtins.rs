//! Built-in methods on I/O buffers, statuses, numbers and slices.

use tracing::trace;

use crate::ast::{Arg, Expr, ExprKind, Name};
use crate::compile::CompilerError;
use crate::optimize::{self, Advance};
use crate::types::TypeExpr;

use super::ctypes::uint_suffix;
use super::{budget, unsupported, Emitter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum IoBuiltinKind {
    /// `read_u8?`, `read_u16le?`, ...
    Read { bytes: u32, be: bool },
    /// `write_u8?`, `write_u16le?`, ...
    Write { bytes: u32, be: bool },
    /// `skip_u32?` and `skip?`.
    Skip { wide: bool },
    SkipFast,
    WriteU8Fast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct IoBuiltin {
    pub(super) kind: IoBuiltinKind,
}

fn width_suffix(method: &str, prefix: &str) -> Option<(u32, bool)> {
    let rest = method.strip_prefix(prefix)?;
    Some(match rest {
        "u8" => (1, false),
        "u16le" => (2, false),
        "u16be" => (2, true),
        "u32le" => (4, false),
        "u32be" => (4, true),
        "u64le" => (8, false),
        "u64be" => (8, true),
        _ => return None,
    })
}

impl IoBuiltin {
    /// Built-in cursor-moving method `method` on a value of type `ty`.
    pub(super) fn lookup(ty: &TypeExpr, method: &str) -> Option<Self> {
        let kind = match ty {
            TypeExpr::IoReader => match method {
                "skip_u32" => IoBuiltinKind::Skip { wide: false },
                "skip" => IoBuiltinKind::Skip { wide: true },
                "skip_u32_fast" => IoBuiltinKind::SkipFast,
                m => {
                    let (bytes, be) = width_suffix(m, "read_")?;
                    IoBuiltinKind::Read { bytes, be }
                }
            },
            TypeExpr::IoWriter => match method {
                "write_u8_fast" => IoBuiltinKind::WriteU8Fast,
                m => {
                    let (bytes, be) = width_suffix(m, "write_")?;
                    IoBuiltinKind::Write { bytes, be }
                }
            },
            _ => return None,
        };
        Some(Self { kind })
    }

    fn is_fast(self) -> bool {
        matches!(self.kind, IoBuiltinKind::SkipFast | IoBuiltinKind::WriteU8Fast)
    }
}

fn arg<'e>(args: &'e [Arg], name: &str) -> Result<&'e Expr, CompilerError> {
    args.iter()
        .find(|a| a.name == name)
        .map(|a| &a.value)
        .ok_or_else(|| unsupported(format!("missing argument {name:?}")))
}

/// `a_src` for `args.src`, `v_r` for a local `r`.
pub(super) fn io_c_name(io: &Expr) -> Result<String, CompilerError> {
    if let Some(field) = io.as_args_field() {
        return Ok(format!("a_{field}"));
    }
    if let ExprKind::Ident(Name::Local(n)) = &io.kind {
        return Ok(format!("v_{n}"));
    }
    Err(unsupported(format!("unsupported io expression {io}")))
}

fn peek_suffix(bytes: u32, be: bool) -> String {
    let bits = bytes * 8;
    if bytes == 1 {
        "u8be".to_string()
    } else if be {
        format!("u{bits}be")
    } else {
        format!("u{bits}le")
    }
}

impl<'a> Emitter<'a> {
    /// Renders a built-in method call that needs no statements of its own.
    /// `None` means `method` is not a built-in for this receiver.
    pub(super) fn builtin_call_expr(
        &self,
        call: &Expr,
        recv: &Expr,
        method: &str,
        args: &[Arg],
        depth: u32,
    ) -> Result<Option<String>, CompilerError> {
        match &recv.ty {
            TypeExpr::IoReader | TypeExpr::IoWriter => {
                if let Some(b) = IoBuiltin::lookup(&recv.ty, method) {
                    if !b.is_fast() {
                        return Err(unsupported(format!(
                            "cannot use {call} as a sub-expression"
                        )));
                    }
                }
                let x = io_c_name(recv)?;
                let dir = if recv.ty == TypeExpr::IoReader { "reader" } else { "writer" };
                Ok(Some(match method {
                    "length" => format!("((uint64_t)(io2_{x} - iop_{x}))"),
                    "is_closed" => format!("ward_private_impl__io_buffer__is_closed({x})"),
                    "position" => format!("ward_private_impl__io_{dir}__position({x}, iop_{x})"),
                    "skip_u32_fast" => {
                        format!("iop_{x} += {}", self.expr(arg(args, "actual")?, depth)?)
                    }
                    "write_u8_fast" => format!("*iop_{x}++ = {}", self.expr(arg(args, "a")?, depth)?),
                    m => match width_suffix(m, "peek_") {
                        Some((bytes, be)) if recv.ty == TypeExpr::IoReader => format!(
                            "ward_base__peek_{}__no_bounds_check(iop_{x})",
                            peek_suffix(bytes, be)
                        ),
                        _ => return Ok(None),
                    },
                }))
            }
            TypeExpr::Status => {
                let s = self.expr(recv, depth)?;
                Ok(match method {
                    "is_ok" | "is_error" | "is_suspension" | "is_note" | "is_complete" => {
                        Some(format!("ward_base__status__{method}(&{s})"))
                    }
                    _ => None,
                })
            }
            TypeExpr::Num(n) if !n.is_signed() => {
                let bits = uint_suffix(&recv.ty)?;
                let x = self.expr(recv, depth)?;
                Ok(match method {
                    "min" => Some(format!(
                        "ward_base__u{bits}__min({x}, {})",
                        self.expr(arg(args, "no_more_than")?, depth)?
                    )),
                    "max" => Some(format!(
                        "ward_base__u{bits}__max({x}, {})",
                        self.expr(arg(args, "no_less_than")?, depth)?
                    )),
                    "low_bits" => Some(format!(
                        "({x} & WARD_BASE__LOW_BITS_MASK__U{bits}({}))",
                        self.expr(arg(args, "n")?, depth)?
                    )),
                    _ => None,
                })
            }
            TypeExpr::Slice { .. } => {
                let s = self.expr(recv, depth)?;
                Ok(match method {
                    "length" => Some(format!("((uint64_t)({s}.len))")),
                    "copy_from_slice" => Some(format!(
                        "ward_private_impl__slice_u8__copy_from_slice({s}, {})",
                        self.expr(arg(args, "s")?, depth)?
                    )),
                    _ => None,
                })
            }
            TypeExpr::Array { len, .. } if method == "length" => {
                Ok(Some(format!("((uint64_t)({len}))")))
            }
            _ => Ok(None),
        }
    }

    /// Moves the fact store past a fast cursor builtin once its C has been
    /// written.
    pub(super) fn commit_fast_builtin(&mut self, call: &Expr) -> Result<(), CompilerError> {
        let Some((recv, method, args)) = call.as_call() else {
            return Ok(());
        };
        let Some(b) = IoBuiltin::lookup(&recv.ty, method) else {
            return Ok(());
        };
        let advance = match b.kind {
            IoBuiltinKind::SkipFast => Advance::of(arg(args, "worst_case")?),
            IoBuiltinKind::WriteU8Fast => Advance::Const(1),
            _ => return Ok(()),
        };
        let facts = self.facts_mut()?;
        optimize::commit_advance(facts, recv, advance)?;
        optimize::forget_after_advance(facts, recv);
        Ok(())
    }

    pub(super) fn new_temp(&mut self) -> Result<u32, CompilerError> {
        let max = self.options.limits.max_temps;
        let st = self.cur_mut()?;
        if st.temp_w >= max {
            return Err(budget("max temporaries exceeded".to_string()));
        }
        let n = st.temp_w;
        st.temp_w += 1;
        Ok(n)
    }

    /// Writes the statements for a `?` cursor builtin. Returns `false` when
    /// `call` is not one, leaving the output untouched. With `has_lhs` the
    /// value read is left in a fresh `t_N` temporary.
    pub(super) fn write_builtin_question_call(
        &mut self,
        call: &Expr,
        has_lhs: bool,
    ) -> Result<bool, CompilerError> {
        let Some((recv, method, args)) = call.as_call() else {
            return Ok(false);
        };
        if !call.effect.is_coroutine() {
            return Ok(false);
        }
        let Some(b) = IoBuiltin::lookup(&recv.ty, method) else {
            return Ok(false);
        };
        if b.is_fast() {
            return Ok(false);
        }
        if !self.cur()?.is_coroutine() {
            return Err(unsupported(format!(
                "cannot call {method}? outside of a coroutine"
            )));
        }
        let x = io_c_name(recv)?;

        match b.kind {
            IoBuiltinKind::Read { bytes, be } => {
                let proven = self.advance_or_suspend(recv, Advance::Const(i128::from(bytes)), &x, "short_read")?;
                trace!(io = %x, bytes, proven, "read builtin");
                if has_lhs {
                    let t = self.new_temp()?;
                    let bits = bytes * 8;
                    if bytes == 1 {
                        self.line(&format!("uint8_t t_{t} = *iop_{x}++;"));
                    } else {
                        self.line(&format!(
                            "uint{bits}_t t_{t} = ward_base__peek_{}__no_bounds_check(iop_{x});",
                            peek_suffix(bytes, be)
                        ));
                        self.line(&format!("iop_{x} += {bytes};"));
                    }
                } else {
                    self.line(&format!("iop_{x} += {bytes};"));
                }
            }
            IoBuiltinKind::Write { bytes, be } => {
                let a = self.expr(arg(args, "a")?, 0)?;
                self.advance_or_suspend(recv, Advance::Const(i128::from(bytes)), &x, "short_write")?;
                if bytes == 1 {
                    self.line(&format!("*iop_{x}++ = {a};"));
                } else {
                    self.line(&format!(
                        "ward_base__poke_{}__no_bounds_check(iop_{x}, {a});",
                        peek_suffix(bytes, be)
                    ));
                    self.line(&format!("iop_{x} += {bytes};"));
                }
            }
            IoBuiltinKind::Skip { wide } => {
                let n_expr = arg(args, "n")?;
                let n = self.expr(n_expr, 0)?;
                let proven = {
                    let facts = self.facts_mut()?;
                    let ok = optimize::commit_advance(facts, recv, Advance::of(n_expr))?;
                    optimize::forget_after_advance(facts, recv);
                    ok
                };
                if proven {
                    self.line(&format!("iop_{x} += {n};"));
                } else {
                    let fname = self.cur()?.def.name.clone();
                    let scratch = format!("self->private_data.s_{fname}.scratch");
                    let cast = if wide { "uint64_t" } else { "uint32_t" };
                    self.line(&format!("{scratch} = (({cast})({n}));"));
                    self.write_susp_point(false)?;
                    self.open(&format!("if ({scratch} > ((uint64_t)(io2_{x} - iop_{x}))) {{"));
                    self.line(&format!("{scratch} -= ((uint64_t)(io2_{x} - iop_{x}));"));
                    self.line(&format!("iop_{x} = io2_{x};"));
                    self.line("status = ward_base__make_status(ward_base__suspension__short_read);");
                    self.line("goto suspend;");
                    self.close_block();
                    self.line(&format!("iop_{x} += {scratch};"));
                    self.facts_mut()?.retain(|f| !f.touches_io());
                }
            }
            IoBuiltinKind::SkipFast | IoBuiltinKind::WriteU8Fast => return Ok(false),
        }
        Ok(true)
    }

    /// Commits a constant advance. When it cannot be proven, writes a
    /// suspension point and a short read or write check first.
    fn advance_or_suspend(
        &mut self,
        recv: &Expr,
        advance: Advance<'_>,
        x: &str,
        short: &str,
    ) -> Result<bool, CompilerError> {
        let proven = {
            let facts = self.facts_mut()?;
            let ok = optimize::commit_advance(facts, recv, advance)?;
            optimize::forget_after_advance(facts, recv);
            ok
        };
        if !proven {
            let k = match advance {
                Advance::Const(k) => k,
                Advance::Expr(_) => 0,
            };
            self.write_susp_point(false)?;
            self.open(&format!(
                "if (WARD_BASE__UNLIKELY(((uint64_t)(io2_{x} - iop_{x})) < {k}u)) {{"
            ));
            self.line(&format!(
                "status = ward_base__make_status(ward_base__suspension__{short});"
            ));
            self.line("goto suspend;");
            self.close_block();
            self.facts_mut()?.retain(|f| !f.touches_io());
        }
        Ok(proven)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_keyed_on_receiver_type() {
        assert_eq!(
            IoBuiltin::lookup(&TypeExpr::IoReader, "read_u32le").map(|b| b.kind),
            Some(IoBuiltinKind::Read { bytes: 4, be: false })
        );
        assert_eq!(IoBuiltin::lookup(&TypeExpr::IoWriter, "read_u8"), None);
        assert_eq!(
            IoBuiltin::lookup(&TypeExpr::IoWriter, "write_u64be").map(|b| b.kind),
            Some(IoBuiltinKind::Write { bytes: 8, be: true })
        );
        assert_eq!(IoBuiltin::lookup(&TypeExpr::u64(), "skip"), None);
    }

    #[test]
    fn io_names_follow_args_and_locals() {
        let local = Expr::local("r", TypeExpr::IoReader);
        assert_eq!(io_c_name(&local).unwrap(), "v_r");
        let other = Expr::number(3, TypeExpr::u64());
        assert!(io_c_name(&other).is_err());
    }
}
