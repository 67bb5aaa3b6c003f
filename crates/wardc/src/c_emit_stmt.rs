use std::mem;

use crate::ast::{
    AssignOp, Expr, IfStmt, IterateStmt, JumpKeyword, Likelihood, LoopId, RetKeyword,
    StatusClass, Stmt, StmtKind, WhileStmt,
};
use crate::compile::CompilerError;
use crate::facts::FactStore;
use crate::types::TypeExpr;

use super::builtins::{io_c_name, IoBuiltin};
use super::ctypes::uint_suffix;
use super::{
    budget, internal, unsupported, Clobbers, Emitter, DISABLE_WCONVERSION_POP,
    DISABLE_WCONVERSION_PUSH,
};

/// Drops one pair of parentheses when they enclose the whole expression.
pub(super) fn trim_parens(s: &str) -> &str {
    let b = s.as_bytes();
    if b.len() < 2 || b[0] != b'(' || b[b.len() - 1] != b')' {
        return s;
    }
    let mut depth = 0usize;
    for (i, &c) in b.iter().enumerate() {
        match c {
            b'(' => depth += 1,
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && i != b.len() - 1 {
                    return s;
                }
            }
            _ => {}
        }
    }
    &s[1..s.len() - 1]
}

impl<'a> Emitter<'a> {
    pub(super) fn lower_block(&mut self, body: &[Stmt], depth: u32) -> Result<(), CompilerError> {
        for s in body {
            self.lower_stmt(s, depth)
                .map_err(|e| e.at(s.pos.as_ref()))?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, s: &Stmt, depth: u32) -> Result<(), CompilerError> {
        if depth > self.options.limits.max_body_depth {
            return Err(budget("body recursion depth too large".to_string()));
        }
        let depth = depth + 1;

        if let StmtKind::Assert { condition } = &s.kind {
            self.facts_mut()?.push(condition.clone());
            return Ok(());
        }

        let scoped = matches!(
            &s.kind,
            StmtKind::Assign { lhs: Some(_), rhs, .. } if rhs.effect.is_coroutine()
        );
        if scoped {
            self.open_block();
        }

        if self.options.genlinenum {
            if let Some(pos) = &s.pos {
                self.line(&format!("// {}:{}", pos.basename(), pos.line));
            }
        }

        match &s.kind {
            StmtKind::Assert { .. } | StmtKind::Var { .. } => {}
            StmtKind::Assign { op, lhs, rhs } => self.lower_assign(*op, lhs.as_ref(), rhs)?,
            StmtKind::Choose { name, args } => self.lower_choose(name, args)?,
            StmtKind::IoManip(n) => self.lower_io_manip(n, depth)?,
            StmtKind::If(n) => self.lower_if(n, depth)?,
            StmtKind::Iterate(n) => self.lower_iterate(n, depth)?,
            StmtKind::Jump { keyword, target } => self.lower_jump(*keyword, *target)?,
            StmtKind::Ret {
                keyword,
                value,
                rets_error,
            } => self.lower_ret(*keyword, value.as_ref(), *rets_error)?,
            StmtKind::While(n) => self.lower_while(n, depth)?,
        }

        if scoped {
            self.close_block();
        }
        Ok(())
    }

    /// Swaps in `facts` for the current function, returning the old set.
    pub(super) fn replace_facts(&mut self, facts: FactStore) -> Result<FactStore, CompilerError> {
        Ok(mem::replace(self.facts_mut()?, facts))
    }

    pub(super) fn write_susp_point(&mut self, maybe_suspend: bool) -> Result<(), CompilerError> {
        let max = self.options.limits.max_suspension_points;
        let st = self.cur_mut()?;
        st.susp_point += 1;
        if st.susp_point >= max {
            return Err(budget(
                "too many coroutine suspension points required".to_string(),
            ));
        }
        let n = st.susp_point;
        let macro_suffix = if maybe_suspend {
            st.has_goto_ok = true;
            "_MAYBE_SUSPEND"
        } else {
            ""
        };
        self.line(&format!(
            "WARD_BASE__COROUTINE_SUSPENSION_POINT{macro_suffix}({n});"
        ));
        Ok(())
    }

    /// Derived I/O values passed as arguments to `call`, with their
    /// direction.
    fn call_derived_vars(&self, call: &Expr) -> Result<Vec<(String, bool)>, CompilerError> {
        let Some((recv, method, args)) = call.as_call() else {
            return Ok(Vec::new());
        };
        if IoBuiltin::lookup(&recv.ty, method).is_some()
            || !matches!(recv.ty.pointee(), TypeExpr::Named { .. })
        {
            return Ok(Vec::new());
        }
        let st = self.cur()?;
        let mut out = Vec::new();
        for a in args {
            if !a.value.ty.is_io() {
                continue;
            }
            let name = io_c_name(&a.value)?;
            if let Some(&is_writer) = st.derived_vars.get(&name) {
                out.push((name, is_writer));
            }
        }
        Ok(out)
    }

    /// Publishes the local cursor of `x` back to its buffer.
    pub(super) fn write_save_derived_var(&mut self, x: &str, is_writer: bool) {
        let index = if is_writer { "wi" } else { "ri" };
        self.open(&format!("if ({x}) {{"));
        self.line(&format!(
            "{x}->meta.{index} = ((size_t)(iop_{x} - {x}->data.ptr));"
        ));
        self.close_block();
    }

    /// Re-derives the window pointers of `x` from its buffer.
    pub(super) fn write_load_derived_var(&mut self, x: &str, is_writer: bool) {
        self.open(&format!("if ({x}) {{"));
        self.line(&format!("io0_{x} = {x}->data.ptr;"));
        if is_writer {
            self.line(&format!("io1_{x} = io0_{x} + {x}->meta.wi;"));
            self.line(&format!("iop_{x} = io1_{x};"));
            self.line(&format!("io2_{x} = io0_{x} + {x}->data.len;"));
        } else {
            self.line(&format!("io1_{x} = io0_{x} + {x}->meta.ri;"));
            self.line(&format!("iop_{x} = io1_{x};"));
            self.line(&format!("io2_{x} = io0_{x} + {x}->meta.wi;"));
        }
        self.close_block();
    }

    fn lower_assign(&mut self, op: AssignOp, lhs: Option<&Expr>, rhs: &Expr) -> Result<(), CompilerError> {
        let derived = self.call_derived_vars(rhs)?;
        for (x, is_writer) in &derived {
            self.write_save_derived_var(x, *is_writer);
        }

        let mut prefix = "";
        let mut skip_rhs = false;
        let mut could_suspend = false;
        if rhs.effect.is_coroutine() {
            if self.write_builtin_question_call(rhs, lhs.is_some())? {
                skip_rhs = true;
            } else if op != AssignOp::EqQuestion {
                if lhs.is_some() {
                    return Err(unsupported(format!(
                        "cannot assign the result of {rhs} with {op:?}"
                    )));
                }
                if !self.cur()?.is_coroutine() {
                    return Err(unsupported(format!(
                        "cannot call {rhs} outside of a coroutine"
                    )));
                }
                self.write_susp_point(false)?;
                prefix = "status = ";
                could_suspend = true;
            }
        }

        self.assign1(op, lhs, rhs, skip_rhs, prefix)?;

        for (x, is_writer) in &derived {
            self.write_load_derived_var(x, *is_writer);
        }
        if could_suspend {
            self.open("if (status.repr) {");
            self.line("goto suspend;");
            self.close_block();
        }

        self.commit_fast_builtin(rhs)?;
        if !skip_rhs {
            let is_io_builtin = rhs
                .as_call()
                .is_some_and(|(recv, m, _)| IoBuiltin::lookup(&recv.ty, m).is_some());
            if !is_io_builtin {
                let mut c = Clobbers::default();
                c.walk_expr(rhs);
                c.apply(self.facts_mut()?);
            }
        }
        if let Some(lhs) = lhs {
            self.facts_mut()?.forget_mentions(lhs);
        }
        Ok(())
    }

    fn assign1(
        &mut self,
        op: AssignOp,
        lhs: Option<&Expr>,
        rhs: &Expr,
        skip_rhs: bool,
        prefix: &str,
    ) -> Result<(), CompilerError> {
        let mut open = String::new();
        let mut op_name = "";
        let mut closer = String::new();
        let mut lhs_s = String::new();
        let mut disable_wconversion = false;

        if let Some(lhs) = lhs {
            lhs_s = self.expr(lhs, 0)?;
            if lhs.ty.is_array() {
                open = "memcpy(".to_string();
                op_name = ", ";
                closer = format!(", sizeof({lhs_s}))");
            } else {
                match op {
                    AssignOp::EqQuestion => {
                        op_name = " = ";
                        let r = self.expr(rhs, 0)?;
                        let t = self.new_temp()?;
                        self.line(&format!("ward_base__status t_{t} = {r};"));
                    }
                    AssignOp::SatPlusEq | AssignOp::SatMinusEq => {
                        let bits = uint_suffix(&lhs.ty)?;
                        let f = if op == AssignOp::SatPlusEq { "add" } else { "sub" };
                        open = format!("ward_private_impl__u{bits}__sat_{f}_indirect(&");
                        op_name = ", ";
                        closer = ")".to_string();
                    }
                    _ => {
                        op_name = op
                            .c_op()
                            .ok_or_else(|| internal(format!("unrecognized operator {op:?}")))?;
                        disable_wconversion = lhs.ty.is_small_integer() && op.widens();
                    }
                }
            }
        }

        if disable_wconversion && !self.undo_writes(DISABLE_WCONVERSION_POP) {
            self.out.push_str(DISABLE_WCONVERSION_PUSH);
        }

        let mut s = format!("{prefix}{open}{lhs_s}{op_name}");
        let st = self.cur_mut()?;
        if st.temp_r != st.temp_w {
            if st.temp_r + 1 != st.temp_w {
                return Err(internal("temporary variable count out of sync".to_string()));
            }
            s.push_str(&format!("t_{}", st.temp_r));
            st.temp_r += 1;
        } else if !skip_rhs {
            s.push_str(&self.expr(rhs, 0)?);
        }
        s.push_str(&closer);
        if !s.is_empty() {
            self.line(&format!("{s};"));
        }

        if disable_wconversion {
            self.out.push_str(DISABLE_WCONVERSION_POP);
        }
        Ok(())
    }

    fn lower_if(&mut self, n: &IfStmt, depth: u32) -> Result<(), CompilerError> {
        let entry = self.cur()?.facts.clone();
        let mut after = entry.clone();
        Clobbers::of_if(n).apply(&mut after);

        if n.condition.is_const_true() && n.else_if.is_none() && n.body_if_false.is_empty() {
            self.lower_block(&n.body_if_true, depth)?;
            self.replace_facts(after)?;
            return Ok(());
        }

        let mut cur = n;
        let mut head = String::from("if (");
        loop {
            let (pre, post) = match cur.likelihood {
                Some(Likelihood::Likely) => ("WARD_BASE__LIKELY(", ")"),
                Some(Likelihood::Unlikely) => ("WARD_BASE__UNLIKELY(", ")"),
                None => ("", ""),
            };
            let cond = self.expr(&cur.condition, 0)?;
            self.open(&format!("{head}{pre}{}{post}) {{", trim_parens(&cond)));

            let mut inner = entry.clone();
            if cur.condition.const_value.is_none() {
                inner.push(cur.condition.clone());
            }
            self.replace_facts(inner)?;
            self.lower_block(&cur.body_if_true, depth)?;

            if !cur.body_if_false.is_empty() {
                self.reopen("} else {");
                self.replace_facts(entry.clone())?;
                self.lower_block(&cur.body_if_false, depth)?;
                break;
            }
            match cur.else_if.as_deref() {
                Some(next) => {
                    cur = next;
                    self.indent = self.indent.saturating_sub(1);
                    head = String::from("} else if (");
                }
                None => break,
            }
        }
        self.close_block();
        self.replace_facts(after)?;
        Ok(())
    }

    fn jump_target(&mut self, target: LoopId) -> Result<u32, CompilerError> {
        let max = self.options.limits.max_jump_targets;
        let st = self.cur_mut()?;
        if let Some(&jt) = st.jump_targets.get(&target) {
            return Ok(jt);
        }
        let jt = u32::try_from(st.jump_targets.len()).unwrap_or(u32::MAX);
        if jt >= max {
            return Err(budget("too many jump targets".to_string()));
        }
        st.jump_targets.insert(target, jt);
        Ok(jt)
    }

    fn lower_jump(&mut self, keyword: JumpKeyword, target: LoopId) -> Result<(), CompilerError> {
        let st = self.cur()?;
        let info = st
            .loops
            .get(&target)
            .copied()
            .ok_or_else(|| internal(format!("unknown jump target {target}")))?;
        let kw = keyword.as_str();
        if st.active_loops.last() == Some(&target) {
            self.line(&format!("{kw};"));
            return Ok(());
        }
        if info.is_iterate {
            return Err(unsupported(format!("cannot {kw} out of an iterate loop")));
        }
        let jt = self.jump_target(target)?;
        self.line(&format!("goto label__{jt}__{kw};"));
        Ok(())
    }

    fn lower_while(&mut self, n: &WhileStmt, depth: u32) -> Result<(), CompilerError> {
        let info = self.cur()?.loops.get(&n.id).copied().unwrap_or_default();

        let mut body: &[Stmt] = &n.body;
        let mut trivial = false;
        if n.condition.is_const_true() && !info.has_continue {
            if let Some((last, rest)) = body.split_last() {
                if matches!(
                    last.kind,
                    StmtKind::Jump { keyword: JumpKeyword::Break, target } if target == n.id
                ) {
                    body = rest;
                    trivial = true;
                }
            }
        }

        if info.deep_continue {
            let jt = self.jump_target(n.id)?;
            self.raw_line(&format!("label__{jt}__continue:;"));
        }

        let clobbers = Clobbers::of_block(&n.body);
        let entry = self.cur()?.facts.clone();
        let mut after = entry;
        clobbers.apply(&mut after);
        let mut inner = after.clone();
        if n.condition.const_value.is_none() {
            inner.push(n.condition.clone());
        }

        self.cur_mut()?.active_loops.push(n.id);
        if trivial {
            self.open("do {");
        } else {
            let cond = self.expr(&n.condition, 0)?;
            self.open(&format!("while ({}) {{", trim_parens(&cond)));
        }
        self.replace_facts(inner)?;
        self.lower_block(body, depth)?;
        self.indent = self.indent.saturating_sub(1);
        if trivial {
            self.line("} while (0);");
        } else {
            self.line("}");
        }
        self.cur_mut()?.active_loops.pop();
        self.replace_facts(after)?;

        if info.deep_break {
            let jt = self.jump_target(n.id)?;
            self.raw_line(&format!("label__{jt}__break:;"));
        }
        Ok(())
    }

    fn lower_iterate(&mut self, n: &IterateStmt, depth: u32) -> Result<(), CompilerError> {
        let Some(first) = n.assigns.first() else {
            return Ok(());
        };
        let name0 = first.name.as_str();

        let mut clobbers = Clobbers::default();
        for r in &n.rounds {
            clobbers.walk_block(&r.body);
        }
        let mut after = self.cur()?.facts.clone();
        clobbers.apply(&mut after);
        let mut inner = after.clone();
        for a in &n.assigns {
            inner.forget_mentions(&Expr::local(a.name.clone(), a.rhs.ty.clone()));
        }

        self.cur_mut()?.active_loops.push(n.id);
        self.open_block();
        for (i, a) in n.assigns.iter().enumerate() {
            let rhs = self.expr(&a.rhs, 0)?;
            let name = &a.name;
            self.line(&format!("ward_base__slice_u8 i_slice_{name} = {rhs};"));
            self.line(&format!("v_{name}.ptr = i_slice_{name}.ptr;"));
            if i > 0 {
                self.line(&format!(
                    "i_slice_{name0}.len = ((size_t)(ward_base__u64__min(i_slice_{name0}.len, i_slice_{name}.len)));"
                ));
            }
        }

        let mut round = 0u32;
        for r in &n.rounds {
            if r.length == 0 || r.advance == 0 || r.unroll == 0 {
                return Err(unsupported(format!(
                    "invalid iterate round (length: {}, advance: {}, unroll: {})",
                    r.length, r.advance, r.unroll
                )));
            }
            let mut unroll = r.unroll;
            loop {
                self.replace_facts(inner.clone())?;
                self.lower_iterate_round(n, &r.body, round, depth, r.length, r.advance, unroll)?;
                round += 1;
                if unroll == 1 {
                    break;
                }
                unroll = 1;
            }
        }

        for a in &n.assigns {
            self.line(&format!("v_{}.len = 0;", a.name));
        }
        self.close_block();
        self.cur_mut()?.active_loops.pop();
        self.replace_facts(after)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn lower_iterate_round(
        &mut self,
        n: &IterateStmt,
        body: &[Stmt],
        round: u32,
        depth: u32,
        length: u32,
        advance: u32,
        unroll: u32,
    ) -> Result<(), CompilerError> {
        let name0 = n.assigns.first().map(|a| a.name.as_str()).unwrap_or_default();
        for a in &n.assigns {
            self.line(&format!("v_{}.len = {length};", a.name));
        }

        let remaining = format!("(i_slice_{name0}.len - (size_t)(v_{name0}.ptr - i_slice_{name0}.ptr))");
        let tail = if length == 1 && advance == 1 && unroll == 1 {
            format!("i_slice_{name0}.ptr, i_slice_{name0}.len);")
        } else if length == advance {
            let k = u64::from(length) * u64::from(unroll);
            format!("v_{name0}.ptr, (({remaining} / {k}) * {k}));")
        } else {
            let total_len = u64::from(length) + u64::from(advance) * u64::from(unroll - 1);
            let total_adv = u64::from(advance) * u64::from(unroll);
            format!(
                "v_{name0}.ptr, ward_private_impl__iterate_total_advance({remaining}, {total_len}, {total_adv}));"
            )
        };
        self.line(&format!(
            "const uint8_t* i_end{round}_{name0} = ward_private_impl__ptr_u8_plus_len({tail}"
        ));

        self.open(&format!("while (v_{name0}.ptr < i_end{round}_{name0}) {{"));
        let entry = self.cur()?.facts.clone();
        for _ in 0..unroll {
            self.replace_facts(entry.clone())?;
            self.lower_block(body, depth)?;
            for a in &n.assigns {
                self.line(&format!("v_{}.ptr += {advance};", a.name));
            }
        }
        self.close_block();
        Ok(())
    }

    fn lower_ret(
        &mut self,
        keyword: RetKeyword,
        value: Option<&Expr>,
        rets_error: bool,
    ) -> Result<(), CompilerError> {
        let st = self.cur()?;
        let coroutine = st.is_coroutine();
        let def = st.def;

        if coroutine || (def.returns_status() && !st.derived_vars.is_empty()) {
            let ok_value = value.map_or(true, Expr::is_ok_literal);
            let class = value.and_then(|v| v.status_literal()).and_then(|s| s.class());
            let rendered = match value {
                Some(v) if !ok_value => self.expr(v, 0)?,
                _ => "ward_base__make_status(NULL)".to_string(),
            };
            self.line(&format!("status = {rendered};"));

            if keyword == RetKeyword::Yield {
                if !coroutine {
                    return Err(unsupported("cannot yield from a non-coroutine".to_string()));
                }
                self.write_susp_point(true)?;
                // The caller may refill or swap buffers before resuming.
                self.facts_mut()?.retain(|f| !f.touches_io());
                return Ok(());
            }

            if rets_error || class == Some(StatusClass::Error) {
                self.line("goto exit;");
            } else if ok_value || class == Some(StatusClass::Note) {
                self.cur_mut()?.has_goto_ok = true;
                self.line("goto ok;");
            } else {
                self.cur_mut()?.has_goto_ok = true;
                self.open("if (ward_base__status__is_error(&status)) {");
                self.line("goto exit;");
                self.reopen("} else if (ward_base__status__is_suspension(&status)) {");
                self.line("status = ward_base__make_status(ward_base__error__cannot_return_a_suspension);");
                self.line("goto exit;");
                self.close_block();
                self.line("goto ok;");
            }
            return Ok(());
        }

        if keyword == RetKeyword::Yield {
            return Err(unsupported("cannot yield from a non-coroutine".to_string()));
        }

        let write_backs: Vec<(String, bool)> = def
            .io_args()
            .filter_map(|p| {
                let name = format!("a_{}", p.name);
                st.derived_vars.get(&name).map(|w| (name, *w))
            })
            .collect();
        for (x, is_writer) in &write_backs {
            self.write_final_save_derived_var(x, *is_writer);
        }

        let rendered = match (&def.out, value) {
            (None, _) => "ward_base__make_empty_struct()".to_string(),
            (Some(_), None) => "ward_base__make_status(NULL)".to_string(),
            (Some(_), Some(v)) => {
                let r = self.expr(v, 0)?;
                let could_be_suspension = v.ty == TypeExpr::Status
                    && !rets_error
                    && !v.is_ok_literal()
                    && v
                        .status_literal()
                        .map_or(true, |s| s.class() == Some(StatusClass::Suspension));
                if could_be_suspension {
                    format!("ward_private_impl__status__ensure_not_a_suspension({r})")
                } else {
                    r
                }
            }
        };
        self.line(&format!("return {rendered};"));
        Ok(())
    }

    /// Write-back used on function exit: skips buffers without storage.
    pub(super) fn write_final_save_derived_var(&mut self, x: &str, is_writer: bool) {
        let index = if is_writer { "wi" } else { "ri" };
        self.open(&format!("if ({x} && {x}->data.ptr) {{"));
        self.line(&format!(
            "{x}->meta.{index} = ((size_t)(iop_{x} - {x}->data.ptr));"
        ));
        self.close_block();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_parens_only_strips_enclosing_pair() {
        assert_eq!(trim_parens("(a == b)"), "a == b");
        assert_eq!(trim_parens("(a) && (b)"), "(a) && (b)");
        assert_eq!(trim_parens("((a))"), "(a)");
        assert_eq!(trim_parens("x"), "x");
        assert_eq!(trim_parens("()"), "");
    }
}
