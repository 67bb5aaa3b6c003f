//! Scoped I/O window blocks: `io_bind`, `io_limit` and `io_forget_history`.
//!
//! Each block saves the window pointers it is about to change into
//! `o_<N>_...` shadows and restores them on the way out. `N` is the block's
//! index within the function.

use crate::ast::{ExprKind, IoManipKeyword, IoManipStmt, Name};
use crate::compile::CompilerError;
use crate::types::TypeExpr;

use super::builtins::io_c_name;
use super::{budget, unsupported, Clobbers, Emitter};

struct Window {
    /// `reader` or `writer`, as in `ward_private_impl__io_reader__set`.
    c_typ: &'static str,
    /// Buffer field holding the window end.
    end: &'static str,
    qualifier: &'static str,
    is_writer: bool,
}

impl Window {
    fn of(ty: &TypeExpr) -> Option<Self> {
        match ty {
            TypeExpr::IoReader => Some(Self {
                c_typ: "reader",
                end: "meta.wi",
                qualifier: "const ",
                is_writer: false,
            }),
            TypeExpr::IoWriter => Some(Self {
                c_typ: "writer",
                end: "data.len",
                qualifier: "",
                is_writer: true,
            }),
            _ => None,
        }
    }
}

impl<'a> Emitter<'a> {
    pub(super) fn lower_io_manip(&mut self, n: &IoManipStmt, depth: u32) -> Result<(), CompilerError> {
        let max = self.options.limits.max_io_manips;
        let st = self.cur_mut()?;
        if st.io_manips >= max {
            return Err(budget("max io manipulation blocks exceeded".to_string()));
        }
        let num = st.io_manips;
        st.io_manips += 1;

        let x = io_c_name(&n.io)?;
        let w = Window::of(&n.io.ty)
            .ok_or_else(|| unsupported(format!("unsupported io expression {}", n.io)))?;
        let o = format!("o_{num}_");

        let entry = self.cur()?.facts.clone();
        let mut inner = entry.clone();
        inner.forget_mentions(&n.io);
        let mut after = entry;
        Clobbers::of_block(&n.body).apply(&mut after);
        after.forget_mentions(&n.io);

        self.open_block();
        match n.keyword {
            IoManipKeyword::Bind => self.enter_bind(n, &x, &o, &w)?,
            IoManipKeyword::ForgetHistory => self.enter_forget_history(num, &x, &o, &w)?,
            IoManipKeyword::Limit => self.enter_limit(n, &x, &o, &w)?,
        }

        self.replace_facts(inner)?;
        self.lower_block(&n.body, depth)?;

        match n.keyword {
            IoManipKeyword::Bind => {
                self.line(&format!("{x} = {o}{x};"));
                for p in ["iop", "io0", "io1", "io2"] {
                    self.line(&format!("{p}_{x} = {o}{p}_{x};"));
                }
            }
            IoManipKeyword::ForgetHistory => {
                self.open(&format!("if ({x}) {{"));
                self.line(&format!("memcpy({x}, &{o}{x}, sizeof(*{x}));"));
                self.line(&format!("{x}->meta.wi = ((size_t)(iop_{x} - {x}->data.ptr));"));
                self.line(&format!("io0_{x} = {o}io0_{x};"));
                self.line(&format!("io1_{x} = {o}io1_{x};"));
                self.close_block();
            }
            IoManipKeyword::Limit => {
                self.line(&format!("io2_{x} = {o}io2_{x};"));
                self.open(&format!("if ({x}) {{"));
                if !w.is_writer {
                    self.line(&format!("{x}->meta.closed = {o}closed_{x};"));
                }
                self.line(&format!(
                    "{x}->{} = ((size_t)(io2_{x} - {x}->data.ptr));",
                    w.end
                ));
                self.close_block();
            }
        }
        self.close_block();
        self.replace_facts(after)?;
        Ok(())
    }

    fn enter_bind(&mut self, n: &IoManipStmt, x: &str, o: &str, w: &Window) -> Result<(), CompilerError> {
        let ExprKind::Ident(Name::Local(name)) = &n.io.kind else {
            return Err(unsupported(format!(
                "io_bind needs a local io variable, got {}",
                n.io
            )));
        };
        let data = n
            .arg1
            .as_ref()
            .ok_or_else(|| unsupported("io_bind without data".to_string()))?;
        let data = self.expr(data, 0)?;
        let history = match &n.history_position {
            Some(h) => self.expr(h, 0)?,
            None => "0u".to_string(),
        };

        let q = w.qualifier;
        self.line(&format!("ward_base__io_buffer* {o}{x} = {x};"));
        for p in ["iop", "io0", "io1", "io2"] {
            self.line(&format!("{q}uint8_t* {o}{p}_{x} = {p}_{x};"));
        }
        self.line(&format!(
            "{x} = ward_private_impl__io_{}__set(&u_{name}, &iop_{x}, &io0_{x}, &io1_{x}, &io2_{x}, {data}, {history});",
            w.c_typ
        ));
        Ok(())
    }

    fn enter_forget_history(
        &mut self,
        num: u32,
        x: &str,
        o: &str,
        w: &Window,
    ) -> Result<(), CompilerError> {
        if !w.is_writer {
            return Err(unsupported(
                "unsupported io_forget_history for an io_reader".to_string(),
            ));
        }
        self.line(&format!("uint8_t* {o}io0_{x} = io0_{x};"));
        self.line(&format!("uint8_t* {o}io1_{x} = io1_{x};"));
        self.line(&format!("io0_{x} = iop_{x};"));
        self.line(&format!("io1_{x} = iop_{x};"));
        self.line(&format!("ward_base__io_buffer {o}{x};"));
        self.open(&format!("if ({x}) {{"));
        self.line(&format!("memcpy(&{o}{x}, {x}, sizeof(*{x}));"));
        self.line(&format!("size_t wi{num} = {x}->meta.wi;"));
        self.line(&format!("{x}->data.ptr += wi{num};"));
        self.line(&format!("{x}->data.len -= wi{num};"));
        self.line(&format!("{x}->meta.ri = 0;"));
        self.line(&format!("{x}->meta.wi = 0;"));
        self.line(&format!(
            "{x}->meta.pos = ward_base__u64__sat_add({x}->meta.pos, wi{num});"
        ));
        self.close_block();
        Ok(())
    }

    fn enter_limit(&mut self, n: &IoManipStmt, x: &str, o: &str, w: &Window) -> Result<(), CompilerError> {
        let limit = n
            .arg1
            .as_ref()
            .ok_or_else(|| unsupported("io_limit without a limit".to_string()))?;
        let limit = self.expr(limit, 0)?;

        if !w.is_writer {
            self.line(&format!("const bool {o}closed_{x} = {x} && {x}->meta.closed;"));
        }
        self.line(&format!("{}uint8_t* {o}io2_{x} = io2_{x};", w.qualifier));
        self.line(&format!(
            "ward_private_impl__io_{}__limit(&io2_{x}, iop_{x}, {limit});",
            w.c_typ
        ));
        self.open(&format!("if ({x}) {{"));
        self.line(&format!("size_t n = ((size_t)(io2_{x} - {x}->data.ptr));"));
        if !w.is_writer {
            self.line(&format!(
                "{x}->meta.closed = {x}->meta.closed && ({x}->{} <= n);",
                w.end
            ));
        }
        self.line(&format!("{x}->{} = n;", w.end));
        self.close_block();
        Ok(())
    }
}
