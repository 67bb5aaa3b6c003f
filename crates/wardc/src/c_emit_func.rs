//! Function frames: signatures, prologues, the coroutine dispatch switch and
//! the `ok`/`suspend`/`exit` epilogue.

use tracing::trace;

use crate::compile::CompilerError;
use crate::facts::FactStore;
use crate::program::{FuncDef, Precondition};
use crate::types::TypeExpr;

use super::choose::cpu_arch_of;
use super::{internal, unsupported, Emitter};

impl<'a> Emitter<'a> {
    fn func_c_name(&self, f: &FuncDef, choosy_default: bool) -> String {
        let suffix = if choosy_default { "__choosy_default" } else { "" };
        format!("{}{}__{}{suffix}", self.pkg_prefix(), f.receiver, f.name)
    }

    fn func_ret_type(&self, f: &FuncDef) -> Result<String, CompilerError> {
        if f.effect.is_coroutine() {
            return Ok("ward_base__status".to_string());
        }
        match &f.out {
            None => Ok("ward_base__empty_struct".to_string()),
            Some(ty) => self.c_type_name(ty),
        }
    }

    fn func_params(&self, f: &FuncDef) -> Result<String, CompilerError> {
        let mut parts = Vec::with_capacity(f.args.len() + 1);
        if !f.is_utility() {
            parts.push(format!("{}{}* self", self.pkg_prefix(), f.receiver));
        }
        for p in &f.args {
            parts.push(self.c_decl(&p.ty, &format!("a_{}", p.name))?);
        }
        if parts.is_empty() {
            return Ok("void".to_string());
        }
        Ok(parts.join(", "))
    }

    fn func_signature(&self, f: &FuncDef, choosy_default: bool) -> Result<String, CompilerError> {
        let storage = if f.public && !choosy_default { "" } else { "static " };
        Ok(format!(
            "{storage}{} {}({})",
            self.func_ret_type(f)?,
            self.func_c_name(f, choosy_default),
            self.func_params(f)?
        ))
    }

    pub(super) fn choosy_fn_ptr_decl(&self, f: &FuncDef) -> Result<String, CompilerError> {
        Ok(format!(
            "{} (*choosy_{})({})",
            self.func_ret_type(f)?,
            f.name,
            self.func_params(f)?
        ))
    }

    pub(super) fn emit_prototype(&mut self, f: &FuncDef) -> Result<(), CompilerError> {
        let arch = cpu_arch_of(f)?;
        if let Some(arch) = arch {
            self.raw_line(&format!(
                "#if defined(WARD_PRIVATE_IMPL__CPU_ARCH__{})",
                arch.macro_name
            ));
            if !arch.attribute.is_empty() {
                self.raw_line(arch.attribute);
            }
        }
        self.line(&format!("{};", self.func_signature(f, false)?));
        if f.choosy {
            self.line(&format!("{};", self.func_signature(f, true)?));
        }
        if arch.is_some() {
            self.raw_line("#endif");
        }
        Ok(())
    }

    pub(super) fn emit_func(&mut self, f: &'a FuncDef) -> Result<(), CompilerError> {
        if f.is_utility() && f.effect.is_coroutine() {
            return Err(unsupported(format!(
                "utility function {} cannot be a coroutine",
                f.name
            )));
        }
        trace!(receiver = %f.receiver, name = %f.name, "lowering function");

        if f.choosy {
            self.emit_choosy_dispatcher(f)?;
            self.raw_line("");
        }

        let arch = cpu_arch_of(f)?;
        if let Some(arch) = arch {
            self.raw_line(&format!(
                "#if defined(WARD_PRIVATE_IMPL__CPU_ARCH__{})",
                arch.macro_name
            ));
            if !arch.attribute.is_empty() {
                self.raw_line(arch.attribute);
            }
        }
        let sig = self.func_signature(f, f.choosy)?;
        self.open(&format!("{sig} {{"));

        let facts: FactStore = f
            .preconditions
            .iter()
            .filter_map(|p| match p {
                Precondition::Expr(e) => Some(e.clone()),
                Precondition::CpuArch { .. } => None,
            })
            .collect();
        self.begin_func(f, facts);
        let res = self.emit_func_frame(f);
        self.end_func();
        res?;

        self.close_block();
        if arch.is_some() {
            self.raw_line("#endif");
        }
        Ok(())
    }

    fn emit_choosy_dispatcher(&mut self, f: &FuncDef) -> Result<(), CompilerError> {
        let sig = self.func_signature(f, false)?;
        let mut call_args = vec!["self".to_string()];
        call_args.extend(f.args.iter().map(|p| format!("a_{}", p.name)));
        self.open(&format!("{sig} {{"));
        self.line(&format!(
            "return (*self->private_impl.choosy_{})({});",
            f.name,
            call_args.join(", ")
        ));
        self.close_block();
        Ok(())
    }

    fn emit_func_frame(&mut self, f: &'a FuncDef) -> Result<(), CompilerError> {
        let coroutine = f.effect.is_coroutine();
        let status_frame = coroutine || (f.returns_status() && !self.cur()?.derived_vars.is_empty());

        if f.public && !f.is_utility() && (coroutine || f.returns_status()) {
            self.open("if (!self) {");
            self.line("return ward_base__make_status(ward_base__error__bad_receiver);");
            self.close_block();
            self.open("if (self->private_impl.magic != WARD_BASE__MAGIC) {");
            self.line("return ward_base__make_status(ward_base__error__initialize_not_called);");
            self.close_block();
            self.raw_line("");
        }

        for p in f.io_args() {
            self.emit_io_arg_setup(&format!("a_{}", p.name), p.ty == TypeExpr::IoWriter);
        }

        let locals = f.locals();
        for (name, ty) in &locals {
            if ty.is_io() {
                let x = format!("v_{name}");
                let q = if **ty == TypeExpr::IoWriter { "" } else { "const " };
                self.line(&format!("ward_base__io_buffer u_{name} = {{0}};"));
                self.line(&format!("ward_base__io_buffer* {x} WARD_BASE__POTENTIALLY_UNUSED = &u_{name};"));
                for p in ["iop", "io0", "io1", "io2"] {
                    self.line(&format!(
                        "{q}uint8_t* {p}_{x} WARD_BASE__POTENTIALLY_UNUSED = NULL;"
                    ));
                }
            } else {
                let decl = self.c_decl(ty, &format!("v_{name}"))?;
                let zero = self.c_zero(ty)?;
                self.line(&format!("{decl} = {zero};"));
            }
        }
        if !locals.is_empty() {
            self.raw_line("");
        }

        if status_frame {
            self.line("ward_base__status status = ward_base__make_status(NULL);");
        }

        // The body is lowered first so that `ok:` is only emitted when used.
        let outer = self.take_output();
        let outer_indent = self.indent;
        if coroutine {
            self.indent += 1;
        }
        let res = self.lower_block(&f.body, 0);
        let body = std::mem::replace(&mut self.out, outer);
        self.indent = outer_indent;
        res?;

        let st = self.cur()?;
        if st.temp_r != st.temp_w {
            return Err(internal("temporary variable count out of sync".to_string()));
        }
        let has_goto_ok = st.has_goto_ok;

        let saved_locals: Vec<(&str, &TypeExpr)> =
            locals.iter().copied().filter(|(_, ty)| !ty.is_io()).collect();
        let frame = format!("self->private_data.s_{}", f.name);

        if coroutine {
            self.line(&format!(
                "uint32_t coro_susp_point = self->private_impl.p_{};",
                f.name
            ));
            if !saved_locals.is_empty() {
                self.open("if (coro_susp_point) {");
                for (name, ty) in &saved_locals {
                    if ty.is_array() {
                        self.line(&format!(
                            "memcpy(v_{name}, {frame}.v_{name}, sizeof(v_{name}));"
                        ));
                    } else {
                        self.line(&format!("v_{name} = {frame}.v_{name};"));
                    }
                }
                self.close_block();
            }
            self.raw_line("");
            self.open("switch (coro_susp_point) {");
            self.line("WARD_BASE__COROUTINE_SUSPENSION_POINT_0;");
            self.raw_line("");
            self.out.push_str(&body);
            self.raw_line("");
            if has_goto_ok {
                self.raw_line("ok:");
            }
            self.line(&format!("self->private_impl.p_{} = 0;", f.name));
            self.line("goto exit;");
            self.close_block();
            self.raw_line("");
            self.line("goto suspend;");
            self.raw_line("suspend:");
            self.line(&format!(
                "self->private_impl.p_{} = ward_base__status__is_suspension(&status) ? coro_susp_point : 0;",
                f.name
            ));
            for (name, ty) in &saved_locals {
                if ty.is_array() {
                    self.line(&format!(
                        "memcpy({frame}.v_{name}, v_{name}, sizeof(v_{name}));"
                    ));
                } else {
                    self.line(&format!("{frame}.v_{name} = v_{name};"));
                }
            }
            self.line("goto exit;");
            self.raw_line("exit:");
            self.emit_exit_write_backs(f);
            self.line("return status;");
        } else if status_frame {
            self.out.push_str(&body);
            self.raw_line("");
            if has_goto_ok {
                self.raw_line("ok:");
            }
            self.line("goto exit;");
            self.raw_line("exit:");
            self.emit_exit_write_backs(f);
            self.line("return status;");
        } else {
            self.out.push_str(&body);
            if f.out.is_none() {
                self.emit_exit_write_backs(f);
                self.line("return ward_base__make_empty_struct();");
            }
        }
        Ok(())
    }

    fn emit_exit_write_backs(&mut self, f: &FuncDef) {
        for p in f.io_args() {
            self.write_final_save_derived_var(&format!("a_{}", p.name), p.ty == TypeExpr::IoWriter);
        }
    }

    fn emit_io_arg_setup(&mut self, x: &str, is_writer: bool) {
        let q = if is_writer { "" } else { "const " };
        self.line(&format!("{q}uint8_t* iop_{x} = NULL;"));
        for p in ["io0", "io1", "io2"] {
            self.line(&format!(
                "{q}uint8_t* {p}_{x} WARD_BASE__POTENTIALLY_UNUSED = NULL;"
            ));
        }
        self.open(&format!("if ({x} && {x}->data.ptr) {{"));
        self.line(&format!("io0_{x} = {x}->data.ptr;"));
        if is_writer {
            self.line(&format!("io1_{x} = io0_{x} + {x}->meta.wi;"));
            self.line(&format!("iop_{x} = io1_{x};"));
            self.line(&format!("io2_{x} = io0_{x} + {x}->data.len;"));
            self.open(&format!("if ({x}->meta.closed) {{"));
            self.line(&format!("io2_{x} = iop_{x};"));
            self.close_block();
        } else {
            self.line(&format!("io1_{x} = io0_{x} + {x}->meta.ri;"));
            self.line(&format!("iop_{x} = io1_{x};"));
            self.line(&format!("io2_{x} = io0_{x} + {x}->meta.wi;"));
        }
        self.close_block();
        self.raw_line("");
    }
}
