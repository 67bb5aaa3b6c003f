//! Lowering of a checked package to C.
//!
//! One `Emitter` walks a package; per-function bookkeeping lives in a
//! `FuncState` that is created when a function body starts and dropped when
//! it ends. Statement lowering threads a `FactStore` alongside, re-deriving
//! the checker's provability decisions so that bounds-sensitive builtins pick
//! the same checked or unchecked form the checker accepted.

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use crate::ast::{Expr, IfStmt, JumpKeyword, LoopId, RetKeyword, Stmt, StmtKind};
use crate::compile::{CompileErrorKind, CompileOptions, CompileOutput, CompileStats, CompilerError};
use crate::facts::FactStore;
use crate::language;
use crate::program::{FuncDef, Package, StructDecl};
use crate::runtime;
use crate::types::TypeExpr;

#[path = "c_emit_builtins.rs"]
mod builtins;
#[path = "c_emit_choose.rs"]
mod choose;
#[path = "c_emit_expr.rs"]
mod expr;
#[path = "c_emit_func.rs"]
mod func;
#[path = "c_emit_io.rs"]
mod io;
#[path = "c_emit_stmt.rs"]
mod stmt;
#[path = "c_emit_types.rs"]
mod ctypes;

use builtins::IoBuiltin;

const DISABLE_WCONVERSION_PUSH: &str = "#if defined(__GNUC__)\n\
#pragma GCC diagnostic push\n\
#pragma GCC diagnostic ignored \"-Wconversion\"\n\
#endif\n";

const DISABLE_WCONVERSION_POP: &str = "#if defined(__GNUC__)\n\
#pragma GCC diagnostic pop\n\
#endif\n";

struct Emitter<'a> {
    pkg: &'a Package,
    options: &'a CompileOptions,
    out: String,
    indent: usize,
    func: Option<FuncState<'a>>,
    stats: CompileStats,
}

/// Bookkeeping for the one function currently being lowered.
struct FuncState<'a> {
    def: &'a FuncDef,
    temp_w: u32,
    temp_r: u32,
    susp_point: u32,
    io_manips: u32,
    has_goto_ok: bool,
    active_loops: Vec<LoopId>,
    loops: BTreeMap<LoopId, LoopInfo>,
    jump_targets: BTreeMap<LoopId, u32>,
    /// C names (`a_src`, `v_r`) of I/O values whose cursors live in local
    /// window pointers and must be synced around calls.
    derived_vars: BTreeMap<String, bool>,
    facts: FactStore,
}

#[derive(Debug, Clone, Copy, Default)]
struct LoopInfo {
    is_iterate: bool,
    has_continue: bool,
    deep_break: bool,
    deep_continue: bool,
}

impl<'a> FuncState<'a> {
    fn new(def: &'a FuncDef, facts: FactStore) -> Self {
        let mut loops = BTreeMap::new();
        let mut active = Vec::new();
        scan_loops(&def.body, &mut active, &mut loops);

        let mut derived_vars = BTreeMap::new();
        for p in def.io_args() {
            derived_vars.insert(format!("a_{}", p.name), p.ty == TypeExpr::IoWriter);
        }
        for (name, ty) in def.locals() {
            if ty.is_io() {
                derived_vars.insert(format!("v_{name}"), *ty == TypeExpr::IoWriter);
            }
        }

        Self {
            def,
            temp_w: 0,
            temp_r: 0,
            susp_point: 0,
            io_manips: 0,
            has_goto_ok: false,
            active_loops: Vec::new(),
            loops,
            jump_targets: BTreeMap::new(),
            derived_vars,
            facts,
        }
    }

    fn is_coroutine(&self) -> bool {
        self.def.effect.is_coroutine()
    }
}

fn scan_loops(body: &[Stmt], active: &mut Vec<LoopId>, loops: &mut BTreeMap<LoopId, LoopInfo>) {
    for s in body {
        match &s.kind {
            StmtKind::While(n) => {
                loops.entry(n.id).or_default();
                active.push(n.id);
                scan_loops(&n.body, active, loops);
                active.pop();
            }
            StmtKind::Iterate(n) => {
                loops.entry(n.id).or_default().is_iterate = true;
                active.push(n.id);
                for r in &n.rounds {
                    scan_loops(&r.body, active, loops);
                }
                active.pop();
            }
            StmtKind::If(n) => {
                let mut n = Some(n);
                while let Some(x) = n {
                    scan_loops(&x.body_if_true, active, loops);
                    scan_loops(&x.body_if_false, active, loops);
                    n = x.else_if.as_deref();
                }
            }
            StmtKind::IoManip(n) => scan_loops(&n.body, active, loops),
            StmtKind::Jump { keyword, target } => {
                let deep = active.last() != Some(target);
                let info = loops.entry(*target).or_default();
                match keyword {
                    JumpKeyword::Break => info.deep_break |= deep,
                    JumpKeyword::Continue => {
                        info.has_continue = true;
                        info.deep_continue |= deep;
                    }
                }
            }
            StmtKind::Assert { .. }
            | StmtKind::Assign { .. }
            | StmtKind::Choose { .. }
            | StmtKind::Ret { .. }
            | StmtKind::Var { .. } => {}
        }
    }
}

impl<'a> Emitter<'a> {
    fn new(pkg: &'a Package, options: &'a CompileOptions) -> Self {
        Self {
            pkg,
            options,
            out: String::new(),
            indent: 0,
            func: None,
            stats: CompileStats::default(),
        }
    }

    fn line(&mut self, s: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(s);
        self.out.push('\n');
    }

    /// Preprocessor lines and labels always start at column 0.
    fn raw_line(&mut self, s: &str) {
        self.out.push_str(s);
        self.out.push('\n');
    }

    fn open_block(&mut self) {
        self.line("{");
        self.indent += 1;
    }

    fn close_block(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        self.line("}");
    }

    fn open(&mut self, head: &str) {
        self.line(head);
        self.indent += 1;
    }

    /// Closes the current block and opens the next one on the same line, as
    /// in `} else {`.
    fn reopen(&mut self, head: &str) {
        self.indent = self.indent.saturating_sub(1);
        self.line(head);
        self.indent += 1;
    }

    /// Removes `s` from the end of the output if it is there.
    fn undo_writes(&mut self, s: &str) -> bool {
        if self.out.ends_with(s) {
            self.out.truncate(self.out.len() - s.len());
            return true;
        }
        false
    }

    fn take_output(&mut self) -> String {
        std::mem::take(&mut self.out)
    }

    fn cur(&self) -> Result<&FuncState<'a>, CompilerError> {
        self.func.as_ref().ok_or_else(|| {
            CompilerError::new(
                CompileErrorKind::Internal,
                "no function is being lowered".to_string(),
            )
        })
    }

    fn cur_mut(&mut self) -> Result<&mut FuncState<'a>, CompilerError> {
        self.func.as_mut().ok_or_else(|| {
            CompilerError::new(
                CompileErrorKind::Internal,
                "no function is being lowered".to_string(),
            )
        })
    }

    fn facts_mut(&mut self) -> Result<&mut FactStore, CompilerError> {
        Ok(&mut self.cur_mut()?.facts)
    }

    fn begin_func(&mut self, def: &'a FuncDef, facts: FactStore) {
        self.func = Some(FuncState::new(def, facts));
    }

    fn end_func(&mut self) -> Option<FuncState<'a>> {
        let st = self.func.take()?;
        self.stats.absorb(CompileStats {
            functions: 1,
            suspension_points: u64::from(st.susp_point),
            temporaries: u64::from(st.temp_w),
            io_manips: u64::from(st.io_manips),
        });
        Some(st)
    }
}

fn fn_label(def: &FuncDef) -> String {
    format!("{}.{}", def.receiver, def.name)
}

fn in_fn(mut err: CompilerError, def: &FuncDef) -> CompilerError {
    err.message = format!("{} (fn={})", err.message, fn_label(def));
    err
}

fn unsupported(msg: String) -> CompilerError {
    CompilerError::new(CompileErrorKind::Unsupported, msg)
}

fn internal(msg: String) -> CompilerError {
    CompilerError::new(CompileErrorKind::Internal, msg)
}

fn budget(msg: String) -> CompilerError {
    CompilerError::new(CompileErrorKind::Budget, msg)
}

/// Lowers a whole package: header, status strings, constants, struct
/// layouts, prototypes, initializers and every function definition.
#[instrument(level = "debug", skip_all, fields(pkg = %pkg.name))]
pub fn emit_package(pkg: &Package, options: &CompileOptions) -> Result<CompileOutput, CompilerError> {
    validate_package_name(&pkg.name)?;
    let mut em = Emitter::new(pkg, options);
    em.emit_package_prelude()?;
    for f in &pkg.funcs {
        em.emit_func(f).map_err(|e| in_fn(e, f))?;
        em.raw_line("");
    }
    debug!(functions = em.stats.functions, "package functions lowered");
    Ok(CompileOutput {
        c_src: em.take_output(),
        stats: em.stats,
    })
}

/// Lowers the statements of `func` with `facts` known on entry, without the
/// surrounding function frame.
pub fn emit_function_body(
    pkg: &Package,
    func: &FuncDef,
    facts: FactStore,
    options: &CompileOptions,
) -> Result<String, CompilerError> {
    let mut em = Emitter::new(pkg, options);
    em.begin_func(func, facts);
    let res = em.lower_block(&func.body, 0);
    em.end_func();
    res.map_err(|e| in_fn(e, func))?;
    Ok(em.take_output())
}

/// Renders one expression. `func` supplies the context for `this`, `args`
/// and `coroutine_resumed`.
pub fn emit_expr(
    pkg: &Package,
    func: Option<&FuncDef>,
    e: &Expr,
    options: &CompileOptions,
) -> Result<String, CompilerError> {
    let mut em = Emitter::new(pkg, options);
    if let Some(f) = func {
        em.begin_func(f, FactStore::new());
    }
    let res = em.expr(e, 0);
    em.end_func();
    res
}

fn validate_package_name(name: &str) -> Result<(), CompilerError> {
    let ok = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        && name.as_bytes()[0].is_ascii_lowercase();
    if !ok {
        return Err(CompilerError::new(
            CompileErrorKind::Parse,
            format!("invalid package name {name:?}: expected [a-z][a-z0-9_]*"),
        ));
    }
    Ok(())
}

impl<'a> Emitter<'a> {
    fn emit_package_prelude(&mut self) -> Result<(), CompilerError> {
        let pkg = self.pkg;
        self.raw_line("// Code generated by wardc. DO NOT EDIT.");
        self.raw_line(&format!("// lang: {}", language::LANG_ID));
        self.raw_line(&format!("// package: {}", pkg.name));
        self.raw_line("");
        if self.options.emit_base_header {
            self.out.push_str(&runtime::base_header());
        } else {
            self.raw_line("#include \"ward_base.h\"");
        }
        self.raw_line("");

        if !pkg.statuses.is_empty() {
            self.raw_line("// ---------------- Status Codes");
            self.raw_line("");
            for s in &pkg.statuses {
                let cname = self.local_status_cname(&s.msg)?;
                let class = &s.msg[..1];
                let text = format!("{class}{}: {}", pkg.name, &s.msg[1..]);
                let storage = if s.public { "" } else { "static " };
                self.raw_line(&format!("{storage}const char {cname}[] = {text:?};"));
            }
            self.raw_line("");
        }

        if !pkg.consts.is_empty() {
            self.raw_line("// ---------------- Constants");
            self.raw_line("");
            for c in &pkg.consts {
                let value = if c.value >= 0 {
                    format!("{}u", c.value)
                } else {
                    format!("(({})({}))", self.c_type_name(&c.ty)?, c.value)
                };
                self.raw_line(&format!("#define {}{} {value}", self.pkg_macro_prefix(), c.name.to_ascii_uppercase()));
            }
            self.raw_line("");
        }

        if !pkg.structs.is_empty() {
            self.raw_line("// ---------------- Struct Declarations");
            self.raw_line("");
            for s in &pkg.structs {
                let name = format!("{}{}", self.pkg_prefix(), s.name);
                self.raw_line(&format!("typedef struct {name}__struct {name};"));
            }
            self.raw_line("");
            for s in &pkg.structs {
                self.emit_struct_def(s)?;
                self.raw_line("");
            }
        }

        self.raw_line("// ---------------- Function Prototypes");
        self.raw_line("");
        for s in &pkg.structs {
            self.line(&format!("{};", self.initialize_signature(&s.name)));
        }
        for f in &pkg.funcs {
            self.emit_prototype(f).map_err(|e| in_fn(e, f))?;
        }
        self.raw_line("");

        for s in &pkg.structs {
            self.emit_initialize(s)?;
            self.raw_line("");
        }
        Ok(())
    }

    fn emit_struct_def(&mut self, s: &'a StructDecl) -> Result<(), CompilerError> {
        let pkg = self.pkg;
        let name = format!("{}{}", self.pkg_prefix(), s.name);
        let methods: Vec<&FuncDef> = pkg.funcs.iter().filter(|f| f.receiver == s.name).collect();

        self.open(&format!("struct {name}__struct {{"));
        self.open("struct {");
        self.line("uint32_t magic;");
        for f in s.fields.iter().filter(|f| !f.private_data) {
            let decl = self.c_decl(&f.ty, &format!("f_{}", f.name))?;
            self.line(&format!("{decl};"));
        }
        for f in methods.iter().filter(|f| f.choosy) {
            let ptr = self.choosy_fn_ptr_decl(f)?;
            self.line(&format!("{ptr};"));
        }
        for f in methods.iter().filter(|f| f.effect.is_coroutine()) {
            self.line(&format!("uint32_t p_{};", f.name));
        }
        self.reopen("} private_impl;");

        let private_fields: Vec<_> = s.fields.iter().filter(|f| f.private_data).collect();
        let coroutines: Vec<&FuncDef> = methods
            .iter()
            .copied()
            .filter(|f| f.effect.is_coroutine())
            .collect();
        self.indent = self.indent.saturating_sub(1);
        if !private_fields.is_empty() || !coroutines.is_empty() {
            self.open("struct {");
            for f in private_fields {
                let decl = self.c_decl(&f.ty, &format!("f_{}", f.name))?;
                self.line(&format!("{decl};"));
            }
            for f in coroutines {
                self.open("struct {");
                for (local, ty) in f.locals() {
                    if ty.is_io() {
                        continue;
                    }
                    let decl = self.c_decl(ty, &format!("v_{local}"))?;
                    self.line(&format!("{decl};"));
                }
                self.line("uint64_t scratch;");
                self.reopen(&format!("}} s_{};", f.name));
                self.indent = self.indent.saturating_sub(1);
            }
            self.reopen("} private_data;");
            self.indent = self.indent.saturating_sub(1);
        }
        self.indent = self.indent.saturating_sub(1);
        self.line("};");
        Ok(())
    }

    fn initialize_signature(&self, struct_name: &str) -> String {
        let name = format!("{}{}", self.pkg_prefix(), struct_name);
        format!(
            "ward_base__status {name}__initialize({name}* self, size_t sizeof_star_self, uint64_t ward_version, uint32_t options)"
        )
    }

    fn emit_initialize(&mut self, s: &StructDecl) -> Result<(), CompilerError> {
        let pkg = self.pkg;
        let sig = self.initialize_signature(&s.name);
        self.open(&format!("{sig} {{"));
        self.open("if (!self) {");
        self.line("return ward_base__make_status(ward_base__error__bad_receiver);");
        self.close_block();
        self.open("if (sizeof(*self) != sizeof_star_self) {");
        self.line("return ward_base__make_status(ward_base__error__bad_sizeof_receiver);");
        self.close_block();
        self.open("if (ward_version != WARD_VERSION) {");
        self.line("return ward_base__make_status(ward_base__error__bad_version);");
        self.close_block();
        self.open("if ((options & WARD_INITIALIZE__ALREADY_ZEROED) == 0) {");
        self.open("if (options & WARD_INITIALIZE__LEAVE_INTERNAL_BUFFERS_UNINITIALIZED) {");
        self.line("memset(&(self->private_impl), 0, sizeof(self->private_impl));");
        self.reopen("} else {");
        self.line("memset(self, 0, sizeof(*self));");
        self.close_block();
        self.close_block();
        for f in pkg.funcs.iter().filter(|f| f.receiver == s.name && f.choosy) {
            self.line(&format!(
                "self->private_impl.choosy_{} = &{}{}__{}__choosy_default;",
                f.name,
                self.pkg_prefix(),
                s.name,
                f.name
            ));
        }
        self.line("self->private_impl.magic = WARD_BASE__MAGIC;");
        self.line("return ward_base__make_status(NULL);");
        self.close_block();
        Ok(())
    }
}

/// Everything a block may modify, for invalidating facts after it.
#[derive(Debug, Default)]
struct Clobbers {
    exprs: Vec<Expr>,
    suspends: bool,
}

impl Clobbers {
    fn of_block(body: &[Stmt]) -> Self {
        let mut c = Clobbers::default();
        c.walk_block(body);
        c
    }

    fn of_if(n: &IfStmt) -> Self {
        let mut c = Clobbers::default();
        c.walk_if(n);
        c
    }

    fn add(&mut self, e: &Expr) {
        if !self.exprs.contains(e) {
            self.exprs.push(e.clone());
        }
    }

    fn walk_block(&mut self, body: &[Stmt]) {
        for s in body {
            match &s.kind {
                StmtKind::Assert { .. } | StmtKind::Choose { .. } | StmtKind::Jump { .. } => {}
                StmtKind::Var { name, ty } => self.add(&Expr::local(name.clone(), ty.clone())),
                StmtKind::Assign { lhs, rhs, .. } => {
                    if let Some(lhs) = lhs {
                        self.add(lhs);
                    }
                    self.walk_expr(rhs);
                }
                StmtKind::Ret { keyword, value, .. } => {
                    if *keyword == RetKeyword::Yield {
                        self.suspends = true;
                    }
                    if let Some(v) = value {
                        self.walk_expr(v);
                    }
                }
                StmtKind::IoManip(n) => {
                    self.add(&n.io);
                    self.walk_block(&n.body);
                }
                StmtKind::If(n) => self.walk_if(n),
                StmtKind::Iterate(n) => {
                    for a in &n.assigns {
                        self.add(&Expr::local(a.name.clone(), a.rhs.ty.clone()));
                        self.walk_expr(&a.rhs);
                    }
                    for r in &n.rounds {
                        self.walk_block(&r.body);
                    }
                }
                StmtKind::While(n) => {
                    self.walk_expr(&n.condition);
                    self.walk_block(&n.body);
                }
            }
        }
    }

    fn walk_if(&mut self, n: &IfStmt) {
        let mut n = Some(n);
        while let Some(x) = n {
            self.walk_expr(&x.condition);
            self.walk_block(&x.body_if_true);
            self.walk_block(&x.body_if_false);
            n = x.else_if.as_deref();
        }
    }

    fn walk_expr(&mut self, e: &Expr) {
        if let Some((recv, method, args)) = e.as_call() {
            if e.effect.is_coroutine() {
                self.suspends = true;
            }
            if !e.effect.is_pure() {
                self.add(recv);
                if IoBuiltin::lookup(&recv.ty, method).is_none() {
                    for a in args {
                        self.add(&a.value);
                    }
                }
            }
        }
        e.for_each_child(|c| self.walk_expr(c));
    }

    fn apply(&self, facts: &mut FactStore) {
        facts.retain(|f| {
            !(self.suspends && f.touches_io()) && !self.exprs.iter().any(|c| f.mentions(c))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::WhileStmt;

    #[test]
    fn scan_loops_marks_deep_jumps() {
        let inner = Stmt::new(StmtKind::While(WhileStmt {
            id: 2,
            condition: Expr::number(1, TypeExpr::Bool),
            body: vec![
                Stmt::new(StmtKind::Jump {
                    keyword: JumpKeyword::Break,
                    target: 1,
                }),
                Stmt::new(StmtKind::Jump {
                    keyword: JumpKeyword::Continue,
                    target: 2,
                }),
            ],
        }));
        let outer = Stmt::new(StmtKind::While(WhileStmt {
            id: 1,
            condition: Expr::number(1, TypeExpr::Bool),
            body: vec![inner],
        }));
        let mut loops = BTreeMap::new();
        scan_loops(&[outer], &mut Vec::new(), &mut loops);
        assert!(loops[&1].deep_break);
        assert!(!loops[&1].deep_continue);
        assert!(loops[&2].has_continue);
        assert!(!loops[&2].deep_continue);
    }

    #[test]
    fn package_names_are_validated() {
        assert!(validate_package_name("deflate").is_ok());
        assert!(validate_package_name("png2").is_ok());
        assert!(validate_package_name("").is_err());
        assert!(validate_package_name("Bad").is_err());
        assert!(validate_package_name("9x").is_err());
    }
}
