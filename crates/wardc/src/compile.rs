use std::fmt;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::ast::SourcePos;
use crate::c_emit;
use crate::language;
use crate::language::limits::Limits;
use crate::program::Package;
use crate::wardast;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Prefix each lowered statement with a `// <file>:<line>` comment.
    pub genlinenum: bool,
    /// Prepend the runtime base header instead of `#include`-ing it.
    pub emit_base_header: bool,
    pub limits: Limits,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            genlinenum: false,
            emit_base_header: false,
            limits: Limits::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompileStats {
    pub functions: u64,
    pub suspension_points: u64,
    pub temporaries: u64,
    pub io_manips: u64,
}

impl CompileStats {
    pub(crate) fn absorb(&mut self, other: CompileStats) {
        self.functions = self.functions.saturating_add(other.functions);
        self.suspension_points = self
            .suspension_points
            .saturating_add(other.suspension_points);
        self.temporaries = self.temporaries.saturating_add(other.temporaries);
        self.io_manips = self.io_manips.saturating_add(other.io_manips);
    }
}

#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub c_src: String,
    pub stats: CompileStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    Parse,
    Unsupported,
    Budget,
    Internal,
}

impl CompileErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CompileErrorKind::Parse => "parse",
            CompileErrorKind::Unsupported => "unsupported",
            CompileErrorKind::Budget => "budget",
            CompileErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompilerError {
    pub kind: CompileErrorKind,
    pub message: String,
    pub pos: Option<SourcePos>,
}

impl CompilerError {
    pub fn new(kind: CompileErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
            pos: None,
        }
    }

    /// Attaches `pos` unless a more specific position is already set.
    pub fn at(mut self, pos: Option<&SourcePos>) -> Self {
        if self.pos.is_none() {
            self.pos = pos.cloned();
        }
        self
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)?;
        if let Some(pos) = &self.pos {
            write!(f, " at {pos}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompilerError {}

pub fn compile_package_to_c(
    pkg: &Package,
    options: &CompileOptions,
) -> Result<String, CompilerError> {
    compile_package_to_c_with_stats(pkg, options).map(|out| out.c_src)
}

#[instrument(level = "debug", skip_all, fields(pkg = %pkg.name))]
pub fn compile_package_to_c_with_stats(
    pkg: &Package,
    options: &CompileOptions,
) -> Result<CompileOutput, CompilerError> {
    let out = c_emit::emit_package(pkg, options)?;
    debug!(
        functions = out.stats.functions,
        suspension_points = out.stats.suspension_points,
        temporaries = out.stats.temporaries,
        bytes = out.c_src.len(),
        "package lowered"
    );
    Ok(out)
}

/// Parses a `*.wardast.json` document and lowers it to C.
pub fn compile_wardast_to_c(
    input: &[u8],
    options: &CompileOptions,
) -> Result<CompileOutput, CompilerError> {
    let pkg = parse_input(input, options)?;
    compile_package_to_c_with_stats(&pkg, options)
}

/// Runs the whole lowering without keeping the output. Every error
/// `compile_wardast_to_c` would report is reported here too.
pub fn check_wardast(input: &[u8], options: &CompileOptions) -> Result<CompileStats, CompilerError> {
    compile_wardast_to_c(input, options).map(|out| out.stats)
}

fn parse_input(input: &[u8], options: &CompileOptions) -> Result<Package, CompilerError> {
    if input.len() > options.limits.max_input_bytes {
        return Err(CompilerError::new(
            CompileErrorKind::Budget,
            format!(
                "input too large: max_input_bytes={} got {}",
                options.limits.max_input_bytes,
                input.len()
            ),
        ));
    }

    let src = std::str::from_utf8(input).map_err(|e| {
        CompilerError::new(CompileErrorKind::Parse, format!("input must be UTF-8: {e}"))
    })?;
    if !src.trim_start().starts_with('{') {
        return Err(CompilerError::new(
            CompileErrorKind::Parse,
            "input must be wardAST JSON (*.wardast.json)".to_string(),
        ));
    }

    let file = wardast::parse_wardast_json(input)
        .map_err(|e| CompilerError::new(CompileErrorKind::Parse, format!("wardast: {e}")))?;
    debug!(lang = language::LANG_ID, pkg = %file.package.name, "parsed wardAST");
    Ok(file.package)
}
