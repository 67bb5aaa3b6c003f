use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use ward_contracts::WARDDIAG_SCHEMA_VERSION;

use crate::compile::{CompileErrorKind, CompilerError};

pub const CODE_BUDGET: &str = "WARDC-BUDGET-0001";
pub const CODE_UNSUPPORTED: &str = "WARDC-UNSUPPORTED-0001";
pub const CODE_INTERNAL: &str = "WARDC-INTERNAL-0001";
pub const CODE_PARSE: &str = "WARDC-PARSE-0001";
pub const CODE_IO: &str = "WARDC-IO-0001";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Parse,
    Lower,
    Codegen,
    Run,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Location {
    WardAst { ptr: String },
    Source { file: String, line: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    pub stage: Stage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc: Option<Location>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
}

impl Diagnostic {
    pub fn error(code: &str, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            severity: Severity::Error,
            stage,
            message: message.into(),
            loc: None,
            data: BTreeMap::new(),
        }
    }
}

impl From<&CompilerError> for Diagnostic {
    fn from(err: &CompilerError) -> Self {
        let (code, stage) = match err.kind {
            CompileErrorKind::Parse => (CODE_PARSE, Stage::Parse),
            CompileErrorKind::Unsupported => (CODE_UNSUPPORTED, Stage::Lower),
            CompileErrorKind::Budget => (CODE_BUDGET, Stage::Lower),
            CompileErrorKind::Internal => (CODE_INTERNAL, Stage::Codegen),
        };
        let mut d = Diagnostic::error(code, stage, err.message.clone());
        d.loc = err.pos.as_ref().map(|p| Location::Source {
            file: p.file.clone(),
            line: p.line,
        });
        d
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub schema_version: String,
    pub ok: bool,
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, Value>,
}

impl Report {
    pub fn ok() -> Self {
        Self {
            schema_version: WARDDIAG_SCHEMA_VERSION.to_string(),
            ok: true,
            diagnostics: Vec::new(),
            meta: BTreeMap::new(),
        }
    }

    pub fn with_diagnostics(mut self, mut diagnostics: Vec<Diagnostic>) -> Self {
        fn sort_key(d: &Diagnostic) -> (&str, u32) {
            match &d.loc {
                Some(Location::WardAst { ptr }) => (ptr.as_str(), 0),
                Some(Location::Source { file, line }) => (file.as_str(), *line),
                None => ("", 0),
            }
        }
        diagnostics.sort_by(|a, b| {
            sort_key(a)
                .cmp(&sort_key(b))
                .then_with(|| a.code.cmp(&b.code))
                .then_with(|| a.message.cmp(&b.message))
        });
        self.ok = diagnostics.iter().all(|d| d.severity != Severity::Error);
        self.diagnostics = diagnostics;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SourcePos;

    #[test]
    fn compiler_error_maps_to_coded_diagnostic() {
        let err = CompilerError::new(CompileErrorKind::Budget, "too many temporaries".to_string())
            .at(Some(&SourcePos {
                file: "x.ward".to_string(),
                line: 4,
            }));
        let d = Diagnostic::from(&err);
        assert_eq!(d.code, CODE_BUDGET);
        assert_eq!(d.stage, Stage::Lower);
        assert_eq!(
            d.loc,
            Some(Location::Source {
                file: "x.ward".to_string(),
                line: 4
            })
        );
    }

    #[test]
    fn report_sorts_and_derives_ok() {
        let warn = Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(CODE_IO, Stage::Run, "b")
        };
        let report = Report::ok().with_diagnostics(vec![warn.clone()]);
        assert!(report.ok);

        let err = Diagnostic::error(CODE_PARSE, Stage::Parse, "a");
        let report = Report::ok().with_diagnostics(vec![warn, err]);
        assert!(!report.ok);
        assert_eq!(report.diagnostics[0].code, CODE_IO);
    }
}
