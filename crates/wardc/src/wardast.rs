use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ward_contracts::WARDAST_SCHEMA_VERSION;

use crate::program::Package;

pub const WARDAST_SCHEMA_VERSIONS_SUPPORTED: &[&str] = &[WARDAST_SCHEMA_VERSION];

/// A checked package in its JSON interchange form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WardAstFile {
    pub schema_version: String,
    pub package: Package,
}

impl WardAstFile {
    pub fn new(package: Package) -> Self {
        Self {
            schema_version: WARDAST_SCHEMA_VERSION.to_string(),
            package,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WardAstError {
    pub message: String,
    pub ptr: String,
}

impl std::error::Error for WardAstError {}

impl Display for WardAstError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ptr.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{} at {}", self.message, self.ptr)
        }
    }
}

pub fn parse_wardast_json(bytes: &[u8]) -> Result<WardAstFile, WardAstError> {
    let doc: Value = serde_json::from_slice(bytes).map_err(|e| WardAstError {
        message: e.to_string(),
        ptr: "".to_string(),
    })?;
    parse_wardast_value(doc)
}

fn parse_wardast_value(root: Value) -> Result<WardAstFile, WardAstError> {
    let root_obj = root.as_object().ok_or_else(|| WardAstError {
        message: "wardast root must be an object".to_string(),
        ptr: "".to_string(),
    })?;

    let schema_version = root_obj
        .get("schema_version")
        .and_then(Value::as_str)
        .ok_or_else(|| WardAstError {
            message: "missing string field schema_version".to_string(),
            ptr: "/schema_version".to_string(),
        })?;
    if !WARDAST_SCHEMA_VERSIONS_SUPPORTED
        .iter()
        .any(|&v| v == schema_version)
    {
        return Err(WardAstError {
            message: format!(
                "unsupported schema_version: got {schema_version:?} (supported: {})",
                WARDAST_SCHEMA_VERSIONS_SUPPORTED.join(", ")
            ),
            ptr: "/schema_version".to_string(),
        });
    }
    if !root_obj.contains_key("package") {
        return Err(WardAstError {
            message: "missing object field package".to_string(),
            ptr: "/package".to_string(),
        });
    }

    serde_json::from_value(root).map_err(|e| WardAstError {
        message: e.to_string(),
        ptr: "/package".to_string(),
    })
}

/// Canonical pretty JSON with a trailing newline, stable across runs.
pub fn wardast_file_to_json(file: &WardAstFile) -> Result<String, WardAstError> {
    let mut out = serde_json::to_string_pretty(file).map_err(|e| WardAstError {
        message: e.to_string(),
        ptr: "".to_string(),
    })?;
    out.push('\n');
    Ok(out)
}
