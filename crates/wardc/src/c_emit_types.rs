//! C spellings of types, names and status literals.

use crate::ast::{StatusClass, StatusRef};
use crate::compile::CompilerError;
use crate::runtime;
use crate::types::{NumType, TypeExpr};

use super::{internal, unsupported, Emitter};

/// `"#bad header"` -> `bad_header`.
pub(super) fn status_snake(msg: &str) -> String {
    let mut out = String::with_capacity(msg.len());
    let mut prev_us = true;
    for c in msg.chars().skip(1) {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            prev_us = false;
        } else if !prev_us {
            out.push('_');
            prev_us = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Number of value bits for the `uNN` suffix of the unsigned helpers.
pub(super) fn uint_suffix(ty: &TypeExpr) -> Result<u32, CompilerError> {
    ty.uint_bits()
        .ok_or_else(|| unsupported(format!("unsupported tilde-operator type {ty}")))
}

impl<'a> Emitter<'a> {
    pub(super) fn pkg_prefix(&self) -> String {
        format!("ward_{}__", self.pkg.name)
    }

    pub(super) fn pkg_macro_prefix(&self) -> String {
        format!("WARD_{}__", self.pkg.name.to_ascii_uppercase())
    }

    /// C type for a scalar, pointer or aggregate value. Arrays are only
    /// spelled through [`Emitter::c_decl`].
    pub(super) fn c_type_name(&self, ty: &TypeExpr) -> Result<String, CompilerError> {
        Ok(match ty {
            TypeExpr::Num(n) => n.c_name().to_string(),
            TypeExpr::Ideal => NumType::U64.c_name().to_string(),
            TypeExpr::Bool => "bool".to_string(),
            TypeExpr::Status => "ward_base__status".to_string(),
            TypeExpr::EmptyStruct => "ward_base__empty_struct".to_string(),
            TypeExpr::Nullptr => "void*".to_string(),
            TypeExpr::IoReader | TypeExpr::IoWriter => "ward_base__io_buffer*".to_string(),
            TypeExpr::TokenReader | TypeExpr::TokenWriter => "ward_base__token_buffer*".to_string(),
            TypeExpr::Named { pkg, name } => {
                let pkg = pkg.as_deref().unwrap_or(&self.pkg.name);
                format!("ward_{pkg}__{name}")
            }
            TypeExpr::Ptr(inner) | TypeExpr::Nptr(inner) => {
                format!("{}*", self.c_type_name(inner)?)
            }
            TypeExpr::Slice { elem, .. } if **elem == TypeExpr::u8() => {
                "ward_base__slice_u8".to_string()
            }
            TypeExpr::Table { elem, .. } if **elem == TypeExpr::u8() => {
                "ward_base__table_u8".to_string()
            }
            TypeExpr::Array { .. } | TypeExpr::Slice { .. } | TypeExpr::Table { .. } => {
                return Err(unsupported(format!("cannot convert type {ty} to C")));
            }
        })
    }

    /// `T name`, or `T name[N][M]` for (nested) arrays.
    pub(super) fn c_decl(&self, ty: &TypeExpr, name: &str) -> Result<String, CompilerError> {
        let mut dims = String::new();
        let mut inner = ty;
        while let TypeExpr::Array { len, elem, .. } = inner {
            dims.push_str(&format!("[{len}]"));
            inner = elem;
        }
        Ok(format!("{} {name}{dims}", self.c_type_name(inner)?))
    }

    /// Zero value used to initialize a local of type `ty`.
    pub(super) fn c_zero(&self, ty: &TypeExpr) -> Result<&'static str, CompilerError> {
        Ok(match ty {
            TypeExpr::Num(_) | TypeExpr::Ideal => "0",
            TypeExpr::Bool => "false",
            TypeExpr::Ptr(_)
            | TypeExpr::Nptr(_)
            | TypeExpr::Nullptr
            | TypeExpr::TokenReader
            | TypeExpr::TokenWriter => "NULL",
            TypeExpr::Array { .. }
            | TypeExpr::Slice { .. }
            | TypeExpr::Table { .. }
            | TypeExpr::Named { .. }
            | TypeExpr::Status
            | TypeExpr::EmptyStruct => "{0}",
            TypeExpr::IoReader | TypeExpr::IoWriter => {
                return Err(internal(format!("io local of type {ty} has no zero value")));
            }
        })
    }

    /// C name of a status declared by the current package.
    pub(super) fn local_status_cname(&self, msg: &str) -> Result<String, CompilerError> {
        let class = StatusClass::of(msg)
            .ok_or_else(|| unsupported(format!("unrecognized status {msg:?}")))?;
        Ok(format!(
            "{}{}__{}",
            self.pkg_prefix(),
            class.c_infix(),
            status_snake(msg)
        ))
    }

    pub(super) fn status_cname(&self, s: &StatusRef) -> Result<String, CompilerError> {
        match s.pkg.as_deref() {
            None => {
                if !self.pkg.statuses.iter().any(|d| d.msg == s.msg) {
                    return Err(unsupported(format!("unrecognized status {:?}", s.msg)));
                }
                self.local_status_cname(&s.msg)
            }
            Some("base") => runtime::base_status_cname(&s.msg)
                .map(str::to_string)
                .ok_or_else(|| unsupported(format!("unrecognized status base.{:?}", s.msg))),
            Some(pkg) => {
                let class = StatusClass::of(&s.msg)
                    .ok_or_else(|| unsupported(format!("unrecognized status {pkg}.{:?}", s.msg)))?;
                Ok(format!("ward_{pkg}__{}__{}", class.c_infix(), status_snake(&s.msg)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_messages_become_snake_identifiers() {
        assert_eq!(status_snake("#bad header"), "bad_header");
        assert_eq!(status_snake("$short read"), "short_read");
        assert_eq!(status_snake("#bad  Huffman-code (over-subscribed)"), "bad_huffman_code_over_subscribed");
    }
}
