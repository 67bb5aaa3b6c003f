use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
}

impl NumType {
    pub fn parse_named(name: &str) -> Option<Self> {
        match name {
            "u8" => Some(NumType::U8),
            "u16" => Some(NumType::U16),
            "u32" => Some(NumType::U32),
            "u64" => Some(NumType::U64),
            "i8" => Some(NumType::I8),
            "i16" => Some(NumType::I16),
            "i32" => Some(NumType::I32),
            "i64" => Some(NumType::I64),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NumType::U8 => "u8",
            NumType::U16 => "u16",
            NumType::U32 => "u32",
            NumType::U64 => "u64",
            NumType::I8 => "i8",
            NumType::I16 => "i16",
            NumType::I32 => "i32",
            NumType::I64 => "i64",
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            NumType::U8 | NumType::I8 => 8,
            NumType::U16 | NumType::I16 => 16,
            NumType::U32 | NumType::I32 => 32,
            NumType::U64 | NumType::I64 => 64,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, NumType::I8 | NumType::I16 | NumType::I32 | NumType::I64)
    }

    /// Narrower than a C `int`, so C arithmetic promotes it.
    pub fn is_small(self) -> bool {
        self.bits() < 32
    }

    pub fn c_name(self) -> &'static str {
        match self {
            NumType::U8 => "uint8_t",
            NumType::U16 => "uint16_t",
            NumType::U32 => "uint32_t",
            NumType::U64 => "uint64_t",
            NumType::I8 => "int8_t",
            NumType::I16 => "int16_t",
            NumType::I32 => "int32_t",
            NumType::I64 => "int64_t",
        }
    }
}

/// Resolved semantic type of an expression, field, argument or local.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeExpr {
    Num(NumType),
    /// Type of an untyped numeric constant.
    Ideal,
    Bool,
    Status,
    EmptyStruct,
    Nullptr,
    IoReader,
    IoWriter,
    TokenReader,
    TokenWriter,
    Named {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pkg: Option<String>,
        name: String,
    },
    Ptr(Box<TypeExpr>),
    Nptr(Box<TypeExpr>),
    Array {
        len: u64,
        elem: Box<TypeExpr>,
        #[serde(default)]
        read_only: bool,
    },
    Slice {
        elem: Box<TypeExpr>,
        #[serde(default)]
        read_only: bool,
    },
    Table {
        elem: Box<TypeExpr>,
        #[serde(default)]
        read_only: bool,
    },
}

impl TypeExpr {
    pub fn u8() -> Self {
        TypeExpr::Num(NumType::U8)
    }

    pub fn u64() -> Self {
        TypeExpr::Num(NumType::U64)
    }

    pub fn slice_u8() -> Self {
        TypeExpr::Slice {
            elem: Box::new(TypeExpr::u8()),
            read_only: false,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Named {
            pkg: None,
            name: name.into(),
        }
    }

    pub fn num(&self) -> Option<NumType> {
        match self {
            TypeExpr::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_num_or_ideal(&self) -> bool {
        matches!(self, TypeExpr::Num(_) | TypeExpr::Ideal)
    }

    pub fn is_small_integer(&self) -> bool {
        self.num().is_some_and(NumType::is_small)
    }

    /// Bit width of an unsigned numeric type, used to key the saturating helpers.
    pub fn uint_bits(&self) -> Option<u32> {
        match self.num()? {
            n if n.is_signed() => None,
            n => Some(n.bits()),
        }
    }

    pub fn is_io(&self) -> bool {
        matches!(self, TypeExpr::IoReader | TypeExpr::IoWriter)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, TypeExpr::Ptr(_) | TypeExpr::Nptr(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, TypeExpr::Array { .. })
    }

    pub fn is_slice(&self) -> bool {
        matches!(self, TypeExpr::Slice { .. })
    }

    pub fn is_read_only(&self) -> bool {
        match self {
            TypeExpr::Array { read_only, .. }
            | TypeExpr::Slice { read_only, .. }
            | TypeExpr::Table { read_only, .. } => *read_only,
            _ => false,
        }
    }

    /// Strips one level of `ptr`/`nptr`.
    pub fn pointee(&self) -> &TypeExpr {
        match self {
            TypeExpr::Ptr(inner) | TypeExpr::Nptr(inner) => inner,
            other => other,
        }
    }

    pub fn is_utility(&self) -> bool {
        matches!(self, TypeExpr::Named { name, .. } if name == "utility")
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Num(n) => write!(f, "base.{}", n.as_str()),
            TypeExpr::Ideal => f.write_str("ideal"),
            TypeExpr::Bool => f.write_str("base.bool"),
            TypeExpr::Status => f.write_str("base.status"),
            TypeExpr::EmptyStruct => f.write_str("base.empty_struct"),
            TypeExpr::Nullptr => f.write_str("base.nullptr"),
            TypeExpr::IoReader => f.write_str("base.io_reader"),
            TypeExpr::IoWriter => f.write_str("base.io_writer"),
            TypeExpr::TokenReader => f.write_str("base.token_reader"),
            TypeExpr::TokenWriter => f.write_str("base.token_writer"),
            TypeExpr::Named { pkg: Some(pkg), name } => write!(f, "{pkg}.{name}"),
            TypeExpr::Named { pkg: None, name } => f.write_str(name),
            TypeExpr::Ptr(inner) => write!(f, "ptr {inner}"),
            TypeExpr::Nptr(inner) => write!(f, "nptr {inner}"),
            TypeExpr::Array {
                len,
                elem,
                read_only,
            } => {
                let kw = if *read_only { "roarray" } else { "array" };
                write!(f, "{kw}[{len}] {elem}")
            }
            TypeExpr::Slice { elem, read_only } => {
                let kw = if *read_only { "roslice" } else { "slice" };
                write!(f, "{kw} {elem}")
            }
            TypeExpr::Table { elem, read_only } => {
                let kw = if *read_only { "rotable" } else { "table" };
                write!(f, "{kw} {elem}")
            }
        }
    }
}
