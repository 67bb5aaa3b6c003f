use serde::{Deserialize, Serialize};

use crate::ast::{Effect, Expr, Stmt, StmtKind};
use crate::types::TypeExpr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(default)]
    pub statuses: Vec<StatusDecl>,
    #[serde(default)]
    pub consts: Vec<ConstDecl>,
    #[serde(default)]
    pub structs: Vec<StructDecl>,
    #[serde(default)]
    pub funcs: Vec<FuncDef>,
}

/// A package-level status message, e.g. `"#bad header"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDecl {
    pub msg: String,
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub value: i128,
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeExpr,
    /// Routed to the struct's `private_data` area instead of `private_impl`.
    #[serde(default)]
    pub private_data: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    /// `choose cpu_arch >= feature`
    CpuArch { feature: String },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDef {
    /// Owning struct name, or `utility` for package-level helpers.
    pub receiver: String,
    pub name: String,
    #[serde(default)]
    pub effect: Effect,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub choosy: bool,
    #[serde(default)]
    pub args: Vec<Param>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out: Option<TypeExpr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preconditions: Vec<Precondition>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

impl FuncDef {
    pub fn is_utility(&self) -> bool {
        self.receiver == "utility"
    }

    pub fn returns_status(&self) -> bool {
        self.out.as_ref() == Some(&TypeExpr::Status)
    }

    /// I/O-typed arguments, whose cursors live in local pointers while the
    /// function runs.
    pub fn io_args(&self) -> impl Iterator<Item = &Param> + '_ {
        self.args.iter().filter(|p| p.ty.is_io())
    }

    pub fn cpu_arch_features(&self) -> impl Iterator<Item = &str> + '_ {
        self.preconditions.iter().filter_map(|p| match p {
            Precondition::CpuArch { feature } => Some(feature.as_str()),
            Precondition::Expr(_) => None,
        })
    }

    /// Every `var` declared anywhere in the body, in source order.
    pub fn locals(&self) -> Vec<(&str, &TypeExpr)> {
        fn walk<'a>(body: &'a [Stmt], out: &mut Vec<(&'a str, &'a TypeExpr)>) {
            for s in body {
                match &s.kind {
                    StmtKind::Var { name, ty } => {
                        if !out.iter().any(|(n, _)| *n == name.as_str()) {
                            out.push((name.as_str(), ty));
                        }
                    }
                    StmtKind::IoManip(n) => walk(&n.body, out),
                    StmtKind::If(n) => {
                        let mut n = Some(n);
                        while let Some(x) = n {
                            walk(&x.body_if_true, out);
                            walk(&x.body_if_false, out);
                            n = x.else_if.as_deref();
                        }
                    }
                    StmtKind::Iterate(n) => {
                        for r in &n.rounds {
                            walk(&r.body, out);
                        }
                    }
                    StmtKind::While(n) => walk(&n.body, out),
                    StmtKind::Assert { .. }
                    | StmtKind::Assign { .. }
                    | StmtKind::Choose { .. }
                    | StmtKind::Jump { .. }
                    | StmtKind::Ret { .. } => {}
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.body, &mut out);
        out
    }
}

impl Package {
    pub fn find_struct(&self, name: &str) -> Option<&StructDecl> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub fn find_func(&self, receiver: &str, name: &str) -> Option<&FuncDef> {
        self.funcs
            .iter()
            .find(|f| f.receiver == receiver && f.name == name)
    }

    pub fn is_private_data_field(&self, struct_name: &str, field: &str) -> bool {
        self.find_struct(struct_name)
            .and_then(|s| s.fields.iter().find(|f| f.name == field))
            .is_some_and(|f| f.private_data)
    }
}
