use crate::compile::CompilerError;
use crate::program::FuncDef;

use super::{internal, unsupported, Emitter};

/// Preprocessor guard, runtime probe and target attribute for one CPU
/// feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct CpuArch {
    pub(super) macro_name: &'static str,
    pub(super) probe: &'static str,
    pub(super) attribute: &'static str,
}

const CPU_ARCHES: &[(&str, CpuArch)] = &[
    (
        "arm_crc32",
        CpuArch {
            macro_name: "ARM_CRC32",
            probe: "arm_crc32",
            attribute: "",
        },
    ),
    (
        "arm_neon",
        CpuArch {
            macro_name: "ARM_NEON",
            probe: "arm_neon",
            attribute: "",
        },
    ),
    (
        "x86_sse42",
        CpuArch {
            macro_name: "X86_64_V2",
            probe: "x86_sse42",
            attribute: "WARD_BASE__MAYBE_ATTRIBUTE_TARGET(\"pclmul,popcnt,sse4.2\")",
        },
    ),
    (
        "x86_avx2",
        CpuArch {
            macro_name: "X86_64_V3",
            probe: "x86_avx2",
            attribute: "WARD_BASE__MAYBE_ATTRIBUTE_TARGET(\"pclmul,popcnt,sse4.2,avx2\")",
        },
    ),
    (
        "x86_bmi2",
        CpuArch {
            macro_name: "X86_64_V3",
            probe: "x86_bmi2",
            attribute: "WARD_BASE__MAYBE_ATTRIBUTE_TARGET(\"bmi2\")",
        },
    ),
];

/// The single CPU feature `f` is specialized for, if any.
pub(super) fn cpu_arch_of(f: &FuncDef) -> Result<Option<CpuArch>, CompilerError> {
    let mut found = None;
    for feature in f.cpu_arch_features() {
        if found.is_some() {
            return Err(internal(format!(
                "too many choose-cpu_arch preconditions (fn={}.{})",
                f.receiver, f.name
            )));
        }
        let arch = CPU_ARCHES
            .iter()
            .find(|(name, _)| *name == feature)
            .map(|(_, a)| *a)
            .ok_or_else(|| unsupported(format!("unsupported cpu_arch feature {feature:?}")))?;
        found = Some(arch);
    }
    Ok(found)
}

impl<'a> Emitter<'a> {
    /// `choose name = [a, b, name]`: installs the first implementation whose
    /// CPU feature is present at run time.
    pub(super) fn lower_choose(&mut self, name: &str, args: &[String]) -> Result<(), CompilerError> {
        if args.is_empty() {
            return Ok(());
        }
        let def = self.cur()?.def;
        if def.is_utility() {
            return Err(unsupported(format!(
                "cannot choose {name} from a utility function"
            )));
        }
        let pkg = self.pkg;
        let recv = def.receiver.as_str();
        let pfx = self.pkg_prefix();

        self.open(&format!("self->private_impl.choosy_{name} = ("));
        let mut conclusive = false;
        for id in args {
            let suffix = if id == name { "__choosy_default" } else { "" };
            let f = pkg.find_func(recv, id).ok_or_else(|| {
                internal(format!("choose arm {recv}.{id} does not exist"))
            })?;
            let target = format!("&{pfx}{recv}__{id}{suffix}");
            match cpu_arch_of(f)? {
                None => {
                    self.line(&target);
                    conclusive = true;
                    break;
                }
                Some(arch) => {
                    self.raw_line(&format!(
                        "#if defined(WARD_PRIVATE_IMPL__CPU_ARCH__{})",
                        arch.macro_name
                    ));
                    self.line(&format!(
                        "ward_base__cpu_arch__have_{}() ? {target} :",
                        arch.probe
                    ));
                    self.raw_line("#endif");
                }
            }
        }
        if !conclusive {
            self.line(&format!("self->private_impl.choosy_{name}"));
        }
        self.indent = self.indent.saturating_sub(1);
        self.line(");");
        Ok(())
    }
}
