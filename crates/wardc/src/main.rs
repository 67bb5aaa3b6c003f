use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use ward_contracts::WARDC_REPORT_SCHEMA_VERSION;
use wardc::compile::{self, CompileOptions, CompileStats};
use wardc::diagnostics::{self, Diagnostic};
use wardc::language;
use wardc::language::limits::Limits;
use wardc::logging;
use wardc::runtime;

#[derive(Parser)]
#[command(name = "wardc")]
#[command(about = "Ward compiler backend (checked wardAST -> C).", long_about = None)]
struct Cli {
    /// Tracing filter, e.g. `debug` or `wardc=trace`. Overrides RUST_LOG.
    #[arg(long, global = true, value_name = "FILTER")]
    log_level: Option<String>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    LangId,
    /// Print the C runtime header that generated code includes.
    BaseHeader {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Lower a checked package to C.
    Gen {
        #[arg(long)]
        input: PathBuf,
        /// Output path. With --report-json and no --out only the report is printed.
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        genlinenum: bool,
        #[arg(long)]
        emit_base_header: bool,
        #[arg(long)]
        report_json: bool,
        #[arg(long, value_name = "N")]
        max_body_depth: Option<u32>,
        #[arg(long, value_name = "N")]
        max_expr_depth: Option<u32>,
    },
    /// Run the lowering and report errors without writing C.
    Check {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        report_json: bool,
    },
}

#[derive(Debug, Serialize)]
struct WardcToolReport {
    schema_version: &'static str,
    command: &'static str,
    ok: bool,
    r#in: String,
    diagnostics_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    diagnostics: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    c_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<CompileStats>,
    exit_code: u8,
}

impl WardcToolReport {
    fn new(command: &'static str, input: &Path) -> Self {
        Self {
            schema_version: WARDC_REPORT_SCHEMA_VERSION,
            command,
            ok: true,
            r#in: input.display().to_string(),
            diagnostics_count: 0,
            diagnostics: Vec::new(),
            c_sha256: None,
            stats: None,
            exit_code: 0,
        }
    }

    fn failed(mut self, diagnostic: Diagnostic, exit_code: u8) -> Self {
        self.ok = false;
        self.diagnostics.push(diagnostic);
        self.diagnostics_count = self.diagnostics.len();
        self.exit_code = exit_code;
        self
    }
}

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init_with_level(cli.log_level.as_deref());

    match cli.cmd {
        Cmd::LangId => {
            println!("{}", language::LANG_ID);
            Ok(ExitCode::SUCCESS)
        }
        Cmd::BaseHeader { out } => {
            write_output(out.as_deref(), &runtime::base_header())?;
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Gen {
            input,
            out,
            genlinenum,
            emit_base_header,
            report_json,
            max_body_depth,
            max_expr_depth,
        } => {
            let mut limits = Limits::from_env();
            if let Some(n) = max_body_depth {
                limits.max_body_depth = n;
            }
            if let Some(n) = max_expr_depth {
                limits.max_expr_depth = n;
            }
            let options = CompileOptions {
                genlinenum,
                emit_base_header,
                limits,
            };

            let bytes = match read_input("gen", &input, report_json)? {
                Ok(bytes) => bytes,
                Err(code) => return Ok(code),
            };
            let report = WardcToolReport::new("gen", &input);
            match compile::compile_wardast_to_c(&bytes, &options) {
                Ok(output) => {
                    debug!(
                        bytes = output.c_src.len(),
                        functions = output.stats.functions,
                        "generated C"
                    );
                    if !report_json || out.is_some() {
                        write_output(out.as_deref(), &output.c_src)?;
                    }
                    if report_json {
                        print_json(&WardcToolReport {
                            c_sha256: Some(sha256_hex(output.c_src.as_bytes())),
                            stats: Some(output.stats),
                            ..report
                        })?;
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    if report_json {
                        print_json(&report.failed(Diagnostic::from(&err), 1))?;
                        return Ok(ExitCode::from(1));
                    }
                    anyhow::bail!("gen failed: {err}");
                }
            }
        }
        Cmd::Check { input, report_json } => {
            let options = CompileOptions {
                limits: Limits::from_env(),
                ..CompileOptions::default()
            };
            let bytes = match read_input("check", &input, report_json)? {
                Ok(bytes) => bytes,
                Err(code) => return Ok(code),
            };
            let report = WardcToolReport::new("check", &input);
            match compile::check_wardast(&bytes, &options) {
                Ok(stats) => {
                    if report_json {
                        print_json(&WardcToolReport {
                            stats: Some(stats),
                            ..report
                        })?;
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    if report_json {
                        print_json(&report.failed(Diagnostic::from(&err), 1))?;
                        return Ok(ExitCode::from(1));
                    }
                    anyhow::bail!("check failed: {err}");
                }
            }
        }
    }
}

/// Reads `input`. On failure with `--report-json` the report is printed and
/// the exit code to use is returned instead of the bytes.
fn read_input(
    command: &'static str,
    input: &Path,
    report_json: bool,
) -> Result<std::result::Result<Vec<u8>, ExitCode>> {
    match std::fs::read(input) {
        Ok(bytes) => Ok(Ok(bytes)),
        Err(err) => {
            if report_json {
                let d = Diagnostic::error(
                    diagnostics::CODE_IO,
                    diagnostics::Stage::Parse,
                    format!("read input {}: {err}", input.display()),
                );
                print_json(&WardcToolReport::new(command, input).failed(d, 2))?;
                return Ok(Err(ExitCode::from(2)));
            }
            Err(err).with_context(|| format!("read input: {}", input.display()))
        }
    }
}

fn write_output(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("create output dir: {}", parent.display()))?;
                }
            }
            std::fs::write(path, text.as_bytes())
                .with_context(|| format!("write: {}", path.display()))?;
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
