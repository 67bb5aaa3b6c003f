pub mod ast;
pub mod c_emit;
pub mod compile;
pub mod diagnostics;
pub mod facts;
pub mod language;
pub mod logging;
pub mod optimize;
pub mod program;
pub mod runtime;
pub mod types;
pub mod wardast;

mod fingerprint;
