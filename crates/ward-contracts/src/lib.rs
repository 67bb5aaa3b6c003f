//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for schema/version strings that
//! appear in machine-readable I/O of the `wardc` tool.

pub const WARDAST_SCHEMA_VERSION: &str = "ward.wardast@0.1.0";
pub const WARDDIAG_SCHEMA_VERSION: &str = "ward.warddiag@0.1.0";

pub const WARDC_REPORT_SCHEMA_VERSION: &str = "wardc.report@0.1.0";
