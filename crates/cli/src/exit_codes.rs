//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                                  |
//! |------|----------------------------------------------------------|
//! | 0    | Success (including "no divergences found")               |
//! | 1    | General error (unspecified)                              |
//! | 2    | CLI usage error (bad args)                               |
//! | 3    | Configuration missing or invalid                         |
//! | 4    | Store unreachable, or SSH tunnel failed                  |
//! | 5    | Query failed                                             |
//! | 6    | Query or overall timeout                                 |
//! | 7    | Reports written only partially                           |
//! | 8    | Invalid input data (offline CSV, inconsistent keys)      |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `error_code` or the relevant command

use crate::pipeline::PipelineError;
use crate::sources::SourceError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unparsable flag values.
pub const EXIT_USAGE: u8 = 2;

/// Settings file unreadable, unparsable, or required fields missing.
pub const EXIT_CONFIG: u8 = 3;

/// A store could not be reached, or the SSH tunnel did not come up.
pub const EXIT_CONNECTIVITY: u8 = 4;

/// A query was rejected or failed mid-flight.
pub const EXIT_QUERY: u8 = 5;

/// A query exceeded `timeouts.query_secs`, or the whole run exceeded
/// `timeouts.overall_secs`.
pub const EXIT_TIMEOUT: u8 = 6;

/// Classification finished but at least one report file failed to write.
/// The summary is still printed.
pub const EXIT_REPORT_PARTIAL: u8 = 7;

/// Offline input unreadable or malformed, or a record whose canonical key
/// does not match its raw tax ID.
pub const EXIT_INVALID_INPUT: u8 = 8;

/// Map a pipeline error to its exit code.
pub fn pipeline_exit_code(err: &PipelineError) -> u8 {
    match err {
        PipelineError::Source(source) => source_exit_code(source),
        PipelineError::Recon(_) => EXIT_INVALID_INPUT,
        PipelineError::OverallTimeout(_) => EXIT_TIMEOUT,
    }
}

pub fn source_exit_code(err: &SourceError) -> u8 {
    match err {
        SourceError::Connectivity { .. } => EXIT_CONNECTIVITY,
        SourceError::Query { .. } => EXIT_QUERY,
        SourceError::Timeout { .. } => EXIT_TIMEOUT,
        SourceError::Input { .. } => EXIT_INVALID_INPUT,
    }
}
