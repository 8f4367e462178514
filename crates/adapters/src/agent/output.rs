// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parsing of agent stdout into an invocation outcome.

use super::{AdapterError, InvocationOutcome};
use wave_config::OutputFormat;

/// Rough chars-per-token heuristic for adapters that report no usage.
const CHARS_PER_TOKEN: usize = 4;

/// Estimate a token count from raw text length.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() / CHARS_PER_TOKEN) as u64
}

/// Interpret a successful child's stdout according to the adapter's
/// declared output format.
///
/// Json format expects a single JSON object, conventionally
/// `{"result": ..., "usage": {"total_tokens": N}}`; a missing usage
/// field falls back to estimation. Text format passes stdout through.
pub fn parse_outcome(
    format: OutputFormat,
    stdout: String,
    stderr: String,
    exit_code: i32,
) -> Result<InvocationOutcome, AdapterError> {
    match format {
        OutputFormat::Json => {
            let value: serde_json::Value = serde_json::from_str(stdout.trim())
                .map_err(|e| AdapterError::ParseError(e.to_string()))?;
            let reported = value
                .get("usage")
                .and_then(|u| u.get("total_tokens"))
                .and_then(|t| t.as_u64());
            let tokens_estimated = reported.is_none();
            let tokens_used = reported.unwrap_or_else(|| estimate_tokens(&stdout));
            Ok(InvocationOutcome {
                stdout,
                stderr,
                exit_code,
                tokens_used,
                tokens_estimated,
                result: Some(value),
            })
        }
        OutputFormat::Text => Ok(InvocationOutcome {
            tokens_used: estimate_tokens(&stdout),
            tokens_estimated: true,
            stdout,
            stderr,
            exit_code,
            result: None,
        }),
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
