// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Contract validation of declared step outputs.
//!
//! Checks every output the step declared against the contract's schema
//! kind. The first violation wins; its reason names the artifact so
//! retry events read usefully.

use serde_json::Value;
use std::path::Path;
use wave_config::{ContractDef, OutputDef, SchemaKind};

/// Result of validating a step's outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractOutcome {
    Valid,
    Invalid(String),
}

impl ContractOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ContractOutcome::Valid)
    }
}

/// Validate all declared outputs on disk against the contract.
pub fn validate_outputs(
    contract: &ContractDef,
    outputs: &[OutputDef],
    workdir: &Path,
) -> ContractOutcome {
    for output in outputs {
        let path = workdir.join(&output.path);
        if let Some(reason) = check_output(&contract.schema, output, &path) {
            return ContractOutcome::Invalid(reason);
        }
    }
    ContractOutcome::Valid
}

fn check_output(schema: &SchemaKind, output: &OutputDef, path: &Path) -> Option<String> {
    if !path.is_file() {
        return Some(format!("artifact '{}' missing at {}", output.name, path.display()));
    }

    match schema {
        SchemaKind::Exists => None,
        SchemaKind::NonEmpty => {
            let len = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            (len == 0).then(|| format!("artifact '{}' is empty", output.name))
        }
        SchemaKind::Json => parse_json(output, path).err(),
        SchemaKind::Schema { schema } => {
            let value = match parse_json(output, path) {
                Ok(value) => value,
                Err(reason) => return Some(reason),
            };
            validate_value(schema, &value, "$")
                .err()
                .map(|reason| format!("artifact '{}': {}", output.name, reason))
        }
    }
}

fn parse_json(output: &OutputDef, path: &Path) -> Result<Value, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("artifact '{}' unreadable: {}", output.name, e))?;
    serde_json::from_str(&content)
        .map_err(|e| format!("artifact '{}' is not valid JSON: {}", output.name, e))
}

/// Validate a value against a schema subset: `type`, `required`,
/// `properties`, `items`, `enum`.
fn validate_value(schema: &Value, value: &Value, at: &str) -> Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        let matches = match expected {
            "object" => value.is_object(),
            "array" => value.is_array(),
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "null" => value.is_null(),
            other => return Err(format!("{}: unsupported schema type '{}'", at, other)),
        };
        if !matches {
            return Err(format!("{}: expected {}", at, expected));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(format!("{}: value not in enum", at));
        }
    }

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if value.get(key).is_none() {
                return Err(format!("{}: missing required key '{}'", at, key));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (key, subschema) in properties {
            if let Some(child) = value.get(key) {
                validate_value(subschema, child, &format!("{}.{}", at, key))?;
            }
        }
    }

    if let Some(items) = schema.get("items") {
        if let Some(elements) = value.as_array() {
            for (i, element) in elements.iter().enumerate() {
                validate_value(items, element, &format!("{}[{}]", at, i))?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "contract_tests.rs"]
mod tests;
