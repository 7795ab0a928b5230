// RegBridge - Register Map Generation Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    pub message: String,
}

impl Validation {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            valid: true,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
        }
    }
}

/// Structural check of an uploaded register map, independent of the generator library.
///
/// Rules are checked in order and the first violation wins:
/// 1. the text parses as a JSON object;
/// 2. it has a `registers` array;
/// 3. every element is an object;
/// 4. every element has a `name`.
pub fn validate_config(text: &str) -> Validation {
    let config: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return Validation::fail(format!("Invalid JSON: {}", e)),
    };

    let Some(object) = config.as_object() else {
        return Validation::fail("Configuration must be a JSON object");
    };

    let Some(registers) = object.get("registers") else {
        return Validation::fail("Configuration must contain a \"registers\" array");
    };

    let Some(registers) = registers.as_array() else {
        return Validation::fail("\"registers\" must be an array");
    };

    for (idx, reg) in registers.iter().enumerate() {
        let Some(reg) = reg.as_object() else {
            return Validation::fail(format!("Register at index {} must be an object", idx));
        };
        if !reg.contains_key("name") {
            return Validation::fail(format!(
                "Register at index {} is missing \"name\" field",
                idx
            ));
        }
    }

    Validation::ok(format!(
        "Configuration is valid with {} register(s)",
        registers.len()
    ))
}
