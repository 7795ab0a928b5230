// RegBridge - Register Map Generation Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything one successful generation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outputs {
    pub vhdl: String,
    pub c: String,
    pub docs: String,
    /// Base64 content keyed by `/`-separated path relative to the scratch root.
    pub files: BTreeMap<String, String>,
}

impl Outputs {
    pub fn decode_files(&self) -> Result<BTreeMap<String, Vec<u8>>, base64::DecodeError> {
        let engine = base64::engine::general_purpose::STANDARD;
        self.files
            .iter()
            .map(|(path, b64)| Ok((path.clone(), engine.decode(b64)?)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Envelope", try_from = "Envelope")]
pub enum GenerationResult {
    Success(Outputs),
    Failure {
        error: String,
        traceback: Option<String>,
    },
}

impl GenerationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, GenerationResult::Success(_))
    }

    pub fn failure(error: impl Into<String>) -> Self {
        GenerationResult::Failure {
            error: error.into(),
            traceback: None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Wire form: `{ success, outputs?, error?, traceback? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Outputs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl From<GenerationResult> for Envelope {
    fn from(result: GenerationResult) -> Self {
        match result {
            GenerationResult::Success(outputs) => Envelope {
                success: true,
                outputs: Some(outputs),
                error: None,
                traceback: None,
            },
            GenerationResult::Failure { error, traceback } => Envelope {
                success: false,
                outputs: None,
                error: Some(error),
                traceback,
            },
        }
    }
}

impl TryFrom<Envelope> for GenerationResult {
    type Error = String;

    fn try_from(env: Envelope) -> Result<Self, Self::Error> {
        match (env.success, env.outputs) {
            (true, Some(outputs)) => Ok(GenerationResult::Success(outputs)),
            (true, None) => Err("successful envelope without outputs".to_string()),
            (false, _) => Ok(GenerationResult::Failure {
                error: env.error.unwrap_or_else(|| "unknown error".to_string()),
                traceback: env.traceback,
            }),
        }
    }
}
