// RegBridge - Register Map Generation Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validate;

pub use validate::{validate_config, Validation};

fn default_true() -> bool {
    true
}

/// Output toggles for one generation request.
///
/// Crosses the sandbox boundary as a JSON string, never as interpreter-native literals.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct GenerationOptions {
    #[serde(default = "default_true")]
    pub vhdl: bool,
    #[serde(default = "default_true")]
    pub c: bool,
    #[serde(default = "default_true")]
    pub docs: bool,
    #[serde(default = "default_true")]
    pub axil: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            vhdl: true,
            c: true,
            docs: true,
            axil: true,
        }
    }
}

impl GenerationOptions {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Lenient parse: anything unreadable yields all-default options.
    pub fn from_json_lenient(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_default()
    }
}

/// Parses hex text with or without a `0x` prefix. Unparsable input yields 0.
pub fn parse_hex_or_zero(text: &str) -> u64 {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u64::from_str_radix(digits, 16).unwrap_or(0)
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_max_attempts() -> u32 {
    15
}

fn default_retry_delay_ms() -> u64 {
    300
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// Interpreter executable used for the sandbox.
    #[serde(default = "default_python")]
    pub python: String,
    /// Filesystem root shared with the sandbox. A fresh temp dir when unset.
    #[serde(default)]
    pub sandbox_root: Option<PathBuf>,
    /// Availability polls before provisioning gives up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            sandbox_root: None,
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_optional_packages() -> Vec<String> {
    ["jinja2", "pyyaml", "setuptools", "atpublic", "jsonschema"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_plugin() -> String {
    "wavedrom".to_string()
}

fn default_plugin_sources() -> Vec<String> {
    [
        "wavedrom-python",
        "git+https://github.com/wavedrom/wavedrom-python.git#egg=wavedrom-python",
        "git+https://github.com/rburchell/wavedrom-python.git#egg=wavedrom-python",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PackagesConfig {
    /// Best-effort dependencies, installed one at a time.
    #[serde(default = "default_optional_packages")]
    pub optional: Vec<String>,
    /// Diagram plugin, which often has no binary package for the sandbox.
    #[serde(default = "default_plugin")]
    pub plugin: String,
    /// Alternate install sources for the plugin, tried in order after `plugin`.
    #[serde(default = "default_plugin_sources")]
    pub plugin_sources: Vec<String>,
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            optional: default_optional_packages(),
            plugin: default_plugin(),
            plugin_sources: default_plugin_sources(),
        }
    }
}

fn default_archive_name() -> String {
    "master.zip".to_string()
}

fn default_fallback_archive() -> String {
    "tools/registermap_gen/master.zip".to_string()
}

fn default_token() -> String {
    "corsair".to_string()
}

fn default_stub_module() -> String {
    "wavedrom".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LibraryConfig {
    /// File name substituted for the trailing segment of `script_location`.
    #[serde(default = "default_archive_name")]
    pub archive_name: String,
    /// Used when no archive location can be derived.
    #[serde(default = "default_fallback_archive")]
    pub fallback_archive: String,
    /// Location the archive is derived from. The running executable when unset.
    #[serde(default)]
    pub script_location: Option<String>,
    /// Substring identifying the library's top-level directory inside the archive.
    #[serde(default = "default_token")]
    pub token: String,
    /// Name of the importable package directory.
    #[serde(default = "default_token")]
    pub package: String,
    /// Compatibility stub source. The bundled stub when unset.
    #[serde(default)]
    pub stub_location: Option<String>,
    /// Module name the stub stands in for.
    #[serde(default = "default_stub_module")]
    pub stub_module: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            archive_name: default_archive_name(),
            fallback_archive: default_fallback_archive(),
            script_location: None,
            token: default_token(),
            package: default_token(),
            stub_location: None,
            stub_module: default_stub_module(),
        }
    }
}

fn default_model_class() -> String {
    "RegisterMap".to_string()
}

fn default_generators() -> String {
    "generators".to_string()
}

fn default_generator_base() -> String {
    "Generator".to_string()
}

fn default_config_module() -> String {
    "config".to_string()
}

fn default_pipeline_methods() -> Vec<String> {
    vec!["generate_all".to_string(), "generate".to_string()]
}

fn default_diagram_generator() -> String {
    "Wavedrom".to_string()
}

fn default_stub_fallback_class() -> String {
    "RegisterDiagram".to_string()
}

/// Names the generator library is expected to expose. Every name is looked up, never assumed.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SurfaceConfig {
    #[serde(default = "default_token")]
    pub module: String,
    #[serde(default = "default_model_class")]
    pub model_class: String,
    #[serde(default = "default_generators")]
    pub generators: String,
    #[serde(default = "default_generator_base")]
    pub generator_base: String,
    #[serde(default = "default_config_module")]
    pub config_module: String,
    #[serde(default = "default_pipeline_methods")]
    pub pipeline_methods: Vec<String>,
    #[serde(default = "default_diagram_generator")]
    pub diagram_generator: String,
    #[serde(default = "default_stub_fallback_class")]
    pub stub_fallback_class: String,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            module: default_token(),
            model_class: default_model_class(),
            generators: default_generators(),
            generator_base: default_generator_base(),
            config_module: default_config_module(),
            pipeline_methods: default_pipeline_methods(),
            diagram_generator: default_diagram_generator(),
            stub_fallback_class: default_stub_fallback_class(),
        }
    }
}

fn default_max_artifact_size() -> String {
    "16MB".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Collected artifacts above this size are skipped, e.g. "16MB".
    #[serde(default = "default_max_artifact_size")]
    pub max_artifact_size: String,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_artifact_size: default_max_artifact_size(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub packages: PackagesConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub surface: SurfaceConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl BridgeConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read bridge config at {:?}", path.as_ref()))?;
        let config = Self::from_yaml(&content)?;
        tracing::debug!("Loaded bridge config from {:?}", path.as_ref());
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document is a valid, all-default config.
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml).context("Failed to parse Bridge Config YAML")?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.runtime.max_attempts == 0 {
            anyhow::bail!("Runtime 'max_attempts' must be greater than zero");
        }

        if self.library.token.trim().is_empty() {
            anyhow::bail!("Library 'token' cannot be empty");
        }

        if self.surface.module.trim().is_empty() {
            anyhow::bail!("Surface 'module' cannot be empty");
        }

        parse_size(&self.limits.max_artifact_size)
            .context("Limit 'max_artifact_size' is not a valid size")?;

        Ok(())
    }

    pub fn max_artifact_bytes(&self) -> u64 {
        parse_size(&self.limits.max_artifact_size).unwrap_or(u64::MAX)
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
