// RegBridge - Register Map Generation Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Generation orchestrator.
//!
//! One request runs against a wiped scratch directory inside the sandbox root:
//! inputs are materialized, a model is built through an ordered strategy list, the
//! library's whole pipeline is tried before per-format generators, and whatever landed
//! on disk is collected into the result. Any error escaping those steps becomes a
//! failure envelope.

use crate::envelope::{GenerationResult, Outputs};
use crate::library::LibraryHandle;
use crate::marshal::Escaped;
use crate::registry::{self, ClassCandidate, OutputFormat};
use crate::sandbox::{fs, optional, Arg, ObjRef, Sandbox, SandboxError, SandboxResult};
use crate::strategy::{first_accepted, first_accepted_with, OnRaise, Outcome};
use anyhow::Context;
use base64::Engine;
use regbridge_config::{parse_hex_or_zero, BridgeConfig, GenerationOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub const LIBRARY_UNAVAILABLE: &str = "Register map library is not available";
pub const SCRATCH_DIR: &str = "scratch";
pub const REGS_FILE: &str = "regs.json";
pub const DEFAULT_SECONDARY_NAME: &str = "csrconfig";

pub fn scratch_dir(root: &Path) -> PathBuf {
    root.join(SCRATCH_DIR)
}

fn default_base_address() -> String {
    "0x00000000".to_string()
}

fn default_read_filler() -> String {
    "0xdeadbeef".to_string()
}

/// A named configuration file handed to the library next to the register map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryConfig {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Register map JSON, exactly as provided.
    pub config_text: String,
    #[serde(default)]
    pub options: GenerationOptions,
    #[serde(default = "default_base_address")]
    pub base_address: String,
    #[serde(default = "default_read_filler")]
    pub read_filler: String,
    #[serde(default)]
    pub secondary: Option<SecondaryConfig>,
    /// Original upload name; a copy of the config is written under it.
    #[serde(default)]
    pub file_name: Option<String>,
}

impl GenerationRequest {
    pub fn new(config_text: impl Into<String>) -> Self {
        Self {
            config_text: config_text.into(),
            options: GenerationOptions::default(),
            base_address: default_base_address(),
            read_filler: default_read_filler(),
            secondary: None,
            file_name: None,
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_secondary(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.secondary = Some(SecondaryConfig {
            name: name.into(),
            text: text.into(),
        });
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn base_address_value(&self) -> u64 {
        parse_hex_or_zero(&self.base_address)
    }

    pub fn read_filler_value(&self) -> u64 {
        parse_hex_or_zero(&self.read_filler)
    }
}

/// Last path component of a user-supplied name, if it has one.
fn file_component(name: &str) -> Option<String> {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.trim().is_empty())
}

#[derive(Debug, Clone, Copy)]
enum ModelShape {
    Empty,
    PathCtor,
    Reader(&'static str),
    ParseLoad,
}

struct ModelAttempt<'a> {
    label: &'a str,
    class: ObjRef,
    shape: ModelShape,
}

impl fmt::Display for ModelAttempt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shape {
            ModelShape::Empty => write!(f, "{}()", self.label),
            ModelShape::PathCtor => write!(f, "{}(path)", self.label),
            ModelShape::Reader(method) => write!(f, "{}().{}(path)", self.label, method),
            ModelShape::ParseLoad => write!(f, "{}().load(data)", self.label),
        }
    }
}

const MODEL_SHAPES: [ModelShape; 5] = [
    ModelShape::PathCtor,
    ModelShape::Reader("read_json"),
    ModelShape::Reader("read_yaml"),
    ModelShape::Reader("read_file"),
    ModelShape::ParseLoad,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineShape {
    ConfigOutdir,
    ConfigOutdirKw,
    Outdir,
    OutdirKw,
    Bare,
}

impl PipelineShape {
    const WITH_CONFIG: [PipelineShape; 5] = [
        PipelineShape::ConfigOutdir,
        PipelineShape::ConfigOutdirKw,
        PipelineShape::Outdir,
        PipelineShape::OutdirKw,
        PipelineShape::Bare,
    ];
    const WITHOUT_CONFIG: [PipelineShape; 3] = [
        PipelineShape::Outdir,
        PipelineShape::OutdirKw,
        PipelineShape::Bare,
    ];

    fn arguments(
        self,
        config: Option<&Path>,
        outdir: &Path,
    ) -> (Vec<Arg>, Vec<(&'static str, Arg)>) {
        let out = Arg::path(outdir);
        match (self, config) {
            (PipelineShape::ConfigOutdir, Some(cfg)) => (vec![Arg::path(cfg), out], vec![]),
            (PipelineShape::ConfigOutdirKw, Some(cfg)) => (
                vec![],
                vec![("config", Arg::path(cfg)), ("output_dir", out)],
            ),
            (PipelineShape::Outdir, _) => (vec![out], vec![]),
            (PipelineShape::OutdirKw, _) => (vec![], vec![("output_dir", out)]),
            _ => (vec![], vec![]),
        }
    }
}

struct PipelineAttempt<'a> {
    method: &'a str,
    shape: PipelineShape,
}

impl fmt::Display for PipelineAttempt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = match self.shape {
            PipelineShape::ConfigOutdir => "config, outdir",
            PipelineShape::ConfigOutdirKw => "config=, output_dir=",
            PipelineShape::Outdir => "outdir",
            PipelineShape::OutdirKw => "output_dir=",
            PipelineShape::Bare => "",
        };
        write!(f, "{}({})", self.method, args)
    }
}

#[derive(Debug, Clone, Copy)]
enum CtorShape {
    ModelWithOptions,
    Model,
    Bare,
}

impl CtorShape {
    const ALL: [CtorShape; 3] = [CtorShape::ModelWithOptions, CtorShape::Model, CtorShape::Bare];

    fn arguments(
        self,
        model: Option<ObjRef>,
        options: &[(&'static str, Arg)],
    ) -> Option<(Vec<Arg>, Vec<(&'static str, Arg)>)> {
        match (self, model) {
            (CtorShape::ModelWithOptions, Some(m)) => Some((vec![Arg::Obj(m)], options.to_vec())),
            (CtorShape::Model, Some(m)) => Some((vec![Arg::Obj(m)], vec![])),
            (CtorShape::Bare, _) => Some((vec![], vec![])),
            _ => None,
        }
    }
}

impl fmt::Display for CtorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CtorShape::ModelWithOptions => "Class(model, **options)",
            CtorShape::Model => "Class(model)",
            CtorShape::Bare => "Class()",
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum InvokeShape {
    RenderToFilePath,
    RenderToFileModelPath,
    RenderToFilePathModel,
    Render,
    RenderModel,
    Generate,
    GenerateModel,
    GenerateModelPath,
}

impl InvokeShape {
    const ALL: [InvokeShape; 8] = [
        InvokeShape::RenderToFilePath,
        InvokeShape::RenderToFileModelPath,
        InvokeShape::RenderToFilePathModel,
        InvokeShape::Render,
        InvokeShape::RenderModel,
        InvokeShape::Generate,
        InvokeShape::GenerateModel,
        InvokeShape::GenerateModelPath,
    ];

    fn method_name(self) -> &'static str {
        match self {
            InvokeShape::RenderToFilePath
            | InvokeShape::RenderToFileModelPath
            | InvokeShape::RenderToFilePathModel => "render_to_file",
            InvokeShape::Render | InvokeShape::RenderModel => "render",
            InvokeShape::Generate | InvokeShape::GenerateModel | InvokeShape::GenerateModelPath => {
                "generate"
            }
        }
    }

    /// `render` hands the text back; everything else writes its own file.
    fn returns_content(self) -> bool {
        matches!(self, InvokeShape::Render | InvokeShape::RenderModel)
    }

    fn arguments(self, model: Option<ObjRef>, path: &str) -> Option<Vec<Arg>> {
        let path = Arg::from(path);
        match (self, model) {
            (InvokeShape::RenderToFilePath, _) => Some(vec![path]),
            (InvokeShape::RenderToFileModelPath, Some(m)) => Some(vec![Arg::Obj(m), path]),
            (InvokeShape::RenderToFilePathModel, Some(m)) => Some(vec![path, Arg::Obj(m)]),
            (InvokeShape::Render, _) | (InvokeShape::Generate, _) => Some(vec![]),
            (InvokeShape::RenderModel, Some(m)) | (InvokeShape::GenerateModel, Some(m)) => {
                Some(vec![Arg::Obj(m)])
            }
            (InvokeShape::GenerateModelPath, Some(m)) => Some(vec![Arg::Obj(m), path]),
            _ => None,
        }
    }
}

impl fmt::Display for InvokeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InvokeShape::RenderToFilePath => "render_to_file(path)",
            InvokeShape::RenderToFileModelPath => "render_to_file(model, path)",
            InvokeShape::RenderToFilePathModel => "render_to_file(path, model)",
            InvokeShape::Render => "render()",
            InvokeShape::RenderModel => "render(model)",
            InvokeShape::Generate => "generate()",
            InvokeShape::GenerateModel => "generate(model)",
            InvokeShape::GenerateModelPath => "generate(model, path)",
        })
    }
}

/// Keyword arguments each generator is constructed with.
fn format_kwargs(format: OutputFormat, request: &GenerationRequest) -> Vec<(&'static str, Arg)> {
    let path = Arg::from(format.entry().output_path);
    match format {
        OutputFormat::Vhdl => {
            let mut kwargs = vec![
                ("path", path),
                ("read_filler", Arg::Int(request.read_filler_value())),
            ];
            if request.options.axil {
                kwargs.push(("interface", Arg::from("axil")));
            }
            kwargs
        }
        OutputFormat::CHeader => vec![("path", path), ("prefix", Arg::from("CSR"))],
        OutputFormat::Markdown | OutputFormat::AsciiDoc => {
            let image_dir = if format == OutputFormat::Markdown {
                "md_img"
            } else {
                "adoc_img"
            };
            vec![
                ("path", path),
                ("title", Arg::from("Register Map")),
                ("print_images", Arg::Bool(true)),
                ("image_dir", Arg::from(image_dir)),
                ("print_conventions", Arg::Bool(true)),
            ]
        }
    }
}

/// Converts an error that escaped the generation steps into a failure envelope.
fn failure_from(err: anyhow::Error) -> GenerationResult {
    let traceback = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<SandboxError>())
        .and_then(SandboxError::traceback)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?}", err));
    error!("Generation failed: {:#}", err);
    GenerationResult::Failure {
        error: format!("{:#}", err),
        traceback: Some(traceback),
    }
}

pub struct Orchestrator<'a> {
    sandbox: &'a mut dyn Sandbox,
    library: Option<&'a LibraryHandle>,
    config: &'a BridgeConfig,
    handles: Vec<ObjRef>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        sandbox: &'a mut dyn Sandbox,
        library: Option<&'a LibraryHandle>,
        config: &'a BridgeConfig,
    ) -> Self {
        Self {
            sandbox,
            library,
            config,
            handles: Vec::new(),
        }
    }

    /// Runs one request to completion. Never returns an error; failures become envelopes.
    pub fn run(&mut self, request: &GenerationRequest) -> GenerationResult {
        let Some(library) = self.library else {
            warn!("Generation requested without the generator library");
            return GenerationResult::failure(LIBRARY_UNAVAILABLE);
        };

        let root = self.sandbox.root().to_path_buf();
        let scratch = scratch_dir(&root);
        let result = self.generate_into(library, request, &scratch);

        if let Err(e) = self.sandbox.set_cwd(&root) {
            debug!("Could not restore sandbox working directory: {}", e);
        }
        self.release_handles();

        match result {
            Ok(outputs) => {
                info!("Generation complete: {} file(s)", outputs.files.len());
                GenerationResult::Success(outputs)
            }
            Err(e) => failure_from(e),
        }
    }

    fn generate_into(
        &mut self,
        library: &LibraryHandle,
        request: &GenerationRequest,
        scratch: &Path,
    ) -> anyhow::Result<Outputs> {
        debug!("Generation options: {}", request.options.to_json());
        fs::reset_dir(scratch)
            .with_context(|| format!("Failed to prepare scratch directory {:?}", scratch))?;

        let (regs_path, secondary_path, inputs) = self
            .materialize(request, scratch)
            .context("Failed to write inputs into the sandbox")?;
        self.sandbox
            .set_cwd(scratch)
            .context("Failed to enter scratch directory")?;

        self.apply_global_config(library, request)?;

        let model = self.build_model(library, request, &regs_path, secondary_path.as_deref())?;

        let pipeline = match model {
            Some(model) => self.run_pipeline(model, secondary_path.as_deref(), scratch)?,
            None => false,
        };

        if !pipeline {
            let classes = self.discover_classes(library)?;
            for format in OutputFormat::ALL {
                if !format.enabled(&request.options) {
                    debug!("{} disabled", format);
                    continue;
                }
                let candidates: Vec<ClassCandidate> =
                    classes.iter().map(|(c, _)| c.clone()).collect();
                let Some(selected) = registry::select_generator(format.entry(), &candidates) else {
                    warn!("No generator class found for {}", format);
                    continue;
                };
                let Some(class) = classes
                    .iter()
                    .find(|(c, _)| c.name == selected.name)
                    .map(|(_, obj)| *obj)
                else {
                    continue;
                };
                debug!("{} generator: {}", format, selected.name);
                if self.run_format(format, class, model, request, scratch)? {
                    info!("{} generated", format);
                } else {
                    warn!("{} generation failed for every strategy", format);
                }
            }
        }

        let text = |format: OutputFormat| -> String {
            let placeholder = format.placeholder().unwrap_or_default();
            format
                .entry()
                .readback
                .iter()
                .find_map(|rel| fs::read_text(&scratch.join(rel)))
                .unwrap_or_else(|| placeholder.to_string())
        };
        let vhdl = text(OutputFormat::Vhdl);
        let c = text(OutputFormat::CHeader);
        let docs = text(OutputFormat::Markdown);

        let engine = base64::engine::general_purpose::STANDARD;
        let files = fs::collect_files(scratch, &inputs, self.config.max_artifact_bytes())
            .context("Failed to collect generated files")?
            .into_iter()
            .map(|(path, data)| (path, engine.encode(data)))
            .collect();

        Ok(Outputs {
            vhdl,
            c,
            docs,
            files,
        })
    }

    /// Writes the inputs through the sandbox. Returns the register map path, the secondary
    /// config path and every path written, which are left out of the collected files.
    fn materialize(
        &mut self,
        request: &GenerationRequest,
        scratch: &Path,
    ) -> SandboxResult<(PathBuf, Option<PathBuf>, Vec<PathBuf>)> {
        let config = Escaped::new(&request.config_text);
        let regs_path = scratch.join(REGS_FILE);
        self.sandbox.write_text(&regs_path, &config)?;
        let mut inputs = vec![regs_path.clone()];

        let mut secondary_path = None;
        if let Some(secondary) = &request.secondary {
            let name = file_component(&secondary.name)
                .unwrap_or_else(|| DEFAULT_SECONDARY_NAME.to_string());
            let path = scratch.join(name);
            self.sandbox
                .write_text(&path, &Escaped::new(&secondary.text))?;
            debug!("Secondary config written to {:?}", path);
            inputs.push(path.clone());
            secondary_path = Some(path);
        }

        if let Some(name) = request.file_name.as_deref().and_then(file_component) {
            let path = scratch.join(name);
            if !inputs.contains(&path) {
                self.sandbox.write_text(&path, &config)?;
                debug!("Input copy written to {:?}", path);
                inputs.push(path);
            }
        }

        Ok((regs_path, secondary_path, inputs))
    }

    fn track(&mut self, obj: ObjRef) -> ObjRef {
        self.handles.push(obj);
        obj
    }

    fn call(
        &mut self,
        callee: ObjRef,
        args: &[Arg],
        kwargs: &[(&str, Arg)],
    ) -> SandboxResult<ObjRef> {
        let obj = self.sandbox.call(callee, args, kwargs)?;
        Ok(self.track(obj))
    }

    fn attr(&mut self, obj: ObjRef, name: &str) -> SandboxResult<Option<ObjRef>> {
        let found = self.sandbox.get_attr(obj, name)?;
        Ok(found.map(|o| self.track(o)))
    }

    fn method(
        &mut self,
        obj: ObjRef,
        name: &str,
        args: &[Arg],
        kwargs: &[(&str, Arg)],
    ) -> SandboxResult<Option<ObjRef>> {
        match self.attr(obj, name)? {
            Some(method) => self.call(method, args, kwargs).map(Some),
            None => Ok(None),
        }
    }

    fn release_handles(&mut self) {
        for obj in std::mem::take(&mut self.handles) {
            if let Err(e) = self.sandbox.release(obj) {
                debug!("Could not release handle {:?}: {}", obj, e);
                break;
            }
        }
    }

    /// Best-effort global settings through the library's config module.
    fn apply_global_config(
        &mut self,
        library: &LibraryHandle,
        request: &GenerationRequest,
    ) -> SandboxResult<()> {
        let Some(config) = library.config else {
            debug!("No config module; skipping global settings");
            return Ok(());
        };
        match self.try_global_config(config, request) {
            Ok(true) => info!(
                "Global config applied: base_address={:#x}",
                request.base_address_value()
            ),
            Ok(false) => debug!("Config module has no global settings interface"),
            Err(e) if e.is_raised() => warn!("Could not apply global config: {}", e),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn try_global_config(
        &mut self,
        config: ObjRef,
        request: &GenerationRequest,
    ) -> SandboxResult<bool> {
        let Some(globcfg) = self.method(config, "default_globcfg", &[], &[])? else {
            return Ok(false);
        };
        let settings = [
            ("base_address", Arg::Int(request.base_address_value())),
            ("data_width", Arg::Int(32)),
            ("address_width", Arg::Int(16)),
            ("register_reset", Arg::from("sync_pos")),
        ];
        for (key, value) in settings {
            if self
                .method(globcfg, "__setitem__", &[Arg::from(key), value], &[])?
                .is_none()
            {
                return Ok(false);
            }
        }
        Ok(self
            .method(config, "set_globcfg", &[Arg::Obj(globcfg)], &[])?
            .is_some())
    }

    fn build_model(
        &mut self,
        library: &LibraryHandle,
        request: &GenerationRequest,
        regs_path: &Path,
        secondary: Option<&Path>,
    ) -> SandboxResult<Option<ObjRef>> {
        let empty: Vec<ModelAttempt> = library
            .model_classes
            .iter()
            .map(|(label, class)| ModelAttempt {
                label,
                class: *class,
                shape: ModelShape::Empty,
            })
            .collect();

        // With a secondary config the library resolves its inputs itself.
        if secondary.is_none() {
            let attempts: Vec<ModelAttempt> = library
                .model_classes
                .iter()
                .flat_map(|(label, class)| {
                    MODEL_SHAPES.iter().map(move |shape| ModelAttempt {
                        label,
                        class: *class,
                        shape: *shape,
                    })
                })
                .collect();
            let outcome = first_accepted_with(OnRaise::Continue, "model", &attempts, |a| {
                self.try_model(a, request, regs_path)
            })?;
            if let Outcome::Accepted(model) = outcome {
                return Ok(Some(model));
            }
            warn!("Falling back to an empty register map model");
        }

        let outcome = first_accepted_with(OnRaise::Continue, "model (empty)", &empty, |a| {
            self.try_model(a, request, regs_path)
        })?;
        match outcome {
            Outcome::Accepted(model) => Ok(Some(model)),
            Outcome::Exhausted(_) => {
                warn!("No register map model could be constructed");
                Ok(None)
            }
        }
    }

    fn try_model(
        &mut self,
        attempt: &ModelAttempt,
        request: &GenerationRequest,
        regs_path: &Path,
    ) -> SandboxResult<Option<ObjRef>> {
        match attempt.shape {
            ModelShape::Empty => self.call(attempt.class, &[], &[]).map(Some),
            ModelShape::PathCtor => self
                .call(attempt.class, &[Arg::path(regs_path)], &[])
                .map(Some),
            ModelShape::Reader(reader) => {
                let model = self.call(attempt.class, &[], &[])?;
                Ok(self
                    .method(model, reader, &[Arg::path(regs_path)], &[])?
                    .map(|_| model))
            }
            ModelShape::ParseLoad => {
                let Ok(data) = serde_json::from_str::<serde_json::Value>(&request.config_text)
                else {
                    return Ok(None);
                };
                let model = self.call(attempt.class, &[], &[])?;
                Ok(self
                    .method(model, "load", &[Arg::Json(data)], &[])?
                    .map(|_| model))
            }
        }
    }

    fn run_pipeline(
        &mut self,
        model: ObjRef,
        secondary: Option<&Path>,
        scratch: &Path,
    ) -> SandboxResult<bool> {
        let config = self.config;
        let shapes: &[PipelineShape] = if secondary.is_some() {
            &PipelineShape::WITH_CONFIG
        } else {
            &PipelineShape::WITHOUT_CONFIG
        };
        let attempts: Vec<PipelineAttempt> = config
            .surface
            .pipeline_methods
            .iter()
            .flat_map(|method| {
                shapes.iter().map(move |shape| PipelineAttempt {
                    method,
                    shape: *shape,
                })
            })
            .collect();

        let outcome = first_accepted("pipeline", &attempts, |a| {
            let (args, kwargs) = a.shape.arguments(secondary, scratch);
            Ok(self.method(model, a.method, &args, &kwargs)?.map(|_| ()))
        })?;
        let accepted = outcome.accepted().is_some();
        if accepted {
            info!("Whole-pipeline generation succeeded");
        } else {
            debug!("No whole-pipeline method accepted; generating per format");
        }
        Ok(accepted)
    }

    /// Generator classes in the library namespace that could serve some format.
    fn discover_classes(
        &mut self,
        library: &LibraryHandle,
    ) -> SandboxResult<Vec<(ClassCandidate, ObjRef)>> {
        let Some(generators) = library.generators else {
            warn!("Generator library has no generators namespace");
            return Ok(Vec::new());
        };
        let Some(names) = optional(self.sandbox.dir(generators))? else {
            return Ok(Vec::new());
        };

        let mut found = Vec::new();
        for name in names.into_iter().filter(|n| registry::is_candidate_name(n)) {
            let Some(obj) = self.attr(generators, &name)? else {
                continue;
            };
            let info = self.sandbox.describe(obj)?;
            let is_generator = match (info.is_class, library.generator_base) {
                (true, Some(base)) => {
                    optional(self.sandbox.is_subclass(obj, base))?.unwrap_or(false)
                }
                _ => false,
            };
            found.push((
                ClassCandidate {
                    name,
                    is_class: info.is_class,
                    is_generator,
                },
                obj,
            ));
        }
        debug!(
            "Generator candidates: {:?}",
            found.iter().map(|(c, _)| c.name.as_str()).collect::<Vec<_>>()
        );
        Ok(found)
    }

    fn run_format(
        &mut self,
        format: OutputFormat,
        class: ObjRef,
        model: Option<ObjRef>,
        request: &GenerationRequest,
        scratch: &Path,
    ) -> SandboxResult<bool> {
        let entry = format.entry();
        if let Some(parent) = scratch.join(entry.output_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = format_kwargs(format, request);

        let what = format!("{} constructor", format);
        let outcome = first_accepted(&what, &CtorShape::ALL, |shape| {
            let Some((args, kwargs)) = shape.arguments(model, &options) else {
                return Ok(None);
            };
            let instance = self.call(class, &args, &kwargs)?;
            self.invoke_generator(format, instance, model, scratch)
        })?;
        Ok(outcome.accepted().is_some())
    }

    fn invoke_generator(
        &mut self,
        format: OutputFormat,
        instance: ObjRef,
        model: Option<ObjRef>,
        scratch: &Path,
    ) -> SandboxResult<Option<()>> {
        let what = format!("{} invocation", format);
        match first_accepted(&what, &InvokeShape::ALL, |shape| {
            self.try_invoke(*shape, format, instance, model, scratch)
        })? {
            Outcome::Accepted(()) => Ok(Some(())),
            Outcome::Exhausted(None) => Ok(None),
            Outcome::Exhausted(Some(e)) => Err(e),
        }
    }

    fn try_invoke(
        &mut self,
        shape: InvokeShape,
        format: OutputFormat,
        instance: ObjRef,
        model: Option<ObjRef>,
        scratch: &Path,
    ) -> SandboxResult<Option<()>> {
        let entry = format.entry();
        let Some(args) = shape.arguments(model, entry.output_path) else {
            return Ok(None);
        };
        let Some(result) = self.method(instance, shape.method_name(), &args, &[])? else {
            return Ok(None);
        };
        if !shape.returns_content() {
            return Ok(Some(()));
        }

        let target = scratch.join(entry.output_path);
        match self.sandbox.extract(result)?.into_content() {
            Some(content) => {
                fs::write_bytes(&target, &content)?;
                Ok(Some(()))
            }
            None if target.is_file() => Ok(Some(())),
            None => Ok(None),
        }
    }
}
