// RegBridge - Register Map Generation Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Handles to the generator library's resolved surface.

use crate::sandbox::{optional, ObjRef, Sandbox, SandboxResult};
use regbridge_config::BridgeConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Module name the stub is loaded under when it only supplies the fallback class.
const STUB_PRIVATE_MODULE: &str = "_regbridge_diagram_stub";

/// Where the installer leaves the diagram stub source.
pub fn stub_path(root: &Path, stub_module: &str) -> PathBuf {
    root.join("tmp").join(format!("{}.py", stub_module))
}

/// Makes `module` importable, loading the stub under that name when the real one is absent.
///
/// Returns whether the module is importable afterwards.
pub fn ensure_module_or_stub(
    sandbox: &mut dyn Sandbox,
    module: &str,
    stub: &Path,
) -> SandboxResult<bool> {
    match sandbox.import(module) {
        Ok(_) => {
            debug!("{} available", module);
            return Ok(true);
        }
        Err(e) if e.is_import_failure() => debug!("{} not importable: {}", module, e),
        Err(e) if e.is_raised() => warn!("{} failed while importing: {}", module, e),
        Err(e) => return Err(e),
    }
    if !stub.exists() {
        warn!("No {} module and no stub at {:?}", module, stub);
        return Ok(false);
    }
    match optional(sandbox.import_from_file(module, stub))? {
        Some(_) => {
            info!("Loaded {} stub from {:?}", module, stub);
            Ok(true)
        }
        None => {
            warn!("Could not load {} stub from {:?}", module, stub);
            Ok(false)
        }
    }
}

/// Objects resolved from the generator library once it imports.
#[derive(Debug, Clone)]
pub struct LibraryHandle {
    /// Model constructors, labelled by where they were found.
    pub model_classes: Vec<(String, ObjRef)>,
    pub generators: Option<ObjRef>,
    pub generator_base: Option<ObjRef>,
    pub config: Option<ObjRef>,
}

impl LibraryHandle {
    /// Imports the library and resolves its surface. `Ok(None)` if the library will not import.
    pub fn load(sandbox: &mut dyn Sandbox, config: &BridgeConfig) -> SandboxResult<Option<Self>> {
        let surface = &config.surface;
        let stub = stub_path(sandbox.root(), &config.library.stub_module);
        ensure_module_or_stub(sandbox, &config.library.stub_module, &stub)?;

        let module = match sandbox.import(&surface.module) {
            Ok(m) => m,
            Err(e) if e.is_import_failure() => {
                warn!("Generator library {} is unavailable: {}", surface.module, e);
                return Ok(None);
            }
            Err(e) if e.is_raised() => {
                warn!("Generator library {} failed while importing: {}", surface.module, e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let generators = match optional(
            sandbox.import(&format!("{}.{}", surface.module, surface.generators)),
        )? {
            Some(g) => Some(g),
            None => sandbox.get_attr(module, &surface.generators)?,
        };

        let mut model_classes = Vec::new();
        if let Some(class) = sandbox.get_attr(module, &surface.model_class)? {
            model_classes.push((format!("{}.{}", surface.module, surface.model_class), class));
        }
        if let Some(gens) = generators {
            if let Some(class) = sandbox.get_attr(gens, &surface.model_class)? {
                model_classes.push((
                    format!("{}.{}.{}", surface.module, surface.generators, surface.model_class),
                    class,
                ));
            }
        }

        let generator_base = match generators {
            Some(gens) => sandbox.get_attr(gens, &surface.generator_base)?,
            None => None,
        };
        let generator_base = match generator_base {
            Some(base) => Some(base),
            None => sandbox.get_attr(module, &surface.generator_base)?,
        };

        let config_module = match optional(
            sandbox.import(&format!("{}.{}", surface.module, surface.config_module)),
        )? {
            Some(c) => Some(c),
            None => sandbox.get_attr(module, &surface.config_module)?,
        };

        if let Some(gens) = generators {
            inject_diagram_fallback(sandbox, config, gens, &stub)?;
        }

        info!(
            "Generator library loaded: {} model class(es), generators {}, config {}",
            model_classes.len(),
            if generators.is_some() { "found" } else { "missing" },
            if config_module.is_some() { "found" } else { "missing" },
        );
        Ok(Some(Self {
            model_classes,
            generators,
            generator_base,
            config: config_module,
        }))
    }
}

fn inject_diagram_fallback(
    sandbox: &mut dyn Sandbox,
    config: &BridgeConfig,
    generators: ObjRef,
    stub: &Path,
) -> SandboxResult<()> {
    let name = &config.surface.diagram_generator;
    if sandbox.get_attr(generators, name)?.is_some() {
        return Ok(());
    }
    if !stub.exists() {
        warn!("Generators lack {} and no stub is available", name);
        return Ok(());
    }
    let Some(stub_module) = optional(sandbox.import_from_file(STUB_PRIVATE_MODULE, stub))? else {
        warn!("Could not load diagram stub for {}", name);
        return Ok(());
    };
    match sandbox.get_attr(stub_module, &config.surface.stub_fallback_class)? {
        Some(class) => {
            sandbox.set_attr(generators, name, class)?;
            info!("Injected fallback {} into generators", name);
        }
        None => warn!(
            "Diagram stub has no {} class",
            config.surface.stub_fallback_class
        ),
    }
    Ok(())
}
