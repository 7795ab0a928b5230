// RegBridge - Register Map Generation Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Library installer: fetch the packaged archive, unpack it inside the sandbox, find the
//! importable package and put it on the import path.

use crate::fetch::{Fetch, FetchError};
use crate::library::{ensure_module_or_stub, stub_path};
use crate::sandbox::python::DIAGRAM_STUB_SOURCE;
use crate::sandbox::{fs, optional, Sandbox, SandboxError};
use regbridge_config::{LibraryConfig, SurfaceConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Dependencies whose availability is reported after installation.
const DEPENDENCY_PROBES: &[&str] = &["jinja2", "yaml"];

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("Failed to fetch library archive from {location}: {source}")]
    Fetch {
        location: String,
        #[source]
        source: FetchError,
    },
    #[error("Sandbox operation failed during install: {0}")]
    Sandbox(#[from] SandboxError),
    #[error(
        "No directory matching '{token}' in the library archive (found: {found:?}); \
         expected <{token}-*>/{package}/__init__.py at the archive top level"
    )]
    Layout {
        token: String,
        package: String,
        found: Vec<String>,
    },
    #[error("Generator library '{module}' failed to import: {source}")]
    Import {
        module: String,
        #[source]
        source: SandboxError,
    },
    #[error("I/O error during install: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyStatus {
    pub name: String,
    pub available: bool,
}

#[derive(Debug, Clone)]
pub struct InstallReport {
    pub archive_location: String,
    pub import_root: PathBuf,
    pub stub_written: bool,
    pub has_model_class: bool,
    pub has_generators: bool,
    pub dependencies: Vec<DependencyStatus>,
}

/// Replaces the trailing segment of `script` with `file_name`.
///
/// A script served from `<base>/assets/<kind>/<file>` resolves against `<base>`.
pub fn derive_sibling_location(script: &str, file_name: &str) -> Option<String> {
    let script = script.split(['?', '#']).next().unwrap_or(script);
    let segments: Vec<&str> = script.split('/').collect();
    if segments.len() < 2 {
        return None;
    }
    let mut keep = segments.len() - 1;
    if keep >= 3 && segments[keep - 2] == "assets" {
        keep -= 2;
    }
    let mut parts = segments[..keep].to_vec();
    parts.push(file_name);
    Some(parts.join("/"))
}

/// Archive locations to try, best first.
pub fn archive_candidates(library: &LibraryConfig) -> Vec<String> {
    let script = library.script_location.clone().or_else(|| {
        std::env::current_exe()
            .ok()
            .map(|p| p.to_string_lossy().into_owned())
    });
    let mut candidates = Vec::new();
    if let Some(derived) = script
        .as_deref()
        .and_then(|s| derive_sibling_location(s, &library.archive_name))
    {
        candidates.push(derived);
    }
    if !candidates.contains(&library.fallback_archive) {
        candidates.push(library.fallback_archive.clone());
    }
    candidates
}

/// Finds the directory to put on the import path inside an extracted archive.
///
/// The first top-level directory (sorted) whose name contains `token` is chosen. If it holds
/// a `package` directory, it is the import root; a top-level directory that is itself the
/// package resolves to its parent; anything else is used as-is.
pub fn locate_import_root(
    extract_dir: &Path,
    token: &str,
    package: &str,
) -> Result<PathBuf, InstallError> {
    let dirs = fs::list_dirs(extract_dir)?;
    let needle = token.to_lowercase();
    let Some(name) = dirs.iter().find(|d| d.to_lowercase().contains(&needle)) else {
        return Err(InstallError::Layout {
            token: token.to_string(),
            package: package.to_string(),
            found: dirs,
        });
    };
    let top = extract_dir.join(name);
    if top.join(package).is_dir() {
        Ok(top)
    } else if name == package && top.join("__init__.py").is_file() {
        Ok(extract_dir.to_path_buf())
    } else {
        debug!("No {} package inside {:?}; using it as import root", package, top);
        Ok(top)
    }
}

fn fetch_archive(
    fetcher: &dyn Fetch,
    library: &LibraryConfig,
) -> Result<(String, Vec<u8>), InstallError> {
    let mut last_error = None;
    for location in archive_candidates(library) {
        match fetcher.fetch(&location) {
            Ok(bytes) => {
                info!("Fetched library archive from {} ({} bytes)", location, bytes.len());
                return Ok((location, bytes));
            }
            Err(source) => {
                debug!("Archive not at {}: {}", location, source);
                last_error = Some(InstallError::Fetch { location, source });
            }
        }
    }
    Err(last_error.unwrap_or_else(|| InstallError::Fetch {
        location: library.fallback_archive.clone(),
        source: FetchError::Transport("no archive location".to_string()),
    }))
}

fn write_stub(fetcher: &dyn Fetch, library: &LibraryConfig, dest: &Path) -> bool {
    let source = match &library.stub_location {
        Some(location) => match fetcher.fetch(location) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Stub fetch from {} failed ({}); using bundled stub", location, e);
                DIAGRAM_STUB_SOURCE.as_bytes().to_vec()
            }
        },
        None => DIAGRAM_STUB_SOURCE.as_bytes().to_vec(),
    };
    match fs::write_bytes(dest, &source) {
        Ok(()) => {
            debug!("Wrote diagram stub to {:?}", dest);
            true
        }
        Err(e) => {
            warn!("Could not write diagram stub to {:?}: {}", dest, e);
            false
        }
    }
}

/// Installs the generator library into the sandbox and verifies that it imports.
pub fn install_library(
    sandbox: &mut dyn Sandbox,
    library: &LibraryConfig,
    surface: &SurfaceConfig,
    fetcher: &dyn Fetch,
) -> Result<InstallReport, InstallError> {
    let tmp = sandbox.root().join("tmp");
    let archive_path = tmp.join("library.zip");
    let extract_dir = tmp.join("library_extracted");

    let (archive_location, bytes) = fetch_archive(fetcher, library)?;
    fs::write_bytes(&archive_path, &bytes)?;

    let stub = stub_path(sandbox.root(), &library.stub_module);
    let stub_written = write_stub(fetcher, library, &stub);

    fs::reset_dir(&extract_dir)?;
    sandbox.unpack_archive(&archive_path, &extract_dir)?;

    let import_root = locate_import_root(&extract_dir, &library.token, &library.package)?;
    info!("Library import root: {:?}", import_root);
    sandbox.prepend_import_path(&import_root)?;

    let mut dependencies = Vec::new();
    for name in DEPENDENCY_PROBES {
        let available = optional(sandbox.import(name))?.is_some();
        dependencies.push(DependencyStatus {
            name: name.to_string(),
            available,
        });
    }
    let plugin = ensure_module_or_stub(sandbox, &library.stub_module, &stub)?;
    dependencies.push(DependencyStatus {
        name: library.stub_module.clone(),
        available: plugin,
    });
    for dep in &dependencies {
        if dep.available {
            info!("Dependency {} available", dep.name);
        } else {
            warn!("Dependency {} not available", dep.name);
        }
    }

    let module = match sandbox.import(&surface.module) {
        Ok(m) => m,
        Err(source) if source.is_raised() => {
            return Err(InstallError::Import {
                module: surface.module.clone(),
                source,
            })
        }
        Err(e) => return Err(e.into()),
    };

    let has_model_class = sandbox.get_attr(module, &surface.model_class)?.is_some();
    if !has_model_class {
        warn!("{} has no {} attribute", surface.module, surface.model_class);
    }
    let has_generators = sandbox.get_attr(module, &surface.generators)?.is_some()
        || optional(sandbox.import(&format!("{}.{}", surface.module, surface.generators)))?
            .is_some();
    if !has_generators {
        warn!("{} has no {} namespace", surface.module, surface.generators);
    }

    info!("Generator library {} installed", surface.module);
    Ok(InstallReport {
        archive_location,
        import_root,
        stub_written,
        has_model_class,
        has_generators,
        dependencies,
    })
}
