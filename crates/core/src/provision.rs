// RegBridge - Register Map Generation Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Sandbox provisioning: wait for the runtime, boot it, install packages.

use crate::sandbox::{Sandbox, SandboxError, SandboxResult};
use regbridge_config::{PackagesConfig, RuntimeConfig};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Something that can start a sandbox runtime.
pub trait RuntimeLauncher {
    /// Whether the runtime can be started right now.
    fn is_available(&self) -> bool;
    fn launch(&self) -> SandboxResult<Box<dyn Sandbox>>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Sandbox runtime did not become available after {attempts} attempts")]
    RuntimeUnavailable { attempts: u32 },
    #[error("Failed to start sandbox runtime: {0}")]
    Boot(#[source] SandboxError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginStatus {
    Installed { source: String },
    /// Every source failed; generation relies on the bundled stub.
    Unavailable,
}

/// Which optional packages made it into the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReport {
    pub installed: Vec<String>,
    pub failed: Vec<String>,
    pub plugin: PluginStatus,
}

/// Polls the launcher until the runtime is available, then boots it.
///
/// Returns the sandbox and the number of polls it took.
pub fn provision(
    launcher: &dyn RuntimeLauncher,
    runtime: &RuntimeConfig,
) -> Result<(Box<dyn Sandbox>, u32), ProvisionError> {
    let delay = Duration::from_millis(runtime.retry_delay_ms);
    let mut attempts = 0;
    loop {
        attempts += 1;
        if launcher.is_available() {
            break;
        }
        if attempts >= runtime.max_attempts {
            warn!("Sandbox runtime unavailable after {} attempts", attempts);
            return Err(ProvisionError::RuntimeUnavailable { attempts });
        }
        debug!(
            "Sandbox runtime not ready (attempt {}/{}), retrying in {:?}",
            attempts, runtime.max_attempts, delay
        );
        std::thread::sleep(delay);
    }

    let sandbox = launcher.launch().map_err(ProvisionError::Boot)?;
    info!("Sandbox runtime ready after {} attempt(s)", attempts);
    Ok((sandbox, attempts))
}

/// Installs the optional packages one at a time, then the diagram plugin.
///
/// Nothing here is fatal; failures are logged and reported.
pub fn install_packages(
    sandbox: &mut dyn Sandbox,
    packages: &PackagesConfig,
) -> SandboxResult<PackageReport> {
    let mut installed = Vec::new();
    let mut failed = Vec::new();

    for name in &packages.optional {
        match sandbox.install_package(name) {
            Ok(()) => {
                debug!("Installed package {}", name);
                installed.push(name.clone());
            }
            Err(e) if e.is_raised() => {
                warn!("Could not install optional package {}: {}", name, e);
                failed.push(name.clone());
            }
            Err(e) => return Err(e),
        }
    }

    let mut plugin = PluginStatus::Unavailable;
    let mut tried: Vec<&String> = Vec::new();
    let sources = std::iter::once(&packages.plugin).chain(packages.plugin_sources.iter());
    for source in sources {
        if tried.contains(&source) {
            continue;
        }
        tried.push(source);
        match sandbox.install_package(source) {
            Ok(()) => {
                info!("Diagram plugin installed from {}", source);
                plugin = PluginStatus::Installed {
                    source: source.clone(),
                };
                break;
            }
            Err(e) if e.is_raised() => {
                debug!("Plugin source {} failed: {}", source, e);
            }
            Err(e) => return Err(e),
        }
    }
    if plugin == PluginStatus::Unavailable {
        warn!(
            "Diagram plugin {} unavailable from every source; the bundled stub will be used",
            packages.plugin
        );
    }

    Ok(PackageReport {
        installed,
        failed,
        plugin,
    })
}
