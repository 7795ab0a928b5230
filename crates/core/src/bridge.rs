// RegBridge - Register Map Generation Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Lifecycle coordinator that owns the sandbox and gates every request on its state.

use crate::envelope::GenerationResult;
use crate::fetch::Fetch;
use crate::install::{install_library, InstallError, InstallReport};
use crate::library::LibraryHandle;
use crate::orchestrator::{GenerationRequest, Orchestrator};
use crate::provision::{install_packages, provision, PackageReport, ProvisionError, RuntimeLauncher};
use crate::sandbox::{Sandbox, SandboxError};
use regbridge_config::BridgeConfig;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Uninitialized,
    Installing,
    Ready,
    /// Terminal. A new bridge is needed to try again.
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Sandbox is not ready")]
    NotReady,
    #[error("Sandbox initialization failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    Install(#[from] InstallError),
}

/// Process-wide sandbox state.
#[derive(Default)]
pub struct SandboxState {
    pub phase: Phase,
    /// Availability polls used by the last provisioning run.
    pub attempts: u32,
    pub sandbox: Option<Box<dyn Sandbox>>,
    pub library: Option<LibraryHandle>,
}

/// What initialization found.
#[derive(Debug, Clone)]
pub struct InitReport {
    pub attempts: u32,
    pub packages: PackageReport,
    pub install: InstallReport,
    /// Whether the library's surface could be resolved after install.
    pub library_loaded: bool,
}

pub struct Bridge {
    config: BridgeConfig,
    state: SandboxState,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            state: SandboxState::default(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn phase(&self) -> &Phase {
        &self.state.phase
    }

    pub fn is_ready(&self) -> bool {
        self.state.phase == Phase::Ready
    }

    /// Provisions the sandbox and installs the library. Runs once; failure is terminal.
    pub fn initialize(
        &mut self,
        launcher: &dyn RuntimeLauncher,
        fetcher: &dyn Fetch,
    ) -> Result<InitReport, BridgeError> {
        match &self.state.phase {
            Phase::Uninitialized => {}
            Phase::Failed(reason) => return Err(BridgeError::Failed(reason.clone())),
            Phase::Installing | Phase::Ready => {
                return Err(BridgeError::Failed("already initialized".to_string()))
            }
        }

        match self.bring_up(launcher, fetcher) {
            Ok(report) => {
                self.state.phase = Phase::Ready;
                info!("Bridge ready");
                Ok(report)
            }
            Err(e) => {
                error!("Bridge initialization failed: {}", e);
                self.state.phase = Phase::Failed(e.to_string());
                self.state.library = None;
                Err(e)
            }
        }
    }

    fn bring_up(
        &mut self,
        launcher: &dyn RuntimeLauncher,
        fetcher: &dyn Fetch,
    ) -> Result<InitReport, BridgeError> {
        let (mut sandbox, attempts) = provision(launcher, &self.config.runtime)?;
        self.state.attempts = attempts;
        self.state.phase = Phase::Installing;

        let packages = install_packages(sandbox.as_mut(), &self.config.packages)
            .map_err(|e| BridgeError::Install(InstallError::Sandbox(e)))?;
        let install = install_library(
            sandbox.as_mut(),
            &self.config.library,
            &self.config.surface,
            fetcher,
        )?;
        let library = LibraryHandle::load(sandbox.as_mut(), &self.config)
            .map_err(|e: SandboxError| BridgeError::Install(InstallError::Sandbox(e)))?;
        let library_loaded = library.is_some();

        self.state.sandbox = Some(sandbox);
        self.state.library = library;
        Ok(InitReport {
            attempts,
            packages,
            install,
            library_loaded,
        })
    }

    /// Runs one generation request. Rejected before any sandbox call unless ready.
    pub fn generate(
        &mut self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, BridgeError> {
        if self.state.phase != Phase::Ready {
            return Err(BridgeError::NotReady);
        }
        let Some(sandbox) = self.state.sandbox.as_deref_mut() else {
            return Err(BridgeError::NotReady);
        };
        let mut orchestrator =
            Orchestrator::new(sandbox, self.state.library.as_ref(), &self.config);
        Ok(orchestrator.run(request))
    }
}
