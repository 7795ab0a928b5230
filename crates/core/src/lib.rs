// RegBridge - Register Map Generation Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod bridge;
pub mod envelope;
pub mod fetch;
pub mod install;
pub mod library;
pub mod marshal;
pub mod orchestrator;
pub mod provision;
pub mod registry;
pub mod sandbox;
pub mod strategy;

pub use bridge::{Bridge, BridgeError, InitReport, Phase, SandboxState};
pub use envelope::{GenerationResult, Outputs};
pub use fetch::{Fetch, FetchError, HttpFetcher};
pub use orchestrator::{GenerationRequest, Orchestrator, SecondaryConfig};
pub use provision::{ProvisionError, RuntimeLauncher};
pub use sandbox::python::{PythonLauncher, PythonSandbox};
pub use sandbox::{Sandbox, SandboxError, SandboxResult};
