// RegBridge - Register Map Generation Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Result rendering: artifacts to disk, texts to the terminal.

use anyhow::{Context, Result};
use clap::ValueEnum;
use regbridge_core::Outputs;
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Show {
    Vhdl,
    C,
    Docs,
}

/// Keys are relative to the scratch directory; anything that could escape `dir` is refused.
fn is_safe_key(key: &str) -> bool {
    let path = Path::new(key);
    !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// Decodes every artifact and writes it under `dir`, creating parents as needed.
pub fn write_artifacts(outputs: &Outputs, dir: &Path) -> Result<Vec<PathBuf>> {
    let files = outputs
        .decode_files()
        .context("Result envelope carries an undecodable artifact")?;
    let mut written = Vec::with_capacity(files.len());
    for (key, bytes) in files {
        if !is_safe_key(&key) {
            warn!("Skipping artifact with unsafe path {:?}", key);
            continue;
        }
        let path = dir.join(&key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        std::fs::write(&path, &bytes).with_context(|| format!("Failed to write {:?}", path))?;
        written.push(path);
    }
    info!("Wrote {} artifact(s) to {:?}", written.len(), dir);
    Ok(written)
}

/// Text shown on stdout: one chosen output, or all three under headers.
pub fn summary(outputs: &Outputs, show: Option<Show>) -> String {
    match show {
        Some(Show::Vhdl) => outputs.vhdl.clone(),
        Some(Show::C) => outputs.c.clone(),
        Some(Show::Docs) => outputs.docs.clone(),
        None => {
            let mut out = String::new();
            for (title, text) in [
                ("VHDL", &outputs.vhdl),
                ("C header", &outputs.c),
                ("Documentation", &outputs.docs),
            ] {
                out.push_str(&format!("==== {} ====\n{}\n", title, text.trim_end()));
            }
            out.push_str(&format!("==== Files ({}) ====\n", outputs.files.len()));
            for key in outputs.files.keys() {
                out.push_str(key);
                out.push('\n');
            }
            out
        }
    }
}
