// RegBridge - Register Map Generation Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Sandbox backed by a child interpreter process.
//!
//! The child runs the bundled bridge script and speaks one JSON object per line on its
//! standard streams. Each request carries a source expression that calls one of the
//! bridge operations; host text inside it is always marshaled through [`Escaped`].

use super::{Arg, Extracted, ObjInfo, ObjRef, Sandbox, SandboxError, SandboxResult};
use crate::marshal::{quote, Escaped};
use crate::provision::RuntimeLauncher;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tracing::{debug, info};

const BRIDGE_SOURCE: &str = include_str!("../../assets/python/bridge.py");

/// Bundled stand-in for the diagram plugin.
pub const DIAGRAM_STUB_SOURCE: &str = include_str!("../../assets/python/diagram_stub.py");

/// Environment variable naming the sandbox root for the bridge script.
pub const ROOT_ENV: &str = "REGBRIDGE_ROOT";

#[derive(Debug, Deserialize)]
struct RaisedReply {
    kind: String,
    message: String,
    #[serde(default)]
    traceback: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Reply<T> {
    Err { err: RaisedReply },
    Ok { ok: T },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
enum ExtractReply {
    Text(String),
    Bytes(String),
    None,
    Other(String),
}

#[derive(Serialize)]
struct CallPayload<'a> {
    args: &'a [Arg],
    kwargs: BTreeMap<&'a str, &'a Arg>,
}

#[derive(Serialize)]
struct Request<'a> {
    source: &'a str,
}

pub struct PythonSandbox {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    root: PathBuf,
    // Keeps an auto-created root alive for the lifetime of the process.
    _scratch_root: Option<tempfile::TempDir>,
}

impl PythonSandbox {
    /// Starts the interpreter and waits for its ready handshake.
    pub fn spawn(
        python: &str,
        root: PathBuf,
        scratch_root: Option<tempfile::TempDir>,
    ) -> SandboxResult<Self> {
        std::fs::create_dir_all(&root)?;
        let mut child = Command::new(python)
            .arg("-I")
            .arg("-u")
            .arg("-c")
            .arg(BRIDGE_SOURCE)
            .env(ROOT_ENV, &root)
            .current_dir(&root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child.stdin.take().ok_or(SandboxError::Terminated)?;
        let stdout = child.stdout.take().ok_or(SandboxError::Terminated)?;
        if let Some(stderr) = child.stderr.take() {
            std::thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    debug!(target: "regbridge::sandbox", "{}", line);
                }
            });
        }

        let mut sandbox = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            root,
            _scratch_root: scratch_root,
        };
        let greeting: String = sandbox.read_reply()?;
        if greeting != "ready" {
            return Err(SandboxError::Protocol(format!(
                "unexpected handshake: {}",
                greeting
            )));
        }
        info!("Sandbox interpreter started (pid {})", sandbox.child.id());
        Ok(sandbox)
    }

    fn read_reply<T: DeserializeOwned>(&mut self) -> SandboxResult<T> {
        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            return Err(SandboxError::Terminated);
        }
        let reply: Reply<T> = serde_json::from_str(line.trim_end())
            .map_err(|e| SandboxError::Protocol(format!("{}: {}", e, line.trim_end())))?;
        match reply {
            Reply::Ok { ok } => Ok(ok),
            Reply::Err { err } => Err(SandboxError::Raised {
                kind: err.kind,
                message: err.message,
                traceback: err.traceback,
            }),
        }
    }

    fn request<T: DeserializeOwned>(&mut self, source: &str) -> SandboxResult<T> {
        let line = serde_json::to_string(&Request { source })
            .map_err(|e| SandboxError::Protocol(e.to_string()))?;
        let sent = writeln!(self.stdin, "{}", line).and_then(|_| self.stdin.flush());
        if let Err(e) = sent {
            return Err(if e.kind() == std::io::ErrorKind::BrokenPipe {
                SandboxError::Terminated
            } else {
                SandboxError::Io(e)
            });
        }
        self.read_reply()
    }
}

fn path_literal(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

impl Sandbox for PythonSandbox {
    fn root(&self) -> &Path {
        &self.root
    }

    fn install_package(&mut self, spec: &str) -> SandboxResult<()> {
        self.request(&format!("__rb.install({})", quote(spec)))
    }

    fn unpack_archive(&mut self, archive: &Path, dest: &Path) -> SandboxResult<()> {
        self.request(&format!(
            "__rb.unpack({}, {})",
            path_literal(archive),
            path_literal(dest)
        ))
    }

    fn prepend_import_path(&mut self, dir: &Path) -> SandboxResult<()> {
        self.request(&format!("__rb.path_insert({})", path_literal(dir)))
    }

    fn import(&mut self, module: &str) -> SandboxResult<ObjRef> {
        self.request(&format!("__rb.import_module({})", quote(module)))
    }

    fn import_from_file(&mut self, module: &str, path: &Path) -> SandboxResult<ObjRef> {
        self.request(&format!(
            "__rb.load_file({}, {})",
            quote(module),
            path_literal(path)
        ))
    }

    fn write_text(&mut self, path: &Path, content: &Escaped) -> SandboxResult<()> {
        self.request(&format!(
            "__rb.write_text({}, {})",
            path_literal(path),
            content.literal()
        ))
    }

    fn get_attr(&mut self, obj: ObjRef, name: &str) -> SandboxResult<Option<ObjRef>> {
        self.request(&format!("__rb.get_attr({}, {})", obj.0, quote(name)))
    }

    fn set_attr(&mut self, obj: ObjRef, name: &str, value: ObjRef) -> SandboxResult<()> {
        self.request(&format!(
            "__rb.set_attr({}, {}, {})",
            obj.0,
            quote(name),
            value.0
        ))
    }

    fn call(
        &mut self,
        callee: ObjRef,
        args: &[Arg],
        kwargs: &[(&str, Arg)],
    ) -> SandboxResult<ObjRef> {
        let payload = CallPayload {
            args,
            kwargs: kwargs.iter().map(|(k, v)| (*k, v)).collect(),
        };
        let payload =
            Escaped::json(&payload).map_err(|e| SandboxError::Protocol(e.to_string()))?;
        self.request(&format!("__rb.call({}, {})", callee.0, payload.literal()))
    }

    fn dir(&mut self, obj: ObjRef) -> SandboxResult<Vec<String>> {
        self.request(&format!("__rb.dir_({})", obj.0))
    }

    fn describe(&mut self, obj: ObjRef) -> SandboxResult<ObjInfo> {
        self.request(&format!("__rb.describe({})", obj.0))
    }

    fn is_subclass(&mut self, class: ObjRef, base: ObjRef) -> SandboxResult<bool> {
        self.request(&format!("__rb.is_subclass({}, {})", class.0, base.0))
    }

    fn extract(&mut self, obj: ObjRef) -> SandboxResult<Extracted> {
        let reply: ExtractReply = self.request(&format!("__rb.extract({})", obj.0))?;
        Ok(match reply {
            ExtractReply::Text(s) => Extracted::Text(s),
            ExtractReply::Bytes(b64) => Extracted::Bytes(
                base64::engine::general_purpose::STANDARD
                    .decode(b64)
                    .map_err(|e| SandboxError::Protocol(format!("bad bytes payload: {}", e)))?,
            ),
            ExtractReply::None => Extracted::None,
            ExtractReply::Other(repr) => Extracted::Other(repr),
        })
    }

    fn set_cwd(&mut self, dir: &Path) -> SandboxResult<()> {
        self.request(&format!("__rb.chdir({})", path_literal(dir)))
    }

    fn release(&mut self, obj: ObjRef) -> SandboxResult<()> {
        self.request(&format!("__rb.release({})", obj.0))
    }
}

impl Drop for PythonSandbox {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Launches [`PythonSandbox`] instances from a configured interpreter.
#[derive(Debug, Clone)]
pub struct PythonLauncher {
    pub python: String,
    /// Shared filesystem root. A fresh temporary directory per launch when unset.
    pub root: Option<PathBuf>,
}

impl PythonLauncher {
    pub fn new(python: impl Into<String>, root: Option<PathBuf>) -> Self {
        Self {
            python: python.into(),
            root,
        }
    }
}

impl RuntimeLauncher for PythonLauncher {
    fn is_available(&self) -> bool {
        match Command::new(&self.python)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) => status.success(),
            Err(e) => {
                debug!("Interpreter {:?} not available: {}", self.python, e);
                false
            }
        }
    }

    fn launch(&self) -> SandboxResult<Box<dyn Sandbox>> {
        let (root, scratch) = match &self.root {
            Some(root) => (root.clone(), None),
            None => {
                let dir = tempfile::Builder::new().prefix("regbridge-").tempdir()?;
                (dir.path().to_path_buf(), Some(dir))
            }
        };
        Ok(Box::new(PythonSandbox::spawn(&self.python, root, scratch)?))
    }
}
