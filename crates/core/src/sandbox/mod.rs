// RegBridge - Register Map Generation Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod fs;
pub mod python;

use crate::marshal::Escaped;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Exception kinds that mean "this invocation shape is wrong" rather than "the library failed".
const SHAPE_MISMATCH_KINDS: &[&str] = &["TypeError", "AttributeError", "NotImplementedError"];

/// Exception kinds raised when a module cannot be imported.
const IMPORT_FAILURE_KINDS: &[&str] = &["ImportError", "ModuleNotFoundError"];

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The interpreter raised an exception while running an operation.
    #[error("{kind}: {message}")]
    Raised {
        kind: String,
        message: String,
        traceback: Option<String>,
    },
    #[error("sandbox I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed reply from sandbox: {0}")]
    Protocol(String),
    #[error("sandbox runtime terminated")]
    Terminated,
}

pub type SandboxResult<T> = Result<T, SandboxError>;

impl SandboxError {
    pub fn raised(kind: impl Into<String>, message: impl Into<String>) -> Self {
        SandboxError::Raised {
            kind: kind.into(),
            message: message.into(),
            traceback: None,
        }
    }

    /// True when the exception says the call itself was malformed for this API version.
    pub fn is_shape_mismatch(&self) -> bool {
        self.raised_kind_in(SHAPE_MISMATCH_KINDS)
    }

    /// True when a module could not be found or its import machinery failed.
    pub fn is_import_failure(&self) -> bool {
        self.raised_kind_in(IMPORT_FAILURE_KINDS)
    }

    fn raised_kind_in(&self, kinds: &[&str]) -> bool {
        matches!(self, SandboxError::Raised { kind, .. } if kinds.contains(&kind.as_str()))
    }

    /// Raised exceptions are recoverable; transport and protocol faults are not.
    pub fn is_raised(&self) -> bool {
        matches!(self, SandboxError::Raised { .. })
    }

    pub fn traceback(&self) -> Option<&str> {
        match self {
            SandboxError::Raised { traceback, .. } => traceback.as_deref(),
            _ => None,
        }
    }
}

/// Converts a raised exception into `None`, keeping transport faults as errors.
pub fn optional<T>(result: SandboxResult<T>) -> SandboxResult<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_raised() => {
            tracing::debug!("optional sandbox lookup failed: {}", e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Opaque handle to an object living inside the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjRef(pub u64);

/// A call argument. Serialized to JSON and re-parsed on the sandbox side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Arg {
    #[serde(rename = "s")]
    Str(String),
    #[serde(rename = "i")]
    Int(u64),
    #[serde(rename = "b")]
    Bool(bool),
    #[serde(rename = "o")]
    Obj(ObjRef),
    #[serde(rename = "j")]
    Json(serde_json::Value),
}

impl Arg {
    pub fn path(path: &Path) -> Self {
        Arg::Str(path.to_string_lossy().into_owned())
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}

impl From<ObjRef> for Arg {
    fn from(o: ObjRef) -> Self {
        Arg::Obj(o)
    }
}

/// What kind of object a handle refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ObjInfo {
    pub is_class: bool,
}

/// A sandbox value converted to host data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Text(String),
    Bytes(Vec<u8>),
    None,
    /// Anything else, as its printable representation.
    Other(String),
}

impl Extracted {
    /// Content suitable for writing to a file, if the value is text or bytes.
    pub fn into_content(self) -> Option<Vec<u8>> {
        match self {
            Extracted::Text(s) => Some(s.into_bytes()),
            Extracted::Bytes(b) => Some(b),
            Extracted::None | Extracted::Other(_) => None,
        }
    }
}

/// An isolated interpreter with its own filesystem root.
///
/// The root directory is shared with the host: host-side code may read and write beneath it
/// directly, while every interaction with interpreter objects goes through these operations.
/// No operation may be issued while another is in flight; `&mut self` enforces that.
pub trait Sandbox {
    /// Filesystem root visible to both sides.
    fn root(&self) -> &Path;

    /// Installs a package from an index name or a source URL.
    fn install_package(&mut self, spec: &str) -> SandboxResult<()>;

    /// Extracts a zip archive.
    fn unpack_archive(&mut self, archive: &Path, dest: &Path) -> SandboxResult<()>;

    /// Puts `dir` at the front of the import search path.
    fn prepend_import_path(&mut self, dir: &Path) -> SandboxResult<()>;

    fn import(&mut self, module: &str) -> SandboxResult<ObjRef>;

    /// Loads a source file and registers it under `module` in the module registry.
    fn import_from_file(&mut self, module: &str, path: &Path) -> SandboxResult<ObjRef>;

    /// Writes marshaled text to a file; the sandbox decodes the escapes.
    fn write_text(&mut self, path: &Path, content: &Escaped) -> SandboxResult<()>;

    /// Looks up an attribute. `None` if the object has no such attribute.
    fn get_attr(&mut self, obj: ObjRef, name: &str) -> SandboxResult<Option<ObjRef>>;

    fn set_attr(&mut self, obj: ObjRef, name: &str, value: ObjRef) -> SandboxResult<()>;

    fn call(
        &mut self,
        callee: ObjRef,
        args: &[Arg],
        kwargs: &[(&str, Arg)],
    ) -> SandboxResult<ObjRef>;

    /// Public attribute names.
    fn dir(&mut self, obj: ObjRef) -> SandboxResult<Vec<String>>;

    fn describe(&mut self, obj: ObjRef) -> SandboxResult<ObjInfo>;

    fn is_subclass(&mut self, class: ObjRef, base: ObjRef) -> SandboxResult<bool>;

    fn extract(&mut self, obj: ObjRef) -> SandboxResult<Extracted>;

    fn set_cwd(&mut self, dir: &Path) -> SandboxResult<()>;

    /// Drops the sandbox's reference to a handle.
    fn release(&mut self, _obj: ObjRef) -> SandboxResult<()> {
        Ok(())
    }

    /// Looks up and calls a method. `Ok(None)` if the method does not exist.
    fn call_method(
        &mut self,
        obj: ObjRef,
        name: &str,
        args: &[Arg],
        kwargs: &[(&str, Arg)],
    ) -> SandboxResult<Option<ObjRef>> {
        match self.get_attr(obj, name)? {
            Some(method) => self.call(method, args, kwargs).map(Some),
            None => Ok(None),
        }
    }
}
