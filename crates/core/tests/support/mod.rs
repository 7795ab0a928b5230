// In-process stand-ins for the interpreter, the archive server and the runtime launcher.
//
// `FakeSandbox` emulates a register map library with a configurable API shape, so the
// orchestrator's strategy chains can be driven without a real interpreter.

#![allow(dead_code)]

use regbridge_config::BridgeConfig;
use regbridge_core::fetch::{Fetch, FetchError};
use regbridge_core::library::LibraryHandle;
use regbridge_core::marshal::Escaped;
use regbridge_core::provision::RuntimeLauncher;
use regbridge_core::sandbox::{
    Arg, Extracted, ObjInfo, ObjRef, Sandbox, SandboxError, SandboxResult,
};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub const CTRL_CONFIG: &str = concat!(
    r#"{"registers":[{"name":"CTRL","address":0,"#,
    r#""fields":[{"name":"EN","bits":"0","access":"RW"}]}]}"#,
);

/// Archive listing understood by `FakeSandbox::unpack_archive`: one path per line,
/// directories end with `/`.
pub const GOOD_ARCHIVE: &str = concat!(
    "corsair-master/\n",
    "corsair-master/corsair/__init__.py\n",
    "corsair-master/README.md\n",
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryShape {
    /// Generators take `(model, **options)` and expose `generate()`.
    KwCtorGenerate,
    /// Generators take no constructor arguments and only expose `render(model)`.
    RenderOnly,
    /// The model exposes `generate_all`.
    Pipeline,
    /// Every generator method raises `TypeError`.
    AllTypeError,
    /// The library never imports.
    ImportFails,
}

#[derive(Debug, Clone)]
enum Obj {
    Module(String),
    Class(String),
    Model {
        registers: Vec<String>,
    },
    Generator {
        class: String,
        model: Option<u64>,
        path: Option<String>,
        image_dir: Option<String>,
    },
    Diagram,
    Method {
        owner: u64,
        name: String,
    },
    Dict(BTreeMap<String, String>),
    Text(String),
    NoneValue,
}

#[derive(Debug, Default)]
pub struct FakeLog {
    pub calls: Vec<String>,
    pub installed: Vec<String>,
    pub import_paths: Vec<PathBuf>,
    pub globcfg: Option<BTreeMap<String, String>>,
    pub released: usize,
    pub ops: usize,
}

impl FakeLog {
    pub fn called(&self, prefix: &str) -> bool {
        self.calls.iter().any(|c| c.starts_with(prefix))
    }
}

pub struct FakeSandbox {
    root: PathBuf,
    _dir: tempfile::TempDir,
    shape: LibraryShape,
    objects: HashMap<u64, Obj>,
    next_id: u64,
    cwd: PathBuf,
    injected: BTreeMap<(String, String), u64>,
    registered: HashSet<String>,
    pub installable: HashSet<String>,
    pub require_import_path: bool,
    pub has_config: bool,
    /// Generator class whose `generate` raises a genuine library error.
    pub raise_in: Option<String>,
    /// Generator class whose `generate` kills the runtime.
    pub terminate_on: Option<String>,
    /// Exception kind raised when `RegisterMap` is given constructor arguments.
    pub model_ctor_error: &'static str,
    /// Exception kind `ImportFails` raises for the library modules.
    pub library_import_error: &'static str,
    log: Rc<RefCell<FakeLog>>,
}

fn raised(kind: &str, message: impl Into<String>) -> SandboxError {
    SandboxError::Raised {
        kind: kind.to_string(),
        message: message.into(),
        traceback: Some(format!("Traceback (most recent call last):\n{}", kind)),
    }
}

fn render_text(class: &str, registers: &[String]) -> String {
    let lower = class.to_lowercase();
    let mut out = String::new();
    if lower.contains("vhdl") {
        out.push_str("-- Generated register file\nentity regs is\n");
        for r in registers {
            out.push_str(&format!("  -- {}\n", r));
        }
        out.push_str("end entity;\n");
    } else if lower.contains("header") {
        out.push_str("#ifndef CSR_REGS_H\n");
        for (i, r) in registers.iter().enumerate() {
            out.push_str(&format!("#define CSR_{}_ADDR 0x{:x}\n", r, i * 4));
        }
        out.push_str("#endif\n");
    } else if lower.contains("markdown") {
        out.push_str("# Register Map\n");
        for r in registers {
            out.push_str(&format!("## {}\n", r));
        }
    } else {
        out.push_str("= Register Map\n");
        for r in registers {
            out.push_str(&format!("== {}\n", r));
        }
    }
    out
}

fn write_file(path: &Path, text: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, text).unwrap();
}

fn register_names(value: &serde_json::Value) -> SandboxResult<Vec<String>> {
    let regs = value
        .get("registers")
        .and_then(|r| r.as_array())
        .ok_or_else(|| raised("KeyError", "'registers'"))?;
    Ok(regs
        .iter()
        .filter_map(|r| r.get("name").and_then(|n| n.as_str()).map(str::to_string))
        .collect())
}

impl FakeSandbox {
    pub fn new(shape: LibraryShape) -> (Self, Rc<RefCell<FakeLog>>) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let log = Rc::new(RefCell::new(FakeLog::default()));
        let sandbox = Self {
            cwd: root.clone(),
            root,
            _dir: dir,
            shape,
            objects: HashMap::new(),
            next_id: 1,
            injected: BTreeMap::new(),
            registered: HashSet::new(),
            installable: HashSet::new(),
            require_import_path: false,
            has_config: true,
            raise_in: None,
            terminate_on: None,
            model_ctor_error: "TypeError",
            library_import_error: "ModuleNotFoundError",
            log: log.clone(),
        };
        (sandbox, log)
    }

    fn generator_names(&self) -> &'static [&'static str] {
        match self.shape {
            LibraryShape::RenderOnly => &["AsciidocGen", "CHeaderGen", "MarkdownGen", "VhdlGen"],
            _ => &["Asciidoc", "CHeader", "Markdown", "Vhdl"],
        }
    }

    fn store(&mut self, obj: Obj) -> ObjRef {
        let id = self.next_id;
        self.next_id += 1;
        self.objects.insert(id, obj);
        ObjRef(id)
    }

    fn get(&self, obj: ObjRef) -> SandboxResult<&Obj> {
        self.objects
            .get(&obj.0)
            .ok_or_else(|| raised("KeyError", format!("no object {}", obj.0)))
    }

    fn record(&self, call: impl Into<String>) {
        self.log.borrow_mut().calls.push(call.into());
    }

    fn library_on_path(&self) -> bool {
        !self.require_import_path
            || self
                .log
                .borrow()
                .import_paths
                .iter()
                .any(|p| p.join("corsair/__init__.py").is_file())
    }

    fn package_installed(&self, module: &str) -> bool {
        let log = self.log.borrow();
        log.installed.iter().any(|pkg| {
            pkg == module
                || (module == "yaml" && pkg == "pyyaml")
                || (module == "wavedrom" && pkg == "wavedrom-python")
        })
    }

    fn model_registers(&self, model: Option<u64>) -> Vec<String> {
        match model.and_then(|id| self.objects.get(&id)) {
            Some(Obj::Model { registers }) => registers.clone(),
            _ => Vec::new(),
        }
    }

    fn method_names(&self, obj: &Obj) -> Vec<&'static str> {
        match obj {
            Obj::Model { .. } => {
                let mut names = vec!["read_file", "load"];
                if self.shape == LibraryShape::Pipeline {
                    names.push("generate_all");
                }
                names
            }
            Obj::Generator { .. } => match self.shape {
                LibraryShape::RenderOnly => vec!["render"],
                LibraryShape::AllTypeError => vec!["generate", "render", "render_to_file"],
                _ => vec!["generate"],
            },
            Obj::Module(name) if name == "corsair.config" => vec!["default_globcfg", "set_globcfg"],
            Obj::Dict(_) => vec!["__setitem__"],
            Obj::Diagram => vec!["draw_regs"],
            _ => Vec::new(),
        }
    }

    fn lookup(&self, owner: u64, obj: &Obj, name: &str) -> Option<Obj> {
        if self.method_names(obj).contains(&name) {
            return Some(Obj::Method {
                owner,
                name: name.to_string(),
            });
        }
        match obj {
            Obj::Module(m) if m == "corsair" => match name {
                "RegisterMap" => Some(Obj::Class(name.to_string())),
                "generators" => Some(Obj::Module("corsair.generators".to_string())),
                "config" if self.has_config => Some(Obj::Module("corsair.config".to_string())),
                _ => None,
            },
            Obj::Module(m) if m == "corsair.generators" => {
                if name == "Generator" || self.generator_names().contains(&name) {
                    Some(Obj::Class(name.to_string()))
                } else {
                    self.injected
                        .get(&(m.clone(), name.to_string()))
                        .and_then(|id| self.objects.get(id))
                        .cloned()
                }
            }
            Obj::Module(m) if self.registered.contains(m) && name == "RegisterDiagram" => {
                Some(Obj::Class(name.to_string()))
            }
            _ => None,
        }
    }

    fn construct(
        &mut self,
        class: &str,
        args: &[Arg],
        kwargs: &[(&str, Arg)],
    ) -> SandboxResult<Obj> {
        let kw_names: Vec<&str> = kwargs.iter().map(|(k, _)| *k).collect();
        self.record(format!("new {}({} args; {})", class, args.len(), kw_names.join(",")));

        if class == "RegisterMap" {
            if !args.is_empty() || !kwargs.is_empty() {
                return Err(raised(self.model_ctor_error, "RegisterMap() takes no arguments"));
            }
            return Ok(Obj::Model {
                registers: Vec::new(),
            });
        }
        if class == "RegisterDiagram" {
            return Ok(Obj::Diagram);
        }
        if !self.generator_names().contains(&class) {
            return Err(raised("TypeError", format!("cannot instantiate {}", class)));
        }

        let kw = |key: &str| {
            kwargs.iter().find_map(|(k, v)| match v {
                Arg::Str(s) if *k == key => Some(s.clone()),
                _ => None,
            })
        };
        let model = match args.first() {
            Some(Arg::Obj(m)) => Some(m.0),
            _ => None,
        };
        match self.shape {
            LibraryShape::RenderOnly => {
                if !args.is_empty() || !kwargs.is_empty() {
                    return Err(raised("TypeError", format!("{}() takes no arguments", class)));
                }
            }
            LibraryShape::AllTypeError => {}
            _ => {
                if args.len() != 1 || model.is_none() || kw("path").is_none() {
                    return Err(raised(
                        "TypeError",
                        format!("{}() missing required argument: 'path'", class),
                    ));
                }
            }
        }
        Ok(Obj::Generator {
            class: class.to_string(),
            model,
            path: kw("path"),
            image_dir: kw("image_dir"),
        })
    }

    fn write_pipeline_outputs(&self, outdir: &Path, registers: &[String]) {
        write_file(&outdir.join("hw/regs.vhd"), &render_text("Vhdl", registers));
        write_file(&outdir.join("sw/regs.h"), &render_text("CHeader", registers));
        write_file(&outdir.join("doc/regs.md"), &render_text("Markdown", registers));
    }

    fn invoke(
        &mut self,
        owner: u64,
        name: &str,
        args: &[Arg],
        kwargs: &[(&str, Arg)],
    ) -> SandboxResult<Obj> {
        let target = self
            .objects
            .get(&owner)
            .cloned()
            .ok_or_else(|| raised("KeyError", "dangling method"))?;
        match target {
            Obj::Model { .. } => match name {
                "read_file" => {
                    let Some(Arg::Str(path)) = args.first() else {
                        return Err(raised("TypeError", "read_file() missing path"));
                    };
                    self.record(format!("read_file({})", path));
                    let text = std::fs::read_to_string(path)
                        .map_err(|e| raised("FileNotFoundError", e.to_string()))?;
                    let value: serde_json::Value = serde_json::from_str(&text)
                        .map_err(|e| raised("ValueError", e.to_string()))?;
                    let names = register_names(&value)?;
                    self.objects.insert(owner, Obj::Model { registers: names });
                    Ok(Obj::NoneValue)
                }
                "load" => {
                    let Some(Arg::Json(value)) = args.first() else {
                        return Err(raised("TypeError", "load() missing data"));
                    };
                    let names = register_names(value)?;
                    self.objects.insert(owner, Obj::Model { registers: names });
                    Ok(Obj::NoneValue)
                }
                "generate_all" => {
                    let outdir = match (args, kwargs) {
                        ([Arg::Str(_), Arg::Str(out)], []) => {
                            self.record("generate_all(config, outdir)");
                            out.clone()
                        }
                        ([Arg::Str(out)], []) => {
                            self.record("generate_all(outdir)");
                            out.clone()
                        }
                        _ => {
                            return Err(raised(
                                "TypeError",
                                "generate_all() takes positional arguments only",
                            ))
                        }
                    };
                    let registers = self.model_registers(Some(owner));
                    self.write_pipeline_outputs(Path::new(&outdir), &registers);
                    Ok(Obj::NoneValue)
                }
                _ => Err(raised("AttributeError", name.to_string())),
            },
            Obj::Generator {
                class,
                model,
                path,
                image_dir,
            } => {
                if self.shape == LibraryShape::AllTypeError {
                    return Err(raised("TypeError", format!("{}() signature mismatch", name)));
                }
                if self.terminate_on.as_deref() == Some(class.as_str()) {
                    return Err(SandboxError::Terminated);
                }
                if self.raise_in.as_deref() == Some(class.as_str()) {
                    return Err(raised("ValueError", "field EN overlaps field MODE"));
                }
                match name {
                    "generate" => {
                        if !args.is_empty() {
                            return Err(raised("TypeError", "generate() takes no arguments"));
                        }
                        self.record(format!("generate {}", class));
                        let registers = self.model_registers(model);
                        let rel = path.unwrap_or_else(|| "out.txt".to_string());
                        write_file(&self.cwd.join(&rel), &render_text(&class, &registers));
                        if let Some(img) = image_dir {
                            for r in &registers {
                                let svg = self
                                    .cwd
                                    .join("doc")
                                    .join(&img)
                                    .join(format!("{}.svg", r.to_lowercase()));
                                write_file(&svg, "<svg/>");
                            }
                        }
                        Ok(Obj::NoneValue)
                    }
                    "render" => {
                        let Some(Arg::Obj(m)) = args.first() else {
                            return Err(raised(
                                "TypeError",
                                "render() missing 1 required positional argument: 'rmap'",
                            ));
                        };
                        self.record(format!("render {}", class));
                        let registers = self.model_registers(Some(m.0));
                        Ok(Obj::Text(render_text(&class, &registers)))
                    }
                    _ => Err(raised("AttributeError", name.to_string())),
                }
            }
            Obj::Module(m) if m == "corsair.config" => match name {
                "default_globcfg" => Ok(Obj::Dict(BTreeMap::from([
                    ("base_address".to_string(), "0".to_string()),
                    ("data_width".to_string(), "32".to_string()),
                ]))),
                "set_globcfg" => {
                    let Some(Arg::Obj(d)) = args.first() else {
                        return Err(raised("TypeError", "set_globcfg() missing globcfg"));
                    };
                    if let Some(Obj::Dict(values)) = self.objects.get(&d.0) {
                        self.log.borrow_mut().globcfg = Some(values.clone());
                    }
                    Ok(Obj::NoneValue)
                }
                _ => Err(raised("AttributeError", name.to_string())),
            },
            Obj::Dict(mut values) => {
                let [Arg::Str(key), value] = args else {
                    return Err(raised("TypeError", "__setitem__ expects 2 arguments"));
                };
                let rendered = match value {
                    Arg::Str(s) => s.clone(),
                    Arg::Int(i) => i.to_string(),
                    Arg::Bool(b) => b.to_string(),
                    other => format!("{:?}", other),
                };
                values.insert(key.clone(), rendered);
                self.objects.insert(owner, Obj::Dict(values));
                Ok(Obj::NoneValue)
            }
            Obj::Diagram => Ok(Obj::NoneValue),
            _ => Err(raised("TypeError", "object is not callable")),
        }
    }
}

impl Sandbox for FakeSandbox {
    fn root(&self) -> &Path {
        &self.root
    }

    fn install_package(&mut self, spec: &str) -> SandboxResult<()> {
        self.record(format!("pip {}", spec));
        if self.installable.contains(spec) {
            self.log.borrow_mut().installed.push(spec.to_string());
            Ok(())
        } else {
            Err(raised(
                "RuntimeError",
                format!("No matching distribution found for {}", spec),
            ))
        }
    }

    fn unpack_archive(&mut self, archive: &Path, dest: &Path) -> SandboxResult<()> {
        let bytes = std::fs::read(archive)
            .map_err(|e| raised("FileNotFoundError", e.to_string()))?;
        let listing = String::from_utf8(bytes).map_err(|_| raised("BadZipFile", "not a zip"))?;
        for line in listing.lines().filter(|l| !l.trim().is_empty()) {
            let path = dest.join(line.trim_end_matches('/'));
            if line.ends_with('/') {
                std::fs::create_dir_all(&path)?;
            } else {
                write_file(&path, "");
            }
        }
        Ok(())
    }

    fn prepend_import_path(&mut self, dir: &Path) -> SandboxResult<()> {
        self.log.borrow_mut().import_paths.insert(0, dir.to_path_buf());
        Ok(())
    }

    fn import(&mut self, module: &str) -> SandboxResult<ObjRef> {
        self.log.borrow_mut().ops += 1;
        let not_found = || raised("ModuleNotFoundError", format!("No module named '{}'", module));
        let obj = match module {
            m if m.starts_with("corsair") && self.shape == LibraryShape::ImportFails => {
                return Err(raised(self.library_import_error, "corsair failed to import"));
            }
            "corsair" | "corsair.generators" if self.library_on_path() => {
                Obj::Module(module.to_string())
            }
            "corsair.config" if self.has_config && self.library_on_path() => {
                Obj::Module(module.to_string())
            }
            m if self.registered.contains(m) || self.package_installed(m) => {
                Obj::Module(module.to_string())
            }
            _ => return Err(not_found()),
        };
        Ok(self.store(obj))
    }

    fn import_from_file(&mut self, module: &str, path: &Path) -> SandboxResult<ObjRef> {
        if !path.is_file() {
            return Err(raised("FileNotFoundError", path.to_string_lossy()));
        }
        self.record(format!("load_file {}", module));
        self.registered.insert(module.to_string());
        Ok(self.store(Obj::Module(module.to_string())))
    }

    fn write_text(&mut self, path: &Path, content: &Escaped) -> SandboxResult<()> {
        self.log.borrow_mut().ops += 1;
        write_file(path, &content.unescape());
        Ok(())
    }

    fn get_attr(&mut self, obj: ObjRef, name: &str) -> SandboxResult<Option<ObjRef>> {
        self.log.borrow_mut().ops += 1;
        let target = self.get(obj)?.clone();
        Ok(self.lookup(obj.0, &target, name).map(|o| self.store(o)))
    }

    fn set_attr(&mut self, obj: ObjRef, name: &str, value: ObjRef) -> SandboxResult<()> {
        let Obj::Module(module) = self.get(obj)?.clone() else {
            return Err(raised("AttributeError", "read-only object"));
        };
        self.record(format!("set_attr {}.{}", module, name));
        self.injected.insert((module, name.to_string()), value.0);
        Ok(())
    }

    fn call(
        &mut self,
        callee: ObjRef,
        args: &[Arg],
        kwargs: &[(&str, Arg)],
    ) -> SandboxResult<ObjRef> {
        self.log.borrow_mut().ops += 1;
        let result = match self.get(callee)?.clone() {
            Obj::Class(name) => self.construct(&name, args, kwargs)?,
            Obj::Method { owner, name } => self.invoke(owner, &name, args, kwargs)?,
            _ => return Err(raised("TypeError", "object is not callable")),
        };
        Ok(self.store(result))
    }

    fn dir(&mut self, obj: ObjRef) -> SandboxResult<Vec<String>> {
        let mut names: Vec<String> = match self.get(obj)? {
            Obj::Module(m) if m == "corsair.generators" => {
                let mut names: Vec<String> =
                    self.generator_names().iter().map(|s| s.to_string()).collect();
                names.push("Generator".to_string());
                names.push("jinja2".to_string());
                names.extend(
                    self.injected
                        .keys()
                        .filter(|(module, _)| module == m)
                        .map(|(_, n)| n.clone()),
                );
                names
            }
            other => self.method_names(other).iter().map(|s| s.to_string()).collect(),
        };
        names.sort();
        Ok(names)
    }

    fn describe(&mut self, obj: ObjRef) -> SandboxResult<ObjInfo> {
        Ok(ObjInfo {
            is_class: matches!(self.get(obj)?, Obj::Class(_)),
        })
    }

    fn is_subclass(&mut self, class: ObjRef, base: ObjRef) -> SandboxResult<bool> {
        match (self.get(class)?, self.get(base)?) {
            (Obj::Class(c), Obj::Class(b)) => {
                Ok(b == "Generator" && self.generator_names().contains(&c.as_str()))
            }
            _ => Ok(false),
        }
    }

    fn extract(&mut self, obj: ObjRef) -> SandboxResult<Extracted> {
        Ok(match self.get(obj)? {
            Obj::Text(s) => Extracted::Text(s.clone()),
            Obj::NoneValue => Extracted::None,
            other => Extracted::Other(format!("{:?}", other)),
        })
    }

    fn set_cwd(&mut self, dir: &Path) -> SandboxResult<()> {
        if !dir.is_dir() {
            return Err(raised("FileNotFoundError", dir.to_string_lossy()));
        }
        self.cwd = dir.to_path_buf();
        Ok(())
    }

    fn release(&mut self, obj: ObjRef) -> SandboxResult<()> {
        self.objects.remove(&obj.0);
        self.log.borrow_mut().released += 1;
        Ok(())
    }
}

/// Test config: no retry delay.
pub fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.runtime.retry_delay_ms = 0;
    config
}

/// A fake sandbox with its library already importable and resolved.
pub fn loaded(shape: LibraryShape) -> (FakeSandbox, LibraryHandle, Rc<RefCell<FakeLog>>) {
    let (mut sandbox, log) = FakeSandbox::new(shape);
    let library = LibraryHandle::load(&mut sandbox, &test_config())
        .unwrap()
        .expect("library should load");
    (sandbox, library, log)
}

pub struct FakeLauncher {
    /// Poll on which the runtime first reports available.
    pub available_on: u32,
    pub polls: Cell<u32>,
    sandbox: RefCell<Option<FakeSandbox>>,
}

impl FakeLauncher {
    pub fn new(sandbox: FakeSandbox, available_on: u32) -> Self {
        Self {
            available_on,
            polls: Cell::new(0),
            sandbox: RefCell::new(Some(sandbox)),
        }
    }
}

impl RuntimeLauncher for FakeLauncher {
    fn is_available(&self) -> bool {
        let polls = self.polls.get() + 1;
        self.polls.set(polls);
        polls >= self.available_on
    }

    fn launch(&self) -> SandboxResult<Box<dyn Sandbox>> {
        match self.sandbox.borrow_mut().take() {
            Some(sandbox) => Ok(Box::new(sandbox)),
            None => Err(SandboxError::Terminated),
        }
    }
}

#[derive(Default)]
pub struct FakeFetcher {
    pub files: HashMap<String, Vec<u8>>,
    pub requests: RefCell<Vec<String>>,
}

impl FakeFetcher {
    pub fn serving(location: &str, body: &str) -> Self {
        let mut fetcher = Self::default();
        fetcher.files.insert(location.to_string(), body.as_bytes().to_vec());
        fetcher
    }
}

impl Fetch for FakeFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        self.requests.borrow_mut().push(location.to_string());
        self.files
            .get(location)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                status: 404,
                status_text: "Not Found".to_string(),
            })
    }
}
