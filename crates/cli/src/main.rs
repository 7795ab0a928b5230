// RegBridge - Register Map Generation Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod render;

use clap::{Parser, Subcommand};
use regbridge_config::{validate_config, BridgeConfig, GenerationOptions};
use regbridge_core::{
    Bridge, GenerationRequest, GenerationResult, HttpFetcher, InitReport, PythonLauncher,
};
use render::Show;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

const EXIT_PASS: u8 = 0;
const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Register map generation bridge",
    long_about = None
)]
struct Cli {
    /// Enable debug logging, including every generation strategy attempt
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a register map JSON file without running the generator.
    Validate(ValidateArgs),

    /// Emit the bundled example register map.
    Example(ExampleArgs),

    /// Generate VHDL, C header and documentation from a register map.
    Generate(GenerateArgs),

    /// Provision the sandbox and install the generator library, then report.
    Doctor(DoctorArgs),
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Register map JSON file
    file: PathBuf,
}

#[derive(Parser, Debug)]
struct ExampleArgs {
    /// Write to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Indented output
    #[arg(long)]
    pretty: bool,
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    /// Register map JSON file
    file: PathBuf,

    /// Secondary configuration handed to the library as-is
    #[arg(long)]
    csrconfig: Option<PathBuf>,

    /// Generation options as JSON, e.g. '{"c": false}'. Unreadable JSON keeps every format on
    #[arg(long)]
    options: Option<String>,

    #[arg(long)]
    no_vhdl: bool,

    #[arg(long)]
    no_c: bool,

    #[arg(long)]
    no_docs: bool,

    /// Do not request an AXI-Lite interface for the VHDL output
    #[arg(long)]
    no_axil: bool,

    /// Base address (hex)
    #[arg(long, default_value = "0x00000000")]
    base_address: String,

    /// Value returned for unmapped reads (hex)
    #[arg(long, default_value = "0xdeadbeef")]
    read_filler: String,

    /// Directory to write generated files into
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Print the raw result envelope as JSON
    #[arg(long)]
    json: bool,

    /// Print only this output's text
    #[arg(long, value_enum)]
    show: Option<Show>,

    /// Bridge configuration (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct DoctorArgs {
    /// Bridge configuration (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Validate(args) => run_validate(args),
        Commands::Example(args) => run_example(args),
        Commands::Generate(args) => run_generate(args),
        Commands::Doctor(args) => run_doctor(args),
    }
}

fn read_text(path: &Path) -> Result<String, ExitCode> {
    std::fs::read_to_string(path).map_err(|e| {
        error!("Failed to read {:?}: {}", path, e);
        ExitCode::from(EXIT_CONFIG_ERROR)
    })
}

fn load_bridge_config(path: Option<&Path>) -> Result<BridgeConfig, ExitCode> {
    let loaded = match path {
        Some(p) => BridgeConfig::from_file(p),
        None => Ok(BridgeConfig::default()),
    };
    loaded.map_err(|e| {
        error!("{:#}", e);
        ExitCode::from(EXIT_CONFIG_ERROR)
    })
}

fn run_validate(args: ValidateArgs) -> ExitCode {
    let text = match read_text(&args.file) {
        Ok(t) => t,
        Err(code) => return code,
    };
    let validation = validate_config(&text);
    println!("{}", validation.message);
    if validation.valid {
        ExitCode::from(EXIT_PASS)
    } else {
        ExitCode::from(EXIT_FAILURE)
    }
}

fn run_example(args: ExampleArgs) -> ExitCode {
    let example = regbridge_ir::example::default_example();
    let text = if args.pretty {
        example.to_pretty_json()
    } else {
        example.to_canonical_json()
    };
    match args.output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, format!("{}\n", text)) {
                error!("Failed to write {:?}: {}", path, e);
                return ExitCode::from(EXIT_RUNTIME_ERROR);
            }
            info!("Example register map written to {:?}", path);
        }
        None => println!("{}", text),
    }
    ExitCode::from(EXIT_PASS)
}

/// `--options` JSON first, then each `--no-*` flag switches its format off.
fn generation_options(args: &GenerateArgs) -> GenerationOptions {
    let mut options = args
        .options
        .as_deref()
        .map(GenerationOptions::from_json_lenient)
        .unwrap_or_default();
    options.vhdl &= !args.no_vhdl;
    options.c &= !args.no_c;
    options.docs &= !args.no_docs;
    options.axil &= !args.no_axil;
    options
}

/// Brings a bridge up with the interpreter and fetcher the config describes.
fn start_bridge(
    config: BridgeConfig,
    config_path: Option<&Path>,
) -> Result<(Bridge, InitReport), ExitCode> {
    let launcher = PythonLauncher::new(
        config.runtime.python.clone(),
        config.runtime.sandbox_root.clone(),
    );
    // Relative archive locations resolve against the config file's directory.
    let base_dir = config_path.and_then(|p| p.parent()).map(Path::to_path_buf);
    let fetcher = HttpFetcher::new(base_dir);

    let mut bridge = Bridge::new(config);
    match bridge.initialize(&launcher, &fetcher) {
        Ok(report) => Ok((bridge, report)),
        Err(e) => {
            error!("{}", e);
            Err(ExitCode::from(EXIT_RUNTIME_ERROR))
        }
    }
}

fn run_generate(args: GenerateArgs) -> ExitCode {
    let text = match read_text(&args.file) {
        Ok(t) => t,
        Err(code) => return code,
    };
    let validation = validate_config(&text);
    if !validation.valid {
        error!("{}", validation.message);
        return ExitCode::from(EXIT_FAILURE);
    }
    info!("{}", validation.message);

    let config = match load_bridge_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let mut request = GenerationRequest::new(text).with_options(generation_options(&args));
    request.base_address = args.base_address.clone();
    request.read_filler = args.read_filler.clone();
    if let Some(name) = args.file.file_name() {
        request = request.with_file_name(name.to_string_lossy());
    }
    if let Some(path) = &args.csrconfig {
        let secondary = match read_text(path) {
            Ok(t) => t,
            Err(code) => return code,
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "csrconfig".to_string());
        request = request.with_secondary(name, secondary);
    }

    let (mut bridge, _report) = match start_bridge(config, args.config.as_deref()) {
        Ok(b) => b,
        Err(code) => return code,
    };
    let result = match bridge.generate(&request) {
        Ok(r) => r,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };

    if args.json {
        match result.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize result: {}", e);
                return ExitCode::from(EXIT_RUNTIME_ERROR);
            }
        }
    }

    match &result {
        GenerationResult::Success(outputs) => {
            if let Some(dir) = &args.output_dir {
                if let Err(e) = render::write_artifacts(outputs, dir) {
                    error!("{:#}", e);
                    return ExitCode::from(EXIT_RUNTIME_ERROR);
                }
            }
            if !args.json {
                print!("{}", render::summary(outputs, args.show));
            }
            ExitCode::from(EXIT_PASS)
        }
        GenerationResult::Failure { error, traceback } => {
            error!("Generation failed: {}", error);
            if let Some(tb) = traceback {
                warn!("{}", tb);
            }
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn run_doctor(args: DoctorArgs) -> ExitCode {
    let config = match load_bridge_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let (_bridge, report) = match start_bridge(config, args.config.as_deref()) {
        Ok(b) => b,
        Err(code) => return code,
    };

    println!("runtime: ready after {} attempt(s)", report.attempts);
    println!("packages installed: {}", report.packages.installed.join(", "));
    if !report.packages.failed.is_empty() {
        println!("packages failed: {}", report.packages.failed.join(", "));
    }
    println!("diagram plugin: {:?}", report.packages.plugin);
    println!("library archive: {}", report.install.archive_location);
    println!("import root: {}", report.install.import_root.display());
    for dep in &report.install.dependencies {
        println!(
            "dependency {}: {}",
            dep.name,
            if dep.available { "available" } else { "missing" }
        );
    }
    println!(
        "library surface: model class {}, generators {}",
        if report.install.has_model_class { "found" } else { "missing" },
        if report.install.has_generators { "found" } else { "missing" },
    );

    if report.library_loaded {
        ExitCode::from(EXIT_PASS)
    } else {
        ExitCode::from(EXIT_FAILURE)
    }
}
