use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cubesync_core::{
    AnimationDocument, LinkConfig, LinkError, ProtocolError, Session, load_document,
    make_document,
};
use glob::glob;
use log::{debug, info};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit ",
    env!("CUBESYNC_BUILD_COMMIT"),
    ", built ",
    env!("CUBESYNC_BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "cubesync")]
#[command(version, long_version = LONG_VERSION)]
#[command(
    about = "Sync animations with an LED cube over a serial link.",
    long_about = None,
    after_help = "Examples:\n  cubesync probe --port /dev/ttyUSB0\n  cubesync download --port /dev/ttyUSB0 -o animations.json\n  cubesync upload --port /dev/ttyUSB0 animations.json"
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List serial ports visible to this host.
    Ports,
    /// Check that a cube answers on the port.
    Probe {
        #[command(flatten)]
        link: LinkArgs,

        /// Suppress non-error output
        #[arg(long)]
        quiet: bool,
    },
    /// Fetch every animation stored on the cube into a JSON document.
    #[command(
        after_help = "Examples:\n  cubesync download --port /dev/ttyUSB0 -o animations.json\n  cubesync download --port COM3 --stdout --pretty"
    )]
    Download {
        #[command(flatten)]
        link: LinkArgs,

        /// Output document path (JSON)
        #[arg(short = 'o', long, required_unless_present = "stdout")]
        output: Option<PathBuf>,

        /// Write the JSON document to stdout
        #[arg(long, conflicts_with = "output")]
        stdout: bool,

        /// Pretty-print JSON output
        #[arg(long, conflicts_with = "compact")]
        pretty: bool,

        /// Compact JSON output (default)
        #[arg(long)]
        compact: bool,

        /// Suppress non-error output
        #[arg(long)]
        quiet: bool,
    },
    /// Replace the cube's animations with those of a JSON document.
    Upload {
        #[command(flatten)]
        link: LinkArgs,

        /// Path to a .json document (a glob matching exactly one file is accepted)
        input: PathBuf,

        /// Suppress non-error output
        #[arg(long)]
        quiet: bool,
    },
    /// Erase the cube's animation memory.
    Clear {
        #[command(flatten)]
        link: LinkArgs,

        /// Suppress non-error output
        #[arg(long)]
        quiet: bool,
    },
}

#[derive(Args, Debug)]
struct LinkArgs {
    /// Serial port the cube is attached to (see `cubesync ports`)
    #[arg(short, long)]
    port: String,

    /// Baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Time allowed per byte of each read or write, in milliseconds
    #[arg(long)]
    byte_timeout_ms: Option<u64>,

    /// Time a new request waits for an abandoned one, in milliseconds
    #[arg(long)]
    fence_timeout_ms: Option<u64>,
}

impl LinkArgs {
    fn config(&self) -> LinkConfig {
        let mut config = LinkConfig::default();
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(ms) = self.byte_timeout_ms {
            config.byte_timeout_ms = ms;
        }
        if let Some(ms) = self.fence_timeout_ms {
            config.fence_timeout_ms = ms;
        }
        config
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Ports => cmd_ports(),
        Commands::Probe { link, quiet } => cmd_probe(&link, quiet),
        Commands::Download {
            link,
            output,
            stdout: _,
            pretty,
            compact: _,
            quiet,
        } => cmd_download(&link, output, pretty, quiet),
        Commands::Upload { link, input, quiet } => cmd_upload(&link, &input, quiet),
        Commands::Clear { link, quiet } => cmd_clear(&link, quiet),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(format!("{err:#}"), None)
    }
}

impl From<ProtocolError> for CliError {
    fn from(err: ProtocolError) -> Self {
        let hint = match &err {
            ProtocolError::Timeout { .. } => {
                Some("check the cable, the port name and the baud rate".to_string())
            }
            ProtocolError::Mismatch { .. } | ProtocolError::Malformed { .. } => {
                Some("the cube may be out of sync; power-cycle it and retry".to_string())
            }
            ProtocolError::DeviceError { .. } => {
                Some("the cube rejected the transfer; retry the whole operation".to_string())
            }
            ProtocolError::Link { .. } => None,
        };
        CliError::new(err.to_string(), hint)
    }
}

fn cmd_ports() -> Result<(), CliError> {
    let ports = cubesync_core::link::serial::available_ports()
        .map_err(|err| CliError::new(format!("failed to enumerate serial ports: {err}"), None))?;
    if ports.is_empty() {
        eprintln!("no serial ports found");
        return Ok(());
    }
    for port in ports {
        println!("{}\t{:?}", port.port_name, port.port_type);
    }
    Ok(())
}

fn cmd_probe(link: &LinkArgs, quiet: bool) -> Result<(), CliError> {
    let mut session = open_session(link)?;
    session.try_probe()?;
    if !quiet {
        eprintln!("OK: cube answered on {}", link.port);
    }
    Ok(())
}

/// `output` of `None` means stdout; clap rejects the conflicting flags.
fn cmd_download(
    link: &LinkArgs,
    output: Option<PathBuf>,
    pretty: bool,
    quiet: bool,
) -> Result<(), CliError> {
    let mut session = open_session(link)?;
    let animations = session.try_download()?;
    info!(
        "downloaded {} animation(s) from {}",
        animations.len(),
        link.port
    );
    let doc = make_document(animations, Some(&link.port));
    let json = serialize_document(&doc, pretty)?;

    let Some(output) = output else {
        println!("{}", json);
        return Ok(());
    };

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
    }
    fs::write(&output, json)
        .with_context(|| format!("Failed to write document: {}", output.display()))?;

    if !quiet {
        eprintln!(
            "OK: {} animation(s) written -> {}",
            doc.animations.len(),
            output.display()
        );
    }
    Ok(())
}

fn cmd_upload(link: &LinkArgs, input: &Path, quiet: bool) -> Result<(), CliError> {
    let resolved = resolve_input_path(input)?;
    validate_input_file(&resolved)?;
    let doc = load_document(&resolved).map_err(|err| {
        CliError::new(
            format!("failed to load {}: {err}", resolved.display()),
            Some("expected a document written by `cubesync download`".to_string()),
        )
    })?;
    debug!(
        "loaded {} animation(s), {} frame(s) from {}",
        doc.animations.len(),
        doc.animations.total_frames(),
        resolved.display()
    );

    let mut session = open_session(link)?;
    session.try_upload(&doc.animations)?;
    if !quiet {
        eprintln!(
            "OK: {} animation(s) uploaded -> {}",
            doc.animations.len(),
            link.port
        );
    }
    Ok(())
}

fn cmd_clear(link: &LinkArgs, quiet: bool) -> Result<(), CliError> {
    let mut session = open_session(link)?;
    session.try_clear()?;
    if !quiet {
        eprintln!("OK: cube memory cleared on {}", link.port);
    }
    Ok(())
}

fn open_session(link: &LinkArgs) -> Result<Session, CliError> {
    Session::open(&link.port, &link.config()).map_err(|err| {
        let hint = match &err {
            LinkError::Serial(_) | LinkError::Io(_) => {
                Some("run `cubesync ports` to list available ports".to_string())
            }
            _ => None,
        };
        CliError::new(format!("failed to open {}: {err}", link.port), hint)
    })
}

fn serialize_document(doc: &AnimationDocument, pretty: bool) -> Result<String, CliError> {
    if pretty {
        serde_json::to_string_pretty(doc)
            .context("JSON serialization failed")
            .map_err(Into::into)
    } else {
        serde_json::to_string(doc)
            .context("JSON serialization failed")
            .map_err(Into::into)
    }
}

fn validate_input_file(input: &Path) -> Result<(), CliError> {
    if !input.exists() {
        return Err(CliError::new(
            format!("input file not found: {}", input.display()),
            Some("use a .json document".to_string()),
        ));
    }
    if !input.is_file() {
        return Err(CliError::new(
            format!("input is not a file: {}", input.display()),
            Some("use a .json document".to_string()),
        ));
    }
    let ext = input
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if ext != "json" {
        return Err(CliError::new(
            format!("unsupported input format '{}'", input.display()),
            Some("expected a .json document".to_string()),
        ));
    }
    Ok(())
}

fn resolve_input_path(input: &Path) -> Result<PathBuf, CliError> {
    let pattern = input.to_string_lossy();
    if !is_glob_pattern(&pattern) {
        return Ok(input.to_path_buf());
    }

    let mut matches = Vec::new();
    let paths = glob(&pattern).map_err(|err| {
        CliError::new(
            format!("invalid input pattern '{}'", pattern),
            Some(format!("pattern error: {}", err.msg)),
        )
    })?;
    for entry in paths {
        let path = entry.map_err(|err| {
            CliError::new(
                format!("invalid input pattern '{}'", pattern),
                Some(format!("pattern error: {}", err)),
            )
        })?;
        if path.is_file() {
            matches.push(path);
        }
    }

    if matches.len() > 1 {
        let listed = matches
            .iter()
            .take(3)
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let more = if matches.len() > 3 { ", ..." } else { "" };
        return Err(CliError::new(
            format!(
                "multiple files match pattern '{}' ({} matches); matches: {}{}",
                pattern,
                matches.len(),
                listed,
                more
            ),
            Some("pass a single document, or run once per file".to_string()),
        ));
    }

    matches.pop().ok_or_else(|| {
        CliError::new(
            format!("no files match pattern '{}'", pattern),
            Some("check the path or quote the pattern; expected a .json document".to_string()),
        )
    })
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains('*') || input.contains('?') || input.contains('[')
}
