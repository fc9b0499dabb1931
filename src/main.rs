//! Purpose: `cordis` CLI, a small embedding host for checking manifests and paths.
//! Role: Binary crate root; parses args, runs one command, emits JSON on stdout.
//! Invariants: Errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
use std::fs::File;
use std::os::unix::fs::FileTypeExt;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use cordis::api::{
    Broker, DirKind, Directories, Error, InitFlags, ManifestShape, ManifestSource, OPEN_FS,
    OPEN_INTERFACE, OpenFlags, Registry, SystemDirectories, to_exit_code, to_status_code,
};

#[derive(Parser)]
#[command(
    name = "cordis",
    version,
    about = "Inspect cordis manifests and resolve paths the way embedding hosts do",
    long_about = None,
    arg_required_else_help = true
)]
struct Cli {
    /// Log broker activity to stderr (filter with CORDIS_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a manifest and list its interfaces and launch entries.
    Check {
        manifest: PathBuf,
        /// The file is the `libcordis` section itself.
        #[arg(long)]
        bare: bool,
    },
    /// Print the well-known directories.
    Paths,
    /// Initialize from a manifest and resolve one path.
    Open {
        manifest: PathBuf,
        path: PathBuf,
        #[arg(long)]
        write: bool,
        #[arg(long, value_enum, default_value_t = KindArg::Any)]
        kind: KindArg,
        #[arg(long)]
        bare: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Any,
    Interface,
    Fs,
}

fn main() {
    let cli = Cli::parse();
    if cli.verbose {
        init_tracing();
    }
    let exit_code = match run(cli.command) {
        Ok(value) => {
            println!("{value}");
            0
        }
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run(command: Command) -> Result<Value, Error> {
    match command {
        Command::Check { manifest, bare } => {
            let dirs = SystemDirectories::new();
            let registry = Registry::load(init_flags(bare), manifest.as_os_str(), &dirs)?;
            Ok(registry_json(&registry))
        }
        Command::Paths => {
            let dirs = SystemDirectories::new();
            let mut out = serde_json::Map::new();
            for kind in DirKind::ALL {
                let path = dirs.get(kind);
                out.insert(kind.label().to_string(), json!(path.to_string_lossy()));
            }
            Ok(Value::Object(out))
        }
        Command::Open {
            manifest,
            path,
            write,
            kind,
            bare,
        } => {
            let broker = Broker::new();
            broker.initialize(init_flags(bare), &manifest)?;
            let mut flags = match kind {
                KindArg::Any => OpenFlags::READ,
                KindArg::Interface => OpenFlags::READ.with_kind(OPEN_INTERFACE),
                KindArg::Fs => OpenFlags::READ.with_kind(OPEN_FS),
            };
            if write {
                flags = flags.with_write();
            }
            let fd = broker.resolve(&path, flags)?;
            let file = File::from(fd);
            let file_type = file.metadata().map_err(Error::from_io)?.file_type();
            let described = if file_type.is_socket() {
                "socket"
            } else if file_type.is_file() {
                "file"
            } else {
                "other"
            };
            Ok(json!({
                "path": path.to_string_lossy(),
                "kind": described,
                "write": flags.write(),
            }))
        }
    }
}

fn init_flags(bare: bool) -> InitFlags {
    let shape = if bare {
        ManifestShape::Bare
    } else {
        ManifestShape::Namespaced
    };
    InitFlags::new(ManifestSource::File, shape)
}

fn registry_json(registry: &Registry) -> Value {
    let mut services: Vec<_> = registry.services().collect();
    services.sort_by(|a, b| a.name.cmp(&b.name));
    let interfaces: Vec<Value> = services
        .into_iter()
        .map(|service| {
            json!({
                "name": service.name,
                "library": registry.library_path(service).to_string_lossy(),
                "interface": service.interface,
                "no_unload": service.pinned,
            })
        })
        .collect();
    let launch: Vec<Value> = registry
        .launches()
        .map(|entry| json!({ "name": entry.name, "run": entry.run }))
        .collect();
    json!({
        "interfaces_dir": registry.interfaces_dir().to_string_lossy(),
        "interfaces": interfaces,
        "launch": launch,
    })
}

fn error_json(err: &Error) -> Value {
    let mut inner = serde_json::Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("status".to_string(), json!(to_status_code(err)));
    if let Some(message) = err.message() {
        inner.insert("message".to_string(), json!(message));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.to_string_lossy()));
    }
    if let Some(errno) = err.errno() {
        inner.insert("errno".to_string(), json!(errno));
    }
    json!({ "error": Value::Object(inner) })
}

fn emit_error(err: &Error) {
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Os\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_env("CORDIS_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
