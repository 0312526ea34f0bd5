//! scenebake CLI - compile scene descriptions and inspect compiled scenes.

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use scenebake::{CompileOptions, Stats};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Verbosity picked on the command line.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Verbosity {
    Quiet,
    Info,
    Debug,
    Trace,
}

impl Verbosity {
    fn directive(self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Info => "info",
            Verbosity::Debug => "debug",
            Verbosity::Trace => "trace",
        }
    }
}

#[cfg(feature = "trace")]
type TraceGuard = Option<tracing_chrome::FlushGuard>;
#[cfg(not(feature = "trace"))]
type TraceGuard = ();

/// Install the fmt subscriber. `SCENEBAKE_LOG` is used unless a flag asked
/// for a specific level. With the `trace` feature and `SCENEBAKE_TRACE=1`, a
/// Chrome trace is written to `trace.json`.
fn init_tracing(verbosity: Option<Verbosity>) -> TraceGuard {
    let filter = match verbosity {
        Some(v) => EnvFilter::new(v.directive()),
        None => EnvFilter::try_from_env("SCENEBAKE_LOG")
            .unwrap_or_else(|_| EnvFilter::new(Verbosity::Info.directive())),
    };
    let fmt = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    #[cfg(feature = "trace")]
    let (chrome_layer, guard) = if env::var("SCENEBAKE_TRACE").ok().as_deref() == Some("1") {
        let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
            .file("trace.json")
            .build();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };
    #[cfg(not(feature = "trace"))]
    let (chrome_layer, guard) = (None::<tracing_subscriber::layer::Identity>, ());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt)
        .with(chrome_layer)
        .try_init();
    guard
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut verbosity = None;
    let mut config: Option<PathBuf> = None;
    let mut filtered_args: Vec<&str> = Vec::new();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-v" | "--verbose" => verbosity = Some(Verbosity::Debug),
            "-vv" | "--trace" => verbosity = Some(Verbosity::Trace),
            "-q" | "--quiet" => verbosity = Some(Verbosity::Quiet),
            "-c" | "--config" => match iter.next() {
                Some(path) => config = Some(PathBuf::from(path)),
                None => {
                    eprintln!("Error: --config needs a file argument");
                    return ExitCode::FAILURE;
                }
            },
            _ => filtered_args.push(arg),
        }
    }

    let _guard = init_tracing(verbosity);

    if filtered_args.is_empty() {
        print_help();
        return ExitCode::SUCCESS;
    }

    match filtered_args[0] {
        // Compile a JSON description into a container
        "compile" | "c" => {
            let Some(&input) = filtered_args.get(1) else {
                eprintln!("Error: missing input argument");
                eprintln!("Usage: scenebake compile <scene.json> [output.bin]");
                return ExitCode::FAILURE;
            };
            let output = filtered_args
                .get(2)
                .map(PathBuf::from)
                .unwrap_or_else(|| Path::new(input).with_extension("bin"));
            cmd_compile(Path::new(input), &output, config.as_deref())
        }

        // Info command - statistics for a description or a container
        "info" | "i" => {
            let Some(&file) = filtered_args.get(1) else {
                eprintln!("Error: missing file argument");
                eprintln!("Usage: scenebake info <scene.json|scene.bin>");
                return ExitCode::FAILURE;
            };
            cmd_info(Path::new(file))
        }

        "version" | "-V" | "--version" => {
            println!(
                "scenebake {} ({})",
                env!("CARGO_PKG_VERSION"),
                env!("SCENEBAKE_BUILD_DATE")
            );
            ExitCode::SUCCESS
        }

        // Help
        "help" | "h" | "-h" | "--help" => {
            print_help();
            ExitCode::SUCCESS
        }

        // Default: if file exists, show info; otherwise error
        other => {
            if Path::new(other).exists() {
                cmd_info(Path::new(other))
            } else {
                eprintln!("Unknown command: {}", other);
                eprintln!();
                print_help();
                ExitCode::FAILURE
            }
        }
    }
}

fn print_help() {
    println!("scenebake - path tracer scene compiler");
    println!();
    println!("USAGE:");
    println!("    scenebake [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    c, compile <scene.json> [out.bin]   Compile a scene description");
    println!("    i, info    <file>                   Show statistics (.json or compiled)");
    println!("    version                             Show version and build date");
    println!("    h, help                             Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <file>   Compile options (JSON)");
    println!("    -v, --verbose         Debug output");
    println!("    -vv, --trace          Trace output");
    println!("    -q, --quiet           Errors only");
    println!();
    println!("ENVIRONMENT:");
    println!("    SCENEBAKE_LOG         Log filter when no flag is given (e.g. scenebake=debug)");
    println!("    SCENEBAKE_TRACE=1     Write trace.json (requires the `trace` feature)");
}

fn cmd_compile(input: &Path, output: &Path, config: Option<&Path>) -> ExitCode {
    let options = match config {
        Some(path) => match CompileOptions::load(path) {
            Ok(o) => o,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => CompileOptions::default(),
    };

    match scenebake::compile_file(input, output, &options) {
        Ok(stats) => {
            println!("{}", stats);
            println!("Wrote {}", output.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_info(path: &Path) -> ExitCode {
    match scenebake::scene_stats(path) {
        Ok(stats) => {
            if let Stats::Compiled(_) = stats {
                println!("File: {}", path.display());
            }
            println!("{}", stats);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
