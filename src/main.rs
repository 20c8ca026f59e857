//! Command-line driver.
//!
//! Usage: `hobby [OPTIONS] <FILE> [ARGS]...`

use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use hobby::diagnostic::{Diagnostic, ansi::AnsiRenderer, json};
use hobby::{Config, InterpretError, Interpreter};

const EXIT_COMPILE: u8 = 65;
const EXIT_NO_INPUT: u8 = 66;
const EXIT_RUNTIME: u8 = 70;

#[derive(Parser, Debug)]
#[command(name = "hobby", version)]
#[command(about = "Run a hobby script")]
struct Args {
    /// Script to run
    file: PathBuf,

    /// Arguments exposed to the script as the global `args`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    /// Print the bytecode listing instead of running
    #[arg(long)]
    dump: bool,

    /// Render errors as one JSON object per line
    #[arg(long)]
    json: bool,

    /// JSON file with interpreter settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Collect garbage before every allocation
    #[arg(long)]
    gc_stress: bool,

    /// Override the call-depth limit
    #[arg(long)]
    max_frames: Option<usize>,

    /// Start without the prelude and built-in methods
    #[arg(long)]
    no_stdlib: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

fn load_config(args: &Args) -> Result<Config, String> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|e| format!("cannot read config '{}': {e}", path.display()))?;
            Config::from_json(&text).map_err(|e| format!("{}: {e}", path.display()))?
        }
        None => Config::default(),
    };
    if args.gc_stress {
        config.gc_stress = true;
    }
    if let Some(n) = args.max_frames {
        config.max_frames = n;
    }
    if args.no_stdlib {
        config.stdlib = false;
    }
    config.print_errors = false;
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn report(diagnostic: Diagnostic, as_json: bool) {
    if as_json {
        eprintln!("{}", json::render(&diagnostic));
    } else {
        let renderer = AnsiRenderer { use_color: std::io::stderr().is_terminal() };
        eprint!("{}", renderer.render(&diagnostic));
    }
}

fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_NO_INPUT);
        }
    };

    let source = match fs::read_to_string(&args.file) {
        Ok(s) => s,
        Err(e) => {
            error!("cannot read '{}': {e}", args.file.display());
            return ExitCode::from(EXIT_NO_INPUT);
        }
    };
    let path = args.file.display().to_string();

    let mut vm = Interpreter::new(config);
    vm.set_args(&args.args);

    let result = if args.dump {
        vm.disassemble(&path, &source).map(|listing| print!("{listing}"))
    } else {
        vm.interpret(&path, &source).map(|_| ())
    };
    debug!(bytes = vm.bytes_allocated(), collections = vm.collections(), "finished");

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(InterpretError::Compile(errors)) => {
            for e in &errors.0 {
                report(Diagnostic::from(e).with_source(source.as_str()), args.json);
            }
            ExitCode::from(EXIT_COMPILE)
        }
        Err(InterpretError::Runtime(e)) => {
            report(Diagnostic::from(&e), args.json);
            ExitCode::from(EXIT_RUNTIME)
        }
    }
}
