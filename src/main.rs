use clap::{Arg, Command};
use sable::evaluator::{Evaluator, DEFAULT_MAX_CALL_DEPTH};
use sable::{repl, runner, RunOptions};
use std::fs;
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    let matches = Command::new("sable")
        .about("Interpreter for the Sable scripting language")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("file")
                .help("The script file to execute")
                .value_name("FILE")
                .index(1),
        )
        .arg(
            Arg::new("interactive")
                .short('i')
                .long("interactive")
                .help("Start in interactive REPL mode")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("tokens")
                .long("tokens")
                .help("Print the token stream before running")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("ast")
                .long("ast")
                .help("Print the syntax tree before running")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("max-call-depth")
                .long("max-call-depth")
                .value_name("N")
                .help("Maximum nesting of function calls")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log interpreter stages to stderr")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    init_tracing(matches.get_flag("verbose"));

    let max_call_depth = matches
        .get_one::<usize>("max-call-depth")
        .copied()
        .unwrap_or(DEFAULT_MAX_CALL_DEPTH);
    let options = RunOptions {
        dump_tokens: matches.get_flag("tokens"),
        dump_ast: matches.get_flag("ast"),
    };

    match matches.get_one::<String>("file") {
        Some(file_path) if !matches.get_flag("interactive") => {
            run_file(file_path, options, max_call_depth)
        }
        _ => {
            repl::start(max_call_depth);
            ExitCode::SUCCESS
        }
    }
}

/// Installs a stderr subscriber when `RUST_LOG` is set or `--verbose` is given.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) if verbose => EnvFilter::new("sable=debug"),
        Err(_) => return,
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .with(filter)
        .init();
}

fn run_file(path: &str, options: RunOptions, max_call_depth: usize) -> ExitCode {
    let path = Path::new(path);

    if !path.exists() {
        eprintln!("Error: File '{}' not found", path.display());
        return ExitCode::FAILURE;
    }

    match fs::read_to_string(path) {
        Ok(source) => {
            let mut evaluator = Evaluator::new().with_max_call_depth(max_call_depth);
            let filename = path.to_string_lossy();
            if runner::run_with(&source, Some(&*filename), options, &mut evaluator) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("Error reading file '{}': {}", path.display(), e);
            ExitCode::FAILURE
        }
    }
}
