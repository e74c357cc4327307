//! sessionlight: one status light shared by every running work session.
//!
//! Hook usage: `sessionlight <MODE> [SESSION_ID]`. Everything else is a
//! subcommand (`status`, `devices`, `config`, `test`, `off`).

use std::path::{Path, PathBuf};

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use sessionlight_lib::ModeTag;
use sessionlight_lib::config::Config;

mod cli;

#[derive(Parser)]
#[command(
    name = "sessionlight",
    version,
    about = "Shared status light for concurrent work sessions",
    arg_required_else_help = true
)]
struct Args {
    /// Mode reported by this session (working, ready, question)
    mode: Option<ModeTag>,

    /// Session identifier [default: $SESSIONLIGHT_SESSION_ID, then session-<parent pid>]
    session_id: Option<String>,

    /// Config file [default: <config dir>/sessionlight/config.toml]
    #[arg(long, global = true, env = "SESSIONLIGHT_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output as JSON (for report, status, devices, config)
    #[arg(long, global = true)]
    json: bool,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<cli::Command>,
}

/// Hook invocations log to a file in the state directory, everything else to
/// stderr.
fn init_logger(background: bool, verbose: bool, config_path: Option<&Path>) {
    let default_filter = match (verbose, background) {
        (true, _) => "debug",
        (false, true) => "info",
        (false, false) => "warn",
    };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter));
    builder.format_target(false);

    if !background {
        builder.format_timestamp(None).init();
        return;
    }

    let log_path = config_path
        .and_then(|p| Config::load_from(p).ok())
        .unwrap_or_default()
        .log_path();
    if let Some(dir) = log_path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    if let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
}

fn main() {
    let args = Args::parse();

    let ctx = cli::Context {
        config_path: args.config.or_else(Config::path),
        json: args.json,
    };

    let background = match &args.command {
        None => true,
        Some(cmd) => cmd.is_background(),
    };
    init_logger(background, args.verbose, ctx.config_path.as_deref());

    let result = match (args.command, args.mode) {
        (Some(cmd), _) => cli::run(cmd, &ctx),
        (None, Some(mode)) => cli::run_mode(mode, args.session_id, &ctx),
        (None, None) => Args::command()
            .error(ErrorKind::MissingRequiredArgument, "a MODE or a subcommand is required")
            .exit(),
    };

    if let Err(e) = result {
        log::error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
