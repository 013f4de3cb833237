use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use dbgscout_core::prelude::*;
use dbgscout_utils::{debug, info, init_logging, init_logging_to_dir, warn, LogLevel};

/// Inspect the modules, build ids, and debug files of ELF images and core dumps.
#[derive(Parser, Debug)]
#[command(name = "dbgscout")]
#[command(version)]
#[command(about = "Inspect the modules, build ids, and debug files of ELF images and core dumps", long_about = None)]
struct Cli
{
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    search: SearchArgs,

    /// Write logs to a dated file in this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
}

#[derive(Args, Debug)]
struct SearchArgs
{
    /// Resolver strategy: build-id, literal, or offline
    #[arg(long, global = true)]
    strategy: Option<Strategy>,

    /// Root holding a .build-id index (repeatable, tried in order)
    #[arg(long = "build-id-root", global = true)]
    build_id_roots: Vec<PathBuf>,

    /// Colon-separated debuginfo search path
    #[arg(long, global = true)]
    debuginfo_path: Option<String>,

    /// Search only this root for debug files
    #[arg(long, global = true)]
    sysroot: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Discover and resolve the modules of a core dump
    Core
    {
        /// Path to the core file
        file: PathBuf,
        /// Attach the core's memory so images missing on disk are rebuilt from it
        #[arg(long, default_value_t = false)]
        attach: bool,
    },
    /// Resolve standalone image files, one module each
    Offline
    {
        /// Paths to the image files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main()
{
    let cli = Cli::parse();

    let logging = match &cli.log_dir {
        Some(dir) => init_logging_to_dir(dir, cli.log_level).map(|_| ()),
        None => init_logging(cli.log_level),
    };
    if let Err(e) = logging {
        eprintln!("Failed to initialize logging: {e}");
        process::exit(1);
    }

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn search_config(args: SearchArgs) -> SearchConfig
{
    let mut config = SearchConfig::from_env();
    if let Some(strategy) = args.strategy {
        config = config.with_strategy(strategy);
    }
    if !args.build_id_roots.is_empty() {
        config = config.with_build_id_roots(args.build_id_roots);
    }
    if let Some(path) = args.debuginfo_path {
        config = config.with_debuginfo_path(path);
    }
    if let Some(root) = args.sysroot {
        config = config.with_override_root(root);
    }
    config
}

fn run_command(cli: Cli) -> Result<()>
{
    let config = Arc::new(search_config(cli.search));
    debug!(?config, "search configuration");
    let mut session = Session::new(config);

    match cli.command {
        Commands::Core { file, attach } => {
            info!("Reading core file {}", file.display());
            let reported = session.report_core(Container::open(&file)?)?;
            debug!(reported, "core candidates");
            session.end()?;
            if attach {
                session.attach_core()?;
            }
        }
        Commands::Offline { files } => {
            for file in files {
                // One unreadable file does not stop the others.
                if let Err(e) = session.report_offline(&file) {
                    warn!("Skipping {}: {e}", file.display());
                }
            }
            session.end()?;
        }
    }

    let resolved = session.resolve_all()?;
    let summaries = session.summaries()?;
    info!(modules = summaries.len(), resolved, "resolution finished");
    print!("{}", render(&summaries));
    Ok(())
}

/// Module summaries as printed, one block per module.
fn render(summaries: &[ModuleSummary]) -> String
{
    summaries.iter().map(ToString::to_string).collect()
}
