mod cmd;
mod output;
mod paths;
mod root;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "conveyor",
    about = "Multi-stage agent workflow orchestrator — push tasks through gated production stages",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .conveyor/ or .git/)
    #[arg(long, global = true, env = "CONVEYOR_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log at INFO instead of WARN
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize conveyor in the current project
    Init,

    /// Start a new workflow run and execute it until it completes or suspends
    Start {
        /// The task the pipeline will work on
        task: String,

        /// Run-configuration file (default: .conveyor/config.yaml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the configured rigidity
        #[arg(long)]
        rigidity: Option<f64>,

        /// Override the configured worker
        #[arg(long)]
        worker: Option<String>,
    },

    /// Advance a run by exactly one stage attempt
    Step { thread_id: String },

    /// Apply a human decision to a suspended run
    Resume(cmd::resume::ResumeArgs),

    /// Cancel a run at the next stage boundary
    Cancel { thread_id: String },

    /// Show one run
    Status { thread_id: String },

    /// List all stored runs
    List,

    /// Remove a terminal run from the store
    Archive { thread_id: String },

    /// List declared tool capabilities
    Capabilities,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, cli.json),
        Commands::Start {
            task,
            config,
            rigidity,
            worker,
        } => cmd::start::run(
            &root,
            &task,
            config.as_deref(),
            rigidity,
            worker.as_deref(),
            cli.json,
        ),
        Commands::Step { thread_id } => cmd::step::run(&root, &thread_id, cli.json),
        Commands::Resume(args) => cmd::resume::run(&root, args, cli.json),
        Commands::Cancel { thread_id } => cmd::cancel::run(&root, &thread_id, cli.json),
        Commands::Status { thread_id } => cmd::status::run(&root, &thread_id, cli.json),
        Commands::List => cmd::list::run(&root, cli.json),
        Commands::Archive { thread_id } => cmd::archive::run(&root, &thread_id, cli.json),
        Commands::Capabilities => cmd::capabilities::run(cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
