//! nodemaint - node-local maintenance request scheduler
//!
//! Meant to be run periodically (`nodemaint cycle` from cron or a timer) and
//! by operators or agents queueing work (`nodemaint add`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nodemaint_core::NodeMaintConfig;

mod commands;

/// nodemaint - node-local maintenance request scheduler
#[derive(Parser, Debug)]
#[command(name = "nodemaint")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (default: $NODEMAINT_CONFIG, then /etc/nodemaint/nodemaint.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile with the directory, run what is runnable, postpone, archive
    Cycle,

    /// Queue a request (or update the one with the same comment)
    Add {
        /// Expected duration in seconds
        #[arg(long)]
        estimate: i64,

        /// Human description; requests are de-duplicated on it
        #[arg(long)]
        comment: String,

        /// Shell command to run
        #[arg(long)]
        script: Option<String>,

        /// Shell command deciding whether the script applies (0 yes, 1 no)
        #[arg(long)]
        applicable: Option<String>,

        /// Correlation id (random if omitted)
        #[arg(long)]
        uuid: Option<String>,
    },

    /// List requests
    #[command(alias = "ls")]
    List {
        /// List archived requests instead of active ones
        #[arg(long)]
        archive: bool,
    },

    /// Print one request as JSON
    Show {
        /// Request ID
        reqid: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries command output; logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "warn,nodemaint=info,nodemaint_scheduler=info,nodemaint_hooks=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // explicit path > NODEMAINT_CONFIG env > /etc/nodemaint/nodemaint.toml
    let config_path = cli.config.or_else(|| std::env::var("NODEMAINT_CONFIG").ok());
    let config = NodeMaintConfig::load(config_path.as_deref())
        .with_context(|| "failed to load configuration")?;

    let mut scheduler = commands::open_scheduler(&config)?;
    let result = match cli.command {
        Commands::Cycle => commands::cycle(&mut scheduler).await,
        Commands::Add {
            estimate,
            comment,
            script,
            applicable,
            uuid,
        } => commands::add(&mut scheduler, estimate, comment, script, applicable, uuid),
        Commands::List { archive } => commands::list(&mut scheduler, archive),
        Commands::Show { reqid } => commands::show(&mut scheduler, reqid),
    };
    scheduler.close();
    result
}
