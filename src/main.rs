use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use ratecast::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Clone)]
struct QueryArgs {
    /// Comma separated currency codes, e.g. EUR,USD
    #[arg(long)]
    currencies: Option<String>,

    /// Number of days to look back (at most 10)
    #[arg(long)]
    days: Option<u32>,
}

impl From<QueryArgs> for ratecast::QueryOverrides {
    fn from(args: QueryArgs) -> Self {
        ratecast::QueryOverrides {
            currencies: args.currencies,
            days: args.days,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Run the WebSocket broadcast server
    Serve {
        /// Listen host
        #[arg(long)]
        host: Option<String>,
        /// Listen port
        #[arg(long)]
        port: Option<u16>,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Fetch and display exchange rates once
    Rates {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Send a message to a running server
    Send {
        /// Message to send, e.g. "exchange"
        message: String,
        /// Server URL, defaults to the configured listen address
        #[arg(long)]
        url: Option<String>,
    },
}

impl From<Commands> for ratecast::AppCommand {
    fn from(cmd: Commands) -> ratecast::AppCommand {
        match cmd {
            Commands::Serve { host, port, query } => ratecast::AppCommand::Serve {
                host,
                port,
                query: query.into(),
            },
            Commands::Rates { query } => ratecast::AppCommand::Rates(query.into()),
            Commands::Send { message, url } => ratecast::AppCommand::Send { url, message },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => ratecast::cli::setup::setup(),
        Some(cmd) => ratecast::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
