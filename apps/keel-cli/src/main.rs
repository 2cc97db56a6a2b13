use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

use commands::{AdminCmd, ConnArgs, ContractCmd, StatusArgs};

#[derive(Parser)]
#[command(name = "keel", version, about = "keel API command-line frontend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether the API answers (exit code 1 when disconnected)
    Status(StatusArgs),
    /// Call hello.get and print the greeting
    Hello(ConnArgs),
    /// Admin dashboard helpers
    Admin {
        #[command(subcommand)]
        cmd: AdminCmd,
    },
    /// Contract helpers
    Contract {
        #[command(subcommand)]
        cmd: ContractCmd,
    },
}

#[tokio::main]
async fn main() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Status(args) => match commands::status::run_status(&args).await {
            Ok(true) => Ok(()),
            Ok(false) => std::process::exit(1),
            Err(err) => Err(err),
        },
        Commands::Hello(conn) => commands::status::run_hello(&conn).await,
        Commands::Admin { cmd } => commands::admin::execute(cmd).await,
        Commands::Contract { cmd } => commands::contract::execute(cmd),
    };
    if let Err(err) = result {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}
