use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use semaforo::catalog::QuestionCatalog;

use crate::error::AppError;
use crate::server;

#[derive(Parser, Debug)]
#[command(
    name = "Semaforo Risk Engine",
    about = "Run the risk evaluation and deliberation service from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Inspect and validate question catalog files
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
}

#[derive(Subcommand, Debug)]
enum CatalogCommand {
    /// Validate a catalog JSON file without activating it
    Validate(CatalogValidateArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct CatalogValidateArgs {
    /// Path to the catalog JSON file
    file: PathBuf,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Catalog {
            command: CatalogCommand::Validate(args),
        } => validate_catalog(args),
    }
}

fn validate_catalog(args: CatalogValidateArgs) -> Result<(), AppError> {
    let raw = std::fs::read_to_string(&args.file)?;
    let catalog = QuestionCatalog::from_json(&raw)?;
    println!(
        "catalog '{}' is valid: {} questions across {} layers",
        catalog.version,
        catalog.questions.len(),
        catalog.weights.layer_weights.len()
    );
    Ok(())
}
