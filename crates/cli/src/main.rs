//! CarePlan CLI: the main entry point.
//!
//! Commands:
//! - `plan`      Generate a treatment plan for one patient
//! - `patients`  Look up patient records
//! - `stats`     Dataset statistics
//! - `index`     Build and persist the retrieval indexes
//! - `query`     Search a corpus and print the retrieved context
//! - `onboard`   Write a default config file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

use commands::patients::PatientArgs;
use commands::plan::ReportFormat;
use commands::query::CorpusArg;

#[derive(Parser)]
#[command(
    name = "careplan",
    about = "CarePlan: grounded, multi-stage obesity treatment planning",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.careplan/config.toml)
    #[arg(short, long, global = true, env = "CAREPLAN_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a treatment plan for a dataset or manually described patient
    Plan {
        #[command(flatten)]
        patient: PatientArgs,

        /// Also write the report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,

        /// Append every specialist stage to the report
        #[arg(long)]
        show_stages: bool,

        /// Run the specialist stages one after another
        #[arg(long)]
        sequential: bool,
    },

    /// Show patient records (random, by index, or by criteria)
    Patients {
        #[command(flatten)]
        patient: PatientArgs,

        /// How many matching records to show when filtering
        #[arg(short, long, default_value_t = 1)]
        limit: usize,

        /// Print JSON instead of a field list
        #[arg(long)]
        json: bool,
    },

    /// Show dataset statistics
    Stats {
        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Build and persist both retrieval indexes
    Index {
        /// Rebuild even when a compatible index exists
        #[arg(long)]
        rebuild: bool,
    },

    /// Retrieve context from a corpus
    Query {
        /// Natural-language query
        text: String,

        /// Corpus to search
        #[arg(long, value_enum, default_value_t = CorpusArg::Medical)]
        corpus: CorpusArg,

        /// Number of hits (defaults to retrieval.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Initialize configuration
    Onboard,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Onboard = cli.command {
        return commands::onboard::run().await;
    }

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Plan {
            patient,
            output,
            format,
            show_stages,
            sequential,
        } => {
            let options = commands::plan::PlanOptions {
                output,
                format,
                show_stages,
                sequential,
            };
            commands::plan::run(config, patient, options).await?
        }
        Commands::Patients { patient, limit, json } => commands::patients::run(config, patient, limit, json).await?,
        Commands::Stats { json } => commands::stats::run(config, json).await?,
        Commands::Index { rebuild } => commands::index::run(config, rebuild).await?,
        Commands::Query { text, corpus, top_k } => commands::query::run(config, text, corpus, top_k).await?,
        Commands::Onboard => {}
    }

    Ok(())
}
