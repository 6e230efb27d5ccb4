//! Command-line interface for proto-fixtures
//!
//! # Usage Examples
//!
//! ```bash
//! # Inspect a descriptor set
//! proto-fixtures describe --descriptor-file test_descriptors.desc
//!
//! # Publish fixtures to Kafka (environment variables work too)
//! KAFKA_BROKERS=kafka:29092 DESCRIPTOR_FILE=/descriptors/test_descriptors.desc \
//!   proto-fixtures produce --interval 30s --burst-spacing 1s
//! ```

use clap::{Parser, Subcommand};
use proto_fixtures::{ProduceArgs, SchemaArgs};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "proto-fixtures")]
#[command(about = "Publishes protobuf test fixtures built from a descriptor set to Kafka")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print resolved files, their message types, and unresolved files
    Describe {
        #[command(flatten)]
        args: SchemaArgs,
    },

    /// Publish the sample corpus once, then a representative per topic on every interval
    Produce {
        #[command(flatten)]
        args: ProduceArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Describe { args } => {
            print!("{}", proto_fixtures::describe(&args)?);
        }
        Commands::Produce { args } => {
            // Runs until the process is terminated
            let summary = proto_fixtures::run_produce(&args, CancellationToken::new()).await?;
            tracing::info!("Publishing finished: {:?}", summary);
        }
    }

    Ok(())
}
