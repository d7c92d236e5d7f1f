//! api-assembler
//!
//! Serves an application assembled from an OpenAPI document.
//!
//! ```text
//! service.toml ──▶ config ──▶ assembler ──▶ http server
//!                              │
//!                 openapi.yaml ┘
//! ```
//!
//! Operations without registered handlers answer 501, so the binary is
//! mostly useful for validating a document and trying out its contract.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use api_assembler::config::loader::load_config;
use api_assembler::lifecycle::assemble;
use api_assembler::observability::init_tracing;
use api_assembler::HttpServer;

#[derive(Parser)]
#[command(name = "api-assembler")]
#[command(about = "Serve an application assembled from an OpenAPI document", long_about = None)]
struct Cli {
    /// Service configuration (TOML).
    #[arg(short, long)]
    config: PathBuf,

    /// Schema document, overriding `definition_path` from the config.
    #[arg(short, long)]
    definition: Option<PathBuf>,

    /// Assemble the application and exit without serving.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(definition) = cli.definition {
        config.definition_path = definition;
    }

    init_tracing(&config.observability)?;
    tracing::info!("api-assembler v{} starting", env!("CARGO_PKG_VERSION"));

    let app = assemble(&config)?;
    if cli.check {
        tracing::info!(stages = app.stages().len(), "Application assembled, exiting");
        return Ok(());
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    HttpServer::new(app, config.listener.clone()).run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
