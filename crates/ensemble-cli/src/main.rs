mod config;

use clap::{Parser, Subcommand};
use config::AppConfig;
use ensemble_core::CollaborationMode;
use ensemble_gateway::GatewayServer;
use ensemble_orchestrator::{JsonSnapshotStore, Orchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ensemble", about = "Ensemble: multi-agent task routing and collaboration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "ensemble.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Submit one task and print the result as JSON
    Ask {
        prompt: String,
        #[arg(long)]
        context: Option<String>,
        /// Collaboration mode, e.g. `parallel` or `devils-advocate`
        #[arg(short, long)]
        mode: Option<CollaborationMode>,
    },
    /// List configured agents with their current scores
    Agents,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config).await.inspect_err(|e| {
        error!(error = %e, "Startup failed");
    })?;

    let mut orchestrator = Orchestrator::from_config(config.ensemble)?;
    if config.persist {
        let store = JsonSnapshotStore::new(config.data_dir.clone());
        orchestrator = orchestrator.with_persistence(store);
        match orchestrator.restore().await {
            Ok(restored) => info!(restored, "Performance scores restored"),
            Err(e) => warn!(error = %e, "Ignoring unreadable performance snapshot"),
        }
    }
    let orchestrator = Arc::new(orchestrator);

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or(config.server.host);
            let port = port.unwrap_or(config.server.port);

            orchestrator.start_health_monitor()?;
            let app = GatewayServer::build_with_config(orchestrator.clone(), config.gateway);

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!(%addr, "Ensemble gateway listening");

            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!(error = %e, "Failed to listen for shutdown signal");
                    }
                    info!("Shutdown signal received");
                })
                .await?;
        }
        Commands::Ask {
            prompt,
            context,
            mode,
        } => {
            let result = orchestrator.submit(&prompt, context.as_deref(), mode).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Agents => {
            let snapshot = orchestrator.snapshot();
            println!("Configured agents:");
            for agent in &snapshot.agents {
                println!(
                    "  {} [{}] health={} mean_score={:.3}",
                    agent.id,
                    agent.capabilities.join(", "),
                    agent.health,
                    agent.mean_score
                );
            }
            println!("\nTotal: {} agent(s)", snapshot.agents.len());
        }
    }

    orchestrator.shutdown().await?;
    Ok(())
}
