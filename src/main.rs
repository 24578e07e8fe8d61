use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use preview_app::config::AppConfig;
use preview_app::deploy::{PreviewController, SystemRunner};
use preview_app::github::GitHubClient;
use preview_app::server::{build_router, AppState};

#[derive(Parser)]
#[command(name = "preview-app")]
#[command(about = "Deploy a preview environment for every open pull request")]
struct Cli {
    /// Address to listen on (overrides SERVER_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides SERVER_PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "preview_app=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    info!("Starting preview app");

    let mut config = AppConfig::load()?;
    if let Some(host) = cli.host {
        config.server_host = host;
    }
    if let Some(port) = cli.port {
        config.server_port = port;
    }
    info!(
        workspace_root = %config.workspace_root.display(),
        deployment_url = %config.deployment_url,
        "Configuration loaded"
    );
    let config = Arc::new(config);

    let github = Arc::new(GitHubClient::from_config(&config)?);
    let runner = Arc::new(SystemRunner::new(config.command_timeout));
    let controller = PreviewController::new(Arc::clone(&config), github, runner);

    let app = build_router(AppState::new(Arc::clone(&config), controller));

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
