mod challenge;
mod config;
mod errors;
mod intake;
mod llm_client;
mod provisioning;
mod routes;
mod state;
#[cfg(test)]
mod testing;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::challenge::pipeline::ChallengePipeline;
use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::provisioning::git::GitCli;
use crate::provisioning::github::GithubClient;
use crate::provisioning::{ProvisionSettings, RepositoryProvisioner};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Challenge API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize completion client
    let llm = LlmClient::new(&config.completion)?;
    info!("Completion client initialized (model: {})", llm.model());

    // Initialize repository provisioning
    let github = GithubClient::new(&config.github)?;
    let settings = ProvisionSettings::from_config(&config.github);
    info!(
        "Provisioning into {} on branch '{}' (explicit identity: {})",
        config.github.api_url,
        settings.branch,
        settings.identity.is_some()
    );
    let provisioner = RepositoryProvisioner::new(Arc::new(github), Arc::new(GitCli::new()), settings);

    let pipeline = ChallengePipeline::new(Arc::new(llm), provisioner, config.intake.clone());

    // Build app state
    let state = AppState {
        pipeline: Arc::new(pipeline),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
