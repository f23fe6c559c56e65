use std::sync::Arc;

use market_research_orchestrator::api::{build_router, ApiState};
use market_research_orchestrator::config::AppConfig;
use market_research_orchestrator::Coordinator;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::from_env()?;
    config.require_broker_credentials()?;

    let coordinator = Arc::new(Coordinator::from_config(&config)?);
    let app = build_router(ApiState { coordinator });

    let addr = std::env::var("API_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    info!(%addr, "Research API listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
