use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use agent_api_server::config::Settings;
use agent_api_server::handlers;
use agent_api_server::logging::{self, ActivityLogger};
use agent_api_server::services::session::SessionManager;
use agent_api_server::services::{AgentService, WalletStore};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging()?;

    info!("Starting agent API server...");

    // Load configuration
    let settings = Settings::load()?;
    info!("Configuration loaded");

    // Wallet blob persisted between agent constructions
    let wallet_store = WalletStore::new(&settings.agent.wallet_data_path);

    // Agent runtime client doubles as the session manager's factory
    let agent_service = Arc::new(AgentService::new(
        settings.agent.clone(),
        wallet_store,
        settings.prompts.base_instructions.clone(),
    ));

    let activity_logger = ActivityLogger::new(settings.logging.clone());

    let session_manager = Arc::new(SessionManager::new(
        agent_service,
        settings.sessions.clone(),
        activity_logger.clone(),
    ));

    let settings = Arc::new(settings);
    let app = handlers::router(session_manager, activity_logger, settings.clone());

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
