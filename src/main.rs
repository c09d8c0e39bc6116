use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_governor::governor::GovernorConfigBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use area_checklist::{config::Config, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");
    if config.admin_email.is_none() {
        tracing::warn!("ADMIN_EMAIL is not set; nobody will be promoted to Admin on sign-in");
    }

    let state = AppState::new(&config).await?;
    tracing::info!("AppState initialized");

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(50)
            .burst_size(200)
            .use_headers()
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let app = routes::router(state.clone())
        .layer(tower_governor::GovernorLayer::new(governor_conf));

    let cleanup_state = state.clone();
    let cleanup_every = Duration::from_secs(config.session_cleanup_interval_secs);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(cleanup_every).await;
            tracing::info!("Running scheduled cleanup of expired sessions");
            match cleanup_state.sessions.cleanup_expired_sessions().await {
                Ok(deleted) => {
                    tracing::info!("Session cleanup removed {} sessions", deleted);
                }
                Err(e) => {
                    tracing::error!("Session cleanup failed: {}", e);
                }
            }
        }
    });

    let addr = config.bind_addr;
    tracing::info!("Server listening on http://{}", addr);
    tracing::info!(
        "Expired sessions are swept every {}s",
        config.session_cleanup_interval_secs
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
