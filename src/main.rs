use std::sync::Arc;

use axum::Router;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use dotenvy::dotenv;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use chapelserver::api_router::configure_api_routes;
use chapelserver::config::AppConfig;
use chapelserver::shared::state::AppState;
use chapelserver::shared::utils::create_conn;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chapelserver=info,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env()?;
    let pool = create_conn(&config.database_url())
        .map_err(|e| anyhow::anyhow!("failed to create database pool: {e}"))?;

    {
        let mut conn = pool
            .get()
            .map_err(|e| anyhow::anyhow!("database connection failed: {e}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("migrations failed: {e}"))?;
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(pool, config));

    let app: Router = configure_api_routes()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("starting HTTP server on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
