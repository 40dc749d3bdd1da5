use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsroom::auth;
use newsroom::config::Config;
use newsroom::db::Database;
use newsroom::routes::{build_router, AppState};
use newsroom::session::start_session_sweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsroom=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("NEWSROOM_CONFIG").unwrap_or_else(|_| "newsroom.toml".to_string());
    let mut config = Config::load(&config_path)?;
    if let Ok(database_url) = std::env::var("DATABASE_URL") {
        config.database_url = database_url;
    }
    info!("Loaded configuration from {}", config_path);

    // Initialize database
    let db = Database::new(&config.database_url).await?;
    db.initialize().await?;
    if let Some(admin) = &config.admin {
        auth::seed_admin(&db, admin).await?;
    }
    info!("Database initialized");

    let db = Arc::new(db);

    // Purge expired sessions in the background
    let sweep_db = db.clone();
    let sweep_interval = config.session.sweep_interval;
    tokio::spawn(async move {
        start_session_sweeper(sweep_db, sweep_interval).await;
    });

    let bind_address = config.bind_address.clone();
    let state = Arc::new(AppState {
        db,
        config: Arc::new(config),
    });

    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Server starting on http://{}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
