use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use relay_server::auth::jwt;
use relay_server::config::{generate_config_template, Config};
use relay_server::groups::InProcessRegistry;
use relay_server::persistence::SqliteStore;
use relay_server::state::AppState;
use relay_server::{db, routes};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("relay_server=info"))?;
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(env_filter).init();
    }

    tracing::info!("Relay server v{} starting", env!("CARGO_PKG_VERSION"));

    let db = db::init_db(&config.data_dir)?;

    let jwt_secret = match &config.jwt_secret {
        Some(secret) if !secret.is_empty() => secret.as_bytes().to_vec(),
        _ => jwt::load_or_generate_jwt_secret(&config.data_dir)?,
    };

    let store = Arc::new(SqliteStore::new(db));
    let registry = Arc::new(InProcessRegistry::new());
    let app_state = AppState::new(
        &jwt_secret,
        store.clone(),
        store,
        registry,
        config.session_settings(),
    );

    let app = routes::build_router(app_state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
