use std::net::SocketAddr;
use std::sync::Arc;

use feedback_api::http;
use feedback_core::config::ApiConfig;
use feedback_core::conversation::ConversationController;
use feedback_core::llm::{OpenRouterGateway, OpenRouterGatewayConfig};
use feedback_core::repos::Store;
use feedback_core::session::{FileSessionStore, SessionIdResolver, SessionStore};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "feedback_api=debug,feedback_core=info,axum=info".to_string()
        }))
        .init();

    let config = match ApiConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read config: {err}");
            std::process::exit(1);
        }
    };

    let gateway_config = match OpenRouterGatewayConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read llm gateway config: {err}");
            std::process::exit(1);
        }
    };

    let gateway = match OpenRouterGateway::new(gateway_config) {
        Ok(gateway) => gateway,
        Err(err) => {
            error!("failed to build llm gateway: {err}");
            std::process::exit(1);
        }
    };

    let store = match Store::connect(&config.database_url, config.database_max_connections).await
    {
        Ok(store) => store,
        Err(err) => {
            error!("failed to connect to postgres: {err}");
            std::process::exit(1);
        }
    };

    let migrator = match sqlx::migrate::Migrator::new(config.migrations_dir.clone()).await {
        Ok(migrator) => migrator,
        Err(err) => {
            error!("failed to load migrations: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = migrator.run(store.pool()).await {
        error!("failed to run migrations: {err}");
        std::process::exit(1);
    }

    let session_store = config
        .session_file
        .clone()
        .map(|path| Arc::new(FileSessionStore::new(path)) as Arc<dyn SessionStore>);
    let resolver = SessionIdResolver::new(Some(config.session.session_id.as_str()), session_store);
    info!(
        session_id = %resolver.resolve_session_id(),
        explicit_override = resolver.has_explicit_override(),
        "feedback session resolved"
    );

    let app = http::build_router(http::AppState {
        store,
        controller: ConversationController::new(
            Arc::new(gateway),
            config.follow_ups.short_answer_chars,
        ),
        resolver,
        session: config.session,
        follow_ups: config.follow_ups,
    });

    let addr: SocketAddr = match config.bind_addr.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!("invalid BIND_ADDR '{}': {err}", config.bind_addr);
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {addr}: {err}");
            std::process::exit(1);
        }
    };

    info!(
        "feedback api listening on {}",
        listener.local_addr().unwrap_or(addr)
    );
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server stopped with error: {err}");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
