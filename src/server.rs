//! MCP server initialization for stdio and HTTP/SSE transports.
//!
//! Both transports dispatch into the same [`GraphTools`] handler over the
//! same shared connection, so a stdio client and HTTP clients can operate on
//! one store concurrently. The HTTP transport additionally serves the
//! visualization bundle and a health endpoint, and owns the identity file.

use anyhow::Result;
use axum::extract::State;
use axum::routing::get;
use axum::Json;
use rmcp::ServiceExt;
use std::sync::{Arc, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::config::EngramConfig;
use crate::db;
use crate::embedding::EmbeddingRegistry;
use crate::supervisor::{self, ServerInfo};
use crate::tools::GraphTools;

/// Shared setup: startup backup, open DB, build the embedding registry.
fn setup_shared_state(
    config: &EngramConfig,
) -> Result<(Arc<Mutex<rusqlite::Connection>>, Arc<EmbeddingRegistry>)> {
    supervisor::run_startup_backup(config);

    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    let db = Arc::new(Mutex::new(conn));
    let registry = Arc::new(EmbeddingRegistry::new(config.embedding.clone()));

    Ok((db, registry))
}

/// Final checkpoint on the way out; shutdown must leave the main database
/// file complete for plain file copies.
fn close_database(db: &Arc<Mutex<rusqlite::Connection>>) {
    if let Ok(conn) = db.lock() {
        if let Err(e) = db::checkpoint(&conn) {
            tracing::warn!(error = %e, "final checkpoint failed");
        }
    }
}

/// Start the MCP server on stdio transport.
pub async fn serve_stdio(config: EngramConfig) -> Result<()> {
    tracing::info!("starting engram MCP server on stdio");

    let (db, registry) = setup_shared_state(&config)?;
    let info = Arc::new(ServerInfo::new(&config, None));
    let config = Arc::new(config);

    let tools = GraphTools::new(Arc::clone(&db), registry, config, info);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    close_database(&db);
    tracing::info!("MCP server shut down");

    Ok(())
}

async fn health(State(info): State<Arc<ServerInfo>>) -> Json<serde_json::Value> {
    Json(info.health_value())
}

/// Resolves on SIGINT or SIGTERM. `engram stop` sends SIGTERM to the pid in
/// the identity file; both signals must take the graceful path (final
/// checkpoint, identity file removal), not the OS default disposition.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

/// CORS policy: permissive for local development unless the config narrows
/// it to an explicit origin list.
fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    match allowed_origins {
        Some(origins) => {
            let origins: Vec<axum::http::HeaderValue> = origins
                .iter()
                .filter_map(|origin| match origin.parse() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = %origin, "ignoring unparsable allowed origin");
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::permissive(),
    }
}

/// Start the MCP server on streamable HTTP/SSE, with the health endpoint and
/// static visualization assets. Negotiates the port and owns the identity
/// file for its lifetime.
pub async fn serve_http(config: EngramConfig) -> Result<()> {
    let (db, registry) = setup_shared_state(&config)?;

    let (listener, port) =
        supervisor::bind_with_negotiation(&config.server.host, config.server.port).await?;
    tracing::info!(
        host = %config.server.host,
        port,
        "engram MCP server listening at http://{}:{}/mcp",
        config.server.host,
        port
    );

    let info = Arc::new(ServerInfo::new(&config, Some(port)));
    supervisor::write_server_info(&info)?;

    let static_dir = config.resolved_static_dir();
    let config = Arc::new(config);
    let backup_ticker = supervisor::spawn_backup_ticker(Arc::clone(&config));

    let mcp_service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        {
            let db = Arc::clone(&db);
            let registry = Arc::clone(&registry);
            let config = Arc::clone(&config);
            let info = Arc::clone(&info);
            move || {
                Ok(GraphTools::new(
                    db.clone(),
                    registry.clone(),
                    config.clone(),
                    info.clone(),
                ))
            }
        },
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new()
        .route("/health", get(health))
        .with_state(Arc::clone(&info))
        .nest_service("/mcp", mcp_service)
        .fallback_service(ServeDir::new(static_dir))
        .layer(cors_layer(config.server.allowed_origins.as_deref()));

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(ticker) = backup_ticker {
        ticker.abort();
    }
    close_database(&db);
    supervisor::remove_server_info();

    Ok(())
}
