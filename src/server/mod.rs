//! HTTP API for dashboard clients.
//!
//! Every endpoint is read-only and backed by an `ItemStore` (work items)
//! and a `ProjectDirectory` (iterations, teams, pull requests).

mod handlers;

use axum::{
    Router,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::hierarchy::ClosureOptions;
use crate::queries::Queries;
use crate::store::{ItemStore, ProjectDirectory};
use crate::{Error, Result};

pub use handlers::ApiError;

/// Default port for `wb serve`.
pub const DEFAULT_PORT: u16 = 3001;

/// Static facts reported by `/api/health`.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub organization: Option<String>,
    pub project: Option<String>,
    /// Whether organization, project and token are all present
    pub configured: bool,
    pub started_at: DateTime<Utc>,
}

impl ServerInfo {
    pub fn new(organization: Option<String>, project: Option<String>, configured: bool) -> Self {
        Self {
            organization,
            project,
            configured,
            started_at: Utc::now(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Work item source
    pub store: Arc<dyn ItemStore>,
    /// Project metadata source
    pub directory: Arc<dyn ProjectDirectory>,
    pub info: Arc<ServerInfo>,
    /// Batch concurrency and closure caps applied to every request
    pub options: ClosureOptions,
}

impl AppState {
    pub fn queries(&self) -> Queries<'_> {
        Queries::new(self.store.as_ref()).with_options(self.options)
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/iterations", get(handlers::iterations))
        .route("/api/iterations/current", get(handlers::current_iteration))
        .route(
            "/api/iterations/:iteration/workitems",
            get(handlers::iteration_items),
        )
        .route("/api/iterations/:iteration/tree", get(handlers::iteration_tree))
        .route("/api/teams", get(handlers::teams))
        .route("/api/teams/:team/members", get(handlers::team_members))
        .route("/api/wiql", post(handlers::wiql))
        .route("/api/workitems", get(handlers::work_items))
        .route("/api/workitems/batch", post(handlers::batch))
        .route("/api/workitems/:id", get(handlers::work_item))
        .route("/api/workitems/:id/children", get(handlers::children))
        .route("/api/epics", get(handlers::epics))
        .route("/api/search", get(handlers::search))
        .route("/api/prs", get(handlers::pull_requests))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until Ctrl+C.
pub async fn start_server(state: AppState, host: &str, port: u16) -> Result<()> {
    let host_addr: IpAddr = host
        .parse()
        .map_err(|e| Error::Config(format!("Invalid host address '{}': {}", host, e)))?;
    let addr = SocketAddr::from((host_addr, port));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        org = state.info.organization.as_deref().unwrap_or("-"),
        project = state.info.project.as_deref().unwrap_or("-"),
        configured = state.info.configured,
        "workboard API listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
