mod error;
mod extract;
mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use super::catalog::Catalog;
use super::download::DownloadService;
use super::history::HistoryStore;
use super::library::LibraryIndexer;
use super::poster::PosterCache;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) downloads: DownloadService,
    pub(crate) history: Arc<HistoryStore>,
    pub(crate) library: Arc<LibraryIndexer>,
    pub(crate) catalog: Arc<dyn Catalog>,
    pub(crate) posters: Arc<PosterCache>,
}

pub(crate) fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/search", get(handlers::search))
        .route("/api/library", get(handlers::library))
        .route("/api/history", get(handlers::history))
        .route("/api/history_event", post(handlers::history_event))
        .route("/api/play_episode", post(handlers::play_episode))
        .route("/api/download_episode", post(handlers::download_episode))
        .route("/api/download_season", post(handlers::download_season))
        .route("/api/download_all_by_title", post(handlers::download_all_by_title))
        .route("/media/{name}", get(handlers::media))
        .route("/posters/{name}", get(handlers::poster))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub(crate) async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
