//! Web layer: the HLS delivery plane's HTTP surface (spec.md §4.7), grounded
//! on the teacher's `WebServer { app, addr }` + `AppState` + `CorsLayer`
//! shape — thin handlers delegating to [`crate::manager::StreamManager`].

pub mod handlers;
pub mod responses;

use crate::config::Config;
use crate::manager::StreamManager;
use anyhow::Result;
use axum::routing::{delete, get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<StreamManager>,
}

pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(config: &Config, manager: Arc<StreamManager>) -> Result<Self> {
        let app = Self::create_router(AppState { manager });
        let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port).parse()?;
        Ok(Self { app, addr })
    }

    fn create_router(state: AppState) -> Router {
        Router::new()
            .nest("/api/stream", Self::stream_routes())
            .route("/health", get(|| async { "ok" }))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    fn stream_routes() -> Router<AppState> {
        Router::new()
            .route("/:channel_id/master.m3u8", get(handlers::get_master_playlist))
            .route("/:channel_id/:quality", get(handlers::get_media_playlist))
            .route("/:channel_id/:quality/:segment", get(handlers::get_segment))
            .route("/:channel_id/client", delete(handlers::delete_client))
            .route("/:channel_id/position", post(handlers::post_position))
    }

    /// Returns the underlying router, e.g. to drive it in tests via
    /// `tower::ServiceExt::oneshot` without binding a socket.
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!(addr = %self.addr, "starting HTTP server");
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app).await?;
        Ok(())
    }
}
