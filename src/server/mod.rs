//! HTTP server exposing the inpainting pipeline
//!
//! Routes:
//! - `POST /inpaint`: multipart `image`, `mask`, optional `sizeLimit`; JPEG attachment
//! - `GET /`: front-end `index.html` from the build directory
//! - `GET /inputimage`: the `--input` image, or `No Input Image`
//! - `GET /static/*`: front-end assets

pub mod error;
pub mod gui;
mod handlers;

pub use error::ApiError;

use crate::config::ServerConfig;
use crate::error::{InpaintError, Result};
use crate::processor::InpaintProcessor;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

/// Shared handler state
///
/// The processor sits behind a mutex: requests are processed one at a time
/// on the blocking pool.
#[derive(Clone)]
pub struct AppState {
    processor: Arc<Mutex<InpaintProcessor>>,
    config: Arc<ServerConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(processor: InpaintProcessor, config: ServerConfig) -> Self {
        Self {
            processor: Arc::new(Mutex::new(processor)),
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn processor(&self) -> Arc<Mutex<InpaintProcessor>> {
        Arc::clone(&self.processor)
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let static_dir = state.config.build_dir.join("static");
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(handlers::index))
        .route("/inpaint", post(handlers::inpaint))
        .route("/inputimage", get(handlers::input_image))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind a listener on `host:port`
///
/// # Errors
/// - Unparsable address
/// - Address already in use or not permitted
pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| InpaintError::invalid_config(format!("Invalid bind address {host}:{port}: {e}")))?;
    TcpListener::bind(addr)
        .await
        .map_err(|e| InpaintError::file_io_error("bind", addr.to_string(), &e))
}

/// Serve `app` until `shutdown` resolves
///
/// # Errors
/// - I/O failure of the listener
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "lama-cleaner server listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(InpaintError::from)
}

/// Resolves on Ctrl-C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
