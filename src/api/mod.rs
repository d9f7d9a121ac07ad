//! REST API server module
//!
//! Thin HTTP adapter over [`UrlDownloader`]: task submission and lookup,
//! health and statistics, and a server-sent event stream.

use crate::{Config, Result, UrlDownloader};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Tasks
/// - `POST /tasks` - Submit a batch of URLs
/// - `GET /tasks` - List tasks, optionally filtered by `?status=`
/// - `GET /tasks/:id` - Get a single task
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /stats` - Task counts and worker pool state
/// - `GET /events` - Server-sent events stream
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
pub fn create_router(downloader: Arc<UrlDownloader>, config: Arc<Config>) -> Router {
    let state = AppState::new(downloader, config.clone());

    let router = Router::new()
        .route("/tasks", post(routes::create_task))
        .route("/tasks", get(routes::list_tasks))
        .route("/tasks/:id", get(routes::get_task))
        .route("/health", get(routes::health_check))
        .route("/stats", get(routes::stats))
        .route("/metrics", get(routes::metrics))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream));

    let router = if config.server.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.server.api.cors_enabled {
        let cors = build_cors_layer(&config.server.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin; otherwise only the listed
/// origins that parse as header values are allowed.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Serves until the downloader's shutdown token is cancelled, then drains
/// open connections and returns.
///
/// # Example
///
/// ```no_run
/// use url_dl::{UrlDownloader, Config};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let downloader = Arc::new(UrlDownloader::new((*config).clone()).await?);
///
/// url_dl::api::start_api_server(downloader, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(downloader: Arc<UrlDownloader>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.server.api.bind_address;
    tracing::info!(address = %bind_address, "Starting API server");

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    serve(listener, downloader, config).await
}

/// Serve the API on an already-bound listener until shutdown begins
pub async fn serve(
    listener: TcpListener,
    downloader: Arc<UrlDownloader>,
    config: Arc<Config>,
) -> Result<()> {
    if let Ok(address) = listener.local_addr() {
        tracing::info!(address = %address, "API server listening");
    }

    let shutdown = downloader.shutdown_token();
    let app = create_router(downloader, config);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
