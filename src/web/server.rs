//! Web server implementation using axum

use anyhow::Result;
use axum::http::{HeaderName, Method};
use axum::{
    routing::{get, post},
    Router,
};
use meridian_core::MeridianScraper;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::WebSettings;

use super::api::{self, ApiState};

/// JSON API over the scraper
pub struct WebServer {
    settings: WebSettings,
    scraper: Arc<MeridianScraper>,
}

impl WebServer {
    /// Create a new web server
    pub fn new(settings: WebSettings, scraper: Arc<MeridianScraper>) -> Self {
        Self { settings, scraper }
    }

    /// Run the web server
    pub async fn run(self) -> Result<()> {
        let port = self.settings.port;
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([HeaderName::from_static("content-type")]);

        let app = router(Arc::new(ApiState {
            scraper: self.scraper,
        }))
        .layer(cors);

        tracing::info!("Web server starting on http://0.0.0.0:{}", port);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// All API routes, plus the unprefixed `/data` and `/scrape` paths
pub(super) fn router(state: Arc<ApiState>) -> Router {
    let api_routes = Router::new()
        .route("/data", get(api::get_data))
        .route("/scrape", post(api::trigger_scrape))
        .route("/history", get(api::get_history))
        .route("/status", get(api::get_status))
        .with_state(state.clone());

    let legacy_routes = Router::new()
        .route("/data", get(api::get_data))
        .route("/scrape", post(api::trigger_scrape))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .merge(legacy_routes)
}
