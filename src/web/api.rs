//! REST API handlers for snapshot queries and manual runs

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use meridian_core::{MeridianScraper, RunStatus, ScrapeError, Snapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default history window for `/api/history`
const DEFAULT_HISTORY_DAYS: u32 = 7;

/// Shared state for API handlers
pub struct ApiState {
    pub scraper: Arc<MeridianScraper>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

/// Helper to create JSON error responses
fn json_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(serde_json::json!({"error": message})))
}

fn internal_error(err: ScrapeError) -> ApiError {
    tracing::error!("API request failed: {}", err);
    json_error(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
}

/// Query parameters for `/api/history`
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub days: Option<u32>,
}

/// Body of `/api/history`
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub days: u32,
    pub files: Vec<String>,
    pub count: usize,
    pub records: Vec<serde_json::Value>,
}

/// Body of `/api/scrape`
#[derive(Debug, Serialize)]
pub struct ScrapeResponse {
    pub message: String,
    pub snapshot: Option<Snapshot>,
}

/// GET /api/data
pub async fn get_data(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Option<Snapshot>>, ApiError> {
    state.scraper.latest_data().map(Json).map_err(internal_error)
}

/// POST /api/scrape
pub async fn trigger_scrape(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<ScrapeResponse>, ApiError> {
    match state.scraper.run().await {
        Ok(Some(snapshot)) => Ok(Json(ScrapeResponse {
            message: format!("Captured usage data from {}", snapshot.url),
            snapshot: Some(snapshot),
        })),
        Ok(None) => Ok(Json(ScrapeResponse {
            message: "Scrape finished without data".to_string(),
            snapshot: None,
        })),
        Err(ScrapeError::RunInProgress) => Err(json_error(
            StatusCode::CONFLICT,
            "A scrape is already in progress",
        )),
        Err(e) => Err(internal_error(e)),
    }
}

/// GET /api/history?days=N
pub async fn get_history(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_HISTORY_DAYS);
    let window = state
        .scraper
        .historical_data(days)
        .map_err(internal_error)?;

    Ok(Json(HistoryResponse {
        days,
        count: window.len(),
        records: window.records(),
        files: window.files,
    }))
}

/// GET /api/status
pub async fn get_status(State(state): State<Arc<ApiState>>) -> Json<RunStatus> {
    Json(state.scraper.status())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::Router;
    use http::Request;
    use http_body_util::BodyExt;
    use meridian_core::{Credentials, ScraperSettings};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    /// Scraper over a temp store whose browser launch always fails fast
    fn test_scraper(dir: &TempDir) -> Arc<MeridianScraper> {
        let settings = ScraperSettings {
            data_dir: dir.path().to_path_buf(),
            chrome_path: Some(dir.path().join("no-such-chrome")),
            ..Default::default()
        };
        let credentials = Credentials::new("user@example.com", "hunter2").unwrap();
        Arc::new(MeridianScraper::new(settings, credentials).unwrap())
    }

    fn test_router(scraper: Arc<MeridianScraper>) -> Router {
        super::super::server::router(Arc::new(ApiState { scraper }))
    }

    async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_get_data_empty_store() {
        let dir = TempDir::new().unwrap();
        let (status, body) = send(test_router(test_scraper(&dir)), "GET", "/api/data").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_get_data_returns_latest() {
        let dir = TempDir::new().unwrap();
        let scraper = test_scraper(&dir);
        scraper
            .store()
            .persist(json!({"readings": [{"t": 1}]}), "https://portal.test/api/usage", true)
            .unwrap();

        let (status, body) = send(test_router(scraper.clone()), "GET", "/api/data").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["url"], "https://portal.test/api/usage");
        assert_eq!(body["data"], json!({"readings": [{"t": 1}]}));

        let (status, legacy) = send(test_router(scraper), "GET", "/data").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(legacy, body);
    }

    #[tokio::test]
    async fn test_legacy_scrape_route() {
        let dir = TempDir::new().unwrap();
        let scraper = test_scraper(&dir);

        let permit = scraper.guard().try_acquire().unwrap();
        let (status, body) = send(test_router(scraper.clone()), "POST", "/scrape").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "A scrape is already in progress");
        drop(permit);

        let (status, body) = send(test_router(scraper), "POST", "/scrape").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["snapshot"], serde_json::Value::Null);
        assert_eq!(body["message"], "Scrape finished without data");
    }

    #[tokio::test]
    async fn test_history_defaults_to_seven_days() {
        let dir = TempDir::new().unwrap();
        let scraper = test_scraper(&dir);
        scraper
            .store()
            .persist(json!({"usage": [{"t": 1}, {"t": 2}, {"t": 1}]}), "u", true)
            .unwrap();

        let (status, body) = send(test_router(scraper.clone()), "GET", "/api/history").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["days"], 7);
        assert_eq!(body["count"], 2);
        assert_eq!(body["records"][1], json!({"t": "2"}));

        let (_, body) = send(test_router(scraper), "GET", "/api/history?days=0").await;
        assert_eq!(body["days"], 0);
    }

    #[tokio::test]
    async fn test_history_accepts_largest_window() {
        let dir = TempDir::new().unwrap();
        let scraper = test_scraper(&dir);
        scraper
            .store()
            .persist(json!({"usage": [{"t": 1}]}), "u", true)
            .unwrap();

        let (status, body) = send(test_router(scraper), "GET", "/api/history?days=4294967295").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["days"], 4294967295u64);
        assert_eq!(body["count"], 1);
    }

    #[tokio::test]
    async fn test_history_rejects_bad_days() {
        let dir = TempDir::new().unwrap();
        let response = test_router(test_scraper(&dir))
            .oneshot(
                Request::builder()
                    .uri("/api/history?days=-3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_scrape_conflict_while_running() {
        let dir = TempDir::new().unwrap();
        let scraper = test_scraper(&dir);
        let _permit = scraper.guard().try_acquire().unwrap();

        let (status, body) = send(test_router(scraper), "POST", "/api/scrape").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "A scrape is already in progress");
    }

    #[tokio::test]
    async fn test_scrape_without_browser_reports_no_data() {
        let dir = TempDir::new().unwrap();
        let scraper = test_scraper(&dir);

        let (status, body) = send(test_router(scraper.clone()), "POST", "/api/scrape").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["snapshot"], serde_json::Value::Null);

        let (status, body) = send(test_router(scraper), "GET", "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["running"], false);
        assert_eq!(body["runs"], 1);
        assert_eq!(body["last_outcome"]["outcome"], "failed");
    }
}
