//! Network capture: decide which responses carry usage payloads.

use chrono::Local;
use tracing::{debug, warn};

use crate::browser::{PortalPage, ResponseMeta};
use crate::error::ScrapeError;
use crate::types::{CaptureEvent, RequestRecord};

/// URL keywords associated with usage/energy data
pub const USAGE_KEYWORDS: &[&str] = &[
    "usage",
    "consumption",
    "energy",
    "kwh",
    "meter",
    "reading",
    "interval",
    "power",
    "electricity",
];

/// URL keywords that mark a request as API-shaped for the request log
pub const API_KEYWORDS: &[&str] = &["api", "graphql", "usage", "consumption", "/data"];

/// Path and query of a URL. Keywords never match the host
/// (`meridianenergy.co.nz` would match "energy").
fn path_and_query(url: &str) -> &str {
    match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            rest.find('/').map_or("", |slash| &rest[slash..])
        }
        None => url,
    }
}

fn url_contains_any(url: &str, keywords: &[&str]) -> bool {
    let path = path_and_query(url).to_ascii_lowercase();
    keywords.iter().any(|keyword| path.contains(keyword))
}

/// Declared content type indicates JSON
fn is_structured(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("json")
}

/// Success status, JSON content type, and a usage keyword in the URL
pub fn is_payload_bearing(meta: &ResponseMeta) -> bool {
    (200..300).contains(&meta.status)
        && is_structured(&meta.content_type)
        && url_contains_any(&meta.url, USAGE_KEYWORDS)
}

/// Whether a request belongs in the diagnostic request log
pub fn is_api_request(url: &str) -> bool {
    url_contains_any(url, API_KEYWORDS)
}

/// Parse a response body as JSON
pub fn parse_body(url: &str, body: &str) -> Result<serde_json::Value, ScrapeError> {
    serde_json::from_str(body).map_err(|source| ScrapeError::Parse {
        url: url.to_string(),
        source,
    })
}

/// Classifies network traffic for one session
#[derive(Debug, Default)]
pub struct CaptureInterceptor {
    requests: Vec<RequestRecord>,
}

impl CaptureInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record API-shaped requests; everything else is ignored
    pub fn observe_request(&mut self, url: &str, method: &str) {
        if is_api_request(url) {
            self.requests.push(RequestRecord {
                url: url.to_string(),
                method: method.to_string(),
                timestamp: Local::now(),
            });
        }
    }

    /// Fetch and parse a payload-bearing response
    ///
    /// Returns `None` for noise, unreadable bodies, and bodies that fail to
    /// parse; none of these end the run.
    pub async fn inspect<P: PortalPage>(
        &self,
        page: &P,
        meta: &ResponseMeta,
    ) -> Option<CaptureEvent> {
        if !is_payload_bearing(meta) {
            debug!("Ignoring response {} ({} {})", meta.url, meta.status, meta.content_type);
            return None;
        }

        let body = match page.response_body(&meta.request_id).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Could not read body of {}: {}", meta.url, e);
                return None;
            }
        };

        match parse_body(&meta.url, &body) {
            Ok(value) => Some(CaptureEvent {
                url: meta.url.clone(),
                status: meta.status,
                content_type: meta.content_type.clone(),
                body: value,
            }),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    /// API-shaped requests seen so far
    pub fn requests(&self) -> &[RequestRecord] {
        &self.requests
    }
}
