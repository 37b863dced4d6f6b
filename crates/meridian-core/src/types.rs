//! Data carried between the session, the interceptor, and the store.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Origin marker for snapshots built from rendered page text
pub const VISUAL_SCRAPE_SOURCE: &str = "visual_scrape";

/// One persisted capture of usage data plus metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the payload was captured
    pub timestamp: DateTime<Local>,
    /// Origin URL, or `visual_scrape` for the DOM fallback
    pub url: String,
    /// Whether a logged-in indicator was seen before this capture was stored
    #[serde(default = "default_dashboard_confirmed")]
    pub dashboard_confirmed: bool,
    /// Raw payload as captured
    pub data: serde_json::Value,
}

fn default_dashboard_confirmed() -> bool {
    true
}

impl Snapshot {
    /// Whether this snapshot came from the visible-data fallback
    pub fn is_visual_scrape(&self) -> bool {
        self.url == VISUAL_SCRAPE_SOURCE
    }
}

/// A payload-bearing response observed during a session
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureEvent {
    pub url: String,
    pub status: i64,
    pub content_type: String,
    pub body: serde_json::Value,
}

/// Diagnostic record of an API-shaped request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub url: String,
    pub method: String,
    pub timestamp: DateTime<Local>,
}
