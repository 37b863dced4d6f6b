//! Error taxonomy for scrape runs, the browser seam, and the snapshot store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while driving a scrape run
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Credentials or settings are missing/invalid; prevents startup
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Another run currently holds the run guard
    #[error("a scrape run is already in progress")]
    RunInProgress,

    /// The portal did not load (or settle) within the navigation budget
    #[error("navigation timed out: {url}")]
    NavigationTimeout { url: String },

    /// No selector candidate matched a required element
    #[error("field not found: {role}")]
    FieldNotFound { role: String },

    /// No logged-in indicator matched (logged, never fatal)
    #[error("no dashboard indicator detected")]
    NoDashboardDetected,

    /// A single captured response could not be parsed (that response is dropped)
    #[error("failed to parse response from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Writing a snapshot failed; fatal to the current run only
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),

    /// The browser session failed underneath the state machine
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
}

impl ScrapeError {
    /// Build a configuration error from any message
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Short machine-readable name used in logs and run status
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::RunInProgress => "run_in_progress",
            Self::NavigationTimeout { .. } => "navigation_timeout",
            Self::FieldNotFound { .. } => "field_not_found",
            Self::NoDashboardDetected => "no_dashboard_detected",
            Self::Parse { .. } => "parse",
            Self::Persistence(_) => "persistence",
            Self::Browser(_) => "browser",
        }
    }
}

/// Errors from the browser seam
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Chrome/Chromium could not be located or started
    #[error("failed to launch browser: {0}")]
    Launch(String),

    /// A DevTools protocol command failed
    #[error("devtools command failed: {0}")]
    Cdp(String),

    /// An operation exceeded its time budget
    #[error("timed out after {millis}ms: {operation}")]
    Timeout { operation: String, millis: u64 },

    /// Writing a diagnostic artifact failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Self::Cdp(err.to_string())
    }
}

/// Errors from the on-disk snapshot store
#[derive(Debug, Error)]
pub enum StoreError {
    /// No latest snapshot has been written yet
    #[error("no snapshot found at {path:?}")]
    NotFound { path: PathBuf },

    /// Filesystem failure (disk full, permissions, ...)
    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A snapshot could not be serialized or read back
    #[error("invalid snapshot json in {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
