use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ScrapeError;

/// Environment variable holding the portal login email
pub const EMAIL_ENV: &str = "MERIDIAN_EMAIL";
/// Environment variable holding the portal password
pub const PASSWORD_ENV: &str = "MERIDIAN_PASSWORD";
/// Environment variable overriding headless mode ("true"/"false")
pub const HEADLESS_ENV: &str = "HEADLESS";

/// Portal credentials, supplied once and never persisted
#[derive(Clone)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    /// Create credentials, rejecting blank values
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Result<Self, ScrapeError> {
        let email = email.into().trim().to_string();
        let password = password.into();
        if email.is_empty() {
            return Err(ScrapeError::configuration("portal email is empty"));
        }
        if password.is_empty() {
            return Err(ScrapeError::configuration("portal password is empty"));
        }
        Ok(Self { email, password })
    }

    /// Load credentials from `MERIDIAN_EMAIL` / `MERIDIAN_PASSWORD`
    pub fn from_env() -> Result<Self, ScrapeError> {
        let email = std::env::var(EMAIL_ENV)
            .map_err(|_| ScrapeError::configuration(format!("{EMAIL_ENV} is not set")))?;
        let password = std::env::var(PASSWORD_ENV)
            .map_err(|_| ScrapeError::configuration(format!("{PASSWORD_ENV} is not set")))?;
        Self::new(email, password)
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Scraper settings (the `[scraper]` table of the config file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperSettings {
    /// Portal entry URL
    #[serde(default = "default_login_url")]
    pub login_url: String,

    /// Directory for snapshots, extracts, request logs and screenshots
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Run Chrome without a window
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Explicit Chrome/Chromium executable (auto-detected when unset)
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// Budget for page load plus network quiescence, in seconds
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,

    /// Quiet period that counts as network idle, in milliseconds
    #[serde(default = "default_network_idle")]
    pub network_idle_ms: u64,

    /// Wait per selector candidate for login fields and buttons, in milliseconds
    #[serde(default = "default_selector_timeout")]
    pub selector_timeout_ms: u64,

    /// Wait per logged-in indicator candidate, in milliseconds
    #[serde(default = "default_dashboard_candidate_timeout")]
    pub dashboard_candidate_timeout_ms: u64,

    /// Aggregate budget for dashboard detection, in seconds
    #[serde(default = "default_dashboard_budget")]
    pub dashboard_budget_secs: u64,

    /// How long to hold the session open for async data requests, in seconds
    #[serde(default = "default_settle")]
    pub settle_secs: u64,

    /// Persist the diagnostic request log at the end of each run
    #[serde(default = "default_log_requests")]
    pub log_requests: bool,
}

fn default_login_url() -> String {
    "https://nextgen.meridianenergy.co.nz/login".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_headless() -> bool {
    true
}

fn default_navigation_timeout() -> u64 {
    30
}

fn default_network_idle() -> u64 {
    500
}

fn default_selector_timeout() -> u64 {
    5_000
}

fn default_dashboard_candidate_timeout() -> u64 {
    3_000
}

fn default_dashboard_budget() -> u64 {
    30
}

fn default_settle() -> u64 {
    10
}

fn default_log_requests() -> bool {
    true
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
            data_dir: default_data_dir(),
            headless: default_headless(),
            chrome_path: None,
            navigation_timeout_secs: default_navigation_timeout(),
            network_idle_ms: default_network_idle(),
            selector_timeout_ms: default_selector_timeout(),
            dashboard_candidate_timeout_ms: default_dashboard_candidate_timeout(),
            dashboard_budget_secs: default_dashboard_budget(),
            settle_secs: default_settle(),
            log_requests: default_log_requests(),
        }
    }
}

impl ScraperSettings {
    /// Apply `HEADLESS` from the environment when present
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var(HEADLESS_ENV) {
            self.headless = value.trim().eq_ignore_ascii_case("true");
        }
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn network_idle(&self) -> Duration {
        Duration::from_millis(self.network_idle_ms)
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.selector_timeout_ms)
    }

    pub fn dashboard_candidate_timeout(&self) -> Duration {
        Duration::from_millis(self.dashboard_candidate_timeout_ms)
    }

    pub fn dashboard_budget(&self) -> Duration {
        Duration::from_secs(self.dashboard_budget_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}
