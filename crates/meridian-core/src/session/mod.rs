//! Session driver: one login-and-capture pass against the portal.
//!
//! The flow is a linear state machine. Every state either advances or moves to
//! `Failed`; the driver never panics out of a run and the page is closed on
//! every exit path.
//!
//! ```text
//! Start → NavigateLogin → FillEmail → SubmitEmail → FillPassword
//!       → SubmitPassword → AwaitDashboard → LocateUsageView → AwaitData → Done
//! ```

pub mod candidates;

use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserLauncher, NetworkEvent, PortalPage};
use crate::capture::CaptureInterceptor;
use crate::config::{Credentials, ScraperSettings};
use crate::error::{BrowserError, ScrapeError};
use crate::fallback;
use crate::selector::SelectorResolver;
use crate::store::SnapshotStore;
use crate::types::{Snapshot, VISUAL_SCRAPE_SOURCE};
use candidates::*;

/// Granularity of the settle wait in `AwaitData`
const SETTLE_SLICE: Duration = Duration::from_secs(1);

/// Position in the login-and-capture flow
#[derive(Debug)]
pub enum SessionState {
    Start,
    NavigateLogin,
    FillEmail,
    SubmitEmail,
    FillPassword,
    SubmitPassword,
    AwaitDashboard,
    LocateUsageView,
    AwaitData,
    Done,
    Failed(ScrapeError),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::NavigateLogin => "navigate_login",
            Self::FillEmail => "fill_email",
            Self::SubmitEmail => "submit_email",
            Self::FillPassword => "fill_password",
            Self::SubmitPassword => "submit_password",
            Self::AwaitDashboard => "await_dashboard",
            Self::LocateUsageView => "locate_usage_view",
            Self::AwaitData => "await_data",
            Self::Done => "done",
            Self::Failed(_) => "failed",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

/// Outcome of one session
#[derive(Debug, Default)]
pub struct SessionReport {
    /// Last snapshot persisted; always `None` for failed sessions
    pub snapshot: Option<Snapshot>,
    /// Why the session failed, if it did
    pub failure: Option<ScrapeError>,
    /// A logged-in indicator was seen
    pub dashboard_confirmed: bool,
    /// Snapshots persisted during the session
    pub persisted: usize,
}

impl SessionReport {
    fn failed(reason: ScrapeError) -> Self {
        Self {
            failure: Some(reason),
            ..Default::default()
        }
    }
}

/// Launch a browser, drive one session, and close the browser
pub async fn run_session<L: BrowserLauncher>(
    launcher: &L,
    settings: &ScraperSettings,
    credentials: &Credentials,
    store: &SnapshotStore,
) -> SessionReport {
    let page = match launcher.launch().await {
        Ok(page) => page,
        Err(e) => {
            error!("Failed to launch browser: {}", e);
            return SessionReport::failed(e.into());
        }
    };

    let report = SessionDriver::new(&page, settings, credentials, store)
        .drive()
        .await;

    if let Err(e) = page.close().await {
        warn!("Failed to close browser: {}", e);
    }
    report
}

/// Drives a single page through the login-and-capture flow
pub struct SessionDriver<'a, P: PortalPage> {
    page: &'a P,
    settings: &'a ScraperSettings,
    credentials: &'a Credentials,
    store: &'a SnapshotStore,
    interceptor: CaptureInterceptor,
    email_field: Option<String>,
    password_field: Option<String>,
    dashboard_confirmed: bool,
    last_snapshot: Option<Snapshot>,
    persisted: usize,
}

impl<'a, P: PortalPage> SessionDriver<'a, P> {
    pub fn new(
        page: &'a P,
        settings: &'a ScraperSettings,
        credentials: &'a Credentials,
        store: &'a SnapshotStore,
    ) -> Self {
        Self {
            page,
            settings,
            credentials,
            store,
            interceptor: CaptureInterceptor::new(),
            email_field: None,
            password_field: None,
            dashboard_confirmed: false,
            last_snapshot: None,
            persisted: 0,
        }
    }

    /// Run the state machine to completion
    pub async fn drive(mut self) -> SessionReport {
        let mut state = SessionState::Start;

        while !state.is_terminal() {
            let from = state.name();
            state = self.step(state).await;
            debug!("Session {} -> {}", from, state.name());
        }

        match state {
            SessionState::Failed(reason) => self.fail(reason).await,
            _ => self.finish().await,
        }
    }

    async fn step(&mut self, state: SessionState) -> SessionState {
        let result = match state {
            SessionState::Start => Ok(SessionState::NavigateLogin),
            SessionState::NavigateLogin => self.navigate_login().await,
            SessionState::FillEmail => self.fill_email().await,
            SessionState::SubmitEmail => self.submit_email().await,
            SessionState::FillPassword => self.fill_password().await,
            SessionState::SubmitPassword => self.submit_password().await,
            SessionState::AwaitDashboard => self.await_dashboard().await,
            SessionState::LocateUsageView => self.locate_usage_view().await,
            SessionState::AwaitData => self.await_data().await,
            terminal => Ok(terminal),
        };

        result.unwrap_or_else(SessionState::Failed)
    }

    async fn navigate_login(&mut self) -> Result<SessionState, ScrapeError> {
        let url = &self.settings.login_url;
        info!("Navigating to {}", url);

        let timeout = self.settings.navigation_timeout();
        self.page
            .goto(url, timeout)
            .await
            .map_err(|e| navigation_error(url, e))?;
        self.page
            .wait_for_network_idle(self.settings.network_idle(), timeout)
            .await
            .map_err(|e| navigation_error(url, e))?;

        Ok(SessionState::FillEmail)
    }

    async fn fill_email(&mut self) -> Result<SessionState, ScrapeError> {
        let selector = self.require_field("email field", EMAIL_FIELDS).await?;
        self.page.fill(&selector, self.credentials.email()).await?;
        self.email_field = Some(selector);
        Ok(SessionState::SubmitEmail)
    }

    async fn submit_email(&mut self) -> Result<SessionState, ScrapeError> {
        let field = self.email_field.clone().unwrap_or_default();
        self.submit("email submit", SUBMIT_EMAIL, &field).await?;
        Ok(SessionState::FillPassword)
    }

    async fn fill_password(&mut self) -> Result<SessionState, ScrapeError> {
        let selector = self.require_field("password field", PASSWORD_FIELDS).await?;
        self.page.fill(&selector, self.credentials.password()).await?;
        self.password_field = Some(selector);
        Ok(SessionState::SubmitPassword)
    }

    async fn submit_password(&mut self) -> Result<SessionState, ScrapeError> {
        let field = self.password_field.clone().unwrap_or_default();
        self.submit("password submit", SUBMIT_PASSWORD, &field).await?;
        Ok(SessionState::AwaitDashboard)
    }

    async fn await_dashboard(&mut self) -> Result<SessionState, ScrapeError> {
        let resolver = SelectorResolver::new(self.settings.dashboard_candidate_timeout())
            .with_budget(self.settings.dashboard_budget());

        let resolution = resolver
            .resolve(self.page, "dashboard", DASHBOARD_INDICATORS)
            .await;
        match resolution.selector() {
            Some(indicator) => {
                info!("Login confirmed by {}", indicator);
                self.dashboard_confirmed = true;
            }
            None => warn!("{}; continuing without confirmation", ScrapeError::NoDashboardDetected),
        }

        self.pump().await?;
        Ok(SessionState::LocateUsageView)
    }

    async fn locate_usage_view(&mut self) -> Result<SessionState, ScrapeError> {
        let resolver = SelectorResolver::new(self.settings.dashboard_candidate_timeout());

        let resolution = resolver.resolve(self.page, "usage link", USAGE_LINKS).await;
        if let Some(link) = resolution.selector() {
            match self.page.click(link).await {
                Ok(()) => self.settle_network().await,
                Err(e) => warn!("Could not open usage view via {}: {}", link, e),
            }
        } else {
            info!("No usage link found; staying on current page");
        }

        self.pump().await?;
        Ok(SessionState::AwaitData)
    }

    async fn await_data(&mut self) -> Result<SessionState, ScrapeError> {
        self.nudge_triggers().await;

        let settle = self.settings.settle();
        let start = Instant::now();
        info!("Waiting {:?} for usage data", settle);

        loop {
            self.pump().await?;
            let elapsed = start.elapsed();
            if elapsed >= settle {
                break;
            }
            tokio::time::sleep(SETTLE_SLICE.min(settle - elapsed)).await;
        }

        Ok(SessionState::Done)
    }

    /// Resolve a required field or fail the session
    async fn require_field(&self, role: &str, candidates: &[&str]) -> Result<String, ScrapeError> {
        let resolver = SelectorResolver::new(self.settings.selector_timeout());
        resolver
            .resolve(self.page, role, candidates)
            .await
            .selector()
            .map(str::to_string)
            .ok_or_else(|| ScrapeError::FieldNotFound {
                role: role.to_string(),
            })
    }

    /// Click a submit control, falling back to Enter on `field`
    async fn submit(&self, role: &str, candidates: &[&str], field: &str) -> Result<(), ScrapeError> {
        let resolver = SelectorResolver::new(self.settings.selector_timeout());

        let resolution = resolver.resolve(self.page, role, candidates).await;
        let clicked = match resolution.selector() {
            Some(button) => match self.page.click(button).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("{}: click on {} failed: {}", role, button, e);
                    false
                }
            },
            None => false,
        };

        if !clicked {
            info!("{}: pressing Enter on {}", role, field);
            self.page.press_enter(field).await.map_err(|e| {
                warn!("{}: Enter fallback failed: {}", role, e);
                ScrapeError::FieldNotFound {
                    role: role.to_string(),
                }
            })?;
        }

        self.settle_network().await;
        Ok(())
    }

    /// Best-effort wait for the page to go quiet after an interaction
    async fn settle_network(&self) {
        if let Err(e) = self
            .page
            .wait_for_network_idle(self.settings.network_idle(), self.settings.navigation_timeout())
            .await
        {
            warn!("Network did not settle: {}", e);
        }
    }

    /// Touch controls that might trigger a usage fetch
    async fn nudge_triggers(&self) {
        for trigger in DATA_TRIGGERS {
            if !matches!(self.page.count_visible(trigger).await, Ok(n) if n > 0) {
                continue;
            }
            match self.page.click(trigger).await {
                Ok(()) => debug!("Nudged {}", trigger),
                Err(e) => debug!("Could not nudge {}: {}", trigger, e),
            }
        }
    }

    /// Drain queued network events, persisting every captured payload
    async fn pump(&mut self) -> Result<(), ScrapeError> {
        for event in self.page.drain_network_events() {
            match event {
                NetworkEvent::Request { url, method } => {
                    self.interceptor.observe_request(&url, &method);
                }
                NetworkEvent::Response(meta) => {
                    if let Some(capture) = self.interceptor.inspect(self.page, &meta).await {
                        info!("Captured usage payload from {}", capture.url);
                        self.persist(capture.body, &capture.url)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn persist(&mut self, payload: serde_json::Value, origin: &str) -> Result<(), ScrapeError> {
        let (snapshot, _) = self
            .store
            .persist(payload, origin, self.dashboard_confirmed)?;
        self.last_snapshot = Some(snapshot);
        self.persisted += 1;
        Ok(())
    }

    /// Record requests still queued without persisting anything
    fn drain_requests_only(&mut self) {
        for event in self.page.drain_network_events() {
            if let NetworkEvent::Request { url, method } = event {
                self.interceptor.observe_request(&url, &method);
            }
        }
    }

    async fn finish(mut self) -> SessionReport {
        if self.persisted == 0 {
            info!("No usage payload captured; reading visible page data");
            if let Some(payload) = fallback::scrape_visible(self.page).await {
                if let Err(e) = self.persist(payload, VISUAL_SCRAPE_SOURCE) {
                    return self.fail(e).await;
                }
            } else {
                info!("No visible usage data found");
            }
        }

        self.write_request_log();

        info!(
            "Session finished: {} snapshot(s), dashboard confirmed: {}",
            self.persisted, self.dashboard_confirmed
        );
        SessionReport {
            snapshot: self.last_snapshot,
            failure: None,
            dashboard_confirmed: self.dashboard_confirmed,
            persisted: self.persisted,
        }
    }

    async fn fail(mut self, reason: ScrapeError) -> SessionReport {
        error!("Session failed ({}): {}", reason.kind(), reason);

        if !matches!(reason, ScrapeError::Persistence(_)) {
            self.capture_screenshot().await;
        }
        self.drain_requests_only();
        self.write_request_log();

        SessionReport {
            snapshot: None,
            failure: Some(reason),
            dashboard_confirmed: self.dashboard_confirmed,
            persisted: self.persisted,
        }
    }

    async fn capture_screenshot(&self) {
        let path = match self.store.screenshot_path(Local::now()) {
            Ok(path) => path,
            Err(e) => {
                warn!("No screenshot: {}", e);
                return;
            }
        };
        match self.page.screenshot(&path).await {
            Ok(()) => info!("Saved failure screenshot to {:?}", path),
            Err(e) => warn!("Failed to save screenshot: {}", e),
        }
    }

    fn write_request_log(&self) {
        let requests = self.interceptor.requests();
        if !self.settings.log_requests || requests.is_empty() {
            return;
        }
        if let Err(e) = self.store.write_request_log(requests, Local::now()) {
            warn!("Failed to write request log: {}", e);
        }
    }
}

/// Navigation failures are timeouts unless the browser itself broke
fn navigation_error(url: &str, err: BrowserError) -> ScrapeError {
    match err {
        BrowserError::Timeout { .. } => ScrapeError::NavigationTimeout {
            url: url.to_string(),
        },
        other => ScrapeError::Browser(other),
    }
}
