//! Entry point: one scraper instance shared by manual and scheduled triggers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::browser::{BrowserLauncher, ChromiumLauncher};
use crate::config::{Credentials, ScraperSettings};
use crate::error::{ScrapeError, StoreError};
use crate::history::{HistoryAggregator, HistoryWindow};
use crate::session::run_session;
use crate::store::SnapshotStore;
use crate::types::Snapshot;

/// Process-wide "a run is active" flag
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

impl RunGuard {
    /// Claim the guard, or `None` when a run already holds it
    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                running: self.running.clone(),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Held for the duration of one run; releases the guard on drop
#[derive(Debug)]
pub struct RunPermit {
    running: Arc<AtomicBool>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// How the last run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Captured { url: String },
    NoData,
    Failed { reason: String },
}

/// Last-run bookkeeping for status reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStatus {
    pub running: bool,
    pub runs: u64,
    pub last_started: Option<DateTime<Local>>,
    pub last_finished: Option<DateTime<Local>>,
    pub last_outcome: Option<RunOutcome>,
}

/// Scrapes the portal and answers queries over the stored snapshots
pub struct MeridianScraper<L: BrowserLauncher = ChromiumLauncher> {
    launcher: L,
    settings: ScraperSettings,
    credentials: Credentials,
    store: SnapshotStore,
    guard: RunGuard,
    status: Mutex<RunStatus>,
}

impl MeridianScraper<ChromiumLauncher> {
    /// Create a scraper driving a local Chrome
    pub fn new(settings: ScraperSettings, credentials: Credentials) -> Result<Self, ScrapeError> {
        let launcher = ChromiumLauncher::new(&settings);
        Self::with_launcher(launcher, settings, credentials)
    }

    /// Create a scraper with credentials and `HEADLESS` from the environment
    pub fn from_env(mut settings: ScraperSettings) -> Result<Self, ScrapeError> {
        settings.apply_env();
        let credentials = Credentials::from_env()?;
        Self::new(settings, credentials)
    }
}

impl<L: BrowserLauncher> MeridianScraper<L> {
    pub fn with_launcher(
        launcher: L,
        settings: ScraperSettings,
        credentials: Credentials,
    ) -> Result<Self, ScrapeError> {
        validate(&settings)?;
        let store = SnapshotStore::new(&settings.data_dir);
        Ok(Self {
            launcher,
            settings,
            credentials,
            store,
            guard: RunGuard::default(),
            status: Mutex::new(RunStatus::default()),
        })
    }

    pub fn settings(&self) -> &ScraperSettings {
        &self.settings
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Guard shared by every trigger of this scraper
    pub fn guard(&self) -> &RunGuard {
        &self.guard
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    /// Current run status
    pub fn status(&self) -> RunStatus {
        let mut status = self.status.lock().clone();
        status.running = self.is_running();
        status
    }

    /// Run one full session
    ///
    /// Returns the last snapshot persisted, or `None` when the run captured
    /// nothing or failed (the reason is logged and kept in [`RunStatus`]).
    /// Errors only when another run is already active.
    pub async fn run(&self) -> Result<Option<Snapshot>, ScrapeError> {
        let Some(_permit) = self.guard.try_acquire() else {
            warn!("Scrape requested while a run is in progress");
            return Err(ScrapeError::RunInProgress);
        };

        {
            let mut status = self.status.lock();
            status.runs += 1;
            status.last_started = Some(Local::now());
        }
        info!("Starting scrape run");

        let report = run_session(&self.launcher, &self.settings, &self.credentials, &self.store).await;

        let outcome = match (&report.failure, &report.snapshot) {
            (Some(reason), _) => RunOutcome::Failed {
                reason: reason.to_string(),
            },
            (None, Some(snapshot)) => RunOutcome::Captured {
                url: snapshot.url.clone(),
            },
            (None, None) => RunOutcome::NoData,
        };
        info!("Scrape run finished: {:?}", outcome);

        {
            let mut status = self.status.lock();
            status.last_finished = Some(Local::now());
            status.last_outcome = Some(outcome);
        }

        Ok(report.snapshot)
    }

    /// Most recently persisted snapshot, if any
    pub fn latest_data(&self) -> Result<Option<Snapshot>, ScrapeError> {
        match self.store.latest() {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Deduplicated extract rows from the last `days` days
    pub fn historical_data(&self, days: u32) -> Result<HistoryWindow, ScrapeError> {
        Ok(HistoryAggregator::new(&self.store).history(days)?)
    }
}

fn validate(settings: &ScraperSettings) -> Result<(), ScrapeError> {
    let url = settings.login_url.trim();
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(ScrapeError::configuration(format!(
            "login_url must be an http(s) URL, got {:?}",
            settings.login_url
        )));
    }
    if settings.data_dir.as_os_str().is_empty() {
        return Err(ScrapeError::configuration("data_dir is empty"));
    }
    Ok(())
}
