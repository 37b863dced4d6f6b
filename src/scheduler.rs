//! Interval-driven scrape runs.

use std::sync::Arc;
use std::time::Duration;

use meridian_core::browser::BrowserLauncher;
use meridian_core::{MeridianScraper, ScrapeError};
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::ScheduleSettings;

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A run completed (with or without data)
    Ran { captured: bool },
    /// Another run held the guard
    Skipped,
}

/// Runs the scraper every `interval`, first run one interval after start
pub struct Scheduler<L: BrowserLauncher + 'static> {
    scraper: Arc<MeridianScraper<L>>,
    interval: Duration,
}

impl<L: BrowserLauncher + 'static> Scheduler<L> {
    pub fn new(scraper: Arc<MeridianScraper<L>>, settings: &ScheduleSettings) -> Self {
        Self {
            scraper,
            interval: Duration::from_secs(settings.interval_minutes.max(1) * 60),
        }
    }

    /// Start the schedule in a background task
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        tracing::info!("Scheduled scrape every {:?}", self.interval);

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// Run once unless a run is already active
    pub async fn tick(&self) -> TickOutcome {
        match self.scraper.run().await {
            Ok(snapshot) => TickOutcome::Ran {
                captured: snapshot.is_some(),
            },
            Err(ScrapeError::RunInProgress) => {
                tracing::info!("Skipping scheduled scrape; a run is already in progress");
                TickOutcome::Skipped
            }
            Err(e) => {
                tracing::error!("Scheduled scrape failed: {}", e);
                TickOutcome::Ran { captured: false }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::{Credentials, RunOutcome, ScraperSettings};
    use tempfile::TempDir;

    /// Scraper whose browser launch always fails fast
    fn scraper(dir: &TempDir) -> Arc<MeridianScraper> {
        let settings = ScraperSettings {
            data_dir: dir.path().to_path_buf(),
            chrome_path: Some(dir.path().join("no-such-chrome")),
            ..Default::default()
        };
        let credentials = Credentials::new("user@example.com", "hunter2").unwrap();
        Arc::new(MeridianScraper::new(settings, credentials).unwrap())
    }

    #[tokio::test]
    async fn test_tick_skips_while_run_in_progress() {
        let dir = TempDir::new().unwrap();
        let scraper = scraper(&dir);
        let scheduler = Scheduler::new(scraper.clone(), &ScheduleSettings::default());

        let _permit = scraper.guard().try_acquire().unwrap();
        assert_eq!(scheduler.tick().await, TickOutcome::Skipped);
        assert_eq!(scraper.status().runs, 0);
    }

    #[tokio::test]
    async fn test_tick_runs_and_records_failure() {
        let dir = TempDir::new().unwrap();
        let scraper = scraper(&dir);
        let scheduler = Scheduler::new(scraper.clone(), &ScheduleSettings::default());

        assert_eq!(scheduler.tick().await, TickOutcome::Ran { captured: false });
        let status = scraper.status();
        assert_eq!(status.runs, 1);
        assert!(matches!(status.last_outcome, Some(RunOutcome::Failed { .. })));
        assert!(!scraper.is_running());
    }

    #[test]
    fn test_interval_from_minutes() {
        let dir = TempDir::new().unwrap();
        let settings = ScheduleSettings {
            enabled: true,
            interval_minutes: 0,
        };
        let scheduler = Scheduler::new(scraper(&dir), &settings);
        assert_eq!(scheduler.interval, Duration::from_secs(60));
    }
}
