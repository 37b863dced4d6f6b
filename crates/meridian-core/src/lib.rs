//! Core of the Meridian usage scraper.
//!
//! Drives a headless browser through the portal login, captures usage payloads
//! from network traffic (falling back to visible page text), and keeps them as
//! timestamped snapshots with a rolling latest file and CSV history.

pub mod browser;
pub mod capture;
pub mod config;
pub mod error;
pub mod fallback;
pub mod history;
pub mod scraper;
pub mod selector;
pub mod session;
pub mod store;
pub mod types;

pub use config::{Credentials, ScraperSettings};
pub use error::{BrowserError, ScrapeError, StoreError};
pub use history::{HistoryAggregator, HistoryWindow};
pub use scraper::{MeridianScraper, RunGuard, RunOutcome, RunStatus};
pub use store::SnapshotStore;
pub use types::Snapshot;
