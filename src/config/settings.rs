use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use meridian_core::ScraperSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable overriding the web server port
pub const WEB_PORT_ENV: &str = "WEB_PORT";

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Meridian Energy usage scraper")]
pub struct Config {
    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for snapshots and extracts
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Show the browser window
    #[arg(long, global = true)]
    pub headful: bool,

    /// Web server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Minutes between scheduled runs
    #[arg(short = 'i', long)]
    pub interval: Option<u64>,

    /// Serve the API without scheduled runs
    #[arg(long)]
    pub no_schedule: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the API and run the scheduler (default)
    Serve,
    /// Run one scrape and print the snapshot
    Scrape,
    /// Print the latest stored snapshot
    Latest,
    /// Print deduplicated rows from recent extracts
    History {
        /// Window length in days
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Subcommand to run, `serve` when none was given
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}

/// Application settings (from config file)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Portal session and storage settings
    #[serde(default)]
    pub scraper: ScraperSettings,

    /// Web server settings
    #[serde(default)]
    pub web: WebSettings,

    /// Scheduled run settings
    #[serde(default)]
    pub schedule: ScheduleSettings,
}

/// Web server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSettings {
    /// Enable web server
    #[serde(default = "default_web_enabled")]
    pub enabled: bool,

    /// Web server port
    #[serde(default = "default_web_port")]
    pub port: u16,
}

fn default_web_enabled() -> bool {
    true
}

fn default_web_port() -> u16 {
    8080
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            enabled: default_web_enabled(),
            port: default_web_port(),
        }
    }
}

/// Scheduled run settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    /// Run the scraper on an interval
    #[serde(default = "default_schedule_enabled")]
    pub enabled: bool,

    /// Minutes between runs
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
}

fn default_schedule_enabled() -> bool {
    true
}

fn default_interval_minutes() -> u64 {
    60
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            enabled: default_schedule_enabled(),
            interval_minutes: default_interval_minutes(),
        }
    }
}

impl Settings {
    /// Load settings from config file
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        // Try custom path first
        if let Some(p) = path {
            if p.exists() {
                return Self::read(p);
            }
        }

        let default_paths = [
            dirs::config_dir().map(|p| p.join("meridian/config.toml")),
            dirs::home_dir().map(|p| p.join(".config/meridian/config.toml")),
            dirs::home_dir().map(|p| p.join(".meridian.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                return Self::read(path);
            }
        }

        Ok(Self::default())
    }

    fn read(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Merge CLI config into settings (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Config) {
        if let Some(data_dir) = &cli.data_dir {
            self.scraper.data_dir = data_dir.clone();
        }
        if cli.headful {
            self.scraper.headless = false;
        }
        if let Some(port) = cli.port {
            self.web.port = port;
        }
        if let Some(interval) = cli.interval {
            self.schedule.interval_minutes = interval;
        }
        if cli.no_schedule {
            self.schedule.enabled = false;
        }
    }

    /// Apply `HEADLESS` and `WEB_PORT` from the environment
    pub fn apply_env(&mut self) {
        self.scraper.apply_env();
        if let Ok(value) = std::env::var(WEB_PORT_ENV) {
            match value.trim().parse() {
                Ok(port) => self.web.port = port,
                Err(_) => tracing::warn!("Ignoring invalid {}={:?}", WEB_PORT_ENV, value),
            }
        }
    }

    /// Validate and normalize settings values
    ///
    /// Clamps the schedule interval so a zero never turns into a busy loop.
    pub fn validate(&mut self) {
        const MIN_INTERVAL_MINUTES: u64 = 1;

        if self.schedule.interval_minutes < MIN_INTERVAL_MINUTES {
            self.schedule.interval_minutes = MIN_INTERVAL_MINUTES;
        }
        if self.web.port == 0 {
            self.web.port = default_web_port();
        }
    }
}
