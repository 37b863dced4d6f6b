use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use meridian::config::{Command, Config, Settings};
use meridian::scheduler::Scheduler;
use meridian::web::WebServer;
use meridian_core::{Credentials, HistoryAggregator, MeridianScraper, SnapshotStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Setup logging
    setup_logging(cli.debug);

    // Load settings: file, then environment, then CLI flags
    let mut settings = Settings::load(cli.config.as_ref())?;
    settings.apply_env();
    settings.merge_cli(&cli);
    settings.validate();

    match cli.command() {
        Command::Serve => serve(settings).await,
        Command::Scrape => scrape_once(settings).await,
        Command::Latest => print_latest(&settings),
        Command::History { days } => print_history(&settings, days),
    }
}

fn setup_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("meridian=debug,meridian_core=debug")
    } else {
        EnvFilter::new("meridian=info,meridian_core=info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn build_scraper(settings: &Settings) -> Result<Arc<MeridianScraper>> {
    let credentials = Credentials::from_env()?;
    let scraper = MeridianScraper::new(settings.scraper.clone(), credentials)?;
    Ok(Arc::new(scraper))
}

async fn serve(settings: Settings) -> Result<()> {
    let scraper = build_scraper(&settings)?;

    if !settings.web.enabled && !settings.schedule.enabled {
        bail!("Nothing to serve: both [web] and [schedule] are disabled");
    }

    let schedule = settings
        .schedule
        .enabled
        .then(|| Scheduler::new(scraper.clone(), &settings.schedule).start());

    if settings.web.enabled {
        WebServer::new(settings.web.clone(), scraper).run().await
    } else if let Some(handle) = schedule {
        handle.await.context("Scheduler task failed")
    } else {
        Ok(())
    }
}

async fn scrape_once(settings: Settings) -> Result<()> {
    let scraper = build_scraper(&settings)?;
    match scraper.run().await? {
        Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        None => {
            let reason = match scraper.status().last_outcome {
                Some(outcome) => serde_json::to_string(&outcome)?,
                None => "unknown".to_string(),
            };
            eprintln!("No usage data captured ({reason})");
        }
    }
    Ok(())
}

fn print_latest(settings: &Settings) -> Result<()> {
    let store = SnapshotStore::new(&settings.scraper.data_dir);
    match store.latest() {
        Ok(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        Err(meridian_core::StoreError::NotFound { .. }) => {
            eprintln!("No snapshot stored in {:?}", store.dir());
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn print_history(settings: &Settings, days: u32) -> Result<()> {
    let store = SnapshotStore::new(&settings.scraper.data_dir);
    let window = HistoryAggregator::new(&store).history(days)?;
    println!("{}", serde_json::to_string_pretty(&window.records())?);
    eprintln!(
        "{} rows from {} files over the last {} days",
        window.len(),
        window.files.len(),
        days
    );
    Ok(())
}
