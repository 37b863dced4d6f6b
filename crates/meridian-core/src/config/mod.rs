mod settings;

pub use settings::{Credentials, ScraperSettings, EMAIL_ENV, HEADLESS_ENV, PASSWORD_ENV};
