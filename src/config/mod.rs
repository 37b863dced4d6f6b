mod settings;

pub use settings::{Command, Config, ScheduleSettings, Settings, WebSettings, WEB_PORT_ENV};
