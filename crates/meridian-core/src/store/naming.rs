//! File naming for the on-disk store.
//!
//! The `%Y%m%d_%H%M%S` stamp embedded in snapshot names is part of the storage
//! contract: history windowing reads dates back out of file names.

use chrono::{DateTime, Local, LocalResult, NaiveDateTime, TimeDelta, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;

pub const SNAPSHOT_PREFIX: &str = "meridian_data_";
pub const LATEST_JSON: &str = "latest_data.json";
pub const LATEST_CSV: &str = "latest_data.csv";

/// Filename timestamp format (local time)
pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// `meridian_data_<stamp>[_<n>].<ext>`
static SNAPSHOT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^meridian_data_(\d{8}_\d{6})(?:_\d+)?\.(json|csv)$").unwrap());

/// Format a time as a filename stamp
pub fn stamp(at: &DateTime<Local>) -> String {
    at.format(STAMP_FORMAT).to_string()
}

/// Stem for a snapshot file, with a collision suffix when `n > 0`
pub fn snapshot_stem(stamp: &str, n: u32) -> String {
    if n == 0 {
        format!("{SNAPSHOT_PREFIX}{stamp}")
    } else {
        format!("{SNAPSHOT_PREFIX}{stamp}_{n}")
    }
}

pub fn request_log_name(stamp: &str) -> String {
    format!("requests_{stamp}.json")
}

pub fn screenshot_name(stamp: &str) -> String {
    format!("error_screenshot_{stamp}.png")
}

/// Whether `name` is a timestamped CSV extract
pub fn is_extract_name(name: &str) -> bool {
    SNAPSHOT_NAME
        .captures(name)
        .is_some_and(|caps| &caps[2] == "csv")
}

/// Recover the capture time embedded in a snapshot file name
///
/// Returns `None` for names outside the snapshot pattern, including the
/// `latest_*` pointers, and for stamps that are not calendar dates. A stamp
/// inside a daylight-saving gap resolves to the first instant after the jump.
pub fn parse_snapshot_time(name: &str) -> Option<DateTime<Local>> {
    let caps = SNAPSHOT_NAME.captures(name)?;
    let naive = NaiveDateTime::parse_from_str(&caps[1], STAMP_FORMAT).ok()?;
    resolve_local(naive, |n| Local.from_local_datetime(n))
}

fn resolve_local(
    naive: NaiveDateTime,
    lookup: impl Fn(&NaiveDateTime) -> LocalResult<DateTime<Local>>,
) -> Option<DateTime<Local>> {
    lookup(&naive).earliest().or_else(|| {
        let shifted = naive.checked_add_signed(TimeDelta::hours(1))?;
        lookup(&shifted).earliest()
    })
}
