//! History aggregation over timestamped CSV extracts.

use chrono::{DateTime, Local, TimeDelta};
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;
use crate::store::naming::parse_snapshot_time;
use crate::store::{SnapshotStore, Table};

/// Deduplicated rows drawn from every extract inside a time window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistoryWindow {
    /// Window length in days
    pub days: u32,
    /// Extract files that contributed rows, oldest first
    pub files: Vec<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl HistoryWindow {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as JSON objects keyed by column name
    pub fn records(&self) -> Vec<Value> {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.clone(),
        }
        .to_records()
    }
}

pub struct HistoryAggregator<'a> {
    store: &'a SnapshotStore,
}

impl<'a> HistoryAggregator<'a> {
    pub fn new(store: &'a SnapshotStore) -> Self {
        Self { store }
    }

    /// Rows captured within the last `days` days
    pub fn history(&self, days: u32) -> Result<HistoryWindow, StoreError> {
        self.history_at(days, Local::now())
    }

    /// Rows from extracts stamped within `[now - days, now]`
    ///
    /// A window reaching past the earliest representable date has no lower
    /// bound. Unreadable extracts are skipped with a warning. Duplicate rows
    /// across files collapse to their first occurrence in file-name order.
    pub fn history_at(&self, days: u32, now: DateTime<Local>) -> Result<HistoryWindow, StoreError> {
        let cutoff = TimeDelta::try_days(i64::from(days))
            .and_then(|span| now.checked_sub_signed(span));
        let mut combined = Table::default();
        let mut files = Vec::new();

        for path in self.store.extract_files()? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(captured) = parse_snapshot_time(name) else {
                tracing::warn!("Skipping extract with an unusable timestamp: {:?}", path);
                continue;
            };
            if cutoff.is_some_and(|start| captured < start) || captured > now {
                continue;
            }

            match self.store.read_extract(&path) {
                Ok(table) => {
                    combined.append(table);
                    files.push(name.to_string());
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable extract {:?}: {}", path, e);
                }
            }
        }

        combined.dedup();
        tracing::debug!(
            "History for {} days: {} rows from {} files",
            days,
            combined.len(),
            files.len()
        );

        Ok(HistoryWindow {
            days,
            files,
            columns: combined.columns,
            rows: combined.rows,
        })
    }
}
