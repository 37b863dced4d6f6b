//! On-disk snapshot store.
//!
//! Every snapshot lands twice: once under a unique timestamped name and once as
//! the `latest_data.json` pointer. Writes go through a temp file in the same
//! directory and an atomic rename, so readers only ever see whole files and a
//! failed write leaves the previous latest file untouched.

pub mod naming;
pub mod table;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::types::{RequestRecord, Snapshot};
use naming::{LATEST_CSV, LATEST_JSON};
pub use table::{find_row_list, Table, ROW_LIST_FIELDS};

/// Snapshot files written for one capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedFiles {
    pub snapshot: PathBuf,
    pub extract: Option<PathBuf>,
}

/// File-backed store rooted at one data directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))
    }

    /// Persist a payload captured now
    pub fn persist(
        &self,
        payload: Value,
        origin: &str,
        dashboard_confirmed: bool,
    ) -> Result<(Snapshot, PersistedFiles), StoreError> {
        self.persist_at(payload, origin, dashboard_confirmed, Local::now())
    }

    /// Persist a payload captured at `at`
    ///
    /// Writes the timestamped snapshot and, when the payload holds a non-empty
    /// row list, its CSV extract. The `latest_*` pointers are replaced only
    /// after every timestamped file is on disk, with `latest_data.json` last.
    /// If that final write fails, `latest_data.csv` is put back as it was.
    pub fn persist_at(
        &self,
        payload: Value,
        origin: &str,
        dashboard_confirmed: bool,
        at: DateTime<Local>,
    ) -> Result<(Snapshot, PersistedFiles), StoreError> {
        self.ensure_dir()?;

        let snapshot = Snapshot {
            timestamp: at,
            url: origin.to_string(),
            dashboard_confirmed,
            data: payload,
        };

        let stem = self.unique_stem(&naming::stamp(&at));
        let snapshot_path = self.dir.join(format!("{stem}.json"));
        let bytes = serde_json::to_vec_pretty(&snapshot).map_err(|source| StoreError::Json {
            path: snapshot_path.clone(),
            source,
        })?;

        write_atomic(&snapshot_path, &bytes)?;
        info!("Saved snapshot to {:?}", snapshot_path);

        let extract = match find_row_list(&snapshot.data) {
            Some(records) if !records.is_empty() => {
                let table = Table::from_records(records);
                let csv = table.to_csv_bytes();
                let extract_path = self.dir.join(format!("{stem}.csv"));
                write_atomic(&extract_path, &csv)?;
                info!("Saved {} rows to {:?}", table.len(), extract_path);
                Some((extract_path, csv))
            }
            _ => {
                debug!("No row list in snapshot from {}", origin);
                None
            }
        };

        let latest_csv = self.dir.join(LATEST_CSV);
        let previous_csv = match &extract {
            Some((_, csv)) => {
                let previous = fs::read(&latest_csv).ok();
                write_atomic(&latest_csv, csv)?;
                Some(previous)
            }
            None => None,
        };

        if let Err(e) = write_atomic(&self.dir.join(LATEST_JSON), &bytes) {
            if let Some(previous) = previous_csv {
                restore_latest_csv(&latest_csv, previous);
            }
            return Err(e);
        }

        Ok((
            snapshot,
            PersistedFiles {
                snapshot: snapshot_path,
                extract: extract.map(|(path, _)| path),
            },
        ))
    }

    /// First stem for `stamp` not already used by a json or csv file
    fn unique_stem(&self, stamp: &str) -> String {
        (0..)
            .map(|n| naming::snapshot_stem(stamp, n))
            .find(|stem| {
                !self.dir.join(format!("{stem}.json")).exists()
                    && !self.dir.join(format!("{stem}.csv")).exists()
            })
            .unwrap_or_else(|| naming::snapshot_stem(stamp, 0))
    }

    /// Most recently persisted snapshot
    pub fn latest(&self) -> Result<Snapshot, StoreError> {
        let path = self.dir.join(LATEST_JSON);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound { path });
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };
        serde_json::from_slice(&content).map_err(|source| StoreError::Json { path, source })
    }

    /// Write the diagnostic request log for a run
    pub fn write_request_log(
        &self,
        records: &[RequestRecord],
        at: DateTime<Local>,
    ) -> Result<PathBuf, StoreError> {
        self.ensure_dir()?;
        let path = self.dir.join(naming::request_log_name(&naming::stamp(&at)));
        let bytes = serde_json::to_vec_pretty(records).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &bytes)?;
        debug!("Saved {} requests to {:?}", records.len(), path);
        Ok(path)
    }

    /// Path for a failure screenshot taken at `at`; creates the data directory
    pub fn screenshot_path(&self, at: DateTime<Local>) -> Result<PathBuf, StoreError> {
        self.ensure_dir()?;
        Ok(self.dir.join(naming::screenshot_name(&naming::stamp(&at))))
    }

    /// Timestamped CSV extracts, sorted by name (and so by capture time)
    pub fn extract_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(naming::is_extract_name)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Load one CSV extract
    pub fn read_extract(&self, path: &Path) -> Result<Table, StoreError> {
        let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        Ok(Table::from_csv(&text))
    }
}

/// Undo a `latest_data.csv` replacement after the json pointer failed
fn restore_latest_csv(path: &Path, previous: Option<Vec<u8>>) {
    let restored = match previous {
        Some(bytes) => write_atomic(path, &bytes),
        None => fs::remove_file(path).map_err(|e| StoreError::io(path, e)),
    };
    if let Err(e) = restored {
        warn!("Could not restore {:?}: {}", path, e);
    }
}

/// Replace `path` with `bytes` via a temp file and rename
///
/// The temp file is created with `create_new` so a leftover symlink or file is
/// never written through.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let temp_path = temp_path_for(path);

    // Leftover from an interrupted write
    let _ = fs::remove_file(&temp_path);

    let result = (|| {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    result.map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        StoreError::io(path, e)
    })
}

/// `.name.tmp` next to `path`; hidden and outside the snapshot name pattern
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}
