use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::error::{Result, StorageError};
use crate::storage::LogStorage;

const LOG_EXTENSION: &str = "log";

/// Log storage backed by one append-only file per log id.
///
/// Each stream lives in `<dir>/<log_id>.log` with one entry per line, so
/// entries must not contain line breaks. Appends are synced to disk before
/// returning. Reads and writes share one lock, so a reader never sees a
/// partially written line.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    lock: Mutex<()>,
    closed: AtomicBool,
}

impl FileStorage {
    /// Opens (and creates if needed) a storage rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    fn stream_path(&self, log_id: &str) -> Result<PathBuf> {
        let reason = if log_id.is_empty() {
            Some("log id is empty")
        } else if log_id.starts_with('.') {
            Some("log id must not start with '.'")
        } else if log_id.contains(['/', '\\']) {
            Some("log id must not contain path separators")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(StorageError::InvalidLogId {
                log_id: log_id.to_string(),
                reason,
            });
        }
        Ok(self.dir.join(format!("{log_id}.{LOG_EXTENSION}")))
    }

    fn read_stream(&self, log_id: &str) -> Result<Option<Vec<String>>> {
        let path = self.stream_path(log_id)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content.lines().map(str::to_string).collect())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }
}

impl LogStorage for FileStorage {
    fn append_log(&self, log_id: &str, entry: &str) -> Result<()> {
        self.ensure_open()?;
        if entry.contains(['\n', '\r']) {
            return Err(StorageError::InvalidEntry {
                log_id: log_id.to_string(),
                reason: "entry contains a line break",
            });
        }
        let path = self.stream_path(log_id)?;
        let io_err = |source: std::io::Error| StorageError::Io {
            path: path.clone(),
            source,
        };

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        writeln!(file, "{entry}").map_err(io_err)?;
        file.sync_data().map_err(io_err)?;
        Ok(())
    }

    fn lookup(&self, log_id: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_stream(log_id)?.unwrap_or_default())
    }

    fn cleanup(&self, log_id: &str) -> Result<()> {
        self.ensure_open()?;
        let path = self.stream_path(log_id)?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(log_id, path = %path.display(), "removed log stream");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn log_ids(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let io_err = |source: std::io::Error| StorageError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut ids = Vec::new();
        for dir_entry in fs::read_dir(&self.dir).map_err(io_err)? {
            let path = dir_entry.map_err(io_err)?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn last_log(&self, log_id: &str) -> Result<String> {
        self.ensure_open()?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self
            .read_stream(log_id)?
            .ok_or_else(|| StorageError::NotFound {
                log_id: log_id.to_string(),
            })?;
        entries.pop().ok_or_else(|| StorageError::Empty {
            log_id: log_id.to_string(),
        })
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}
