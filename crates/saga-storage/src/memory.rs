use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Result, StorageError};
use crate::storage::LogStorage;

#[derive(Debug, Default)]
struct MemoryState {
    streams: HashMap<String, Vec<String>>,
    closed: bool,
}

/// Log storage kept in process memory.
///
/// Nothing survives a restart, so this backend suits tests and
/// single-process tooling only.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn open_state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(StorageError::Closed);
        }
        Ok(state)
    }
}

impl LogStorage for MemoryStorage {
    fn append_log(&self, log_id: &str, entry: &str) -> Result<()> {
        self.open_state()?
            .streams
            .entry(log_id.to_string())
            .or_default()
            .push(entry.to_string());
        Ok(())
    }

    fn lookup(&self, log_id: &str) -> Result<Vec<String>> {
        Ok(self
            .open_state()?
            .streams
            .get(log_id)
            .cloned()
            .unwrap_or_default())
    }

    fn cleanup(&self, log_id: &str) -> Result<()> {
        self.open_state()?.streams.remove(log_id);
        Ok(())
    }

    fn log_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.open_state()?.streams.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn last_log(&self, log_id: &str) -> Result<String> {
        let state = self.open_state()?;
        let stream = state
            .streams
            .get(log_id)
            .ok_or_else(|| StorageError::NotFound {
                log_id: log_id.to_string(),
            })?;
        stream.last().cloned().ok_or_else(|| StorageError::Empty {
            log_id: log_id.to_string(),
        })
    }

    fn close(&self) -> Result<()> {
        self.open_state()?.closed = true;
        Ok(())
    }
}
